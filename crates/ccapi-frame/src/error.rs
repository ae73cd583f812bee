/// Errors that can occur while framing or dispatching a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The byte source failed; fatal to the streaming session.
    #[error("byte source error: {0}")]
    Transport(#[from] ccapi_transport::TransportError),

    /// A multipart boundary literal was empty or otherwise unusable.
    #[error("invalid multipart boundary: {0:?}")]
    InvalidBoundary(String),

    /// A payload does not fit the wire format's length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
