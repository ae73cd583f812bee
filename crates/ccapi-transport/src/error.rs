/// Errors that can occur while opening or reading a byte source.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    /// The request never produced a response.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: reqwest::Error,
    },

    /// The device answered with a non-success status.
    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The device answered with an empty body on a streaming endpoint.
    #[error("{url} returned no body")]
    NoBody { url: String },

    /// Reading the next body chunk failed.
    #[error("body read error: {0}")]
    Body(#[from] reqwest::Error),

    /// An I/O error occurred on the byte source.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
