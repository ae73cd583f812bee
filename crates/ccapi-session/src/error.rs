use std::time::Duration;

use ccapi_transport::TransportError;

use crate::endpoint::HttpMethod;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error while streaming.
    #[error("frame error: {0}")]
    Frame(#[from] ccapi_frame::FrameError),

    /// The capability map could not be understood.
    #[error("invalid capability map: {0}")]
    Capability(String),

    /// The device does not expose the named endpoint.
    #[error("endpoint {0:?} not supported by device")]
    UnsupportedEndpoint(String),

    /// The endpoint exists but not for this method.
    #[error("endpoint {name:?} does not support {method}")]
    MethodNotSupported { name: String, method: HttpMethod },

    /// The device rejected the call (busy, mode not supported, ...).
    /// `message` is the device's own text.
    #[error("device returned {status}: {message}")]
    Device { status: u16, message: String },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A single-shot stream ended before producing what was asked for.
    #[error("stream ended before {0} arrived")]
    Incomplete(&'static str),
}

impl SessionError {
    /// Device answered "busy" (e.g. a second streaming start).
    pub fn is_busy(&self) -> bool {
        match self {
            SessionError::Device { status, message } => {
                *status == 503 || message.to_ascii_lowercase().contains("busy")
            }
            _ => false,
        }
    }

    /// Device cannot perform the call in its current shooting mode.
    pub fn is_mode_unsupported(&self) -> bool {
        match self {
            SessionError::Device { message, .. } => {
                message.eq_ignore_ascii_case("mode not supported")
            }
            _ => false,
        }
    }

    /// Turn a rejected response body into a device error, keeping the
    /// device's `message` verbatim when it sent one.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| value.get("message")?.as_str().map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        SessionError::Device { status, message }
    }

    /// Like `From<TransportError>`, but surfaces rejected stream opens as
    /// device errors.
    pub(crate) fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, body, .. } => Self::from_response(status, &body),
            other => SessionError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_message_is_kept_verbatim() {
        let err = SessionError::from_response(503, r#"{"message":"Device busy"}"#);
        assert!(matches!(&err, SessionError::Device { status: 503, message } if message == "Device busy"));
        assert!(err.is_busy());
        assert!(!err.is_mode_unsupported());
    }

    #[test]
    fn mode_not_supported_is_classified() {
        let err = SessionError::from_response(400, r#"{"message":"Mode not supported"}"#);
        assert!(err.is_mode_unsupported());
        assert!(!err.is_busy());
    }

    #[test]
    fn non_json_body_becomes_message() {
        let err = SessionError::from_response(500, " internal failure \n");
        assert!(matches!(err, SessionError::Device { message, .. } if message == "internal failure"));
    }

    #[test]
    fn rejected_stream_open_maps_to_device_error() {
        let err = SessionError::from_transport(TransportError::Status {
            url: "http://camera/ccapi/ver100/shooting/liveview/scroll".to_string(),
            status: 503,
            body: r#"{"message":"Device busy"}"#.to_string(),
        });
        assert!(err.is_busy());
    }
}
