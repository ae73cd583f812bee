//! Streaming client for camera HTTP control APIs.
//!
//! ccapi connects to a camera's control API, resolves its capability map
//! and decodes the live streams it serves: live view scroll JPEGs, flip
//! detail image/info frames, event monitoring frames and multipart MJPEG.
//!
//! # Crate Structure
//!
//! - [`transport`]: HTTP byte-chunk sources
//! - [`frame`]: stream decoders (TLV, JPEG scroll, multipart) and the dispatcher
//! - [`session`]: device session, endpoint map, control calls, poll loop
//!   (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use ccapi_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ccapi_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use ccapi_session::*;
}
