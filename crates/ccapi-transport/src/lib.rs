//! Byte-chunk sources for the camera control API.
//!
//! This is the lowest layer of ccapi. A streaming endpoint is just an
//! unbounded sequence of byte chunks; the [`ByteStream`] type hides whether
//! those chunks come from a live HTTP response body or from memory.
//! Everything above (decoders, dispatcher, session) builds on it.

pub mod error;
pub mod http;
pub mod traits;

pub use error::{Result, TransportError};
pub use http::{HttpTransport, TransportConfig};
pub use traits::ByteStream;
