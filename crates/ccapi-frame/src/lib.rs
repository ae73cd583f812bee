//! Streaming frame decoders for camera control API streams.
//!
//! This is the core value-add layer of ccapi. A live HTTP body arrives as
//! arbitrarily fragmented chunks; the decoders here turn it back into
//! complete units, whatever the chunk boundaries were:
//! - [`TlvDecoder`]: `FF 00 <type> <len:4 BE> <payload> [FF FF]` frames
//!   (flip detail images + info, event monitoring)
//! - [`JpegScanner`]: back-to-back JPEGs delimited only by SOI/EOI
//! - [`MultipartDecoder`]: `multipart/x-mixed-replace` parts with `Content-Length`
//!
//! The [`Dispatcher`] (feature `async`) drives one decoder against a
//! [`ccapi_transport::ByteStream`].

pub mod accumulator;
pub mod decoder;
pub mod error;
pub mod jpeg;
pub mod kind;
pub mod multipart;
pub mod tlv;

#[cfg(feature = "async")]
pub mod dispatcher;

pub use accumulator::Accumulator;
pub use decoder::{DecodedUnit, FrameConfig, UnitDecoder, DEFAULT_MAX_PAYLOAD};
pub use error::{FrameError, Result};
pub use jpeg::{JpegScanner, EOI, SOI};
pub use kind::{kind_name, EVENT, IMAGE, INFO};
pub use multipart::{boundary_from_content_type, encode_part, MultipartDecoder, DEFAULT_BOUNDARY};
pub use tlv::{encode_frame, TlvDecoder, TlvProfile, END_MARKER, HEADER_SIZE, START_MARKER};

#[cfg(feature = "async")]
pub use dispatcher::{dispatch, DispatchSummary, Dispatcher};
