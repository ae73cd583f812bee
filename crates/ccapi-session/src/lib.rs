//! Device session for the camera control API.
//!
//! This is the "just works" layer. Connect to a camera once, resolve its
//! capability map into named endpoints, issue control calls, and run the
//! streaming channels (live view scroll, flip detail, event monitoring)
//! through the decoders of `ccapi-frame`.

pub mod endpoint;
pub mod error;
pub mod poll;
pub mod session;
pub mod stream;

pub use endpoint::{EndpointDescriptor, EndpointMap, HttpMethod};
pub use error::{Result, SessionError};
pub use poll::{PollLoop, PollStatus, PollSummary};
pub use session::{DeviceInformation, Session, SessionConfig};
pub use stream::{FlipDetail, FlipDetailKind};
