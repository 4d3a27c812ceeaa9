//! Request and response bodies on the standard side.
//!
//! - [`IncomingBody`]: a native request source pulled through `http_body::Body`,
//!   bounded by a [`LengthBound`](crate::protocol::LengthBound) and pausing the
//!   source while the consumer is saturated
//! - [`RequestBody`]: the body handed to handlers, absent when the request has none
//! - [`ResponseBody`]: the body handlers return; its reader can be taken once,
//!   later attempts see it locked
//! - [`BodyReader`]: the single consumer of a [`ResponseBody`]

mod incoming;
mod request_body;
mod response_body;

pub use incoming::{DEFAULT_HIGH_WATER_MARK, IncomingBody, raw_body};
pub use request_body::RequestBody;
pub use response_body::{BODY_LOCKED_MESSAGE, BodyReader, ResponseBody};
