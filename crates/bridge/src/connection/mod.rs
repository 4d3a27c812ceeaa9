//! Connecting native exchanges to standard requests and responses.
//!
//! # Components
//!
//! - [`get_request`] / [`derive_base`]: build a `Request<RequestBody>` out of a
//!   native request, resolving the origin from forwarding headers, the socket
//!   and the host
//! - [`set_response`]: write a `Response<ResponseBody>` onto a native response,
//!   honoring its backpressure and tearing both sides down on failure
//! - [`NativeHandler`] / [`to_native_handler`]: the entry point running a
//!   [`Handler`](crate::handler::Handler) for each native exchange

mod native_handler;
mod request;
mod response_writer;

pub use native_handler::{NativeHandler, NativeHandlerBuilder, to_native_handler};
pub use request::{Duplex, derive_base, get_request};
pub use response_writer::{WriteState, set_response};
