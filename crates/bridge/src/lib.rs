//! A bridge between event-driven native HTTP exchanges and standard
//! `http::Request` / `http::Response` values with streaming bodies.
//!
//! A server runtime hands the bridge a native request (a pausable byte source
//! emitting `data`, `end` and `error`) and a native response (a byte sink whose
//! `write` reports backpressure and which emits `drain`, `close` and `error`).
//! The bridge turns the pair into a `Request<RequestBody>`, runs a
//! [`Handler`](handler::Handler) and streams the returned
//! `Response<ResponseBody>` back.
//!
//! # Features
//!
//! - Pull-based request bodies: the native source is paused while the handler
//!   is not reading
//! - Request body size limits, enforced both on the declared `content-length`
//!   and while streaming
//! - Response streaming that stops pulling while the native sink is saturated
//! - Cancellation in both directions: a closed or failed sink cancels the
//!   response body, and a cancelled request body destroys the native request
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use micro_bridge::connection::NativeHandler;
//! use micro_bridge::handler::make_handler;
//! use micro_bridge::native::{request_channel, response_channel};
//! use micro_bridge::protocol::body::{RequestBody, ResponseBody};
//! use std::convert::Infallible;
//!
//! #[tokio::main]
//! async fn main() {
//!     let handler = NativeHandler::builder(make_handler(echo)).body_size_limit(1024 * 1024_u64).build();
//!
//!     let head = Request::post("/echo")
//!         .header("host", "localhost:8080")
//!         .header("content-type", "text/plain")
//!         .header("content-length", "5")
//!         .body(())
//!         .unwrap();
//!     let (request, emitter) = request_channel(head);
//!     let (mut response, observer) = response_channel(16 * 1024);
//!
//!     emitter.data("hello");
//!     emitter.end();
//!
//!     handler.handle(request, &mut response).await.unwrap();
//!     assert_eq!(observer.collect().await.body_str(), "hello");
//! }
//!
//! async fn echo(request: Request<RequestBody>) -> Result<Response<ResponseBody>, Infallible> {
//!     Ok(Response::new(ResponseBody::from(request.into_body())))
//! }
//! ```
//!
//! # Architecture
//!
//! - [`native`]: the native request/response traits and an in-memory runtime
//! - [`protocol`]: bodies, length bounds and errors
//! - [`handler`]: the handler trait and [`handler::make_handler`]
//! - [`connection`]: request construction, response writing and the entry point
//!
//! # Error Handling
//!
//! - [`protocol::RequestError`]: the native request cannot become a standard one
//! - [`protocol::BodyError`]: surfaced while streaming a request body
//! - [`protocol::BridgeError`]: top-level error of one exchange

pub mod connection;
pub mod handler;
pub mod native;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
