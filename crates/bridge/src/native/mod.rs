//! The native, event-driven side of an HTTP transaction.
//!
//! A server runtime exposes each exchange as a [`NativeRequest`] (a pausable
//! byte source emitting [`SourceEvent`]s) and a [`NativeResponse`] (a byte sink
//! whose `write` reports backpressure and which emits [`SinkEvent`]s). Events
//! are delivered through `poll_event`, so one task drives a whole exchange
//! without callbacks.
//!
//! [`channel`] holds an in-memory runtime implementing both traits.

use std::future::Future;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::poll_fn;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};

use crate::protocol::BoxError;

pub mod channel;
pub use channel::{ChannelRequest, ChannelResponse, RequestEmitter, ResponseObserver, SinkCommand, SinkTranscript};
pub use channel::{request_channel, response_channel};

/// An event emitted by a native request.
#[derive(Debug)]
pub enum SourceEvent {
    Data(Bytes),
    End,
    Error(BoxError),
}

/// An event emitted by a native response.
#[derive(Debug)]
pub enum SinkEvent {
    /// The underlying connection closed.
    Close,
    Error(BoxError),
    /// A sink that reported backpressure can take more data.
    Drain,
}

/// An incoming request as the server runtime sees it.
///
/// `poll_event` yields `None` once the runtime dropped its side of the
/// request, with or without an `End`.
pub trait NativeRequest: Send {
    fn method(&self) -> &Method;

    /// The request target, origin-form for HTTP/1, with authority for HTTP/2.
    fn target(&self) -> &Uri;

    fn version(&self) -> Version;

    fn headers(&self) -> &HeaderMap;

    /// Whether the request arrived over an encrypted socket.
    fn is_encrypted(&self) -> bool;

    fn is_destroyed(&self) -> bool;

    fn pause(&mut self);

    fn resume(&mut self);

    fn destroy(&mut self, reason: Option<BoxError>);

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SourceEvent>>;
}

/// An outgoing response as the server runtime sees it.
pub trait NativeResponse: Send {
    fn is_destroyed(&self) -> bool;

    /// Sets every value of one header, replacing earlier values.
    fn set_header(&mut self, name: &HeaderName, values: &[HeaderValue]) -> Result<(), BoxError>;

    fn header_names(&self) -> Vec<HeaderName>;

    fn remove_header(&mut self, name: &HeaderName);

    fn write_head(&mut self, status: StatusCode);

    /// Writes one chunk, returns `false` when the sink is saturated and a
    /// [`SinkEvent::Drain`] should be awaited before writing more.
    fn write(&mut self, chunk: Bytes) -> bool;

    fn end(&mut self, chunk: Option<Bytes>);

    fn destroy(&mut self, error: Option<BoxError>);

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SinkEvent>>;
}

pub(crate) fn next_sink_event<R>(response: &mut R) -> impl Future<Output = Option<SinkEvent>> + '_
where
    R: NativeResponse + ?Sized,
{
    poll_fn(move |cx| response.poll_event(cx))
}
