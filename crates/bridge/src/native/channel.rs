//! An in-memory native runtime.
//!
//! [`request_channel`] and [`response_channel`] split one exchange in two: the
//! native half ([`ChannelRequest`], [`ChannelResponse`]) is handed to the
//! bridge, the runtime half ([`RequestEmitter`], [`ResponseObserver`]) stays
//! with whoever plays the server, emitting request events and acknowledging
//! written response bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::channel::{mpsc, oneshot};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version};
use tokio::sync::Notify;
use tracing::debug;

use super::{NativeRequest, NativeResponse, SinkEvent, SourceEvent};
use crate::protocol::BoxError;

#[derive(Debug, Default)]
struct SourceFlow {
    /// Events emitted and not yet taken by the request.
    queued: AtomicUsize,
    paused: AtomicBool,
    destroyed: AtomicBool,
    changed: Notify,
}

/// Splits a request head into a [`ChannelRequest`] and its [`RequestEmitter`].
pub fn request_channel(head: Request<()>) -> (ChannelRequest, RequestEmitter) {
    let (parts, ()) = head.into_parts();
    let (event_sender, event_receiver) = mpsc::unbounded();
    let (destroy_sender, destroy_receiver) = oneshot::channel();
    let flow = Arc::new(SourceFlow::default());

    let request = ChannelRequest {
        method: parts.method,
        target: parts.uri,
        version: parts.version,
        headers: parts.headers,
        encrypted: false,
        events: event_receiver,
        flow: Arc::clone(&flow),
        destroy_sender: Some(destroy_sender),
    };

    (request, RequestEmitter { events: event_sender, flow, destroy_receiver })
}

/// The native half of an in-memory request.
#[derive(Debug)]
pub struct ChannelRequest {
    method: Method,
    target: Uri,
    version: Version,
    headers: HeaderMap,
    encrypted: bool,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    flow: Arc<SourceFlow>,
    destroy_sender: Option<oneshot::Sender<Option<String>>>,
}

impl ChannelRequest {
    /// Marks the request as received over an encrypted socket.
    #[must_use]
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

impl NativeRequest for ChannelRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn target(&self) -> &Uri {
        &self.target
    }

    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn is_destroyed(&self) -> bool {
        self.flow.destroyed.load(Ordering::Acquire)
    }

    fn pause(&mut self) {
        self.flow.paused.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        if self.flow.paused.swap(false, Ordering::AcqRel) {
            self.flow.changed.notify_waiters();
        }
    }

    fn destroy(&mut self, reason: Option<BoxError>) {
        if self.flow.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let reason = reason.map(|reason| reason.to_string());
        debug!(reason = ?reason, "request destroyed");
        self.events.close();
        self.flow.changed.notify_waiters();
        if let Some(sender) = self.destroy_sender.take() {
            let _ = sender.send(reason);
        }
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SourceEvent>> {
        let event = self.events.poll_next_unpin(cx);
        if let Poll::Ready(Some(_)) = &event {
            self.flow.queued.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }
}

/// The runtime half of an in-memory request.
#[derive(Debug)]
pub struct RequestEmitter {
    events: mpsc::UnboundedSender<SourceEvent>,
    flow: Arc<SourceFlow>,
    destroy_receiver: oneshot::Receiver<Option<String>>,
}

impl RequestEmitter {
    /// Emits `data` regardless of the paused flag, like a socket that already
    /// had bytes in flight. Returns false once nobody listens anymore.
    pub fn data(&self, chunk: impl Into<Bytes>) -> bool {
        self.emit(SourceEvent::Data(chunk.into()))
    }

    pub fn end(&self) -> bool {
        self.emit(SourceEvent::End)
    }

    pub fn error<E: Into<BoxError>>(&self, error: E) -> bool {
        self.emit(SourceEvent::Error(error.into()))
    }

    /// Waits while the request is paused, then emits `data`.
    pub async fn write(&self, chunk: impl Into<Bytes>) -> bool {
        loop {
            let changed = self.flow.changed.notified();
            if self.is_destroyed() {
                return false;
            }
            if !self.is_paused() {
                return self.data(chunk);
            }
            changed.await;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flow.paused.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.flow.destroyed.load(Ordering::Acquire)
    }

    /// How many emitted events the request has not taken yet.
    pub fn queued(&self) -> usize {
        self.flow.queued.load(Ordering::Acquire)
    }

    /// Tears the request down from the runtime side, as a lost connection would.
    pub fn destroy(&self) {
        if !self.flow.destroyed.swap(true, Ordering::AcqRel) {
            self.flow.changed.notify_waiters();
        }
    }

    /// Resolves with the reason once the bridge destroyed the request, or
    /// with `Canceled` if the request was dropped without being destroyed.
    pub async fn destroyed(&mut self) -> Result<Option<String>, oneshot::Canceled> {
        (&mut self.destroy_receiver).await
    }

    fn emit(&self, event: SourceEvent) -> bool {
        self.flow.queued.fetch_add(1, Ordering::AcqRel);
        let sent = self.events.unbounded_send(event).is_ok();
        if !sent {
            self.flow.queued.fetch_sub(1, Ordering::AcqRel);
        }
        sent
    }
}

#[derive(Debug)]
struct SinkFlow {
    buffered: AtomicUsize,
    high_water_mark: usize,
    saturated: AtomicBool,
    destroyed: AtomicBool,
}

/// What a [`ChannelResponse`] asked the runtime to put on the wire.
#[derive(Debug)]
pub enum SinkCommand {
    Head { status: StatusCode, headers: HeaderMap },
    Data(Bytes),
    End,
    Destroy(Option<String>),
}

/// Creates a response whose `write` reports saturation once
/// `high_water_mark` bytes are buffered and not yet flushed.
pub fn response_channel(high_water_mark: usize) -> (ChannelResponse, ResponseObserver) {
    let (command_sender, command_receiver) = mpsc::unbounded();
    let (event_sender, event_receiver) = mpsc::unbounded();
    let flow = Arc::new(SinkFlow {
        buffered: AtomicUsize::new(0),
        high_water_mark,
        saturated: AtomicBool::new(false),
        destroyed: AtomicBool::new(false),
    });

    let response = ChannelResponse {
        headers: HeaderMap::new(),
        commands: command_sender,
        events: event_receiver,
        flow: Arc::clone(&flow),
    };

    (response, ResponseObserver { commands: command_receiver, events: event_sender, flow })
}

/// The native half of an in-memory response.
#[derive(Debug)]
pub struct ChannelResponse {
    headers: HeaderMap,
    commands: mpsc::UnboundedSender<SinkCommand>,
    events: mpsc::UnboundedReceiver<SinkEvent>,
    flow: Arc<SinkFlow>,
}

impl ChannelResponse {
    fn send(&self, command: SinkCommand) {
        if self.commands.unbounded_send(command).is_err() {
            debug!("response observer is gone, dropping command");
        }
    }

    fn push_data(&self, chunk: Bytes) -> bool {
        let buffered = self.flow.buffered.fetch_add(chunk.len(), Ordering::AcqRel) + chunk.len();
        let accepting = buffered < self.flow.high_water_mark;
        if !accepting {
            self.flow.saturated.store(true, Ordering::Release);
        }
        self.send(SinkCommand::Data(chunk));
        accepting
    }
}

impl NativeResponse for ChannelResponse {
    fn is_destroyed(&self) -> bool {
        self.flow.destroyed.load(Ordering::Acquire)
    }

    fn set_header(&mut self, name: &HeaderName, values: &[HeaderValue]) -> Result<(), BoxError> {
        if values.iter().any(|value| value.to_str().is_err()) {
            return Err(format!("Invalid character in header content [\"{name}\"]").into());
        }

        self.headers.remove(name);
        for value in values {
            self.headers.append(name.clone(), value.clone());
        }
        Ok(())
    }

    fn header_names(&self) -> Vec<HeaderName> {
        self.headers.keys().cloned().collect()
    }

    fn remove_header(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    fn write_head(&mut self, status: StatusCode) {
        self.send(SinkCommand::Head { status, headers: self.headers.clone() });
    }

    fn write(&mut self, chunk: Bytes) -> bool {
        self.push_data(chunk)
    }

    fn end(&mut self, chunk: Option<Bytes>) {
        if let Some(chunk) = chunk {
            self.push_data(chunk);
        }
        self.send(SinkCommand::End);
    }

    fn destroy(&mut self, error: Option<BoxError>) {
        if self.flow.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.send(SinkCommand::Destroy(error.map(|error| error.to_string())));
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<SinkEvent>> {
        self.events.poll_next_unpin(cx)
    }
}

/// The runtime half of an in-memory response.
#[derive(Debug)]
pub struct ResponseObserver {
    commands: mpsc::UnboundedReceiver<SinkCommand>,
    events: mpsc::UnboundedSender<SinkEvent>,
    flow: Arc<SinkFlow>,
}

impl ResponseObserver {
    pub async fn next_command(&mut self) -> Option<SinkCommand> {
        self.commands.next().await
    }

    /// Returns an already queued command without waiting.
    pub fn try_next_command(&mut self) -> Option<SinkCommand> {
        self.commands.try_recv().ok()
    }

    pub fn buffered(&self) -> usize {
        self.flow.buffered.load(Ordering::Acquire)
    }

    /// Acknowledges `size` bytes as written to the wire, emitting `drain`
    /// once a saturated buffer is empty again.
    pub fn flushed(&self, size: usize) {
        let previous = self
            .flow
            .buffered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |buffered| Some(buffered.saturating_sub(size)))
            .unwrap_or_else(|buffered| buffered);

        if previous.saturating_sub(size) == 0 && self.flow.saturated.swap(false, Ordering::AcqRel) {
            self.emit(SinkEvent::Drain);
        }
    }

    /// Closes the connection under the response.
    pub fn close(&self) {
        self.flow.destroyed.store(true, Ordering::Release);
        self.emit(SinkEvent::Close);
    }

    pub fn error<E: Into<BoxError>>(&self, error: E) {
        self.emit(SinkEvent::Error(error.into()));
    }

    /// Flushes everything until the response ends, is destroyed or dropped.
    pub async fn collect(mut self) -> SinkTranscript {
        let mut transcript = SinkTranscript::default();
        while let Some(command) = self.next_command().await {
            match command {
                SinkCommand::Head { status, headers } => {
                    transcript.status = Some(status);
                    transcript.headers = headers;
                }
                SinkCommand::Data(chunk) => {
                    self.flushed(chunk.len());
                    transcript.body.extend_from_slice(&chunk);
                }
                SinkCommand::End => {
                    transcript.ended = true;
                    break;
                }
                SinkCommand::Destroy(reason) => {
                    transcript.destroyed = Some(reason);
                    break;
                }
            }
        }
        transcript
    }

    fn emit(&self, event: SinkEvent) {
        if self.events.unbounded_send(event).is_err() {
            debug!("response is gone, dropping event");
        }
    }
}

/// Everything an in-memory response put on the wire.
#[derive(Debug, Default)]
pub struct SinkTranscript {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: BytesMut,
    pub ended: bool,
    /// `Some` once destroyed, carrying the error text if there was one.
    pub destroyed: Option<Option<String>>,
}

impl SinkTranscript {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::poll_fn;
    use std::time::Duration;

    fn head() -> Request<()> {
        Request::builder().method(Method::POST).uri("/upload").body(()).unwrap()
    }

    #[tokio::test]
    async fn emitter_waits_while_paused() {
        let (mut request, emitter) = request_channel(head());
        request.pause();
        assert!(emitter.is_paused());

        let write = emitter.write("late");
        tokio::pin!(write);
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut write).await.is_err());

        request.resume();
        assert!(write.await);

        match poll_fn(|cx| request.poll_event(cx)).await {
            Some(SourceEvent::Data(chunk)) => assert_eq!(chunk, Bytes::from_static(b"late")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn destroy_reports_reason_once() {
        let (mut request, mut emitter) = request_channel(head());
        request.destroy(Some("gone".into()));
        request.destroy(Some("again".into()));

        assert!(emitter.is_destroyed());
        assert_eq!(emitter.destroyed().await.unwrap(), Some("gone".to_string()));
        assert!(!emitter.data("ignored"));
        assert!(!emitter.write("ignored").await);
    }

    #[tokio::test]
    async fn write_reports_saturation_and_drains() {
        let (mut response, mut observer) = response_channel(4);
        assert!(response.write(Bytes::from_static(b"ab")));
        assert!(!response.write(Bytes::from_static(b"cd")));
        assert_eq!(observer.buffered(), 4);

        observer.flushed(2);
        assert!(observer.try_next_command().is_some());
        observer.flushed(2);

        match poll_fn(|cx| response.poll_event(cx)).await {
            Some(SinkEvent::Drain) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn set_header_rejects_opaque_values() {
        let (mut response, _observer) = response_channel(16);
        let name = HeaderName::from_static("x-name");

        let error = response.set_header(&name, &[HeaderValue::from_bytes(b"caf\xe9").unwrap()]).unwrap_err();
        assert_eq!(error.to_string(), "Invalid character in header content [\"x-name\"]");
        assert!(response.header_names().is_empty());

        response.set_header(&name, &[HeaderValue::from_static("a"), HeaderValue::from_static("b")]).unwrap();
        assert_eq!(response.header_names(), vec![name]);
    }
}
