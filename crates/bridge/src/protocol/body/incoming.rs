use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::task::noop_waker_ref;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, Version};
use http_body::{Body, Frame, SizeHint};
use tracing::{debug, warn};

use crate::native::{NativeRequest, SourceEvent};
use crate::protocol::{BodyError, BoxError, LengthBound, RequestError};

/// Chunks the consumer may hold before the native source is paused.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1;

/// Turns the body of a native request into an [`IncomingBody`].
///
/// Returns `Ok(None)` when the request carries no body:
/// - there is no `content-type` header
/// - it is HTTP/1 with neither a numeric `content-length` nor `transfer-encoding`
/// - the declared `content-length` is `0`
///
/// Fails before any byte is read when the declared `content-length` exceeds
/// `body_size_limit`. A request that is already destroyed yields an empty,
/// cancelled body.
pub fn raw_body<N>(native: N, body_size_limit: Option<u64>) -> Result<Option<IncomingBody>, RequestError>
where
    N: NativeRequest + 'static,
{
    let headers = native.headers();
    if !headers.contains_key(CONTENT_TYPE) {
        return Ok(None);
    }

    let content_length = content_length(headers);
    let http1 = matches!(native.version(), Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11);
    if (http1 && content_length.is_none() && !headers.contains_key(TRANSFER_ENCODING)) || content_length == Some(0) {
        return Ok(None);
    }

    let bound = LengthBound::resolve(content_length, body_size_limit)?;

    if native.is_destroyed() {
        debug!("request already destroyed, handing out a cancelled body");
        return Ok(Some(IncomingBody::cancelled(Box::new(native), bound)));
    }

    Ok(Some(IncomingBody::new(Box::new(native), bound)))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

#[derive(Debug)]
enum State {
    Open,
    Closed,
    /// Holds the error until the consumer observed it.
    Errored(Option<BodyError>),
    Cancelled,
}

/// A native request body exposed as a pull-based [`http_body::Body`].
///
/// Chunks are pulled from the native source only while the consumer polls.
/// Once the consumer holds `high_water_mark` chunks the source is paused, it
/// is resumed on the next poll. Every chunk is counted against the
/// [`LengthBound`]; the chunk that overruns it turns the body into a
/// [`BodyError::SizeExceeded`] and no later chunk is delivered.
///
/// The first terminal event (`end`, `error`, cancellation) settles the body,
/// everything after it is ignored.
pub struct IncomingBody {
    native: Box<dyn NativeRequest>,
    bound: LengthBound,
    bytes_seen: u64,
    queue: VecDeque<Bytes>,
    high_water_mark: usize,
    paused: bool,
    /// Set by an overrun until the source ends, its events are read and dropped.
    draining: bool,
    state: State,
}

impl IncomingBody {
    fn new(native: Box<dyn NativeRequest>, bound: LengthBound) -> Self {
        Self {
            native,
            bound,
            bytes_seen: 0,
            queue: VecDeque::new(),
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            paused: false,
            draining: false,
            state: State::Open,
        }
    }

    fn cancelled(native: Box<dyn NativeRequest>, bound: LengthBound) -> Self {
        let mut body = Self::new(native, bound);
        body.state = State::Cancelled;
        body
    }

    /// Sets how many chunks may be buffered before the source is paused.
    #[must_use]
    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark.max(1);
        self
    }

    pub fn bound(&self) -> LengthBound {
        self.bound
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Returns true once `end`, an error or a cancellation was acted upon.
    pub fn is_settled(&self) -> bool {
        !matches!(self.state, State::Open)
    }

    /// Cancels the body and destroys the native source with `reason`.
    ///
    /// Does nothing if the body is already settled.
    pub fn cancel(&mut self, reason: Option<BoxError>) {
        if self.settle(State::Cancelled) {
            debug!(bytes_seen = self.bytes_seen, "request body cancelled");
            self.queue.clear();
            self.native.destroy(reason);
        }
    }

    fn settle(&mut self, state: State) -> bool {
        if self.is_settled() {
            return false;
        }
        self.state = state;
        true
    }

    fn desired_size(&self) -> isize {
        self.high_water_mark as isize - self.queue.len() as isize
    }

    fn pause_native(&mut self) {
        if !self.paused {
            self.paused = true;
            self.native.pause();
        }
    }

    fn resume_native(&mut self) {
        if self.paused {
            self.paused = false;
            self.native.resume();
        }
    }

    fn on_event(&mut self, event: Option<SourceEvent>) {
        match event {
            Some(SourceEvent::Data(chunk)) => {
                if self.is_settled() {
                    return;
                }

                self.bytes_seen += chunk.len() as u64;
                if !self.bound.admits(self.bytes_seen) {
                    warn!(bytes_seen = self.bytes_seen, bound = %self.bound, "request body exceeded its length bound");
                    self.settle(State::Errored(Some(BodyError::size_exceeded(self.bound))));
                    self.queue.clear();
                    self.draining = true;
                    self.resume_native();
                    return;
                }

                self.queue.push_back(chunk);
                if self.desired_size() <= 0 {
                    self.pause_native();
                }
            }

            Some(SourceEvent::End) => {
                self.settle(State::Closed);
            }

            Some(SourceEvent::Error(e)) => {
                if self.settle(State::Errored(Some(BodyError::native(e)))) {
                    self.queue.clear();
                }
            }

            None => {
                if self.settle(State::Errored(Some(BodyError::Aborted))) {
                    warn!(bytes_seen = self.bytes_seen, "request source went away before end");
                    self.queue.clear();
                }
            }
        }
    }
}

impl IncomingBody {
    /// Reads and drops whatever the source already emitted after an overrun.
    fn drain(&mut self, cx: &mut Context<'_>) {
        let mut discarded = 0_u64;
        while self.draining {
            match self.native.poll_event(cx) {
                Poll::Ready(Some(SourceEvent::Data(chunk))) => discarded += chunk.len() as u64,
                Poll::Ready(Some(SourceEvent::End | SourceEvent::Error(_)) | None) => self.draining = false,
                Poll::Pending => break,
            }
        }
        if discarded > 0 {
            debug!(discarded, "discarded request body data past its length bound");
        }
    }
}

impl Body for IncomingBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        while !this.is_settled() && this.desired_size() > 0 {
            this.resume_native();
            match this.native.poll_event(cx) {
                Poll::Ready(event) => this.on_event(event),
                Poll::Pending => break,
            }
        }

        this.drain(cx);

        if let Some(chunk) = this.queue.pop_front() {
            return Poll::Ready(Some(Ok(Frame::data(chunk))));
        }

        match &mut this.state {
            State::Open => Poll::Pending,
            State::Errored(error) => Poll::Ready(error.take().map(Err)),
            State::Closed | State::Cancelled => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.state {
            State::Open => false,
            State::Closed => self.queue.is_empty(),
            State::Errored(error) => error.is_none(),
            State::Cancelled => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.bound {
            LengthBound::ContentLength(length) => SizeHint::with_exact(length.saturating_sub(self.bytes_seen)),
            LengthBound::Limit(limit) => {
                let mut size_hint = SizeHint::new();
                size_hint.set_upper(limit.saturating_sub(self.bytes_seen));
                size_hint
            }
            LengthBound::Unbounded => SizeHint::new(),
        }
    }
}

/// An unfinished body hands its source back to the runtime flowing, so the
/// rest of the request is drained instead of left paused. An overrun body
/// drops what the source already emitted.
impl Drop for IncomingBody {
    fn drop(&mut self) {
        if self.draining {
            self.drain(&mut Context::from_waker(noop_waker_ref()));
        }
        if !self.is_settled() {
            debug!(bytes_seen = self.bytes_seen, "request body dropped before end, resuming source");
            self.resume_native();
        }
    }
}

impl fmt::Debug for IncomingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingBody")
            .field("bound", &self.bound)
            .field("bytes_seen", &self.bytes_seen)
            .field("queued", &self.queue.len())
            .field("paused", &self.paused)
            .field("draining", &self.draining)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
