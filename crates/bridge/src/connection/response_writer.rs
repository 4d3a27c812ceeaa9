//! Writing a standard response onto a native one.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use tracing::{debug, error, warn};

use crate::native::{NativeResponse, SinkEvent, next_sink_event};
use crate::protocol::body::{BODY_LOCKED_MESSAGE, BodyReader, ResponseBody};
use crate::protocol::{BoxError, ReaderError};

/// Where a response write is, or where it ended.
///
/// `Idle → HeadersWritten → {Streaming ↔ DrainWait} → Ended | Failed`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing was sent yet.
    Idle,
    HeadersWritten,
    Streaming,
    /// The sink reported backpressure, nothing is pulled until it drains.
    DrainWait,
    Ended,
    Failed,
}

impl WriteState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WriteState::Ended | WriteState::Failed)
    }
}

/// Writes status, headers and body of `response` onto `native`.
///
/// The body is streamed chunk by chunk; while `write` reports saturation no
/// further chunk is pulled until the sink emits `drain`. A sink `close` or
/// `error` cancels the body reader, an `error` (from the sink or from the
/// body) also destroys the sink with that error. Returns the terminal state.
///
/// A header the sink refuses turns the whole response into a `500` carrying
/// the error text.
pub async fn set_response<R>(native: &mut R, response: Response<ResponseBody>) -> WriteState
where
    R: NativeResponse + ?Sized,
{
    let (parts, body) = response.into_parts();
    ResponseWriter::new(native).write(parts.status, &parts.headers, body).await
}

enum Step {
    Sink(Option<SinkEvent>),
    Read(Result<Option<Bytes>, BoxError>),
}

struct ResponseWriter<'a, R: ?Sized> {
    native: &'a mut R,
    reader: Option<BodyReader>,
    state: WriteState,
}

impl<'a, R> ResponseWriter<'a, R>
where
    R: NativeResponse + ?Sized,
{
    fn new(native: &'a mut R) -> Self {
        Self { native, reader: None, state: WriteState::Idle }
    }

    async fn write(mut self, status: StatusCode, headers: &HeaderMap, body: ResponseBody) -> WriteState {
        if let Err(e) = self.write_head(status, headers) {
            warn!(cause = %e, "failed to set response header, sending 500 instead");
            for name in self.native.header_names() {
                self.native.remove_header(&name);
            }
            self.native.write_head(StatusCode::INTERNAL_SERVER_ERROR);
            self.native.end(Some(Bytes::from(e.to_string())));
            return WriteState::Failed;
        }
        self.state = WriteState::HeadersWritten;

        match body.reader().await {
            Ok(reader) => self.reader = Some(reader),
            Err(ReaderError::Absent) => {
                self.native.end(None);
                return WriteState::Ended;
            }
            Err(ReaderError::Locked) => {
                error!("response body is locked, it was read before being written");
                self.native.end(Some(Bytes::from_static(BODY_LOCKED_MESSAGE.as_bytes())));
                return WriteState::Ended;
            }
        }

        self.run().await
    }

    /// Copies every value of every header, then sends the head.
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), BoxError> {
        for name in headers.keys() {
            let values: Vec<HeaderValue> = headers.get_all(name).iter().cloned().collect();
            self.native.set_header(name, &values)?;
        }
        self.native.write_head(status);
        Ok(())
    }

    async fn run(mut self) -> WriteState {
        if self.native.is_destroyed() {
            debug!("response destroyed before streaming, cancelling body");
            self.cancel(None);
            return self.state;
        }

        self.state = WriteState::Streaming;
        loop {
            match self.state {
                WriteState::Streaming => self.stream().await,
                WriteState::DrainWait => {
                    let event = next_sink_event(self.native).await;
                    self.on_sink_event(event);
                }
                state => return state,
            }
        }
    }

    async fn stream(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            self.state = WriteState::Failed;
            return;
        };
        let step = {
            let native = &mut *self.native;
            tokio::select! {
                biased;
                event = next_sink_event(native) => Step::Sink(event),
                read = reader.read() => Step::Read(read),
            }
        };

        match step {
            Step::Sink(event) => self.on_sink_event(event),
            Step::Read(Ok(Some(chunk))) => {
                if self.native.is_destroyed() {
                    self.cancel(None);
                } else if !self.native.write(chunk) {
                    self.state = WriteState::DrainWait;
                }
            }
            Step::Read(Ok(None)) => {
                self.native.end(None);
                self.state = WriteState::Ended;
            }
            Step::Read(Err(e)) => {
                warn!(cause = %e, "failed to read response body");
                self.cancel(Some(e));
            }
        }
    }

    fn on_sink_event(&mut self, event: Option<SinkEvent>) {
        match event {
            Some(SinkEvent::Drain) => {
                if self.state == WriteState::DrainWait {
                    self.state = WriteState::Streaming;
                }
            }
            Some(SinkEvent::Close) | None => {
                debug!("response closed before the body finished");
                self.cancel(None);
            }
            Some(SinkEvent::Error(e)) => {
                warn!(cause = %e, "response failed while streaming the body");
                self.cancel(Some(e));
            }
        }
    }

    /// Tears both sides down, only the first call has an effect.
    fn cancel(&mut self, error: Option<BoxError>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = WriteState::Failed;

        if let Some(reader) = &mut self.reader {
            reader.cancel(error.as_ref().map(|e| BoxError::from(e.to_string())));
        }
        if let Some(error) = error {
            self.native.destroy(Some(error));
        }
    }
}
