use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::body::{IncomingBody, RequestBody};
use crate::protocol::{BoxError, ReaderError};

/// Written in place of a response body whose reader was already taken.
pub const BODY_LOCKED_MESSAGE: &str = "Fatal error: Response body is locked. This can happen when the response body \
     was already read (for example through another reader taken from a clone of the same body).";

/// The body of a standard response.
///
/// A body is either absent or a slot shared by all clones of it. The first
/// [`reader`](ResponseBody::reader) call takes the content out of the slot,
/// from then on the body is locked and every later call fails with
/// [`ReaderError::Locked`].
#[derive(Clone, Default)]
pub struct ResponseBody {
    slot: Option<Arc<Mutex<Option<Kind>>>>,
}

enum Kind {
    Incoming(IncomingBody),
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl ResponseBody {
    /// A response without body.
    pub fn empty() -> Self {
        Self { slot: None }
    }

    pub fn once(bytes: impl Into<Bytes>) -> Self {
        let full = Full::new(bytes.into()).map_err(|never: Infallible| -> BoxError { match never {} });
        Self::from_kind(Kind::Stream(full.boxed_unsync()))
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::from_kind(Kind::Stream(body.map_err(Into::into).boxed_unsync()))
    }

    fn from_kind(kind: Kind) -> Self {
        Self { slot: Some(Arc::new(Mutex::new(Some(kind)))) }
    }

    pub fn is_absent(&self) -> bool {
        self.slot.is_none()
    }

    /// Returns true once a reader has been taken from this body or a clone of it.
    pub async fn is_locked(&self) -> bool {
        match &self.slot {
            Some(slot) => slot.lock().await.is_none(),
            None => false,
        }
    }

    /// Takes the single reader of this body.
    pub async fn reader(&self) -> Result<BodyReader, ReaderError> {
        let slot = self.slot.as_ref().ok_or(ReaderError::Absent)?;
        let kind = slot.lock().await.take().ok_or(ReaderError::Locked)?;
        Ok(BodyReader { kind: Some(kind) })
    }
}

impl From<RequestBody> for ResponseBody {
    fn from(body: RequestBody) -> Self {
        match body.into_incoming() {
            Some(incoming) => Self::from_kind(Kind::Incoming(incoming)),
            None => Self::empty(),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::once(value)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(value)
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        Self::once(value)
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").field("absent", &self.is_absent()).finish_non_exhaustive()
    }
}

/// The single consumer of a [`ResponseBody`].
///
/// `read` is cancel safe: dropping a pending read loses no chunk that was
/// not yet returned.
pub struct BodyReader {
    kind: Option<Kind>,
}

impl BodyReader {
    /// Reads the next chunk, `Ok(None)` once the body is complete or cancelled.
    ///
    /// Trailers are skipped.
    pub async fn read(&mut self) -> Result<Option<Bytes>, BoxError> {
        loop {
            let frame = match self.kind.as_mut() {
                Some(Kind::Incoming(body)) => body.frame().await.map(|result| result.map_err(BoxError::from)),
                Some(Kind::Stream(body)) => body.frame().await,
                None => return Ok(None),
            };

            match frame {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                }
                Some(Err(e)) => {
                    self.kind = None;
                    return Err(e);
                }
                None => {
                    self.kind = None;
                    return Ok(None);
                }
            }
        }
    }

    /// Cancels the body. A body streaming a native request destroys that
    /// request with `reason`, any other body is dropped.
    pub fn cancel(&mut self, reason: Option<BoxError>) {
        match self.kind.take() {
            Some(Kind::Incoming(mut body)) => body.cancel(reason),
            Some(Kind::Stream(_body)) => {
                debug!(reason = ?reason, "response body cancelled");
            }
            None => {}
        }
    }

    pub fn is_finished(&self) -> bool {
        self.kind.is_none()
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReader").field("finished", &self.is_finished()).finish()
    }
}
