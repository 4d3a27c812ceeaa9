use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use crate::protocol::BodyError;
use crate::protocol::BoxError;
use crate::protocol::body::IncomingBody;

/// The body of a standard request, absent when the native request has none.
#[derive(Debug, Default)]
pub struct RequestBody {
    inner: Option<IncomingBody>,
}

impl RequestBody {
    pub fn absent() -> Self {
        Self { inner: None }
    }

    pub fn is_absent(&self) -> bool {
        self.inner.is_none()
    }

    pub fn incoming(&self) -> Option<&IncomingBody> {
        self.inner.as_ref()
    }

    pub fn into_incoming(self) -> Option<IncomingBody> {
        self.inner
    }

    /// Cancels the body, destroying the native request with `reason`.
    pub fn cancel(&mut self, reason: Option<BoxError>) {
        if let Some(incoming) = &mut self.inner {
            incoming.cancel(reason);
        }
    }
}

impl From<IncomingBody> for RequestBody {
    fn from(incoming: IncomingBody) -> Self {
        Self { inner: Some(incoming) }
    }
}

impl From<Option<IncomingBody>> for RequestBody {
    fn from(inner: Option<IncomingBody>) -> Self {
        Self { inner }
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Some(incoming) => Pin::new(incoming).poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.as_ref().is_none_or(Body::is_end_stream)
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.as_ref().map_or_else(|| SizeHint::with_exact(0), Body::size_hint)
    }
}
