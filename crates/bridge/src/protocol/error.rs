use std::error::Error;

use http::uri::InvalidUri;
use thiserror::Error;

use crate::protocol::LengthBound;

/// Boxed error used at the native and handler seams.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("request error: {source}")]
    Request {
        #[from]
        source: RequestError,
    },

    #[error("request body error: {source}")]
    Body {
        #[from]
        source: BodyError,
    },

    #[error("handler error: {source}")]
    Handler { source: BoxError },
}

impl BridgeError {
    pub fn handler<E: Into<BoxError>>(e: E) -> Self {
        Self::Handler { source: e.into() }
    }
}

/// Errors raised while turning a native request into a standard one.
///
/// These happen before any body byte has been read.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Received content-length of {content_length}, but only accept up to {limit} bytes.")]
    ContentLengthExceedsLimit { content_length: u64, limit: u64 },

    #[error("missing host, neither the request target nor the host header carries an authority")]
    MissingHost,

    #[error("invalid request uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid request: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
}

impl RequestError {
    pub fn content_length_exceeds_limit(content_length: u64, limit: u64) -> Self {
        Self::ContentLengthExceedsLimit { content_length, limit }
    }

    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }
}

impl From<InvalidUri> for RequestError {
    fn from(e: InvalidUri) -> Self {
        Self::invalid_uri(e)
    }
}

/// Errors surfaced through a streaming request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body size exceeded {bound}")]
    SizeExceeded { bound: LengthBound },

    /// The native source reported an error, its message is kept as is.
    #[error("{source}")]
    Native { source: BoxError },

    #[error("request body closed before end")]
    Aborted,
}

impl BodyError {
    pub fn size_exceeded(bound: LengthBound) -> Self {
        Self::SizeExceeded { bound }
    }

    pub fn native<E: Into<BoxError>>(e: E) -> Self {
        Self::Native { source: e.into() }
    }
}

/// Why a reader could not be taken from a response body.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum ReaderError {
    #[error("response has no body")]
    Absent,

    #[error("response body is locked")]
    Locked,
}

/// A body size limit that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid body size limit: {input:?}")]
pub struct InvalidLimit {
    input: String,
}

impl InvalidLimit {
    pub(crate) fn new<S: ToString>(input: S) -> Self {
        Self { input: input.to_string() }
    }
}
