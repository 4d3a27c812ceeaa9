//! The entry point: driving a [`Handler`] for one native exchange.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::{Response, StatusCode};
use tracing::{error, info, warn};

use super::request::{derive_base, get_request};
use super::response_writer::{WriteState, set_response};
use crate::handler::Handler;
use crate::native::{NativeRequest, NativeResponse};
use crate::protocol::body::ResponseBody;
use crate::protocol::{BodySizeLimit, BridgeError, RequestError};

/// Adapts a [`Handler`] to native request/response pairs.
///
/// Every exchange is turned into a standard request, passed to the handler,
/// and the handler's response is written back. Failures before the handler
/// runs are answered with `413` for a declared length over the limit and
/// `400` otherwise. A failing handler is answered with `500`. In every case
/// the error is also returned to the caller.
#[derive(Debug)]
pub struct NativeHandler<H> {
    handler: H,
    body_size_limit: BodySizeLimit,
}

impl<H: Handler> NativeHandler<H> {
    pub fn new(handler: H) -> Self {
        Self { handler, body_size_limit: BodySizeLimit::UNLIMITED }
    }

    pub fn builder(handler: H) -> NativeHandlerBuilder<H> {
        NativeHandlerBuilder { handler, body_size_limit: BodySizeLimit::UNLIMITED }
    }

    pub fn body_size_limit(&self) -> BodySizeLimit {
        self.body_size_limit
    }

    /// Handles one exchange, returning how the response write ended.
    pub async fn handle<Req, Res>(&self, req: Req, res: &mut Res) -> Result<WriteState, BridgeError>
    where
        Req: NativeRequest + 'static,
        Res: NativeResponse + ?Sized,
    {
        let request = match derive_base(&req).and_then(|base| get_request(req, &base, self.body_size_limit.get())) {
            Ok(request) => request,
            Err(e) => {
                warn!(cause = %e, "rejecting native request");
                set_response(res, error_response(request_error_status(&e))).await;
                return Err(e.into());
            }
        };

        info!(method = %request.method(), uri = %request.uri(), "handling request");

        let result = self.handler.call(request).await.map_err(BridgeError::handler);
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!(cause = %e, "handler failed");
                set_response(res, error_response(StatusCode::INTERNAL_SERVER_ERROR)).await;
                return Err(e);
            }
        };

        Ok(set_response(res, response).await)
    }

    /// Turns this handler into a cloneable function over owned native pairs.
    pub fn into_fn<Req, Res>(self) -> impl Fn(Req, Res) -> BoxFuture<'static, Result<WriteState, BridgeError>> + Clone + Send + Sync
    where
        H: 'static,
        Req: NativeRequest + 'static,
        Res: NativeResponse + 'static,
    {
        let this = Arc::new(self);
        move |req: Req, mut res: Res| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.handle(req, &mut res).await })
        }
    }
}

#[derive(Debug)]
pub struct NativeHandlerBuilder<H> {
    handler: H,
    body_size_limit: BodySizeLimit,
}

impl<H: Handler> NativeHandlerBuilder<H> {
    /// Caps request bodies, `0` (the default) means no cap.
    #[must_use]
    pub fn body_size_limit(mut self, limit: impl Into<BodySizeLimit>) -> Self {
        self.body_size_limit = limit.into();
        self
    }

    pub fn build(self) -> NativeHandler<H> {
        NativeHandler { handler: self.handler, body_size_limit: self.body_size_limit }
    }
}

/// Converts a [`Handler`] into a function usable as a native request
/// listener, without a body size limit.
pub fn to_native_handler<H, Req, Res>(
    handler: H,
) -> impl Fn(Req, Res) -> BoxFuture<'static, Result<WriteState, BridgeError>> + Clone + Send + Sync
where
    H: Handler + 'static,
    Req: NativeRequest + 'static,
    Res: NativeResponse + 'static,
{
    NativeHandler::new(handler).into_fn()
}

fn request_error_status(e: &RequestError) -> StatusCode {
    match e {
        RequestError::ContentLengthExceedsLimit { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn error_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::make_handler;
    use crate::native::{request_channel, response_channel};
    use crate::protocol::BoxError;
    use crate::protocol::body::RequestBody;
    use http::Request;
    use std::convert::Infallible;

    async fn echo(req: Request<RequestBody>) -> Result<Response<ResponseBody>, Infallible> {
        let (parts, body) = req.into_parts();
        let mut response = Response::new(ResponseBody::from(body));
        if let Some(content_type) = parts.headers.get("content-type") {
            response.headers_mut().insert("content-type", content_type.clone());
        }
        Ok(response)
    }

    fn upload(content_length: &str) -> Request<()> {
        Request::post("/upload")
            .header("host", "example.com")
            .header("content-type", "text/plain")
            .header("content-length", content_length)
            .body(())
            .unwrap()
    }

    #[tokio::test]
    async fn echoes_request_body() {
        let handler = NativeHandler::builder(make_handler(echo)).body_size_limit(1024_u64).build();
        let (request, emitter) = request_channel(upload("11"));
        let (mut response, observer) = response_channel(1024);

        emitter.data("hello ");
        emitter.data("world");
        emitter.end();

        assert_eq!(handler.handle(request, &mut response).await.unwrap(), WriteState::Ended);

        let transcript = observer.collect().await;
        assert_eq!(transcript.status, Some(StatusCode::OK));
        assert_eq!(transcript.headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(transcript.body_str(), "hello world");
    }

    #[tokio::test]
    async fn declared_length_over_limit_is_413() {
        let handler = NativeHandler::builder(make_handler(echo)).body_size_limit("500".parse::<BodySizeLimit>().unwrap()).build();
        let (request, _emitter) = request_channel(upload("1000"));
        let (mut response, observer) = response_channel(1024);

        let error = handler.handle(request, &mut response).await.unwrap_err();
        assert!(matches!(error, BridgeError::Request { source: RequestError::ContentLengthExceedsLimit { .. } }));

        let transcript = observer.collect().await;
        assert_eq!(transcript.status, Some(StatusCode::PAYLOAD_TOO_LARGE));
        assert!(transcript.ended);
    }

    #[tokio::test]
    async fn missing_host_is_400() {
        let handler = NativeHandler::new(make_handler(echo));
        let (request, _emitter) = request_channel(Request::get("/").body(()).unwrap());
        let (mut response, observer) = response_channel(1024);

        let error = handler.handle(request, &mut response).await.unwrap_err();
        assert!(matches!(error, BridgeError::Request { source: RequestError::MissingHost }));
        assert_eq!(observer.collect().await.status, Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn failing_handler_is_500() {
        let handler = NativeHandler::new(make_handler(|_req: Request<RequestBody>| async {
            Err::<Response<ResponseBody>, BoxError>("database unavailable".into())
        }));
        let (request, _emitter) = request_channel(Request::get("/items").header("host", "example.com").body(()).unwrap());
        let (mut response, observer) = response_channel(1024);

        let error = handler.handle(request, &mut response).await.unwrap_err();
        assert_eq!(error.to_string(), "handler error: database unavailable");

        let transcript = observer.collect().await;
        assert_eq!(transcript.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(transcript.body.is_empty());
    }

    #[tokio::test]
    async fn native_handler_fn_serves_many_exchanges() {
        let listener = to_native_handler(make_handler(|req: Request<RequestBody>| async move {
            Ok::<_, Infallible>(Response::new(ResponseBody::from(req.uri().to_string())))
        }));

        for path in ["/a", "/b?c=d"] {
            let (request, _emitter) = request_channel(Request::get(path).header("host", "example.com").body(()).unwrap());
            let (response, observer) = response_channel(1024);

            let listener = listener.clone();
            let exchange = tokio::spawn(listener(request, response));
            let transcript = observer.collect().await;
            assert_eq!(exchange.await.unwrap().unwrap(), WriteState::Ended);
            assert_eq!(transcript.body_str(), format!("http://example.com{path}"));
        }
    }
}
