//! The opaque request handler driven by the bridge.
//!
//! A [`Handler`] maps a standard request to a standard response, possibly
//! after arbitrary asynchronous work. [`make_handler`] turns an async function
//! into one.

use std::future::Future;

use async_trait::async_trait;
use http::{Request, Response};

use crate::protocol::BoxError;
use crate::protocol::body::{RequestBody, ResponseBody};

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<BoxError>;

    async fn call(&self, req: Request<RequestBody>) -> Result<Response<ResponseBody>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut, Err> Handler for HandlerFn<F>
where
    F: Fn(Request<RequestBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>> + Send,
    Err: Into<BoxError> + Send,
{
    type Error = Err;

    async fn call(&self, req: Request<RequestBody>) -> Result<Response<ResponseBody>, Self::Error> {
        (self.f)(req).await
    }
}

pub fn make_handler<F, Fut, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<RequestBody>) -> Fut,
    Fut: Future<Output = Result<Response<ResponseBody>, Err>>,
    Err: Into<BoxError>,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::convert::Infallible;

    #[tokio::test]
    async fn handler_from_async_fn() {
        let handler = make_handler(|req: Request<RequestBody>| async move {
            let status = if req.body().is_absent() { StatusCode::NO_CONTENT } else { StatusCode::OK };
            let mut response = Response::new(ResponseBody::empty());
            *response.status_mut() = status;
            Ok::<_, Infallible>(response)
        });

        let request = Request::new(RequestBody::absent());
        let response = handler.call(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
