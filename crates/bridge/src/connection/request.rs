//! Building a standard request out of a native one.

use http::header::HOST;
use http::uri::{Authority, PathAndQuery};
use http::{Request, Uri};

use crate::native::NativeRequest;
use crate::protocol::RequestError;
use crate::protocol::body::{RequestBody, raw_body};

/// How request and response bodies share one exchange, stored in the
/// request extensions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Duplex {
    /// The response body does not stream while the request body still does.
    Half,
}

/// Derives the externally visible origin, e.g. `https://example.com`.
///
/// The protocol is the first `x-forwarded-proto` value, else `https` for
/// encrypted sockets, else `http`. The host is the authority of the request
/// target (HTTP/2 `:authority`), else the `host` header.
pub fn derive_base<N>(native: &N) -> Result<String, RequestError>
where
    N: NativeRequest + ?Sized,
{
    let headers = native.headers();

    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let protocol = forwarded.unwrap_or(if native.is_encrypted() { "https" } else { "http" });

    let host = native
        .target()
        .authority()
        .map(Authority::as_str)
        .or_else(|| headers.get(HOST).and_then(|value| value.to_str().ok()))
        .ok_or(RequestError::MissingHost)?;

    Ok(format!("{protocol}://{host}"))
}

/// Builds the standard request for a native one.
///
/// The uri is `base` followed by the path and query of the request target.
/// Method, version and headers are copied, the body comes from [`raw_body`]
/// and the request is marked [`Duplex::Half`].
pub fn get_request<N>(native: N, base: &str, body_size_limit: Option<u64>) -> Result<Request<RequestBody>, RequestError>
where
    N: NativeRequest + 'static,
{
    let path = native.target().path_and_query().map_or("/", PathAndQuery::as_str);
    let uri: Uri = format!("{base}{path}").parse()?;

    let method = native.method().clone();
    let version = native.version();
    let headers = native.headers().clone();

    let body = raw_body(native, body_size_limit)?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .version(version)
        .extension(Duplex::Half)
        .body(RequestBody::from(body))?;
    *request.headers_mut() = headers;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::request_channel;
    use http::{Method, Version};
    use http_body_util::BodyExt;

    #[test]
    fn base_from_host_header() {
        let head = Request::get("/").header("host", "example.com:8080").body(()).unwrap();
        let (request, _emitter) = request_channel(head);
        assert_eq!(derive_base(&request).unwrap(), "http://example.com:8080");

        let head = Request::get("/").header("host", "example.com").body(()).unwrap();
        let (request, _emitter) = request_channel(head);
        assert_eq!(derive_base(&request.encrypted(true)).unwrap(), "https://example.com");
    }

    #[test]
    fn base_prefers_forwarded_proto_and_authority() {
        let head = Request::get("https://origin.example/")
            .version(Version::HTTP_2)
            .header("host", "ignored.example")
            .header("x-forwarded-proto", "https, http")
            .body(())
            .unwrap();
        let (request, _emitter) = request_channel(head);
        assert_eq!(derive_base(&request).unwrap(), "https://origin.example");
    }

    #[test]
    fn base_needs_a_host() {
        let (request, _emitter) = request_channel(Request::get("/").body(()).unwrap());
        assert!(matches!(derive_base(&request), Err(RequestError::MissingHost)));
    }

    #[tokio::test]
    async fn request_carries_target_headers_and_body() {
        let head = Request::builder()
            .method(Method::PUT)
            .uri("/items/7?draft=true")
            .header("host", "example.com")
            .header("content-type", "text/plain")
            .header("content-length", "5")
            .header("set-cookie", "a=1")
            .header("set-cookie", "b=2")
            .body(())
            .unwrap();
        let (native, emitter) = request_channel(head);
        emitter.data("hello");
        emitter.end();

        let request = get_request(native, "http://example.com", None).unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri().to_string(), "http://example.com/items/7?draft=true");
        assert_eq!(request.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(request.extensions().get::<Duplex>(), Some(&Duplex::Half));

        let body = request.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
    }

    #[test]
    fn request_without_content_type_has_absent_body() {
        let head = Request::post("/form").header("content-length", "5").body(()).unwrap();
        let (native, _emitter) = request_channel(head);

        let request = get_request(native, "http://example.com", Some(2)).unwrap();
        assert!(request.body().is_absent());
    }

    #[test]
    fn oversized_request_is_rejected() {
        let head = Request::post("/upload")
            .header("content-type", "application/octet-stream")
            .header("content-length", "1000")
            .body(())
            .unwrap();
        let (native, _emitter) = request_channel(head);

        let error = get_request(native, "http://example.com", Some(500)).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("1000") && message.contains("500"), "{message}");
    }

    #[test]
    fn invalid_base_is_rejected() {
        let (native, _emitter) = request_channel(Request::get("/").body(()).unwrap());
        assert!(matches!(get_request(native, "http://exa mple.com", None), Err(RequestError::InvalidUri { .. })));
    }
}
