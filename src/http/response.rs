//! HTTP response building module
//!
//! Provides builders for various HTTP status code responses, decoupled from specific business logic.
//! Every handler answers with [`ResponseBody`] so that buffered responses (static files, errors)
//! and streamed upstream bodies share one response type.

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Response, StatusCode};

/// Response body shared by all handlers
pub type ResponseBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// Wrap buffered bytes as a response body
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Empty response body
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Build a plain-text response with the given status
pub fn build_text_response(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(full(message))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            fallback(status, message)
        })
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str, last_modified: Option<&str>) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(304).header("ETag", etag);
    if let Some(date) = last_modified {
        builder = builder.header("Last-Modified", date);
    }
    builder.body(empty()).unwrap_or_else(|e| {
        log_build_error("304", &e);
        Response::new(empty())
    })
}

/// Build 301 redirect response
pub fn build_redirect_response(location: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(301)
        .header("Location", location)
        .header(CONTENT_TYPE, "text/plain")
        .body(full("Moved Permanently"))
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            fallback(StatusCode::MOVED_PERMANENTLY, "Moved Permanently")
        })
}

/// Build 403 Forbidden response
pub fn build_403_response() -> Response<ResponseBody> {
    build_text_response(StatusCode::FORBIDDEN, "403 Forbidden")
}

/// Build 404 Not Found response
pub fn build_404_response() -> Response<ResponseBody> {
    build_text_response(StatusCode::NOT_FOUND, "404 Not Found")
}

/// Build 405 Method Not Allowed response advertising the permitted methods
pub fn build_405_response(allow: &'static str, message: &'static str) -> Response<ResponseBody> {
    let mut resp = build_text_response(StatusCode::METHOD_NOT_ALLOWED, message);
    resp.headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    resp
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(allow: &'static str, enable_cors: bool) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(204).header(ALLOW, allow);

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", allow)
            .header("Access-Control-Allow-Headers", "Content-Type, Range")
            .header("Access-Control-Max-Age", "86400");
    }

    builder.body(empty()).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(empty())
    })
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(file_size: usize) -> Response<ResponseBody> {
    Response::builder()
        .status(416)
        .header(CONTENT_TYPE, "text/plain")
        .header("Content-Range", format!("bytes */{file_size}"))
        .body(full("Range Not Satisfiable"))
        .unwrap_or_else(|e| {
            log_build_error("416", &e);
            fallback(StatusCode::RANGE_NOT_SATISFIABLE, "Range Not Satisfiable")
        })
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<ResponseBody> {
    let content_length = content.len();
    let body = if is_head { empty() } else { full(content) };

    Response::builder()
        .status(200)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header("Content-Length", content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty())
        })
}

/// Validators and cache policy attached to a static file response
pub struct FileHeaders<'a> {
    pub content_type: &'a str,
    pub etag: &'a str,
    pub last_modified: Option<&'a str>,
    pub cache_control: &'a str,
}

/// Build success response with cache control
pub fn build_cached_response(
    data: Bytes,
    headers: &FileHeaders<'_>,
    is_head: bool,
) -> Response<ResponseBody> {
    let content_length = data.len();
    let body = if is_head { empty() } else { full(data) };

    let mut builder = Response::builder()
        .status(200)
        .header(CONTENT_TYPE, headers.content_type)
        .header("Content-Length", content_length)
        .header("Accept-Ranges", "bytes")
        .header("ETag", headers.etag)
        .header("Cache-Control", headers.cache_control);
    if let Some(date) = headers.last_modified {
        builder = builder.header("Last-Modified", date);
    }

    builder.body(body).unwrap_or_else(|e| {
        log_build_error("200", &e);
        Response::new(empty())
    })
}

/// Build 206 Partial Content response
pub fn build_partial_response(
    data: Bytes,
    headers: &FileHeaders<'_>,
    start: usize,
    end: usize,
    total_size: usize,
    is_head: bool,
) -> Response<ResponseBody> {
    let content_length = end - start + 1;
    let body = if is_head { empty() } else { full(data) };

    let mut builder = Response::builder()
        .status(206)
        .header(CONTENT_TYPE, headers.content_type)
        .header("Content-Length", content_length)
        .header("Content-Range", format!("bytes {start}-{end}/{total_size}"))
        .header("Accept-Ranges", "bytes")
        .header("ETag", headers.etag)
        .header("Cache-Control", headers.cache_control);
    if let Some(date) = headers.last_modified {
        builder = builder.header("Last-Modified", date);
    }

    builder.body(body).unwrap_or_else(|e| {
        log_build_error("206", &e);
        Response::new(empty())
    })
}

fn fallback(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    let mut resp = Response::new(full(message));
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_bytes(resp: Response<ResponseBody>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_405_carries_allow_and_message() {
        let resp = build_405_response("POST", "only POST is allowed");
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()[ALLOW], "POST");
        assert_eq!(body_bytes(resp).await, "only POST is allowed");
    }

    #[tokio::test]
    async fn test_head_html_has_length_but_no_body() {
        let resp = build_html_response("<p>hi</p>".to_string(), true);
        assert_eq!(resp.headers()["content-length"], "9");
        assert!(body_bytes(resp).await.is_empty());
    }

    #[test]
    fn test_304_keeps_validators() {
        let resp = build_304_response("\"abc\"", Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(resp.headers()["etag"], "\"abc\"");
        assert_eq!(
            resp.headers()["last-modified"],
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
    }
}
