//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: picks the forwarder or the static
//! responder for a path and writes the access log line.

use crate::config::AppState;
use crate::handler::static_files::{self, StaticRequest};
use crate::http::{self, ResponseBody};
use crate::logger::{self, version_label, AccessLogEntry};
use hyper::body::{Body, Incoming};
use hyper::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, RANGE, REFERER, USER_AGENT};
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

const STATIC_ALLOW: &str = "GET, HEAD, OPTIONS";

/// Handler selected for a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Signin,
    Graphql,
    Static,
}

/// Select the handler for a path. Proxy routes match the exact path only.
pub fn route(path: &str) -> Route {
    match path {
        "/signin" => Route::Signin,
        "/graphql" => Route::Graphql,
        _ => Route::Static,
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let entry = state
        .config
        .logging
        .access_log
        .then(|| access_entry(&req, peer_addr));

    let response = match route(req.uri().path()) {
        Route::Signin => state.signin.forward(req).await,
        Route::Graphql => state.graphql.forward(req).await,
        Route::Static => {
            // Static assets never read the request body
            let (parts, _body) = req.into_parts();
            serve_static(&parts, &state).await
        }
    };

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response.body().size_hint().exact();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Access log entry for the request, completed once the response is known
fn access_entry(req: &Request<Incoming>, peer_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version());
    entry.referer = header_str(req.headers(), REFERER).map(ToString::to_string);
    entry.user_agent = header_str(req.headers(), USER_AGENT).map(ToString::to_string);
    entry
}

async fn serve_static(parts: &Parts, state: &AppState) -> Response<ResponseBody> {
    if let Some(resp) = check_http_method(&parts.method, state.config.http.enable_cors) {
        return resp;
    }

    let headers = &parts.headers;
    let static_req = StaticRequest {
        path: parts.uri.path(),
        query: parts.uri.query(),
        is_head: parts.method == Method::HEAD,
        if_none_match: header_str(headers, IF_NONE_MATCH),
        if_modified_since: header_str(headers, IF_MODIFIED_SINCE),
        range_header: header_str(headers, RANGE),
    };
    static_files::serve(&static_req, &state.config.static_files).await
}

/// Static assets answer GET and HEAD; OPTIONS gets a preflight reply
fn check_http_method(method: &Method, enable_cors: bool) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        Method::OPTIONS => Some(http::build_options_response(STATIC_ALLOW, enable_cors)),
        _ => {
            logger::log_warning(&format!("Method not allowed for static assets: {method}"));
            Some(http::build_405_response(
                STATIC_ALLOW,
                "405 Method Not Allowed",
            ))
        }
    }
}

fn header_str(headers: &HeaderMap, name: hyper::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use hyper_util::rt::TokioIo;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_route_selection() {
        assert_eq!(route("/signin"), Route::Signin);
        assert_eq!(route("/graphql"), Route::Graphql);
        assert_eq!(route("/"), Route::Static);
        assert_eq!(route("/index.html"), Route::Static);
        assert_eq!(route("/signin/x"), Route::Static);
        assert_eq!(route("/graphqlx"), Route::Static);
        assert_eq!(route("/api/graphql"), Route::Static);
    }

    #[test]
    fn test_static_method_check() {
        assert!(check_http_method(&Method::GET, false).is_none());
        assert!(check_http_method(&Method::HEAD, false).is_none());
        let options = check_http_method(&Method::OPTIONS, true).unwrap();
        assert_eq!(options.status(), StatusCode::NO_CONTENT);
        assert_eq!(options.headers()["access-control-allow-origin"], "*");
        let post = check_http_method(&Method::POST, false).unwrap();
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    /// Run the full request handler on an ephemeral port
    async fn spawn_app(state: Arc<AppState>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    return;
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let service =
                        service_fn(move |req| handle_request(req, Arc::clone(&state), peer));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    async fn request(addr: SocketAddr, method: Method, path: &str) -> (StatusCode, Bytes) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "gateway")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_end_to_end_dispatch() {
        let docs = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("index.html"), "<h1>profile</h1>").unwrap();

        // Nothing listens on the upstream; proxy routes must still be reachable
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = closed.local_addr().unwrap();
        drop(closed);

        let config = Config::for_tests(&format!("http://{upstream}/api"), docs.path());
        let state = Arc::new(AppState::new(config).unwrap());
        let app = spawn_app(state).await;

        let (status, body) = request(app, Method::GET, "/index.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>profile</h1>");

        let (status, _) = request(app, Method::GET, "/does-not-exist.xyz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = request(app, Method::GET, "/signin").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "only POST is allowed");

        let (status, body) = request(app, Method::GET, "/graphql").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "only POST is allowed");

        let (status, _) = request(app, Method::POST, "/graphql").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = request(app, Method::POST, "/index.html").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
