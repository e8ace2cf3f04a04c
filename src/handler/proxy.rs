//! Upstream forwarding module
//!
//! Turns an inbound `POST` into an outbound `POST` against one fixed upstream URL.
//! Only `Authorization` and `Content-Type` are copied onto the outbound request;
//! the upstream status, `Content-Type` and body are relayed unchanged. Both bodies
//! are streamed, never collected.

use crate::http::{self, ResponseBody};
use crate::logger;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderName, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Request headers copied to the upstream request. Nothing else is forwarded.
const FORWARDED_HEADERS: [HeaderName; 2] = [AUTHORIZATION, CONTENT_TYPE];

/// HTTP client used for upstream calls (HTTPS, or plain HTTP for local upstreams)
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Incoming>;

/// Build the shared upstream client with webpki roots over the ring provider.
pub fn build_client() -> Result<UpstreamClient, rustls::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(provider)?
        .https_or_http()
        .enable_http1()
        .build();
    Ok(Client::builder(TokioExecutor::new()).build(https))
}

/// Ways a forwarded request can fail before the upstream response head is relayed
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("request body too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("error creating upstream request: {0}")]
    RequestConstruction(#[from] hyper::http::Error),

    #[error("error calling upstream: {0}")]
    UpstreamUnreachable(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    UpstreamTimeout(Duration),
}

impl ForwardError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Plain-text body sent to the caller
    pub const fn message(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed(_) => "only POST is allowed",
            Self::PayloadTooLarge { .. } => "request body too large",
            Self::RequestConstruction(_) => "failed to create upstream request",
            Self::UpstreamUnreachable(_) => "failed to contact upstream",
            Self::UpstreamTimeout(_) => "upstream timed out",
        }
    }

    fn into_response(self) -> Response<ResponseBody> {
        match self {
            Self::MethodNotAllowed(_) => http::build_405_response("POST", self.message()),
            _ => http::build_text_response(self.status(), self.message()),
        }
    }
}

/// Forwarder bound to one upstream endpoint
pub struct Forwarder {
    /// Route label used in logs
    name: &'static str,
    target: Uri,
    client: UpstreamClient,
    timeout: Duration,
    max_body_size: Option<u64>,
}

impl Forwarder {
    pub fn new(
        name: &'static str,
        target: &str,
        client: UpstreamClient,
        timeout: Duration,
        max_body_size: Option<u64>,
    ) -> Result<Self, hyper::http::uri::InvalidUri> {
        Ok(Self {
            name,
            target: target.parse()?,
            client,
            timeout,
            max_body_size,
        })
    }

    pub const fn target(&self) -> &Uri {
        &self.target
    }

    /// Forward one inbound request and produce the caller's response.
    ///
    /// Every failure is logged here and translated into a status code;
    /// nothing is retried.
    pub async fn forward(&self, req: Request<Incoming>) -> Response<ResponseBody> {
        match self.try_forward(req).await {
            Ok(resp) => resp,
            Err(err) => {
                match &err {
                    ForwardError::MethodNotAllowed(_) | ForwardError::PayloadTooLarge { .. } => {
                        logger::log_warning(&format!("[{}] {err}", self.name));
                    }
                    _ => logger::log_error(&format!("[{}] {err}", self.name)),
                }
                err.into_response()
            }
        }
    }

    async fn try_forward(&self, req: Request<Incoming>) -> Result<Response<ResponseBody>, ForwardError> {
        if req.method() != Method::POST {
            return Err(ForwardError::MethodNotAllowed(req.method().clone()));
        }
        self.check_body_size(&req)?;

        let outbound = self.build_outbound(req)?;

        // Dropping the pending call on timeout closes the outbound request and its body
        let upstream = tokio::time::timeout(self.timeout, self.client.request(outbound))
            .await
            .map_err(|_| ForwardError::UpstreamTimeout(self.timeout))??;

        logger::log_debug(&format!(
            "[{}] {} answered {}",
            self.name,
            self.target(),
            upstream.status()
        ));
        Ok(self.relay(upstream))
    }

    /// Reject a declared `Content-Length` above the configured limit
    fn check_body_size(&self, req: &Request<Incoming>) -> Result<(), ForwardError> {
        let Some(max) = self.max_body_size else {
            return Ok(());
        };
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        match declared {
            Some(size) if size > max => Err(ForwardError::PayloadTooLarge { size, max }),
            _ => Ok(()),
        }
    }

    /// Outbound `POST` carrying the inbound body and the whitelisted headers
    fn build_outbound(&self, req: Request<Incoming>) -> Result<Request<Incoming>, ForwardError> {
        let (parts, body) = req.into_parts();

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(self.target.clone());
        for name in &FORWARDED_HEADERS {
            if let Some(value) = parts.headers.get(name).filter(|v| !v.is_empty()) {
                builder = builder.header(name, value.clone());
            }
        }

        Ok(builder.body(body)?)
    }

    /// Relay status, `Content-Type` and the streamed body of the upstream response
    fn relay(&self, upstream: Response<Incoming>) -> Response<ResponseBody> {
        let (parts, body) = upstream.into_parts();
        let name = self.name;

        // Headers are already committed when the body fails midway; only log it
        let body = body
            .map_err(move |e| {
                logger::log_error(&format!("[{name}] upstream body stream failed: {e}"));
                e
            })
            .boxed_unsync();

        let mut resp = Response::new(body);
        *resp.status_mut() = parts.status;
        if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
            resp.headers_mut()
                .insert(CONTENT_TYPE, content_type.clone());
        }
        resp
    }
}
