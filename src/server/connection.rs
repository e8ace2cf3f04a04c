// Connection handling module
// Accepts a single TCP connection and serves it on its own task

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;

use super::signal::SignalHandler;
use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Accept a connection, enforcing `max_connections`, and serve it on a spawned task.
///
/// The counter is incremented before the limit check so concurrent accepts
/// cannot both slip under the limit.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    signals: &Arc<SignalHandler>,
) {
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    logger::log_connection_accepted(&peer_addr);

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
        Arc::clone(signals),
    );
}

/// Serve HTTP/1.1 on the stream until the client closes, the header read
/// timeout elapses on an idle connection, or shutdown is requested. On
/// shutdown the in-flight request completes before the connection closes.
///
/// There is no cap on the lifetime of the connection; forwarded requests are
/// bounded by the forwarder's own upstream timeout.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
    signals: Arc<SignalHandler>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let perf = &state.config.performance;

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(Duration::from_secs(perf.read_timeout))
            .keep_alive(perf.keep_alive);

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                handler::handle_request(req, Arc::clone(&service_state), peer_addr)
            }),
        );
        tokio::pin!(conn);

        let shutdown = signals.wait_for_shutdown();
        tokio::pin!(shutdown);

        let result = tokio::select! {
            res = conn.as_mut() => res,
            () = &mut shutdown => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_timeout() => {
                logger::log_debug(&format!(
                    "Connection from {peer_addr} idle for {}s, closing",
                    perf.read_timeout
                ));
            }
            Err(err) => logger::log_connection_error(&err),
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::{create_listener, run};
    use http_body_util::{BodyExt, Full};
    use hyper::body::{Bytes, Incoming};
    use hyper::client::conn::http1::SendRequest;
    use hyper::{Method, Request, Response, StatusCode};
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    /// Upstream answering every request with 200 JSON after `delay`
    async fn spawn_slow_upstream(delay: Duration) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let service = service_fn(move |_req: Request<Incoming>| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(
                            b"{\"data\":{}}",
                        ))))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    async fn start_gateway(config: Config) -> SocketAddr {
        let state = Arc::new(AppState::new(config).unwrap());
        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, state, Arc::new(SignalHandler::new())));
        addr
    }

    async fn connect(addr: SocketAddr) -> SendRequest<Full<Bytes>> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);
        sender
    }

    fn request(method: Method, path: &str) -> Request<Full<Bytes>> {
        let body = if method == Method::POST {
            Bytes::from_static(b"{\"query\":\"{ user { id } }\"}")
        } else {
            Bytes::new()
        };
        Request::builder()
            .method(method)
            .uri(path)
            .header("host", "gateway")
            .header("content-type", "application/json")
            .body(Full::new(body))
            .unwrap()
    }

    async fn send(
        sender: &mut SendRequest<Full<Bytes>>,
        req: Request<Full<Bytes>>,
    ) -> hyper::Result<(StatusCode, Bytes)> {
        sender.ready().await?;
        let resp = sender.send_request(req).await?;
        let status = resp.status();
        let body = resp.into_body().collect().await?.to_bytes();
        Ok((status, body))
    }

    #[tokio::test]
    async fn test_keep_alive_outlives_read_timeout() {
        let docs = tempfile::tempdir().unwrap();
        let upstream = spawn_slow_upstream(Duration::from_millis(700)).await;
        let mut config = Config::for_tests(&format!("http://{upstream}/api"), docs.path());
        config.performance.read_timeout = 1;
        config.upstream.timeout_secs = 2;
        let gateway = start_gateway(config).await;

        // Three round trips on one connection take well over read_timeout
        let mut sender = connect(gateway).await;
        for i in 0..3 {
            let (status, body) = send(&mut sender, request(Method::POST, "/graphql"))
                .await
                .unwrap_or_else(|e| panic!("request {i} got no response: {e}"));
            assert_eq!(status, StatusCode::OK, "request {i}");
            assert_eq!(body, "{\"data\":{}}");
        }
    }

    #[tokio::test]
    async fn test_forwarded_request_longer_than_read_timeout() {
        let docs = tempfile::tempdir().unwrap();
        let upstream = spawn_slow_upstream(Duration::from_secs(2)).await;
        let mut config = Config::for_tests(&format!("http://{upstream}/api"), docs.path());
        config.performance.read_timeout = 1;
        config.upstream.timeout_secs = 5;
        let gateway = start_gateway(config).await;

        let mut sender = connect(gateway).await;
        let (status, _) = send(&mut sender, request(Method::POST, "/signin"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connections_over_limit_are_rejected() {
        let docs = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("index.html"), "home").unwrap();
        let mut config = Config::for_tests("http://127.0.0.1:9/api", docs.path());
        config.performance.max_connections = Some(1);
        let gateway = start_gateway(config).await;

        let mut first = connect(gateway).await;
        let (status, _) = send(&mut first, request(Method::GET, "/")).await.unwrap();
        assert_eq!(status, StatusCode::OK);

        // The first connection is still open, so the second one is dropped on accept
        let mut second = connect(gateway).await;
        assert!(send(&mut second, request(Method::GET, "/")).await.is_err());

        // Closing the first connection frees the slot
        drop(first);
        let mut admitted = false;
        for _ in 0..40 {
            let mut retry = connect(gateway).await;
            if let Ok((status, _)) = send(&mut retry, request(Method::GET, "/")).await {
                assert_eq!(status, StatusCode::OK);
                admitted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(admitted);
    }
}
