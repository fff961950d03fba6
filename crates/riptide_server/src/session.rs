//! Per-connection session state machine.
//!
//! Each accepted connection runs one `Session` driving the HTTP
//! request/response cycle:
//!
//! `Accepted -> Reading -> Dispatching -> Responding -> Idle` (looping back
//! to `Reading` on keep-alive), or `Upgraded(WebSocket|SSE)` when a request
//! hands the transport over to the hub, or the terminal `Closed`.
//!
//! The transition into `Upgraded` is one-directional: the HTTP cycle never
//! resumes on that transport. Requests on one connection are processed
//! strictly sequentially, which is what guarantees responses are emitted in
//! the order requests arrived.

use crate::error::SessionError;
use crate::http::{read_request, write_response};
use crate::server::Dispatcher;
use riptide_hub::ProtocolKind;
use riptide_router::{DispatchResult, Identity, PathParams, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::debug;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Reading,
    Dispatching,
    Responding,
    Idle,
    Upgraded(ProtocolKind),
    Closed,
}

/// A request that upgraded its connection; the transport now belongs to the
/// hub's per-connection pumps.
pub struct PendingUpgrade<T> {
    pub transport: T,
    pub kind: ProtocolKind,
    pub remote_addr: SocketAddr,
    pub request: Request,
    pub params: PathParams,
    pub identity: Option<Identity>,
}

/// How a session ended.
pub enum SessionOutcome<T> {
    /// The HTTP cycle finished and the transport was closed.
    Closed,
    /// The connection upgraded; the caller attaches it to the hub.
    Upgrade(PendingUpgrade<T>),
}

/// The per-connection state machine wrapping one duplex transport.
pub struct Session<T> {
    transport: T,
    remote_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    state: SessionState,
    buf: Vec<u8>,
    requests_served: usize,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a freshly accepted transport.
    pub fn new(
        transport: T,
        remote_addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            remote_addr,
            dispatcher,
            cancel,
            state: SessionState::Accepted,
            buf: Vec::with_capacity(1024),
            requests_served: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the request/response cycle until the connection closes or
    /// upgrades.
    ///
    /// Transport faults are returned to the caller; cancellation and
    /// client-class errors end the session with `Closed` after a best-effort
    /// response. Entering `Closed` is idempotent: every exit path funnels
    /// through [`Session::close`].
    pub async fn run(mut self) -> Result<SessionOutcome<T>, SessionError> {
        let cancel = self.cancel.clone();
        let keep_alive = self.dispatcher.keep_alive;

        loop {
            self.state = SessionState::Reading;

            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session {} cancelled while reading", self.remote_addr);
                    self.close().await;
                    return Ok(SessionOutcome::Closed);
                }
                read = timeout(
                    keep_alive,
                    read_request(&mut self.transport, &mut self.buf, &self.dispatcher.limits),
                ) => read,
            };

            let request = match read {
                Err(_) => {
                    debug!("session {} idle past keep-alive window", self.remote_addr);
                    self.close().await;
                    return Ok(SessionOutcome::Closed);
                }
                Ok(Ok(None)) => {
                    self.close().await;
                    return Ok(SessionOutcome::Closed);
                }
                Ok(Ok(Some(request))) => request,
                Ok(Err(SessionError::Malformed(reason))) => {
                    debug!("session {} malformed request: {}", self.remote_addr, reason);
                    let response = self
                        .dispatcher
                        .renderer
                        .render(DispatchResult::Malformed { reason });
                    // Best effort; the transport may already be unusable.
                    let _ = write_response(&mut self.transport, &response, true).await;
                    self.close().await;
                    return Ok(SessionOutcome::Closed);
                }
                Ok(Err(err)) => {
                    self.close().await;
                    return Err(err);
                }
            };

            self.state = SessionState::Dispatching;
            let identity = self.dispatcher.identify(&request);

            if request.is_websocket_upgrade() {
                if let Some(params) = self.dispatcher.match_websocket(&request.path) {
                    return self.upgrade_websocket(request, params, identity).await;
                }
            } else if let Some(params) = self.dispatcher.match_sse(&request.path) {
                if request.method == riptide_router::Method::Get {
                    return self.upgrade_sse(request, params, identity).await;
                }
            }

            let keep =
                request.wants_keep_alive() && !self.request_budget_exhausted();

            let request_cancel = cancel.child_token();
            let Some(result) = self
                .dispatcher
                .dispatch(request, identity, request_cancel)
                .await
            else {
                // Cancelled mid-handler: expected terminal outcome, close
                // without emitting a response.
                self.close().await;
                return Ok(SessionOutcome::Closed);
            };
            let response = self.dispatcher.renderer.render(result);

            self.state = SessionState::Responding;
            if let Err(err) = write_response(&mut self.transport, &response, !keep).await {
                self.close().await;
                return Err(SessionError::Transport(err));
            }
            self.requests_served += 1;

            if !keep {
                self.close().await;
                return Ok(SessionOutcome::Closed);
            }
            self.state = SessionState::Idle;
        }
    }

    /// Whether this connection has used up its request budget (the request
    /// about to be served counts against it; 0 means unlimited).
    fn request_budget_exhausted(&self) -> bool {
        let max = self.dispatcher.max_requests_per_connection;
        max != 0 && self.requests_served + 1 >= max
    }

    /// Completes a WebSocket upgrade: answers the handshake and hands the
    /// transport over. One-directional; the HTTP cycle never resumes here.
    async fn upgrade_websocket(
        mut self,
        request: Request,
        params: PathParams,
        identity: Option<Identity>,
    ) -> Result<SessionOutcome<T>, SessionError> {
        let Some(key) = request.header("sec-websocket-key") else {
            let response = self.dispatcher.renderer.render(DispatchResult::Malformed {
                reason: "websocket upgrade without sec-websocket-key".to_string(),
            });
            let _ = write_response(&mut self.transport, &response, true).await;
            self.close().await;
            return Ok(SessionOutcome::Closed);
        };

        let accept = derive_accept_key(key.as_bytes());
        let handshake = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             upgrade: websocket\r\n\
             connection: Upgrade\r\n\
             sec-websocket-accept: {accept}\r\n\r\n"
        );
        self.transport
            .write_all(handshake.as_bytes())
            .await
            .map_err(SessionError::Transport)?;
        self.transport.flush().await.map_err(SessionError::Transport)?;

        self.state = SessionState::Upgraded(ProtocolKind::WebSocket);
        debug!("session {} upgraded to websocket", self.remote_addr);
        Ok(SessionOutcome::Upgrade(PendingUpgrade {
            transport: self.transport,
            kind: ProtocolKind::WebSocket,
            remote_addr: self.remote_addr,
            request,
            params,
            identity,
        }))
    }

    /// Completes an SSE attach: writes the stream preamble and hands the
    /// transport over.
    async fn upgrade_sse(
        mut self,
        request: Request,
        params: PathParams,
        identity: Option<Identity>,
    ) -> Result<SessionOutcome<T>, SessionError> {
        crate::http::write_sse_preamble(&mut self.transport, 3000)
            .await
            .map_err(SessionError::Transport)?;

        self.state = SessionState::Upgraded(ProtocolKind::Sse);
        debug!("session {} attached as sse stream", self.remote_addr);
        Ok(SessionOutcome::Upgrade(PendingUpgrade {
            transport: self.transport,
            kind: ProtocolKind::Sse,
            remote_addr: self.remote_addr,
            request,
            params,
            identity,
        }))
    }

    /// Marks the session closed and shuts the write side down. Idempotent:
    /// racing close triggers all land here and only the first does work.
    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        let _ = self.transport.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ParseLimits;
    use crate::server::dispatcher::{DispatchCounters, Dispatcher, UpgradeRoute};
    use riptide_hub::Hub;
    use riptide_router::{
        handler, CompiledPattern, HandlerError, JsonErrorRenderer, Method, Response, Router,
    };
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    async fn ping(_ctx: riptide_router::RequestContext) -> Result<Response, HandlerError> {
        Ok(Response::text("pong"))
    }

    async fn boom(_ctx: riptide_router::RequestContext) -> Result<Response, HandlerError> {
        panic!("kaboom")
    }

    async fn echo(ctx: riptide_router::RequestContext) -> Result<Response, HandlerError> {
        Ok(Response::text(
            String::from_utf8_lossy(&ctx.request.body).to_string(),
        ))
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let mut router = Router::new();
        router.register(Method::Get, "/ping", handler(ping)).unwrap();
        router.register(Method::Get, "/boom", handler(boom)).unwrap();
        router.register(Method::Post, "/echo", handler(echo)).unwrap();

        Arc::new(Dispatcher {
            router,
            renderer: Arc::new(JsonErrorRenderer),
            identity: None,
            hub: Hub::builder().build(),
            ws_routes: vec![UpgradeRoute {
                template: "/ws/:room".to_string(),
                pattern: CompiledPattern::compile("/ws/:room").unwrap(),
            }],
            sse_routes: vec![UpgradeRoute {
                template: "/events".to_string(),
                pattern: CompiledPattern::compile("/events").unwrap(),
            }],
            limits: ParseLimits::default(),
            keep_alive: Duration::from_secs(5),
            max_requests_per_connection: 0,
            sse_ping_interval: Duration::from_secs(15),
            counters: DispatchCounters::default(),
        })
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn serves_one_request_and_closes() {
        let (mut client, transport) = duplex(4096);
        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let running = tokio::spawn(session.run());

        client
            .write_all(b"GET /ping HTTP/1.1\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("pong"));

        assert!(matches!(
            running.await.unwrap().unwrap(),
            SessionOutcome::Closed
        ));
    }

    #[tokio::test]
    async fn pipelined_requests_answered_in_order() {
        let (mut client, transport) = duplex(4096);
        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let running = tokio::spawn(session.run());

        // Both requests are on the wire before the first response; the
        // session must answer them strictly in arrival order.
        client
            .write_all(
                b"POST /echo HTTP/1.1\r\ncontent-length: 3\r\n\r\none\
                  POST /echo HTTP/1.1\r\ncontent-length: 3\r\nconnection: close\r\n\r\ntwo",
            )
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();

        let first = text.find("one").expect("first response body");
        let second = text.find("two").expect("second response body");
        assert!(first < second);
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);

        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_close() {
        let (mut client, transport) = duplex(4096);
        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let running = tokio::spawn(session.run());

        client.write_all(b"NOT-HTTP\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        assert!(matches!(
            running.await.unwrap().unwrap(),
            SessionOutcome::Closed
        ));
    }

    #[tokio::test]
    async fn wrong_method_gets_405_with_allow_header() {
        let (mut client, transport) = duplex(4096);
        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let running = tokio::spawn(session.run());

        client
            .write_all(b"POST /ping HTTP/1.1\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(text.contains("allow: GET\r\n"));

        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn handler_panic_becomes_500_and_connection_survives() {
        let (mut client, transport) = duplex(4096);
        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let running = tokio::spawn(session.run());

        client
            .write_all(
                b"GET /boom HTTP/1.1\r\n\r\n\
                  GET /ping HTTP/1.1\r\nconnection: close\r\n\r\n",
            )
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();

        let fault = text.find("HTTP/1.1 500").expect("fault response");
        let ok = text.find("HTTP/1.1 200").expect("follow-up response");
        assert!(fault < ok);
        assert!(text.ends_with("pong"));

        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_session_closes_without_response() {
        let (mut client, transport) = duplex(4096);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = Session::new(transport, addr(), dispatcher(), cancel);

        assert!(matches!(
            session.run().await.unwrap(),
            SessionOutcome::Closed
        ));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn websocket_upgrade_hands_transport_over() {
        let (mut client, transport) = duplex(4096);
        client
            .write_all(
                b"GET /ws/lobby HTTP/1.1\r\n\
                  connection: Upgrade\r\n\
                  upgrade: websocket\r\n\
                  sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();

        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let outcome = session.run().await.unwrap();

        let SessionOutcome::Upgrade(pending) = outcome else {
            panic!("expected upgrade outcome");
        };
        assert_eq!(pending.kind, ProtocolKind::WebSocket);
        assert_eq!(pending.params.get("room").map(String::as_str), Some("lobby"));

        let mut buf = [0u8; 512];
        let read = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..read]);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        // RFC 6455 sample key has a well-known accept value.
        assert!(text.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }

    #[tokio::test]
    async fn websocket_upgrade_without_key_is_malformed() {
        let (mut client, transport) = duplex(4096);
        client
            .write_all(
                b"GET /ws/lobby HTTP/1.1\r\n\
                  connection: Upgrade\r\n\
                  upgrade: websocket\r\n\r\n",
            )
            .await
            .unwrap();

        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        assert!(matches!(
            session.run().await.unwrap(),
            SessionOutcome::Closed
        ));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn upgrade_request_to_plain_route_falls_through_to_dispatch() {
        let (mut client, transport) = duplex(4096);
        client
            .write_all(
                b"GET /ping HTTP/1.1\r\n\
                  connection: Upgrade, close\r\n\
                  upgrade: websocket\r\n\
                  sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();

        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        session.run().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("pong"));
    }

    #[tokio::test]
    async fn sse_route_attaches_stream() {
        let (mut client, transport) = duplex(4096);
        client
            .write_all(b"GET /events HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let session = Session::new(transport, addr(), dispatcher(), CancellationToken::new());
        let outcome = session.run().await.unwrap();

        let SessionOutcome::Upgrade(pending) = outcome else {
            panic!("expected upgrade outcome");
        };
        assert_eq!(pending.kind, ProtocolKind::Sse);

        let mut buf = [0u8; 512];
        let read = client.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..read]);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: text/event-stream"));
        assert!(text.contains("retry: 3000"));
    }
}
