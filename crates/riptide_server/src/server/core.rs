//! Core server implementation: listener setup and accept loops.
//!
//! One accept loop per listening socket (optionally one per CPU core with
//! SO_REUSEPORT), one spawned task per accepted connection. Each connection
//! task runs its own read/parse/dispatch/respond cycle, so a slow or
//! suspended handler on one connection never blocks another connection's
//! progress.

use crate::config::ServerConfig;
use crate::error::{ServerError, SessionError};
use crate::server::builder::ServerBuilder;
use crate::server::dispatcher::Dispatcher;
use crate::session::{Session, SessionOutcome};
use crate::upgrade;
use futures::stream::{FuturesUnordered, StreamExt as FuturesStreamExt};
use riptide_hub::{Hub, HubStats, ProtocolKind};
use riptide_router::RouteInfo;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::fd::AsRawFd;

/// Point-in-time server statistics. The request counters separate "no route
/// matched" outcomes from handler faults so the two never blur together in
/// telemetry.
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub requests: u64,
    pub routes_not_found: u64,
    pub method_not_allowed: u64,
    pub handler_faults: u64,
    pub cancelled: u64,
    pub active_connections: usize,
    pub hub: HubStats,
}

/// The socket web server: accept loops, sessions, and the hub, owned by one
/// instance. There are no process-wide singletons; two servers in one
/// process stay fully independent.
pub struct RiptideServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown_sender: watch::Sender<bool>,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl RiptideServer {
    /// Starts building a server with the given runtime configuration.
    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub(crate) fn from_parts(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            config,
            dispatcher,
            shutdown_sender,
            cancel: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The hub owning this server's rooms and long-lived connections.
    pub fn hub(&self) -> Arc<Hub> {
        self.dispatcher.hub.clone()
    }

    /// The frozen route table, for documentation generators.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.dispatcher.router.routes().collect()
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> ServerStats {
        let counters = &self.dispatcher.counters;
        ServerStats {
            requests: counters.requests.load(Ordering::Relaxed),
            routes_not_found: counters.not_found.load(Ordering::Relaxed),
            method_not_allowed: counters.method_not_allowed.load(Ordering::Relaxed),
            handler_faults: counters.handler_faults.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            active_connections: self.active.load(Ordering::Relaxed),
            hub: self.dispatcher.hub.stats(),
        }
    }

    /// Starts the server and runs until shutdown.
    ///
    /// Binds the listener(s), then accepts connections until the shutdown
    /// signal fires. On shutdown the accept loops stop, every live
    /// connection's cancellation token trips, and the hub tears its
    /// connections down.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 starting riptide server on {}", self.config.bind_address);
        info!(
            "📋 {} route(s), {} websocket endpoint(s), {} sse endpoint(s)",
            self.dispatcher.router.len(),
            self.dispatcher.ws_routes.len(),
            self.dispatcher.sse_routes.len()
        );

        let core_count = num_cpus::get();
        let num_acceptors = if self.config.use_reuse_port {
            core_count
        } else {
            1
        };
        info!("🧠 {} CPU cores detected, using {} acceptor(s)", core_count, num_acceptors);

        let mut listeners = Vec::new();
        for i in 0..num_acceptors {
            listeners.push(self.create_listener()?);
            info!("✅ listener {} bound on {}", i, self.config.bind_address);
        }

        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        let mut accept_futures = listeners
            .into_iter()
            .map(|listener| {
                let dispatcher = self.dispatcher.clone();
                let cancel = self.cancel.clone();
                let active = self.active.clone();
                let max_connections = self.config.max_connections;

                async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, addr)) => {
                                if max_connections != 0
                                    && active.load(Ordering::Relaxed) >= max_connections
                                {
                                    warn!("connection limit reached, refusing {}", addr);
                                    tokio::spawn(refuse(stream));
                                    continue;
                                }

                                active.fetch_add(1, Ordering::Relaxed);
                                let dispatcher = dispatcher.clone();
                                let conn_cancel = cancel.child_token();
                                let active = active.clone();

                                tokio::spawn(async move {
                                    handle_connection(stream, addr, dispatcher, conn_cancel).await;
                                    active.fetch_sub(1, Ordering::Relaxed);
                                });
                            }
                            Err(e) => {
                                error!("failed to accept connection: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        tokio::select! {
            _ = accept_futures.next() => {}
            _ = shutdown_receiver.changed() => {
                info!("shutdown signal received");
            }
        }

        info!("🧹 closing live connections...");
        self.cancel.cancel();
        self.dispatcher.hub.shutdown();
        info!("server stopped");
        Ok(())
    }

    /// Signals the server to shut down.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 shutting down server...");
        let _ = self.shutdown_sender.send(true);
        Ok(())
    }

    /// Builds one listening socket, with SO_REUSEPORT when configured so
    /// multiple acceptors can share the port.
    fn create_listener(&self) -> Result<TcpListener, ServerError> {
        let domain = Domain::for_address(self.config.bind_address);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Network(format!("socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        if self.config.use_reuse_port {
            #[cfg(unix)]
            {
                let sockfd = socket.as_raw_fd();
                let optval: libc::c_int = 1;
                let ret = unsafe {
                    libc::setsockopt(
                        sockfd,
                        libc::SOL_SOCKET,
                        libc::SO_REUSEPORT,
                        &optval as *const _ as *const libc::c_void,
                        std::mem::size_of_val(&optval) as libc::socklen_t,
                    )
                };
                if ret != 0 {
                    warn!("failed to set SO_REUSEPORT: {}", std::io::Error::last_os_error());
                }
            }
            #[cfg(not(unix))]
            {
                warn!("SO_REUSEPORT is not supported on this platform; using a single acceptor socket");
            }
        }

        socket
            .bind(&self.config.bind_address.into())
            .map_err(|e| ServerError::Network(format!("bind failed: {e}")))?;
        socket
            .listen(65535)
            .map_err(|e| ServerError::Network(format!("listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true).ok();
        TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Network(format!("tokio listener creation failed: {e}")))
    }
}

/// Drives one accepted connection: the HTTP session first, then — if the
/// session upgraded — the connection's hub pumps until disconnect.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    let session = Session::new(stream, addr, dispatcher.clone(), cancel.clone());
    match session.run().await {
        Ok(SessionOutcome::Closed) => {}
        Ok(SessionOutcome::Upgrade(pending)) => match pending.kind {
            ProtocolKind::WebSocket => {
                upgrade::serve_websocket(pending, dispatcher.hub.clone(), cancel).await;
            }
            ProtocolKind::Sse => {
                upgrade::serve_sse(
                    pending,
                    dispatcher.hub.clone(),
                    cancel,
                    dispatcher.sse_ping_interval,
                )
                .await;
            }
        },
        Err(SessionError::Transport(err)) => {
            debug!("connection {} transport fault: {}", addr, err);
        }
        Err(err) => {
            debug!("connection {} ended: {}", addr, err);
        }
    }
}

/// Answers an over-limit connection with a 503 and closes it.
async fn refuse(mut stream: TcpStream) {
    let _ = stream
        .write_all(
            b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
    let _ = stream.shutdown().await;
}
