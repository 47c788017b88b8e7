//! TCP acceptor.
//!
//! Accepts connections speaking the ZooKeeper client protocol and spawns
//! one [`Session`] per connection. A session failure never affects the
//! acceptor or other sessions. On shutdown the listener stops accepting
//! and every active session is signalled and joined.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use zkgate_backend::KvClient;

use crate::buffer::BufferPool;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::session::Session;
use crate::task::Dying;

/// How long a fresh connection gets to present its ConnectRequest.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the bridge server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Handshake deadline; tests shorten this.
    pub handshake_timeout: Duration,
}

impl ServerConfig {
    /// Creates a config with default timeouts.
    #[must_use]
    pub const fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Overrides the handshake deadline.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Triggers a graceful server shutdown: stop accepting, drain sessions.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signals the server to shut down. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// The bridge server: listener plus shared session resources.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<BufferPool>,
    config: ServerConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Binds the listener and prepares the shared state.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub fn bind(config: ServerConfig, client: Arc<dyn KvClient>) -> Result<Self, ServerError> {
        let listener = create_reusable_listener(config.bind_addr)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener,
            dispatcher: Arc::new(Dispatcher::new(client)),
            pool: Arc::new(BufferPool::for_frames()),
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// The actual bound address (useful with port 0).
    ///
    /// # Errors
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle to trigger graceful shutdown from elsewhere.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// The frame buffer pool shared by all sessions.
    #[must_use]
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        Arc::clone(&self.pool)
    }

    /// Accepts connections until shutdown, then joins every session.
    ///
    /// # Errors
    /// Currently only fatal listener errors; individual accept failures
    /// are logged and retried.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.config.bind_addr, "bridge listening");

        let mut shutdown = Dying::new(self.shutdown_tx.subscribe());
        let mut sessions: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            info!(peer = %peer_addr, "client connected");
                            let session = Session::new(
                                stream,
                                peer_addr,
                                Arc::clone(&self.dispatcher),
                                Arc::clone(&self.pool),
                                self.config.handshake_timeout,
                                Dying::new(self.shutdown_tx.subscribe()),
                            );
                            sessions.spawn(run_session(session, peer_addr));
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                // Reap finished sessions so the set stays small.
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                () = shutdown.wait() => {
                    info!("shutting down, joining sessions");
                    break;
                }
            }
        }

        // Sessions observe the same shutdown signal; wait them out.
        while sessions.join_next().await.is_some() {}
        info!("bridge stopped");
        Ok(())
    }
}

/// Runs one session and logs its outcome.
async fn run_session(session: Session, peer_addr: SocketAddr) {
    match session.run().await {
        Ok(()) => info!(peer = %peer_addr, "client disconnected"),
        Err(e) if e.is_disconnect() => {
            info!(peer = %peer_addr, "client disconnected (connection lost)");
        }
        Err(e) => warn!(peer = %peer_addr, error = %e, "session failed"),
    }
}

/// Creates a TCP listener with `SO_REUSEADDR` enabled, so restarts can
/// bind while the old socket is still in `TIME_WAIT`.
fn create_reusable_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}
