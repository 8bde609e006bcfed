//! TCP accept loop.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{ActiveSession, HandlerContext, RequestHandler};
use crate::settings::SettingsProvider;
use dirsync_engine::{MessageTransport, SyncError, TcpSession, TransferStats};
use dirsync_protocol::MessageType;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// The sync server.
///
/// Each accepted connection runs one session on its own thread.
///
/// # Example
///
/// ```no_run
/// use dirsync_server::{ServerConfig, ServerSettings, SyncServer};
/// use std::sync::Arc;
///
/// let settings = ServerSettings::default();
/// let server = SyncServer::bind(ServerConfig::from_settings(&settings), Arc::new(settings))?;
/// let shutdown = server.shutdown_handle();
/// std::thread::spawn(move || server.serve());
/// // ...
/// shutdown.shutdown();
/// # Ok::<(), dirsync_server::ServerError>(())
/// ```
pub struct SyncServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<RequestHandler>,
    context: Arc<HandlerContext>,
    stopping: Arc<AtomicBool>,
}

/// Stops a running [`SyncServer`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    addr: SocketAddr,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Asks the accept loop to stop. Sessions in progress run to completion.
    pub fn shutdown(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            // Wake the blocking accept.
            if let Err(err) = TcpStream::connect(self.addr) {
                debug!(error = %err, "wake-up connection failed");
            }
        }
    }
}

impl SyncServer {
    /// Binds the listening socket.
    pub fn bind(config: ServerConfig, settings: Arc<dyn SettingsProvider>) -> ServerResult<Self> {
        MessageType::verify_registry().map_err(SyncError::from)?;
        let listener = TcpListener::bind(config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        let context = Arc::new(HandlerContext::new(config, settings));
        let handler = Arc::new(RequestHandler::new(Arc::clone(&context)));
        info!(addr = %local_addr, "listening");
        Ok(Self {
            listener,
            local_addr,
            handler,
            context,
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that stops [`serve`](Self::serve).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
        }
        ShutdownHandle {
            addr,
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Stops the accept loop.
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Sessions currently holding a folder.
    pub fn active_sessions(&self) -> Vec<ActiveSession> {
        self.context.active_sessions()
    }

    /// Runs one session over an already connected transport.
    pub fn handle_connection<T: MessageTransport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> ServerResult<TransferStats> {
        self.handler.handle(transport)
    }

    /// Accepts connections until shut down, then waits for running
    /// sessions.
    pub fn serve(&self) -> ServerResult<()> {
        let session_config = self.context.config.session_config();
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        for stream in self.listener.incoming() {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into());
            let mut session = match TcpSession::from_tcp(stream, &session_config) {
                Ok(session) => session,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "could not set up connection");
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);
            let spawned = thread::Builder::new()
                .name(format!("dirsync-session-{peer}"))
                .spawn(move || {
                    debug!(peer = %peer, "connection accepted");
                    match handler.handle(&mut session) {
                        Ok(_) => debug!(peer = %peer, "connection closed"),
                        Err(err) if err.is_client_error() || err.is_disconnect() => {
                            debug!(peer = %peer, error = %err, "session ended")
                        }
                        Err(err) => error!(peer = %peer, error = %err, "session failed"),
                    }
                });
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(err) => error!(error = %err, "could not spawn session thread"),
            }
            workers.retain(|worker| !worker.is_finished());
        }

        info!(addr = %self.local_addr, "stopping");
        for worker in workers {
            if worker.join().is_err() {
                error!("session thread panicked");
            }
        }
        Ok(())
    }
}
