//! TCP listener, bounded worker pool and per-connection supervision
//!
//! The acceptor never blocks on the pool: every accepted socket gets its own
//! task, which waits for a worker permit and then serves exactly one request
//! under the connection time limit.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Semaphore,
    task::JoinHandle,
    time::{timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::framing::{
    read_request, write_bad_request, write_json_response, FramingError, FramingLimits,
};
use crate::{
    config::MCP_PATH, logging::log_connection_summary, mcp::server::handle_request_body, AppState,
};

/// How long unread request bytes are drained after a rejection, so closing
/// the socket does not reset the 400 response in flight.
const REJECTION_DRAIN_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub path: String,
    pub max_body_bytes: usize,
    pub workers: usize,
    pub connection_timeout: Duration,
    /// Per-line wait for the request head, capped by `connection_timeout`.
    pub header_read_timeout: Duration,
    pub body_read_wait: Duration,
    pub body_read_attempts: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8081)),
            path: MCP_PATH.to_string(),
            max_body_bytes: 10_000,
            workers: 20,
            connection_timeout: Duration::from_secs(120),
            header_read_timeout: Duration::from_secs(10),
            body_read_wait: Duration::from_millis(20),
            body_read_attempts: 50,
        }
    }
}

impl ServerSettings {
    pub fn framing_limits(&self) -> FramingLimits {
        FramingLimits {
            path: self.path.clone(),
            max_body_bytes: self.max_body_bytes,
            header_read_timeout: self.header_read_timeout.min(self.connection_timeout),
            body_read_wait: self.body_read_wait,
            body_read_attempts: self.body_read_attempts,
        }
    }
}

/// How a single connection ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    Responded,
    Rejected(FramingError),
    TimedOut,
    Cancelled,
    Failed(io::Error),
}

impl ConnectionOutcome {
    /// HTTP status written to the peer, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Responded => Some(200),
            Self::Rejected(_) => Some(400),
            Self::TimedOut | Self::Cancelled | Self::Failed(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::Rejected(_) => "rejected",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

struct ConnectionContext {
    state: AppState,
    limits: FramingLimits,
    workers: Semaphore,
    connection_timeout: Duration,
    shutdown: CancellationToken,
}

pub struct McpServer {
    state: AppState,
    settings: ServerSettings,
}

impl McpServer {
    pub fn new(state: AppState, settings: ServerSettings) -> Self {
        Self { state, settings }
    }

    /// Binds the listener and spawns the acceptor.
    pub async fn start(self) -> io::Result<RunningServer> {
        let listener = TcpListener::bind(self.settings.bind).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let context = Arc::new(ConnectionContext {
            state: self.state,
            limits: self.settings.framing_limits(),
            workers: Semaphore::new(self.settings.workers.max(1)),
            connection_timeout: self.settings.connection_timeout,
            shutdown: shutdown.clone(),
        });

        info!(
            addr = %local_addr,
            path = %self.settings.path,
            workers = self.settings.workers,
            connection_timeout_ms = self.settings.connection_timeout.as_millis() as u64,
            "mcp server listening"
        );

        let acceptor = tokio::spawn(accept_loop(listener, context));
        Ok(RunningServer {
            local_addr,
            shutdown,
            acceptor,
        })
    }
}

pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    acceptor: JoinHandle<()>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and cancels in-flight connections.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(err) = self.acceptor.await {
            warn!(error = %err, "acceptor task ended abnormally");
        }
        info!(addr = %self.local_addr, "mcp server stopped");
    }
}

async fn accept_loop(listener: TcpListener, context: Arc<ConnectionContext>) {
    loop {
        let accepted = tokio::select! {
            _ = context.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
                continue;
            }
        };

        let context = Arc::clone(&context);
        tokio::spawn(async move {
            supervise_connection(stream, peer, &context).await;
        });
    }
}

/// Serves one connection under the connection time limit. Expiry or shutdown
/// drops the handler, which closes the socket and abandons any backend call.
async fn supervise_connection(stream: TcpStream, peer: SocketAddr, context: &ConnectionContext) {
    let started = Instant::now();

    let outcome = tokio::select! {
        _ = context.shutdown.cancelled() => ConnectionOutcome::Cancelled,
        served = timeout(context.connection_timeout, serve_with_permit(stream, context)) => {
            served.unwrap_or(ConnectionOutcome::TimedOut)
        }
    };

    log_connection_summary(peer, &outcome, started.elapsed());
}

async fn serve_with_permit(stream: TcpStream, context: &ConnectionContext) -> ConnectionOutcome {
    let Ok(_permit) = context.workers.acquire().await else {
        return ConnectionOutcome::Cancelled;
    };
    serve_connection(stream, &context.state, &context.limits).await
}

async fn serve_connection(
    mut stream: TcpStream,
    state: &AppState,
    limits: &FramingLimits,
) -> ConnectionOutcome {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let outcome = match read_request(&mut reader, limits).await {
        Ok(body) => {
            let response = handle_request_body(state, &body).await;
            match write_json_response(&mut writer, &response).await {
                Ok(()) => ConnectionOutcome::Responded,
                Err(err) => ConnectionOutcome::Failed(err),
            }
        }
        Err(FramingError::Io(err)) => ConnectionOutcome::Failed(err),
        Err(err) => match write_bad_request(&mut writer, err.response_message()).await {
            Ok(()) => {
                let _ = writer.shutdown().await;
                drain_unread(&mut reader).await;
                ConnectionOutcome::Rejected(err)
            }
            Err(io_err) => ConnectionOutcome::Failed(io_err),
        },
    };

    let _ = writer.shutdown().await;
    outcome
}

async fn drain_unread<R>(reader: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 4096];
    let _ = timeout(REJECTION_DRAIN_WAIT, async {
        while let Ok(read) = reader.read(&mut scratch).await {
            if read == 0 {
                break;
            }
        }
    })
    .await;
}
