use std::{net::SocketAddr, time::Duration};

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::http::listener::ConnectionOutcome;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub fn log_connection_summary(peer: SocketAddr, outcome: &ConnectionOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;

    info!(
        peer = %peer,
        status = outcome.status(),
        outcome = outcome.label(),
        duration_ms = elapsed_ms,
        "connection summary"
    );

    match outcome {
        ConnectionOutcome::Rejected(reason) => {
            warn!(peer = %peer, reason = %reason, "bad request rejected");
        }
        ConnectionOutcome::TimedOut => {
            warn!(
                peer = %peer,
                duration_ms = elapsed_ms,
                "connection time limit exceeded, socket closed"
            );
        }
        ConnectionOutcome::Failed(err) => {
            warn!(peer = %peer, error = %err, "connection failed");
        }
        ConnectionOutcome::Responded | ConnectionOutcome::Cancelled => {}
    }
}
