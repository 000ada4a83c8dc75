//! Accept peer connections and serve them one at a time.

use anyhow::{Context, Result};
use pairlink_client::LanTransport;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{print_events, session, Peer};

/// Default control port.
pub const DEFAULT_PORT: u16 = 1716;

/// Listen on `addr` until Ctrl-C.
pub async fn run(data_dir: &Path, peer: &Peer, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("Listening on {}", listener.local_addr()?);
    println!("Press Ctrl+C to stop.");

    tokio::select! {
        result = serve(data_dir, peer, &listener) => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Shutting down...");
            Ok(())
        }
    }
}

/// Serve connections from `listener` sequentially.
pub async fn serve(data_dir: &Path, peer: &Peer, listener: &TcpListener) -> Result<()> {
    loop {
        let transport = match LanTransport::accept(listener).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let session = session(data_dir, peer, Arc::new(transport))?;
        info!(device = %session.context().device, "peer connected");
        let printer = tokio::spawn(print_events(session.subscribe()));

        if let Err(e) = session.run().await {
            warn!(error = %e, "session ended with error");
        }
        printer.abort();
        info!(device = %session.context().device, "peer disconnected");
    }
}
