use std::sync::Arc;

use threadloom_common::{Error, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::{AppState, SharedState};

/// HTTP server exposing the Slack Events API endpoint.
pub struct GatewayServer {
    state: SharedState,
    bind: String,
}

impl GatewayServer {
    pub fn new(state: AppState, bind: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            bind: bind.into(),
        }
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {}: {e}", self.bind)))?;
        info!("gateway listening on {}", self.bind);

        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
