//! The `transport` module puts the gateway on the network.
//!
//! - `http`: the axum router mapping requests onto controllers.
//! - `body`: response bodies pulled from subscriptions and publishers.
//!
//! TLS is terminated in front of the gateway; it speaks HTTP/1.1 and
//! cleartext HTTP/2.

pub mod body;
pub mod http;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Settings;
use crate::controller::Gateway;

pub use body::{PullBody, PullSource};
pub use http::{AppState, router};

/// Serves the gateway until the listener fails.
pub async fn start_http_server(settings: &Settings, gateway: Arc<Gateway>) -> std::io::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP gateway listening on http://{}", addr);

    let app = router(AppState::new(gateway, settings));
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests;
