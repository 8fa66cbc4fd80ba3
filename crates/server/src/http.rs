use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bootstrap::Application;
use crate::{health, metrics_api};

pub fn router(app: &Application) -> Router {
    health::router(app.db_pool.clone()).merge(metrics_api::router(app.driver.clone()))
}

/// Binds the listener and serves `router` until `shutdown` flips to `true`.
pub async fn spawn(
    bind_address: &str,
    port: u16,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<JoinHandle<()>> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    Ok(tokio::spawn(async move {
        let signal = async move {
            let _ = shutdown.wait_for(|stopping| *stopping).await;
        };
        if let Err(error) = axum::serve(listener, router).with_graceful_shutdown(signal).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http endpoint terminated unexpectedly"
            );
        }
    }))
}
