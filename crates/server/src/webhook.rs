use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use url::Url;

use crate::{
    app_state::AppState,
    telegram::{TelegramClient, Update},
};

/// Route path the platform posts updates to. The bot token keeps the path
/// unguessable; `:` is replaced since it is not a plain path character for
/// the router.
pub(crate) fn webhook_path(token: &str) -> String {
    format!("/{}", token.replace(':', "_"))
}

pub(crate) fn webhook_url(public_url: &Url, path: &str) -> String {
    format!("{}{path}", public_url.as_str().trim_end_matches('/'))
}

pub(crate) fn build_router(state: Arc<AppState>, path: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(path, post(receive_update))
        .with_state(state)
}

pub(crate) async fn run_webhook(
    state: Arc<AppState>,
    client: &TelegramClient,
    token: &str,
    public_url: &Url,
    listen: SocketAddr,
) -> anyhow::Result<()> {
    let path = webhook_path(token);
    client
        .set_webhook(&webhook_url(public_url, &path))
        .await
        .context("failed to register webhook")?;
    info!(public_url = %public_url, "webhook registered");

    let app = build_router(state, &path);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "webhook server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await?;
    Ok(())
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}

async fn receive_update(State(state): State<Arc<AppState>>, Json(update): Json<Update>) -> StatusCode {
    state.dispatcher.dispatch(&update).await;
    StatusCode::OK
}

#[cfg(test)]
#[path = "tests/webhook_tests.rs"]
mod tests;
