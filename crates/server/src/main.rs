use std::sync::Arc;

use planner_api::{Planner, PlannerContext};
use storage::Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod dispatch;
mod polling;
mod telegram;
mod transport;
mod webhook;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

use app_state::AppState;
use config::{load_settings, prepare_database_url, DeliveryMode};
use dispatch::Dispatcher;
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let startup = settings
        .bot_token()
        .and_then(|token| Ok((token.to_string(), settings.delivery_mode()?)));
    let (token, mode) = match startup {
        Ok(startup) => startup,
        Err(error) => {
            error!(%error, "invalid configuration; bot not started");
            return Err(error.into());
        }
    };

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let planner = Arc::new(Planner::new(PlannerContext::new(storage.clone())));
    let client = TelegramClient::new(&settings.telegram_api_url, &token);
    let bot_username = match settings.bot_username.clone() {
        Some(username) => Some(username),
        None => match client.get_me().await {
            Ok(me) => me.username,
            Err(error) => {
                warn!(%error, "could not fetch bot username; accepting commands addressed to any bot");
                None
            }
        },
    };
    info!(bot_username = bot_username.as_deref().unwrap_or("unknown"), "bot identity resolved");
    let dispatcher = Dispatcher::new(planner, Arc::new(client.clone()), bot_username);

    match mode {
        DeliveryMode::Polling => {
            tokio::select! {
                result = polling::run_polling(&client, &dispatcher, settings.poll_timeout_seconds) => result?,
                _ = shutdown_signal() => info!("shutdown requested"),
            }
        }
        DeliveryMode::Webhook { public_url, listen } => {
            let state = Arc::new(AppState {
                dispatcher,
                storage,
            });
            webhook::run_webhook(state, &client, &token, &public_url, listen).await?;
        }
    }

    Ok(())
}

pub(crate) async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
