use std::time::Duration;

use tracing::{info, warn};

use crate::{
    dispatch::Dispatcher,
    telegram::{TelegramClient, Update},
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Offset acknowledging every update in the batch, or the previous offset
/// when the batch is empty.
pub(crate) fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|update| update.update_id + 1)
        .max()
        .max(current)
}

/// Long-polls for updates and dispatches them one at a time, in order.
pub(crate) async fn run_polling(
    client: &TelegramClient,
    dispatcher: &Dispatcher,
    timeout_seconds: u64,
) -> anyhow::Result<()> {
    client.delete_webhook().await?;
    info!(timeout_seconds, "long polling started");

    let mut offset = None;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match client.get_updates(offset, timeout_seconds).await {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                for update in &updates {
                    dispatcher.dispatch(update).await;
                }
                offset = next_offset(offset, &updates);
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), ?backoff, "getUpdates failed; retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
