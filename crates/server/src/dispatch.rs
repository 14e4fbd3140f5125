use std::sync::Arc;

use planner_api::{render, Planner};
use shared::{
    error::ErrorCode,
    protocol::{EventPayload, Reply},
};
use tracing::{debug, error, warn};

use crate::{
    telegram::{inbound_event, Update},
    transport::ChatTransport,
};

/// Runs one update through the planner and delivers the replies.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    planner: Arc<Planner>,
    transport: Arc<dyn ChatTransport>,
    /// Commands suffixed with another bot's name are ignored.
    bot_username: Option<String>,
}

impl Dispatcher {
    pub(crate) fn new(
        planner: Arc<Planner>,
        transport: Arc<dyn ChatTransport>,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            planner,
            transport,
            bot_username,
        }
    }

    pub(crate) async fn dispatch(&self, update: &Update) {
        let Some(event) = inbound_event(update, self.bot_username.as_deref()) else {
            debug!(update_id = update.update_id, "ignoring unsupported update");
            return;
        };

        if let EventPayload::Selection { callback_id, .. } = &event.payload {
            if let Err(error) = self.transport.acknowledge(callback_id).await {
                warn!(%error, "failed to acknowledge callback query");
            }
        }

        let replies = match self.planner.handle(&event).await {
            Ok(replies) => replies,
            Err(err) if err.code == ErrorCode::Validation => vec![Reply::Text(err.message)],
            Err(err) => {
                error!(
                    update_id = update.update_id,
                    user_id = event.user_id.0,
                    error = %err,
                    "failed to handle event"
                );
                vec![Reply::Text(render::TRY_AGAIN.to_string())]
            }
        };

        for reply in &replies {
            if let Err(error) = self.transport.deliver(event.chat_id, reply).await {
                warn!(chat_id = event.chat_id.0, %error, "failed to deliver reply");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
