use async_trait::async_trait;
use shared::{domain::ChatId, protocol::Reply};

/// Outbound side of a chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends (or edits) one reply in the given chat.
    async fn deliver(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()>;

    /// Acknowledges a button press so the client stops its loading state.
    async fn acknowledge(&self, callback_id: &str) -> anyhow::Result<()>;
}
