//! Minimal Telegram Bot API client and update decoding.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{ChatId, MessageId, UserId},
    protocol::{EventPayload, InboundEvent, Reply, ReplyOption},
};

use crate::transport::ChatTransport;

/// Extra time granted to a long-poll request on top of the server-side wait.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// `sendMessage`/`editMessageText` reject longer texts. Telegram counts
/// UTF-16 code units.
pub const MESSAGE_TEXT_LIMIT: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
    allowed_updates: &'static [&'static str],
}

#[derive(Serialize)]
struct DeleteWebhook {
    drop_pending_updates: bool,
}

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

/// One button per row, in option order.
pub fn inline_keyboard(options: &[ReplyOption]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: options
            .iter()
            .map(|option| {
                vec![InlineKeyboardButton {
                    text: option.label.clone(),
                    callback_data: option.payload.clone(),
                }]
            })
            .collect(),
    }
}

/// Splits `text` into pieces of at most `limit` UTF-16 units, cutting after
/// the last newline that fits and mid-line only when a single line is too
/// long. The newline at a cut is dropped; whitespace-only pieces are skipped.
pub fn split_message_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.encode_utf16().count() > limit {
        let mut units = 0;
        let mut cut = rest.len();
        for (index, ch) in rest.char_indices() {
            units += ch.len_utf16();
            if units > limit {
                cut = index.max(ch.len_utf8());
                break;
            }
        }

        let split_at = match rest[..cut].rfind('\n') {
            Some(newline) if newline > 0 => newline,
            _ => cut,
        };
        push_chunk(&mut chunks, &rest[..split_at]);
        rest = &rest[split_at..];
        rest = rest.strip_prefix('\n').unwrap_or(rest);
    }

    push_chunk(&mut chunks, rest);
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// One Bot API call needed to deliver a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Send {
        text: String,
        reply_markup: Option<InlineKeyboardMarkup>,
    },
    Edit {
        message_id: MessageId,
        text: String,
    },
}

/// Plans the calls for a reply so that no text exceeds
/// [`MESSAGE_TEXT_LIMIT`]. A keyboard rides on the last piece; an edit
/// replaces the message with the first piece and sends the rest after it.
pub fn outgoing_calls(reply: &Reply) -> Vec<Outgoing> {
    let pieces = split_message_text(reply.text(), MESSAGE_TEXT_LIMIT);
    let last = pieces.len() - 1;

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| match reply {
            Reply::Edit { message_id, .. } if index == 0 => Outgoing::Edit {
                message_id: *message_id,
                text,
            },
            Reply::Options { options, .. } if index == last => Outgoing::Send {
                text,
                reply_markup: Some(inline_keyboard(options)),
            },
            _ => Outgoing::Send {
                text,
                reply_markup: None,
            },
        })
        .collect()
}

/// Maps a Telegram update to an inbound event. Updates without a text
/// message or callback payload, messages from bots, and commands addressed
/// to a bot other than `bot_username` yield `None`.
pub fn inbound_event(update: &Update, bot_username: Option<&str>) -> Option<InboundEvent> {
    if let Some(query) = &update.callback_query {
        let data = query.data.clone()?;
        let chat_id = query
            .message
            .as_ref()
            .map(|message| message.chat.id)
            .unwrap_or(query.from.id);
        return Some(InboundEvent {
            chat_id: ChatId(chat_id),
            user_id: UserId(query.from.id),
            first_name: query.from.first_name.clone(),
            payload: EventPayload::Selection {
                callback_id: query.id.clone(),
                message_id: query.message.as_ref().map(|m| MessageId(m.message_id)),
                data,
            },
        });
    }

    let message = update.message.as_ref()?;
    let from = message.from.as_ref().filter(|user| !user.is_bot)?;
    let text = message.text.as_deref()?;
    Some(InboundEvent {
        chat_id: ChatId(message.chat.id),
        user_id: UserId(from.id),
        first_name: from.first_name.clone(),
        payload: EventPayload::from_message_text(text, bot_username)?,
    })
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    endpoint: String,
}

impl TelegramClient {
    pub fn new(api_base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/bot{token}", api_base_url.trim_end_matches('/')),
        }
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Option<Duration>) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}/{method}", self.endpoint))
            .json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Request urls embed the bot token; keep it out of error messages.
        let response = request
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("telegram {method} request failed"))?;
        let status = response.status();
        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("telegram {method} returned an unreadable body ({status})"))?;

        if !body.ok {
            bail!(
                "telegram {method} failed ({status}): {}",
                body.description.unwrap_or_default()
            );
        }
        body.result
            .with_context(|| format!("telegram {method} returned no result"))
    }

    pub async fn get_updates(&self, offset: Option<i64>, timeout_seconds: u64) -> Result<Vec<Update>> {
        let params = GetUpdates {
            offset,
            timeout: timeout_seconds,
            allowed_updates: ALLOWED_UPDATES,
        };
        self.call(
            "getUpdates",
            &params,
            Some(Duration::from_secs(timeout_seconds) + POLL_GRACE),
        )
        .await
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    pub async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let params = SendMessage {
            chat_id: chat_id.0,
            text,
            reply_markup,
        };
        let _: serde_json::Value = self.call("sendMessage", &params, None).await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<()> {
        let params = EditMessageText {
            chat_id: chat_id.0,
            message_id: message_id.0,
            text,
        };
        let _: serde_json::Value = self.call("editMessageText", &params, None).await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let params = AnswerCallbackQuery { callback_query_id };
        let _: bool = self.call("answerCallbackQuery", &params, None).await?;
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        let params = SetWebhook {
            url,
            allowed_updates: ALLOWED_UPDATES,
        };
        let _: bool = self.call("setWebhook", &params, None).await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        let params = DeleteWebhook {
            drop_pending_updates: false,
        };
        let _: bool = self.call("deleteWebhook", &params, None).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn deliver(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        for call in outgoing_calls(reply) {
            match call {
                Outgoing::Send { text, reply_markup } => {
                    self.send_message(chat_id, &text, reply_markup).await?
                }
                Outgoing::Edit { message_id, text } => {
                    self.edit_message_text(chat_id, message_id, &text).await?
                }
            }
        }
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<()> {
        self.answer_callback_query(callback_id).await
    }
}

#[cfg(test)]
#[path = "tests/telegram_tests.rs"]
mod tests;
