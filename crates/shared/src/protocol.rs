use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, ConversationKey, MessageId, UserId};

/// Every command surfaced to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Help,
    Add,
    Delete,
    List,
    Today,
    Cancel,
}

impl Command {
    pub const ALL: [Command; 7] = [
        Command::Start,
        Command::Help,
        Command::Add,
        Command::Delete,
        Command::List,
        Command::Today,
        Command::Cancel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Add => "add",
            Command::Delete => "delete",
            Command::List => "list",
            Command::Today => "today",
            Command::Cancel => "cancel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Command {
        command: Command,
        argument: Option<String>,
    },
    UnknownCommand(String),
    Text(String),
    /// Inline button press; `data` is the raw callback payload.
    Selection {
        callback_id: String,
        message_id: Option<MessageId>,
        data: String,
    },
}

impl EventPayload {
    /// Classifies a chat message as a command (`/name`, `/name@bot`, optional
    /// argument after whitespace) or plain text.
    ///
    /// Returns `None` for `/name@other_bot` when `bot_username` is known and
    /// differs (case-insensitive, leading `@` optional). With no known
    /// username every suffix is accepted.
    pub fn from_message_text(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let Some(rest) = text.trim_start().strip_prefix('/') else {
            return Some(EventPayload::Text(text.to_string()));
        };

        let (head, argument) = match rest.split_once(char::is_whitespace) {
            Some((head, tail)) => (head, Some(tail.trim()).filter(|arg| !arg.is_empty())),
            None => (rest, None),
        };
        let (name, addressee) = match head.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (head, None),
        };
        if let (Some(addressee), Some(username)) = (addressee, bot_username) {
            if !addressee.eq_ignore_ascii_case(username.trim_start_matches('@')) {
                return None;
            }
        }

        Some(match Command::from_name(name) {
            Some(command) => EventPayload::Command {
                command,
                argument: argument.map(str::to_string),
            },
            None => EventPayload::UnknownCommand(name.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub payload: EventPayload,
}

impl InboundEvent {
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.chat_id, self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOption {
    pub label: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Text with one selectable option per row.
    Options {
        text: String,
        options: Vec<ReplyOption>,
    },
    /// Replaces the text of a previously sent message (and drops its options).
    Edit { message_id: MessageId, text: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Options { text, .. } => text,
            Reply::Edit { text, .. } => text,
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
