//! Per-conversation Add and Delete dialogs.
//!
//! Each conversation owns one [`ConversationState`]. Transitions only touch a
//! working copy; [`crate::Planner::handle`] commits it once the event has been
//! handled without error.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{ConversationKey, MessageId, TaskId, UserId},
    error::{ApiError, ErrorCode},
    protocol::Reply,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    internal,
    render::{self, Selection},
    ApiResult, PlannerContext,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddDialog {
    #[default]
    Idle,
    AwaitingInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeleteDialog {
    #[default]
    Idle,
    /// Options were rendered for these task ids.
    AwaitingSelection { offered: Vec<TaskId> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub add: AddDialog,
    pub delete: DeleteDialog,
}

impl ConversationState {
    pub fn is_idle(&self) -> bool {
        self.add == AddDialog::Idle && self.delete == DeleteDialog::Idle
    }
}

/// Conversation id -> dialog state. One lock per conversation, held for the
/// whole event, so events of one conversation never interleave. Only
/// conversations with an active dialog (or an event in flight) keep an entry.
#[derive(Default)]
pub struct DialogRegistry {
    conversations: Mutex<HashMap<ConversationKey, Arc<Mutex<ConversationState>>>>,
}

impl DialogRegistry {
    pub async fn entry(&self, key: ConversationKey) -> Arc<Mutex<ConversationState>> {
        let mut conversations = self.conversations.lock().await;
        conversations.entry(key).or_default().clone()
    }

    pub async fn snapshot(&self, key: ConversationKey) -> ConversationState {
        let entry = {
            let conversations = self.conversations.lock().await;
            conversations.get(&key).cloned()
        };
        match entry {
            Some(entry) => entry.lock().await.clone(),
            None => ConversationState::default(),
        }
    }

    pub async fn set(&self, key: ConversationKey, state: ConversationState) {
        let entry = self.entry(key).await;
        *entry.lock().await = state;
        self.release(key, entry).await;
    }

    /// Gives back a handle from [`DialogRegistry::entry`]. The entry is
    /// dropped when its dialogs are idle and nobody else holds it; handles are
    /// only cloned under the map lock, so the count cannot grow meanwhile.
    pub async fn release(&self, key: ConversationKey, entry: Arc<Mutex<ConversationState>>) {
        let mut conversations = self.conversations.lock().await;
        let Some(current) = conversations.get(&key) else {
            return;
        };
        // map + this handle
        if !Arc::ptr_eq(current, &entry) || Arc::strong_count(&entry) != 2 {
            return;
        }
        let idle = entry
            .try_lock()
            .map(|state| state.is_idle())
            .unwrap_or(false);
        if idle {
            conversations.remove(&key);
            debug!(
                chat_id = key.chat_id.0,
                user_id = key.user_id.0,
                "conversation entry released"
            );
        }
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.lock().await.is_empty()
    }
}

pub(crate) fn begin_add(state: &mut ConversationState) -> Vec<Reply> {
    state.add = AddDialog::AwaitingInput;
    vec![Reply::Text(render::ADD_PROMPT.to_string())]
}

/// `/add <text>`: stores the task without entering the dialog.
pub(crate) async fn add_inline(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    user_id: UserId,
    text: &str,
) -> ApiResult<Vec<Reply>> {
    let reply = insert_task(ctx, user_id, text).await?;
    state.add = AddDialog::Idle;
    Ok(vec![reply])
}

pub(crate) async fn submit_add(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    user_id: UserId,
    text: &str,
) -> ApiResult<Vec<Reply>> {
    if text.trim().is_empty() {
        return Ok(vec![Reply::Text(render::ADD_BLANK_TEXT.to_string())]);
    }
    let reply = insert_task(ctx, user_id, text).await?;
    state.add = AddDialog::Idle;
    Ok(vec![reply])
}

/// Stores `text` exactly as received; surrounding whitespace only matters for
/// the blank check.
async fn insert_task(ctx: &PlannerContext, user_id: UserId, text: &str) -> ApiResult<Reply> {
    if text.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "task text must not be empty",
        ));
    }
    let date = ctx.clock.today();
    let task_id = ctx
        .storage
        .insert(user_id, text, date)
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, task_id = task_id.0, "task added");
    Ok(Reply::Text(render::task_added(text, date)))
}

pub(crate) async fn begin_delete(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    user_id: UserId,
) -> ApiResult<Vec<Reply>> {
    let tasks = ctx.storage.list_all(user_id).await.map_err(internal)?;
    if tasks.is_empty() {
        state.delete = DeleteDialog::Idle;
        return Ok(vec![Reply::Text(render::DELETE_EMPTY.to_string())]);
    }

    let mut by_id = tasks;
    by_id.sort_by_key(|task| task.id);
    state.delete = DeleteDialog::AwaitingSelection {
        offered: by_id.iter().map(|task| task.id).collect(),
    };
    Ok(vec![render::delete_options(&by_id)])
}

pub(crate) async fn select_delete(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    user_id: UserId,
    message_id: Option<MessageId>,
    data: &str,
) -> ApiResult<Vec<Reply>> {
    let DeleteDialog::AwaitingSelection { offered } = &state.delete else {
        return Ok(vec![respond(message_id, render::SELECTION_EXPIRED)]);
    };

    let text = match render::parse_selection(data) {
        Selection::Cancel => render::DELETE_CANCELLED.to_string(),
        Selection::Malformed => {
            debug!(user_id = user_id.0, %data, "malformed delete selection");
            render::TASK_NOT_FOUND.to_string()
        }
        Selection::Delete(task_id) if !offered.contains(&task_id) => {
            render::TASK_NOT_FOUND.to_string()
        }
        Selection::Delete(task_id) => {
            match ctx
                .storage
                .remove_for_user(user_id, task_id)
                .await
                .map_err(internal)?
            {
                Some(task) => {
                    info!(user_id = user_id.0, task_id = task_id.0, "task deleted");
                    render::task_deleted(&task.text)
                }
                None => render::TASK_NOT_FOUND.to_string(),
            }
        }
    };

    state.delete = DeleteDialog::Idle;
    Ok(vec![respond(message_id, &text)])
}

/// Shared `/cancel` fallback: drops whatever dialog is active.
pub(crate) fn cancel(state: &mut ConversationState) -> Vec<Reply> {
    let was_active = !state.is_idle();
    *state = ConversationState::default();
    let text = if was_active {
        render::ACTION_CANCELLED
    } else {
        render::NOTHING_TO_CANCEL
    };
    vec![Reply::Text(text.to_string())]
}

fn respond(message_id: Option<MessageId>, text: &str) -> Reply {
    match message_id {
        Some(message_id) => Reply::Edit {
            message_id,
            text: text.to_string(),
        },
        None => Reply::Text(text.to_string()),
    }
}
