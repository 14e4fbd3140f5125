use std::sync::Arc;

use chrono::{Local, NaiveDate};
use shared::{
    domain::ConversationKey,
    error::{ApiError, ErrorCode},
    protocol::{InboundEvent, Reply},
};
use storage::Storage;

pub mod dialog;
pub mod render;
mod router;

pub use dialog::{AddDialog, ConversationState, DeleteDialog, DialogRegistry};

pub type ApiResult<T> = Result<T, ApiError>;

/// Source of "today" for new tasks and the `/today` listing.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Server-local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Clone)]
pub struct PlannerContext {
    pub storage: Storage,
    pub clock: Arc<dyn Clock>,
}

impl PlannerContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            clock: Arc::new(LocalClock),
        }
    }
}

pub struct Planner {
    ctx: PlannerContext,
    dialogs: DialogRegistry,
}

impl Planner {
    pub fn new(ctx: PlannerContext) -> Self {
        Self {
            ctx,
            dialogs: DialogRegistry::default(),
        }
    }

    pub fn context(&self) -> &PlannerContext {
        &self.ctx
    }

    pub fn dialogs(&self) -> &DialogRegistry {
        &self.dialogs
    }

    pub async fn dialog_state(&self, key: ConversationKey) -> ConversationState {
        self.dialogs.snapshot(key).await
    }

    /// Handles one inbound event to completion. On error the conversation's
    /// dialog state is left exactly as it was before the event.
    pub async fn handle(&self, event: &InboundEvent) -> ApiResult<Vec<Reply>> {
        let key = event.conversation();
        let entry = self.dialogs.entry(key).await;
        let result = {
            let mut state = entry.lock().await;
            let mut next = state.clone();
            let result = router::route(&self.ctx, &mut next, event).await;
            if result.is_ok() {
                *state = next;
            }
            result
        };
        self.dialogs.release(key, entry).await;
        result
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
