use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use planner_api::{FixedClock, Planner, PlannerContext};
use shared::{
    domain::{parse_date, ChatId},
    protocol::Reply,
};
use storage::Storage;

use crate::{dispatch::Dispatcher, telegram::Update, transport::ChatTransport};

const TEST_BOT_USERNAME: &str = "planner_bot";

#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub(crate) delivered: Mutex<Vec<(ChatId, Reply)>>,
    pub(crate) acknowledged: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub(crate) fn replies(&self) -> Vec<(ChatId, Reply)> {
        self.delivered.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn deliver(&self, chat_id: ChatId, reply: &Reply) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .expect("lock")
            .push((chat_id, reply.clone()));
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> anyhow::Result<()> {
        self.acknowledged
            .lock()
            .expect("lock")
            .push(callback_id.to_string());
        Ok(())
    }
}

pub(crate) async fn test_dispatcher() -> (Dispatcher, Arc<RecordingTransport>, Storage) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let planner = Arc::new(Planner::new(PlannerContext {
        storage: storage.clone(),
        clock: Arc::new(FixedClock(parse_date("2024-05-01").expect("date"))),
    }));
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(
        planner,
        transport.clone(),
        Some(TEST_BOT_USERNAME.to_string()),
    );
    (dispatcher, transport, storage)
}

pub(crate) fn message_json(update_id: i64, user_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id * 10,
            "date": 1714550400,
            "from": { "id": user_id, "is_bot": false, "first_name": "Ada" },
            "chat": { "id": user_id, "type": "private" },
            "text": text
        }
    })
}

pub(crate) fn callback_json(update_id: i64, user_id: i64, message_id: i64, data: &str) -> serde_json::Value {
    serde_json::json!({
        "update_id": update_id,
        "callback_query": {
            "id": format!("cb-{update_id}"),
            "from": { "id": user_id, "is_bot": false, "first_name": "Ada" },
            "chat_instance": "1",
            "message": {
                "message_id": message_id,
                "date": 1714550400,
                "chat": { "id": user_id, "type": "private" },
                "text": "🗑️ Choose a task to delete:"
            },
            "data": data
        }
    })
}

pub(crate) fn update(value: serde_json::Value) -> Update {
    serde_json::from_value(value).expect("update json")
}
