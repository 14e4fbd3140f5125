//! User-facing message text and inline-option payloads.

use chrono::NaiveDate;
use shared::{
    domain::{format_date, Task, TaskId},
    protocol::{Reply, ReplyOption},
};

/// Characters of task text shown on a delete option before it is cut.
pub const DISPLAY_TEXT_LIMIT: usize = 30;
pub const CANCEL_PAYLOAD: &str = "cancel";
const DELETE_PAYLOAD_PREFIX: &str = "delete_";

pub const HELP: &str = "📋 Available commands:\n\n\
/add - Add a new task\n\
Example: /add Finish the math homework\n\n\
/delete - Delete a task (shows a list to choose from)\n\n\
/list - Show all tasks\n\n\
/today - Tasks for today\n\n\
/cancel - Cancel the current action\n\n\
/help - This help";

pub const ADD_PROMPT: &str = "📝 Write your task:\n\
For example: 'Prepare the presentation for Monday'\n\n\
Or send /cancel to cancel";
pub const ADD_BLANK_TEXT: &str = "📝 The task text is empty. Write your task or send /cancel.";
pub const LIST_EMPTY: &str = "📭 You have no tasks yet!";
pub const DELETE_EMPTY: &str = "📭 No tasks to delete!";
pub const DELETE_PROMPT: &str = "🗑️ Choose a task to delete:";
pub const DELETE_CANCELLED: &str = "🚫 Deletion cancelled";
pub const TASK_NOT_FOUND: &str = "⚠️ Task not found!";
pub const SELECTION_EXPIRED: &str = "⌛ This selection has expired. Send /delete to pick again.";
pub const ACTION_CANCELLED: &str = "🚫 Action cancelled";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel.";
pub const TEXT_OUTSIDE_DIALOG: &str = "To add a task, send /add first.";
pub const TRY_AGAIN: &str = "⚠️ Something went wrong, please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Delete(TaskId),
    Cancel,
    Malformed,
}

pub fn parse_selection(data: &str) -> Selection {
    if data == CANCEL_PAYLOAD {
        return Selection::Cancel;
    }
    let Some(raw_id) = data.strip_prefix(DELETE_PAYLOAD_PREFIX) else {
        return Selection::Malformed;
    };
    if raw_id.is_empty() || !raw_id.bytes().all(|b| b.is_ascii_digit()) {
        return Selection::Malformed;
    }
    raw_id
        .parse::<i64>()
        .map(|id| Selection::Delete(TaskId(id)))
        .unwrap_or(Selection::Malformed)
}

pub fn delete_payload(task_id: TaskId) -> String {
    format!("{DELETE_PAYLOAD_PREFIX}{}", task_id.0)
}

pub fn display_text(text: &str) -> String {
    if text.chars().count() > DISPLAY_TEXT_LIMIT {
        let cut: String = text.chars().take(DISPLAY_TEXT_LIMIT).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

pub fn greeting(first_name: Option<&str>) -> String {
    let salutation = match first_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("Hi, {name}! ✨"),
        None => "Hi! ✨".to_string(),
    };
    format!(
        "{salutation}\n\n\
         I'm your personal planner bot! Here's what I can do:\n\n\
         📌 /add - Add a new task\n\
         🗑️ /delete - Delete a task\n\
         📋 /list - Show all tasks\n\
         🗓️ /today - Tasks for today\n\
         ❓ /help - Help"
    )
}

pub fn task_added(text: &str, date: NaiveDate) -> String {
    format!("✅ Task added!\n📌 {text}\n📅 Date: {}", format_date(date))
}

pub fn task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return LIST_EMPTY.to_string();
    }
    let mut out = String::from("📋 Your tasks:\n\n");
    for task in tasks {
        out.push_str(&format!(
            "🆔 {}\n📌 {}\n📅 {}\n\n",
            task.id.0,
            task.text,
            format_date(task.date)
        ));
    }
    out.trim_end().to_string()
}

pub fn today_list(date: NaiveDate, tasks: &[Task]) -> String {
    let date = format_date(date);
    if tasks.is_empty() {
        return format!("🎉 No tasks for today ({date})!\nYou can rest or add new tasks 😊");
    }
    let mut out = format!("📅 Tasks for today ({date}):\n\n");
    for task in tasks {
        out.push_str(&format!("🆔 {}: {}\n", task.id.0, task.text));
    }
    out.trim_end().to_string()
}

pub fn delete_options(tasks: &[Task]) -> Reply {
    let mut options: Vec<ReplyOption> = tasks
        .iter()
        .map(|task| ReplyOption {
            label: format!("❌ {}: {}", task.id.0, display_text(&task.text)),
            payload: delete_payload(task.id),
        })
        .collect();
    options.push(ReplyOption {
        label: "❎ Cancel".to_string(),
        payload: CANCEL_PAYLOAD.to_string(),
    });
    Reply::Options {
        text: DELETE_PROMPT.to_string(),
        options,
    }
}

pub fn task_deleted(text: &str) -> String {
    format!("✅ Task deleted:\n{text}")
}

pub fn unknown_command(name: &str) -> String {
    format!("🤔 Unknown command /{name}. Send /help to see what I can do.")
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
