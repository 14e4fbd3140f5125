use super::*;
use shared::{
    domain::{parse_date, ChatId, MessageId, UserId},
    protocol::{Command, EventPayload},
};

const CHAT: ChatId = ChatId(100);

fn day(raw: &str) -> NaiveDate {
    parse_date(raw).expect("date")
}

async fn planner_on(date: &str) -> Planner {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    Planner::new(PlannerContext {
        storage,
        clock: Arc::new(FixedClock(day(date))),
    })
}

fn event(user: i64, payload: EventPayload) -> InboundEvent {
    InboundEvent {
        chat_id: CHAT,
        user_id: UserId(user),
        first_name: Some("Ada".into()),
        payload,
    }
}

fn command(user: i64, command: Command) -> InboundEvent {
    event(
        user,
        EventPayload::Command {
            command,
            argument: None,
        },
    )
}

fn text(user: i64, body: &str) -> InboundEvent {
    event(user, EventPayload::Text(body.into()))
}

fn select(user: i64, data: &str) -> InboundEvent {
    event(
        user,
        EventPayload::Selection {
            callback_id: "cb".into(),
            message_id: Some(MessageId(7)),
            data: data.into(),
        },
    )
}

fn key(user: i64) -> ConversationKey {
    ConversationKey::new(CHAT, UserId(user))
}

async fn send(planner: &Planner, event: InboundEvent) -> Vec<Reply> {
    planner.handle(&event).await.expect("handled")
}

async fn add_task(planner: &Planner, user: i64, body: &str) {
    send(planner, command(user, Command::Add)).await;
    send(planner, text(user, body)).await;
}

#[tokio::test]
async fn add_dialog_stores_task_dated_today() {
    let planner = planner_on("2024-05-01").await;

    let prompt = send(&planner, command(1, Command::Add)).await;
    assert_eq!(prompt, vec![Reply::Text(render::ADD_PROMPT.into())]);
    assert_eq!(planner.dialog_state(key(1)).await.add, AddDialog::AwaitingInput);

    let confirmation = send(&planner, text(1, "Buy milk")).await;
    assert!(confirmation[0].text().contains("Buy milk"));
    assert!(confirmation[0].text().contains("2024-05-01"));
    assert!(planner.dialog_state(key(1)).await.is_idle());

    let tasks = planner
        .context()
        .storage
        .list_all(UserId(1))
        .await
        .expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Buy milk");
    assert_eq!(tasks[0].date, day("2024-05-01"));
}

#[tokio::test]
async fn cancel_mid_add_creates_nothing() {
    let planner = planner_on("2024-05-01").await;
    send(&planner, command(1, Command::Add)).await;

    let replies = send(&planner, command(1, Command::Cancel)).await;
    assert_eq!(replies, vec![Reply::Text(render::ACTION_CANCELLED.into())]);
    assert!(planner.dialog_state(key(1)).await.is_idle());

    let replies = send(&planner, text(1, "Buy milk")).await;
    assert_eq!(replies, vec![Reply::Text(render::TEXT_OUTSIDE_DIALOG.into())]);
    let tasks = planner.context().storage.list_all(UserId(1)).await.expect("list");
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn stray_command_during_add_is_not_task_text() {
    let planner = planner_on("2024-05-01").await;
    send(&planner, command(1, Command::Add)).await;

    let listing = send(&planner, command(1, Command::List)).await;
    assert_eq!(listing, vec![Reply::Text(render::LIST_EMPTY.into())]);
    assert_eq!(planner.dialog_state(key(1)).await.add, AddDialog::AwaitingInput);

    send(&planner, text(1, "after the detour")).await;
    let tasks = planner.context().storage.list_all(UserId(1)).await.expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "after the detour");
}

#[tokio::test]
async fn blank_text_keeps_waiting_for_input() {
    let planner = planner_on("2024-05-01").await;
    send(&planner, command(1, Command::Add)).await;
    let replies = send(&planner, text(1, "   ")).await;
    assert_eq!(replies, vec![Reply::Text(render::ADD_BLANK_TEXT.into())]);
    assert_eq!(planner.dialog_state(key(1)).await.add, AddDialog::AwaitingInput);
}

#[tokio::test]
async fn inline_add_argument_skips_the_prompt() {
    let planner = planner_on("2024-05-01").await;
    let replies = send(
        &planner,
        event(
            1,
            EventPayload::Command {
                command: Command::Add,
                argument: Some("Finish homework".into()),
            },
        ),
    )
    .await;
    assert!(replies[0].text().contains("Finish homework"));
    assert!(planner.dialog_state(key(1)).await.is_idle());
}

#[tokio::test]
async fn delete_with_no_tasks_ends_immediately() {
    let planner = planner_on("2024-05-01").await;
    let replies = send(&planner, command(1, Command::Delete)).await;
    assert_eq!(replies, vec![Reply::Text(render::DELETE_EMPTY.into())]);
    assert!(planner.dialog_state(key(1)).await.is_idle());
}

#[tokio::test]
async fn delete_dialog_removes_selected_task() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "Buy milk").await;
    add_task(&planner, 1, "Walk dog").await;
    let tasks = planner.context().storage.list_all(UserId(1)).await.expect("list");
    let target = tasks[0].id;

    let options = send(&planner, command(1, Command::Delete)).await;
    let Reply::Options { options, .. } = &options[0] else {
        panic!("expected options");
    };
    assert_eq!(options.len(), 3);
    assert_eq!(
        planner.dialog_state(key(1)).await.delete,
        DeleteDialog::AwaitingSelection {
            offered: tasks.iter().map(|task| task.id).collect()
        }
    );

    let result = send(&planner, select(1, &render::delete_payload(target))).await;
    assert_eq!(
        result,
        vec![Reply::Edit {
            message_id: MessageId(7),
            text: render::task_deleted("Buy milk"),
        }]
    );
    assert!(planner.dialog_state(key(1)).await.is_idle());
    assert!(planner.context().storage.get(target).await.expect("get").is_none());
    assert!(!planner.context().storage.delete(target).await.expect("delete again"));
}

#[tokio::test]
async fn vanished_task_reports_not_found() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "Buy milk").await;
    let target = planner.context().storage.list_all(UserId(1)).await.expect("list")[0].id;

    send(&planner, command(1, Command::Delete)).await;
    planner.context().storage.delete(target).await.expect("race");

    let result = send(&planner, select(1, &render::delete_payload(target))).await;
    assert_eq!(result[0].text(), render::TASK_NOT_FOUND);
    assert!(planner.dialog_state(key(1)).await.is_idle());
}

#[tokio::test]
async fn malformed_selection_is_not_found() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "Buy milk").await;
    send(&planner, command(1, Command::Delete)).await;

    let result = send(&planner, select(1, "delete_oops")).await;
    assert_eq!(result[0].text(), render::TASK_NOT_FOUND);
    assert_eq!(planner.context().storage.list_all(UserId(1)).await.expect("list").len(), 1);
}

#[tokio::test]
async fn selection_cannot_delete_another_users_task() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "mine").await;
    add_task(&planner, 2, "theirs").await;
    let theirs = planner.context().storage.list_all(UserId(2)).await.expect("list")[0].id;

    send(&planner, command(1, Command::Delete)).await;
    let result = send(&planner, select(1, &render::delete_payload(theirs))).await;
    assert_eq!(result[0].text(), render::TASK_NOT_FOUND);
    assert!(planner.context().storage.get(theirs).await.expect("get").is_some());
}

#[tokio::test]
async fn cancel_button_and_cancel_command_leave_store_unchanged() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "Buy milk").await;

    send(&planner, command(1, Command::Delete)).await;
    let result = send(&planner, select(1, render::CANCEL_PAYLOAD)).await;
    assert_eq!(result[0].text(), render::DELETE_CANCELLED);
    assert!(planner.dialog_state(key(1)).await.is_idle());

    send(&planner, command(1, Command::Delete)).await;
    let result = send(&planner, command(1, Command::Cancel)).await;
    assert_eq!(result[0].text(), render::ACTION_CANCELLED);
    assert!(planner.dialog_state(key(1)).await.is_idle());

    assert_eq!(planner.context().storage.list_all(UserId(1)).await.expect("list").len(), 1);
}

#[tokio::test]
async fn selection_without_active_dialog_has_expired() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "Buy milk").await;
    let target = planner.context().storage.list_all(UserId(1)).await.expect("list")[0].id;

    let result = send(&planner, select(1, &render::delete_payload(target))).await;
    assert_eq!(result[0].text(), render::SELECTION_EXPIRED);
    assert!(planner.context().storage.get(target).await.expect("get").is_some());
}

#[tokio::test]
async fn cancel_without_dialog_says_so() {
    let planner = planner_on("2024-05-01").await;
    let result = send(&planner, command(1, Command::Cancel)).await;
    assert_eq!(result, vec![Reply::Text(render::NOTHING_TO_CANCEL.into())]);
}

#[tokio::test]
async fn today_lists_only_current_date_for_the_user() {
    let planner = planner_on("2024-05-01").await;
    let storage = &planner.context().storage;
    storage.insert(UserId(1), "today", day("2024-05-01")).await.expect("today");
    storage.insert(UserId(1), "tomorrow", day("2024-05-02")).await.expect("tomorrow");
    storage.insert(UserId(2), "other user", day("2024-05-01")).await.expect("other");

    let replies = send(&planner, command(1, Command::Today)).await;
    let body = replies[0].text();
    assert!(body.contains("today"));
    assert!(!body.contains("tomorrow"));
    assert!(!body.contains("other user"));
}

#[tokio::test]
async fn dialogs_are_independent_per_user() {
    let planner = planner_on("2024-05-01").await;
    send(&planner, command(1, Command::Add)).await;

    let replies = send(&planner, text(2, "not a task")).await;
    assert_eq!(replies[0].text(), render::TEXT_OUTSIDE_DIALOG);
    assert_eq!(planner.dialog_state(key(1)).await.add, AddDialog::AwaitingInput);
    assert!(planner.dialog_state(key(2)).await.is_idle());

    add_task(&planner, 2, "bob's").await;
    send(&planner, command(1, Command::Delete)).await;
    let state = planner.dialog_state(key(1)).await;
    assert_eq!(state.delete, DeleteDialog::Idle, "user 1 has nothing to delete");
}

#[tokio::test]
async fn injected_state_drives_the_next_event() {
    let planner = planner_on("2024-05-01").await;
    planner
        .dialogs()
        .set(
            key(1),
            ConversationState {
                add: AddDialog::AwaitingInput,
                delete: DeleteDialog::Idle,
            },
        )
        .await;

    send(&planner, text(1, "seeded")).await;
    let tasks = planner.context().storage.list_all(UserId(1)).await.expect("list");
    assert_eq!(tasks[0].text, "seeded");
    assert!(planner.dialogs().is_empty().await);
}

#[tokio::test]
async fn task_text_is_stored_as_received() {
    let planner = planner_on("2024-05-01").await;
    add_task(&planner, 1, "  Buy milk\n").await;

    let tasks = planner.context().storage.list_all(UserId(1)).await.expect("list");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "  Buy milk\n");
}

#[tokio::test]
async fn registry_keeps_only_active_conversations() {
    let planner = planner_on("2024-05-01").await;

    send(&planner, command(1, Command::Help)).await;
    assert!(planner.dialogs().is_empty().await);

    send(&planner, command(1, Command::Add)).await;
    add_task(&planner, 2, "Call mom").await;
    send(&planner, command(2, Command::Delete)).await;
    assert_eq!(planner.dialogs().len().await, 2);

    send(&planner, text(1, "Buy milk")).await;
    send(&planner, command(2, Command::Cancel)).await;
    assert!(planner.dialogs().is_empty().await);
}

#[tokio::test]
async fn held_entry_survives_an_idle_event() {
    let planner = planner_on("2024-05-01").await;
    let held = planner.dialogs().entry(key(1)).await;

    send(&planner, command(1, Command::List)).await;
    assert_eq!(planner.dialogs().len().await, 1);

    planner.dialogs().release(key(1), held).await;
    assert!(planner.dialogs().is_empty().await);
}

#[tokio::test]
async fn storage_failure_keeps_dialog_state() {
    let planner = planner_on("2024-05-01").await;
    send(&planner, command(1, Command::Add)).await;
    planner.context().storage.pool().close().await;

    let err = planner
        .handle(&text(1, "lost"))
        .await
        .expect_err("closed pool");
    assert_eq!(err.code, ErrorCode::Internal);
    assert_eq!(planner.dialog_state(key(1)).await.add, AddDialog::AwaitingInput);
}

#[tokio::test]
async fn unknown_command_points_to_help() {
    let planner = planner_on("2024-05-01").await;
    let replies = send(&planner, event(1, EventPayload::UnknownCommand("edit".into()))).await;
    assert!(replies[0].text().contains("/help"));
}
