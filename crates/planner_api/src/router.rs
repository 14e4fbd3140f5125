use shared::{
    domain::UserId,
    protocol::{Command, EventPayload, InboundEvent, Reply},
};

use crate::{
    dialog::{self, AddDialog, ConversationState},
    internal, render, ApiResult, PlannerContext,
};

pub(crate) async fn route(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    event: &InboundEvent,
) -> ApiResult<Vec<Reply>> {
    match &event.payload {
        EventPayload::Command { command, argument } => {
            run_command(ctx, state, event, *command, argument.as_deref()).await
        }
        EventPayload::UnknownCommand(name) => Ok(vec![Reply::Text(render::unknown_command(name))]),
        EventPayload::Text(text) => match state.add {
            AddDialog::AwaitingInput => dialog::submit_add(ctx, state, event.user_id, text).await,
            AddDialog::Idle => Ok(vec![Reply::Text(render::TEXT_OUTSIDE_DIALOG.to_string())]),
        },
        EventPayload::Selection {
            message_id, data, ..
        } => dialog::select_delete(ctx, state, event.user_id, *message_id, data).await,
    }
}

async fn run_command(
    ctx: &PlannerContext,
    state: &mut ConversationState,
    event: &InboundEvent,
    command: Command,
    argument: Option<&str>,
) -> ApiResult<Vec<Reply>> {
    match command {
        Command::Start => Ok(vec![Reply::Text(render::greeting(
            event.first_name.as_deref(),
        ))]),
        Command::Help => Ok(vec![Reply::Text(render::HELP.to_string())]),
        Command::List => list_all(ctx, event.user_id).await,
        Command::Today => list_today(ctx, event.user_id).await,
        Command::Add => match argument {
            Some(text) => dialog::add_inline(ctx, state, event.user_id, text).await,
            None => Ok(dialog::begin_add(state)),
        },
        Command::Delete => dialog::begin_delete(ctx, state, event.user_id).await,
        Command::Cancel => Ok(dialog::cancel(state)),
    }
}

async fn list_all(ctx: &PlannerContext, user_id: UserId) -> ApiResult<Vec<Reply>> {
    let tasks = ctx.storage.list_all(user_id).await.map_err(internal)?;
    Ok(vec![Reply::Text(render::task_list(&tasks))])
}

async fn list_today(ctx: &PlannerContext, user_id: UserId) -> ApiResult<Vec<Reply>> {
    let today = ctx.clock.today();
    let tasks = ctx
        .storage
        .list_for_date(user_id, today)
        .await
        .map_err(internal)?;
    Ok(vec![Reply::Text(render::today_list(today, &tasks))])
}
