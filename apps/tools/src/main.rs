use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use shared::domain::{format_date, parse_date, Task, TaskId, UserId};
use storage::Storage;

/// Operator access to the planner's task table.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://planner.db")]
    database_url: String,
    /// Print tasks as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        user_id: i64,
    },
    Today {
        user_id: i64,
        /// Day to list instead of today (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    Add {
        user_id: i64,
        text: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
    },
    Delete {
        task_id: i64,
    },
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let today = Local::now().date_naive();

    match cli.command {
        Command::List { user_id } => {
            let tasks = storage.list_all(UserId(user_id)).await?;
            print_tasks(&tasks, cli.json)?;
        }
        Command::Today { user_id, date } => {
            let tasks = storage
                .list_for_date(UserId(user_id), date.unwrap_or(today))
                .await?;
            print_tasks(&tasks, cli.json)?;
        }
        Command::Add {
            user_id,
            text,
            date,
        } => {
            let task_id = storage
                .insert(UserId(user_id), &text, date.unwrap_or(today))
                .await?;
            println!("created task_id={}", task_id.0);
        }
        Command::Delete { task_id } => {
            if !storage.delete(TaskId(task_id)).await? {
                bail!("task {task_id} not found");
            }
            println!("deleted task_id={task_id}");
        }
    }

    Ok(())
}

fn print_tasks(tasks: &[Task], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }
    for task in tasks {
        println!("{}\t{}\t{}", task.id.0, format_date(task.date), task.text);
    }
    Ok(())
}
