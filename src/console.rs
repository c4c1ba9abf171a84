use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::error::AppError;
use crate::models::task::timestamp;
use crate::models::{Priority, StatusFilter, Task, TaskDraft, TaskPatch};

/// One line typed at the prompt. The first word names the command.
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: Command,
}

impl ConsoleLine {
    /// Parses a line of words. `help` and usage errors come back as a
    /// `clap::Error` ready to print.
    pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
        Self::try_parse_from(line.split_whitespace()).map(|parsed| parsed.command)
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Show tasks, optionally only completed or incomplete ones
    #[command(visible_alias = "ls")]
    List {
        #[arg(default_value = "all")]
        status: StatusFilter,
    },
    /// Create a task: add <title...> [--due ..] [--priority ..] [--description ..]
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Change a task: edit <id> [new title...] [--due ..] [--no-due] ...
    Edit {
        id: String,
        title: Vec<String>,
        #[command(flatten)]
        fields: TaskFields,
        /// Remove the due date
        #[arg(long = "no-due", conflicts_with = "due")]
        clear_due: bool,
        /// Remove the description
        #[arg(long = "no-description", conflicts_with = "description")]
        clear_description: bool,
    },
    /// Flip a task between done and not done
    #[command(visible_alias = "done")]
    Toggle { id: String },
    /// Delete a task
    #[command(name = "rm", visible_alias = "delete")]
    Remove { id: String },
    /// Ask the assistant
    Chat {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        message: Vec<String>,
    },
    /// Re-request reminder permission
    #[command(name = "notify")]
    EnableNotifications,
    /// Fetch the task list again
    Reload,
    #[command(visible_alias = "exit")]
    Quit,
}

/// Optional task fields shared by `add` and `edit`.
#[derive(Debug, Clone, Default, PartialEq, Args)]
pub struct TaskFields {
    /// Due time, e.g. 2026-10-15T10:00 (read as UTC)
    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,
    /// low, medium or high
    #[arg(long, short)]
    pub priority: Option<Priority>,
    #[arg(long, short, num_args = 1..)]
    pub description: Option<Vec<String>>,
}

impl TaskFields {
    fn description(&self) -> Option<String> {
        self.description.as_deref().map(join)
    }
}

impl Command {
    /// The draft an `add` line describes.
    pub fn draft(title: &[String], fields: &TaskFields) -> TaskDraft {
        TaskDraft {
            description: fields.description(),
            due_at: fields.due,
            priority: fields.priority,
            ..TaskDraft::new(join(title))
        }
    }

    /// The patch an `edit` line describes. An edit that changes nothing is
    /// rejected.
    pub fn patch(
        title: &[String],
        fields: &TaskFields,
        clear_due: bool,
        clear_description: bool,
    ) -> Result<TaskPatch, AppError> {
        let patch = TaskPatch {
            title: (!title.is_empty()).then(|| join(title)),
            description: if clear_description {
                Some(None)
            } else {
                fields.description().map(Some)
            },
            due_at: if clear_due { Some(None) } else { fields.due.map(Some) },
            priority: fields.priority,
            ..Default::default()
        };
        if patch == TaskPatch::default() {
            return Err(AppError::Validation("Nothing to change".to_string()));
        }
        Ok(patch)
    }
}

fn join(words: &[String]) -> String {
    words.join(" ")
}

fn parse_due(s: &str) -> Result<DateTime<Utc>, String> {
    timestamp::parse(s).or_else(|_| {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
            .map(|naive| naive.and_utc())
            .map_err(|_| format!("expected a time like 2026-10-15T10:00, got {:?}", s))
    })
}

pub fn format_task(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    let due = task
        .due_at
        .map(|d| format!(" (due {})", d.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!("[{}] {} {}{} [{:?}]", mark, task.id, task.title, due, task.priority)
}
