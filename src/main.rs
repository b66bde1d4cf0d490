use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cal_todo_lib::clock::{Clock, SystemClock};
use cal_todo_lib::notify::Reminder;
use cal_todo_lib::scheduler::IntervalScheduler;
use cal_todo_lib::{config, logging};
use cal_todo_lib::{DayKey, FileStore, HistoryLog, Placement, Rgba, Task, TaskChanges, TaskRegistry};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use clap::{Parser, Subcommand};

type CliResult<T> = Result<T, Box<dyn Error>>;

const DEFAULT_COLOR: Rgba = Rgba::opaque(0x21, 0x96, 0xF3);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding preferences.json and the logs
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Output JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task to a day
    ///
    /// Example: cal-todo add "Buy milk" --day 2024-06-01 --at 14:30
    Add {
        text: String,
        /// Day as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        day: Option<String>,
        /// Time of day as HH:MM
        #[arg(long)]
        at: String,
        /// Color as #RRGGBB or #AARRGGBB
        #[arg(long)]
        color: Option<String>,
    },
    /// Edit the task at POSITION of a day's list
    ///
    /// Example: cal-todo edit 1 --at 18:00
    Edit {
        position: usize,
        #[arg(long)]
        day: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete the task at POSITION of a day's list
    ///
    /// Example: cal-todo delete 2 --day 2024-06-01
    Delete {
        position: usize,
        #[arg(long)]
        day: Option<String>,
    },
    /// Mark the task at POSITION of a day's list as completed
    ///
    /// Example: cal-todo done 1
    Done {
        position: usize,
        #[arg(long)]
        day: Option<String>,
    },
    /// List the tasks of a day
    ///
    /// Example: cal-todo list --day 2024-06-01
    List {
        #[arg(long)]
        day: Option<String>,
    },
    /// List the days that hold tasks
    Days,
    /// Show completed and failed tasks
    History,
    /// Fire reminders for pending tasks until Ctrl-C
    Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => config::data_dir()?,
    };
    if let Err(err) = logging::init_logging(&data_dir) {
        eprintln!("warning: logging disabled: {err}");
    }

    let store = Arc::new(FileStore::new(data_dir));
    store.ensure_dirs().await?;
    let settings = config::load_settings(store.as_ref()).await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = IntervalScheduler::new(clock.clone());
    let registry = TaskRegistry::new(store)
        .with_settings(&settings)
        .with_clock(clock)
        .with_scheduler(Arc::new(scheduler.clone()));
    registry.load().await?;

    let json = cli.json;
    match cli.command {
        Command::Add {
            text,
            day,
            at,
            color,
        } => {
            if text.trim().is_empty() {
                return Err("task text is required".into());
            }
            let day = parse_day(day.as_deref())?;
            let color = match color {
                Some(raw) => Rgba::from_hex(&raw)?,
                None => DEFAULT_COLOR,
            };
            let task = Task::new(text.trim(), color, time_on(day, &at)?);
            let placement = registry.add_task(day, task.clone()).await?;
            print_placement(&task, &placement, json);
        }
        Command::Edit {
            position,
            day,
            text,
            at,
            color,
        } => {
            let day = parse_day(day.as_deref())?;
            let old = task_at(&registry, day, position)?;
            let changes = TaskChanges {
                text: text.map(|value| value.trim().to_string()),
                color: color.as_deref().map(Rgba::from_hex).transpose()?,
                time: at.as_deref().map(|value| time_on(day, value)).transpose()?,
                is_completed: None,
            };
            let new = old.with_changes(changes);
            let placement = registry.edit_task(day, &old, new.clone()).await?;
            print_placement(&new, &placement, json);
        }
        Command::Delete { position, day } => {
            let day = parse_day(day.as_deref())?;
            let task = task_at(&registry, day, position)?;
            let removed = registry.delete_task(day, &task).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "removed": removed, "task": task.to_value() })
                );
            } else {
                println!("deleted: {}", task.text());
            }
        }
        Command::Done { position, day } => {
            let day = parse_day(day.as_deref())?;
            let task = task_at(&registry, day, position)?;
            let completed = registry.mark_completed(day, &task).await?;
            if json {
                println!("{}", completed.to_value());
            } else {
                println!("completed: {}", completed.text());
            }
        }
        Command::List { day } => {
            let day = parse_day(day.as_deref())?;
            print_tasks(&registry.tasks_for_day(day), json);
        }
        Command::Days => {
            let days: Vec<(DayKey, usize)> = registry
                .days_with_tasks()
                .into_iter()
                .map(|day| (day, registry.tasks_for_day(day).len()))
                .collect();
            if json {
                let payload: Vec<serde_json::Value> = days
                    .iter()
                    .map(|(day, count)| serde_json::json!({ "day": day.to_string(), "count": count }))
                    .collect();
                println!("{}", serde_json::Value::Array(payload));
            } else {
                for (day, count) in days {
                    println!("{day} ({count})");
                }
            }
        }
        Command::History => {
            let history = HistoryLog::new(registry.clone());
            print_tasks(&history.tasks(), json);
        }
        Command::Watch => {
            if !settings.notifications_enabled {
                return Err("notifications are disabled in settings".into());
            }

            let count = registry.reschedule_reminders();
            println!("watching {count} reminder(s), press Ctrl-C to stop");
            let handle = scheduler.start(Arc::new(|reminder: &Reminder| {
                println!(
                    "[{}] {}: {}",
                    reminder.trigger_at.format("%Y-%m-%d %H:%M"),
                    reminder.title,
                    reminder.body
                );
            }));
            tokio::signal::ctrl_c().await?;
            handle.abort();
        }
    }

    Ok(())
}

fn parse_day(raw: Option<&str>) -> CliResult<DayKey> {
    match raw {
        Some(raw) => Ok(DayKey::parse(raw)?),
        None => Ok(DayKey::from(Local::now())),
    }
}

fn time_on(day: DayKey, raw: &str) -> CliResult<DateTime<Local>> {
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| format!("invalid time {raw:?}, expected HH:MM"))?;
    let date: NaiveDate = day.date();
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(|| format!("{date} {raw} does not exist in the local time zone").into())
}

fn task_at(registry: &TaskRegistry, day: DayKey, position: usize) -> CliResult<Task> {
    let tasks = registry.tasks_for_day(day);
    position
        .checked_sub(1)
        .and_then(|index| tasks.get(index).cloned())
        .ok_or_else(|| format!("no task #{position} on {day}").into())
}

fn print_placement(task: &Task, placement: &Placement, json: bool) {
    match placement {
        Placement::Scheduled if json => println!("{}", task.to_value()),
        Placement::Failed(archived) if json => println!("{}", archived.to_value()),
        Placement::Scheduled => println!("scheduled: {}", task.text()),
        Placement::Failed(archived) => {
            println!("time already passed, archived: {}", archived.text())
        }
    }
}

fn print_tasks(tasks: &[Task], json: bool) {
    if json {
        let payload: Vec<serde_json::Value> = tasks.iter().map(Task::to_value).collect();
        println!("{}", serde_json::Value::Array(payload));
        return;
    }
    for (index, task) in tasks.iter().enumerate() {
        let mark = if task.is_completed() { "x" } else { " " };
        println!(
            "{}. [{}] {} {} {}",
            index + 1,
            mark,
            task.time().format("%Y-%m-%d %H:%M"),
            task.text(),
            task.color().to_hex()
        );
    }
}
