use aion_calendar::application::commands::{
    add_event_impl, chat_impl, clear_chat_impl, connect_impl, delete_event_impl,
    disconnect_impl, free_slots_impl, list_environments_impl, list_events_impl, month_view_impl,
    status_impl, update_event_impl, watch_impl, week_view_impl, AddEventInput, AppState,
    UpdateEventInput,
};
use aion_calendar::infrastructure::logging::init_logging;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "aion-calendar", version, about = "Aion calendar client")]
struct Cli {
    /// Workspace root holding config/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the backend once
    Status,
    /// Start or attach to the backend and load events
    Connect,
    /// Stop the backend process
    Disconnect,
    /// Connect, then health-probe until the link drops or Ctrl-C
    Watch,
    /// List events, optionally for a single day
    Events {
        /// Day to list (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Create an event
    Add {
        #[arg(long)]
        title: String,
        /// Day (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Start time (HH:MM)
        #[arg(long)]
        time: String,
        /// Length in minutes
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        /// work, personal, meeting, health or other
        #[arg(long)]
        category: Option<String>,
    },
    /// Change fields of an existing event
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete an event
    Delete { id: String },
    /// Month grid with events per day
    Month {
        /// Reference day (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Months to move from the reference day
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i32,
    },
    /// Week grid with positioned events
    Week {
        /// Reference day (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Weeks to move from the reference day
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i32,
    },
    /// Free time on a day
    FreeSlots {
        #[arg(long)]
        date: String,
        /// Shortest gap worth reporting, in minutes
        #[arg(long)]
        min_duration: Option<u32>,
    },
    /// Send a chat message and stream the reply
    Chat {
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Clear chat history
    ClearChat,
    /// List interpreter environments the launcher can use
    Environments,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let state = AppState::new(root)?;
    init_logging(state.logs_dir(), &state.config().log_level)?;

    match cli.command {
        Commands::Status => print_json(&status_impl(&state).await?),
        Commands::Connect => print_json(&connect_impl(&state).await?),
        Commands::Disconnect => print_json(&disconnect_impl(&state).await?),
        Commands::Watch => {
            let cancel = cancel_on_ctrl_c();
            let last = watch_impl(&state, &cancel, |session_state, status| {
                let line = serde_json::json!({ "state": session_state, "backend": status });
                println!("{line}");
            })
            .await?;
            print_json(&last)
        }
        Commands::Events { date } => print_json(&list_events_impl(&state, date).await?),
        Commands::Add {
            title,
            date,
            time,
            duration,
            description,
            category,
        } => {
            let input = AddEventInput {
                title,
                date,
                time,
                duration,
                description,
                category,
            };
            print_json(&add_event_impl(&state, input).await?)
        }
        Commands::Update {
            id,
            title,
            date,
            time,
            duration,
            description,
            category,
        } => {
            let input = UpdateEventInput {
                title,
                date,
                time,
                duration,
                description,
                category,
            };
            print_json(&update_event_impl(&state, id, input).await?)
        }
        Commands::Delete { id } => print_json(&delete_event_impl(&state, id).await?),
        Commands::Month { date, offset } => print_json(&month_view_impl(&state, date, offset).await?),
        Commands::Week { date, offset } => print_json(&week_view_impl(&state, date, offset).await?),
        Commands::FreeSlots { date, min_duration } => {
            print_json(&free_slots_impl(&state, date, min_duration).await?)
        }
        Commands::Chat { message } => chat(&state, message.join(" ")).await,
        Commands::ClearChat => {
            clear_chat_impl(&state).await?;
            println!("chat cleared");
            Ok(())
        }
        Commands::Environments => print_json(&list_environments_impl(&state).await?),
    }
}

/// Prints the reply as it grows. When the buffer is replaced instead of
/// extended (an error), the new text starts on its own line.
async fn chat(state: &AppState, message: String) -> CliResult {
    let cancel = cancel_on_ctrl_c();
    let mut printed = String::new();
    let mut stdout = std::io::stdout();

    let turn = chat_impl(state, message, &cancel, |content| {
        let delta = match content.strip_prefix(printed.as_str()) {
            Some(delta) => delta.to_string(),
            None => format!("\n{content}"),
        };
        let _ = write!(stdout, "{delta}");
        let _ = stdout.flush();
        printed = content.to_string();
    })
    .await?;

    if let Some(extra) = turn.reply.content.strip_prefix(printed.as_str()) {
        print!("{extra}");
    }
    println!();
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
