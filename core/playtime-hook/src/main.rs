//! playtime-hook: reports subject lifecycle signals to the playtime daemon.
//!
//! Called by whatever hosts the subjects (a game server plugin, a shell
//! script) whenever a subject connects, runs the playtime command, toggles
//! its live display, or leaves.
//!
//! ## Subcommands
//!
//! - `ready`: subject connected in a partition
//! - `command`: subject asked for its playtime in a partition
//! - `disconnect`: subject left
//! - `toggle-display`: flip the live display
//! - `show`: print totals without recording activity
//! - `health`: check the daemon is up
//!
//! Exit codes: 0 on success, 1 when the daemon could not be reached,
//! 2 when the daemon rejected the request.

mod daemon_client;
mod logging;

use clap::{Parser, Subcommand};
use playtime_protocol::{Method, Response};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "playtime-hook")]
#[command(about = "Playtime tracking client")]
#[command(version)]
struct Cli {
    /// Print the raw JSON response instead of a summary line
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subject connected and is ready in a partition
    Ready {
        #[arg(value_name = "SUBJECT_ID")]
        subject: String,
        #[arg(value_name = "PARTITION_ID")]
        partition: String,
    },

    /// Subject ran the playtime command in a partition
    Command {
        #[arg(value_name = "SUBJECT_ID")]
        subject: String,
        #[arg(value_name = "PARTITION_ID")]
        partition: String,
    },

    /// Subject disconnected
    Disconnect {
        #[arg(value_name = "SUBJECT_ID")]
        subject: String,
    },

    /// Turn the subject's live display on or off
    ToggleDisplay {
        #[arg(value_name = "SUBJECT_ID")]
        subject: String,
    },

    /// Show a subject's totals
    Show {
        #[arg(value_name = "SUBJECT_ID")]
        subject: String,
    },

    /// Check that the daemon is running
    Health,
}

impl Commands {
    fn into_request(self) -> (Method, Option<Value>) {
        match self {
            Commands::Ready { subject, partition } => (
                Method::Ready,
                Some(json!({ "subject_id": subject, "partition_id": partition })),
            ),
            Commands::Command { subject, partition } => (
                Method::Command,
                Some(json!({ "subject_id": subject, "partition_id": partition })),
            ),
            Commands::Disconnect { subject } => {
                (Method::Disconnect, Some(json!({ "subject_id": subject })))
            }
            Commands::ToggleDisplay { subject } => {
                (Method::ToggleDisplay, Some(json!({ "subject_id": subject })))
            }
            Commands::Show { subject } => {
                (Method::GetPlaytime, Some(json!({ "subject_id": subject })))
            }
            Commands::Health => (Method::GetHealth, None),
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let (method, params) = cli.command.into_request();

    let response = match daemon_client::send(method, params) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "playtime-hook request failed");
            eprintln!("playtime-hook: {}", err);
            std::process::exit(1);
        }
    };

    if !response.ok {
        let message = response
            .error
            .map(|err| format!("{}: {}", err.code, err.message))
            .unwrap_or_else(|| "Unknown daemon error".to_string());
        eprintln!("playtime-hook: {}", message);
        std::process::exit(2);
    }

    if cli.json {
        println!("{}", serde_json::to_string(&response).unwrap_or_default());
    } else {
        println!("{}", summarize(method, &response));
    }
}

fn summarize(method: Method, response: &Response) -> String {
    let data = response.data.clone().unwrap_or(Value::Null);
    let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("?").to_string();

    match method {
        Method::GetHealth => format!(
            "daemon {} (pid {}, tracking {})",
            text("status"),
            data.get("pid").cloned().unwrap_or(Value::Null),
            data.get("tracked_subjects").cloned().unwrap_or(Value::Null)
        ),
        Method::Ready => match data.get("display_active").and_then(Value::as_bool) {
            Some(true) => "ready (display restored)".to_string(),
            _ => "ready".to_string(),
        },
        Method::Command => format!(
            "Playtime here: {} (this session: {})",
            text("total_text"),
            text("session_text")
        ),
        Method::Disconnect => "disconnected".to_string(),
        Method::ToggleDisplay => match data.get("enabled").and_then(Value::as_bool) {
            Some(true) => "display on".to_string(),
            _ => "display off".to_string(),
        },
        Method::GetPlaytime => format!("Total playtime: {}", text("summary_text")),
    }
}
