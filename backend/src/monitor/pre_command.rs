//! Transition hook commands.
//!
//! Monitors can run a shell command right before UP/DOWN notifications go
//! out. The command is effect-only: failures and timeouts are logged and
//! the notification path continues regardless.

use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::db::models::Monitor;
use crate::monitor::status::Status;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_transition_command(monitor: &Monitor, status: Status) {
    let command = if status == Status::Up {
        monitor.pre_up_command.as_deref()
    } else {
        monitor.pre_down_command.as_deref()
    };
    let Some(command) = command.filter(|cmd| !cmd.trim().is_empty()) else {
        return;
    };

    let monitor_json = monitor.public_json().to_string();
    let result = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("MONITOR_STATUS", status.to_string())
            .env("MONITOR_JSON", monitor_json)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            info!(monitor_id = monitor.id, "Transition command finished.");
        }
        Ok(Ok(output)) => {
            warn!(
                monitor_id = monitor.id,
                code = output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Transition command exited non-zero."
            );
        }
        Ok(Err(e)) => {
            error!(monitor_id = monitor.id, error = %e, "Transition command failed to start.");
        }
        Err(_) => {
            error!(monitor_id = monitor.id, "Transition command timed out.");
        }
    }
}
