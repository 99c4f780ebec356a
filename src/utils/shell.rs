// src/utils/shell.rs
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::{FlowError, FlowResult};

/// Build a command for `program` without going through a shell.
fn command(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    cmd
}

/// Run a program to completion, inheriting stdout and stderr.
pub async fn run_command(program: &str, args: &[String]) -> FlowResult<ExitStatus> {
    debug!("Executing command: {} {}", program, args.join(" "));

    let status = command(program, args)
        .status()
        .await
        .map_err(|source| FlowError::CommandSpawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        trace!("Command succeeded: {}", program);
    } else {
        warn!("Command failed: {} ({})", program, status);
    }

    Ok(status)
}

/// Start a program in the background with its output discarded.
pub fn spawn_detached<'a, I>(program: &str, args: &[String], envs: I) -> FlowResult<Child>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    debug!("Spawning background command: {} {}", program, args.join(" "));

    command(program, args)
        .envs(envs)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| FlowError::CommandSpawn {
            program: program.to_string(),
            source,
        })
}
