//! Starting (or attaching to) the server under assessment.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// How to get a target running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    /// Something is already listening on the endpoint.
    #[default]
    External,
    /// Spawn a child process for the duration of the run.
    Command {
        program: String,
        args: Vec<String>,
        dir: Option<PathBuf>,
    },
}

impl Target {
    /// `program args...` run in the current directory.
    pub fn command(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Target::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
        }
    }

    /// Run the command in `dir` instead. No effect on [`Target::External`].
    #[must_use]
    pub fn in_dir(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Target::Command { program, args, .. } => Target::Command {
                program,
                args,
                dir: Some(path.into()),
            },
            external => external,
        }
    }

    /// Start the target.
    ///
    /// # Errors
    ///
    /// `Error::TargetUnavailable` if the process cannot be spawned.
    pub fn launch(&self) -> Result<RunningTarget> {
        let Target::Command { program, args, dir } = self else {
            return Ok(RunningTarget { child: None });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            Error::TargetUnavailable(format!("failed to launch {}: {}", program, e))
        })?;
        info!(program = %program, pid = child.id(), "launched target");
        Ok(RunningTarget { child: Some(child) })
    }
}

/// A launched target. The child process, if any, is killed when this is
/// stopped or dropped.
#[derive(Debug)]
pub struct RunningTarget {
    child: Option<Child>,
}

impl RunningTarget {
    /// Fail if a spawned target has already exited.
    ///
    /// # Errors
    ///
    /// `Error::TargetUnavailable` naming the exit status.
    pub fn ensure_running(&mut self) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => Err(Error::TargetUnavailable(format!(
                "target exited during warmup ({})",
                status
            ))),
            Err(e) => Err(Error::TargetUnavailable(e.to_string())),
        }
    }

    /// Kill a spawned target and reap it.
    pub async fn stop(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to stop target");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_external_target_is_a_noop() {
        let mut running = Target::External.launch().unwrap();
        assert!(running.ensure_running().is_ok());
        running.stop().await;
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let result = Target::command("/definitely/not/a/program", Vec::<String>::new()).launch();
        assert!(matches!(result, Err(Error::TargetUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_target_is_unavailable() {
        let mut running = Target::command("true", Vec::<String>::new()).launch().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(matches!(
            running.ensure_running(),
            Err(Error::TargetUnavailable(msg)) if msg.contains("exited")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_long_running_target_is_stopped() {
        let mut running = Target::command("sleep", ["30"]).in_dir("/").launch().unwrap();
        assert!(running.ensure_running().is_ok());
        running.stop().await;
    }
}
