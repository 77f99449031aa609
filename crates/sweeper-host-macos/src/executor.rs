//! Command execution with a bounded wait

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use sweeper_host_api::{CommandOutput, CommandSpec, HostError, HostResult, ProcessExecutor};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands on tokio processes, killing any that outlive the timeout
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    timeout: Duration,
}

impl TokioExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ProcessExecutor for TokioExecutor {
    async fn run(&self, spec: &CommandSpec) -> HostResult<CommandOutput> {
        debug!(command = %spec, "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command = %spec, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(HostError::Timeout {
                    command: spec.to_string(),
                    after: self.timeout,
                });
            }
        };

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command = %spec, status = ?result.status, "Command finished");
        Ok(result)
    }
}
