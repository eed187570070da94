//! Best-effort disk usage diagnostics for the report.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs a diagnostic command (default `df -h`) and captures its stdout.
#[derive(Debug, Clone)]
pub struct DiskUsageCheck {
    command: Vec<String>,
    timeout_secs: u64,
}

impl DiskUsageCheck {
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self { command, timeout_secs }
    }

    /// Command stdout, or `None` on spawn error, timeout or empty output.
    ///
    /// A non-zero exit still yields its output: `df` exits 1 when a single
    /// mount cannot be read but prints the rest of the table.
    pub async fn collect(&self) -> Option<String> {
        let (program, args) = self.command.split_first()?;

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), output).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    debug!(program = %program, status = %output.status, "Disk usage command exited with failure");
                }
                if output.stdout.is_empty() {
                    None
                } else {
                    Some(String::from_utf8_lossy(&output.stdout).into_owned())
                }
            }
            Ok(Err(e)) => {
                debug!(program = %program, error = %e, "Disk usage command unavailable");
                None
            }
            Err(_) => {
                debug!(program = %program, "Disk usage command timed out");
                None
            }
        }
    }
}
