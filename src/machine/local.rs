//! Direct execution against the current machine.
//!
//! Commands run through `sh -c` via `tokio::process`; the command string is
//! passed as a single argv element, so no additional shell quoting happens at
//! this layer. Process listing reads `/proc` directly on Linux and falls back
//! to a `ps` snapshot elsewhere.

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

use super::connection::CommandOutput;
#[cfg(not(target_os = "linux"))]
use super::process;
use super::process::ProcessRecord;

#[derive(Debug)]
pub(crate) struct LocalConnection;

impl LocalConnection {
    pub(crate) fn new() -> Self {
        LocalConnection
    }

    /// Run `command` through `sh -c`, optionally as `user` via `sudo -u`.
    ///
    /// A non-zero exit is reported as [`Error::CommandFailed`]; stdout is
    /// only returned for successful commands.
    pub(crate) async fn execute(&self, command: &str, user: Option<&str>) -> Result<CommandOutput> {
        debug!(user = ?user, "executing locally");

        let mut cmd = match user {
            Some(user) => {
                let mut sudo = Command::new("sudo");
                sudo.arg("-u").arg(user).arg("--").arg("sh");
                sudo
            }
            None => Command::new("sh"),
        };
        cmd.arg("-c").arg(command);

        let raw = cmd.output().await.map_err(Error::Spawn)?;
        let output = CommandOutput::from_std(raw);

        if output.status == Some(0) {
            Ok(output)
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    /// Snapshot of the local process table.
    #[cfg(target_os = "linux")]
    pub(crate) async fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        Ok(procfs_snapshot())
    }

    /// Snapshot of the local process table.
    #[cfg(not(target_os = "linux"))]
    pub(crate) async fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        let output = self.execute(process::PS_SNAPSHOT, None).await?;
        process::parse_ps_snapshot(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
// /proc scan (Linux)
// ---------------------------------------------------------------------------

/// Walk `/proc`, one record per numeric directory. Processes that exit
/// between the directory listing and the file reads are skipped.
#[cfg(target_os = "linux")]
fn procfs_snapshot() -> Vec<ProcessRecord> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(record) = read_proc_record(pid) {
            records.push(record);
        }
    }
    records
}

#[cfg(target_os = "linux")]
fn read_proc_record(pid: u32) -> Option<ProcessRecord> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;

    let mut comm = String::new();
    let mut ppid = 0u32;
    let mut uid = 0u32;
    let mut rss_kb = 0u64;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Name:") {
            comm = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("PPid:") {
            ppid = rest.trim().parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("Uid:") {
            // Real uid is the first of the four fields.
            uid = rest.split_whitespace().next()?.parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss_kb = rest
                .trim()
                .trim_end_matches(" kB")
                .trim()
                .parse()
                .unwrap_or(0);
        }
    }

    // cmdline is NUL-separated; kernel threads have none and fall back to
    // the bracketed comm name, same convention as ps.
    let command = match std::fs::read(format!("/proc/{pid}/cmdline")) {
        Ok(bytes) if !bytes.is_empty() => bytes
            .split(|&b| b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
        _ => format!("[{comm}]"),
    };

    Some(ProcessRecord {
        pid,
        ppid,
        uid,
        rss_kb,
        command,
    })
}
