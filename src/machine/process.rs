//! Process-table records and the wrapped process view.
//!
//! Both connection variants produce the same [`ProcessRecord`]: the local
//! Linux path fills it from `/proc`, everything else from a fixed-column
//! `ps` snapshot parsed here. A [`Process`] couples one record with the
//! machine it came from so signals travel over the same connection.

use tracing::debug;

use crate::error::{Error, Result};
use crate::machine::{ExecOptions, Machine};

/// The `ps` invocation both strategies use for snapshots. `=` suppresses the
/// header; `args=` must come last because it may contain spaces.
pub(crate) const PS_SNAPSHOT: &str = "ps axo pid=,ppid=,uid=,rss=,args=";

/// One raw process-table record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    /// Resident set size in kilobytes.
    pub rss_kb: u64,
    /// Full command line; bracketed comm name for kernel threads.
    pub command: String,
}

/// Parse the output of [`PS_SNAPSHOT`].
pub(crate) fn parse_ps_snapshot(output: &str) -> Result<Vec<ProcessRecord>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_ps_line)
        .collect()
}

fn parse_ps_line(line: &str) -> Result<ProcessRecord> {
    let malformed = || Error::ProcessParse(line.to_string());

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return Err(malformed());
    }

    Ok(ProcessRecord {
        pid: fields[0].parse().map_err(|_| malformed())?,
        ppid: fields[1].parse().map_err(|_| malformed())?,
        uid: fields[2].parse().map_err(|_| malformed())?,
        rss_kb: fields[3].parse().map_err(|_| malformed())?,
        command: fields[4..].join(" "),
    })
}

// ---------------------------------------------------------------------------
// Wrapped view
// ---------------------------------------------------------------------------

/// A process on a specific machine.
#[derive(Debug, Clone)]
pub struct Process<'m> {
    record: ProcessRecord,
    machine: &'m Machine,
}

impl<'m> Process<'m> {
    /// One wrapped value per raw record; the machine reference is preserved
    /// for later operations such as signaling.
    pub(crate) fn wrap(record: ProcessRecord, machine: &'m Machine) -> Self {
        Self { record, machine }
    }

    pub fn pid(&self) -> u32 {
        self.record.pid
    }

    pub fn command(&self) -> &str {
        &self.record.command
    }

    pub fn record(&self) -> &ProcessRecord {
        &self.record
    }

    pub fn machine(&self) -> &'m Machine {
        self.machine
    }

    /// Send `signal` (a name like `TERM` or a number) to this process,
    /// through the same machine the record came from.
    pub async fn signal(&self, signal: &str) -> Result<()> {
        debug!(pid = self.record.pid, signal, machine = %self.machine, "signaling process");
        self.machine
            .execute(
                &format!("kill -{signal} {}", self.record.pid),
                &ExecOptions::default(),
            )
            .await
            .map(|_| ())
    }

    /// SIGTERM.
    pub async fn kill(&self) -> Result<()> {
        self.signal("TERM").await
    }

    /// Whether the pid still exists (`kill -0`). A failed signal check means
    /// "gone"; connection-level failures still propagate.
    pub async fn is_running(&self) -> Result<bool> {
        match self
            .machine
            .execute(&format!("kill -0 {}", self.record.pid), &ExecOptions::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::CommandFailed { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
