//! The closed set of connection strategies.
//!
//! Exactly two ways exist to reach a machine: directly (the host is this
//! machine) or through an ssh tunnel. The set is closed by design, so the
//! dispatch is an enum rather than a trait object, and which variant a
//! machine gets is a pure function of its host string.

use std::process::Output;

use crate::config::Config;
use crate::error::Result;
use crate::machine::{ConnectOptions, LOCALHOST};

use super::local::LocalConnection;
use super::process::ProcessRecord;
use super::remote::RemoteConnection;

/// Captured result of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status code; `None` when the process died to a signal.
    pub status: Option<i32>,
}

impl CommandOutput {
    pub(crate) fn from_std(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        }
    }
}

/// One established (or establishable) route to a machine.
#[derive(Debug)]
pub(crate) enum Connection {
    Local(LocalConnection),
    Remote(RemoteConnection),
}

impl Connection {
    /// Select the strategy for `host`. Pure: no I/O, no tunnel — remote
    /// establishment stays deferred inside [`RemoteConnection`].
    pub(crate) fn select(host: &str, config: &Config) -> Self {
        if host == LOCALHOST {
            Connection::Local(LocalConnection::new())
        } else {
            Connection::Remote(RemoteConnection::new(host, config))
        }
    }

    /// Run `command` through `sh`, optionally as `user` via `sudo -u`.
    pub(crate) async fn execute(&self, command: &str, user: Option<&str>) -> Result<CommandOutput> {
        match self {
            Connection::Local(local) => local.execute(command, user).await,
            Connection::Remote(remote) => remote.execute(command, user).await,
        }
    }

    /// Raw snapshot of the machine's process table.
    pub(crate) async fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        match self {
            Connection::Local(local) => local.list_processes().await,
            Connection::Remote(remote) => remote.list_processes().await,
        }
    }

    /// Reachability probe; never errors.
    pub(crate) async fn is_alive(&self) -> bool {
        match self {
            Connection::Local(_) => true,
            Connection::Remote(remote) => remote.is_alive().await,
        }
    }

    /// Establish the route now. Idempotent — a no-op once established.
    pub(crate) async fn ensure_ready(&self, options: &ConnectOptions) -> Result<()> {
        match self {
            Connection::Local(_) => Ok(()),
            Connection::Remote(remote) => remote.ensure_ready(options).await,
        }
    }
}
