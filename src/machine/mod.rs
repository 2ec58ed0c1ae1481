//! The machine handle and its connection lifecycle.
//!
//! A [`Machine`] names one target machine by host string and funnels every
//! operation through a lazily created, memoized [`Connection`]. Strategy
//! selection is a pure function of the host: `"localhost"` executes directly
//! against the current machine, anything else goes through an ssh tunnel.
//!
//! ```text
//! caller ─► Machine method
//!              └─► connection (OnceCell, first access selects the strategy)
//!                     ├─► LocalConnection   (host == "localhost")
//!                     └─► RemoteConnection  (ssh ControlMaster tunnel)
//! ```
//!
//! Wrapped views ([`Entry`], [`Process`]) borrow the handle so their own
//! operations run over the same connection.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::debug;

pub mod command;
pub mod connection;
pub mod entry;
pub(crate) mod local;
pub mod process;
pub mod remote;

use crate::config::Config;
use crate::error::Result;
use connection::{CommandOutput, Connection};
use entry::Entry;
use process::Process;

/// The reserved host meaning "the current machine, no tunnel required".
pub const LOCALHOST: &str = "localhost";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for [`Machine::execute`].
///
/// `env` pairs are rendered as `export` lines ahead of the command, in
/// insertion order. `user` switches the executing identity via `sudo -u`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub user: Option<String>,
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute as this user instead of the connection's default identity.
    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Inject one environment variable. Repeated calls keep insertion order.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }
}

/// How long [`Machine::ensure_connected`] may wait for tunnel establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectTimeout {
    /// Use the configured `ssh.connect_timeout_secs`.
    #[default]
    Default,
    /// Give up after this long.
    Bounded(Duration),
    /// Wait indefinitely.
    Unbounded,
}

/// Options for [`Machine::ensure_connected`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub timeout: ConnectTimeout,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: ConnectTimeout) -> Self {
        self.timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A handle to one machine, local or remote.
///
/// Identity is the host string alone: two handles with the same host compare
/// equal regardless of connection state, and each builds its own connection.
pub struct Machine {
    host: String,
    config: Config,
    /// Memoization slot for the selected strategy. At most one `Connection`
    /// ever exists per handle, even when concurrent callers race the first
    /// access — the cell admits a single winner.
    connection: OnceCell<Connection>,
}

impl Machine {
    /// Handle for `host`, using default configuration.
    ///
    /// `host` is either the [`LOCALHOST`] sentinel or `[user@]hostname`.
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_config(host, Config::default())
    }

    /// Handle for the current machine.
    pub fn localhost() -> Self {
        Self::new(LOCALHOST)
    }

    pub fn with_config(host: impl Into<String>, config: Config) -> Self {
        Self {
            host: host.into(),
            config,
            connection: OnceCell::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The memoized connection, selecting the strategy on first access.
    ///
    /// Selection constructs no tunnel; remote establishment is deferred again
    /// inside the connection and happens on the first operation that needs it.
    async fn connection(&self) -> &Connection {
        self.connection
            .get_or_init(|| async {
                debug!(host = %self.host, "selecting connection strategy");
                Connection::select(&self.host, &self.config)
            })
            .await
    }

    /// The root filesystem entry (`/`) of this machine.
    ///
    /// Purely a view — nothing is resolved and no connection is established
    /// until an entry operation runs.
    pub fn filesystem(&self) -> Entry<'_> {
        Entry::root(self)
    }

    /// Resolve `path` against the root entry. A trailing `/` denotes the
    /// directory variant; the path string is passed through unmodified.
    pub fn lookup(&self, path: &str) -> Entry<'_> {
        self.filesystem().lookup(path)
    }

    /// Snapshot of the machine's process table, in the order the connection
    /// reported it. Each [`Process`] keeps a reference to this handle so it
    /// can later signal through the same connection.
    pub async fn processes(&self) -> Result<Vec<Process<'_>>> {
        let records = self.connection().await.list_processes().await?;
        Ok(records
            .into_iter()
            .map(|record| Process::wrap(record, self))
            .collect())
    }

    /// Execute a shell command on this machine.
    ///
    /// Environment pairs from `options` are prepended as `export` lines (see
    /// [`command::with_env`]); `options.user` is handed to the connection as
    /// the impersonation target. Failures from the connection propagate
    /// unchanged.
    pub async fn execute(&self, command: &str, options: &ExecOptions) -> Result<CommandOutput> {
        let full = command::with_env(command, &options.env);
        self.connection()
            .await
            .execute(&full, options.user.as_deref())
            .await
    }

    /// Whether this machine is reachable and can run commands.
    ///
    /// Forces connection creation. All reachability failures — unresolvable
    /// host, auth failure, missing ssh binary — normalize to `false`; this
    /// probe never returns an error.
    pub async fn is_alive(&self) -> bool {
        self.connection().await.is_alive().await
    }

    /// Establish the connection now instead of on first use.
    ///
    /// Idempotent: a second call (or a call after any operation already
    /// established the tunnel) performs no further establishment work.
    pub async fn ensure_connected(&self, options: &ConnectOptions) -> Result<()> {
        self.connection().await.ensure_ready(options).await
    }
}

impl PartialEq for Machine {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
    }
}

impl Eq for Machine {}

impl Hash for Machine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("host", &self.host)
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::localhost()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
