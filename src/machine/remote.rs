//! Execution through a persistent ssh tunnel.
//!
//! The tunnel is the system ssh client in ControlMaster mode: the first
//! establishment starts a multiplexing master whose control socket lives in
//! the crate runtime dir, and every later command rides the same master
//! (`ControlPersist` keeps it alive between calls). Establishment happens at
//! most once per connection value; the inner `OnceCell` admits a single
//! winner even under concurrent racing callers, and a failed establishment
//! leaves the cell empty so a later call may try again.
//!
//! Retry and backoff are deliberately absent here — ssh's own connection
//! handling is the only retry layer, and failures surface unchanged.

use std::fmt;
use std::path::PathBuf;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{Config, SshSettings};
use crate::error::{Error, Result};
use crate::machine::{ConnectOptions, ConnectTimeout};
use crate::paths::HostboxPaths;

use super::connection::CommandOutput;
use super::process::{self, ProcessRecord};

/// ssh reserves exit status 255 for its own failures (everything else is the
/// remote command's status).
const SSH_FAILURE_STATUS: i32 = 255;

// ---------------------------------------------------------------------------
// Host identifier
// ---------------------------------------------------------------------------

/// A remote host identifier of the form `[user@]hostname`.
///
/// The user portion is optional; when absent, ssh falls back to the invoking
/// user. An empty user prefix (`@hostname`) is dropped on parse, so the
/// destination handed to ssh is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub user: Option<String>,
    pub hostname: String,
}

impl HostSpec {
    pub fn parse(target: &str) -> Self {
        match target.split_once('@') {
            Some((user, hostname)) if !user.is_empty() => Self {
                user: Some(user.to_string()),
                hostname: hostname.to_string(),
            },
            _ => Self {
                user: None,
                hostname: target.trim_start_matches('@').to_string(),
            },
        }
    }
}

/// Renders back to the ssh destination form, `[user@]hostname`.
impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{user}@{}", self.hostname),
            None => f.write_str(&self.hostname),
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteConnection
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct RemoteConnection {
    /// Parsed `[user@]hostname` destination.
    host: HostSpec,
    ssh: SshSettings,
    control_dir: PathBuf,
    /// Exactly-once establishment guard.
    established: OnceCell<()>,
}

impl RemoteConnection {
    /// Construct the strategy for `target`. No I/O happens here; the tunnel
    /// is established lazily by the first operation (or `ensure_ready`).
    pub(crate) fn new(target: &str, config: &Config) -> Self {
        let control_dir = config
            .ssh
            .control_dir
            .clone()
            .or_else(|| HostboxPaths::resolve().map(|p| p.runtime))
            .unwrap_or_else(std::env::temp_dir);

        Self {
            host: HostSpec::parse(target),
            ssh: config.ssh.clone(),
            control_dir,
            established: OnceCell::new(),
        }
    }

    /// The ssh destination this connection dials.
    pub(crate) fn target(&self) -> String {
        self.host.to_string()
    }

    /// Multiplexing options shared by every ssh invocation. `%C` is ssh's
    /// short hash token, keeping the socket path under the unix limit.
    fn base_args(&self) -> Vec<String> {
        vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            format!("ControlPath={}", self.control_dir.join("cm-%C.sock").display()),
            "-o".into(),
            format!("ControlPersist={}", self.ssh.control_persist),
        ]
    }

    /// One raw ssh round-trip: `ssh <opts> <target> -- <command>`.
    ///
    /// The remote shell re-splits the command string; quoting inside it is
    /// the caller's concern, same as the env-export wire format.
    async fn raw_ssh(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.ssh.binary);
        cmd.args(self.base_args())
            .arg(self.target())
            .arg("--")
            .arg(command)
            .kill_on_drop(true);

        let raw = cmd.output().await.map_err(|e| Error::ConnectionUnavailable {
            host: self.target(),
            reason: format!("could not launch {}: {e}", self.ssh.binary.display()),
        })?;
        Ok(CommandOutput::from_std(raw))
    }

    /// Start (or join) the multiplexing master by running `true` remotely.
    async fn establish(&self) -> Result<()> {
        std::fs::create_dir_all(&self.control_dir).map_err(Error::Spawn)?;

        debug!(host = %self.host, "establishing ssh tunnel");
        let output = self.raw_ssh("true").await?;
        match output.status {
            Some(0) => {
                info!(host = %self.host, "ssh tunnel established");
                Ok(())
            }
            status => Err(Error::ConnectionUnavailable {
                host: self.target(),
                reason: format!("ssh exited with {status:?}: {}", output.stderr.trim()),
            }),
        }
    }

    /// Establish the tunnel at most once.
    ///
    /// `ConnectTimeout::Default` caps the wait at the configured connect
    /// timeout, `Bounded` at the given duration, `Unbounded` not at all.
    pub(crate) async fn ensure_ready(&self, options: &ConnectOptions) -> Result<()> {
        let limit = match options.timeout {
            ConnectTimeout::Default => Some(self.ssh.connect_timeout()),
            ConnectTimeout::Bounded(duration) => Some(duration),
            ConnectTimeout::Unbounded => None,
        };

        self.established
            .get_or_try_init(|| async {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, self.establish())
                        .await
                        .map_err(|_| Error::ConnectionUnavailable {
                            host: self.target(),
                            reason: format!("establishment timed out after {limit:?}"),
                        })?,
                    None => self.establish().await,
                }
            })
            .await
            .copied()
    }

    /// Run `command` over the tunnel, optionally as `user` via `sudo -u`.
    ///
    /// The impersonation wrapper single-quotes the command for the remote
    /// shell; embedded quotes (the env-export lines carry them) are escaped
    /// so the wrapped command reaches the inner `sh` intact.
    pub(crate) async fn execute(&self, command: &str, user: Option<&str>) -> Result<CommandOutput> {
        self.ensure_ready(&ConnectOptions::default()).await?;

        let full = match user {
            Some(user) => format!("sudo -u {user} sh -c {}", shell_quote(command)),
            None => command.to_string(),
        };

        debug!(host = %self.host, user = ?user, "executing remotely");
        let output = self.raw_ssh(&full).await?;
        match output.status {
            Some(0) => Ok(output),
            Some(SSH_FAILURE_STATUS) => Err(Error::ConnectionUnavailable {
                host: self.target(),
                reason: output.stderr.trim().to_string(),
            }),
            status => Err(Error::CommandFailed {
                command: full,
                status,
                stderr: output.stderr,
            }),
        }
    }

    /// Snapshot of the remote process table via `ps`.
    pub(crate) async fn list_processes(&self) -> Result<Vec<ProcessRecord>> {
        let output = self.execute(process::PS_SNAPSHOT, None).await?;
        process::parse_ps_snapshot(&output.stdout)
    }

    /// Reachability probe: can we run anything at all over the tunnel?
    pub(crate) async fn is_alive(&self) -> bool {
        self.execute("true", None).await.is_ok()
    }
}

/// Single-quote `s` for a POSIX shell, closing and reopening the quote around
/// each embedded `'`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

// ---------------------------------------------------------------------------
// Tests
//
// Network-free: the ssh binary is injectable through SshSettings, so these
// tests substitute small shell scripts that record their argv.
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    use super::*;

    fn stub_config(dir: &Path, script_body: &str) -> Config {
        let script = dir.join("stub-ssh");
        std::fs::write(&script, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.ssh.binary = script;
        config.ssh.control_dir = Some(dir.join("run"));
        config
    }

    /// Stub that appends its argv to `calls.log` and succeeds.
    fn recording_config(dir: &Path) -> Config {
        let log = dir.join("calls.log");
        stub_config(dir, &format!("echo \"$@\" >> {}", log.display()))
    }

    fn logged_calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn host_spec_splits_user() {
        assert_eq!(
            HostSpec::parse("deploy@web-1"),
            HostSpec {
                user: Some("deploy".into()),
                hostname: "web-1".into()
            }
        );
    }

    #[test]
    fn host_spec_without_user_defaults_to_invoker() {
        assert_eq!(
            HostSpec::parse("web-1"),
            HostSpec {
                user: None,
                hostname: "web-1".into()
            }
        );
    }

    #[test]
    fn host_spec_empty_user_is_ignored() {
        let spec = HostSpec::parse("@web-1");
        assert_eq!(spec.user, None);
        assert_eq!(spec.hostname, "web-1");
        assert_eq!(spec.to_string(), "web-1");
    }

    #[test]
    fn host_spec_renders_the_ssh_destination() {
        assert_eq!(HostSpec::parse("deploy@web-1").to_string(), "deploy@web-1");
        assert_eq!(HostSpec::parse("web-1").to_string(), "web-1");
    }

    #[tokio::test]
    async fn empty_user_prefix_never_reaches_ssh() {
        let dir = tempfile::tempdir().unwrap();
        let conn = RemoteConnection::new("@web-1", &recording_config(dir.path()));

        conn.ensure_ready(&ConnectOptions::default()).await.unwrap();

        let call = logged_calls(dir.path()).pop().unwrap();
        assert!(call.contains(" web-1 --"), "got: {call}");
        assert!(!call.contains("@web-1"), "got: {call}");
    }

    #[tokio::test]
    async fn ensure_ready_establishes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let conn = RemoteConnection::new("web-1", &recording_config(dir.path()));

        conn.ensure_ready(&ConnectOptions::default()).await.unwrap();
        conn.ensure_ready(&ConnectOptions::default()).await.unwrap();

        assert_eq!(logged_calls(dir.path()).len(), 1, "second call must be a no-op");
    }

    #[tokio::test]
    async fn execute_reuses_established_tunnel() {
        let dir = tempfile::tempdir().unwrap();
        let conn = RemoteConnection::new("web-1", &recording_config(dir.path()));

        conn.ensure_ready(&ConnectOptions::default()).await.unwrap();
        conn.execute("id", None).await.unwrap();

        // One establishment probe, one command — no re-establishment.
        let calls = logged_calls(dir.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("-- true"));
        assert!(calls[1].ends_with("-- id"));
    }

    #[tokio::test]
    async fn execute_passes_impersonation_target_through() {
        let dir = tempfile::tempdir().unwrap();
        let conn = RemoteConnection::new("web-1", &recording_config(dir.path()));

        conn.execute("id", Some("deploy")).await.unwrap();

        let calls = logged_calls(dir.path());
        assert!(
            calls.last().unwrap().ends_with("-- sudo -u deploy sh -c 'id'"),
            "got: {calls:?}"
        );
    }

    #[tokio::test]
    async fn impersonation_escapes_embedded_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let conn = RemoteConnection::new("web-1", &recording_config(dir.path()));

        // The env-export prefix produced upstream carries single quotes; the
        // wrapper must not let them terminate its own quoting.
        conn.execute("export GREETING='two words'\nid", Some("deploy"))
            .await
            .unwrap();

        let calls = logged_calls(dir.path());
        assert!(
            calls
                .iter()
                .any(|c| c.contains("sudo -u deploy sh -c 'export GREETING='\\''two words'\\''")),
            "got: {calls:?}"
        );
        // The multiline command spans log lines; the base command closes the wrapper.
        assert!(calls.last().unwrap().ends_with("id'"), "got: {calls:?}");
    }

    #[tokio::test]
    async fn quoted_wrapper_runs_under_a_real_shell() {
        // Simulate the remote side: an outer sh re-splits the wrapped string
        // exactly like the ssh-spawned login shell would.
        let command = "export GREETING='two words'\necho \"$GREETING\"";
        let wrapped = format!("sh -c {}", shell_quote(command));
        let raw = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&wrapped)
            .output()
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&raw.stdout), "two words\n");
        assert!(raw.status.success());
    }

    #[tokio::test]
    async fn failed_establishment_is_connection_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_config(dir.path(), "echo 'auth denied' >&2; exit 255");
        let conn = RemoteConnection::new("web-1", &config);

        let err = conn.ensure_ready(&ConnectOptions::default()).await.unwrap_err();
        match err {
            Error::ConnectionUnavailable { host, reason } => {
                assert_eq!(host, "web-1");
                assert!(reason.contains("auth denied"));
            }
            other => panic!("expected ConnectionUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_establishment_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        // Fails until the marker file exists.
        let marker = dir.path().join("up");
        let config = stub_config(
            dir.path(),
            &format!("[ -e {} ] || exit 255", marker.display()),
        );
        let conn = RemoteConnection::new("web-1", &config);

        assert!(conn.ensure_ready(&ConnectOptions::default()).await.is_err());
        std::fs::write(&marker, b"").unwrap();
        assert!(conn.ensure_ready(&ConnectOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn remote_command_exit_status_maps_to_command_failed() {
        let dir = tempfile::tempdir().unwrap();
        // Establishment probe (`-- true`) succeeds, everything else exits 9.
        let config = stub_config(
            dir.path(),
            "for last; do :; done\n[ \"$last\" = true ] && exit 0\nexit 9",
        );
        let conn = RemoteConnection::new("web-1", &config);

        let err = conn.execute("oops", None).await.unwrap_err();
        match err {
            Error::CommandFailed { status, .. } => assert_eq!(status, Some(9)),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ssh_255_after_establishment_is_connection_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_config(
            dir.path(),
            "for last; do :; done\n[ \"$last\" = true ] && exit 0\necho lost >&2; exit 255",
        );
        let conn = RemoteConnection::new("web-1", &config);

        let err = conn.execute("id", None).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionUnavailable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn bounded_timeout_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_config(dir.path(), "sleep 5");
        let conn = RemoteConnection::new("web-1", &config);

        let options = ConnectOptions::new().timeout(ConnectTimeout::Bounded(Duration::from_millis(100)));
        let err = conn.ensure_ready(&options).await.unwrap_err();
        match err {
            Error::ConnectionUnavailable { reason, .. } => {
                assert!(reason.contains("timed out"), "got: {reason}");
            }
            other => panic!("expected ConnectionUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn is_alive_is_false_when_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let config = stub_config(dir.path(), "exit 255");
        let conn = RemoteConnection::new("unreachable", &config);
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn is_alive_is_false_for_missing_binary() {
        let mut config = Config::default();
        config.ssh.binary = PathBuf::from("/nonexistent/hostbox-test-ssh");
        config.ssh.control_dir = Some(std::env::temp_dir());
        let conn = RemoteConnection::new("web-1", &config);
        assert!(!conn.is_alive().await);
    }
}
