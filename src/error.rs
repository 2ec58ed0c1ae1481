//! Error surface for hostbox.
//!
//! The machine handle performs no error translation of its own: whatever a
//! connection reports is surfaced unchanged to the caller. The single
//! exception is [`Machine::is_alive`](crate::Machine::is_alive), which
//! normalizes every reachability failure into `false` instead of an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The tunnel to a remote host could not be established: spawn failure,
    /// authentication failure, ssh exit 255, or establishment timeout.
    #[error("connection to {host} unavailable: {reason}")]
    ConnectionUnavailable { host: String, reason: String },

    /// The command was launched but exited non-zero. `status` is `None` when
    /// the process was terminated by a signal.
    #[error("command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A local process could not be launched at all.
    #[error("failed to launch command: {0}")]
    Spawn(#[from] std::io::Error),

    /// A process-table line did not match the expected `ps` column layout.
    #[error("malformed process record: {0}")]
    ProcessParse(String),
}
