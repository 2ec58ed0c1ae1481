//! hostbox: a uniform handle to one machine, local or remote.
//!
//! A [`Machine`] is addressed by a host string. `"localhost"` means the
//! current machine; anything else (`[user@]hostname`) is reached through a
//! persistent ssh tunnel. The handle exposes filesystem entries, the process
//! table, shell command execution (optionally as another user and with
//! injected environment variables), a liveness probe, and explicit tunnel
//! pre-establishment.
//!
//! The connection behind a handle is created lazily on first use and reused
//! for every later operation on that handle. Two handles never share a
//! connection, even for the same host.
//!
//! ```no_run
//! # async fn demo() -> hostbox::Result<()> {
//! use hostbox::{ExecOptions, Machine};
//!
//! let build = Machine::new("deploy@build-3");
//! let out = build
//!     .execute("rake db:migrate", &ExecOptions::new().env("RAILS_ENV", "production"))
//!     .await?;
//! println!("{}", out.stdout);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod machine;
pub mod paths;

pub use config::Config;
pub use error::{Error, Result};
pub use machine::connection::CommandOutput;
pub use machine::entry::{Entry, EntryKind};
pub use machine::process::{Process, ProcessRecord};
pub use machine::{ConnectOptions, ConnectTimeout, ExecOptions, LOCALHOST, Machine};
