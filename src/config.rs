//! Runtime configuration for hostbox.
//!
//! A `Config` is attached to each machine handle at construction time and is
//! read-only afterwards. It can be loaded from a TOML file; partial files are
//! filled in from the defaults and unknown keys are silently ignored, so old
//! config files keep working across releases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ssh: SshSettings,
}

/// Settings for the ssh transport used by remote connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    /// The ssh client to drive. A bare name is resolved through `$PATH`.
    pub binary: PathBuf,

    /// Seconds ssh itself waits for the TCP connection (`-o ConnectTimeout`).
    pub connect_timeout_secs: u64,

    /// How long the multiplexing master stays alive after its last client
    /// (`-o ControlPersist`). ssh duration syntax, e.g. `"10m"`.
    pub control_persist: String,

    /// Directory for ControlPath sockets. Defaults to the crate runtime dir.
    pub control_dir: Option<PathBuf>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ssh"),
            connect_timeout_secs: 10,
            control_persist: "10m".to_string(),
            control_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helper methods
// ---------------------------------------------------------------------------

impl Config {
    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialize from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load from a TOML file, falling back to defaults when the file is
    /// missing or malformed. A malformed file is logged, never fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring malformed config");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
