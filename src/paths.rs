//! Application directory structure for hostbox.
//!
//! Provides a single `HostboxPaths` struct that resolves the standard
//! directories the crate touches and ensures they exist on first use:
//!
//! - Config:   `~/.config/hostbox/`  (human-editable, XDG-style)
//! - Runtime:  `$XDG_RUNTIME_DIR/hostbox/`  (ssh control sockets)
//! - Logs:     `~/Library/Logs/hostbox/` on macOS, XDG data dir elsewhere
//!
//! Control sockets live under the runtime dir because unix socket paths have
//! a hard length limit (~104 bytes); the runtime dir is short and per-user.

use std::path::{Path, PathBuf};

use tracing::debug;

const APP_NAME: &str = "hostbox";

/// All resolved application directory paths.
#[derive(Debug, Clone)]
pub struct HostboxPaths {
    /// Human-editable config: `~/.config/hostbox/`
    pub config: PathBuf,
    /// ssh ControlPath sockets
    pub runtime: PathBuf,
    /// Log files written when `HOSTBOX_LOG=1`
    pub logs: PathBuf,
}

impl HostboxPaths {
    /// Resolve all paths from the environment and home directory.
    /// Does not create any directories — call `ensure()` for that.
    pub fn resolve() -> Option<Self> {
        let home = std::env::var("HOME").ok().map(PathBuf::from)?;

        Some(Self {
            config: resolve_config_dir(&home),
            runtime: resolve_runtime_dir(&home),
            logs: resolve_log_dir(&home),
        })
    }

    /// Create all directories that don't already exist.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.runtime, &self.logs] {
            std::fs::create_dir_all(dir)?;
            debug!("ensured directory: {}", dir.display());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Platform-specific path resolution
// ---------------------------------------------------------------------------

fn resolve_config_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join(APP_NAME)
    } else {
        home.join(".config").join(APP_NAME)
    }
}

fn resolve_runtime_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join(APP_NAME);
    }
    #[cfg(target_os = "macos")]
    {
        home.join("Library")
            .join("Application Support")
            .join(APP_NAME)
            .join("run")
    }
    #[cfg(not(target_os = "macos"))]
    {
        home.join(".local").join("share").join(APP_NAME).join("run")
    }
}

#[cfg(target_os = "macos")]
fn resolve_log_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Logs").join(APP_NAME)
}

#[cfg(not(target_os = "macos"))]
fn resolve_log_dir(home: &Path) -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join(APP_NAME).join("logs")
    } else {
        home.join(".local").join("share").join(APP_NAME).join("logs")
    }
}
