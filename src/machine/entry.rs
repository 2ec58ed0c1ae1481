//! Filesystem entries bound to a machine.
//!
//! An [`Entry`] is a path plus a file-or-directory kind plus the machine it
//! belongs to. Lookup and joining are pure; the operations that actually
//! touch the filesystem (`exists`, `read`, `contents`) run standard POSIX
//! tools through the owning machine, so they behave identically whether the
//! machine is local or remote.

use crate::error::Result;
use crate::machine::{ExecOptions, Machine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// A filesystem object (file or directory) on a specific machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'m> {
    machine: &'m Machine,
    path: String,
    kind: EntryKind,
}

impl<'m> Entry<'m> {
    /// The machine's filesystem root.
    pub(crate) fn root(machine: &'m Machine) -> Self {
        Self {
            machine,
            path: "/".to_string(),
            kind: EntryKind::Dir,
        }
    }

    /// Bind `path` to `machine`. A trailing separator selects the directory
    /// variant; the path string itself is kept unmodified.
    pub fn resolve(path: &str, machine: &'m Machine) -> Self {
        let kind = if path.ends_with('/') {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        Self {
            machine,
            path: path.to_string(),
            kind,
        }
    }

    /// Resolve `path` relative to this entry (absolute paths replace it).
    pub fn lookup(&self, path: &str) -> Entry<'m> {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else if self.path.ends_with('/') {
            format!("{}{path}", self.path)
        } else {
            format!("{}/{path}", self.path)
        };
        Entry::resolve(&joined, self.machine)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component, without any trailing separator.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn machine(&self) -> &'m Machine {
        self.machine
    }

    /// Whether the path exists on the machine.
    pub async fn exists(&self) -> Result<bool> {
        match self
            .machine
            .execute(&format!("test -e '{}'", self.path), &ExecOptions::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(crate::Error::CommandFailed { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// File contents as UTF-8 (lossy).
    pub async fn read(&self) -> Result<String> {
        let output = self
            .machine
            .execute(&format!("cat '{}'", self.path), &ExecOptions::default())
            .await?;
        Ok(output.stdout)
    }

    /// Child entries of a directory. `ls -p` marks directories with a
    /// trailing `/`, which is exactly the variant-selection convention, so
    /// each child comes back with the right kind.
    pub async fn contents(&self) -> Result<Vec<Entry<'m>>> {
        let output = self
            .machine
            .execute(&format!("ls -A1p '{}'", self.path), &ExecOptions::default())
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| self.lookup(line))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests (pure resolution only; I/O paths are covered in tests/machine_unit.rs)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_separator_selects_dir() {
        let machine = Machine::localhost();
        assert_eq!(Entry::resolve("/var/log/", &machine).kind(), EntryKind::Dir);
        assert_eq!(Entry::resolve("/var/log", &machine).kind(), EntryKind::File);
    }

    #[test]
    fn root_is_a_dir() {
        let machine = Machine::localhost();
        let root = machine.filesystem();
        assert!(root.is_dir());
        assert_eq!(root.path(), "/");
    }

    #[test]
    fn lookup_joins_relative_paths() {
        let machine = Machine::localhost();
        let etc = machine.lookup("/etc/");
        let hosts = etc.lookup("hosts");
        assert_eq!(hosts.path(), "/etc/hosts");
        assert_eq!(hosts.kind(), EntryKind::File);
    }

    #[test]
    fn lookup_from_root_does_not_double_separator() {
        let machine = Machine::localhost();
        assert_eq!(machine.lookup("etc/hosts").path(), "/etc/hosts");
    }

    #[test]
    fn absolute_lookup_replaces_base() {
        let machine = Machine::localhost();
        let entry = machine.lookup("/var/").lookup("/etc/hosts");
        assert_eq!(entry.path(), "/etc/hosts");
    }

    #[test]
    fn name_is_last_component() {
        let machine = Machine::localhost();
        assert_eq!(machine.lookup("/var/log/").name(), "log");
        assert_eq!(machine.lookup("/etc/hosts").name(), "hosts");
    }

    #[test]
    fn path_is_passed_through_unmodified() {
        let machine = Machine::localhost();
        assert_eq!(machine.lookup("/a//weird/..path").path(), "/a//weird/..path");
    }
}
