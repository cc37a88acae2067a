//! Sandboxed filesystem access for stylesheet resources.
//!
//! Stylesheets may reference fonts and images by relative path. Those
//! lookups go through [`SandboxRoot`], which confines every read to a
//! single directory: absolute paths and any `..` component are rejected
//! before the filesystem is touched.

use std::io;
use std::path::{Component, Path, PathBuf};

/// A root-confined file reader.
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a relative path against the sandbox rules.
    ///
    /// Rejected: absolute paths, drive prefixes, and any `..` component —
    /// even one that would not actually escape the root. `.` components
    /// are harmless and allowed.
    pub fn check(&self, relative: &str) -> io::Result<PathBuf> {
        let path = Path::new(relative);
        if path.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("absolute path refused: {relative}"),
            ));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("path escapes sandbox root: {relative}"),
                    ));
                }
            }
        }
        Ok(self.root.join(path))
    }

    /// Read a file confined to the root.
    pub fn read(&self, relative: &str) -> io::Result<Vec<u8>> {
        let path = self.check(relative)?;
        std::fs::read(path)
    }
}
