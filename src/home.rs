//! Installation home layout and the exclusive home lock.
//!
//! Every artifact the orchestrator produces lives below a single root
//! directory. Mutating commands hold [`HomeLock`] for their whole duration
//! so two invocations never interleave writes to the same home.

use crate::error::{IssuerError, Result};
use std::fs::{File, OpenOptions};
use fs4::fs_std::FileExt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the rendered environment file.
pub const ENV_FILE_NAME: &str = ".env-issuer";

/// Name of the rendered resolver settings document.
pub const RESOLVER_FILE_NAME: &str = "resolver_settings.yaml";

/// Name of the local key-store file.
pub const KEY_STORE_FILE_NAME: &str = "kms_localstorage_keys.json";

const LOCK_FILE_NAME: &str = ".issuerctl.lock";
const STATE_FILE_NAME: &str = ".install-state.yaml";

/// Paths of one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationHome {
    root: PathBuf,
}

impl InstallationHome {
    /// Creates a home rooted at `root`. Nothing is touched on disk.
    ///
    /// A relative root is resolved against the current directory, since
    /// unit files and builds running in `source/` need absolute paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checked-out platform source tree.
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    /// Published executables.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Build output before all targets succeeded.
    pub fn staging_dir(&self) -> PathBuf {
        self.bin_dir().join(".staging")
    }

    /// Generated keys.
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn key_store_file(&self) -> PathBuf {
        self.keys_dir().join(KEY_STORE_FILE_NAME)
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(ENV_FILE_NAME)
    }

    pub fn resolver_file(&self) -> PathBuf {
        self.root.join(RESOLVER_FILE_NAME)
    }

    /// Zero-knowledge circuits shipped with the source tree.
    pub fn circuits_dir(&self) -> PathBuf {
        self.source_dir().join("pkg/credentials/circuits")
    }

    /// Install progress checkpoint.
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Path of a published executable.
    pub fn binary(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    /// The fixed directory tree, parents first.
    pub fn directories(&self) -> [PathBuf; 3] {
        [self.root.clone(), self.bin_dir(), self.keys_dir()]
    }
}

/// Exclusive lock on an installation home, released on drop.
///
/// Backed by an advisory OS lock on a file that stays in place, so a
/// crashed holder releases it with its process.
#[derive(Debug)]
pub struct HomeLock {
    path: PathBuf,
    file: File,
}

impl HomeLock {
    pub fn acquire(home: &InstallationHome) -> Result<Self> {
        std::fs::create_dir_all(home.root())?;
        let path = home.lock_file();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                warn!(path = %path.display(), holder = holder.trim(), "Home is locked");
                return Err(IssuerError::Locked {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        // informational only, the OS lock is what excludes
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "Acquired home lock");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HomeLock {
    fn drop(&mut self) {
        // the file stays; removing it would let a waiter lock a stale inode
        let _ = self.file.set_len(0);
        debug!(path = %self.path.display(), "Released home lock");
    }
}
