//! Self-healing filesystem operations
//!
//! Every operation wraps a single underlying `std::fs` call in a fresh
//! [`RetryPolicy`] scoped to that call, filtered to the failure kinds known
//! to be transient for that operation. Write-class operations heal a missing
//! parent directory on the first such failure; delete heals a protection
//! flag on the first permission-denied failure. Healing is best-effort and
//! never masks the failure being retried.

use std::fs::{self, File, Metadata, OpenOptions, Permissions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, Utc};
use tracing::debug;

use crate::error::{FailureKind, StorageError, StorageResult};
use crate::retry::RetryPolicy;

// Standard policy for local disk I/O
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_DELAY: Duration = Duration::from_millis(3000);

/// Filesystem operations with per-call retry and one-shot self-healing.
///
/// The default configuration retries transient failures up to 5 times,
/// 3 seconds apart. Construct with [`ResilientStorage::new`] to tune the
/// budget; each operation still builds its own fresh policy, so nothing is
/// shared between calls.
#[derive(Debug, Clone)]
pub struct ResilientStorage {
    max_attempts: u32,
    delay: Duration,
}

impl Default for ResilientStorage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

impl ResilientStorage {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Fresh per-call policy: transient failures only.
    fn policy(&self) -> RetryPolicy<StorageError> {
        RetryPolicy::new(self.max_attempts, self.delay)
            .filter(|e: &StorageError| e.kind() == FailureKind::Transient)
    }

    /// Write-class policy: additionally retries a missing parent directory,
    /// creating the directory tree on the first such failure.
    fn write_policy(&self, target: &Path) -> RetryPolicy<StorageError> {
        let target = target.to_path_buf();
        self.policy()
            .filter(|e: &StorageError| e.kind() == FailureKind::MissingParent)
            .on_failure(move |err, n| {
                if n == 1 && err.kind() == FailureKind::MissingParent {
                    ensure_parent_dir(&target);
                }
            })
    }

    /// Whether `path` exists. The underlying check already swallows
    /// transient errors, so no retry wrapping is applied.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    /// Read an entire file as UTF-8 text.
    pub fn read_to_string(&self, path: impl AsRef<Path>) -> StorageResult<String> {
        let path = path.as_ref();
        self.policy()
            .run(|| fs::read_to_string(path).map_err(|e| StorageError::read(path, e)))
    }

    /// Read an entire file as UTF-8 text, split into lines.
    pub fn read_lines(&self, path: impl AsRef<Path>) -> StorageResult<Vec<String>> {
        Ok(self
            .read_to_string(path)?
            .lines()
            .map(str::to_owned)
            .collect())
    }

    /// Read an entire file as bytes.
    pub fn read(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        let path = path.as_ref();
        self.policy()
            .run(|| fs::read(path).map_err(|e| StorageError::read(path, e)))
    }

    /// Open a file for reading.
    pub fn open_read(&self, path: impl AsRef<Path>) -> StorageResult<File> {
        let path = path.as_ref();
        self.policy()
            .run(|| File::open(path).map_err(|e| StorageError::read(path, e)))
    }

    /// Write text to a file, replacing any previous contents. Creates the
    /// parent directory if it is missing.
    pub fn write_string(&self, path: impl AsRef<Path>, text: impl AsRef<str>) -> StorageResult<()> {
        self.write(path, text.as_ref().as_bytes())
    }

    /// Write bytes to a file, replacing any previous contents. Creates the
    /// parent directory if it is missing.
    pub fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> StorageResult<()> {
        let path = path.as_ref();
        let contents = contents.as_ref();
        self.write_policy(path)
            .run(|| fs::write(path, contents).map_err(|e| StorageError::write(path, e)))
    }

    /// Append text to a file, creating file and parent directory as needed.
    pub fn append_string(&self, path: impl AsRef<Path>, text: impl AsRef<str>) -> StorageResult<()> {
        let path = path.as_ref();
        let text = text.as_ref();
        self.write_policy(path).run(|| {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| StorageError::write(path, e))?;
            file.write_all(text.as_bytes())
                .map_err(|e| StorageError::write(path, e))
        })
    }

    /// Open or create a file for writing without truncating it. Creates the
    /// parent directory if it is missing.
    pub fn open_write(&self, path: impl AsRef<Path>) -> StorageResult<File> {
        let path = path.as_ref();
        self.write_policy(path).run(|| {
            OpenOptions::new()
                .write(true)
                .create(true)
                .open(path)
                .map_err(|e| StorageError::write(path, e))
        })
    }

    /// Open or create a file for appending. Creates the parent directory if
    /// it is missing.
    pub fn open_append(&self, path: impl AsRef<Path>) -> StorageResult<File> {
        let path = path.as_ref();
        self.write_policy(path).run(|| {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| StorageError::write(path, e))
        })
    }

    /// Create (or truncate) a file. Creates the parent directory if it is
    /// missing.
    pub fn create(&self, path: impl AsRef<Path>) -> StorageResult<File> {
        let path = path.as_ref();
        self.write_policy(path)
            .run(|| File::create(path).map_err(|e| StorageError::write(path, e)))
    }

    /// Create a directory and all of its missing ancestors.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        self.policy()
            .run(|| fs::create_dir_all(path).map_err(|e| StorageError::write(path, e)))
    }

    /// Delete a file. A no-op when the path does not exist. On the first
    /// permission-denied failure the protection flag is cleared (best-effort)
    /// before retrying.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }

        let target = path.to_path_buf();
        self.policy()
            .filter(|e: &StorageError| e.kind() == FailureKind::PermissionDenied)
            .on_failure(move |err, n| {
                if n == 1 && err.kind() == FailureKind::PermissionDenied {
                    clear_protection_best_effort(&target);
                }
            })
            .run(|| fs::remove_file(path).map_err(|e| StorageError::read(path, e)))
    }

    /// Copy `source` to `dest`, overwriting `dest` if present. An absent
    /// source raises `NotFound` immediately, before any attempt; a missing
    /// destination directory is healed like the other write-class operations.
    pub fn copy(&self, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> StorageResult<u64> {
        let source = source.as_ref();
        let dest = dest.as_ref();
        if !source.exists() {
            return Err(StorageError::not_found(source));
        }

        self.write_policy(dest)
            .run(|| fs::copy(source, dest).map_err(|e| StorageError::write(dest, e)))
    }

    /// Move `source` to `dest`. Same pre-check and destination healing as
    /// [`copy`](ResilientStorage::copy).
    pub fn rename(&self, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> StorageResult<()> {
        let source = source.as_ref();
        let dest = dest.as_ref();
        if !source.exists() {
            return Err(StorageError::not_found(source));
        }

        self.write_policy(dest)
            .run(|| fs::rename(source, dest).map_err(|e| StorageError::write(dest, e)))
    }

    /// Query filesystem metadata for `path`.
    pub fn metadata(&self, path: impl AsRef<Path>) -> StorageResult<Metadata> {
        let path = path.as_ref();
        self.policy()
            .run(|| fs::metadata(path).map_err(|e| StorageError::read(path, e)))
    }

    /// Whether `path` is a hidden file: the hidden attribute on Windows,
    /// the leading-dot convention elsewhere.
    pub fn is_hidden(&self, path: impl AsRef<Path>) -> StorageResult<bool> {
        let path = path.as_ref();
        let metadata = self.metadata(path)?;

        #[cfg(windows)]
        {
            use std::os::windows::fs::MetadataExt;
            const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
            Ok(metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        }
        #[cfg(not(windows))]
        {
            let _ = metadata;
            Ok(path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with('.'))
                .unwrap_or(false))
        }
    }

    /// Clear the protection/read-only flag on `path`, retrying transient
    /// failures.
    pub fn clear_protection(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        self.policy().run(|| {
            let perms = fs::metadata(path)
                .map_err(|e| StorageError::read(path, e))?
                .permissions();
            fs::set_permissions(path, writable(perms)).map_err(|e| StorageError::read(path, e))
        })
    }

    /// Clear the read-only flag on `path`; a no-op when the flag is already
    /// absent.
    pub fn clear_readonly(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        if !self.metadata(path)?.permissions().readonly() {
            return Ok(());
        }
        self.clear_protection(path)
    }

    /// Last modification time of `path` in local time.
    pub fn last_write_time(&self, path: impl AsRef<Path>) -> StorageResult<DateTime<Local>> {
        Ok(self.modified(path.as_ref())?.into())
    }

    /// Last modification time of `path` in UTC.
    pub fn last_write_time_utc(&self, path: impl AsRef<Path>) -> StorageResult<DateTime<Utc>> {
        Ok(self.modified(path.as_ref())?.into())
    }

    fn modified(&self, path: &Path) -> StorageResult<SystemTime> {
        self.policy().run(|| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .map_err(|e| StorageError::read(path, e))
        })
    }
}

/// Make `perms` writable. On Unix this restores the owner-write bit rather
/// than clearing the read-only state for everyone.
fn writable(mut perms: Permissions) -> Permissions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        perms.set_readonly(false);
    }
    perms
}

/// Heal for write-class operations: create the target's parent directory
/// tree, swallowing any failure. The retried operation reports the real
/// error if the directory still cannot be used.
fn ensure_parent_dir(target: &Path) {
    let Some(parent) = target.parent() else {
        return;
    };
    if parent.as_os_str().is_empty() {
        return;
    }

    debug!("Creating missing parent directory {}", parent.display());
    let _ = fs::create_dir_all(parent);
}

/// Heal for delete: make the target writable again, swallowing any failure.
fn clear_protection_best_effort(path: &Path) {
    debug!(
        "Clearing protection flag on {} before retrying delete",
        path.display()
    );
    if let Ok(metadata) = fs::metadata(path) {
        let _ = fs::set_permissions(path, writable(metadata.permissions()));
    }
}
