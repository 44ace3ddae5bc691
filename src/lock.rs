//! Named locks serializing operations on the same share or snapshot.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Result, WfaError};

const LOCK_FILE_PREFIX: &str = "wfa_share-";

type Registry = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Held lock; released when dropped.
pub struct LockGuard {
    name: String,
    held: Held,
}

enum Held {
    Memory {
        guard: Option<OwnedMutexGuard<()>>,
        registry: Registry,
    },
    /// The OS releases the advisory lock when the file is closed, including
    /// when the process dies.
    File(#[allow(dead_code)] File),
}

impl LockGuard {
    /// Name the lock was acquired under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Held::Memory { guard, registry } = &mut self.held {
            // Holding the registry keeps new waiters out while deciding.
            let mut locks = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(guard) = guard.take() {
                let mutex = OwnedMutexGuard::mutex(&guard);
                let unused = locks
                    .get(&self.name)
                    .is_some_and(|entry| Arc::ptr_eq(entry, mutex) && Arc::strong_count(entry) <= 2);
                if unused {
                    locks.remove(&self.name);
                }
                drop(guard);
            }
        }
        tracing::trace!(lock = %self.name, "Released lock");
    }
}

/// Source of named mutual exclusion.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Wait until the lock `name` is free and take it.
    async fn acquire(&self, name: &str) -> Result<LockGuard>;
}

/// Locks shared by tasks of a single process.
///
/// Entries only live while a guard or a waiter exists for the name.
#[derive(Clone, Default)]
pub struct InProcessLocks {
    locks: Registry,
}

impl InProcessLocks {
    /// Create an empty set of locks.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockProvider for InProcessLocks {
    async fn acquire(&self, name: &str) -> Result<LockGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        tracing::trace!(lock = name, "Acquired lock");
        Ok(LockGuard {
            name: name.to_string(),
            held: Held::Memory {
                guard: Some(guard),
                registry: self.locks.clone(),
            },
        })
    }
}

/// Take an exclusive advisory lock on `file` without blocking.
///
/// `Ok(false)` means another handle holds it.
pub(crate) fn try_lock_file(file: &File) -> std::io::Result<bool> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// Open (creating if needed) the file backing a lock. Never truncates.
pub(crate) fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Locks shared between processes through advisory locks on files in a
/// directory.
///
/// Lock files stay in place after release; only the OS lock on them counts.
pub struct FileLocks {
    dir: PathBuf,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl FileLocks {
    /// Create a provider keeping its lock files in `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }

    /// Give up waiting after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Path of the lock file for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let file_name: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}{}", LOCK_FILE_PREFIX, file_name))
    }
}

#[async_trait]
impl LockProvider for FileLocks {
    async fn acquire(&self, name: &str) -> Result<LockGuard> {
        let lock_error = |message: String| WfaError::Lock {
            name: name.to_string(),
            message,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| lock_error(e.to_string()))?;

        let path = self.lock_path(name);
        let file = open_lock_file(&path).map_err(|e| lock_error(e.to_string()))?;
        let started = Instant::now();

        loop {
            if try_lock_file(&file).map_err(|e| lock_error(e.to_string()))? {
                tracing::trace!(lock = name, path = %path.display(), "Acquired lock");
                return Ok(LockGuard {
                    name: name.to_string(),
                    held: Held::File(file),
                });
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    return Err(lock_error(format!(
                        "still held after {:?} ({})",
                        timeout,
                        path.display()
                    )));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
