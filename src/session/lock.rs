//! Session lock
//!
//! A readers/writer lock shared between unrelated processes, backed by
//! `flock(2)` on a per-container file:
//! - Every active session holds a shared claim for its whole lifetime.
//! - A session finishing tries to upgrade to exclusive without blocking;
//!   that only succeeds when no other session holds a shared claim.
//! - Claims belong to an open file description, so dropping the claim (or
//!   the process dying) releases it.
//!
//! A second file guards the start transition so concurrent sessions never
//! start the same container twice.
//!
//! Waiting is done by retrying the non-blocking form, so a waiter can give
//! up as soon as it is interrupted.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use fs2::FileExt;

use crate::error::{AppContainerError, Result};

/// Named, persistent, process-shared session lock for one container
#[derive(Debug, Clone)]
pub struct SessionLock {
    name: String,
    claims_path: PathBuf,
    startup_path: PathBuf,
}

/// "I am an active user of this container"
#[derive(Debug)]
pub struct SharedClaim {
    file: File,
}

/// "I am the only user of this container"
#[derive(Debug)]
pub struct ExclusiveClaim {
    _file: File,
}

/// Held while checking and starting the container
#[derive(Debug)]
pub struct StartupGuard {
    _file: File,
}

impl SessionLock {
    /// Lock for `name` with its files under `dir`; nothing is created yet
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            claims_path: dir.join(format!("{}.lock", name)),
            startup_path: dir.join(format!("{}.start", name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.claims_path
    }

    fn open(&self, path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                AppContainerError::Lock(format!("Failed to open {}: {}", path.display(), e))
            })
    }

    /// Take a shared claim, waiting while someone holds the exclusive claim.
    ///
    /// Gives up with `Interrupted` once `cancelled` is set.
    pub fn acquire_shared(&self, poll: Duration, cancelled: &AtomicBool) -> Result<SharedClaim> {
        let claim = wait_for(poll, cancelled, || self.try_acquire_shared())?;
        tracing::debug!(container = %self.name, "acquired shared session claim");
        Ok(claim)
    }

    /// Take a shared claim only if that does not require waiting
    pub fn try_acquire_shared(&self) -> Result<Option<SharedClaim>> {
        let file = self.open(&self.claims_path)?;
        Ok(try_lock(&file, <File as FileExt>::try_lock_shared)?.then_some(SharedClaim { file }))
    }

    /// Take the exclusive claim only if no shared claim is outstanding
    pub fn try_exclusive(&self) -> Result<Option<ExclusiveClaim>> {
        let file = self.open(&self.claims_path)?;
        Ok(try_lock(&file, <File as FileExt>::try_lock_exclusive)?
            .then_some(ExclusiveClaim { _file: file }))
    }

    /// Serialise start transitions between sessions, waiting for our turn
    pub fn startup_guard(&self, poll: Duration, cancelled: &AtomicBool) -> Result<StartupGuard> {
        wait_for(poll, cancelled, || self.try_startup_guard())
    }

    pub fn try_startup_guard(&self) -> Result<Option<StartupGuard>> {
        let file = self.open(&self.startup_path)?;
        Ok(try_lock(&file, <File as FileExt>::try_lock_exclusive)?
            .then_some(StartupGuard { _file: file }))
    }
}

impl SharedClaim {
    /// Try to become the only session.
    ///
    /// flock conversions are not atomic: the shared claim is given up either
    /// way, which is why this consumes the claim.
    pub fn try_upgrade(self) -> Result<Option<ExclusiveClaim>> {
        let file = self.file;
        Ok(try_lock(&file, <File as FileExt>::try_lock_exclusive)?
            .then_some(ExclusiveClaim { _file: file }))
    }
}

/// Non-blocking lock attempt: `Ok(false)` when another holder conflicts
fn try_lock(file: &File, lock: fn(&File) -> io::Result<()>) -> Result<bool> {
    match lock(file) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
        Err(e) => Err(AppContainerError::Lock(format!("flock failed: {}", e))),
    }
}

fn wait_for<T, F>(poll: Duration, cancelled: &AtomicBool, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    loop {
        if let Some(held) = attempt()? {
            return Ok(held);
        }
        if cancelled.load(Ordering::SeqCst) {
            return Err(AppContainerError::Interrupted);
        }
        thread::sleep(poll);
    }
}
