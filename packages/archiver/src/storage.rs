//! Ephemeral staging storage: per-job directories under a volatile root,
//! reclaimed by an age-based sweep.
//!
//! Each fetch job owns exactly one directory at `root/<job_id>/`. The
//! sweep deletes directories older than the retention window, skipping
//! any marked in-use by an active serve. In-use markers live in a
//! lock-guarded shared set rather than relying on open file descriptors
//! to block deletion, which is not portable.
//!
//! Directories allocated before a process restart lose their recorded
//! creation time; the sweep falls back to filesystem mtime for those,
//! so crashed jobs are still reclaimed.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// A freshly allocated per-job staging directory.
#[derive(Debug, Clone)]
pub struct StagingDir {
    pub job_id: Uuid,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one reclamation sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Directories deleted this pass
    pub deleted: usize,
    /// Directories younger than the retention window
    pub retained: usize,
    /// Directories skipped because a serve is in progress
    pub skipped_in_use: usize,
}

#[derive(Debug, Default)]
struct Inner {
    created: HashMap<Uuid, DateTime<Utc>>,
    in_use: HashSet<Uuid>,
}

/// Owner of the staging root and its lifecycle.
#[derive(Debug)]
pub struct StagingStore {
    root: PathBuf,
    retention: Duration,
    inner: Mutex<Inner>,
}

impl StagingStore {
    /// Create a store over a staging root. The root itself is created
    /// lazily on first allocation.
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The staging root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Allocate a fresh directory for a job.
    ///
    /// Directories are never reused across jobs; the job id makes the
    /// name unique. Fails with [`StorageError::Unavailable`] when the
    /// root cannot be created or written.
    pub fn allocate(&self, job_id: Uuid) -> StorageResult<StagingDir> {
        self.allocate_at(job_id, Utc::now())
    }

    pub(crate) fn allocate_at(
        &self,
        job_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> StorageResult<StagingDir> {
        fs::create_dir_all(&self.root).map_err(StorageError::Unavailable)?;

        let path = self.root.join(job_id.to_string());
        fs::create_dir(&path).map_err(StorageError::Unavailable)?;

        self.inner
            .lock()
            .expect("staging lock poisoned")
            .created
            .insert(job_id, created_at);

        debug!(job_id = %job_id, path = %path.display(), "staging directory allocated");
        Ok(StagingDir {
            job_id,
            path,
            created_at,
        })
    }

    /// Mark a job's directory as being actively served.
    ///
    /// The returned guard clears the marker on drop, including when the
    /// client disconnects mid-stream and the response body is dropped.
    pub fn mark_in_use(self: &Arc<Self>, job_id: Uuid) -> ServeGuard {
        self.inner
            .lock()
            .expect("staging lock poisoned")
            .in_use
            .insert(job_id);
        ServeGuard {
            store: Arc::clone(self),
            job_id,
        }
    }

    fn release(&self, job_id: Uuid) {
        self.inner
            .lock()
            .expect("staging lock poisoned")
            .in_use
            .remove(&job_id);
        debug!(job_id = %job_id, "staging directory released");
    }

    /// Delete every staging directory older than the retention window.
    ///
    /// Skips directories marked in-use and, because eligibility is
    /// judged by creation time against `now`, can never delete a
    /// directory allocated after the scan began. Idempotent; a deletion
    /// failure is logged and retried on the next pass.
    pub fn sweep(&self, now: DateTime<Utc>) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // Nothing allocated yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = now - retention;

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let Some(job_id) = entry
                .file_name()
                .to_str()
                .and_then(|n| Uuid::parse_str(n).ok())
            else {
                debug!(path = %entry.path().display(), "ignoring foreign entry in staging root");
                continue;
            };

            let (created_at, in_use) = {
                let inner = self.inner.lock().expect("staging lock poisoned");
                (inner.created.get(&job_id).copied(), inner.in_use.contains(&job_id))
            };

            if in_use {
                report.skipped_in_use += 1;
                continue;
            }

            // Orphans from a previous process are judged by fs mtime.
            let created_at = match created_at {
                Some(at) => at,
                None => match entry.metadata().and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(e) => {
                        warn!(job_id = %job_id, error = %e, "cannot determine staging dir age");
                        report.retained += 1;
                        continue;
                    }
                },
            };

            if created_at >= cutoff {
                report.retained += 1;
                continue;
            }

            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    self.inner
                        .lock()
                        .expect("staging lock poisoned")
                        .created
                        .remove(&job_id);
                    report.deleted += 1;
                    debug!(job_id = %job_id, "staging directory reclaimed");
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "failed to delete staging directory");
                    report.retained += 1;
                }
            }
        }

        info!(
            deleted = report.deleted,
            retained = report.retained,
            skipped_in_use = report.skipped_in_use,
            "staging sweep complete"
        );
        Ok(report)
    }
}

/// Drop guard keeping one staging directory out of the sweep's reach
/// while a serve is in progress.
#[derive(Debug)]
pub struct ServeGuard {
    store: Arc<StagingStore>,
    job_id: Uuid,
}

impl ServeGuard {
    /// The guarded job id.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

impl Drop for ServeGuard {
    fn drop(&mut self) {
        self.store.release(self.job_id);
    }
}
