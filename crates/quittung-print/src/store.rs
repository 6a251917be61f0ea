// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable storage for the pending queue and the dead-letter list.
//
// Both files are pretty-printed JSON arrays of `PrintJob` records and are
// always replaced whole: the new contents go to a temp file in the same
// directory which is then renamed over the old one, so a reader sees either
// the previous list or the next one, never a torn write.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use quittung_core::error::{QuittungError, Result};
use quittung_core::types::PrintJob;

/// Persistence collaborator used by the queue engine.
///
/// The engine is the only writer, so implementations need not guard against
/// concurrent external writers.
pub trait JobStore: Send + Sync {
    /// Overwrite the stored queue with `jobs`, in order.
    fn save_queue(&self, jobs: &[PrintJob]) -> Result<()>;

    /// Load the stored queue.  `Ok(None)` means nothing has been stored yet,
    /// which callers must not confuse with a parse error.
    fn load_queue(&self) -> Result<Option<Vec<PrintJob>>>;

    /// Add `job` to the dead-letter list.
    fn append_dead_letter(&self, job: &PrintJob) -> Result<()>;

    /// All dead-lettered jobs (empty if none).
    fn dead_letters(&self) -> Result<Vec<PrintJob>>;
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// File-backed store writing `queue.json` and `dead-letter.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    queue_path: PathBuf,
    dead_letter_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(queue_path: impl Into<PathBuf>, dead_letter_path: impl Into<PathBuf>) -> Self {
        Self {
            queue_path: queue_path.into(),
            dead_letter_path: dead_letter_path.into(),
        }
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    pub fn dead_letter_path(&self) -> &Path {
        &self.dead_letter_path
    }
}

impl JobStore for JsonFileStore {
    #[instrument(skip_all, fields(path = %self.queue_path.display(), count = jobs.len()))]
    fn save_queue(&self, jobs: &[PrintJob]) -> Result<()> {
        write_atomically(&self.queue_path, jobs)?;
        debug!("queue persisted");
        Ok(())
    }

    #[instrument(skip_all, fields(path = %self.queue_path.display()))]
    fn load_queue(&self) -> Result<Option<Vec<PrintJob>>> {
        read_list(&self.queue_path)
    }

    #[instrument(skip_all, fields(path = %self.dead_letter_path.display(), job_id = %job.id))]
    fn append_dead_letter(&self, job: &PrintJob) -> Result<()> {
        let mut dead = match read_list(&self.dead_letter_path) {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                // Keep the unreadable file for inspection instead of
                // overwriting records we could not parse.
                let aside = quarantine_path(&self.dead_letter_path);
                warn!(error = %e, moved_to = %aside.display(), "dead-letter file unreadable, starting a new one");
                std::fs::rename(&self.dead_letter_path, &aside)?;
                Vec::new()
            }
        };
        dead.push(job.clone());
        write_atomically(&self.dead_letter_path, &dead)?;
        info!(total = dead.len(), "job written to dead-letter store");
        Ok(())
    }

    fn dead_letters(&self) -> Result<Vec<PrintJob>> {
        Ok(read_list(&self.dead_letter_path)?.unwrap_or_default())
    }
}

fn read_list(path: &Path) -> Result<Option<Vec<PrintJob>>> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(QuittungError::Io(e)),
    };
    let jobs: Vec<PrintJob> = serde_json::from_str(&data)?;
    Ok(Some(jobs))
}

fn write_atomically(path: &Path, jobs: &[PrintJob]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let json = serde_json::to_vec_pretty(jobs)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| QuittungError::Store(format!("rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}

fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{stamp}"));
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Volatile store for tests and for running without a writable data dir.
#[derive(Debug, Default)]
pub struct MemoryStore {
    queue: Mutex<Option<Vec<PrintJob>>>,
    dead: Mutex<Vec<PrintJob>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the stored queue, as if written by an earlier process.
    pub fn with_queue(jobs: Vec<PrintJob>) -> Self {
        Self {
            queue: Mutex::new(Some(jobs)),
            ..Self::default()
        }
    }

    /// How many times `save_queue` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }

    /// Last saved queue, if any.
    pub fn saved_queue(&self) -> Option<Vec<PrintJob>> {
        self.queue.lock().ok().and_then(|q| q.clone())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> QuittungError {
    QuittungError::Store("memory store lock poisoned".into())
}

impl JobStore for MemoryStore {
    fn save_queue(&self, jobs: &[PrintJob]) -> Result<()> {
        *self.queue.lock().map_err(poisoned)? = Some(jobs.to_vec());
        *self.saves.lock().map_err(poisoned)? += 1;
        Ok(())
    }

    fn load_queue(&self) -> Result<Option<Vec<PrintJob>>> {
        Ok(self.queue.lock().map_err(poisoned)?.clone())
    }

    fn append_dead_letter(&self, job: &PrintJob) -> Result<()> {
        self.dead.lock().map_err(poisoned)?.push(job.clone());
        Ok(())
    }

    fn dead_letters(&self) -> Result<Vec<PrintJob>> {
        Ok(self.dead.lock().map_err(poisoned)?.clone())
    }
}
