//! Append-only audit log of terminal answers.
//!
//! One JSON object per line. The first write failure disables the log for
//! the rest of the process; answers are never held back by it.

use agri_core::{AppError, AppResult};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// RFC 3339, UTC
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    pub reason: String,
}

impl AuditRecord {
    pub fn new(question: &str, answer: &str, reason: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            question: question.to_string(),
            answer: answer.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Shared append-only audit log.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    disabled: AtomicBool,
}

impl AuditLog {
    /// Open (or create) the log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Logging(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Logging(format!("Failed to open {}: {}", path.display(), e)))?;

        tracing::debug!("Audit log at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            disabled: AtomicBool::new(false),
        })
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: Mutex::new(None),
            disabled: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Acquire)
    }

    /// Append one record.
    ///
    /// A no-op once the log is disabled. On failure the log disables itself
    /// and the error is returned for the caller to note.
    pub fn append(&self, question: &str, answer: &str, reason: &str) -> AppResult<()> {
        self.append_record(&AuditRecord::new(question, answer, reason))
    }

    /// Append from async code. The write and flush run on tokio's blocking
    /// pool.
    pub async fn append_async(self: &Arc<Self>, question: &str, answer: &str, reason: &str) -> AppResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let log = Arc::clone(self);
        let record = AuditRecord::new(question, answer, reason);
        tokio::task::spawn_blocking(move || log.append_record(&record))
            .await
            .map_err(|e| AppError::Logging(format!("Audit write task failed: {}", e)))?
    }

    fn append_record(&self, record: &AuditRecord) -> AppResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let line = serde_json::to_string(record)?;

        self.write_line(&line).inspect_err(|e| {
            self.disabled.store(true, Ordering::Release);
            tracing::warn!("Audit logging disabled for this process: {}", e);
        })
    }

    fn write_line(&self, line: &str) -> AppResult<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| AppError::Logging("audit log lock poisoned".to_string()))?;

        let file = guard
            .as_mut()
            .ok_or_else(|| AppError::Logging("audit log is closed".to_string()))?;

        writeln!(file, "{}", line)
            .and_then(|_| file.flush())
            .map_err(|e| {
                *guard = None;
                AppError::Logging(format!("Failed to write {}: {}", self.path.display(), e))
            })
    }
}
