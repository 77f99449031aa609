//! Audit log
//!
//! Human-readable, append-only record of every decision a run makes.
//! Every entry is mirrored to `tracing` at the matching level.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sweeper_util::{format_backup_stamp, format_log_timestamp};
use tracing::{error, info, warn};

/// Size at which the log is rotated to a backup
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Age after which the log is truncated at run start
pub const MAX_LOG_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One audit line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub level: AuditLevel,
    pub message: String,
}

impl AuditEntry {
    pub fn new(level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: sweeper_util::now(),
            level,
            message: message.into(),
        }
    }

    /// `YYYY-MM-DD HH:MM:SS [LEVEL] - message`
    pub fn line(&self) -> String {
        format!(
            "{} [{}] - {}",
            format_log_timestamp(&self.timestamp),
            self.level,
            self.message
        )
    }
}

/// File-backed audit log
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    written: usize,
    errors: usize,
}

impl AuditLog {
    /// Open for a run: creates the file if needed and truncates it when
    /// it was last modified more than [`MAX_LOG_AGE`] ago.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let mut log = Self::open_append(path)?;
        if log.is_stale(MAX_LOG_AGE)? {
            fs::File::create(&log.path)?;
            log.info("Log file older than 24 hours. Truncated to capture only the latest run.");
        }
        Ok(log)
    }

    /// Open without any age maintenance.
    ///
    /// Used when the run never got the instance lock: another run owns the
    /// file's lifecycle, this one may only add a line.
    pub fn open_append(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            max_bytes: MAX_LOG_BYTES,
            written: 0,
            errors: 0,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written through this handle
    pub fn written(&self) -> usize {
        self.written
    }

    /// ERROR entries written through this handle
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(AuditLevel::Error, message);
    }

    /// Append one entry. A failed write is reported through `tracing`
    /// only; the run never stops because its log is unwritable.
    pub fn record(&mut self, level: AuditLevel, message: impl Into<String>) {
        let entry = AuditEntry::new(level, message);

        match entry.level {
            AuditLevel::Info => info!(target: "audit", "{}", entry.message),
            AuditLevel::Warning => warn!(target: "audit", "{}", entry.message),
            AuditLevel::Error => error!(target: "audit", "{}", entry.message),
        }

        if let Err(e) = self.append_line(&entry.line()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write audit entry");
            return;
        }
        self.written += 1;
        if entry.level == AuditLevel::Error {
            self.errors += 1;
        }

        match self.rotate_if_needed() {
            // The fresh file carries the message that filled the old one
            Ok(true) => {
                if let Err(e) = self.append_line(&entry.line()) {
                    warn!(path = %self.path.display(), error = %e, "Failed to write audit entry");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to rotate audit log"),
        }
    }

    fn append_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)
    }

    fn is_stale(&self, max_age: Duration) -> io::Result<bool> {
        let modified = fs::metadata(&self.path)?.modified()?;
        Ok(SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age > max_age))
    }

    fn rotate_if_needed(&mut self) -> io::Result<bool> {
        let size = fs::metadata(&self.path)?.len();
        if size < self.max_bytes {
            return Ok(false);
        }

        let backup = self.backup_path();
        fs::rename(&self.path, &backup)?;
        fs::File::create(&self.path)?;

        let notice = AuditEntry::new(
            AuditLevel::Info,
            format!("Log file rotated due to size exceeding {} bytes.", self.max_bytes),
        );
        info!(target: "audit", backup = %backup.display(), "{}", notice.message);
        self.append_line(&notice.line())?;
        self.written += 1;
        Ok(true)
    }

    /// `<log>.<yyyyMMddHHmmss>.bak`, suffixed if that second is taken
    fn backup_path(&self) -> PathBuf {
        let stamp = format_backup_stamp(&sweeper_util::now());
        let base = format!("{}.{}", self.path.display(), stamp);
        let mut candidate = PathBuf::from(format!("{}.bak", base));
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}-{}.bak", base, n));
            n += 1;
        }
        candidate
    }
}
