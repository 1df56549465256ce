//! Error records, the propagated error type, and the JSON-lines error log

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::codes::ErrorCode;
use super::taxonomy::{ErrorCategory, RecoveryStrategy, Severity};

/// One thrown error, as resolved by the error engine
///
/// The category is not a field: it is always derived from `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub recovery_strategy: RecoveryStrategy,
    pub occurrence_count: u32,
}

impl ErrorRecord {
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Single colorized console line
    pub fn console_line(&self) -> String {
        format!(
            "{}[{}]\x1b[0m {} [{}] {} \x1b[2m(context: {}, recovery: {})\x1b[0m",
            self.severity.ansi_color(),
            self.severity.label(),
            self.code,
            self.category(),
            self.message,
            self.context,
            self.recovery_strategy,
        )
    }
}

/// Error propagated out of a failed operation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{}] {}", .record.code, .record.message)]
pub struct DeploymentError {
    record: ErrorRecord,
}

impl DeploymentError {
    pub fn new(record: ErrorRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &ErrorRecord {
        &self.record
    }

    pub fn code(&self) -> ErrorCode {
        self.record.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.record.category()
    }

    pub fn severity(&self) -> Severity {
        self.record.severity
    }

    pub fn recovery(&self) -> RecoveryStrategy {
        self.record.recovery_strategy
    }

    pub fn context(&self) -> &str {
        &self.record.context
    }

    /// Process exit status for this error
    pub fn exit_status(&self) -> u8 {
        self.category().exit_status()
    }
}

/// Line format of the error log: the record plus its derived category
#[derive(Serialize)]
struct LogLine<'a> {
    #[serde(flatten)]
    record: &'a ErrorRecord,
    category: ErrorCategory,
}

/// Append-only JSON-lines log of thrown errors
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line
    pub fn append(&self, record: &ErrorRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(&LogLine {
            record,
            category: record.category(),
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open error log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write error log: {}", self.path.display()))?;

        Ok(())
    }

    /// Read every record back; unparseable lines are skipped with a warning
    pub fn read_all(&self) -> Result<Vec<ErrorRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open error log: {}", self.path.display()));
            }
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read error log")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ErrorRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed error log line"),
            }
        }

        Ok(records)
    }
}
