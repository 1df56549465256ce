//! Error state: occurrence counters, context stack and `throw`

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};

use chrono::Utc;
use tracing::{error, info, warn};

use super::codes::ErrorCode;
use super::record::{DeploymentError, ErrorLog, ErrorRecord};
use super::taxonomy::{ErrorCategory, RecoveryStrategy, Severity};

/// Context reported when no frame is active
pub const ROOT_CONTEXT: &str = "main";

/// Separator between nested context frames
const CONTEXT_SEPARATOR: &str = " > ";

/// What to throw; anything left unset comes from the code's defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ThrowSpec {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub category: Option<ErrorCategory>,
    pub severity: Option<Severity>,
    pub recovery: Option<RecoveryStrategy>,
}

impl ThrowSpec {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            category: None,
            severity: None,
            recovery: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Expected category; ignored (with a warning) if it disagrees with the code
    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = Some(recovery);
        self
    }
}

impl From<ErrorCode> for ThrowSpec {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// Per-session error state, owned by the driver
///
/// Holds the per-code occurrence counters, the operation context stack and
/// the last thrown record. Independent instances never share anything.
#[derive(Debug, Default)]
pub struct ErrorState {
    counters: HashMap<ErrorCode, u32>,
    /// Strategy each code was last thrown with
    strategies: HashMap<ErrorCode, RecoveryStrategy>,
    context: Vec<String>,
    last_error: Option<ErrorRecord>,
    log: Option<ErrorLog>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every thrown record to `log`
    pub fn with_log(log: ErrorLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Resolve, count, record and log an error, returning it for propagation
    pub fn throw(&mut self, spec: impl Into<ThrowSpec>) -> DeploymentError {
        let spec = spec.into();
        let code = spec.code;

        if let Some(expected) = spec.category {
            if expected != code.category() {
                warn!(
                    code = code.value(),
                    expected = %expected,
                    actual = %code.category(),
                    "Category does not match code band, using the band"
                );
            }
        }

        let occurrence_count = {
            let count = self.counters.entry(code).or_insert(0);
            *count += 1;
            *count
        };

        let record = ErrorRecord {
            code,
            message: spec
                .message
                .unwrap_or_else(|| code.default_message().to_string()),
            severity: spec.severity.unwrap_or_else(|| code.default_severity()),
            timestamp: Utc::now(),
            context: self.current_context(),
            recovery_strategy: spec.recovery.unwrap_or_else(|| code.default_recovery()),
            occurrence_count,
        };

        self.strategies.insert(code, record.recovery_strategy);
        emit(&record);

        if let Some(log) = &self.log {
            if let Err(e) = log.append(&record) {
                warn!(path = %log.path().display(), error = ?e, "Failed to write error log");
            }
        }

        self.last_error = Some(record.clone());
        DeploymentError::new(record)
    }

    /// Times `code` has been thrown in this session
    pub fn occurrences(&self, code: ErrorCode) -> u32 {
        self.counters.get(&code).copied().unwrap_or(0)
    }

    /// All counters, ordered by code
    pub fn counts(&self) -> BTreeMap<ErrorCode, u32> {
        self.counters.iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Whether `code` should be retried: it was last thrown with the retry
    /// strategy (its default if never thrown) and has been seen fewer than
    /// `max` times
    pub fn should_retry(&self, code: ErrorCode, max: u32) -> bool {
        let strategy = self
            .strategies
            .get(&code)
            .copied()
            .unwrap_or_else(|| code.default_recovery());
        strategy == RecoveryStrategy::Retry && self.occurrences(code) < max
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    /// Forget counters and the last error (context frames are kept)
    pub fn reset(&mut self) {
        self.counters.clear();
        self.strategies.clear();
        self.last_error = None;
    }

    pub fn push_context(&mut self, name: impl Into<String>) {
        self.context.push(name.into());
    }

    pub fn pop_context(&mut self) -> Option<String> {
        self.context.pop()
    }

    /// Innermost frame
    pub fn top_context(&self) -> Option<&str> {
        self.context.last().map(String::as_str)
    }

    /// Full frame path, outermost first
    pub fn current_context(&self) -> String {
        if self.context.is_empty() {
            ROOT_CONTEXT.to_string()
        } else {
            self.context.join(CONTEXT_SEPARATOR)
        }
    }

    pub fn context_depth(&self) -> usize {
        self.context.len()
    }

    /// Push a frame that is popped when the guard drops
    pub fn enter(&mut self, name: impl Into<String>) -> ContextGuard<'_> {
        let depth = self.context.len();
        self.context.push(name.into());
        ContextGuard { state: self, depth }
    }

    /// Run `op` with `name` pushed; the frame is gone once this returns,
    /// whether `op` succeeded, failed or panicked
    pub fn with_context<R>(
        &mut self,
        name: impl Into<String>,
        op: impl FnOnce(&mut ErrorState) -> R,
    ) -> R {
        let mut guard = self.enter(name);
        op(&mut guard)
    }
}

/// Scope guard for one context frame
///
/// Restores the stack to its depth before the frame was pushed, which also
/// discards anything pushed inside the scope and never popped.
pub struct ContextGuard<'a> {
    state: &'a mut ErrorState,
    depth: usize,
}

impl Deref for ContextGuard<'_> {
    type Target = ErrorState;

    fn deref(&self) -> &ErrorState {
        self.state
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut ErrorState {
        self.state
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.state.context.truncate(self.depth);
    }
}

fn emit(record: &ErrorRecord) {
    let code = record.code.value();
    let category = record.category();
    match record.severity {
        Severity::Info => info!(
            code,
            %category,
            context = %record.context,
            recovery = %record.recovery_strategy,
            count = record.occurrence_count,
            "{}",
            record.message
        ),
        Severity::Warning => warn!(
            code,
            %category,
            context = %record.context,
            recovery = %record.recovery_strategy,
            count = record.occurrence_count,
            "{}",
            record.message
        ),
        Severity::Error | Severity::Critical => error!(
            code,
            %category,
            severity = %record.severity,
            context = %record.context,
            recovery = %record.recovery_strategy,
            count = record.occurrence_count,
            "{}",
            record.message
        ),
    }
}
