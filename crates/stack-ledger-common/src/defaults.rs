//! Default configuration values shared across stack-ledger crates

/// Stack name used when neither config nor environment provide one
pub const DEFAULT_STACK_NAME: &str = "stack-ledger";

/// Region used when neither config nor environment provide one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment label used for tags
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default number of attempts for retried operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default first retry delay in seconds
pub const DEFAULT_BASE_DELAY_SECS: u64 = 1;

/// Default cap on retry delay in seconds
pub const DEFAULT_MAX_DELAY_SECS: u64 = 60;

/// Default number of times one error code may be retried before escalating
pub const DEFAULT_MAX_RETRIES_PER_CODE: u32 = 3;

/// File name of the state store inside the data directory
pub const STATE_FILE_NAME: &str = "state.json";

/// File name of the JSON-lines error log inside the data directory
pub const ERROR_LOG_FILE_NAME: &str = "errors.jsonl";
