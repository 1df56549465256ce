//! Numeric error codes and their default resolution tables

use std::fmt;

use serde::{Deserialize, Serialize};

use super::taxonomy::{ErrorCategory, RecoveryStrategy, Severity, category_of};

/// Numeric error code; `0` is success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(0);

    // General (1-99)
    pub const GENERAL_FAILURE: ErrorCode = ErrorCode(1);
    pub const TIMEOUT: ErrorCode = ErrorCode(2);
    pub const INTERRUPTED: ErrorCode = ErrorCode(3);
    pub const MISSING_TOOL: ErrorCode = ErrorCode(4);

    // Configuration (100-199)
    pub const CONFIG_INVALID: ErrorCode = ErrorCode(100);
    pub const CONFIG_MISSING: ErrorCode = ErrorCode(101);
    pub const INVALID_PARAMETER: ErrorCode = ErrorCode(102);

    // Provider (200-299)
    pub const CREDENTIALS_INVALID: ErrorCode = ErrorCode(200);
    pub const PERMISSION_DENIED: ErrorCode = ErrorCode(201);
    pub const REGION_UNAVAILABLE: ErrorCode = ErrorCode(202);
    pub const PROVIDER_API_ERROR: ErrorCode = ErrorCode(203);

    // Capacity (300-399)
    pub const EC2_INSUFFICIENT_CAPACITY: ErrorCode = ErrorCode(300);
    pub const LIMIT_EXCEEDED: ErrorCode = ErrorCode(301);
    pub const SPOT_BID_TOO_LOW: ErrorCode = ErrorCode(302);
    pub const SPOT_PRICE_UNAVAILABLE: ErrorCode = ErrorCode(303);

    // Deployment (400-499)
    pub const DEPLOYMENT_FAILED: ErrorCode = ErrorCode(400);
    pub const RESOURCE_ALREADY_EXISTS: ErrorCode = ErrorCode(401);
    pub const RESOURCE_NOT_FOUND: ErrorCode = ErrorCode(402);
    pub const DEPENDENCY_NOT_READY: ErrorCode = ErrorCode(403);
    pub const ROLLBACK_FAILED: ErrorCode = ErrorCode(404);
    pub const HEALTH_CHECK_FAILED: ErrorCode = ErrorCode(405);

    // Infrastructure (500-599)
    pub const VPC_NOT_FOUND: ErrorCode = ErrorCode(500);
    pub const SUBNET_NOT_FOUND: ErrorCode = ErrorCode(501);
    pub const INSTANCE_LAUNCH_FAILED: ErrorCode = ErrorCode(502);
    pub const RESOURCE_NOT_REGISTERED: ErrorCode = ErrorCode(503);
    pub const DEPENDENCY_CONFLICT: ErrorCode = ErrorCode(504);
    pub const STATE_STORE_FAILED: ErrorCode = ErrorCode(505);

    // Validation (600-699)
    pub const VALIDATION_FAILED: ErrorCode = ErrorCode(600);
    pub const INVALID_TRANSITION: ErrorCode = ErrorCode(601);
    pub const TYPE_NOT_FOUND: ErrorCode = ErrorCode(602);

    // Network (700-799)
    pub const NETWORK_UNREACHABLE: ErrorCode = ErrorCode(700);
    pub const NETWORK_TIMEOUT: ErrorCode = ErrorCode(701);
    pub const DNS_RESOLUTION_FAILED: ErrorCode = ErrorCode(702);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Category derived from the code's band
    pub fn category(self) -> ErrorCategory {
        category_of(self)
    }

    /// Constant name for known codes
    pub fn name(self) -> Option<&'static str> {
        lookup(self).map(|info| info.name)
    }

    /// Message used when the caller does not supply one
    pub fn default_message(self) -> &'static str {
        lookup(self)
            .map(|info| info.message)
            .unwrap_or("Unknown error")
    }

    /// Severity used when the caller does not supply one
    pub fn default_severity(self) -> Severity {
        lookup(self)
            .map(|info| info.severity)
            .unwrap_or(Severity::Error)
    }

    /// Recovery strategy used when the caller does not supply one
    pub fn default_recovery(self) -> RecoveryStrategy {
        if RETRY_CODES.contains(&self) {
            RecoveryStrategy::Retry
        } else if FALLBACK_CODES.contains(&self) {
            RecoveryStrategy::Fallback
        } else if SKIP_CODES.contains(&self) {
            RecoveryStrategy::Skip
        } else if MANUAL_CODES.contains(&self) {
            RecoveryStrategy::Manual
        } else {
            RecoveryStrategy::Abort
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Codes whose default response is to try again
const RETRY_CODES: &[ErrorCode] = &[
    ErrorCode::TIMEOUT,
    ErrorCode::NETWORK_TIMEOUT,
    ErrorCode::EC2_INSUFFICIENT_CAPACITY,
    ErrorCode::DEPENDENCY_NOT_READY,
];

/// Codes whose default response is an alternate resource or path
const FALLBACK_CODES: &[ErrorCode] = &[
    ErrorCode::RESOURCE_NOT_FOUND,
    ErrorCode::VPC_NOT_FOUND,
    ErrorCode::SPOT_BID_TOO_LOW,
];

/// Codes that mean the work is already done
const SKIP_CODES: &[ErrorCode] = &[ErrorCode::RESOURCE_ALREADY_EXISTS];

/// Codes only an operator can fix
const MANUAL_CODES: &[ErrorCode] = &[
    ErrorCode::CREDENTIALS_INVALID,
    ErrorCode::PERMISSION_DENIED,
    ErrorCode::LIMIT_EXCEEDED,
];

struct CodeInfo {
    code: ErrorCode,
    name: &'static str,
    message: &'static str,
    severity: Severity,
}

const fn info(
    code: ErrorCode,
    name: &'static str,
    message: &'static str,
    severity: Severity,
) -> CodeInfo {
    CodeInfo {
        code,
        name,
        message,
        severity,
    }
}

/// Default message and severity per known code
const KNOWN_CODES: &[CodeInfo] = &[
    info(ErrorCode::GENERAL_FAILURE, "GENERAL_FAILURE", "Operation failed", Severity::Error),
    info(ErrorCode::TIMEOUT, "TIMEOUT", "Operation timed out", Severity::Warning),
    info(ErrorCode::INTERRUPTED, "INTERRUPTED", "Operation interrupted", Severity::Error),
    info(
        ErrorCode::MISSING_TOOL,
        "MISSING_TOOL",
        "Required tool is not installed",
        Severity::Critical,
    ),
    info(ErrorCode::CONFIG_INVALID, "CONFIG_INVALID", "Configuration is invalid", Severity::Error),
    info(
        ErrorCode::CONFIG_MISSING,
        "CONFIG_MISSING",
        "Required configuration value is missing",
        Severity::Error,
    ),
    info(
        ErrorCode::INVALID_PARAMETER,
        "INVALID_PARAMETER",
        "Invalid parameter value",
        Severity::Error,
    ),
    info(
        ErrorCode::CREDENTIALS_INVALID,
        "CREDENTIALS_INVALID",
        "Provider credentials are invalid or expired",
        Severity::Critical,
    ),
    info(
        ErrorCode::PERMISSION_DENIED,
        "PERMISSION_DENIED",
        "Permission denied by provider",
        Severity::Critical,
    ),
    info(
        ErrorCode::REGION_UNAVAILABLE,
        "REGION_UNAVAILABLE",
        "Region is not available",
        Severity::Error,
    ),
    info(
        ErrorCode::PROVIDER_API_ERROR,
        "PROVIDER_API_ERROR",
        "Provider API call failed",
        Severity::Error,
    ),
    info(
        ErrorCode::EC2_INSUFFICIENT_CAPACITY,
        "EC2_INSUFFICIENT_CAPACITY",
        "Insufficient instance capacity",
        Severity::Warning,
    ),
    info(ErrorCode::LIMIT_EXCEEDED, "LIMIT_EXCEEDED", "Service limit exceeded", Severity::Critical),
    info(
        ErrorCode::SPOT_BID_TOO_LOW,
        "SPOT_BID_TOO_LOW",
        "Spot bid is below the current price",
        Severity::Warning,
    ),
    info(
        ErrorCode::SPOT_PRICE_UNAVAILABLE,
        "SPOT_PRICE_UNAVAILABLE",
        "Spot price data unavailable",
        Severity::Error,
    ),
    info(
        ErrorCode::DEPLOYMENT_FAILED,
        "DEPLOYMENT_FAILED",
        "Deployment failed",
        Severity::Critical,
    ),
    info(
        ErrorCode::RESOURCE_ALREADY_EXISTS,
        "RESOURCE_ALREADY_EXISTS",
        "Resource already exists",
        Severity::Info,
    ),
    info(
        ErrorCode::RESOURCE_NOT_FOUND,
        "RESOURCE_NOT_FOUND",
        "Resource not found",
        Severity::Warning,
    ),
    info(
        ErrorCode::DEPENDENCY_NOT_READY,
        "DEPENDENCY_NOT_READY",
        "Dependency is not ready yet",
        Severity::Warning,
    ),
    info(
        ErrorCode::ROLLBACK_FAILED,
        "ROLLBACK_FAILED",
        "Rollback did not complete",
        Severity::Critical,
    ),
    info(
        ErrorCode::HEALTH_CHECK_FAILED,
        "HEALTH_CHECK_FAILED",
        "Health check failed",
        Severity::Error,
    ),
    info(ErrorCode::VPC_NOT_FOUND, "VPC_NOT_FOUND", "VPC not found", Severity::Warning),
    info(ErrorCode::SUBNET_NOT_FOUND, "SUBNET_NOT_FOUND", "Subnet not found", Severity::Error),
    info(
        ErrorCode::INSTANCE_LAUNCH_FAILED,
        "INSTANCE_LAUNCH_FAILED",
        "Instance failed to launch",
        Severity::Error,
    ),
    info(
        ErrorCode::RESOURCE_NOT_REGISTERED,
        "RESOURCE_NOT_REGISTERED",
        "Resource is not registered",
        Severity::Error,
    ),
    info(
        ErrorCode::DEPENDENCY_CONFLICT,
        "DEPENDENCY_CONFLICT",
        "Resource has live dependents",
        Severity::Error,
    ),
    info(
        ErrorCode::STATE_STORE_FAILED,
        "STATE_STORE_FAILED",
        "State store could not be read or written",
        Severity::Critical,
    ),
    info(ErrorCode::VALIDATION_FAILED, "VALIDATION_FAILED", "Validation failed", Severity::Error),
    info(
        ErrorCode::INVALID_TRANSITION,
        "INVALID_TRANSITION",
        "Invalid status transition",
        Severity::Warning,
    ),
    info(ErrorCode::TYPE_NOT_FOUND, "TYPE_NOT_FOUND", "No resources of this type", Severity::Info),
    info(
        ErrorCode::NETWORK_UNREACHABLE,
        "NETWORK_UNREACHABLE",
        "Network unreachable",
        Severity::Error,
    ),
    info(
        ErrorCode::NETWORK_TIMEOUT,
        "NETWORK_TIMEOUT",
        "Network request timed out",
        Severity::Warning,
    ),
    info(
        ErrorCode::DNS_RESOLUTION_FAILED,
        "DNS_RESOLUTION_FAILED",
        "DNS resolution failed",
        Severity::Error,
    ),
];

fn lookup(code: ErrorCode) -> Option<&'static CodeInfo> {
    KNOWN_CODES.iter().find(|info| info.code == code)
}

/// All named codes, in table order
pub fn known_codes() -> impl Iterator<Item = ErrorCode> {
    KNOWN_CODES.iter().map(|info| info.code)
}
