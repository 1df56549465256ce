//! Error categories, severities and recovery strategies

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::codes::ErrorCode;

/// Error category, one per contiguous band of the code space
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorCategory {
    General,
    Configuration,
    Provider,
    Capacity,
    Deployment,
    Infrastructure,
    Validation,
    Network,
}

impl ErrorCategory {
    /// Codes belonging to this category
    pub const fn band(self) -> RangeInclusive<u16> {
        match self {
            Self::General => 1..=99,
            Self::Configuration => 100..=199,
            Self::Provider => 200..=299,
            Self::Capacity => 300..=399,
            Self::Deployment => 400..=499,
            Self::Infrastructure => 500..=599,
            Self::Validation => 600..=699,
            Self::Network => 700..=799,
        }
    }

    /// Process exit status used by the CLI for errors of this category
    pub const fn exit_status(self) -> u8 {
        match self {
            Self::General => 1,
            Self::Configuration => 2,
            Self::Provider => 3,
            Self::Capacity => 4,
            Self::Deployment => 5,
            Self::Infrastructure => 6,
            Self::Validation => 7,
            Self::Network => 8,
        }
    }
}

/// Resolve the category of a code from its band.
///
/// Codes outside every band (including the success sentinel) are `General`.
pub fn category_of(code: ErrorCode) -> ErrorCategory {
    ErrorCategory::iter()
        .find(|category| category.band().contains(&code.value()))
        .unwrap_or(ErrorCategory::General)
}

/// How bad an error is
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// ANSI color escape for console output
    pub fn ansi_color(self) -> &'static str {
        match self {
            Self::Info => "\x1b[36m",
            Self::Warning => "\x1b[33m",
            Self::Error => "\x1b[31m",
            Self::Critical => "\x1b[1;31m",
        }
    }

    /// Short uppercase label for console output
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// How the caller should respond to an error
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RecoveryStrategy {
    /// Try the same operation again after a delay
    Retry,
    /// Switch to an alternate resource or path
    Fallback,
    /// Treat as done and move on
    Skip,
    /// Stop and roll back
    Abort,
    /// Stop and hand over to an operator
    Manual,
}

impl RecoveryStrategy {
    /// Check if the strategy ends the deployment
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Abort | Self::Manual)
    }
}
