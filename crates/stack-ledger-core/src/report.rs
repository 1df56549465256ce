//! Incident report: what went wrong, where, and how often

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorCategory, ErrorCode, ErrorRecord, ErrorState};

/// Where the failures happened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEnvironment {
    pub stack_name: String,
    pub region: String,
    pub account: Option<String>,
}

/// Occurrences of one code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeCount {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub environment: ReportEnvironment,
    pub last_error: Option<ErrorRecord>,
    pub counts: Vec<CodeCount>,
}

impl IncidentReport {
    /// Report on the errors thrown in a live session
    pub fn from_state(errors: &ErrorState, environment: ReportEnvironment) -> Self {
        Self::build(environment, errors.last_error().cloned(), errors.counts())
    }

    /// Report on a recorded error history, oldest record first
    pub fn from_history(records: &[ErrorRecord], environment: ReportEnvironment) -> Self {
        let mut counts = BTreeMap::new();
        for record in records {
            *counts.entry(record.code).or_insert(0u32) += 1;
        }
        Self::build(environment, records.last().cloned(), counts)
    }

    fn build(
        environment: ReportEnvironment,
        last_error: Option<ErrorRecord>,
        counts: BTreeMap<ErrorCode, u32>,
    ) -> Self {
        Self {
            report_id: Uuid::now_v7(),
            generated_at: Utc::now(),
            environment,
            last_error,
            counts: counts
                .into_iter()
                .map(|(code, count)| CodeCount {
                    code,
                    category: code.category(),
                    count,
                })
                .collect(),
        }
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().map(|c| c.count).sum()
    }

    /// Human-readable report
    pub fn render(&self) -> String {
        let env = &self.environment;
        let mut out = format!(
            "Incident report {}\nGenerated: {}\nStack:     {}\nRegion:    {}\nAccount:   {}\n",
            self.report_id,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            env.stack_name,
            env.region,
            env.account.as_deref().unwrap_or("unknown"),
        );

        match &self.last_error {
            Some(record) => {
                out.push_str("\nLast error:\n");
                out.push_str(&format!("  Code:     {}\n", record.code));
                out.push_str(&format!("  Category: {}\n", record.category()));
                out.push_str(&format!("  Severity: {}\n", record.severity));
                out.push_str(&format!("  Message:  {}\n", record.message));
                out.push_str(&format!("  Context:  {}\n", record.context));
                out.push_str(&format!("  Recovery: {}\n", record.recovery_strategy));
                out.push_str(&format!(
                    "  At:       {}\n",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            None => out.push_str("\nNo errors recorded\n"),
        }

        if !self.counts.is_empty() {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Code"),
                    Cell::new("Name"),
                    Cell::new("Category"),
                    Cell::new("Count"),
                ]);

            for entry in &self.counts {
                table.add_row(vec![
                    Cell::new(entry.code.value()),
                    Cell::new(entry.code.name().unwrap_or("-")),
                    Cell::new(entry.category),
                    Cell::new(entry.count),
                ]);
            }

            out.push_str(&format!("\nErrors ({} total):\n{table}\n", self.total()));
        }

        out
    }
}
