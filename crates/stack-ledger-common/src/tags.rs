//! Resource tag generation for stack-ledger
//!
//! Every resource the stack provisions carries a fixed base tag set so it
//! can be discovered and cleaned up later, plus whatever the caller adds.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `stack-ledger:managed-by` | Static identifier ("stack-ledger") |
//! | `stack-ledger:stack` | Stack name |
//! | `stack-ledger:region` | Region the stack lives in |
//! | `stack-ledger:environment` | Deployment environment |
//! | `stack-ledger:created-at` | RFC 3339 creation timestamp |

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

/// Tag key for tool identification - all managed resources have this
pub const TAG_MANAGED_BY: &str = "stack-ledger:managed-by";

/// Tag value for tool identification
pub const TAG_MANAGED_BY_VALUE: &str = "stack-ledger";

/// Tag key for the owning stack
pub const TAG_STACK: &str = "stack-ledger:stack";

/// Tag key for the stack region
pub const TAG_REGION: &str = "stack-ledger:region";

/// Tag key for the deployment environment
pub const TAG_ENVIRONMENT: &str = "stack-ledger:environment";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "stack-ledger:created-at";

/// Identity a stack's base tags are derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackIdentity {
    pub stack_name: String,
    pub region: String,
    pub environment: String,
}

impl StackIdentity {
    pub fn new(
        stack_name: impl Into<String>,
        region: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            environment: environment.into(),
        }
    }

    /// The fixed tag set every resource of this stack gets
    pub fn base_tags(&self, created_at: DateTime<Utc>) -> BTreeMap<String, String> {
        BTreeMap::from([
            (TAG_MANAGED_BY.to_string(), TAG_MANAGED_BY_VALUE.to_string()),
            (TAG_STACK.to_string(), self.stack_name.clone()),
            (TAG_REGION.to_string(), self.region.clone()),
            (TAG_ENVIRONMENT.to_string(), self.environment.clone()),
            (TAG_CREATED_AT.to_string(), format_created_at(created_at)),
        ])
    }
}

/// Build the tag map for a new resource.
///
/// `additional` is caller-supplied JSON object text (`{"key": "value"}`).
/// Caller tags win on key conflicts. Anything that is not an object of
/// string values is ignored with a warning and the base set is returned
/// untouched.
pub fn generate_tags(
    identity: &StackIdentity,
    additional: Option<&str>,
) -> BTreeMap<String, String> {
    let mut tags = identity.base_tags(Utc::now());

    let Some(raw) = additional.map(str::trim).filter(|s| !s.is_empty()) else {
        return tags;
    };

    match parse_additional_tags(raw) {
        Ok(extra) => merge_tags(&mut tags, extra),
        Err(reason) => {
            warn!(
                stack = %identity.stack_name,
                reason = %reason,
                "Ignoring malformed additional tags, using base tags only"
            );
        }
    }

    tags
}

/// Merge `extra` into `tags`, overwriting existing keys
pub fn merge_tags(tags: &mut BTreeMap<String, String>, extra: BTreeMap<String, String>) {
    tags.extend(extra);
}

/// Parse a JSON object of string values.
///
/// Validation happens before anything is returned so a half-valid object
/// never leaks into the result.
fn parse_additional_tags(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "additional tags must be a JSON object".to_string())?;

    let mut parsed = BTreeMap::new();
    for (key, value) in object {
        if key.trim().is_empty() {
            return Err("tag keys cannot be empty".to_string());
        }
        let value = value
            .as_str()
            .ok_or_else(|| format!("tag '{key}' must have a string value"))?;
        parsed.insert(key.clone(), value.to_string());
    }

    Ok(parsed)
}

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse creation timestamp from tags
pub fn parse_created_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StackIdentity {
        StackIdentity::new("demo", "us-east-1", "development")
    }

    #[test]
    fn test_base_tags_only() {
        let tags = generate_tags(&identity(), None);

        assert_eq!(tags.len(), 5);
        assert_eq!(tags[TAG_MANAGED_BY], TAG_MANAGED_BY_VALUE);
        assert_eq!(tags[TAG_STACK], "demo");
        assert_eq!(tags[TAG_REGION], "us-east-1");
        assert!(parse_created_at(&tags[TAG_CREATED_AT]).is_some());
    }

    #[test]
    fn test_additional_tags_win_on_conflict() {
        let tags = generate_tags(
            &identity(),
            Some(r#"{"team": "infra", "stack-ledger:environment": "staging"}"#),
        );

        assert_eq!(tags["team"], "infra");
        assert_eq!(tags[TAG_ENVIRONMENT], "staging");
        assert_eq!(tags[TAG_STACK], "demo");
    }

    #[test]
    fn test_malformed_additional_falls_back_to_base() {
        let base = generate_tags(&identity(), None);

        for raw in [
            "not json",
            r#"["a", "b"]"#,
            r#"{"team": 42}"#,
            r#"{"ok": "yes", "bad": null}"#,
            r#"{"": "empty key"}"#,
        ] {
            let tags = generate_tags(&identity(), Some(raw));
            assert_eq!(
                tags.keys().collect::<Vec<_>>(),
                base.keys().collect::<Vec<_>>(),
                "input: {raw}"
            );
            assert!(!tags.contains_key("ok"));
        }
    }

    #[test]
    fn test_blank_additional_is_ignored() {
        let tags = generate_tags(&identity(), Some("   "));
        assert_eq!(tags.len(), 5);
    }

    #[test]
    fn test_parse_invalid_timestamp() {
        assert!(parse_created_at("not a timestamp").is_none());
        assert!(parse_created_at("").is_none());
    }
}
