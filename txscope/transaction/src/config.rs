use serde::{Deserialize, Serialize};

/// Statement that marks the current transaction read-only.
pub const DEFAULT_READ_ONLY_STATEMENT: &str = "SET TRANSACTION READ ONLY";

/// Configuration for a [`TransactionCoordinator`](crate::TransactionCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Issue `read_only_statement` right after begin for read-only definitions.
    pub enforce_read_only: bool,

    /// Statement issued when `enforce_read_only` applies
    pub read_only_statement: String,

    /// Timeout in seconds for definitions asking for the default timeout
    /// (`None` or non-positive means no deadline)
    pub default_timeout_secs: Option<i64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enforce_read_only: false,
            read_only_statement: DEFAULT_READ_ONLY_STATEMENT.to_string(),
            default_timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"enforce_read_only":true}"#).unwrap();
        assert!(config.enforce_read_only);
        assert_eq!(config.read_only_statement, DEFAULT_READ_ONLY_STATEMENT);
        assert_eq!(config.default_timeout_secs, None);
    }
}
