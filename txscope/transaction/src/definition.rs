//! Transaction definitions: what a unit of work asks of its transaction.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::isolation::Isolation;

/// How a unit of work relates to a transaction that may already be active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the current transaction, or start one if there is none.
    #[default]
    Required,
    /// Join the current transaction, or run without one.
    Supports,
    /// Join the current transaction; fail if there is none.
    Mandatory,
    /// Suspend the current transaction, if any, and start a new one.
    RequiresNew,
    /// Suspend the current transaction, if any, and run without one.
    NotSupported,
    /// Run without a transaction; fail if one is active.
    Never,
}

/// Transaction timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    /// Use the coordinator's default timeout.
    #[default]
    Default,
    /// Timeout in seconds; non-positive values mean no timeout.
    Seconds(i64),
}

impl Timeout {
    /// Raw value that stands for [`Timeout::Default`].
    pub const DEFAULT_SENTINEL: i64 = -1;

    pub fn from_secs(secs: i64) -> Self {
        if secs == Self::DEFAULT_SENTINEL {
            Timeout::Default
        } else {
            Timeout::Seconds(secs)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    pub isolation: Isolation,
    pub read_only: bool,
    pub timeout: Timeout,
    /// Name used in log output.
    pub name: Option<String>,
}

impl TransactionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        self.timeout = Timeout::from_secs(secs);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
