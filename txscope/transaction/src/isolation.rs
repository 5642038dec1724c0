//! Isolation levels as requested by definitions and as seen by drivers.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strum::{Display, EnumString};

/// Isolation requested by a [`TransactionDefinition`](crate::TransactionDefinition).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Isolation {
    /// Keep whatever level the connection already uses.
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    /// Maps the request to the driver representation. `Default` resolves to
    /// `None`, meaning the connection is left alone.
    pub fn resolve(self) -> Option<IsolationLevel> {
        match self {
            Isolation::Default => None,
            Isolation::ReadUncommitted => Some(IsolationLevel::ReadUncommitted),
            Isolation::ReadCommitted => Some(IsolationLevel::ReadCommitted),
            Isolation::RepeatableRead => Some(IsolationLevel::RepeatableRead),
            Isolation::Serializable => Some(IsolationLevel::Serializable),
        }
    }
}

/// Isolation level reported by and applied to a driver connection.
///
/// Drivers may report levels outside the four standard ones; those are kept
/// verbatim as [`IsolationLevel::Vendor`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Vendor(SmolStr),
}

impl IsolationLevel {
    pub fn vendor(name: impl AsRef<str>) -> Self {
        Self::Vendor(SmolStr::new(name))
    }

    /// The SQL spelling of the level.
    pub fn as_sql(&self) -> &str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::Vendor(name) => name.as_str(),
        }
    }

    /// Compares SQL spellings ignoring ASCII case, so a vendor-reported
    /// `read committed` matches [`IsolationLevel::ReadCommitted`].
    pub fn is_equivalent(&self, other: &IsolationLevel) -> bool {
        self.as_sql().eq_ignore_ascii_case(other.as_sql())
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['_', '-'], " ");
        let level = [
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ]
        .into_iter()
        .find(|level| level.as_sql().eq_ignore_ascii_case(&normalized))
        .unwrap_or_else(|| IsolationLevel::vendor(s.trim()));
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(Isolation::Default.resolve(), None);
        assert_eq!(
            Isolation::ReadUncommitted.resolve(),
            Some(IsolationLevel::ReadUncommitted)
        );
        assert_eq!(
            Isolation::Serializable.resolve(),
            Some(IsolationLevel::Serializable)
        );
    }

    #[test]
    fn test_parse_isolation_request() {
        assert_eq!(
            "serializable".parse::<Isolation>().unwrap(),
            Isolation::Serializable
        );
        assert_eq!(
            "REPEATABLE_READ".parse::<Isolation>().unwrap(),
            Isolation::RepeatableRead
        );
        assert!("snapshot".parse::<Isolation>().is_err());
        assert_eq!(Isolation::ReadCommitted.to_string(), "READ_COMMITTED");
    }

    #[test]
    fn test_parse_driver_level() {
        let level: IsolationLevel = "read committed".parse().unwrap();
        assert_eq!(level, IsolationLevel::ReadCommitted);

        let level: IsolationLevel = "repeatable_read".parse().unwrap();
        assert_eq!(level, IsolationLevel::RepeatableRead);

        let level: IsolationLevel = "SNAPSHOT".parse().unwrap();
        assert_eq!(level, IsolationLevel::vendor("SNAPSHOT"));
    }

    #[test]
    fn test_equivalence_ignores_case() {
        let reported = IsolationLevel::vendor("serializable");
        assert_ne!(reported, IsolationLevel::Serializable);
        assert!(reported.is_equivalent(&IsolationLevel::Serializable));
        assert!(!IsolationLevel::ReadCommitted.is_equivalent(&IsolationLevel::Serializable));
    }

    #[test]
    fn test_deserialize_request() {
        let isolation: Isolation = serde_json::from_str("\"READ_UNCOMMITTED\"").unwrap();
        assert_eq!(isolation, Isolation::ReadUncommitted);
    }
}
