//! Contracts the coordinator needs from a database driver.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use txscope_context::ResourceKey;

use crate::isolation::IsolationLevel;

/// Error type drivers report through.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single driver connection.
#[async_trait]
pub trait Connection: Debug + Send + Sync + 'static {
    async fn begin_transaction(&self) -> Result<(), BoxError>;

    async fn commit_transaction(&self) -> Result<(), BoxError>;

    async fn rollback_transaction(&self) -> Result<(), BoxError>;

    fn is_auto_commit(&self) -> bool;

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), BoxError>;

    fn isolation_level(&self) -> IsolationLevel;

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), BoxError>;

    /// Executes a statement, returning the number of affected rows.
    async fn execute(&self, statement: &str) -> Result<u64, BoxError>;
}

/// Produces independent connections and takes them back.
///
/// `create` must never hand out the same connection twice while it is in use:
/// suspended and nested transactions hold distinct connections at once.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: Connection;

    /// Key under which this source's connection holder is bound in a context.
    fn resource_key(&self) -> ResourceKey;

    async fn create(&self) -> Result<Self::Connection, BoxError>;

    async fn release(&self, connection: Arc<Self::Connection>) -> Result<(), BoxError>;
}
