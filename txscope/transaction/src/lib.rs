//! Context-bound transaction coordination for asynchronous database connections.
//!
//! The [`TransactionCoordinator`] manages one logical transaction per execution
//! context: it acquires or reuses a connection, prepares its isolation level and
//! auto-commit mode, begins, commits or rolls back, and restores and releases
//! everything afterwards. The context itself is passed explicitly as a
//! [`TransactionContext`].

pub mod config;
pub mod coordinator;
pub mod definition;
pub mod driver;
pub mod error;
pub mod handle;
pub mod holder;
pub mod isolation;
pub mod utils;

pub use config::{CoordinatorConfig, DEFAULT_READ_ONLY_STATEMENT};
pub use coordinator::{SuspendedResources, TransactionContext, TransactionCoordinator};
pub use definition::{Propagation, Timeout, TransactionDefinition};
pub use driver::{BoxError, Connection, ConnectionSource};
pub use error::{TransactionError, TransactionResult};
pub use handle::TransactionHandle;
pub use holder::{ConnectionHolder, HolderState, SharedHolder};
pub use isolation::{Isolation, IsolationLevel};
