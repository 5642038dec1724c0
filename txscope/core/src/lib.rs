//! Context-bound transactions for asynchronous database connections.
//!
//! ```ignore
//! let coordinator = Arc::new(TransactionCoordinator::new(Arc::new(source)));
//! let operator = TransactionalOperator::new(coordinator);
//! let mut context = TransactionContext::new();
//!
//! operator
//!     .execute(&mut context, |scope| {
//!         Box::pin(async move {
//!             let connection = scope.connection().await?;
//!             connection.execute("UPDATE accounts SET balance = balance - 10").await?;
//!             Ok::<_, AppError>(())
//!         })
//!     })
//!     .await?;
//! ```

pub mod operator;
pub mod scope;

pub use operator::TransactionalOperator;
pub use scope::TransactionScope;
pub use txscope_context::{ContextError, ResourceContext, ResourceKey};
pub use txscope_transaction::{
    BoxError, Connection, ConnectionHolder, ConnectionSource, CoordinatorConfig, HolderState,
    Isolation, IsolationLevel, Propagation, SharedHolder, SuspendedResources, Timeout,
    TransactionContext, TransactionCoordinator, TransactionDefinition, TransactionError,
    TransactionHandle, TransactionResult, utils,
};
