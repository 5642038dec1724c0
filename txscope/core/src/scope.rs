use std::sync::Arc;
use std::time::Instant;

use txscope_transaction::utils::{get_connection, release_connection};
use txscope_transaction::{
    ConnectionSource, TransactionContext, TransactionCoordinator, TransactionError,
    TransactionHandle, TransactionResult,
};

/// What a unit of work sees while [`TransactionalOperator`](crate::TransactionalOperator)
/// runs it.
pub struct TransactionScope<'a, S: ConnectionSource> {
    coordinator: &'a TransactionCoordinator<S>,
    context: &'a mut TransactionContext<S::Connection>,
    handle: Option<&'a mut TransactionHandle<S::Connection>>,
    new_transaction: bool,
}

impl<'a, S: ConnectionSource> TransactionScope<'a, S> {
    pub(crate) fn new_transaction(
        coordinator: &'a TransactionCoordinator<S>,
        context: &'a mut TransactionContext<S::Connection>,
        handle: &'a mut TransactionHandle<S::Connection>,
    ) -> Self {
        Self {
            coordinator,
            context,
            handle: Some(handle),
            new_transaction: true,
        }
    }

    pub(crate) fn participating(
        coordinator: &'a TransactionCoordinator<S>,
        context: &'a mut TransactionContext<S::Connection>,
        handle: &'a mut TransactionHandle<S::Connection>,
    ) -> Self {
        Self {
            coordinator,
            context,
            handle: Some(handle),
            new_transaction: false,
        }
    }

    pub(crate) fn non_transactional(
        coordinator: &'a TransactionCoordinator<S>,
        context: &'a mut TransactionContext<S::Connection>,
    ) -> Self {
        Self {
            coordinator,
            context,
            handle: None,
            new_transaction: false,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.handle
            .as_deref()
            .and_then(|handle| handle.holder().ok())
            .and_then(|holder| holder.lock().deadline())
    }

    /// Whether the work runs inside any transaction.
    pub fn has_transaction(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the work runs in a transaction started for it, as opposed to
    /// joining an outer one.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// The context, for running nested units of work.
    pub fn context(&mut self) -> &mut TransactionContext<S::Connection> {
        self.context
    }

    /// The transactional connection, or a fresh one when no transaction runs.
    pub async fn connection(&self) -> TransactionResult<Arc<S::Connection>> {
        get_connection(self.coordinator.source().as_ref(), &*self.context).await
    }

    /// Releases a connection obtained from [`connection`](Self::connection).
    /// The transactional connection stays with its transaction.
    pub async fn release_connection(&self, connection: Arc<S::Connection>) -> TransactionResult<()> {
        release_connection(self.coordinator.source().as_ref(), &*self.context, connection).await
    }

    /// Makes the transaction roll back once the work is done.
    pub fn set_rollback_only(&mut self) -> TransactionResult<()> {
        let handle = self.handle.as_deref_mut().ok_or_else(|| {
            TransactionError::illegal_state("no transaction to mark rollback-only")
        })?;
        self.coordinator.set_rollback_only(handle)
    }

    pub fn is_rollback_only(&self) -> bool {
        self.handle
            .as_deref()
            .is_some_and(TransactionHandle::is_rollback_only)
    }
}
