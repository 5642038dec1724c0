//! Runs units of work according to a [`TransactionDefinition`].

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, error};
use txscope_transaction::{
    ConnectionSource, Propagation, SuspendedResources, TransactionContext, TransactionCoordinator,
    TransactionDefinition, TransactionError, TransactionHandle,
};

use crate::scope::TransactionScope;

enum Outcome<T, E> {
    Finished(Result<T, E>),
    TimedOut(Instant),
}

/// Drives a [`TransactionCoordinator`] through discover, begin, commit or
/// rollback, and cleanup around a unit of work.
pub struct TransactionalOperator<S: ConnectionSource> {
    coordinator: Arc<TransactionCoordinator<S>>,
    definition: TransactionDefinition,
}

impl<S: ConnectionSource> TransactionalOperator<S> {
    pub fn new(coordinator: Arc<TransactionCoordinator<S>>) -> Self {
        Self::with_definition(coordinator, TransactionDefinition::default())
    }

    pub fn with_definition(
        coordinator: Arc<TransactionCoordinator<S>>,
        definition: TransactionDefinition,
    ) -> Self {
        Self {
            coordinator,
            definition,
        }
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator<S>> {
        &self.coordinator
    }

    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    /// Runs `work` in the transaction this operator's definition asks for.
    ///
    /// A new transaction commits when `work` succeeds and rolls back when it
    /// fails, when the scope was marked rollback-only, or when its deadline
    /// passes. Joined transactions are left to their owner; a failing
    /// participant only marks them rollback-only.
    pub async fn execute<T, E, F>(
        &self,
        context: &mut TransactionContext<S::Connection>,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut TransactionScope<'_, S>) -> BoxFuture<'s, Result<T, E>>,
        E: From<TransactionError>,
    {
        let coordinator = self.coordinator.as_ref();
        let mut handle = coordinator.discover_transaction(context);

        if coordinator.is_existing_transaction(&handle) {
            return match self.definition.propagation {
                Propagation::Never => Err(TransactionError::illegal_state(
                    "existing transaction found for transaction marked with propagation NEVER",
                )
                .into()),
                Propagation::NotSupported => {
                    let suspended = coordinator.suspend(context, &mut handle);
                    let result = {
                        let mut scope = TransactionScope::non_transactional(coordinator, context);
                        work(&mut scope).await
                    };
                    self.resume(context, suspended)?;
                    result
                }
                Propagation::RequiresNew => {
                    let suspended = coordinator.suspend(context, &mut handle);
                    let handle = coordinator.discover_transaction(context);
                    self.run_new(context, handle, suspended, work).await
                }
                Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                    self.participate(context, handle, work).await
                }
            };
        }

        match self.definition.propagation {
            Propagation::Mandatory => Err(TransactionError::illegal_state(
                "no existing transaction found for transaction marked with propagation MANDATORY",
            )
            .into()),
            Propagation::Required | Propagation::RequiresNew => {
                self.run_new(context, handle, None, work).await
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                let mut scope = TransactionScope::non_transactional(coordinator, context);
                work(&mut scope).await
            }
        }
    }

    async fn participate<T, E, F>(
        &self,
        context: &mut TransactionContext<S::Connection>,
        mut handle: TransactionHandle<S::Connection>,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut TransactionScope<'_, S>) -> BoxFuture<'s, Result<T, E>>,
        E: From<TransactionError>,
    {
        debug!(name = ?self.definition.name, "participating in existing transaction");
        let mut scope =
            TransactionScope::participating(self.coordinator.as_ref(), context, &mut handle);
        let result = work(&mut scope).await;
        if result.is_err() {
            debug!("participating transaction failed, marking existing transaction rollback-only");
            scope.set_rollback_only()?;
        }
        result
    }

    async fn run_new<T, E, F>(
        &self,
        context: &mut TransactionContext<S::Connection>,
        mut handle: TransactionHandle<S::Connection>,
        suspended: Option<SuspendedResources<S::Connection>>,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut TransactionScope<'_, S>) -> BoxFuture<'s, Result<T, E>>,
        E: From<TransactionError>,
    {
        let coordinator = self.coordinator.as_ref();
        debug!(name = ?self.definition.name, "creating new transaction");
        if let Err(err) = coordinator.begin(context, &mut handle, &self.definition).await {
            if let Err(resume_err) = self.resume(context, suspended) {
                error!(error = %resume_err, "failed to resume suspended transaction after begin failure");
            }
            return Err(err.into());
        }

        let mut scope = TransactionScope::new_transaction(coordinator, context, &mut handle);
        let outcome = match scope.deadline() {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline.into(), work(&mut scope)).await {
                    Ok(result) => Outcome::Finished(result),
                    Err(_) => Outcome::TimedOut(deadline),
                }
            }
            None => Outcome::Finished(work(&mut scope).await),
        };

        let completion = self.complete(&handle, outcome).await;
        coordinator.cleanup(context, handle).await;
        self.resume(context, suspended)?;
        completion
    }

    async fn complete<T, E>(
        &self,
        handle: &TransactionHandle<S::Connection>,
        outcome: Outcome<T, E>,
    ) -> Result<T, E>
    where
        E: From<TransactionError>,
    {
        let coordinator = self.coordinator.as_ref();
        match outcome {
            Outcome::Finished(Ok(value)) => {
                if handle.is_local_rollback_only() {
                    debug!("transactional code has requested rollback");
                    coordinator.rollback(handle).await?;
                    Ok(value)
                } else if handle.is_global_rollback_only() {
                    debug!("global transaction is marked as rollback-only but commit was requested");
                    coordinator.rollback(handle).await?;
                    Err(TransactionError::UnexpectedRollback.into())
                } else {
                    coordinator.commit(handle).await?;
                    Ok(value)
                }
            }
            Outcome::Finished(Err(err)) => {
                if let Err(rollback_err) = coordinator.rollback(handle).await {
                    error!(error = %rollback_err, "rollback after failed unit of work failed");
                }
                Err(err)
            }
            Outcome::TimedOut(deadline) => {
                if let Err(rollback_err) = coordinator.rollback(handle).await {
                    error!(error = %rollback_err, "rollback after timeout failed");
                }
                Err(TransactionError::TimedOut {
                    overdue: Instant::now().saturating_duration_since(deadline),
                }
                .into())
            }
        }
    }

    fn resume(
        &self,
        context: &mut TransactionContext<S::Connection>,
        suspended: Option<SuspendedResources<S::Connection>>,
    ) -> Result<(), TransactionError> {
        match suspended {
            Some(suspended) => self.coordinator.resume(context, suspended),
            None => Ok(()),
        }
    }
}
