//! The transaction state machine binding one connection per execution context.
//!
//! A generic execution driver calls into [`TransactionCoordinator`] in the order
//! discover -> begin (when no transaction exists) -> user work -> commit or
//! rollback -> cleanup. Suspend and resume move the bound holder out of and back
//! into the context when inner work must run on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use txscope_context::{ResourceContext, ResourceKey};

use crate::config::CoordinatorConfig;
use crate::definition::{Timeout, TransactionDefinition};
use crate::driver::{BoxError, Connection, ConnectionSource};
use crate::error::{TransactionError, TransactionResult};
use crate::handle::TransactionHandle;
use crate::holder::{ConnectionHolder, SharedHolder};

/// Context carrying the connection holders bound for one logical unit of work.
pub type TransactionContext<C> = ResourceContext<SharedHolder<C>>;

/// A holder detached from its context by [`TransactionCoordinator::suspend`].
///
/// Owning this value is the only way to put the holder back.
#[derive(Debug)]
pub struct SuspendedResources<C> {
    holder: SharedHolder<C>,
}

impl<C> SuspendedResources<C> {
    pub fn holder(&self) -> &SharedHolder<C> {
        &self.holder
    }
}

/// Coordinates transactions on connections from one [`ConnectionSource`].
///
/// The coordinator itself is stateless between calls; all per-transaction
/// state lives in the [`TransactionHandle`] and in the holder bound to the
/// [`TransactionContext`], so one coordinator serves any number of contexts.
pub struct TransactionCoordinator<S: ConnectionSource> {
    source: Arc<S>,
    key: ResourceKey,
    config: CoordinatorConfig,
}

impl<S: ConnectionSource> TransactionCoordinator<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_config(source, CoordinatorConfig::default())
    }

    pub fn with_config(source: Arc<S>, config: CoordinatorConfig) -> Self {
        let key = source.resource_key();
        Self {
            source,
            key,
            config,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn resource_key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn set_enforce_read_only(&mut self, enforce_read_only: bool) {
        self.config.enforce_read_only = enforce_read_only;
    }

    pub fn is_enforce_read_only(&self) -> bool {
        self.config.enforce_read_only
    }

    /// Wraps whatever holder is bound for this source into a fresh handle.
    pub fn discover_transaction(
        &self,
        context: &TransactionContext<S::Connection>,
    ) -> TransactionHandle<S::Connection> {
        TransactionHandle::new(context.get(&self.key).cloned())
    }

    pub fn is_existing_transaction(&self, handle: &TransactionHandle<S::Connection>) -> bool {
        handle
            .holder()
            .is_ok_and(|holder| holder.lock().is_transaction_active())
    }

    /// Begins a transaction on the handle.
    ///
    /// Reuses a bound holder that no transaction has claimed yet, otherwise
    /// acquires a fresh connection and binds a new holder once begin succeeds.
    /// Every failure surfaces as [`TransactionError::CannotCreateTransaction`],
    /// leaves the context as it was and releases what this call acquired.
    pub async fn begin(
        &self,
        context: &mut TransactionContext<S::Connection>,
        handle: &mut TransactionHandle<S::Connection>,
        definition: &TransactionDefinition,
    ) -> TransactionResult<()> {
        let connection = self
            .obtain_connection(handle)
            .await
            .map_err(TransactionError::CannotCreateTransaction)?;

        if let Err(cause) = self
            .prepare_connection(&connection, handle, definition)
            .await
        {
            return Err(self.abandon_begin(handle, connection, false, cause).await);
        }
        if let Err(cause) = connection.begin_transaction().await {
            return Err(self.abandon_begin(handle, connection, false, cause).await);
        }
        if let Err(cause) = self.prepare_transaction(&connection, definition).await {
            return Err(self.abandon_begin(handle, connection, true, cause).await);
        }
        if let Err(err) = self.activate(context, handle, definition) {
            return Err(self
                .abandon_begin(handle, connection, true, err.into())
                .await);
        }
        handle.set_began();
        Ok(())
    }

    async fn obtain_connection(
        &self,
        handle: &mut TransactionHandle<S::Connection>,
    ) -> Result<Arc<S::Connection>, BoxError> {
        if let Ok(holder) = handle.holder() {
            let mut holder = holder.lock();
            if !holder.is_synchronized_with_transaction() && holder.has_connection() {
                holder.claim()?;
                return Ok(holder.connection()?);
            }
        }

        let connection = Arc::new(self.source.create().await?);
        debug!(?connection, "acquired connection for transaction");
        let mut holder = ConnectionHolder::new(connection.clone());
        holder.claim()?;
        handle.set_holder(Some(holder.into_shared()), true);
        Ok(connection)
    }

    async fn prepare_connection(
        &self,
        connection: &S::Connection,
        handle: &mut TransactionHandle<S::Connection>,
        definition: &TransactionDefinition,
    ) -> Result<(), BoxError> {
        if let Some(level) = definition.isolation.resolve() {
            let current = connection.isolation_level();
            if !current.is_equivalent(&level) {
                debug!(?connection, isolation = %level, "changing isolation level of connection");
                connection.set_isolation_level(level).await?;
                handle.save_isolation_level(current);
            }
        }

        if connection.is_auto_commit() {
            debug!(?connection, "switching connection to manual commit");
            connection.set_auto_commit(false).await?;
            handle.set_must_restore_auto_commit();
        }
        Ok(())
    }

    async fn prepare_transaction(
        &self,
        connection: &S::Connection,
        definition: &TransactionDefinition,
    ) -> Result<(), BoxError> {
        if self.config.enforce_read_only && definition.read_only {
            debug!(?connection, "marking transaction read-only");
            connection.execute(&self.config.read_only_statement).await?;
        }
        Ok(())
    }

    fn activate(
        &self,
        context: &mut TransactionContext<S::Connection>,
        handle: &TransactionHandle<S::Connection>,
        definition: &TransactionDefinition,
    ) -> TransactionResult<()> {
        let holder = handle.holder()?;
        // A deadline past what `Instant` can represent is no deadline.
        let deadline = self
            .determine_timeout(definition)
            .and_then(|timeout| Instant::now().checked_add(timeout));
        holder.lock().activate(deadline)?;
        if handle.is_new_holder() {
            context.bind(self.key.clone(), holder.clone())?;
        }
        Ok(())
    }

    /// Reduced cleanup for a begin that did not complete: rollback when the
    /// driver transaction is already open, then session restore and release.
    async fn abandon_begin(
        &self,
        handle: &mut TransactionHandle<S::Connection>,
        connection: Arc<S::Connection>,
        in_transaction: bool,
        cause: BoxError,
    ) -> TransactionError {
        if in_transaction {
            self.safe_cleanup_step(
                "rolling back after failed begin",
                connection.rollback_transaction(),
            )
            .await;
        }
        self.restore_session(&connection, handle).await;
        if handle.is_new_holder() {
            debug!(?connection, "releasing connection after failed begin");
            self.safe_cleanup_step(
                "releasing connection after failed begin",
                self.source.release(connection),
            )
            .await;
            if let Some(holder) = handle.take_holder() {
                holder.lock().clear();
            }
            handle.set_holder(None, false);
        } else if let Ok(holder) = handle.holder() {
            holder.lock().release_from_transaction();
        }
        TransactionError::CannotCreateTransaction(cause)
    }

    /// Resolves the definition's timeout; `None` means no deadline.
    pub fn determine_timeout(&self, definition: &TransactionDefinition) -> Option<Duration> {
        let secs = match definition.timeout {
            Timeout::Default => self.config.default_timeout_secs?,
            Timeout::Seconds(secs) => secs,
        };
        u64::try_from(secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Detaches the bound holder from the handle and the context.
    pub fn suspend(
        &self,
        context: &mut TransactionContext<S::Connection>,
        handle: &mut TransactionHandle<S::Connection>,
    ) -> Option<SuspendedResources<S::Connection>> {
        handle.take_holder();
        context
            .unbind(&self.key)
            .map(|holder| SuspendedResources { holder })
    }

    /// Binds a previously suspended holder again.
    pub fn resume(
        &self,
        context: &mut TransactionContext<S::Connection>,
        suspended: SuspendedResources<S::Connection>,
    ) -> TransactionResult<()> {
        context.bind(self.key.clone(), suspended.holder)?;
        Ok(())
    }

    pub async fn commit(&self, handle: &TransactionHandle<S::Connection>) -> TransactionResult<()> {
        let connection = handle.connection()?;
        debug!(?connection, "committing transaction");
        connection
            .commit_transaction()
            .await
            .map_err(|err| self.translate_error("commit", err))
    }

    pub async fn rollback(
        &self,
        handle: &TransactionHandle<S::Connection>,
    ) -> TransactionResult<()> {
        let connection = handle.connection()?;
        debug!(?connection, "rolling back transaction");
        connection
            .rollback_transaction()
            .await
            .map_err(|err| self.translate_error("rollback", err))
    }

    /// Marks the transaction so that the outer driver rolls back instead of
    /// committing.
    pub fn set_rollback_only(
        &self,
        handle: &mut TransactionHandle<S::Connection>,
    ) -> TransactionResult<()> {
        let mut holder = handle.holder()?.lock();
        debug!(connection = ?holder.connection().ok(), "setting transaction rollback-only");
        holder.set_rollback_only();
        drop(holder);
        handle.set_rollback_only();
        Ok(())
    }

    /// Terminal step of every transaction attempt. Never fails: each step is
    /// best-effort and errors are logged.
    pub async fn cleanup(
        &self,
        context: &mut TransactionContext<S::Connection>,
        mut handle: TransactionHandle<S::Connection>,
    ) {
        let Some(holder) = handle.take_holder() else {
            return;
        };

        if handle.is_new_holder() {
            let bound_here = context
                .get(&self.key)
                .is_some_and(|bound| Arc::ptr_eq(bound, &holder));
            if bound_here {
                context.unbind(&self.key);
            }
        }

        let connection = holder.lock().connection().ok();
        if let Some(connection) = connection {
            self.restore_session(&connection, &mut handle).await;
            if handle.is_new_holder() {
                debug!(?connection, "releasing connection after transaction");
                self.safe_cleanup_step("releasing connection", self.source.release(connection))
                    .await;
            }
        }

        let mut holder = holder.lock();
        if handle.is_new_holder() {
            holder.clear();
        } else if handle.began() {
            holder.release_from_transaction();
        }
    }

    async fn restore_session(
        &self,
        connection: &S::Connection,
        handle: &mut TransactionHandle<S::Connection>,
    ) {
        if handle.take_must_restore_auto_commit() {
            self.safe_cleanup_step("restoring auto-commit", connection.set_auto_commit(true))
                .await;
        }
        if let Some(level) = handle.take_previous_isolation_level() {
            self.safe_cleanup_step(
                "restoring isolation level",
                connection.set_isolation_level(level),
            )
            .await;
        }
    }

    async fn safe_cleanup_step<F>(&self, step: &str, future: F)
    where
        F: Future<Output = Result<(), BoxError>>,
    {
        if let Err(err) = future.await {
            warn!(step, error = %err, "error ignored during transaction cleanup");
        }
    }

    /// Translates a driver error raised by commit or rollback.
    pub fn translate_error(&self, task: &'static str, err: BoxError) -> TransactionError {
        TransactionError::TransactionSystem { task, source: err }
    }
}
