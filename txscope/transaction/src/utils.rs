//! Connection lookup for data-access code that should run inside whatever
//! transaction the current context carries.

use std::sync::Arc;

use tracing::debug;
use txscope_context::ResourceKey;

use crate::coordinator::TransactionContext;
use crate::driver::{Connection, ConnectionSource};
use crate::error::{TransactionError, TransactionResult};

/// Returns the connection bound for `source` in `context`, or a fresh one.
///
/// A fresh connection is not bound anywhere; hand it back through
/// [`release_connection`] when done.
pub async fn get_connection<S: ConnectionSource>(
    source: &S,
    context: &TransactionContext<S::Connection>,
) -> TransactionResult<Arc<S::Connection>> {
    if let Some(holder) = context.get(&source.resource_key()) {
        let holder = holder.lock();
        if holder.has_connection() {
            return holder.connection();
        }
    }

    let connection = source
        .create()
        .await
        .map_err(TransactionError::CannotGetConnection)?;
    debug!(?connection, "fetching connection outside of a transaction");
    Ok(Arc::new(connection))
}

/// Releases `connection` unless it is the one bound to `context`, whose
/// release belongs to the transaction owning it.
pub async fn release_connection<S: ConnectionSource>(
    source: &S,
    context: &TransactionContext<S::Connection>,
    connection: Arc<S::Connection>,
) -> TransactionResult<()> {
    if is_connection_transactional(context, &source.resource_key(), &connection) {
        return Ok(());
    }
    source
        .release(connection)
        .await
        .map_err(TransactionError::CannotCloseConnection)
}

/// Whether `connection` is the one held by the holder bound under `key`.
pub fn is_connection_transactional<C: Connection>(
    context: &TransactionContext<C>,
    key: &ResourceKey,
    connection: &Arc<C>,
) -> bool {
    context.get(key).is_some_and(|holder| {
        holder
            .lock()
            .connection()
            .is_ok_and(|held| Arc::ptr_eq(&held, connection))
    })
}
