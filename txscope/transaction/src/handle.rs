//! Per-attempt bookkeeping for one transaction on one holder.

use std::sync::Arc;

use crate::error::{TransactionError, TransactionResult};
use crate::holder::SharedHolder;
use crate::isolation::IsolationLevel;

/// Per-attempt transaction state: which holder is in play, whether this
/// attempt owns it, and what has to be restored on the connection afterwards.
#[derive(Debug)]
pub struct TransactionHandle<C> {
    holder: Option<SharedHolder<C>>,
    new_holder: bool,
    began: bool,
    previous_isolation_level: Option<IsolationLevel>,
    must_restore_auto_commit: bool,
    rollback_only: bool,
}

impl<C> TransactionHandle<C> {
    pub(crate) fn new(holder: Option<SharedHolder<C>>) -> Self {
        Self {
            holder,
            new_holder: false,
            began: false,
            previous_isolation_level: None,
            must_restore_auto_commit: false,
            rollback_only: false,
        }
    }

    pub fn has_holder(&self) -> bool {
        self.holder.is_some()
    }

    pub fn holder(&self) -> TransactionResult<&SharedHolder<C>> {
        self.holder
            .as_ref()
            .ok_or_else(|| TransactionError::illegal_state("no connection holder available"))
    }

    pub(crate) fn set_holder(&mut self, holder: Option<SharedHolder<C>>, new_holder: bool) {
        self.holder = holder;
        self.new_holder = new_holder;
    }

    pub(crate) fn take_holder(&mut self) -> Option<SharedHolder<C>> {
        self.holder.take()
    }

    /// The connection of the holder in play.
    pub fn connection(&self) -> TransactionResult<Arc<C>> {
        self.holder()?.lock().connection()
    }

    /// True iff this attempt created the holder and bound it to the context.
    pub fn is_new_holder(&self) -> bool {
        self.new_holder
    }

    pub(crate) fn began(&self) -> bool {
        self.began
    }

    pub(crate) fn set_began(&mut self) {
        self.began = true;
    }

    pub fn previous_isolation_level(&self) -> Option<&IsolationLevel> {
        self.previous_isolation_level.as_ref()
    }

    pub(crate) fn save_isolation_level(&mut self, level: IsolationLevel) {
        self.previous_isolation_level = Some(level);
    }

    pub(crate) fn take_previous_isolation_level(&mut self) -> Option<IsolationLevel> {
        self.previous_isolation_level.take()
    }

    pub fn must_restore_auto_commit(&self) -> bool {
        self.must_restore_auto_commit
    }

    pub(crate) fn set_must_restore_auto_commit(&mut self) {
        self.must_restore_auto_commit = true;
    }

    pub(crate) fn take_must_restore_auto_commit(&mut self) -> bool {
        std::mem::take(&mut self.must_restore_auto_commit)
    }

    pub(crate) fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    /// Rollback-only requested through this handle.
    pub fn is_local_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Rollback-only recorded on the shared holder, possibly by a participant.
    pub fn is_global_rollback_only(&self) -> bool {
        self.holder
            .as_ref()
            .is_some_and(|holder| holder.lock().is_rollback_only())
    }

    pub fn is_rollback_only(&self) -> bool {
        self.is_local_rollback_only() || self.is_global_rollback_only()
    }
}
