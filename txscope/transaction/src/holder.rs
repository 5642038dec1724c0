//! The transactional state bound into an execution context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{TransactionError, TransactionResult};

/// A holder shared between the execution context and the handles using it.
pub type SharedHolder<C> = Arc<Mutex<ConnectionHolder<C>>>;

/// Lifecycle of a [`ConnectionHolder`].
///
/// ```text
/// Unbound --claim--> Claimed --activate--> Active
///    ^                  |                    |
///    +------ release_from_transaction -------+
///
/// any --clear--> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HolderState {
    /// Looked up or created, not yet claimed by a transaction.
    #[default]
    Unbound,
    /// Claimed by a transaction whose begin has not finished.
    Claimed,
    /// A transaction is running on the connection.
    Active,
    /// Cleared after completion; never reused.
    Completed,
}

/// One driver connection plus the transactional state attached to it.
#[derive(Debug)]
pub struct ConnectionHolder<C> {
    connection: Option<Arc<C>>,
    state: HolderState,
    rollback_only: bool,
    deadline: Option<Instant>,
}

impl<C> ConnectionHolder<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self {
            connection: Some(connection),
            state: HolderState::Unbound,
            rollback_only: false,
            deadline: None,
        }
    }

    pub fn into_shared(self) -> SharedHolder<C> {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> HolderState {
        self.state
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns the held connection.
    pub fn connection(&self) -> TransactionResult<Arc<C>> {
        self.connection
            .clone()
            .ok_or_else(|| TransactionError::illegal_state("no connection held"))
    }

    pub fn set_connection(&mut self, connection: Option<Arc<C>>) {
        self.connection = connection;
    }

    /// Whether a transaction has claimed this holder.
    pub fn is_synchronized_with_transaction(&self) -> bool {
        matches!(self.state, HolderState::Claimed | HolderState::Active)
    }

    pub fn is_transaction_active(&self) -> bool {
        self.state == HolderState::Active
    }

    /// Claims the holder for a transaction that is about to begin.
    pub fn claim(&mut self) -> TransactionResult<()> {
        match self.state {
            HolderState::Unbound | HolderState::Claimed => {
                self.state = HolderState::Claimed;
                Ok(())
            }
            state => Err(TransactionError::illegal_state(format!(
                "cannot claim connection holder in state {state:?}"
            ))),
        }
    }

    /// Marks the claimed holder's transaction as begun.
    pub fn activate(&mut self, deadline: Option<Instant>) -> TransactionResult<()> {
        if self.state != HolderState::Claimed {
            return Err(TransactionError::illegal_state(format!(
                "cannot activate connection holder in state {:?}",
                self.state
            )));
        }
        self.state = HolderState::Active;
        self.deadline = deadline;
        Ok(())
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Sets the deadline `timeout` from now. A timeout too large for
    /// `Instant` leaves the holder without a deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.deadline = Instant::now().checked_add(timeout);
    }

    /// Returns the time left before the deadline, or `None` without one.
    ///
    /// Once the deadline has passed the holder is marked rollback-only and
    /// [`TransactionError::TimedOut`] is returned.
    pub fn check_deadline(&mut self) -> TransactionResult<Option<Duration>> {
        let Some(deadline) = self.deadline else {
            return Ok(None);
        };
        let now = Instant::now();
        if now >= deadline {
            self.rollback_only = true;
            return Err(TransactionError::TimedOut {
                overdue: now.duration_since(deadline),
            });
        }
        Ok(Some(deadline - now))
    }

    /// Hands a claimed holder back to its outer owner: the connection stays,
    /// transactional state is reset.
    pub fn release_from_transaction(&mut self) {
        self.state = HolderState::Unbound;
        self.rollback_only = false;
        self.deadline = None;
    }

    /// Drops the connection reference and resets all state. Idempotent.
    pub fn clear(&mut self) {
        self.connection = None;
        self.state = HolderState::Completed;
        self.rollback_only = false;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder() -> ConnectionHolder<&'static str> {
        ConnectionHolder::new(Arc::new("conn"))
    }

    #[test]
    fn test_lifecycle() {
        let mut holder = holder();
        assert_eq!(holder.state(), HolderState::Unbound);
        assert!(!holder.is_synchronized_with_transaction());

        holder.claim().unwrap();
        assert!(holder.is_synchronized_with_transaction());
        assert!(!holder.is_transaction_active());

        holder.activate(None).unwrap();
        assert!(holder.is_transaction_active());
        assert_eq!(*holder.connection().unwrap(), "conn");
    }

    #[test]
    fn test_activate_requires_claim() {
        let mut holder = holder();
        let err = holder.activate(None).unwrap_err();
        assert!(err.is_illegal_state());
        assert_eq!(holder.state(), HolderState::Unbound);
    }

    #[test]
    fn test_claim_active_holder_fails() {
        let mut holder = holder();
        holder.claim().unwrap();
        holder.activate(None).unwrap();
        assert!(holder.claim().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut holder = holder();
        holder.claim().unwrap();
        holder.activate(Some(Instant::now())).unwrap();
        holder.set_rollback_only();

        holder.clear();
        holder.clear();

        assert_eq!(holder.state(), HolderState::Completed);
        assert!(!holder.has_connection());
        assert!(!holder.is_rollback_only());
        assert!(!holder.is_transaction_active());
        assert!(!holder.is_synchronized_with_transaction());
        assert_eq!(holder.deadline(), None);
        assert!(holder.connection().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_release_from_transaction_keeps_connection() {
        let mut holder = holder();
        holder.claim().unwrap();
        holder.activate(None).unwrap();
        holder.set_rollback_only();

        holder.release_from_transaction();

        assert_eq!(holder.state(), HolderState::Unbound);
        assert!(holder.has_connection());
        assert!(!holder.is_rollback_only());
    }

    #[test]
    fn test_check_deadline() {
        let mut holder = holder();
        assert_eq!(holder.check_deadline().unwrap(), None);

        holder.set_timeout(Duration::from_secs(60));
        let remaining = holder.check_deadline().unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(!holder.is_rollback_only());

        holder.set_timeout(Duration::ZERO);
        let err = holder.check_deadline().unwrap_err();
        assert!(matches!(err, TransactionError::TimedOut { .. }));
        assert!(holder.is_rollback_only());
    }

    #[test]
    fn test_unrepresentable_timeout_means_no_deadline() {
        let mut holder = holder();
        holder.set_timeout(Duration::from_secs(60));
        holder.set_timeout(Duration::MAX);
        assert_eq!(holder.deadline(), None);
        assert_eq!(holder.check_deadline().unwrap(), None);
    }
}
