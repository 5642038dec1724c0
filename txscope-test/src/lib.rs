//! In-memory recording driver for exercising the transaction coordinator.
//!
//! Every driver call is appended to an event log, and any call can be made to
//! fail through [`Fault`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use txscope::{BoxError, Connection, ConnectionSource, IsolationLevel, ResourceKey};

pub type ConnectionId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(ConnectionId),
    Released(ConnectionId),
    SetIsolation(ConnectionId, IsolationLevel),
    SetAutoCommit(ConnectionId, bool),
    Begin(ConnectionId),
    Commit(ConnectionId),
    Rollback(ConnectionId),
    Execute(ConnectionId, String),
}

/// A driver operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Create,
    Release,
    SetIsolation,
    DisableAutoCommit,
    EnableAutoCommit,
    Begin,
    Commit,
    Rollback,
    Execute,
}

#[derive(Debug, Error)]
#[error("simulated {0:?} failure")]
pub struct MockError(pub Fault);

#[derive(Debug, Clone)]
struct SessionState {
    auto_commit: bool,
    isolation: IsolationLevel,
}

#[derive(Debug)]
struct DriverState {
    next_id: ConnectionId,
    events: Vec<Event>,
    faults: HashSet<Fault>,
    sessions: HashMap<ConnectionId, SessionState>,
    initial: SessionState,
}

impl DriverState {
    fn check(&self, fault: Fault) -> Result<(), BoxError> {
        if self.faults.contains(&fault) {
            return Err(Box::new(MockError(fault)));
        }
        Ok(())
    }
}

type SharedState = Arc<Mutex<DriverState>>;

pub struct MockConnection {
    id: ConnectionId,
    state: SharedState,
}

impl MockConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn record(&self, fault: Fault, event: Event) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        state.check(fault)?;
        state.events.push(event);
        Ok(())
    }

    fn update_session(&self, update: impl FnOnce(&mut SessionState)) {
        if let Some(session) = self.state.lock().sessions.get_mut(&self.id) {
            update(session);
        }
    }

    fn session(&self) -> Option<SessionState> {
        self.state.lock().sessions.get(&self.id).cloned()
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection").field("id", &self.id).finish()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn begin_transaction(&self) -> Result<(), BoxError> {
        self.record(Fault::Begin, Event::Begin(self.id))
    }

    async fn commit_transaction(&self) -> Result<(), BoxError> {
        self.record(Fault::Commit, Event::Commit(self.id))
    }

    async fn rollback_transaction(&self) -> Result<(), BoxError> {
        self.record(Fault::Rollback, Event::Rollback(self.id))
    }

    fn is_auto_commit(&self) -> bool {
        self.session().is_some_and(|session| session.auto_commit)
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<(), BoxError> {
        let fault = if auto_commit {
            Fault::EnableAutoCommit
        } else {
            Fault::DisableAutoCommit
        };
        self.record(fault, Event::SetAutoCommit(self.id, auto_commit))?;
        self.update_session(|session| session.auto_commit = auto_commit);
        Ok(())
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.session()
            .map_or(IsolationLevel::ReadCommitted, |session| session.isolation)
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), BoxError> {
        self.record(Fault::SetIsolation, Event::SetIsolation(self.id, level.clone()))?;
        self.update_session(|session| session.isolation = level);
        Ok(())
    }

    async fn execute(&self, statement: &str) -> Result<u64, BoxError> {
        self.record(Fault::Execute, Event::Execute(self.id, statement.to_string()))?;
        Ok(0)
    }
}

/// Connection source handing out [`MockConnection`]s that share one event log.
#[derive(Clone)]
pub struct MockSource {
    name: &'static str,
    state: SharedState,
}

impl MockSource {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: &'static str) -> Self {
        let initial = SessionState {
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
        };
        Self {
            name,
            state: Arc::new(Mutex::new(DriverState {
                next_id: 1,
                events: Vec::new(),
                faults: HashSet::new(),
                sessions: HashMap::new(),
                initial,
            })),
        }
    }

    /// Session settings new connections start with.
    pub fn with_session(self, auto_commit: bool, isolation: IsolationLevel) -> Self {
        self.state.lock().initial = SessionState {
            auto_commit,
            isolation,
        };
        self
    }

    pub fn fail(&self, fault: Fault) {
        self.state.lock().faults.insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        self.state.lock().faults.remove(&fault);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Whether `event` was recorded.
    pub fn saw(&self, event: &Event) -> bool {
        self.state.lock().events.contains(event)
    }

    /// Connections created and not released yet.
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        let state = self.state.lock();
        let mut open: Vec<_> = state.sessions.keys().copied().collect();
        open.sort_unstable();
        open
    }

    pub fn auto_commit_of(&self, id: ConnectionId) -> Option<bool> {
        self.state
            .lock()
            .sessions
            .get(&id)
            .map(|session| session.auto_commit)
    }

    pub fn isolation_of(&self, id: ConnectionId) -> Option<IsolationLevel> {
        self.state
            .lock()
            .sessions
            .get(&id)
            .map(|session| session.isolation.clone())
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionSource for MockSource {
    type Connection = MockConnection;

    fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.name)
    }

    async fn create(&self) -> Result<MockConnection, BoxError> {
        let mut state = self.state.lock();
        state.check(Fault::Create)?;
        let id = state.next_id;
        state.next_id += 1;
        let session = state.initial.clone();
        state.sessions.insert(id, session);
        state.events.push(Event::Created(id));
        Ok(MockConnection {
            id,
            state: self.state.clone(),
        })
    }

    async fn release(&self, connection: Arc<MockConnection>) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        state.check(Fault::Release)?;
        state.sessions.remove(&connection.id);
        state.events.push(Event::Released(connection.id));
        Ok(())
    }
}
