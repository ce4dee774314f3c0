//! Sessions: connection-scoped units of work
//!
//! A [`Session`] wraps one store connection and tracks staged changes
//! (additions, modifications, removals) until they are committed or
//! discarded. Sessions are handed out as `Rc<Session>`, which makes them
//! `!Send` and `!Sync`: a session is owned by exactly one thread, enforced
//! at compile time.
//!
//! # Lifecycle
//!
//! ```text
//! SessionFactory::open ──> live ──(dispose / drop)──> disposed
//!                           │
//!                 stage ──> commit / commit_async / discard
//! ```
//!
//! Disposal is idempotent. Every operation on a disposed session returns
//! `Error::SessionDisposed`, except `dispose` itself.

use crate::dispatcher::CommitDispatcher;
use crate::stamper::AuditStamper;
use arbor_core::{
    Actor, ConnectionId, CreateStamp, Entity, EntityDescriptor, Error, ModifyStamp, Record,
    RecordKey, Result, Value,
};
use arbor_storage::{ChangeOp, ChangeSet, Model, StoreClient, StoreConnection};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, single-thread handle to a session
pub type SessionHandle = Rc<Session>;

/// Receives a one-line description of every statement sent to the store
pub type StatementLog = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// Tracking types
// ============================================================================

/// Handle to one tracked entity within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

/// Tracking state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Matches the store
    Unchanged,
    /// Will be inserted
    Added,
    /// Will be updated
    Modified,
    /// Will be deleted
    Deleted,
}

/// Summary of staged changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingChanges {
    /// Entities staged for insert
    pub added: usize,
    /// Entities staged for update
    pub modified: usize,
    /// Entities staged for delete
    pub deleted: usize,
}

impl PendingChanges {
    /// Total number of staged changes
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }

    /// Check if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Result of a synchronous commit.
///
/// Validation failures are not errors: they come back as `Rejected`, whose
/// [`code`](CommitOutcome::code) is the sentinel `-1`. Callers must check it.
#[must_use = "a commit rejected by validation is only reported through its outcome"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Changes were written
    Committed {
        /// Rows written
        changes: usize,
    },
    /// Validation failed; nothing was written and changes stay staged
    Rejected {
        /// Entity type that failed
        entity: String,
        /// Validation messages
        errors: Vec<String>,
    },
}

impl CommitOutcome {
    /// Sentinel code of a rejected commit
    pub const REJECTED: i64 = -1;

    /// Rows written, or [`REJECTED`](Self::REJECTED)
    pub fn code(&self) -> i64 {
        match self {
            CommitOutcome::Committed { changes } => *changes as i64,
            CommitOutcome::Rejected { .. } => Self::REJECTED,
        }
    }

    /// True if the commit was written
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Convert a rejection into `Error::Validation`
    pub fn into_result(self) -> Result<usize> {
        match self {
            CommitOutcome::Committed { changes } => Ok(changes),
            CommitOutcome::Rejected { entity, errors } => Err(Error::Validation { entity, errors }),
        }
    }
}

/// Type-erased view of a tracked entity
pub(crate) trait StagedEntity: Any {
    fn staged_descriptor(&self) -> &'static EntityDescriptor;
    fn staged_key(&self) -> RecordKey;
    fn staged_record(&self) -> Record;
    fn creation(&mut self) -> Option<&mut CreateStamp>;
    fn modification(&mut self) -> Option<&mut ModifyStamp>;
    fn check(&self) -> std::result::Result<(), Vec<String>>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity> StagedEntity for T {
    fn staged_descriptor(&self) -> &'static EntityDescriptor {
        <T as Entity>::descriptor()
    }

    fn staged_key(&self) -> RecordKey {
        Entity::key(self)
    }

    fn staged_record(&self) -> Record {
        <T as Entity>::descriptor().project(&self.to_record())
    }

    fn creation(&mut self) -> Option<&mut CreateStamp> {
        Entity::create_stamp(self)
    }

    fn modification(&mut self) -> Option<&mut ModifyStamp> {
        Entity::modify_stamp(self)
    }

    fn check(&self) -> std::result::Result<(), Vec<String>> {
        Entity::validate(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Entry {
    state: EntryState,
    entity: Box<dyn StagedEntity>,
}

/// Staged entities in staging order, indexed by (collection, key)
#[derive(Default)]
struct Tracker {
    entries: BTreeMap<EntryId, Entry>,
    index: HashMap<(&'static str, RecordKey), EntryId>,
    next: u64,
}

impl Tracker {
    fn lookup(&self, collection: &'static str, key: &RecordKey) -> Option<EntryId> {
        self.index.get(&(collection, key.clone())).copied()
    }

    fn track(&mut self, entity: Box<dyn StagedEntity>, state: EntryState) -> EntryId {
        self.next += 1;
        let id = EntryId(self.next);
        let slot = (entity.staged_descriptor().collection, entity.staged_key());
        self.index.insert(slot, id);
        self.entries.insert(id, Entry { state, entity });
        id
    }

    fn untrack(&mut self, id: EntryId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        let slot = (entry.entity.staged_descriptor().collection, entry.entity.staged_key());
        self.index.remove(&slot);
        Some(entry)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

// ============================================================================
// SessionFactory
// ============================================================================

/// Opens sessions for one connection identifier
pub struct SessionFactory {
    connection_id: ConnectionId,
    client: Arc<dyn StoreClient>,
    model: Arc<Model>,
    dispatcher: Option<Arc<CommitDispatcher>>,
    statement_log: Option<StatementLog>,
}

impl SessionFactory {
    /// Create a factory; sessions commit detached work inline until a
    /// dispatcher is attached.
    pub fn new(
        client: Arc<dyn StoreClient>,
        connection_id: ConnectionId,
        model: Arc<Model>,
    ) -> Self {
        Self {
            connection_id,
            client,
            model,
            dispatcher: None,
            statement_log: None,
        }
    }

    /// Run fire-and-forget commits on this dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<CommitDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Report statements to this callback
    pub fn with_statement_log(mut self, log: StatementLog) -> Self {
        self.statement_log = Some(log);
        self
    }

    /// Normalized connection identifier
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Schema model shared by every session from this factory
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Dispatcher used for detached commits, if any
    pub fn dispatcher(&self) -> Option<&Arc<CommitDispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Propagates connection failures from the store client.
    pub fn open(&self) -> Result<SessionHandle> {
        let connection = self.client.connect(&self.connection_id)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: "arbor::session", session = id, "Opened session");
        Ok(Rc::new_cyclic(|this| Session {
            id,
            connection_id: self.connection_id.clone(),
            connection: RefCell::new(Some(connection)),
            model: Arc::clone(&self.model),
            tracker: RefCell::new(Tracker::default()),
            collections: RefCell::new(HashMap::new()),
            dispatcher: self.dispatcher.clone(),
            statement_log: self.statement_log.clone(),
            this: this.clone(),
        }))
    }
}

// ============================================================================
// Session
// ============================================================================

/// One connection-scoped unit of work
pub struct Session {
    id: u64,
    connection_id: ConnectionId,
    connection: RefCell<Option<Arc<dyn StoreConnection>>>,
    model: Arc<Model>,
    tracker: RefCell<Tracker>,
    collections: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    dispatcher: Option<Arc<CommitDispatcher>>,
    statement_log: Option<StatementLog>,
    this: Weak<Session>,
}

impl Session {
    /// Process-unique session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection identifier this session was opened for
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Schema model
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// True once the session has released its connection
    pub fn is_disposed(&self) -> bool {
        self.connection.borrow().is_none()
    }

    fn connection(&self) -> Result<Arc<dyn StoreConnection>> {
        self.connection
            .borrow()
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::SessionDisposed(self.id))
    }

    fn descriptor<T: Entity>(&self) -> Result<&'static EntityDescriptor> {
        self.model.descriptor::<T>()
    }

    fn log_statement(&self, statement: impl FnOnce() -> String) {
        if let Some(log) = &self.statement_log {
            log(&statement());
        }
    }

    // ------------------------------------------------------------------------
    // Typed collections
    // ------------------------------------------------------------------------

    /// Typed collection handle for `T`, created on first access and cached.
    ///
    /// # Errors
    ///
    /// - `Error::UnmappedEntity` if `T` is not in the model
    /// - `Error::SessionDisposed` after disposal
    pub fn collection<T: Entity>(&self) -> Result<Rc<Collection<T>>> {
        let descriptor = self.descriptor::<T>()?;
        self.connection()?;

        let cached = {
            let mut collections = self.collections.borrow_mut();
            Rc::clone(collections.entry(TypeId::of::<T>()).or_insert_with(|| {
                Rc::new(Collection::<T> {
                    session: self.this.clone(),
                    session_id: self.id,
                    descriptor,
                    _marker: PhantomData,
                }) as Rc<dyn Any>
            }))
        };
        cached
            .downcast::<Collection<T>>()
            .map_err(|_| Error::Mapping(format!("collection cache mismatch for {}", descriptor.name)))
    }

    /// Number of typed collections created so far
    pub fn collection_count(&self) -> usize {
        self.collections.borrow().len()
    }

    // ------------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------------

    /// Stage an insert.
    ///
    /// If an entity with the same key is already tracked its data is replaced;
    /// a tracked entity that was not itself added becomes `Modified`.
    pub fn add<T: Entity>(&self, entity: T) -> Result<EntryId> {
        self.descriptor::<T>()?;
        self.connection()?;
        let mut tracker = self.tracker.borrow_mut();
        match tracker.lookup(T::descriptor().collection, &entity.key()) {
            Some(id) => {
                if let Some(entry) = tracker.entries.get_mut(&id) {
                    entry.entity = Box::new(entity);
                    if entry.state != EntryState::Added {
                        entry.state = EntryState::Modified;
                    }
                }
                Ok(id)
            }
            None => Ok(tracker.track(Box::new(entity), EntryState::Added)),
        }
    }

    /// Track an entity as matching the store, replacing tracked data for
    /// the same key without changing its state.
    pub fn attach<T: Entity>(&self, entity: T) -> Result<EntryId> {
        self.descriptor::<T>()?;
        self.connection()?;
        let mut tracker = self.tracker.borrow_mut();
        match tracker.lookup(T::descriptor().collection, &entity.key()) {
            Some(id) => {
                if let Some(entry) = tracker.entries.get_mut(&id) {
                    entry.entity = Box::new(entity);
                }
                Ok(id)
            }
            None => Ok(tracker.track(Box::new(entity), EntryState::Unchanged)),
        }
    }

    /// Stage an update of `entity`, attaching it first if untracked.
    ///
    /// An entity still staged for insert stays `Added`.
    pub fn mark_modified<T: Entity>(&self, entity: &T) -> Result<EntryId> {
        self.descriptor::<T>()?;
        self.connection()?;
        let mut tracker = self.tracker.borrow_mut();
        match tracker.lookup(T::descriptor().collection, &entity.key()) {
            Some(id) => {
                if let Some(entry) = tracker.entries.get_mut(&id) {
                    entry.entity = Box::new(entity.clone());
                    if entry.state != EntryState::Added {
                        entry.state = EntryState::Modified;
                    }
                }
                Ok(id)
            }
            None => Ok(tracker.track(Box::new(entity.clone()), EntryState::Modified)),
        }
    }

    /// Stage a delete of `entity`, attaching it first if untracked.
    ///
    /// Removing an entity still staged for insert simply forgets it.
    pub fn remove<T: Entity>(&self, entity: &T) -> Result<()> {
        self.descriptor::<T>()?;
        self.connection()?;
        let mut tracker = self.tracker.borrow_mut();
        match tracker.lookup(T::descriptor().collection, &entity.key()) {
            Some(id) => {
                let added = tracker
                    .entries
                    .get(&id)
                    .map_or(false, |e| e.state == EntryState::Added);
                if added {
                    tracker.untrack(id);
                } else if let Some(entry) = tracker.entries.get_mut(&id) {
                    entry.state = EntryState::Deleted;
                }
            }
            None => {
                tracker.track(Box::new(entity.clone()), EntryState::Deleted);
            }
        }
        Ok(())
    }

    /// Stop tracking `entity`. Returns false if it was not tracked.
    pub fn detach<T: Entity>(&self, entity: &T) -> bool {
        let mut tracker = self.tracker.borrow_mut();
        match tracker.lookup(T::descriptor().collection, &entity.key()) {
            Some(id) => tracker.untrack(id).is_some(),
            None => false,
        }
    }

    /// Tracking id of `entity`, if tracked
    pub fn entry_of<T: Entity>(&self, entity: &T) -> Option<EntryId> {
        self.tracker
            .borrow()
            .lookup(T::descriptor().collection, &entity.key())
    }

    /// Current tracked value of an entry
    pub fn entity<T: Entity>(&self, id: EntryId) -> Option<T> {
        self.tracker
            .borrow()
            .entries
            .get(&id)
            .and_then(|e| e.entity.as_any().downcast_ref::<T>().cloned())
    }

    /// Tracking state of an entry
    pub fn entry_state(&self, id: EntryId) -> Option<EntryState> {
        self.tracker.borrow().entries.get(&id).map(|e| e.state)
    }

    /// Summary of staged changes
    pub fn pending(&self) -> PendingChanges {
        let tracker = self.tracker.borrow();
        let mut pending = PendingChanges::default();
        for entry in tracker.entries.values() {
            match entry.state {
                EntryState::Added => pending.added += 1,
                EntryState::Modified => pending.modified += 1,
                EntryState::Deleted => pending.deleted += 1,
                EntryState::Unchanged => {}
            }
        }
        pending
    }

    /// True if anything is staged
    pub fn has_changes(&self) -> bool {
        self.tracker
            .borrow()
            .entries
            .values()
            .any(|e| e.state != EntryState::Unchanged)
    }

    /// Number of tracked entities, staged or not
    pub fn tracked_count(&self) -> usize {
        self.tracker.borrow().entries.len()
    }

    /// Forget every staged change; unchanged entities stay tracked
    pub fn discard_changes(&self) {
        let mut tracker = self.tracker.borrow_mut();
        let staged: Vec<EntryId> = tracker
            .entries
            .iter()
            .filter(|(_, e)| e.state != EntryState::Unchanged)
            .map(|(id, _)| *id)
            .collect();
        for id in staged {
            tracker.untrack(id);
        }
    }

    /// Forget everything tracked
    pub fn clear(&self) {
        self.tracker.borrow_mut().clear();
    }

    /// Visit every entity staged for insert or update, in staging order
    pub(crate) fn for_each_pending(&self, mut visit: impl FnMut(EntryState, &mut dyn StagedEntity)) {
        let mut tracker = self.tracker.borrow_mut();
        for entry in tracker.entries.values_mut() {
            if matches!(entry.state, EntryState::Added | EntryState::Modified) {
                visit(entry.state, entry.entity.as_mut());
            }
        }
    }

    fn first_validation_failure(&self) -> Option<(String, Vec<String>)> {
        let tracker = self.tracker.borrow();
        tracker
            .entries
            .values()
            .filter(|e| matches!(e.state, EntryState::Added | EntryState::Modified))
            .find_map(|e| {
                e.entity
                    .check()
                    .err()
                    .map(|errors| (e.entity.staged_descriptor().name.to_string(), errors))
            })
    }

    fn change_set(&self) -> ChangeSet {
        let tracker = self.tracker.borrow();
        let mut changes = ChangeSet::new();
        for entry in tracker.entries.values() {
            let collection = entry.entity.staged_descriptor().collection;
            let key = entry.entity.staged_key();
            match entry.state {
                EntryState::Unchanged => {}
                EntryState::Added => changes.push(ChangeOp::Insert {
                    collection,
                    key,
                    record: entry.entity.staged_record(),
                }),
                EntryState::Modified => changes.push(ChangeOp::Update {
                    collection,
                    key,
                    record: entry.entity.staged_record(),
                }),
                EntryState::Deleted => changes.push(ChangeOp::Delete { collection, key }),
            }
        }
        changes
    }

    fn accept_changes(&self) {
        let mut tracker = self.tracker.borrow_mut();
        let deleted: Vec<EntryId> = tracker
            .entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::Deleted)
            .map(|(id, _)| *id)
            .collect();
        for id in deleted {
            tracker.untrack(id);
        }
        for entry in tracker.entries.values_mut() {
            entry.state = EntryState::Unchanged;
        }
    }

    /// Turn a conflicting insert into an update
    fn demote_added(&self, collection: &str, key: &RecordKey) -> Option<EntryId> {
        let descriptor = self.model.collection(collection)?;
        let mut tracker = self.tracker.borrow_mut();
        let id = tracker.lookup(descriptor.collection, key)?;
        let entry = tracker.entries.get_mut(&id)?;
        if entry.state != EntryState::Added {
            return None;
        }
        entry.state = EntryState::Modified;
        Some(id)
    }

    /// Carry stored creation fields into a staged update.
    ///
    /// A field already set in the store wins over the staged value.
    fn adopt_stored_creation(&self, connection: &dyn StoreConnection, id: EntryId) -> Result<()> {
        let mut tracker = self.tracker.borrow_mut();
        let Some(entry) = tracker.entries.get_mut(&id) else {
            return Ok(());
        };
        let collection = entry.entity.staged_descriptor().collection;
        let key = entry.entity.staged_key();
        let Some(stamp) = entry.entity.creation() else {
            return Ok(());
        };
        if let Some(stored) = connection.find(collection, &key)? {
            let existing = CreateStamp::read_from(&stored)?;
            if existing.created_at.is_some() {
                stamp.created_at = existing.created_at;
            }
            if existing.created_by.as_ref().map_or(false, |a| !a.is_empty()) {
                stamp.created_by = existing.created_by;
            }
        }
        Ok(())
    }

    /// Keep stored creation fields on every staged update of a Createable entity
    fn preserve_creation(&self, connection: &dyn StoreConnection) -> Result<()> {
        let modified: Vec<EntryId> = self
            .tracker
            .borrow_mut()
            .entries
            .iter_mut()
            .filter_map(|(id, e)| {
                (e.state == EntryState::Modified && e.entity.creation().is_some()).then_some(*id)
            })
            .collect();
        for id in modified {
            self.adopt_stored_creation(connection, id)?;
        }
        Ok(())
    }

    fn execute(&self, connection: &dyn StoreConnection, changes: &ChangeSet) -> Result<usize> {
        for op in changes {
            self.log_statement(|| op.to_string());
        }
        connection.execute(changes)
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Stamp, validate and write every staged change.
    ///
    /// An insert that collides with an existing key is retried once as an
    /// update (keeping the stored creation stamp); a second failure is
    /// returned. Updates never replace creation fields already stored.
    ///
    /// # Errors
    ///
    /// Store failures other than a recoverable constraint violation.
    /// Validation failures are reported as [`CommitOutcome::Rejected`].
    pub fn commit(&self, actor: Option<&Actor>) -> Result<CommitOutcome> {
        let connection = self.connection()?;
        if !self.has_changes() {
            return Ok(CommitOutcome::Committed { changes: 0 });
        }

        self.preserve_creation(connection.as_ref())?;
        AuditStamper::stamp(self, actor);
        if let Some((entity, errors)) = self.first_validation_failure() {
            warn!(
                target: "arbor::session",
                session = self.id,
                entity = %entity,
                errors = ?errors,
                "Commit rejected by validation"
            );
            return Ok(CommitOutcome::Rejected { entity, errors });
        }

        let changes = self.change_set();
        let written = match self.execute(connection.as_ref(), &changes) {
            Ok(written) => written,
            Err(Error::ConstraintViolation {
                collection,
                key,
                message,
            }) => {
                let Some(id) = self.demote_added(&collection, &key) else {
                    return Err(Error::ConstraintViolation {
                        collection,
                        key,
                        message,
                    });
                };
                warn!(
                    target: "arbor::session",
                    session = self.id,
                    collection = %collection,
                    key = %key,
                    "Insert hit an existing key; retrying as update"
                );
                self.adopt_stored_creation(connection.as_ref(), id)?;
                AuditStamper::stamp(self, actor);
                let changes = self.change_set();
                self.execute(connection.as_ref(), &changes)?
            }
            Err(e) => return Err(e),
        };

        self.accept_changes();
        debug!(target: "arbor::session", session = self.id, written, "Committed");
        Ok(CommitOutcome::Committed { changes: written })
    }

    /// Stamp and hand staged changes to the commit dispatcher, then return.
    ///
    /// The outcome is never reported: store errors, and validation failures,
    /// are logged and otherwise lost. Locally the changes count as accepted
    /// as soon as they are handed off.
    pub fn commit_async(&self, actor: Option<&Actor>) {
        let connection = match self.connection() {
            Ok(connection) => connection,
            Err(e) => {
                warn!(target: "arbor::session", session = self.id, error = %e, "Detached commit dropped");
                return;
            }
        };
        if !self.has_changes() {
            return;
        }

        if let Err(e) = self.preserve_creation(connection.as_ref()) {
            warn!(target: "arbor::session", session = self.id, error = %e, "Detached commit dropped");
            self.discard_changes();
            return;
        }
        AuditStamper::stamp(self, actor);
        if let Some((entity, errors)) = self.first_validation_failure() {
            warn!(
                target: "arbor::session",
                session = self.id,
                entity = %entity,
                errors = ?errors,
                "Detached commit rejected by validation"
            );
            self.discard_changes();
            return;
        }

        let commit = Arc::new(DetachedCommit {
            session: self.id,
            connection,
            changes: self.change_set(),
            statement_log: self.statement_log.clone(),
        });
        self.accept_changes();

        match &self.dispatcher {
            Some(dispatcher) => {
                let job = Arc::clone(&commit);
                if dispatcher.submit(move || job.run()).is_err() {
                    debug!(
                        target: "arbor::session",
                        session = self.id,
                        "Dispatcher unavailable; committing inline"
                    );
                    commit.run();
                }
            }
            None => commit.run(),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Find by key, consulting tracked entities first.
    ///
    /// Entities loaded from the store become tracked as `Unchanged`.
    pub fn find<T: Entity>(&self, key: impl Into<RecordKey>) -> Result<Option<T>> {
        let descriptor = self.descriptor::<T>()?;
        let connection = self.connection()?;
        let key = key.into();

        {
            let tracker = self.tracker.borrow();
            if let Some(entry) = tracker
                .lookup(descriptor.collection, &key)
                .and_then(|id| tracker.entries.get(&id))
            {
                if entry.state == EntryState::Deleted {
                    return Ok(None);
                }
                return Ok(entry.entity.as_any().downcast_ref::<T>().cloned());
            }
        }

        self.log_statement(|| format!("FIND {} [{}]", descriptor.collection, key));
        match connection.find(descriptor.collection, &key)? {
            Some(record) => {
                let entity = T::from_record(&record)?;
                self.tracker
                    .borrow_mut()
                    .track(Box::new(entity.clone()), EntryState::Unchanged);
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Read every stored `T`, embedding the named relationships.
    ///
    /// Results are not tracked.
    ///
    /// # Errors
    ///
    /// `Error::UnknownInclude` if an include names no declared relationship.
    pub fn fetch<T: Entity>(&self, includes: &[&str]) -> Result<Vec<T>> {
        let descriptor = self.descriptor::<T>()?;
        let relationships = includes
            .iter()
            .map(|name| descriptor.relationship(name))
            .collect::<Result<Vec<_>>>()?;
        let connection = self.connection()?;

        self.log_statement(|| format!("SELECT {}", descriptor.collection));
        let mut rows = connection.scan(descriptor.collection, None)?;

        for relationship in relationships {
            self.log_statement(|| {
                format!(
                    "SELECT {} BY {} (include {})",
                    relationship.collection, relationship.foreign_key, relationship.name
                )
            });
            let mut grouped: HashMap<RecordKey, Vec<Value>> = HashMap::new();
            for child in connection.scan(relationship.collection, None)? {
                let parent = child
                    .get(relationship.foreign_key)
                    .and_then(RecordKey::from_value);
                if let Some(parent) = parent {
                    grouped.entry(parent).or_default().push(Value::Record(child));
                }
            }
            for row in rows.iter_mut() {
                let related = row
                    .get(descriptor.key)
                    .and_then(RecordKey::from_value)
                    .and_then(|key| grouped.get(&key).cloned())
                    .unwrap_or_default();
                row.set(relationship.name, Value::Array(related));
            }
        }

        rows.iter().map(T::from_record).collect()
    }

    // ------------------------------------------------------------------------
    // Set-based paths
    // ------------------------------------------------------------------------

    /// Insert many entities in one statement, bypassing change tracking.
    ///
    /// Entities are written as given; stamp them first.
    pub fn bulk_insert<T: Entity>(&self, entities: &[T]) -> Result<usize> {
        let descriptor = self.descriptor::<T>()?;
        let connection = self.connection()?;
        let rows = entities
            .iter()
            .map(|e| (e.key(), descriptor.project(&e.to_record())))
            .collect::<Vec<_>>();
        self.log_statement(|| format!("BULK INSERT {} ({} rows)", descriptor.collection, rows.len()));
        connection.bulk_insert(descriptor.collection, rows)
    }

    /// Assign fields on every stored `T` matching `predicate`.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownField` if an assignment names an unmapped column
    /// - `Error::Mapping` if an assignment targets the key column
    pub fn bulk_update<T, P>(&self, predicate: P, assignments: &Record) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        let descriptor = self.descriptor::<T>()?;
        for (field, _) in assignments.iter() {
            if !descriptor.has_column(field) {
                return Err(Error::UnknownField {
                    entity: descriptor.name.to_string(),
                    field: field.clone(),
                });
            }
            if field == descriptor.key {
                return Err(Error::Mapping(format!(
                    "{}: key column '{}' cannot be bulk-assigned",
                    descriptor.name, field
                )));
            }
        }
        let connection = self.connection()?;
        self.log_statement(|| {
            format!(
                "BULK UPDATE {} SET {}",
                descriptor.collection,
                assignments
                    .iter()
                    .map(|(field, _)| field.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        });
        let filter = typed_filter(predicate);
        connection.bulk_update(descriptor.collection, &filter, assignments)
    }

    /// Delete every stored `T` matching `predicate`
    pub fn bulk_delete<T, P>(&self, predicate: P) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        let descriptor = self.descriptor::<T>()?;
        let connection = self.connection()?;
        self.log_statement(|| format!("BULK DELETE {}", descriptor.collection));
        let filter = typed_filter(predicate);
        connection.bulk_delete(descriptor.collection, &filter)
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Release the connection and forget tracked state. Idempotent.
    pub fn dispose(&self) {
        let Some(connection) = self.connection.borrow_mut().take() else {
            return;
        };
        let discarded = self.pending().total();
        self.tracker.borrow_mut().clear();
        self.collections.borrow_mut().clear();
        drop(connection);
        debug!(target: "arbor::session", session = self.id, discarded, "Disposed session");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("disposed", &self.is_disposed())
            .field("pending", &self.pending())
            .finish()
    }
}

fn typed_filter<T, P>(predicate: P) -> impl Fn(&Record) -> bool + Send + Sync
where
    T: Entity,
    P: Fn(&T) -> bool + Send + Sync,
{
    move |record| T::from_record(record).map_or(false, |entity| predicate(&entity))
}

// ============================================================================
// Detached commits
// ============================================================================

struct DetachedCommit {
    session: u64,
    connection: Arc<dyn StoreConnection>,
    changes: ChangeSet,
    statement_log: Option<StatementLog>,
}

impl DetachedCommit {
    fn execute(&self, changes: &ChangeSet) -> Result<usize> {
        if let Some(log) = &self.statement_log {
            for op in changes {
                log(&op.to_string());
            }
        }
        self.connection.execute(changes)
    }

    fn run(&self) {
        let result = match self.execute(&self.changes) {
            Err(Error::ConstraintViolation { collection, key, .. }) => {
                let mut retry = self.changes.clone();
                if retry.demote_insert(&collection, &key) {
                    self.execute(&retry)
                } else {
                    Err(Error::ConstraintViolation {
                        collection,
                        key,
                        message: "duplicate key".to_string(),
                    })
                }
            }
            other => other,
        };
        match result {
            Ok(written) => {
                debug!(target: "arbor::dispatcher", session = self.session, written, "Detached commit applied")
            }
            Err(e) => {
                warn!(
                    target: "arbor::dispatcher",
                    session = self.session,
                    error = %e,
                    "Detached commit failed; the error is not surfaced"
                )
            }
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Typed view of one entity collection within a session
pub struct Collection<T: Entity> {
    session: Weak<Session>,
    session_id: u64,
    descriptor: &'static EntityDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Collection<T> {
    fn session(&self) -> Result<SessionHandle> {
        self.session
            .upgrade()
            .ok_or(Error::SessionDisposed(self.session_id))
    }

    /// Mapping of the collection
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    /// See [`Session::find`]
    pub fn find(&self, key: impl Into<RecordKey>) -> Result<Option<T>> {
        self.session()?.find(key)
    }

    /// See [`Session::fetch`]
    pub fn fetch(&self, includes: &[&str]) -> Result<Vec<T>> {
        self.session()?.fetch(includes)
    }

    /// See [`Session::add`]
    pub fn add(&self, entity: T) -> Result<EntryId> {
        self.session()?.add(entity)
    }

    /// See [`Session::attach`]
    pub fn attach(&self, entity: T) -> Result<EntryId> {
        self.session()?.attach(entity)
    }

    /// See [`Session::remove`]
    pub fn remove(&self, entity: &T) -> Result<()> {
        self.session()?.remove(entity)
    }

    /// See [`Session::mark_modified`]
    pub fn mark_modified(&self, entity: &T) -> Result<EntryId> {
        self.session()?.mark_modified(entity)
    }
}
