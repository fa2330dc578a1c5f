//! In-process reference store.
//!
//! Tables are registered per record type. A session buffers tracked entries
//! and applies them all-or-nothing on commit. Concurrency-token properties
//! are checked on update and delete, and regenerated by the store on every
//! save: bytes become an 8-byte big-endian row version, integers are
//! incremented, UUIDs are replaced with a fresh v4 and strings take the row
//! version's digits. Boolean and float tokens are left to the client.
//!
//! Inserted records whose integer or UUID key properties still hold their
//! default value get a key from the store: the next row id for integers, a
//! fresh v4 for UUIDs. String keys are always client-assigned.

use std::{
    any::{Any, TypeId},
    fmt,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::{
    base::{TypeInfo, recover},
    query::{Filter, Param, Predicate, RecordSource},
    record::{PropertyKind, Record, Value},
    session::{
        ConcurrencyConflict, ConflictEntry, Database, Entry, EntryKey, EntryState, Session,
        SessionError,
    },
    trace,
};

type Table<R> = RwLock<Vec<R>>;

#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

pub struct MemorySession {
    inner: Arc<Inner>,
    pending: Vec<Box<dyn Pending>>,
}

/// Compiled lookup: readers are resolved once, when the plan is built.
pub struct MemoryQuery<R> {
    source: RecordSource<R>,
    filter: Filter<R>,
}

#[derive(Default)]
struct Inner {
    tables: RwLock<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    names: RwLock<FxHashMap<TypeId, TypeInfo>>,
    commit: Mutex<()>,
    version: AtomicU64,
}

trait Pending: Send + Sync {
    fn check(&self, db: &Inner) -> Result<(), SessionError>;

    fn apply(&mut self, db: &Inner) -> Result<(), SessionError>;

    fn record(&self) -> &(dyn Any + Send + Sync);
}

struct PendingEntry<R> {
    entry: Entry<R>,
}

// Implementations

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<R: Record>(self) -> Self {
        self.register::<R>();
        self
    }

    pub fn register<R: Record>(&self) {
        let info = TypeInfo::of::<R>();

        recover(self.inner.tables.write())
            .entry(info.id)
            .or_insert_with(|| Arc::new(Table::<R>::default()));
        recover(self.inner.names.write()).insert(info.id, info);
    }

    /// Insert a record directly, generating its tokens like a committed insert.
    pub fn insert<R: Record>(&self, record: R) -> Result<(), SessionError> {
        let mut pending = PendingEntry {
            entry: Entry {
                record,
                state: EntryState::Added,
            },
        };

        let _guard = recover(self.inner.commit.lock());
        pending.check(&self.inner)?;
        pending.apply(&self.inner)
    }

    pub fn records<R: Record>(&self) -> Vec<R> {
        match self.inner.table::<R>() {
            Ok(table) => recover(table.read()).clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len<R: Record>(&self) -> usize {
        match self.inner.table::<R>() {
            Ok(table) => recover(table.read()).len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty<R: Record>(&self) -> bool {
        self.len::<R>() == 0
    }
}

impl fmt::Debug for MemoryDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = recover(self.inner.names.read());
        f.debug_struct("MemoryDb")
            .field("tables", &names.values().map(|t| t.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Database for MemoryDb {
    type Session = MemorySession;

    async fn open(&self) -> Result<Self::Session, SessionError> {
        Ok(MemorySession {
            inner: self.inner.clone(),
            pending: Vec::new(),
        })
    }

    fn has_table<R: Record>(&self) -> bool {
        recover(self.inner.tables.read()).contains_key(&TypeId::of::<R>())
    }
}

impl Inner {
    fn table<R: Record>(&self) -> Result<Arc<Table<R>>, SessionError> {
        recover(self.tables.read())
            .get(&TypeId::of::<R>())
            .cloned()
            .and_then(|table| table.downcast::<Table<R>>().ok())
            .ok_or(SessionError::MissingTable {
                record: R::model().name(),
            })
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn single<R: Record>(
        &self,
        source: &RecordSource<R>,
        filter: &Filter<R>,
        params: &[Param],
    ) -> Result<Option<R>, SessionError> {
        let table = self.table::<R>()?;
        let rows = recover(table.read());

        let mut matches = rows
            .iter()
            .filter(|r| source.admits(*r) && filter(*r, params));

        let first = matches.next();
        if matches.next().is_some() {
            return Err(SessionError::MultipleResults {
                record: R::model().name(),
            });
        }

        Ok(first.cloned())
    }
}

impl Session for MemorySession {
    type Compiled<R: Record> = MemoryQuery<R>;

    fn compile<R: Record>(
        source: &RecordSource<R>,
        predicate: &Predicate,
    ) -> Result<Self::Compiled<R>, SessionError> {
        trace!("Compiling {predicate} for {}", R::model().name());

        Ok(MemoryQuery {
            source: source.clone(),
            filter: predicate.compile::<R>()?,
        })
    }

    async fn execute<R: Record>(
        &mut self,
        query: &Self::Compiled<R>,
        params: &[Param],
    ) -> Result<Option<R>, SessionError> {
        self.inner.single(&query.source, &query.filter, params)
    }

    async fn single_or_none<R: Record>(
        &mut self,
        source: &RecordSource<R>,
        filter: &Filter<R>,
        params: &[Param],
    ) -> Result<Option<R>, SessionError> {
        self.inner.single(source, filter, params)
    }

    fn track<R: Record>(&mut self, entry: Entry<R>) -> EntryKey {
        self.pending.push(Box::new(PendingEntry { entry }));
        EntryKey(self.pending.len() - 1)
    }

    fn tracked<R: Record>(&self, key: EntryKey) -> Option<R> {
        self.pending
            .get(key.0)
            .and_then(|p| p.record().downcast_ref::<R>())
            .cloned()
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let _guard = recover(self.inner.commit.lock());

        for pending in &self.pending {
            pending.check(&self.inner)?;
        }

        for pending in &mut self.pending {
            pending.apply(&self.inner)?;
        }

        Ok(())
    }
}

impl<R: Record> PendingEntry<R> {
    fn same_key(a: &R, b: &R) -> bool {
        let model = R::model();

        model.primary_key().iter().all(|name| {
            model
                .property(name)
                .is_some_and(|p| p.read(a) == p.read(b))
        })
    }

    fn key_of(record: &R) -> String {
        let model = R::model();

        model
            .primary_key()
            .iter()
            .filter_map(|name| model.property(name))
            .map(|p| p.read(record).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn conflict(&self, stored: Option<&R>) -> SessionError {
        let stored_values = stored.map(|s| {
            R::model()
                .values(s)
                .into_iter()
                .map(|(name, value)| (name, value.into_owned()))
                .collect()
        });

        ConcurrencyConflict {
            message: format!(
                "Saving {} with key {} expected to affect 1 row but affected 0; \
                 the row was modified or deleted since it was read",
                R::model().name(),
                Self::key_of(&self.entry.record)
            ),
            entries: vec![ConflictEntry::new(self.entry.record.clone(), stored_values)],
        }
        .into()
    }

    /// Whether some key property of `record` is left for the store to fill in.
    fn generates_key(record: &R) -> bool {
        let model = R::model();

        model
            .primary_key()
            .iter()
            .filter_map(|name| model.property(name))
            .any(|p| {
                matches!(
                    p.kind(),
                    PropertyKind::Int { .. } | PropertyKind::UInt { .. } | PropertyKind::Uuid
                ) && p.read(record).is_default()
            })
    }

    fn generate_key(record: &mut R, rows: &[R]) {
        let model = R::model();

        for property in model.primary_key().iter().filter_map(|name| model.property(name)) {
            if !property.read(record).is_default() {
                continue;
            }

            let next = match property.kind() {
                PropertyKind::Int { .. } => {
                    let max = rows
                        .iter()
                        .filter_map(|r| match property.read(r) {
                            Value::Integer(i) => Some(i),
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0);
                    Value::Integer(max.saturating_add(1))
                }
                PropertyKind::UInt { .. } => {
                    let max = rows
                        .iter()
                        .filter_map(|r| match property.read(r) {
                            Value::Unsigned(u) => Some(u),
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0);
                    Value::Unsigned(max.saturating_add(1))
                }
                PropertyKind::Uuid => Value::Uuid(Uuid::new_v4()),
                _ => continue,
            };

            property.write(record, next);
        }
    }

    fn tokens_match(stored: &R, submitted: &R) -> bool {
        R::model()
            .concurrency_tokens()
            .all(|p| p.read(stored) == p.read(submitted))
    }

    /// Replace every store-managed token of `record` with a new value.
    fn regenerate_tokens(record: &mut R, version: u64) {
        for property in R::model().concurrency_tokens() {
            let next = match (property.kind(), property.read(record)) {
                (PropertyKind::Bytes, _) => Value::Bytes(version.to_be_bytes().to_vec().into()),
                (PropertyKind::Int { .. }, Value::Integer(i)) => Value::Integer(i.wrapping_add(1)),
                (PropertyKind::Int { .. }, _) => Value::Integer(1),
                (PropertyKind::UInt { .. }, Value::Unsigned(u)) => Value::Unsigned(u.wrapping_add(1)),
                (PropertyKind::UInt { .. }, _) => Value::Unsigned(1),
                (PropertyKind::Uuid, _) => Value::Uuid(Uuid::new_v4()),
                (PropertyKind::String, _) => Value::Str(version.to_string().into()),
                (PropertyKind::Bool | PropertyKind::Float { .. }, _) => continue,
            };

            property.write(record, next);
        }
    }
}

impl<R: Record> Pending for PendingEntry<R> {
    fn check(&self, db: &Inner) -> Result<(), SessionError> {
        let table = db.table::<R>()?;
        let rows = recover(table.read());
        let stored = rows.iter().find(|r| Self::same_key(r, &self.entry.record));

        match (self.entry.state, stored) {
            (EntryState::Added, Some(_)) if !Self::generates_key(&self.entry.record) => {
                Err(SessionError::DuplicateKey {
                    record: R::model().name(),
                    key: Self::key_of(&self.entry.record),
                })
            }
            (EntryState::Modified, None) => Err(self.conflict(None)),
            (EntryState::Modified | EntryState::Deleted, Some(stored))
                if !Self::tokens_match(stored, &self.entry.record) =>
            {
                Err(self.conflict(Some(stored)))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, db: &Inner) -> Result<(), SessionError> {
        let table = db.table::<R>()?;
        let mut rows = recover(table.write());
        let record = &mut self.entry.record;

        match self.entry.state {
            EntryState::Added => {
                Self::generate_key(record, &rows);
                Self::regenerate_tokens(record, db.next_version());
                rows.push(record.clone());
            }
            EntryState::Modified => {
                Self::regenerate_tokens(record, db.next_version());
                if let Some(stored) = rows.iter_mut().find(|r| Self::same_key(r, record)) {
                    *stored = record.clone();
                }
            }
            EntryState::Deleted => rows.retain(|r| !Self::same_key(r, record)),
            EntryState::Detached | EntryState::Unchanged => {}
        }

        Ok(())
    }

    fn record(&self) -> &(dyn Any + Send + Sync) {
        &self.entry.record
    }
}
