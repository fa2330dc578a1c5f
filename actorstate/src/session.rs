//! The database collaborator.
//!
//! A [`Database`] opens scoped [`Session`]s. Each read, write or clear uses
//! exactly one session and drops it afterwards; nothing spans operations.

use std::{any::Any, fmt, sync::Arc};

use thiserror::Error;

use crate::{
    query::{Filter, Param, Predicate, RecordSource},
    record::{Record, Value},
};

pub trait Database: Send + Sync + 'static {
    type Session: Session;

    fn open(&self) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;

    /// Whether the store holds a table for `R`.
    fn has_table<R: Record>(&self) -> bool;
}

/// Unit of work against the store.
pub trait Session: Send + 'static {
    /// A query plan compiled once and executed with different parameters.
    type Compiled<R: Record>: Send + Sync + 'static;

    fn compile<R: Record>(
        source: &RecordSource<R>,
        predicate: &Predicate,
    ) -> Result<Self::Compiled<R>, SessionError>;

    /// Run a compiled plan. More than one match is [`SessionError::MultipleResults`].
    fn execute<R: Record>(
        &mut self,
        query: &Self::Compiled<R>,
        params: &[Param],
    ) -> impl Future<Output = Result<Option<R>, SessionError>> + Send;

    /// Run an in-memory filter over `source`. Same cardinality rule as [`Session::execute`].
    fn single_or_none<R: Record>(
        &mut self,
        source: &RecordSource<R>,
        filter: &Filter<R>,
        params: &[Param],
    ) -> impl Future<Output = Result<Option<R>, SessionError>> + Send;

    fn track<R: Record>(&mut self, entry: Entry<R>) -> EntryKey;

    /// The tracked record, reflecting store-generated values after a commit.
    fn tracked<R: Record>(&self, key: EntryKey) -> Option<R>;

    fn commit(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryState {
    #[default]
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// A record together with the disposition it will be saved with.
#[derive(Debug, Clone)]
pub struct Entry<R> {
    pub record: R,
    pub state: EntryState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey(pub usize);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyConflict),
    #[error("sequence of {record} contains more than one matching element")]
    MultipleResults { record: &'static str },
    #[error("{record} with key {key} already exists")]
    DuplicateKey { record: &'static str, key: String },
    #[error("{record} has no property '{property}'")]
    UnknownProperty {
        record: &'static str,
        property: String,
    },
    #[error("no table for {record}")]
    MissingTable { record: &'static str },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Commit rejected because stored rows changed since they were read.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConcurrencyConflict {
    pub message: String,
    pub entries: Vec<ConflictEntry>,
}

/// One conflicting entry: the record as submitted and, when the row still
/// exists, its stored property values.
#[derive(Clone)]
pub struct ConflictEntry {
    pub record_type: &'static str,
    pub record: Arc<dyn Any + Send + Sync>,
    pub stored_values: Option<Vec<(&'static str, Value<'static>)>>,
}

// Implementations

impl<R> Entry<R> {
    pub fn new(record: R) -> Self {
        Self {
            record,
            state: EntryState::Detached,
        }
    }
}

impl ConflictEntry {
    pub fn new<R: Record>(record: R, stored_values: Option<Vec<(&'static str, Value<'static>)>>) -> Self {
        Self {
            record_type: R::model().name(),
            record: Arc::new(record),
            stored_values,
        }
    }

    pub fn record<R: Record>(&self) -> Option<&R> {
        self.record.downcast_ref::<R>()
    }

    pub fn stored_value(&self, property: &str) -> Option<&Value<'static>> {
        self.stored_values
            .as_ref()?
            .iter()
            .find(|(name, _)| *name == property)
            .map(|(_, value)| value)
    }
}

impl fmt::Debug for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictEntry")
            .field("record_type", &self.record_type)
            .field("stored_values", &self.stored_values)
            .finish_non_exhaustive()
    }
}
