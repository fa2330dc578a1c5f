extern crate self as actorstate;

pub mod base;
pub mod configure;
pub mod container;
pub mod convention;
pub mod dispatch;
pub mod entry;
pub mod errors;
pub mod identity;
pub mod options;
pub mod query;
pub mod record;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod storages;

// Re-exports

pub mod prelude {
    pub use crate::container::StateContainer;
    pub use crate::convention::{ConventionOptions, DefaultConvention, StorageConvention};
    pub use crate::dispatch::ActorStorage;
    pub use crate::entry::{DefaultEntryConfigurator, EntryConfigurator, SaveEntryContext};
    pub use crate::errors::{ConfigError, InconsistentState, StorageError, StorageResult};
    pub use crate::identity::{ActorIdentity, ActorKey};
    pub use crate::options::{ConfiguredOptions, KeyShape, StorageOptions};
    pub use crate::query::RecordSource;
    pub use crate::record::{Property, Record, RecordModel, Value};
    pub use crate::resolver::ActorState;
    pub use crate::session::{Database, Entry, EntryState, Session, SessionError};

    #[cfg(feature = "memory")]
    pub use crate::storages::memory::MemoryDb;

    #[cfg(feature = "macros")]
    pub use actorstate_macros::Record;
}
