//! Mapping from actor-state types to the record type persisted for them.
//!
//! Most states are their own record, which `#[derive(Record)]` declares. A
//! wrapper state names the record it wraps:
//!
//! ```ignore
//! struct Session(Account);
//!
//! impl ActorState for Session {
//!     type Record = Account;
//! }
//! ```
//!
//! Such a wrapper also needs custom get/set-entity functions in its
//! [`StorageOptions`](crate::options::StorageOptions), since the default ones
//! only move a record in and out of a state of the same type.

use crate::{base::TypeInfo, record::Record};

pub trait ActorState: Send + Sync + 'static {
    type Record: Record;
}

/// Record type persisted for `S`.
pub fn resolve_record_type<S: ActorState>() -> TypeInfo {
    TypeInfo::of::<S::Record>()
}

/// State type the engine is instantiated for.
pub fn resolve_state_type<S: ActorState>() -> TypeInfo {
    TypeInfo::of::<S>()
}
