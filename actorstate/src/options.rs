//! Per-state storage options.
//!
//! [`StorageOptions`] is the fluent surface callers use before first use of a
//! state. Post-configuration merges it with the convention defaults and
//! freezes it into [`ConfiguredOptions`], which holds every compiled function
//! and can no longer be changed.

use std::{fmt, sync::Arc};

use futures::future::BoxFuture;

use crate::{
    container::StateContainer,
    errors::{ConfigError, StorageResult},
    identity::{ActorIdentity, ActorKey},
    query::{Param, RecordSource},
    record::{Property, PropertyKind, Reader, Record, Value},
    resolver::ActorState,
    session::Session,
};

pub type ReadStateFn<Sess, R> = Arc<
    dyn for<'a> Fn(&'a mut Sess, &'a ActorIdentity) -> BoxFuture<'a, StorageResult<Option<R>>>
        + Send
        + Sync,
>;
pub type IsPersistedFn<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;
pub type TokenGetter<R> = Arc<dyn Fn(&R) -> Option<String> + Send + Sync>;
pub type TokenConverter = Arc<dyn Fn(&Value<'_>) -> Option<String> + Send + Sync>;
pub type SetEntityFn<S, R> =
    Arc<dyn Fn(&mut StateContainer<S>, R) -> Result<(), ConfigError> + Send + Sync>;
pub type GetEntityFn<S, R> = Arc<dyn Fn(&StateContainer<S>) -> Option<R> + Send + Sync>;

/// Shape of a record's key, fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyShape {
    Uuid,
    Integer,
    String,
}

/// A resolved property accessor.
pub struct Selector<R> {
    pub name: &'static str,
    pub read: Reader<R>,
}

/// Resolved concurrency-token handling.
pub struct TokenConfig<R> {
    pub property: &'static str,
    pub kind: PropertyKind,
    pub type_name: &'static str,
    pub getter: TokenGetter<R>,
    pub converter: TokenConverter,
}

pub struct StorageOptions<Sess: Session, S: ActorState> {
    pub(crate) key_property: Option<String>,
    pub(crate) key_ext_property: Option<String>,
    pub(crate) token_property: Option<String>,
    pub(crate) persistence_check_property: Option<String>,
    pub(crate) use_token: bool,
    pub(crate) precompile: bool,
    pub(crate) query_source: Option<RecordSource<S::Record>>,
    pub(crate) read_state: Option<ReadStateFn<Sess, S::Record>>,
    pub(crate) is_persisted: Option<IsPersistedFn<S::Record>>,
    pub(crate) set_entity: Option<SetEntityFn<S, S::Record>>,
    pub(crate) get_entity: Option<GetEntityFn<S, S::Record>>,
}

/// Frozen options of one state, shared by its storage engine.
pub struct ConfiguredOptions<Sess: Session, S: ActorState> {
    pub(crate) state_name: String,
    pub(crate) key_selector: Option<Selector<S::Record>>,
    pub(crate) key_ext_selector: Option<Selector<S::Record>>,
    pub(crate) key_shape: Option<KeyShape>,
    pub(crate) precompiled: bool,
    pub(crate) token: Option<TokenConfig<S::Record>>,
    pub(crate) read_state: ReadStateFn<Sess, S::Record>,
    pub(crate) is_persisted: IsPersistedFn<S::Record>,
    pub(crate) set_entity: SetEntityFn<S, S::Record>,
    pub(crate) get_entity: GetEntityFn<S, S::Record>,
}

/// Wrap a read function, pinning its signature to every borrow lifetime.
pub fn read_state_fn<Sess, R, F>(f: F) -> ReadStateFn<Sess, R>
where
    F: for<'a> Fn(&'a mut Sess, &'a ActorIdentity) -> BoxFuture<'a, StorageResult<Option<R>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

// Implementations

impl KeyShape {
    /// Shape for a key property; only UUID, i64 and string keys are supported.
    pub fn of<R: 'static>(property: &Property<R>) -> Option<Self> {
        if property.is_nullable() {
            return None;
        }

        match property.kind() {
            PropertyKind::Uuid => Some(KeyShape::Uuid),
            PropertyKind::Int { bits: 64 } => Some(KeyShape::Integer),
            PropertyKind::String => Some(KeyShape::String),
            _ => None,
        }
    }

    /// Coerce an actor key into a query parameter of this shape.
    pub fn param(&self, key: &ActorKey) -> Option<Param> {
        match self {
            KeyShape::Uuid => key.as_uuid().map(Param::Uuid),
            KeyShape::Integer => key.as_integer().map(Param::Integer),
            KeyShape::String => Some(Param::String(key.as_string())),
        }
    }
}

impl<R: 'static> Selector<R> {
    pub fn of(property: &Property<R>) -> Self {
        Self {
            name: property.name(),
            read: property.reader(),
        }
    }
}

impl<R> Clone for Selector<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            read: self.read.clone(),
        }
    }
}

impl<R> fmt::Debug for Selector<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.name).finish()
    }
}

impl<R: Record> TokenConfig<R> {
    pub fn of(property: &Property<R>) -> Self {
        let read = property.reader();

        Self {
            property: property.name(),
            kind: property.kind(),
            type_name: property.type_name(),
            getter: Arc::new(move |record: &R| read(record).render()),
            converter: Arc::new(|value: &Value<'_>| value.render()),
        }
    }
}

impl<R> fmt::Debug for TokenConfig<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("property", &self.property)
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl<Sess: Session, S: ActorState> StorageOptions<Sess, S> {
    pub fn new() -> Self {
        Self {
            key_property: None,
            key_ext_property: None,
            token_property: None,
            persistence_check_property: None,
            use_token: false,
            precompile: true,
            query_source: None,
            read_state: None,
            is_persisted: None,
            set_entity: None,
            get_entity: None,
        }
    }

    /// Property holding the record's key.
    pub fn use_key(mut self, property: impl Into<String>) -> Self {
        self.key_property = Some(property.into());
        self
    }

    /// Property holding the key extension of compound keys.
    pub fn use_key_ext(mut self, property: impl Into<String>) -> Self {
        self.key_ext_property = Some(property.into());
        self
    }

    /// Require optimistic concurrency checks; setup fails when the record
    /// has no concurrency-token property.
    pub fn use_token(mut self) -> Self {
        self.use_token = true;
        self
    }

    pub fn use_token_property(mut self, property: impl Into<String>) -> Self {
        self.token_property = Some(property.into());
        self.use_token = true;
        self
    }

    /// Property inspected to decide between insert and update.
    pub fn check_persistence_on(mut self, property: impl Into<String>) -> Self {
        self.persistence_check_property = Some(property.into());
        self
    }

    pub fn precompile_read_query(mut self, value: bool) -> Self {
        self.precompile = value;
        self
    }

    /// Restrict lookups to a subset of the table.
    pub fn use_query(mut self, source: RecordSource<S::Record>) -> Self {
        self.query_source = Some(source);
        self
    }

    /// Replace the key lookup entirely.
    pub fn configure_read_state<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a mut Sess,
                &'a ActorIdentity,
            ) -> BoxFuture<'a, StorageResult<Option<S::Record>>>
            + Send
            + Sync
            + 'static,
    {
        self.read_state = Some(read_state_fn(f));
        self
    }

    pub fn configure_is_persisted<F>(mut self, f: F) -> Self
    where
        F: Fn(&S::Record) -> bool + Send + Sync + 'static,
    {
        self.is_persisted = Some(Arc::new(f));
        self
    }

    pub fn configure_set_entity<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut StateContainer<S>, S::Record) -> Result<(), ConfigError> + Send + Sync + 'static,
    {
        self.set_entity = Some(Arc::new(f));
        self
    }

    pub fn configure_get_entity<F>(mut self, f: F) -> Self
    where
        F: Fn(&StateContainer<S>) -> Option<S::Record> + Send + Sync + 'static,
    {
        self.get_entity = Some(Arc::new(f));
        self
    }

    pub fn key_property(&self) -> Option<&str> {
        self.key_property.as_deref()
    }

    pub fn key_ext_property(&self) -> Option<&str> {
        self.key_ext_property.as_deref()
    }

    pub fn persistence_check_property(&self) -> Option<&str> {
        self.persistence_check_property.as_deref()
    }
}

impl<Sess: Session, S: ActorState> Default for StorageOptions<Sess, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Sess: Session, S: ActorState> ConfiguredOptions<Sess, S> {
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// Resolved key property; `None` when a custom read function replaced the lookup.
    pub fn key_property(&self) -> Option<&'static str> {
        self.key_selector.as_ref().map(|s| s.name)
    }

    pub fn key_ext_property(&self) -> Option<&'static str> {
        self.key_ext_selector.as_ref().map(|s| s.name)
    }

    pub fn key_selector(&self) -> Option<&Selector<S::Record>> {
        self.key_selector.as_ref()
    }

    pub fn key_ext_selector(&self) -> Option<&Selector<S::Record>> {
        self.key_ext_selector.as_ref()
    }

    pub fn key_shape(&self) -> Option<KeyShape> {
        self.key_shape
    }

    pub fn is_precompiled(&self) -> bool {
        self.precompiled
    }

    pub fn checks_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&TokenConfig<S::Record>> {
        self.token.as_ref()
    }

    pub(crate) fn token_of(&self, record: &S::Record) -> Option<String> {
        self.token.as_ref().and_then(|t| (t.getter)(record))
    }
}

impl<Sess: Session, S: ActorState> fmt::Debug for ConfiguredOptions<Sess, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredOptions")
            .field("state_name", &self.state_name)
            .field("key_selector", &self.key_selector)
            .field("key_ext_selector", &self.key_ext_selector)
            .field("key_shape", &self.key_shape)
            .field("precompiled", &self.precompiled)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_param_coercion() {
        let u = uuid::Uuid::new_v4();

        assert_eq!(KeyShape::Uuid.param(&ActorKey::Uuid(u)), Some(Param::Uuid(u)));
        assert_eq!(KeyShape::Uuid.param(&ActorKey::Integer(1)), None);
        assert_eq!(
            KeyShape::Integer.param(&ActorKey::String("12".into())),
            Some(Param::Integer(12))
        );
        assert_eq!(
            KeyShape::String.param(&ActorKey::Integer(12)),
            Some(Param::String("12".into()))
        );
    }
}
