//! Storage conventions.
//!
//! A convention turns a record model into the functions a storage engine
//! runs: key selectors, the key lookup, the persisted check and the
//! concurrency-token accessors. Every step is a default method of
//! [`StorageConvention`] so a custom convention can replace any one of them.
//! Discovery happens once, when options are configured; the functions it
//! returns never look anything up by name.

use std::{
    any::{Any, TypeId, type_name},
    sync::{Arc, OnceLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    container::StateContainer,
    errors::{ConfigError, StorageResult},
    identity::ActorIdentity,
    options::{
        GetEntityFn, IsPersistedFn, KeyShape, ReadStateFn, Selector, SetEntityFn, StorageOptions,
        TokenConfig, read_state_fn,
    },
    query::{Filter, Param, Predicate, RecordSource},
    record::{Property, PropertyKind, Record},
    resolver::ActorState,
    session::{Database, Session},
    trace,
};

/// Property names conventions fall back on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConventionOptions {
    pub default_key_property: String,
    pub default_key_ext_property: String,
    pub default_persistence_check_property: String,
}

/// Key selectors resolved for a record type.
#[derive(Debug)]
pub struct KeySelectors<R> {
    pub shape: KeyShape,
    pub key: Selector<R>,
    pub key_ext: Option<Selector<R>>,
    /// Extension property the lookup asked for, named in errors when absent.
    pub expected_key_ext: String,
}

pub trait StorageConvention: Send + Sync + 'static {
    fn options(&self) -> &ConventionOptions;

    /// The records lookups run against when no query source was supplied.
    fn query_source<D: Database, R: Record>(&self, db: &D) -> Result<RecordSource<R>, ConfigError> {
        default_query_source::<D, R>(db)
    }

    fn key_selectors<Sess: Session, S: ActorState>(
        &self,
        options: &StorageOptions<Sess, S>,
    ) -> Result<KeySelectors<S::Record>, ConfigError> {
        default_key_selectors(self.options(), options)
    }

    /// Lookup whose predicate closure is built on first need.
    fn read_state<Sess: Session, R: Record>(
        &self,
        source: RecordSource<R>,
        selectors: &KeySelectors<R>,
    ) -> Result<ReadStateFn<Sess, R>, ConfigError> {
        Ok(keyed_read_state(KeyedLookup::ad_hoc(source, selectors)))
    }

    /// Lookup compiled once through the session's query compiler.
    fn precompiled_read_state<Sess: Session, R: Record>(
        &self,
        source: RecordSource<R>,
        selectors: &KeySelectors<R>,
    ) -> Result<ReadStateFn<Sess, R>, ConfigError> {
        Ok(keyed_read_state(KeyedLookup::precompiled(source, selectors)?))
    }

    fn is_persisted<R: Record>(&self, property: Option<&str>) -> Result<IsPersistedFn<R>, ConfigError> {
        default_is_persisted(property.unwrap_or(&self.options().default_persistence_check_property))
    }

    /// Token handling for an explicitly named property.
    fn token<R: Record>(&self, property: &str) -> Result<TokenConfig<R>, ConfigError> {
        named_token::<R>(property)
    }

    /// First concurrency-checked property of the record. Failing to find one
    /// is an error only when `required`.
    fn discover_token<D: Database, R: Record>(
        &self,
        db: &D,
        required: bool,
    ) -> Result<Option<TokenConfig<R>>, ConfigError> {
        discover_token::<D, R>(db, required)
    }

    fn set_entity<S: ActorState>(&self) -> Result<SetEntityFn<S, S::Record>, ConfigError> {
        default_set_entity::<S>()
    }

    fn get_entity<S: ActorState>(&self) -> Result<GetEntityFn<S, S::Record>, ConfigError> {
        default_get_entity::<S>()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultConvention {
    options: ConventionOptions,
}

/// A single lookup, run with one parameter per predicate term.
pub enum Lookup<Sess: Session, R: Record> {
    AdHoc {
        source: RecordSource<R>,
        selectors: Vec<Selector<R>>,
        filter: OnceLock<Filter<R>>,
    },
    Precompiled(Sess::Compiled<R>),
}

/// Simple and compound lookups for a key shape.
pub struct KeyedLookup<Sess: Session, R: Record> {
    shape: KeyShape,
    simple: Lookup<Sess, R>,
    compound: Option<Lookup<Sess, R>>,
    expected_key_ext: String,
}

// Implementations

impl Default for ConventionOptions {
    fn default() -> Self {
        Self {
            default_key_property: "id".to_string(),
            default_key_ext_property: "key_ext".to_string(),
            default_persistence_check_property: "id".to_string(),
        }
    }
}

impl DefaultConvention {
    pub fn new(options: ConventionOptions) -> Self {
        Self { options }
    }
}

impl StorageConvention for DefaultConvention {
    fn options(&self) -> &ConventionOptions {
        &self.options
    }
}

impl<Sess: Session, R: Record> Lookup<Sess, R> {
    pub fn ad_hoc(source: RecordSource<R>, selectors: Vec<Selector<R>>) -> Self {
        Lookup::AdHoc {
            source,
            selectors,
            filter: OnceLock::new(),
        }
    }

    pub fn precompiled(source: &RecordSource<R>, predicate: &Predicate) -> Result<Self, ConfigError> {
        Sess::compile(source, predicate)
            .map(Lookup::Precompiled)
            .map_err(|e| {
                ConfigError::new(format!(
                    "Could not compile lookup \"{predicate}\" for \"{}\": {e}",
                    type_name::<R>()
                ))
            })
    }

    pub async fn run(&self, session: &mut Sess, params: &[Param]) -> StorageResult<Option<R>> {
        match self {
            Lookup::AdHoc {
                source,
                selectors,
                filter,
            } => {
                let filter = filter.get_or_init(|| {
                    trace!("Building lookup filter for {}", type_name::<R>());
                    selector_filter(selectors.clone())
                });
                Ok(session.single_or_none(source, filter, params).await?)
            }
            Lookup::Precompiled(query) => Ok(session.execute(query, params).await?),
        }
    }
}

impl<Sess: Session, R: Record> KeyedLookup<Sess, R> {
    pub fn ad_hoc(source: RecordSource<R>, selectors: &KeySelectors<R>) -> Self {
        let compound = selectors.key_ext.as_ref().map(|ext| {
            Lookup::ad_hoc(source.clone(), vec![selectors.key.clone(), ext.clone()])
        });

        Self {
            shape: selectors.shape,
            simple: Lookup::ad_hoc(source, vec![selectors.key.clone()]),
            compound,
            expected_key_ext: selectors.expected_key_ext.clone(),
        }
    }

    pub fn precompiled(source: RecordSource<R>, selectors: &KeySelectors<R>) -> Result<Self, ConfigError> {
        let simple = Lookup::precompiled(&source, &Predicate::key(selectors.key.name))?;
        let compound = selectors
            .key_ext
            .as_ref()
            .map(|ext| Lookup::precompiled(&source, &Predicate::compound(selectors.key.name, ext.name)))
            .transpose()?;

        Ok(Self {
            shape: selectors.shape,
            simple,
            compound,
            expected_key_ext: selectors.expected_key_ext.clone(),
        })
    }

    /// Find the record addressed by `identity`. A key that does not fit the
    /// record's key shape addresses nothing.
    pub async fn find(&self, session: &mut Sess, identity: &ActorIdentity) -> StorageResult<Option<R>> {
        let Some(key) = self.shape.param(&identity.key) else {
            trace!("Key of {identity} does not fit {:?} keys of {}", self.shape, type_name::<R>());
            return Ok(None);
        };

        match identity.key_ext() {
            Some(ext) => {
                let Some(compound) = &self.compound else {
                    return Err(ConfigError::new(format!(
                        "Key extension property must be configured for compound keys: \
                         \"{}\" has no \"{}\" property (reading {identity})",
                        type_name::<R>(),
                        self.expected_key_ext,
                    ))
                    .into());
                };

                compound.run(session, &[key, Param::String(ext.to_string())]).await
            }
            None => self.simple.run(session, &[key]).await,
        }
    }
}

/// Public readable property of `R`, or a configuration error naming it.
pub fn find_property<R: Record>(name: &str) -> Result<&'static Property<R>, ConfigError> {
    let property = R::model().property(name).ok_or_else(|| {
        ConfigError::new(format!(
            "Could not find \"{name}\" property on type \"{}\". \
             Either configure the state lookup manually or update your model.",
            type_name::<R>()
        ))
    })?;

    if !property.is_readable() {
        return Err(ConfigError::new(format!(
            "The property \"{name}\" of type \"{}\" must be publicly readable.",
            type_name::<R>()
        )));
    }

    Ok(property)
}

pub fn default_query_source<D: Database, R: Record>(db: &D) -> Result<RecordSource<R>, ConfigError> {
    if !db.has_table::<R>() {
        return Err(ConfigError::new(format!(
            "Could not find a table of \"{}\" in database \"{}\"",
            type_name::<R>(),
            type_name::<D>()
        )));
    }

    Ok(RecordSource::Table)
}

pub fn default_key_selectors<Sess: Session, S: ActorState>(
    defaults: &ConventionOptions,
    options: &StorageOptions<Sess, S>,
) -> Result<KeySelectors<S::Record>, ConfigError> {
    let record = type_name::<S::Record>();

    let key_name = options
        .key_property()
        .unwrap_or(&defaults.default_key_property);
    let key = find_property::<S::Record>(key_name)?;

    let shape = KeyShape::of(key).ok_or_else(|| {
        ConfigError::new(format!(
            "Unsupported key type \"{}\" for {record}.{}.",
            key.type_name(),
            key.name()
        ))
    })?;

    // The conventional extension only applies when the record has it
    let key_ext_name = match options.key_ext_property() {
        Some(name) => Some(name),
        None => S::Record::model()
            .property(&defaults.default_key_ext_property)
            .map(|_| defaults.default_key_ext_property.as_str()),
    };

    let key_ext = match key_ext_name.filter(|name| !name.trim().is_empty()) {
        Some(name) => {
            let property = find_property::<S::Record>(name)?;

            if property.kind() != PropertyKind::String {
                return Err(ConfigError::new(format!(
                    "Can not use property \"{name}\" on record type \"{record}\". \
                     Key extension property must be of type string."
                )));
            }

            Some(Selector::of(property))
        }
        None => None,
    };

    Ok(KeySelectors {
        shape,
        key: Selector::of(key),
        key_ext,
        expected_key_ext: key_ext_name
            .unwrap_or(&defaults.default_key_ext_property)
            .to_string(),
    })
}

pub fn default_is_persisted<R: Record>(property: &str) -> Result<IsPersistedFn<R>, ConfigError> {
    let read = find_property::<R>(property)?.reader();

    Ok(Arc::new(move |record: &R| !read(record).is_default()))
}

pub fn named_token<R: Record>(property: &str) -> Result<TokenConfig<R>, ConfigError> {
    let found = R::model().property(property).ok_or_else(|| {
        ConfigError::new(format!(
            "Property {property} on model {} not found.",
            type_name::<R>()
        ))
    })?;

    if !found.is_concurrency_token() {
        return Err(ConfigError::new(format!(
            "Property {property} is not a concurrency token."
        )));
    }

    Ok(TokenConfig::of(found))
}

pub fn discover_token<D: Database, R: Record>(
    db: &D,
    required: bool,
) -> Result<Option<TokenConfig<R>>, ConfigError> {
    if !db.has_table::<R>() {
        return Ok(None);
    }

    match R::model().concurrency_tokens().next() {
        Some(property) => Ok(Some(TokenConfig::of(property))),
        None if required => Err(ConfigError::new(format!(
            "Could not find a valid concurrency token property on type \"{}\".",
            type_name::<R>()
        ))),
        None => Ok(None),
    }
}

/// Moves the record into the state. Only states that are their own record
/// qualify; wrapper states need explicit accessors.
pub fn default_set_entity<S: ActorState>() -> Result<SetEntityFn<S, S::Record>, ConfigError> {
    ensure_record_state::<S>()?;

    Ok(Arc::new(|container: &mut StateContainer<S>, record: S::Record| {
        match (&mut container.state as &mut dyn Any).downcast_mut::<S::Record>() {
            Some(state) => {
                *state = record;
                Ok(())
            }
            None => Err(not_assignable::<S>()),
        }
    }))
}

pub fn default_get_entity<S: ActorState>() -> Result<GetEntityFn<S, S::Record>, ConfigError> {
    ensure_record_state::<S>()?;

    Ok(Arc::new(|container: &StateContainer<S>| {
        (&container.state as &dyn Any)
            .downcast_ref::<S::Record>()
            .cloned()
    }))
}

fn ensure_record_state<S: ActorState>() -> Result<(), ConfigError> {
    if TypeId::of::<S>() == TypeId::of::<S::Record>() {
        Ok(())
    } else {
        Err(not_assignable::<S>())
    }
}

fn not_assignable<S: ActorState>() -> ConfigError {
    ConfigError::new(format!(
        "State type \"{}\" is not assignable from \"{}\". \
         Configure its get-entity and set-entity functions.",
        type_name::<S>(),
        type_name::<S::Record>()
    ))
}

fn keyed_read_state<Sess: Session, R: Record>(lookup: KeyedLookup<Sess, R>) -> ReadStateFn<Sess, R> {
    let lookup = Arc::new(lookup);

    read_state_fn(move |session, identity| {
        let lookup = lookup.clone();
        Box::pin(async move { lookup.find(session, identity).await })
    })
}

fn selector_filter<R: Record>(selectors: Vec<Selector<R>>) -> Filter<R> {
    Arc::new(move |record: &R, params: &[Param]| {
        selectors.iter().enumerate().all(|(idx, selector)| {
            params
                .get(idx)
                .is_some_and(|param| param.matches(&(selector.read)(record)))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_options_defaults() {
        let options: ConventionOptions = serde_json::from_str("{}").unwrap();

        assert_eq!(options, ConventionOptions::default());
        assert_eq!(options.default_key_property, "id");
        assert_eq!(options.default_key_ext_property, "key_ext");

        let options: ConventionOptions =
            serde_json::from_str(r#"{ "default_key_property": "actor_id" }"#).unwrap();
        assert_eq!(options.default_key_property, "actor_id");
        assert_eq!(options.default_persistence_check_property, "id");
    }
}
