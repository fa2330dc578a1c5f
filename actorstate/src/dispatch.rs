//! Entry point routing each state to its storage engine.
//!
//! Engines are built on first use of a `(state name, state type)` pair and
//! cached for the lifetime of the [`ActorStorage`]. Construction runs at most
//! once per pair; concurrent first callers wait for the same build.

use std::{
    any::{Any, TypeId, type_name},
    sync::{Arc, RwLock},
};

use rustc_hash::FxHashMap;
use tokio::sync::OnceCell;

use crate::{
    base::recover,
    configure::post_configure,
    container::StateContainer,
    convention::{DefaultConvention, StorageConvention},
    entry::{DefaultEntryConfigurator, EntryConfigurator},
    errors::{ConfigError, StorageResult},
    identity::ActorIdentity,
    info,
    options::{ConfiguredOptions, StorageOptions},
    resolver::{ActorState, resolve_record_type, resolve_state_type},
    session::{Database, Entry},
    storage::StateStorage,
    trace,
};

type CacheKey = (String, TypeId);
type Erased = Arc<dyn Any + Send + Sync>;

pub struct ActorStorage<D, C = DefaultConvention, E = DefaultEntryConfigurator> {
    db: Arc<D>,
    convention: Arc<C>,
    entries: Arc<E>,
    registry: RwLock<FxHashMap<CacheKey, Erased>>,
    storages: RwLock<FxHashMap<CacheKey, Arc<OnceCell<Erased>>>>,
}

// Implementations

impl<D: Database> ActorStorage<D> {
    pub fn new(db: D) -> Self {
        Self::with_parts(db, DefaultConvention::default(), DefaultEntryConfigurator)
    }
}

impl<D: Database, C: StorageConvention> ActorStorage<D, C> {
    pub fn with_convention(db: D, convention: C) -> Self {
        Self::with_parts(db, convention, DefaultEntryConfigurator)
    }
}

impl<D, C, E> ActorStorage<D, C, E>
where
    D: Database,
    C: StorageConvention,
    E: EntryConfigurator,
{
    pub fn with_parts(db: D, convention: C, entries: E) -> Self {
        Self {
            db: Arc::new(db),
            convention: Arc::new(convention),
            entries: Arc::new(entries),
            registry: RwLock::new(FxHashMap::default()),
            storages: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    /// Register explicit options for `S` under `state_name`. The options are
    /// completed with convention defaults and validated immediately.
    pub fn configure<S, F>(&self, state_name: &str, configure: F) -> Result<(), ConfigError>
    where
        S: ActorState,
        F: FnOnce(StorageOptions<D::Session, S>) -> StorageOptions<D::Session, S>,
    {
        let key: CacheKey = (state_name.to_string(), TypeId::of::<S>());

        let options = post_configure(
            self.db.as_ref(),
            self.convention.as_ref(),
            state_name,
            configure(StorageOptions::new()),
        )?;

        // Held until registered, so a concurrent first use either sees these
        // options or makes this call fail
        let storages = recover(self.storages.read());
        if storages.contains_key(&key) {
            return Err(ConfigError::new(format!(
                "Storage for state \"{state_name}\" ({}) is already in use and can not be reconfigured",
                type_name::<S>()
            )));
        }

        recover(self.registry.write()).insert(key, options as Erased);
        drop(storages);

        Ok(())
    }

    /// Register explicit options for `S` under its type name, used for every
    /// state name without options of its own.
    pub fn configure_default<S, F>(&self, configure: F) -> Result<(), ConfigError>
    where
        S: ActorState,
        F: FnOnce(StorageOptions<D::Session, S>) -> StorageOptions<D::Session, S>,
    {
        self.configure::<S, F>(type_name::<S>(), configure)
    }

    /// Engine for `S` under `state_name`, built on first use.
    pub async fn storage<S: ActorState>(
        &self,
        state_name: &str,
    ) -> Result<Arc<StateStorage<D, S, E>>, ConfigError> {
        let key: CacheKey = (state_name.to_string(), TypeId::of::<S>());

        let cell = {
            let existing = recover(self.storages.read()).get(&key).cloned();
            match existing {
                Some(cell) => cell,
                None => recover(self.storages.write()).entry(key).or_default().clone(),
            }
        };

        let storage = cell
            .get_or_try_init(|| async {
                self.create_storage::<S>(state_name)
                    .map(|storage| Arc::new(storage) as Erased)
            })
            .await?;

        storage.clone().downcast::<StateStorage<D, S, E>>().map_err(|_| {
            ConfigError::new(format!(
                "Cached storage for state \"{state_name}\" is not a storage of {}",
                type_name::<S>()
            ))
        })
    }

    pub async fn read_state<S: ActorState>(
        &self,
        state_name: &str,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        let storage = self.storage::<S>(state_name).await?;
        storage.read_state(identity, container).await
    }

    pub async fn write_state<S: ActorState>(
        &self,
        state_name: &str,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        let storage = self.storage::<S>(state_name).await?;
        storage.write_state(identity, container).await
    }

    /// Write with a caller-chosen entry disposition for this call only.
    pub async fn write_state_with<S, F>(
        &self,
        state_name: &str,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
        configure: F,
    ) -> StorageResult<()>
    where
        S: ActorState,
        F: FnOnce(&mut Entry<S::Record>) + Send,
    {
        let storage = self.storage::<S>(state_name).await?;
        storage
            .write_state_with(identity, container, configure)
            .await
    }

    pub async fn clear_state<S: ActorState>(
        &self,
        state_name: &str,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        let storage = self.storage::<S>(state_name).await?;
        storage.clear_state(identity, container).await
    }

    fn create_storage<S: ActorState>(&self, state_name: &str) -> Result<StateStorage<D, S, E>, ConfigError> {
        trace!(
            "Creating storage for state {state_name}: {} persisted as {}",
            resolve_state_type::<S>(),
            resolve_record_type::<S>()
        );

        let options = self.options_for::<S>(state_name)?;

        Ok(StateStorage::new(self.db.clone(), self.entries.clone(), options))
    }

    /// Registered options by state name, then by state type name, then
    /// convention defaults.
    fn options_for<S: ActorState>(
        &self,
        state_name: &str,
    ) -> Result<Arc<ConfiguredOptions<D::Session, S>>, ConfigError> {
        if let Some(options) = self.registered::<S>(state_name) {
            return Ok(options);
        }

        let fallback = type_name::<S>();
        if state_name != fallback {
            if let Some(options) = self.registered::<S>(fallback) {
                return Ok(options);
            }
        }

        let options = post_configure(
            self.db.as_ref(),
            self.convention.as_ref(),
            state_name,
            StorageOptions::new(),
        )?;

        info!(
            "Storage options are not configured for state {state_name} and default options will be used. \
             Register options with ActorStorage::configure if the defaults are not desired."
        );

        Ok(options)
    }

    fn registered<S: ActorState>(&self, state_name: &str) -> Option<Arc<ConfiguredOptions<D::Session, S>>> {
        let key: CacheKey = (state_name.to_string(), TypeId::of::<S>());

        recover(self.registry.read())
            .get(&key)
            .cloned()
            .and_then(|options| options.downcast::<ConfiguredOptions<D::Session, S>>().ok())
    }
}
