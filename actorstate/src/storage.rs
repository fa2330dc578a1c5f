//! Per-state storage engine.

use std::{any::type_name, fmt, sync::Arc};

use crate::{
    container::StateContainer,
    debug,
    entry::{EntryConfigurator, SaveEntryContext},
    errors::{ConfigError, InconsistentState, StorageResult},
    identity::ActorIdentity,
    options::ConfiguredOptions,
    resolver::ActorState,
    session::{ConcurrencyConflict, Database, Entry, EntryState, Session, SessionError},
    trace,
};

/// Reads, writes and clears one state type using its configured options.
///
/// Every operation opens its own session and drops it before returning.
pub struct StateStorage<D: Database, S: ActorState, E> {
    db: Arc<D>,
    entries: Arc<E>,
    options: Arc<ConfiguredOptions<D::Session, S>>,
}

impl<D, S, E> StateStorage<D, S, E>
where
    D: Database,
    S: ActorState,
    E: EntryConfigurator,
{
    pub fn new(db: Arc<D>, entries: Arc<E>, options: Arc<ConfiguredOptions<D::Session, S>>) -> Self {
        Self {
            db,
            entries,
            options,
        }
    }

    pub fn options(&self) -> &ConfiguredOptions<D::Session, S> {
        &self.options
    }

    /// Load the record addressed by `identity` into `container`. A missing
    /// record is not an error; it leaves `exists` false.
    pub async fn read_state(
        &self,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        let mut session = self.db.open().await?;

        let record = (self.options.read_state)(&mut session, identity).await?;

        match record {
            Some(record) => {
                let token = self.options.token_of(&record);

                (self.options.set_entity)(container, record)?;

                container.exists = true;
                if self.options.checks_token() {
                    container.token = token;
                }
            }
            None => container.exists = false,
        }

        trace!(
            "Read {identity} for state {}: exists {}",
            self.options.state_name(),
            container.exists
        );

        Ok(())
    }

    /// Save the container's record, updating it when persisted and inserting
    /// it otherwise.
    pub async fn write_state(
        &self,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        self.save(identity, container, None::<fn(&mut Entry<S::Record>)>)
            .await
    }

    /// Save the container's record with the disposition chosen by `configure`,
    /// bypassing the persisted check and the entry configurator.
    pub async fn write_state_with<F>(
        &self,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
        configure: F,
    ) -> StorageResult<()>
    where
        F: FnOnce(&mut Entry<S::Record>) + Send,
    {
        self.save(identity, container, Some(configure)).await
    }

    /// Delete the container's record, if it holds one. The container is reset
    /// either way.
    pub async fn clear_state(
        &self,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
    ) -> StorageResult<()> {
        let record = (self.options.get_entity)(container);

        let mut session = self.db.open().await?;

        if let Some(record) = record {
            session.track(Entry {
                record,
                state: EntryState::Deleted,
            });
            session.commit().await?;

            debug!("Cleared {identity} for state {}", self.options.state_name());
        }

        container.reset();

        Ok(())
    }

    async fn save<F>(
        &self,
        identity: &ActorIdentity,
        container: &mut StateContainer<S>,
        configure: Option<F>,
    ) -> StorageResult<()>
    where
        F: FnOnce(&mut Entry<S::Record>) + Send,
    {
        let record = (self.options.get_entity)(container).ok_or_else(|| {
            ConfigError::new(format!(
                "State \"{}\" of type \"{}\" does not hold a \"{}\" record",
                self.options.state_name(),
                type_name::<S>(),
                type_name::<S::Record>()
            ))
        })?;

        let mut session = self.db.open().await?;

        let mut entry = Entry::new(record);
        match configure {
            Some(configure) => configure(&mut entry),
            None => {
                let is_persisted = (self.options.is_persisted)(&entry.record);
                self.entries.configure_save_entry(SaveEntryContext {
                    entry: &mut entry,
                    is_persisted,
                });
            }
        }

        trace!("Saving {identity} as {:?}", entry.state);

        let key = session.track(entry);

        match session.commit().await {
            Ok(()) => {
                // Pick up store-generated values such as a new key or row version
                if let Some(saved) = session.tracked::<S::Record>(key) {
                    let token = self.options.token_of(&saved);

                    (self.options.set_entity)(container, saved)?;

                    if self.options.checks_token() {
                        container.token = token;
                    }
                }

                container.exists = true;

                Ok(())
            }
            Err(SessionError::Concurrency(conflict)) => {
                debug!(
                    "Concurrency conflict writing {identity} for state {}: {conflict}",
                    self.options.state_name()
                );

                Err(self.inconsistent(conflict, container.token.clone()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn inconsistent(&self, conflict: ConcurrencyConflict, current: Option<String>) -> InconsistentState {
        let Some(token) = self.options.token() else {
            return InconsistentState::raw(conflict);
        };

        let stored = conflict
            .entries
            .first()
            .and_then(|entry| entry.stored_value(token.property))
            .and_then(|value| (token.converter)(value));

        InconsistentState::with_tokens(conflict, stored, current)
    }
}

impl<D: Database, S: ActorState, E> fmt::Debug for StateStorage<D, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStorage")
            .field("database", &type_name::<D>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
