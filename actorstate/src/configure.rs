use std::{any::type_name, sync::Arc};

use crate::{
    convention::StorageConvention,
    debug,
    errors::ConfigError,
    options::{ConfiguredOptions, StorageOptions},
    resolver::ActorState,
    session::Database,
};

/// Merge explicit options with the convention's defaults, validate them and
/// freeze the result.
pub fn post_configure<D, C, S>(
    db: &D,
    convention: &C,
    state_name: &str,
    mut options: StorageOptions<D::Session, S>,
) -> Result<Arc<ConfiguredOptions<D::Session, S>>, ConfigError>
where
    D: Database,
    C: StorageConvention,
    S: ActorState,
{
    let is_persisted = match options.is_persisted.take() {
        Some(f) => f,
        None => convention.is_persisted::<S::Record>(options.persistence_check_property())?,
    };

    let mut token = None;
    if options.use_token {
        if let Some(name) = options.token_property.as_deref().filter(|n| !n.trim().is_empty()) {
            token = Some(convention.token::<S::Record>(name)?);
        }
    }

    let mut key_selector = None;
    let mut key_ext_selector = None;
    let mut key_shape = None;

    let read_state = match options.read_state.take() {
        Some(f) => f,
        None => {
            let source = match options.query_source.take() {
                Some(source) => source,
                None => convention.query_source::<D, S::Record>(db)?,
            };

            let selectors = convention.key_selectors(&options)?;

            let read = if options.precompile {
                convention.precompiled_read_state::<D::Session, S::Record>(source, &selectors)?
            } else {
                convention.read_state::<D::Session, S::Record>(source, &selectors)?
            };

            key_shape = Some(selectors.shape);
            key_selector = Some(selectors.key);
            key_ext_selector = selectors.key_ext;

            read
        }
    };

    let set_entity = match options.set_entity.take() {
        Some(f) => f,
        None => convention
            .set_entity::<S>()
            .map_err(|e| for_state::<S>(state_name, e))?,
    };
    let get_entity = match options.get_entity.take() {
        Some(f) => f,
        None => convention
            .get_entity::<S>()
            .map_err(|e| for_state::<S>(state_name, e))?,
    };

    if token.is_none() {
        token = convention.discover_token::<D, S::Record>(db, options.use_token)?;
    }

    // Requested checks without a token to check
    if options.use_token && token.is_none() {
        return Err(ConfigError::new(format!(
            "Storage options for state \"{state_name}\" ({}) are missing a concurrency token getter",
            type_name::<S>()
        )));
    }

    let configured = ConfiguredOptions {
        state_name: state_name.to_string(),
        key_selector,
        key_ext_selector,
        key_shape,
        precompiled: options.precompile,
        read_state,
        is_persisted,
        set_entity,
        get_entity,
        token,
    };

    debug!(
        "Configured storage for state {state_name}: {:?}",
        configured
    );

    Ok(Arc::new(configured))
}

fn for_state<S: ActorState>(state_name: &str, err: ConfigError) -> ConfigError {
    ConfigError::new(format!(
        "Storage options for state \"{state_name}\" ({}) are invalid: {err}",
        type_name::<S>()
    ))
}
