use std::{
    any::{TypeId, type_name},
    fmt::{self, Display},
    sync::{LockResult, PoisonError},
};

/// Static identity of a Rust type, used as a cache key and in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

// Implementations

impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Lock guards are only held for map lookups and inserts, so a poisoned lock
/// still holds consistent data.
pub(crate) fn recover<G>(result: LockResult<G>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::trace!($($arg)*);}
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::debug!($($arg)*);}
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::info!($($arg)*);}
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::warn!($($arg)*);}
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        {#[cfg(feature = "tracing")] tracing::error!($($arg)*);}
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_info_identity() {
        let a = TypeInfo::of::<String>();
        let b = TypeInfo::of::<String>();
        let c = TypeInfo::of::<u64>();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "alloc::string::String");
    }
}
