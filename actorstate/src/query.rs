//! Equality predicates over record properties.

use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::{
    record::{Reader, Record, Value},
    session::SessionError,
};

/// A call-time query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Uuid(Uuid),
    Integer(i64),
    String(String),
}

/// Conjunction of `property == params[index]` terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    terms: Vec<(String, usize)>,
}

pub type Filter<R> = Arc<dyn Fn(&R, &[Param]) -> bool + Send + Sync>;

/// The set of records a lookup runs against.
pub enum RecordSource<R> {
    Table,
    Scoped(Arc<dyn Fn(&R) -> bool + Send + Sync>),
}

// Implementations

impl Param {
    pub fn matches(&self, value: &Value<'_>) -> bool {
        match (self, value) {
            (Param::Uuid(p), Value::Uuid(v)) => p == v,
            (Param::Integer(p), Value::Integer(v)) => p == v,
            (Param::Integer(p), Value::Unsigned(v)) => u64::try_from(*p).is_ok_and(|p| p == *v),
            (Param::String(p), Value::Str(v)) => p == v,
            _ => false,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Uuid(u) => write!(f, "{u}"),
            Param::Integer(i) => write!(f, "{i}"),
            Param::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl Predicate {
    /// `key == params[0]`
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            terms: vec![(key.into(), 0)],
        }
    }

    /// `key == params[0] && ext == params[1]`
    pub fn compound(key: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            terms: vec![(key.into(), 0), (ext.into(), 1)],
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, usize)> {
        self.terms.iter().map(|(name, idx)| (name.as_str(), *idx))
    }

    pub fn arity(&self) -> usize {
        self.terms.iter().map(|(_, idx)| idx + 1).max().unwrap_or(0)
    }

    /// Resolve the readers of every term against `R`'s model.
    pub fn resolve<R: Record>(&self) -> Result<Vec<(Reader<R>, usize)>, SessionError> {
        let model = R::model();

        self.terms
            .iter()
            .map(|(name, idx)| {
                model
                    .property(name)
                    .map(|p| (p.reader(), *idx))
                    .ok_or_else(|| SessionError::UnknownProperty {
                        record: model.name(),
                        property: name.clone(),
                    })
            })
            .collect()
    }

    /// Build an in-memory filter closure for `R`.
    pub fn compile<R: Record>(&self) -> Result<Filter<R>, SessionError> {
        let readers = self.resolve::<R>()?;

        Ok(Arc::new(move |record: &R, params: &[Param]| {
            readers.iter().all(|(read, idx)| {
                params
                    .get(*idx)
                    .is_some_and(|param| param.matches(&read(record)))
            })
        }))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, idx)) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            write!(f, "{name} == ${idx}")?;
        }
        Ok(())
    }
}

impl<R> RecordSource<R> {
    pub fn scoped<F>(filter: F) -> Self
    where
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        RecordSource::Scoped(Arc::new(filter))
    }

    pub fn admits(&self, record: &R) -> bool {
        match self {
            RecordSource::Table => true,
            RecordSource::Scoped(filter) => filter(record),
        }
    }
}

impl<R> Clone for RecordSource<R> {
    fn clone(&self) -> Self {
        match self {
            RecordSource::Table => RecordSource::Table,
            RecordSource::Scoped(filter) => RecordSource::Scoped(filter.clone()),
        }
    }
}

impl<R> Default for RecordSource<R> {
    fn default() -> Self {
        RecordSource::Table
    }
}

impl<R> fmt::Debug for RecordSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::Table => f.write_str("Table"),
            RecordSource::Scoped(_) => f.write_str("Scoped(..)"),
        }
    }
}
