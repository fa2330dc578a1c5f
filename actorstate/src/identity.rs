use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of an actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKey {
    Uuid(Uuid),
    Integer(i64),
    String(String),
}

/// Address of a logical actor: its type discriminator, key and optional
/// string extension. A key with an extension forms a compound key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub type_name: String,
    pub key: ActorKey,
    pub ext: Option<String>,
}

// Implementations

impl ActorKey {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            ActorKey::Uuid(u) => Some(*u),
            ActorKey::String(s) => Uuid::parse_str(s).ok(),
            ActorKey::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ActorKey::Integer(i) => Some(*i),
            ActorKey::String(s) => s.parse().ok(),
            ActorKey::Uuid(_) => None,
        }
    }

    /// Any key can address a string-keyed record through its display form.
    pub fn as_string(&self) -> String {
        match self {
            ActorKey::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKey::Uuid(u) => write!(f, "{u}"),
            ActorKey::Integer(i) => write!(f, "{i}"),
            ActorKey::String(s) => f.write_str(s),
        }
    }
}

impl From<Uuid> for ActorKey {
    fn from(value: Uuid) -> Self {
        ActorKey::Uuid(value)
    }
}

impl From<i64> for ActorKey {
    fn from(value: i64) -> Self {
        ActorKey::Integer(value)
    }
}

impl From<String> for ActorKey {
    fn from(value: String) -> Self {
        ActorKey::String(value)
    }
}

impl From<&str> for ActorKey {
    fn from(value: &str) -> Self {
        ActorKey::String(value.to_string())
    }
}

impl ActorIdentity {
    pub fn new(type_name: impl Into<String>, key: impl Into<ActorKey>) -> Self {
        Self {
            type_name: type_name.into(),
            key: key.into(),
            ext: None,
        }
    }

    pub fn with_ext(mut self, ext: impl Into<String>) -> Self {
        self.ext = Some(ext.into());
        self
    }

    /// The key extension, if present and not blank.
    pub fn key_ext(&self) -> Option<&str> {
        self.ext.as_deref().filter(|e| !e.trim().is_empty())
    }

    pub fn has_ext(&self) -> bool {
        self.key_ext().is_some()
    }
}

impl Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_ext() {
            Some(ext) => write!(f, "{}/{}+{ext}", self.type_name, self.key),
            None => write!(f, "{}/{}", self.type_name, self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_coercion() {
        let u = Uuid::new_v4();

        assert_eq!(ActorKey::Uuid(u).as_uuid(), Some(u));
        assert_eq!(ActorKey::String(u.to_string()).as_uuid(), Some(u));
        assert_eq!(ActorKey::Integer(1).as_uuid(), None);

        assert_eq!(ActorKey::String("42".into()).as_integer(), Some(42));
        assert_eq!(ActorKey::String("forty".into()).as_integer(), None);

        assert_eq!(ActorKey::Integer(7).as_string(), "7");
    }

    #[test]
    fn test_blank_extension_is_absent() {
        let id = ActorIdentity::new("counter", 7_i64).with_ext("   ");

        assert!(!id.has_ext());
        assert_eq!(id.to_string(), "counter/7");
        assert_eq!(id.with_ext("a").to_string(), "counter/7+a");
    }

    #[test]
    fn test_identity_serde() {
        let id = ActorIdentity::new("chat", "room-1").with_ext("eu");
        let json = serde_json::to_string(&id).unwrap();
        let back: ActorIdentity = serde_json::from_str(&json).unwrap();

        assert_eq!(back, id);
    }
}
