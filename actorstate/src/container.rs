use serde::{Deserialize, Serialize};

/// Caller-owned holder of an actor's state, mutated by read, write and clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateContainer<S> {
    pub state: S,
    /// Whether a backing record was found or written.
    pub exists: bool,
    /// Canonical form of the record's concurrency token.
    pub token: Option<String>,
}

impl<S> StateContainer<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            exists: false,
            token: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.exists = false;
        self.token = None;
    }
}
