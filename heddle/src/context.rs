//! Run context: a thread-safe key/value store shared by the engine and handlers.
//!
//! The engine mirrors graph attributes into `graph.*` keys and maintains the
//! live keys `current_node`, `outcome`, and `preferred_label`. Handlers read
//! the context but publish changes through `Outcome::context_updates`; the
//! engine applies them between stages, so there is a single writer per run.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Process-local key/value store with snapshot semantics.
///
/// Cloning is cheap and shares the underlying map. Snapshots are deep copies
/// suitable for checkpoints and event payloads.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded with the given values.
    pub fn with_values(values: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().get(key).cloned()
    }

    /// Returns the value for `key` rendered as a plain string.
    ///
    /// Strings come back verbatim; booleans and numbers in their canonical
    /// textual form; null and missing keys as `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.inner.read().get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Sets a single key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().insert(key.into(), value.into());
    }

    /// Merges a batch of updates into the context.
    pub fn apply_updates(&self, updates: &HashMap<String, Value>) {
        let mut guard = self.inner.write();
        for (k, v) in updates {
            guard.insert(k.clone(), v.clone());
        }
    }

    /// Returns a deep copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().clone()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.inner.read().len())
            .finish()
    }
}
