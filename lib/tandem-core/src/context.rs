//! Request-scoped context.

use serde::Serialize;
use serde_json::{Map, Value};

/// Per-request key/value store shared by middleware and handlers.
///
/// Values are JSON so that principals, flags and small records can travel
/// along the chain without a type registry. A context lives exactly as long
/// as the request that owns it.
///
/// # Example
///
/// ```
/// use tandem_core::Context;
/// use serde_json::json;
///
/// let mut context = Context::new();
/// context.insert("user", json!({"id": "admin", "role": "admin"}));
///
/// assert_eq!(context.lookup("user.role"), Some(&json!("admin")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: Map<String, Value>,
}

impl Context {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Follow a dotted path (`user.role`) through nested objects.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.values.get(first)?, |value, segment| {
            value.as_object()?.get(segment)
        })
    }

    /// Store a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Serialize and store any value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn insert_serialized<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Whether `key` is set.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Whether the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the stored entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
