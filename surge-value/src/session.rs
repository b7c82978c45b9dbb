use std::sync::Arc;
use std::time::SystemTime;

use crate::{Value, ValueKind};

type SessionMap = ahash::AHashMap<Arc<str>, Value>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("session key `{0}` is not set")]
    Missing(String),

    #[error("session key `{key}` holds a {found} value, expected {expected}")]
    WrongKind {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("session key `{key}` already holds a {existing} value, refusing to store a {new}")]
    KindChanged {
        key: String,
        existing: ValueKind,
        new: ValueKind,
    },
}

/// Per-virtual-user state.
///
/// Updates are functional: `set` consumes the session and returns the updated one. The map is
/// shared between clones and only copied when a shared session is modified, so handing a
/// snapshot to a transform step is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    values: Arc<SessionMap>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        self
    }

    /// Like [`Session::set`], but keeps the kind of an existing key stable.
    pub fn try_set(
        self,
        key: impl Into<Arc<str>>,
        value: impl Into<Value>,
    ) -> Result<Self, SessionError> {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.values.get(&key)
            && existing.kind() != value.kind()
        {
            return Err(SessionError::KindChanged {
                key: key.to_string(),
                existing: existing.kind(),
                new: value.kind(),
            });
        }
        Ok(self.set(key, value))
    }

    #[must_use]
    pub fn remove(mut self, key: &str) -> Self {
        if self.values.contains_key(key) {
            Arc::make_mut(&mut self.values).remove(key);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, SessionError> {
        match self.require(key)? {
            Value::String(v) => Ok(v),
            other => Err(wrong_kind(key, ValueKind::String, other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, SessionError> {
        match self.require(key)? {
            Value::Int(v) => Ok(*v),
            other => Err(wrong_kind(key, ValueKind::Int, other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, SessionError> {
        match self.require(key)? {
            Value::Bool(v) => Ok(*v),
            other => Err(wrong_kind(key, ValueKind::Bool, other)),
        }
    }

    pub fn get_timestamp(&self, key: &str) -> Result<SystemTime, SessionError> {
        match self.require(key)? {
            Value::Timestamp(v) => Ok(*v),
            other => Err(wrong_kind(key, ValueKind::Timestamp, other)),
        }
    }

    fn require(&self, key: &str) -> Result<&Value, SessionError> {
        self.values
            .get(key)
            .ok_or_else(|| SessionError::Missing(key.to_string()))
    }
}

fn wrong_kind(key: &str, expected: ValueKind, found: &Value) -> SessionError {
    SessionError::WrongKind {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}
