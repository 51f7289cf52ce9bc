use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request identifier used to match responses to calls.
///
/// Either a string or an integer; never boolean, null or structured.
/// Ids are carried *in-band* inside the message and are opaque to every
/// transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

/// Source of request ids for outgoing calls.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> RequestId;
}

/// Shared id generator pointer.
pub type IdGeneratorPtr = Arc<dyn IdGenerator>;

/// Monotonically increasing integer ids, starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> RequestId {
        RequestId::Number(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// UUID v4 string ids, for peers shared by several independent clients.
///
/// Standard format: `550e8400-e29b-41d4-a9b6-446655440000`
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> RequestId {
        RequestId::String(Uuid::new_v4().to_string())
    }
}

/// Ids from a caller-supplied factory.
pub struct FnIds<F>(pub F);

impl<F> IdGenerator for FnIds<F>
where
    F: Fn() -> RequestId + Send + Sync,
{
    fn next_id(&self) -> RequestId {
        (self.0)()
    }
}
