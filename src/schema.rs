//! Payload shape validation.
//!
//! The engine does not know the shape of any method's params or result. It
//! consumes an abstract [`Schema`]: "parse a value against a shape, return
//! the (possibly normalized) value or a structured list of violations".
//!
//! Two adapters ship with the crate:
//!
//! - [`AnyValue`] accepts every value unchanged.
//! - [`Typed<T>`] accepts whatever `serde` can deserialize into `T`, and
//!   returns the value re-serialized from `T`.
//!
//! Any `Fn(&Value) -> Result<Value, Violations>` closure is also a schema, so
//! an external validation layer can be plugged in without a wrapper type.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Location of the offending value, e.g. `params.message`. Empty for the root.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Every violated constraint found while validating one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(Violation::new(path, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// Structured summary placed in an error response's `data`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }

    /// `Ok(value)` when nothing was violated.
    pub fn into_result<T>(self, value: T) -> Result<T, Violations> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<Vec<Violation>> for Violations {
    fn from(value: Vec<Violation>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Shape contract consumed by the dispatcher and the client.
pub trait Schema: Send + Sync {
    /// Validate `value`, returning the value to hand on or every violation.
    fn parse(&self, value: &Value) -> Result<Value, Violations>;
}

/// Shared schema pointer.
pub type SchemaPtr = Arc<dyn Schema>;

impl<F> Schema for F
where
    F: Fn(&Value) -> Result<Value, Violations> + Send + Sync,
{
    fn parse(&self, value: &Value) -> Result<Value, Violations> {
        self(value)
    }
}

/// Accepts any value, including `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValue;

impl Schema for AnyValue {
    fn parse(&self, value: &Value) -> Result<Value, Violations> {
        Ok(value.clone())
    }
}

/// Schema derived from a serde type.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize,
{
    fn parse(&self, value: &Value) -> Result<Value, Violations> {
        // ---
        let typed: T = T::deserialize(value).map_err(|err| {
            Violations::from(vec![Violation::new("", err.to_string())])
        })?;

        serde_json::to_value(&typed)
            .map_err(|err| Violations::from(vec![Violation::new("", err.to_string())]))
    }
}

/// Params and result shapes of one method.
///
/// Shared by the dispatcher (which validates params before invoking the
/// handler and the handler's result afterwards) and the client (which
/// validates params before sending and the result after matching).
#[derive(Clone)]
pub struct MethodContract {
    pub name: Arc<str>,
    pub params: SchemaPtr,
    pub result: SchemaPtr,
}

impl MethodContract {
    /// Contract accepting any params and any result.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Arc::new(AnyValue),
            result: Arc::new(AnyValue),
        }
    }

    /// Contract whose shapes are the serde types `P` and `R`.
    pub fn typed<P, R>(name: impl Into<Arc<str>>) -> Self
    where
        P: DeserializeOwned + Serialize + 'static,
        R: DeserializeOwned + Serialize + 'static,
    {
        Self {
            name: name.into(),
            params: Arc::new(Typed::<P>::new()),
            result: Arc::new(Typed::<R>::new()),
        }
    }

    pub fn with_params(mut self, schema: impl Schema + 'static) -> Self {
        self.params = Arc::new(schema);
        self
    }

    pub fn with_result(mut self, schema: impl Schema + 'static) -> Self {
        self.result = Arc::new(schema);
        self
    }
}

impl fmt::Debug for MethodContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodContract")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
