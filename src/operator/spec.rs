//! Operator construction descriptor.

use crate::backend::Backend;
use crate::error::{EagerError, Result};
use std::collections::BTreeMap;

/// A descriptor argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Argument {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for Argument {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Argument {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Argument {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<bool> for Argument {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Argument {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Argument {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Types an [`Argument`] can be read as.
pub trait FromArgument: Sized {
    /// Human-readable expectation used in errors.
    const EXPECTED: &'static str;

    fn from_argument(arg: &Argument) -> Option<Self>;
}

impl FromArgument for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArgument for i32 {
    const EXPECTED: &'static str = "a 32-bit integer";

    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Int(v) => Self::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromArgument for usize {
    const EXPECTED: &'static str = "a non-negative integer";

    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Int(v) => Self::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromArgument for f64 {
    const EXPECTED: &'static str = "a number";

    #[allow(clippy::cast_precision_loss)]
    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Float(v) => Some(*v),
            Argument::Int(v) => Some(*v as Self),
            _ => None,
        }
    }
}

impl FromArgument for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromArgument for String {
    const EXPECTED: &'static str = "a string";

    fn from_argument(arg: &Argument) -> Option<Self> {
        match arg {
            Argument::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Describes one operator instance: its registered name, the backend it is
/// bound to and its key–value arguments.
///
/// # Example
///
/// ```rust
/// use briny_eager::{Backend, OpSpec};
///
/// let spec = OpSpec::new("Increment")
///     .with_backend(Backend::Gpu)
///     .with_arg("max_batch_size", 4)
///     .with_arg("delta", 2.0);
/// assert_eq!(spec.argument::<usize>("max_batch_size").unwrap(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OpSpec {
    name: String,
    backend: Backend,
    arguments: BTreeMap<String, Argument>,
}

impl OpSpec {
    /// A descriptor for `name` on the CPU backend with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: Backend::Cpu,
            arguments: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn with_arg(mut self, name: &str, value: impl Into<Argument>) -> Self {
        self.set_arg(name, value);
        self
    }

    pub fn set_arg(&mut self, name: &str, value: impl Into<Argument>) {
        self.arguments.insert(name.to_owned(), value.into());
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    #[must_use]
    pub fn has_argument(&self, name: &str) -> bool {
        self.arguments.contains_key(name)
    }

    pub fn arguments(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.arguments.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads a required argument.
    ///
    /// # Errors
    ///
    /// [`EagerError::MissingArgument`] or [`EagerError::ArgumentType`].
    pub fn argument<T: FromArgument>(&self, name: &str) -> Result<T> {
        let arg = self
            .arguments
            .get(name)
            .ok_or_else(|| EagerError::MissingArgument {
                op: self.name.clone(),
                name: name.to_owned(),
            })?;
        T::from_argument(arg).ok_or_else(|| EagerError::ArgumentType {
            name: name.to_owned(),
            expected: T::EXPECTED,
        })
    }

    /// Reads an optional argument, falling back to `default`.
    ///
    /// # Errors
    ///
    /// [`EagerError::ArgumentType`] if present with the wrong type.
    pub fn argument_or<T: FromArgument>(&self, name: &str, default: T) -> Result<T> {
        if self.has_argument(name) {
            self.argument(name)
        } else {
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_argument_access() {
        let spec = OpSpec::new("Op")
            .with_arg("max_batch_size", 8)
            .with_arg("scale", 0.5f32)
            .with_arg("name", "x");
        assert_eq!(spec.argument::<usize>("max_batch_size").unwrap(), 8);
        assert_eq!(spec.argument::<f64>("max_batch_size").unwrap(), 8.0);
        assert_eq!(spec.argument::<f64>("scale").unwrap(), 0.5);
        assert_eq!(spec.argument_or("missing", 3usize).unwrap(), 3);
        assert!(matches!(
            spec.argument::<bool>("name"),
            Err(EagerError::ArgumentType { .. })
        ));
        assert!(matches!(
            spec.argument::<i64>("missing"),
            Err(EagerError::MissingArgument { .. })
        ));
    }

    #[test]
    fn negative_sizes_are_rejected() {
        let spec = OpSpec::new("Op").with_arg("max_batch_size", -1);
        assert!(spec.argument::<usize>("max_batch_size").is_err());
    }
}
