//! Process-wide table of operator kinds.
//!
//! Each kind has one [`OpSchema`] and one factory per supported [`Backend`].
//! The built-in operators are registered the first time the table is used.

use super::schema::OpSchema;
use super::spec::OpSpec;
use super::Operator;
use crate::backend::Backend;
use crate::error::{EagerError, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Builds a backend-bound operator instance from its descriptor.
pub type OperatorFactory = Arc<dyn Fn(&OpSpec) -> Result<Box<dyn Operator>> + Send + Sync>;

lazy_static::lazy_static! {
    static ref REGISTRY: RwLock<OperatorRegistry> = {
        let mut registry = OperatorRegistry::default();
        crate::ops::register_builtins(&mut registry);
        RwLock::new(registry)
    };
}

/// Schemas and factories keyed by operator name.
#[derive(Default)]
pub struct OperatorRegistry {
    schemas: HashMap<String, Arc<OpSchema>>,
    factories: HashMap<(String, Backend), OperatorFactory>,
}

impl core::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl OperatorRegistry {
    /// Adds or replaces the factory of `schema.name()` on `backend`.
    ///
    /// The schema is shared by every backend of the kind; the latest
    /// registration wins.
    pub fn register(&mut self, schema: OpSchema, backend: Backend, factory: OperatorFactory) {
        let name = schema.name().to_owned();
        self.schemas.insert(name.clone(), Arc::new(schema));
        self.factories.insert((name, backend), factory);
    }

    /// # Errors
    ///
    /// [`EagerError::UnknownOperator`] if no kind of that name exists.
    pub fn schema(&self, name: &str, backend: Backend) -> Result<Arc<OpSchema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| EagerError::UnknownOperator {
                name: name.to_owned(),
                backend,
            })
    }

    fn factory(&self, spec: &OpSpec) -> Result<OperatorFactory> {
        self.factories
            .get(&(spec.name().to_owned(), spec.backend()))
            .cloned()
            .ok_or_else(|| EagerError::UnknownOperator {
                name: spec.name().to_owned(),
                backend: spec.backend(),
            })
    }
}

/// Registers an operator kind with the process-wide registry.
///
/// # Example
///
/// ```rust
/// use briny_eager::{register_operator, Backend, OpSchema, OpSpec};
/// use briny_eager::ops::{factory, increment::Increment};
///
/// register_operator(OpSchema::new("PlusOne"), Backend::Cpu, factory(Increment::new));
/// assert!(briny_eager::instantiate_operator(&OpSpec::new("PlusOne")).is_ok());
/// ```
pub fn register_operator(schema: OpSchema, backend: Backend, factory: OperatorFactory) {
    tracing::debug!(name = schema.name(), %backend, "registering operator");
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(schema, backend, factory);
}

/// The schema of the kind `spec` names.
///
/// # Errors
///
/// [`EagerError::UnknownOperator`].
pub fn schema_for(spec: &OpSpec) -> Result<Arc<OpSchema>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .schema(spec.name(), spec.backend())
}

/// Builds the operator `spec` describes on its backend.
///
/// # Errors
///
/// [`EagerError::UnknownOperator`] if the kind has no factory for the
/// backend, or whatever the factory reports for bad arguments.
pub fn instantiate_operator(spec: &OpSpec) -> Result<Box<dyn Operator>> {
    // released before calling the factory
    let factory = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .factory(spec)?;
    factory(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let spec = OpSpec::new("Increment").with_arg("max_batch_size", 2);
        assert_eq!(schema_for(&spec).unwrap().num_outputs(), 1);
        assert!(instantiate_operator(&spec).is_ok());
        assert!(instantiate_operator(&spec.clone().with_backend(Backend::Mixed)).is_ok());
    }

    #[test]
    fn unknown_kind_or_backend() {
        let spec = OpSpec::new("NoSuchOp");
        assert!(matches!(
            schema_for(&spec),
            Err(EagerError::UnknownOperator { .. })
        ));
        let mixed_repeat = OpSpec::new("Repeat")
            .with_backend(Backend::Mixed)
            .with_arg("max_batch_size", 1);
        assert!(matches!(
            instantiate_operator(&mixed_repeat),
            Err(EagerError::UnknownOperator { backend: Backend::Mixed, .. })
        ));
    }
}
