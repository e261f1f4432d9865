//! Operator descriptors, schemas, the registry and the [`Operator`] trait.
//!
//! ## Submodules
//!
//! - [`spec`]: per-instance descriptor with typed arguments
//! - [`schema`]: per-kind static description
//! - [`registry`]: name/backend to factory table

pub mod registry;
pub mod schema;
pub mod spec;

pub use self::registry::{
    OperatorFactory, OperatorRegistry, instantiate_operator, register_operator, schema_for,
};
pub use self::schema::OpSchema;
pub use self::spec::{Argument, FromArgument, OpSpec};

use crate::batch::{DType, TensorListShape};
use crate::error::Result;
use crate::workspace::Workspace;

/// Shape and element type of one output, as inferred by [`Operator::setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDesc {
    pub shape: TensorListShape,
    pub dtype: DType,
}

impl OutputDesc {
    #[must_use]
    pub const fn new(shape: TensorListShape, dtype: DType) -> Self {
        Self { shape, dtype }
    }
}

/// A stateful, backend-bound batched operator.
///
/// The engine calls [`setup`](Self::setup) and then [`run`](Self::run) once
/// per call on a freshly assembled [`Workspace`].
pub trait Operator: Send {
    /// Inspects the inputs and optionally describes every output.
    ///
    /// # Errors
    ///
    /// Whatever validation the operator performs.
    fn setup(&mut self, ws: &Workspace) -> Result<Option<Vec<OutputDesc>>>;

    /// Whether descriptors returned by `setup` should be used to pre-size
    /// the outputs. Operators returning `false` size outputs in `run`.
    fn can_infer_outputs(&self) -> bool {
        true
    }

    /// Fills the outputs.
    ///
    /// # Errors
    ///
    /// Whatever the operator reports.
    fn run(&mut self, ws: &mut Workspace) -> Result<()>;
}
