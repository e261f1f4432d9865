//! # Built-in Operators
//!
//! Small operators shipped with the engine and registered under their
//! names the first time the operator registry is used.
//!
//! ## Submodules
//!
//! - [`increment`]: adds a constant or per-sample scalar (cpu, gpu, mixed)
//! - [`repeat`]: stacks copies of each sample, sizing outputs in `run` (cpu, gpu)
//! - [`kernels`]: element loops shared by the operators
//!
//! ## Backends
//!
//! Host operators split work per sample over the bound worker pool. Gpu and
//! mixed operators enqueue a single job on the bound stream and return
//! immediately; the engine synchronizes the stream before handing results
//! back.
//!
//! ## Adding an Operator
//!
//! Implement [`Operator`], then pass its schema and [`factory`] to
//! [`register_operator`](crate::register_operator) once per backend.

pub mod increment;
pub mod kernels;
pub mod repeat;

use crate::backend::Backend;
use crate::error::Result;
use crate::operator::{OpSpec, Operator, OperatorFactory, OperatorRegistry};
use std::sync::Arc;

use self::increment::Increment;
use self::repeat::Repeat;

/// Wraps a constructor as a registry factory.
pub fn factory<O>(build: fn(&OpSpec) -> Result<O>) -> OperatorFactory
where
    O: Operator + 'static,
{
    Arc::new(move |spec: &OpSpec| -> Result<Box<dyn Operator>> { Ok(Box::new(build(spec)?)) })
}

pub(crate) fn register_builtins(registry: &mut OperatorRegistry) {
    for backend in [Backend::Cpu, Backend::Gpu, Backend::Mixed] {
        registry.register(Increment::schema(), backend, factory(Increment::new));
    }
    for backend in [Backend::Cpu, Backend::Gpu] {
        registry.register(Repeat::schema(), backend, factory(Repeat::new));
    }
}
