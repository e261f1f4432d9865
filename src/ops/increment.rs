//! `Increment`: adds a constant to every element.
//!
//! The constant is the `delta` argument (default `1.0`) or, when the call
//! supplies a `delta` argument input, one scalar per sample. Output shape and
//! type follow input 0, so the engine pre-sizes the output.

use super::kernels::{self, Window};
use crate::backend::Backend;
use crate::error::{EagerError, Result};
use crate::operator::{OpSchema, OpSpec, Operator, OutputDesc};
use crate::workspace::Workspace;
use std::sync::Arc;

pub const NAME: &str = "Increment";

#[derive(Debug, Clone)]
pub struct Increment {
    backend: Backend,
    delta: f64,
}

impl Increment {
    /// # Errors
    ///
    /// [`EagerError::ArgumentType`] for a non-numeric `delta`.
    pub fn new(spec: &OpSpec) -> Result<Self> {
        Ok(Self {
            backend: spec.backend(),
            delta: spec.argument_or("delta", 1.0)?,
        })
    }

    #[must_use]
    pub fn schema() -> OpSchema {
        OpSchema::new(NAME)
            .num_input(1)
            .num_output(1)
            .argument_input("delta")
    }

    fn deltas(&self, ws: &Workspace, num_samples: usize) -> Result<Vec<f64>> {
        if !ws.has_argument_input("delta") {
            return Ok(vec![self.delta; num_samples]);
        }
        let per_sample = ws.argument_input("delta")?;
        if per_sample.num_samples() != num_samples {
            return Err(EagerError::InvalidArgument(format!(
                "argument input `delta` has {} samples for an input of {num_samples}",
                per_sample.num_samples()
            )));
        }
        (0..num_samples)
            .map(|i| kernels::scalar_at(per_sample, i))
            .collect()
    }

    /// Output windows, input windows and per-sample deltas of one call.
    fn prepare(&self, ws: &mut Workspace) -> Result<(Vec<Window>, Vec<Window>, Vec<f64>)> {
        let input = ws.input(0)?;
        let layout = input.layout().clone();
        let sources = kernels::sample_windows(input);
        let deltas = self.deltas(ws, sources.len())?;

        let output = ws.output_mut(0)?;
        output.set_layout(layout);
        let targets = kernels::sample_windows(output);
        if targets.len() != sources.len() {
            return Err(EagerError::ShapeMismatch(format!(
                "output has {} samples, input has {}",
                targets.len(),
                sources.len()
            )));
        }
        Ok((targets, sources, deltas))
    }

    fn run_host(&self, ws: &mut Workspace) -> Result<()> {
        let pool = Arc::clone(ws.thread_pool()?);
        let (targets, sources, deltas) = self.prepare(ws)?;
        pool.for_each_sample(sources.len(), |i| {
            kernels::add_scalar(&targets[i], &sources[i], deltas[i])
        })
    }

    fn run_streamed(&self, ws: &mut Workspace) -> Result<()> {
        let stream = ws.stream()?.clone();
        let (targets, sources, deltas) = self.prepare(ws)?;
        stream.enqueue(move || {
            for ((dst, src), delta) in targets.iter().zip(&sources).zip(deltas) {
                kernels::add_scalar(dst, src, delta)?;
            }
            Ok(())
        })
    }
}

impl Operator for Increment {
    fn setup(&mut self, ws: &Workspace) -> Result<Option<Vec<OutputDesc>>> {
        let input = ws.input(0)?;
        self.deltas(ws, input.num_samples())?;
        Ok(Some(vec![OutputDesc::new(input.shape(), input.dtype())]))
    }

    fn run(&mut self, ws: &mut Workspace) -> Result<()> {
        match self.backend {
            Backend::Cpu => self.run_host(ws),
            Backend::Gpu | Backend::Mixed => self.run_streamed(ws),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageDevice;
    use crate::batch::{DenseBatch, TensorListShape};
    use crate::bridge::share_as_samples;
    use crate::resources::ThreadPool;
    use crate::workspace::{BatchRepr, BatchSlot};

    fn host_workspace(values: Vec<f32>) -> Workspace {
        let n = values.len();
        let input = DenseBatch::from_uniform(StorageDevice::Cpu, n, &[1], values).unwrap();
        let mut ws = Workspace::new();
        ws.set_thread_pool(Arc::new(ThreadPool::new(2, 0, false).unwrap()));
        ws.add_input(BatchSlot::Samples(share_as_samples(&input)));
        ws.add_output(BatchSlot::empty(BatchRepr::Samples, StorageDevice::Cpu, n));
        ws.set_batch_size(n);
        ws
    }

    #[test]
    fn setup_mirrors_the_input() {
        let ws = host_workspace(vec![1.0, 2.0]);
        let mut op = Increment::new(&OpSpec::new(NAME)).unwrap();
        let descs = op.setup(&ws).unwrap().unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].shape, TensorListShape::uniform(2, &[1]));
    }

    #[test]
    fn uses_per_sample_deltas() {
        let mut ws = host_workspace(vec![1.0, 2.0]);
        let deltas =
            DenseBatch::from_uniform(StorageDevice::Cpu, 2, &[1], vec![10.0f32, 20.0]).unwrap();
        ws.add_argument_input("delta", deltas);

        let mut op = Increment::new(&OpSpec::new(NAME).with_arg("delta", 5.0)).unwrap();
        let desc = op.setup(&ws).unwrap().unwrap().remove(0);
        ws.output_mut(0).unwrap().resize(&desc.shape, desc.dtype);
        op.run(&mut ws).unwrap();

        let out = ws.output(0).unwrap().as_samples().unwrap();
        assert_eq!(out.sample(0).to_vec::<f32>().unwrap(), vec![11.0]);
        assert_eq!(out.sample(1).to_vec::<f32>().unwrap(), vec![22.0]);
    }

    #[test]
    fn rejects_mismatched_delta_count() {
        let mut ws = host_workspace(vec![1.0, 2.0, 3.0]);
        let deltas = DenseBatch::from_uniform(StorageDevice::Cpu, 1, &[1], vec![1.0f32]).unwrap();
        ws.add_argument_input("delta", deltas);
        let mut op = Increment::new(&OpSpec::new(NAME)).unwrap();
        assert!(matches!(op.setup(&ws), Err(EagerError::InvalidArgument(_))));
    }

    #[test]
    fn unsized_output_is_an_error() {
        let mut ws = host_workspace(vec![1.0]);
        let mut op = Increment::new(&OpSpec::new(NAME)).unwrap();
        assert!(matches!(op.run(&mut ws), Err(EagerError::ShapeMismatch(_))));
    }
}
