//! `Repeat`: stacks `times` copies of every sample along a new outer
//! dimension, so a `[h, w]` sample becomes `[times, h, w]`.
//!
//! The operator sizes its output itself during `run` instead of describing
//! it in `setup`.

use super::kernels;
use crate::backend::Backend;
use crate::batch::{Layout, TensorListShape};
use crate::error::{EagerError, Result};
use crate::operator::{OpSchema, OpSpec, Operator, OutputDesc};
use crate::workspace::Workspace;
use std::sync::Arc;

pub const NAME: &str = "Repeat";

#[derive(Debug, Clone)]
pub struct Repeat {
    backend: Backend,
    times: usize,
}

impl Repeat {
    /// # Errors
    ///
    /// A missing or negative `times` argument.
    pub fn new(spec: &OpSpec) -> Result<Self> {
        Ok(Self {
            backend: spec.backend(),
            times: spec.argument("times")?,
        })
    }

    #[must_use]
    pub fn schema() -> OpSchema {
        OpSchema::new(NAME).num_input(1).num_output(1)
    }

    fn allocate(&self, ws: &mut Workspace) -> Result<(Vec<kernels::Window>, Vec<kernels::Window>)> {
        let input = ws.input(0)?;
        let sources = kernels::sample_windows(input);
        let shape = TensorListShape::new(
            input
                .shape()
                .iter()
                .map(|s| {
                    let mut tiled = Vec::with_capacity(s.len() + 1);
                    tiled.push(self.times);
                    tiled.extend_from_slice(s);
                    tiled
                })
                .collect(),
        )?;
        let layout = match input.layout() {
            l if l.is_empty() => Layout::empty(),
            l => Layout::new(&format!("F{}", l.as_str())),
        };
        let dtype = input.dtype();

        let output = ws.output_mut(0)?;
        output.resize(&shape, dtype);
        output.set_layout(layout);
        Ok((kernels::sample_windows(output), sources))
    }
}

impl Operator for Repeat {
    fn setup(&mut self, ws: &Workspace) -> Result<Option<Vec<OutputDesc>>> {
        ws.input(0)?;
        Ok(None)
    }

    fn can_infer_outputs(&self) -> bool {
        false
    }

    fn run(&mut self, ws: &mut Workspace) -> Result<()> {
        let times = self.times;
        match self.backend {
            Backend::Cpu => {
                let pool = Arc::clone(ws.thread_pool()?);
                let (targets, sources) = self.allocate(ws)?;
                pool.for_each_sample(sources.len(), |i| {
                    kernels::tile(&targets[i], &sources[i], times)
                })
            }
            Backend::Gpu => {
                let stream = ws.stream()?.clone();
                let (targets, sources) = self.allocate(ws)?;
                stream.enqueue(move || {
                    targets
                        .iter()
                        .zip(&sources)
                        .try_for_each(|(dst, src)| kernels::tile(dst, src, times))
                })
            }
            Backend::Mixed => Err(EagerError::operator("Repeat has no mixed implementation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageDevice;
    use crate::batch::{DenseBatch, Sample, SampleBatch};
    use crate::resources::ThreadPool;
    use crate::workspace::{BatchRepr, BatchSlot};

    #[test]
    fn tiles_ragged_samples_on_the_host() {
        let input = SampleBatch::from_samples(
            StorageDevice::Cpu,
            vec![
                Sample::new(&[2], vec![1i32, 2]).unwrap(),
                Sample::new(&[1], vec![7i32]).unwrap(),
            ],
        )
        .unwrap();
        let mut ws = Workspace::new();
        ws.set_thread_pool(Arc::new(ThreadPool::new(2, 0, false).unwrap()));
        ws.add_input(BatchSlot::Samples(input));
        ws.add_output(BatchSlot::empty(BatchRepr::Samples, StorageDevice::Cpu, 2));

        let mut op = Repeat::new(&OpSpec::new(NAME).with_arg("times", 3)).unwrap();
        assert!(op.setup(&ws).unwrap().is_none());
        assert!(!op.can_infer_outputs());
        op.run(&mut ws).unwrap();

        let out = ws.output(0).unwrap().as_samples().unwrap();
        assert_eq!(out.sample(0).shape(), &[3, 2]);
        assert_eq!(out.sample(0).to_vec::<i32>().unwrap(), vec![1, 2, 1, 2, 1, 2]);
        assert_eq!(out.sample(1).to_vec::<i32>().unwrap(), vec![7, 7, 7]);
    }

    #[test]
    fn prefixes_the_layout() {
        let mut input =
            DenseBatch::from_uniform(StorageDevice::Cpu, 1, &[2], vec![0u8, 1]).unwrap();
        input.set_layout(Layout::new("W"));
        let mut ws = Workspace::new();
        ws.set_thread_pool(Arc::new(ThreadPool::new(1, 0, false).unwrap()));
        ws.add_input(BatchSlot::Dense(input));
        ws.add_output(BatchSlot::empty(BatchRepr::Dense, StorageDevice::Cpu, 1));

        let mut op = Repeat::new(&OpSpec::new(NAME).with_arg("times", 2)).unwrap();
        op.run(&mut ws).unwrap();
        let out = ws.output(0).unwrap();
        assert_eq!(out.layout().as_str(), "FW");
        assert_eq!(out.as_dense_batch().unwrap().to_vec::<u8>().unwrap(), vec![0, 1, 0, 1]);
    }

    #[test]
    fn times_is_required() {
        assert!(matches!(
            Repeat::new(&OpSpec::new(NAME)),
            Err(EagerError::MissingArgument { .. })
        ));
    }
}
