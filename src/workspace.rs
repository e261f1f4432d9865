//! Per-call execution context handed to operators.

use crate::backend::StorageDevice;
use crate::batch::{DType, DenseBatch, Layout, SampleBatch, TensorListShape};
use crate::bridge::AsDense;
use crate::error::{EagerError, Result};
use crate::resources::{ResourceBinding, Stream, ThreadPool};
use std::collections::HashMap;
use std::sync::Arc;

/// Which container a pipeline uses for a side of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchRepr {
    /// [`DenseBatch`].
    Dense,
    /// [`SampleBatch`].
    Samples,
}

impl BatchRepr {
    const fn name(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Samples => "per-sample",
        }
    }
}

/// One workspace input or output in either representation.
#[derive(Debug, Clone)]
pub enum BatchSlot {
    Dense(DenseBatch),
    Samples(SampleBatch),
}

impl BatchSlot {
    /// An empty slot of the given representation.
    #[must_use]
    pub fn empty(repr: BatchRepr, device: StorageDevice, capacity: usize) -> Self {
        match repr {
            BatchRepr::Dense => Self::Dense(DenseBatch::new(device, capacity)),
            BatchRepr::Samples => Self::Samples(SampleBatch::new(device, capacity)),
        }
    }

    #[must_use]
    pub const fn repr(&self) -> BatchRepr {
        match self {
            Self::Dense(_) => BatchRepr::Dense,
            Self::Samples(_) => BatchRepr::Samples,
        }
    }

    #[must_use]
    pub const fn device(&self) -> StorageDevice {
        match self {
            Self::Dense(b) => b.device(),
            Self::Samples(b) => b.device(),
        }
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Dense(b) => b.dtype(),
            Self::Samples(b) => b.dtype(),
        }
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        match self {
            Self::Dense(b) => b.num_samples(),
            Self::Samples(b) => b.num_samples(),
        }
    }

    #[must_use]
    pub fn sample_dim(&self) -> usize {
        match self {
            Self::Dense(b) => b.sample_dim(),
            Self::Samples(b) => b.sample_dim(),
        }
    }

    #[must_use]
    pub fn shape(&self) -> TensorListShape {
        match self {
            Self::Dense(b) => b.shape().clone(),
            Self::Samples(b) => b.shape(),
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &Layout {
        match self {
            Self::Dense(b) => b.layout(),
            Self::Samples(b) => b.layout(),
        }
    }

    pub fn set_layout(&mut self, layout: Layout) {
        match self {
            Self::Dense(b) => b.set_layout(layout),
            Self::Samples(b) => b.set_layout(layout),
        }
    }

    /// Reallocates the slot for `shape` and `dtype`.
    pub fn resize(&mut self, shape: &TensorListShape, dtype: DType) {
        match self {
            Self::Dense(b) => b.resize(shape, dtype),
            Self::Samples(b) => b.resize(shape, dtype),
        }
    }

    #[must_use]
    pub const fn as_dense_batch(&self) -> Option<&DenseBatch> {
        match self {
            Self::Dense(b) => Some(b),
            Self::Samples(_) => None,
        }
    }

    #[must_use]
    pub const fn as_samples(&self) -> Option<&SampleBatch> {
        match self {
            Self::Samples(b) => Some(b),
            Self::Dense(_) => None,
        }
    }

    pub const fn as_dense_batch_mut(&mut self) -> Option<&mut DenseBatch> {
        match self {
            Self::Dense(b) => Some(b),
            Self::Samples(_) => None,
        }
    }

    pub const fn as_samples_mut(&mut self) -> Option<&mut SampleBatch> {
        match self {
            Self::Samples(b) => Some(b),
            Self::Dense(_) => None,
        }
    }
}

impl AsDense for BatchSlot {
    fn as_dense(&self) -> Result<DenseBatch> {
        match self {
            Self::Dense(b) => b.as_dense(),
            Self::Samples(b) => b.as_dense(),
        }
    }
}

fn slot<'a>(slots: &'a [BatchSlot], kind: &'static str, index: usize) -> Result<&'a BatchSlot> {
    slots.get(index).ok_or(EagerError::IndexOutOfRange {
        kind,
        index,
        len: slots.len(),
    })
}

fn slot_mut<'a>(
    slots: &'a mut [BatchSlot],
    kind: &'static str,
    index: usize,
) -> Result<&'a mut BatchSlot> {
    let len = slots.len();
    slots
        .get_mut(index)
        .ok_or(EagerError::IndexOutOfRange { kind, index, len })
}

const fn wrong_repr(kind: &'static str, index: usize, expected: BatchRepr) -> EagerError {
    EagerError::Representation {
        kind,
        index,
        expected: expected.name(),
    }
}

/// Inputs, named argument inputs, outputs and the resource binding of one
/// call.
///
/// A workspace is owned by its engine and rebuilt from scratch by every
/// call; operators only ever see it between assembly and the end of `run`.
#[derive(Debug, Default)]
pub struct Workspace {
    inputs: Vec<BatchSlot>,
    argument_inputs: HashMap<String, DenseBatch>,
    outputs: Vec<BatchSlot>,
    binding: Option<ResourceBinding>,
    batch_size: usize,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all batches and the binding of the previous call.
    pub fn clear(&mut self) {
        self.inputs.clear();
        self.argument_inputs.clear();
        self.outputs.clear();
        self.binding = None;
        self.batch_size = 0;
    }

    pub fn set_thread_pool(&mut self, pool: Arc<ThreadPool>) {
        self.binding = Some(ResourceBinding::ThreadPool(pool));
    }

    pub fn set_stream(&mut self, stream: Stream) {
        self.binding = Some(ResourceBinding::Stream(stream));
    }

    #[must_use]
    pub const fn binding(&self) -> Option<&ResourceBinding> {
        self.binding.as_ref()
    }

    /// # Errors
    ///
    /// [`EagerError::MissingBinding`] unless a worker pool is bound.
    pub fn thread_pool(&self) -> Result<&Arc<ThreadPool>> {
        match &self.binding {
            Some(ResourceBinding::ThreadPool(pool)) => Ok(pool),
            _ => Err(EagerError::MissingBinding("thread pool")),
        }
    }

    /// # Errors
    ///
    /// [`EagerError::MissingBinding`] unless a stream is bound.
    pub fn stream(&self) -> Result<&Stream> {
        match &self.binding {
            Some(ResourceBinding::Stream(stream)) => Ok(stream),
            _ => Err(EagerError::MissingBinding("stream")),
        }
    }

    pub fn add_input(&mut self, input: BatchSlot) {
        self.inputs.push(input);
    }

    pub fn add_argument_input(&mut self, name: impl Into<String>, batch: DenseBatch) {
        self.argument_inputs.insert(name.into(), batch);
    }

    pub fn add_output(&mut self, output: BatchSlot) {
        self.outputs.push(output);
    }

    pub const fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    /// Upper bound on samples per batch for this call.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// # Errors
    ///
    /// [`EagerError::IndexOutOfRange`].
    pub fn input(&self, index: usize) -> Result<&BatchSlot> {
        slot(&self.inputs, "input", index)
    }

    /// # Errors
    ///
    /// Out of range, or the input is dense.
    pub fn input_samples(&self, index: usize) -> Result<&SampleBatch> {
        self.input(index)?
            .as_samples()
            .ok_or(wrong_repr("input", index, BatchRepr::Samples))
    }

    /// # Errors
    ///
    /// Out of range, or the input is per-sample.
    pub fn input_dense(&self, index: usize) -> Result<&DenseBatch> {
        self.input(index)?
            .as_dense_batch()
            .ok_or(wrong_repr("input", index, BatchRepr::Dense))
    }

    #[must_use]
    pub fn outputs(&self) -> &[BatchSlot] {
        &self.outputs
    }

    /// # Errors
    ///
    /// [`EagerError::IndexOutOfRange`].
    pub fn output(&self, index: usize) -> Result<&BatchSlot> {
        slot(&self.outputs, "output", index)
    }

    /// # Errors
    ///
    /// [`EagerError::IndexOutOfRange`].
    pub fn output_mut(&mut self, index: usize) -> Result<&mut BatchSlot> {
        slot_mut(&mut self.outputs, "output", index)
    }

    /// # Errors
    ///
    /// Out of range, or the output is dense.
    pub fn output_samples_mut(&mut self, index: usize) -> Result<&mut SampleBatch> {
        self.output_mut(index)?
            .as_samples_mut()
            .ok_or(wrong_repr("output", index, BatchRepr::Samples))
    }

    /// # Errors
    ///
    /// Out of range, or the output is per-sample.
    pub fn output_dense_mut(&mut self, index: usize) -> Result<&mut DenseBatch> {
        self.output_mut(index)?
            .as_dense_batch_mut()
            .ok_or(wrong_repr("output", index, BatchRepr::Dense))
    }

    #[must_use]
    pub fn has_argument_input(&self, name: &str) -> bool {
        self.argument_inputs.contains_key(name)
    }

    /// # Errors
    ///
    /// [`EagerError::MissingArgumentInput`].
    pub fn argument_input(&self, name: &str) -> Result<&DenseBatch> {
        self.argument_inputs
            .get(name)
            .ok_or_else(|| EagerError::MissingArgumentInput(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_everything() {
        let mut ws = Workspace::new();
        ws.add_input(BatchSlot::empty(BatchRepr::Samples, StorageDevice::Cpu, 2));
        ws.add_output(BatchSlot::empty(BatchRepr::Dense, StorageDevice::Gpu, 2));
        ws.add_argument_input("delta", DenseBatch::new(StorageDevice::Cpu, 2));
        ws.set_thread_pool(Arc::new(ThreadPool::new(1, 0, false).unwrap()));
        ws.set_batch_size(2);

        ws.clear();
        assert_eq!(ws.num_inputs(), 0);
        assert_eq!(ws.num_outputs(), 0);
        assert!(!ws.has_argument_input("delta"));
        assert!(ws.binding().is_none());
        assert_eq!(ws.batch_size(), 0);
    }

    #[test]
    fn typed_slot_access() {
        let mut ws = Workspace::new();
        ws.add_input(BatchSlot::empty(BatchRepr::Samples, StorageDevice::Cpu, 1));
        ws.add_output(BatchSlot::empty(BatchRepr::Dense, StorageDevice::Gpu, 1));

        assert!(ws.input_samples(0).is_ok());
        assert!(matches!(
            ws.input_dense(0),
            Err(EagerError::Representation { expected: "dense", .. })
        ));
        assert!(matches!(
            ws.input(3),
            Err(EagerError::IndexOutOfRange { kind: "input", index: 3, len: 1 })
        ));
        assert!(ws.output_dense_mut(0).is_ok());
        assert!(ws.output_samples_mut(0).is_err());
    }

    #[test]
    fn binding_kind_is_checked() {
        let mut ws = Workspace::new();
        assert!(matches!(ws.stream(), Err(EagerError::MissingBinding("stream"))));
        ws.set_thread_pool(Arc::new(ThreadPool::new(1, 0, false).unwrap()));
        assert!(ws.thread_pool().is_ok());
        assert!(ws.stream().is_err());
    }

    #[test]
    fn resize_and_layout_on_both_representations() {
        let shape = TensorListShape::uniform(2, &[3]);
        for repr in [BatchRepr::Dense, BatchRepr::Samples] {
            let mut out = BatchSlot::empty(repr, StorageDevice::Cpu, 2);
            out.resize(&shape, DType::I32);
            out.set_layout(Layout::new("W"));
            assert_eq!(out.repr(), repr);
            assert_eq!(out.shape(), shape);
            assert_eq!(out.dtype(), DType::I32);
            assert_eq!(out.layout().as_str(), "W");
            let dense = out.as_dense().unwrap();
            assert_eq!(dense.to_vec::<i32>().unwrap(), vec![0; 6]);
        }
    }
}
