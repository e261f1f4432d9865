//! Eager execution of a single operator.
//!
//! A [`DirectOperator`] owns one backend-bound operator instance and one
//! [`Workspace`]. Every call assembles the workspace from the caller's
//! batches, lets the operator infer its outputs, runs it and hands back one
//! dense batch per declared output.
//!
//! Which operator backends accept which storage devices is decided by a
//! small table of pipelines:
//!
//! | operator | inputs | outputs | workspace in | workspace out | binding     |
//! |----------|--------|---------|--------------|---------------|-------------|
//! | cpu      | cpu    | cpu     | per-sample   | per-sample    | worker pool |
//! | gpu      | gpu    | gpu     | dense        | dense         | stream      |
//! | mixed    | cpu    | gpu     | per-sample   | dense         | stream      |
//!
//! Anything else is rejected before the workspace is touched.

use crate::backend::{Backend, DevicePair, StorageDevice};
use crate::batch::DenseBatch;
use crate::bridge::{AsDense, share_as_samples};
use crate::error::{EagerError, Result};
use crate::operator::{OpSchema, OpSpec, Operator, instantiate_operator, schema_for};
use crate::resources::{ResourceBinder, Stream, ThreadPool};
use crate::workspace::{BatchRepr, BatchSlot, Workspace};
use std::collections::HashMap;
use std::sync::Arc;

/// Named argument inputs of a call. Always host batches.
pub type Kwargs = HashMap<String, DenseBatch>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    ThreadPool,
    Stream,
}

#[derive(Debug, Clone, Copy)]
struct Pipeline {
    backend: Backend,
    pair: DevicePair,
    input: BatchRepr,
    output: BatchRepr,
    binding: BindingKind,
}

const PIPELINES: [Pipeline; 3] = [
    Pipeline {
        backend: Backend::Cpu,
        pair: DevicePair::CPU_TO_CPU,
        input: BatchRepr::Samples,
        output: BatchRepr::Samples,
        binding: BindingKind::ThreadPool,
    },
    Pipeline {
        backend: Backend::Gpu,
        pair: DevicePair::GPU_TO_GPU,
        input: BatchRepr::Dense,
        output: BatchRepr::Dense,
        binding: BindingKind::Stream,
    },
    Pipeline {
        backend: Backend::Mixed,
        pair: DevicePair::CPU_TO_GPU,
        input: BatchRepr::Samples,
        output: BatchRepr::Dense,
        binding: BindingKind::Stream,
    },
];

fn find_pipeline(
    form: &'static str,
    backend: Backend,
    pair: DevicePair,
    binding: Option<BindingKind>,
) -> Result<Pipeline> {
    PIPELINES
        .iter()
        .find(|p| p.backend == backend && p.pair == pair && binding.is_none_or(|b| b == p.binding))
        .copied()
        .ok_or(EagerError::UnsupportedBackends {
            form,
            backend,
            pair,
        })
}

/// Eager wrapper around one operator instance.
///
/// # Example
///
/// ```rust
/// use briny_eager::{DenseBatch, DevicePair, DirectOperator, Kwargs, OpSpec, StorageDevice};
///
/// let spec = OpSpec::new("Increment").with_arg("max_batch_size", 4);
/// let mut op = DirectOperator::new(&spec).unwrap();
///
/// let values = vec![1.0f32, 2.0, 3.0, 4.0];
/// let input = DenseBatch::from_uniform(StorageDevice::Cpu, 4, &[1], values).unwrap();
/// let out = op.run(DevicePair::CPU_TO_CPU, &[input], &Kwargs::new()).unwrap();
/// assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![2.0, 3.0, 4.0, 5.0]);
/// ```
pub struct DirectOperator {
    batch_size: usize,
    device_id: i32,
    num_outputs: usize,
    spec: OpSpec,
    schema: Arc<OpSchema>,
    op: Box<dyn Operator>,
    ws: Workspace,
    binder: Arc<ResourceBinder>,
}

impl core::fmt::Debug for DirectOperator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DirectOperator")
            .field("spec", &self.spec)
            .field("batch_size", &self.batch_size)
            .field("device_id", &self.device_id)
            .field("num_outputs", &self.num_outputs)
            .finish_non_exhaustive()
    }
}

impl DirectOperator {
    /// Builds the operator `spec` describes, bound to the process-wide
    /// default resources.
    ///
    /// Gpu and mixed operators are bound to the `device_id` argument, which
    /// defaults to the device of the binder's default stream. Every stream
    /// they later run on must belong to that device.
    ///
    /// # Errors
    ///
    /// Missing or non-positive `max_batch_size`, a `device_id` the stream
    /// pool cannot serve, unknown operator kind, or any construction error
    /// of the operator itself.
    pub fn new(spec: &OpSpec) -> Result<Self> {
        Self::with_binder(spec, ResourceBinder::global())
    }

    /// Like [`new`](Self::new), drawing default resources from `binder`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_binder(spec: &OpSpec, binder: Arc<ResourceBinder>) -> Result<Self> {
        let batch_size: usize = spec.argument("max_batch_size")?;
        if batch_size == 0 {
            return Err(EagerError::InvalidArgument(
                "max_batch_size must be positive".to_owned(),
            ));
        }
        let device_id: i32 = spec.argument_or("device_id", binder.stream_device_id())?;
        if spec.backend() != Backend::Cpu {
            binder.check_device(device_id)?;
        }
        let schema = schema_for(spec)?;
        let op = instantiate_operator(spec)?;
        tracing::debug!(
            name = spec.name(),
            backend = %spec.backend(),
            batch_size,
            device_id,
            "constructed direct operator"
        );
        Ok(Self {
            batch_size,
            device_id,
            num_outputs: schema.num_outputs(),
            spec: spec.clone(),
            schema,
            op,
            ws: Workspace::new(),
            binder,
        })
    }

    /// Replaces the process-wide default worker pool.
    ///
    /// # Errors
    ///
    /// Pool creation failure; the previous default stays.
    pub fn set_thread_pool(num_threads: usize, device_id: i32, set_affinity: bool) -> Result<()> {
        ResourceBinder::global().set_thread_pool(num_threads, device_id, set_affinity)
    }

    /// Replaces the process-wide default stream with the pooled stream of
    /// `device_id`. Does nothing for
    /// [`CPU_ONLY_DEVICE_ID`](crate::CPU_ONLY_DEVICE_ID).
    ///
    /// # Errors
    ///
    /// [`EagerError::InvalidDevice`].
    pub fn set_stream(device_id: i32) -> Result<()> {
        ResourceBinder::global().set_stream(device_id)
    }

    #[must_use]
    pub const fn spec(&self) -> &OpSpec {
        &self.spec
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub const fn device_id(&self) -> i32 {
        self.device_id
    }

    #[must_use]
    pub const fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Runs on the default worker pool or default stream, whichever the
    /// pipeline for `pair` uses.
    ///
    /// # Errors
    ///
    /// [`EagerError::UnsupportedBackends`] for pairs the operator's backend
    /// cannot serve, [`EagerError::StreamDevice`] if the default stream is on
    /// another device; otherwise any validation, operator or stream error.
    pub fn run(
        &mut self,
        pair: DevicePair,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
    ) -> Result<Vec<DenseBatch>> {
        let pipeline = find_pipeline("run", self.spec.backend(), pair, None)?;
        match pipeline.binding {
            BindingKind::ThreadPool => {
                let pool = self.binder.thread_pool()?;
                self.run_pooled(pipeline, inputs, kwargs, pool)
            }
            BindingKind::Stream => {
                let stream = self.binder.stream()?;
                self.run_streamed(pipeline, inputs, kwargs, &stream)
            }
        }
    }

    /// Runs a host operator on `pool`.
    ///
    /// # Errors
    ///
    /// [`EagerError::UnsupportedBackends`] unless the operator is a cpu
    /// operator called with cpu batches.
    pub fn run_with_pool(
        &mut self,
        pair: DevicePair,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
        pool: Arc<ThreadPool>,
    ) -> Result<Vec<DenseBatch>> {
        let pipeline = find_pipeline(
            "run_with_pool",
            self.spec.backend(),
            pair,
            Some(BindingKind::ThreadPool),
        )?;
        self.run_pooled(pipeline, inputs, kwargs, pool)
    }

    /// Runs a gpu or mixed operator on `stream`, returning once the stream
    /// has drained.
    ///
    /// # Errors
    ///
    /// [`EagerError::UnsupportedBackends`] for cpu operators or mismatched
    /// storage devices, [`EagerError::StreamDevice`] for a stream on another
    /// device than the operator's.
    pub fn run_with_stream(
        &mut self,
        pair: DevicePair,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
        stream: &Stream,
    ) -> Result<Vec<DenseBatch>> {
        let pipeline = find_pipeline(
            "run_with_stream",
            self.spec.backend(),
            pair,
            Some(BindingKind::Stream),
        )?;
        self.run_streamed(pipeline, inputs, kwargs, stream)
    }

    fn run_pooled(
        &mut self,
        pipeline: Pipeline,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
        pool: Arc<ThreadPool>,
    ) -> Result<Vec<DenseBatch>> {
        self.ws.clear();
        self.ws.set_thread_pool(pool);
        self.run_impl(pipeline, inputs, kwargs)
    }

    fn run_streamed(
        &mut self,
        pipeline: Pipeline,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
        stream: &Stream,
    ) -> Result<Vec<DenseBatch>> {
        if stream.device_id() != self.device_id {
            return Err(EagerError::StreamDevice {
                expected: self.device_id,
                got: stream.device_id(),
            });
        }
        self.ws.clear();
        self.ws.set_stream(stream.clone());
        stream.synchronize()?;
        match self.run_impl(pipeline, inputs, kwargs) {
            Ok(outputs) => {
                stream.synchronize()?;
                Ok(outputs)
            }
            Err(err) => {
                // drain work queued before the failure
                if let Err(sync) = stream.synchronize() {
                    tracing::warn!(error = %sync, "discarding stream failure after operator error");
                }
                Err(err)
            }
        }
    }

    fn run_impl(
        &mut self,
        pipeline: Pipeline,
        inputs: &[DenseBatch],
        kwargs: &Kwargs,
    ) -> Result<Vec<DenseBatch>> {
        tracing::trace!(
            name = self.spec.name(),
            pair = %pipeline.pair,
            inputs = inputs.len(),
            kwargs = kwargs.len(),
            "assembling workspace"
        );
        self.schema.check_input_count(inputs.len())?;

        for (index, input) in inputs.iter().enumerate() {
            if input.device() != pipeline.pair.input {
                return Err(EagerError::InputDevice {
                    index,
                    expected: pipeline.pair.input,
                    got: input.device(),
                });
            }
            if input.num_samples() > self.batch_size {
                return Err(EagerError::BatchTooLarge {
                    index,
                    samples: input.num_samples(),
                    max: self.batch_size,
                });
            }

            let mut slot = match pipeline.input {
                BatchRepr::Samples => BatchSlot::Samples(share_as_samples(input)),
                BatchRepr::Dense => BatchSlot::Dense(input.clone()),
            };
            if slot.layout().is_empty() && slot.num_samples() > 0 {
                if let Some(layout) = self.schema.input_layout(index, slot.sample_dim())? {
                    slot.set_layout(layout);
                }
            }
            self.ws.add_input(slot);
        }

        for (name, arg) in kwargs {
            self.schema.check_argument_input(name)?;
            if arg.device() != StorageDevice::Cpu {
                return Err(EagerError::ArgumentInputDevice {
                    name: name.clone(),
                    got: arg.device(),
                });
            }
            self.ws.add_argument_input(name.clone(), arg.clone());
        }

        for _ in 0..self.num_outputs {
            self.ws.add_output(BatchSlot::empty(
                pipeline.output,
                pipeline.pair.output,
                self.batch_size,
            ));
        }
        self.ws.set_batch_size(self.batch_size);

        let descs = self.op.setup(&self.ws)?;
        if let Some(descs) = descs.filter(|_| self.op.can_infer_outputs()) {
            if descs.len() != self.num_outputs {
                return Err(EagerError::OutputDescCount {
                    expected: self.num_outputs,
                    got: descs.len(),
                });
            }
            for (index, desc) in descs.iter().enumerate() {
                self.ws.output_mut(index)?.resize(&desc.shape, desc.dtype);
            }
            tracing::trace!(outputs = descs.len(), "materialized inferred outputs");
        }

        self.op.run(&mut self.ws)?;

        self.ws.outputs().iter().map(AsDense::as_dense).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_table_lookup() {
        let cpu = find_pipeline("run", Backend::Cpu, DevicePair::CPU_TO_CPU, None).unwrap();
        assert_eq!(cpu.binding, BindingKind::ThreadPool);
        assert_eq!(cpu.input, BatchRepr::Samples);

        let mixed = find_pipeline(
            "run_with_stream",
            Backend::Mixed,
            DevicePair::CPU_TO_GPU,
            Some(BindingKind::Stream),
        )
        .unwrap();
        assert_eq!(mixed.output, BatchRepr::Dense);

        assert!(find_pipeline("run", Backend::Gpu, DevicePair::CPU_TO_GPU, None).is_err());
        assert!(find_pipeline("run", Backend::Cpu, DevicePair::GPU_TO_GPU, None).is_err());
        assert!(matches!(
            find_pipeline(
                "run_with_pool",
                Backend::Gpu,
                DevicePair::GPU_TO_GPU,
                Some(BindingKind::ThreadPool)
            ),
            Err(EagerError::UnsupportedBackends { form: "run_with_pool", .. })
        ));
    }

    #[test]
    fn every_pipeline_is_reachable_exactly_once() {
        for p in PIPELINES {
            let hits = PIPELINES
                .iter()
                .filter(|q| q.backend == p.backend && q.pair == p.pair)
                .count();
            assert_eq!(hits, 1);
        }
    }
}
