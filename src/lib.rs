//! briny_eager: eager execution of single batched operators in Rust.
//!
//! Runs one tensor-batch operator immediately, outside of any execution
//! graph, on host, accelerator or staged host-to-accelerator backends.
//!
//! # Features
//!
//! - [`DirectOperator`] wraps one operator instance and runs it per call,
//!   returning one dense batch per declared output.
//! - Shared default resources: a `rayon` worker pool for host operators and
//!   an ordered compute stream for accelerator operators, both replaceable.
//! - Output shape inference: operators describe their outputs and the engine
//!   pre-sizes them before `run`.
//! - Dense and per-sample batch representations with storage-sharing views.
//!
//! # Modules
//!
//! - [`direct`]: the engine and its backend dispatch table.
//! - [`operator`]: descriptors, schemas, the registry and the [`Operator`] trait.
//! - [`workspace`]: the per-call context handed to operators.
//! - [`resources`]: worker pools, compute streams and the [`ResourceBinder`].
//! - [`batch`]: dense and per-sample batch containers.
//! - [`bridge`]: conversions between the two representations.
//! - [`ops`]: built-in operators (`Increment`, `Repeat`).
//! - [`config`]: default resource settings, optionally from the environment.
//!
//! # Feature Flags
//!
//! - `wgpu`: back compute streams with `wgpu` devices.
//!
//! # Example
//!
//! ```rust
//! use briny_eager::{
//!     Backend, DenseBatch, DevicePair, DirectOperator, Kwargs, OpSpec, StorageDevice,
//! };
//!
//! let spec = OpSpec::new("Increment")
//!     .with_backend(Backend::Gpu)
//!     .with_arg("max_batch_size", 2)
//!     .with_arg("delta", 0.5);
//! let mut op = DirectOperator::new(&spec).unwrap();
//!
//! let values = vec![1.0f32, 2.0, 3.0, 4.0];
//! let input = DenseBatch::from_uniform(StorageDevice::Gpu, 2, &[2], values).unwrap();
//! let out = op.run(DevicePair::GPU_TO_GPU, &[input], &Kwargs::new()).unwrap();
//! assert_eq!(out[0].to_vec::<f32>().unwrap(), vec![1.5, 2.5, 3.5, 4.5]);
//! ```

pub mod approx;
pub mod backend;
pub mod batch;
pub mod bridge;
pub mod config;
pub mod direct;
pub mod error;
pub mod operator;
pub mod ops;
pub mod resources;
pub mod workspace;

pub use backend::{Backend, CPU_ONLY_DEVICE_ID, DevicePair, StorageDevice};
pub use batch::{DType, DenseBatch, Layout, Sample, SampleBatch, TensorListShape};
pub use config::EagerConfig;
pub use direct::{DirectOperator, Kwargs};
pub use error::{EagerError, Result};
pub use operator::{
    Argument, OpSchema, OpSpec, Operator, OutputDesc, instantiate_operator, register_operator,
};
pub use resources::{ResourceBinder, Stream, StreamPool, ThreadPool};
pub use workspace::{BatchRepr, BatchSlot, Workspace};
