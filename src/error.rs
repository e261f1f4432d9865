//! Error type shared by every module of the crate.

use crate::backend::{Backend, DevicePair, StorageDevice};
use crate::batch::DType;

/// Result alias used throughout `briny_eager`.
pub type Result<T> = core::result::Result<T, EagerError>;

/// All errors that eager execution can produce.
#[derive(Debug, thiserror::Error)]
pub enum EagerError {
    /// The `(backend, devices, binding)` combination has no pipeline.
    #[error("unsupported backends in DirectOperator::{form}(): {backend} operator with {pair}")]
    UnsupportedBackends {
        form: &'static str,
        backend: Backend,
        pair: DevicePair,
    },

    /// No operator or schema is registered under this name/backend.
    #[error("operator `{name}` is not registered for the {backend} backend")]
    UnknownOperator { name: String, backend: Backend },

    /// A required descriptor argument is absent.
    #[error("operator `{op}` is missing required argument `{name}`")]
    MissingArgument { op: String, name: String },

    /// A descriptor argument has the wrong type.
    #[error("argument `{name}` should be {expected}")]
    ArgumentType { name: String, expected: &'static str },

    /// A descriptor argument has an unusable value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Number of positional inputs outside the schema range.
    #[error("operator `{op}` expects between {min} and {max} inputs, got {got}")]
    InputCount {
        op: String,
        min: usize,
        max: usize,
        got: usize,
    },

    /// An input batch lives on the wrong device for the selected pipeline.
    #[error("input {index} is on {got} but the call expects {expected} inputs")]
    InputDevice {
        index: usize,
        expected: StorageDevice,
        got: StorageDevice,
    },

    /// Argument inputs are always host batches.
    #[error("argument input `{name}` must be a cpu batch, got {got}")]
    ArgumentInputDevice { name: String, got: StorageDevice },

    /// Argument input requested by an operator was not provided.
    #[error("argument input `{0}` was not provided")]
    MissingArgumentInput(String),

    /// An input holds more samples than the configured batch-size bound.
    #[error("input {index} has {samples} samples, exceeding max_batch_size {max}")]
    BatchTooLarge {
        index: usize,
        samples: usize,
        max: usize,
    },

    /// An untagged input's rank matches none of the schema's layouts.
    #[error(
        "input {index} has {rank} dimensions, which matches none of the allowed layouts {allowed}"
    )]
    LayoutRank {
        index: usize,
        rank: usize,
        allowed: String,
    },

    /// `setup` returned a different number of descriptors than outputs.
    #[error("setup produced {got} output descriptors for {expected} outputs")]
    OutputDescCount { expected: usize, got: usize },

    /// Index past the end of the workspace inputs/outputs.
    #[error("{kind} index {index} out of range (have {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// Workspace slot holds the other batch representation.
    #[error("{kind} {index} is not a {expected} batch")]
    Representation {
        kind: &'static str,
        index: usize,
        expected: &'static str,
    },

    /// Element type mismatch.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: DType, got: DType },

    /// Shape mismatch or malformed shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Device id outside the configured accelerator range.
    #[error("invalid device id {0}")]
    InvalidDevice(i32),

    /// A stream on another device than the operator was built for.
    #[error("operator is bound to device {expected} but the stream is on device {got}")]
    StreamDevice { expected: i32, got: i32 },

    /// The workspace has no binding of the kind the operator needs.
    #[error("workspace has no {0} bound")]
    MissingBinding(&'static str),

    /// Worker pool construction failed.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Work enqueued on a stream failed, reported at synchronization.
    #[error("stream synchronization failed on device {device}: {message}")]
    StreamSync { device: i32, message: String },

    /// Adapter/device acquisition failure of the `wgpu` backend.
    #[error("GPU failure: {0}")]
    Gpu(String),

    /// Failure raised by operator logic.
    #[error("operator error: {0}")]
    Operator(String),
}

impl EagerError {
    /// Create an operator error from any message.
    pub fn operator(msg: impl Into<String>) -> Self {
        Self::Operator(msg.into())
    }
}
