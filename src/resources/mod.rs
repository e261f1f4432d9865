//! Execution resources: worker pools, compute streams and the binder owning
//! the shared defaults.
//!
//! ## Submodules
//!
//! - [`pool`]: `rayon`-backed worker pool for host operators
//! - [`stream`]: ordered asynchronous device queues and their pool
//! - [`binder`]: default pool/stream shared by default-path calls
//! - `gpu` *(opt-in)*: `wgpu` device backing for streams
//!
//! ## Feature Flags
//!
//! - `wgpu`: attach streams to `wgpu` adapters

pub mod binder;
pub mod pool;
pub mod stream;

#[cfg(feature = "wgpu")]
pub mod gpu;

pub use self::binder::ResourceBinder;
pub use self::pool::ThreadPool;
pub use self::stream::{Stream, StreamPool};

/// The resource a workspace hands to the operator for one call.
#[derive(Debug, Clone)]
pub enum ResourceBinding {
    /// Host execution on a worker pool.
    ThreadPool(std::sync::Arc<ThreadPool>),
    /// Device execution on a compute stream.
    Stream(Stream),
}
