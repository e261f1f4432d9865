//! Device-scoped compute streams.
//!
//! A [`Stream`] is an ordered queue of asynchronous work bound to one
//! accelerator device. Work submitted with [`Stream::enqueue`] runs in
//! submission order on the stream's own thread; the caller continues
//! immediately. [`Stream::synchronize`] blocks until everything enqueued so
//! far has finished and reports the first failure since the last
//! synchronization.
//!
//! With the `wgpu` feature a stream is additionally attached to a `wgpu`
//! device when an adapter exists for its device id, and synchronization also
//! waits for that device's queue to drain. Only operators that submit to the
//! queue through `Stream::gpu` use the device; the built-in operators do not.
//!
//! Streams are handed out by the [`StreamPool`], one per device, and reused.

use crate::backend::CPU_ONLY_DEVICE_ID;
use crate::config::EagerConfig;
use crate::error::{EagerError, Result};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[cfg(feature = "wgpu")]
use super::gpu::GpuContext;

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct QueueState {
    pending: Mutex<usize>,
    idle: Condvar,
    error: Mutex<Option<String>>,
}

impl QueueState {
    fn finish(&self, outcome: core::result::Result<Result<()>, Box<dyn core::any::Any + Send>>) {
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(panic) => Some(
                panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stream work panicked".to_owned()),
            ),
        };
        if let Some(message) = failure {
            tracing::warn!(message = message.as_str(), "stream work failed");
            lock(&self.error).get_or_insert(message);
        }
        let mut pending = lock(&self.pending);
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

struct StreamInner {
    device_id: i32,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<QueueState>,
    #[cfg(feature = "wgpu")]
    gpu: Option<GpuContext>,
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        lock(&self.sender).take();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Handle to an ordered asynchronous work queue on one device.
///
/// Clones refer to the same stream.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl core::fmt::Debug for Stream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stream")
            .field("device_id", &self.inner.device_id)
            .finish_non_exhaustive()
    }
}

impl Stream {
    /// Starts a new stream for `device_id`.
    ///
    /// # Errors
    ///
    /// [`EagerError::StreamSync`] if the stream thread cannot be spawned.
    pub fn new(device_id: i32) -> Result<Self> {
        let state = Arc::new(QueueState::default());
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(format!("eager-stream-{device_id}"))
            .spawn(move || {
                for job in receiver {
                    worker_state.finish(catch_unwind(AssertUnwindSafe(job)));
                }
            })
            .map_err(|e| EagerError::StreamSync {
                device: device_id,
                message: e.to_string(),
            })?;

        #[cfg(feature = "wgpu")]
        let gpu = match GpuContext::new(device_id) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(device_id, error = %err, "no wgpu device, stream runs host-side");
                None
            }
        };

        tracing::debug!(device_id, "created compute stream");
        Ok(Self {
            inner: Arc::new(StreamInner {
                device_id,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                state,
                #[cfg(feature = "wgpu")]
                gpu,
            }),
        })
    }

    #[must_use]
    pub fn device_id(&self) -> i32 {
        self.inner.device_id
    }

    /// Whether both handles refer to one stream.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The `wgpu` context backing this stream, if any.
    #[cfg(feature = "wgpu")]
    #[must_use]
    pub fn gpu(&self) -> Option<&GpuContext> {
        self.inner.gpu.as_ref()
    }

    /// Queues `job` behind all previously enqueued work and returns at once.
    ///
    /// # Errors
    ///
    /// [`EagerError::StreamSync`] if the stream has shut down.
    pub fn enqueue<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        *lock(&self.inner.state.pending) += 1;
        let sent = lock(&self.inner.sender)
            .as_ref()
            .is_some_and(|tx| tx.send(Box::new(job)).is_ok());
        if sent {
            return Ok(());
        }
        let mut pending = lock(&self.inner.state.pending);
        *pending -= 1;
        if *pending == 0 {
            self.inner.state.idle.notify_all();
        }
        Err(EagerError::StreamSync {
            device: self.inner.device_id,
            message: "stream is shut down".to_owned(),
        })
    }

    /// Blocks until all enqueued work has completed.
    ///
    /// # Errors
    ///
    /// [`EagerError::StreamSync`] carrying the first failure since the last
    /// synchronization; the failure is cleared once reported.
    pub fn synchronize(&self) -> Result<()> {
        let state = &self.inner.state;
        let mut pending = lock(&state.pending);
        while *pending > 0 {
            pending = state
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(pending);

        #[cfg(feature = "wgpu")]
        if let Some(gpu) = &self.inner.gpu {
            gpu.wait_idle().map_err(|message| EagerError::StreamSync {
                device: self.inner.device_id,
                message,
            })?;
        }

        match lock(&state.error).take() {
            Some(message) => Err(EagerError::StreamSync {
                device: self.inner.device_id,
                message,
            }),
            None => Ok(()),
        }
    }
}

lazy_static::lazy_static! {
    static ref STREAM_POOL: Arc<StreamPool> =
        Arc::new(StreamPool::new(EagerConfig::from_env().num_devices));
}

/// Hands out one reusable stream per device id.
pub struct StreamPool {
    num_devices: usize,
    streams: Mutex<HashMap<i32, Stream>>,
}

impl core::fmt::Debug for StreamPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamPool")
            .field("num_devices", &self.num_devices)
            .finish_non_exhaustive()
    }
}

impl StreamPool {
    /// A pool for devices `0..num_devices`.
    #[must_use]
    pub fn new(num_devices: usize) -> Self {
        Self {
            num_devices,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide pool, sized by [`EagerConfig::from_env`].
    #[must_use]
    pub fn instance() -> Arc<Self> {
        Arc::clone(&STREAM_POOL)
    }

    #[must_use]
    pub const fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Checks that the pool can serve `device_id`.
    ///
    /// # Errors
    ///
    /// [`EagerError::InvalidDevice`] for ids outside `0..num_devices`
    /// (including [`CPU_ONLY_DEVICE_ID`]).
    pub fn check(&self, device_id: i32) -> Result<()> {
        let in_range = usize::try_from(device_id).is_ok_and(|id| id < self.num_devices);
        if device_id == CPU_ONLY_DEVICE_ID || !in_range {
            return Err(EagerError::InvalidDevice(device_id));
        }
        Ok(())
    }

    /// Returns the stream of `device_id`, creating it on first use.
    ///
    /// # Errors
    ///
    /// See [`check`](Self::check).
    pub fn get(&self, device_id: i32) -> Result<Stream> {
        self.check(device_id)?;
        let mut streams = lock(&self.streams);
        if let Some(stream) = streams.get(&device_id) {
            return Ok(stream.clone());
        }
        let stream = Stream::new(device_id)?;
        streams.insert(device_id, stream.clone());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn runs_work_in_order_and_waits() {
        let stream = Stream::new(0).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let log = Arc::clone(&log);
            stream
                .enqueue(move || {
                    thread::sleep(Duration::from_millis(2));
                    lock(&log).push(i);
                    Ok(())
                })
                .unwrap();
        }
        stream.synchronize().unwrap();
        assert_eq!(*lock(&log), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failures_are_reported_once() {
        let stream = Stream::new(0).unwrap();
        stream
            .enqueue(|| Err(EagerError::operator("kernel fault")))
            .unwrap();
        stream.enqueue(|| panic!("device lost")).unwrap();
        let err = stream.synchronize().unwrap_err();
        match err {
            EagerError::StreamSync { device, message } => {
                assert_eq!(device, 0);
                assert!(message.contains("kernel fault"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        stream.synchronize().unwrap();
        stream.enqueue(|| Ok(())).unwrap();
        stream.synchronize().unwrap();
    }

    #[test]
    fn pool_reuses_streams_and_checks_ids() {
        let pool = StreamPool::new(2);
        let a = pool.get(1).unwrap();
        let b = pool.get(1).unwrap();
        assert!(a.same_stream(&b));
        assert!(!a.same_stream(&pool.get(0).unwrap()));
        assert!(matches!(pool.get(2), Err(EagerError::InvalidDevice(2))));
        assert!(pool.check(0).is_ok());
        assert!(matches!(pool.check(-3), Err(EagerError::InvalidDevice(-3))));
        assert!(matches!(
            pool.get(CPU_ONLY_DEVICE_ID),
            Err(EagerError::InvalidDevice(_))
        ));
    }
}
