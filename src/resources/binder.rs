//! Shared default resources for eager calls.
//!
//! Eager callers issue many small single-operator calls, so the worker pool
//! and compute stream are created once and reused by every default-path
//! [`run`](crate::DirectOperator::run). Explicit-binding runs bypass the
//! binder entirely.
//!
//! A [`ResourceBinder`] is an ordinary value that can be built per test or
//! per application and injected into engines. [`ResourceBinder::global`] is
//! the process-wide instance used by [`DirectOperator::new`](crate::DirectOperator::new).
//!
//! Replacing a default while default-path calls are in flight is allowed by
//! the locks, but a call that already fetched the old resource keeps using
//! it. Replace defaults at quiescence.

use super::pool::ThreadPool;
use super::stream::{Stream, StreamPool};
use crate::backend::CPU_ONLY_DEVICE_ID;
use crate::config::EagerConfig;
use crate::error::Result;
use std::sync::{Arc, PoisonError, RwLock};

lazy_static::lazy_static! {
    static ref GLOBAL_BINDER: Arc<ResourceBinder> = Arc::new(ResourceBinder::with_stream_pool(
        EagerConfig::from_env(),
        StreamPool::instance(),
    ));
}

/// Owner of the default worker pool and default compute stream.
#[derive(Debug)]
pub struct ResourceBinder {
    config: EagerConfig,
    streams: Arc<StreamPool>,
    thread_pool: RwLock<Option<Arc<ThreadPool>>>,
    stream: RwLock<Option<Stream>>,
}

impl ResourceBinder {
    /// A binder with its own stream pool sized by `config.num_devices`.
    #[must_use]
    pub fn new(config: EagerConfig) -> Self {
        Self::with_stream_pool(config, Arc::new(StreamPool::new(config.num_devices)))
    }

    /// A binder acquiring streams from `streams`.
    #[must_use]
    pub fn with_stream_pool(config: EagerConfig, streams: Arc<StreamPool>) -> Self {
        Self {
            config,
            streams,
            thread_pool: RwLock::new(None),
            stream: RwLock::new(None),
        }
    }

    /// The process-wide binder.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_BINDER)
    }

    #[must_use]
    pub const fn config(&self) -> &EagerConfig {
        &self.config
    }

    /// Device of the default stream: the installed stream's if one exists,
    /// otherwise the configured device.
    #[must_use]
    pub fn stream_device_id(&self) -> i32 {
        self.stream
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(self.config.device_id, Stream::device_id)
    }

    /// Checks that streams can be acquired for `device_id`.
    ///
    /// # Errors
    ///
    /// [`EagerError::InvalidDevice`](crate::EagerError::InvalidDevice).
    pub fn check_device(&self, device_id: i32) -> Result<()> {
        self.streams.check(device_id)
    }

    /// Replaces the default worker pool.
    ///
    /// The new pool is fully built before it is swapped in.
    ///
    /// # Errors
    ///
    /// [`EagerError::ThreadPool`](crate::EagerError::ThreadPool) if the pool
    /// cannot be created; the previous default stays installed.
    pub fn set_thread_pool(
        &self,
        num_threads: usize,
        device_id: i32,
        set_affinity: bool,
    ) -> Result<()> {
        let pool = Arc::new(ThreadPool::new(num_threads, device_id, set_affinity)?);
        *self
            .thread_pool
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(pool);
        tracing::debug!(num_threads, device_id, set_affinity, "replaced default worker pool");
        Ok(())
    }

    /// Installs the pooled stream of `device_id` as the default stream.
    ///
    /// Does nothing for [`CPU_ONLY_DEVICE_ID`].
    ///
    /// # Errors
    ///
    /// [`EagerError::InvalidDevice`](crate::EagerError::InvalidDevice) for an
    /// unknown device.
    pub fn set_stream(&self, device_id: i32) -> Result<()> {
        if device_id == CPU_ONLY_DEVICE_ID {
            return Ok(());
        }
        let stream = self.streams.get(device_id)?;
        *self.stream.write().unwrap_or_else(PoisonError::into_inner) = Some(stream);
        tracing::debug!(device_id, "replaced default stream");
        Ok(())
    }

    /// The default worker pool, created from the config on first use.
    ///
    /// # Errors
    ///
    /// Pool creation failure.
    pub fn thread_pool(&self) -> Result<Arc<ThreadPool>> {
        if let Some(pool) = &*self.thread_pool.read().unwrap_or_else(PoisonError::into_inner) {
            return Ok(Arc::clone(pool));
        }
        let mut slot = self.thread_pool.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = &*slot {
            return Ok(Arc::clone(pool));
        }
        let cfg = &self.config;
        let pool = Arc::new(ThreadPool::new(cfg.num_threads, cfg.device_id, cfg.set_affinity)?);
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// The default stream, acquired for the configured device on first use.
    ///
    /// # Errors
    ///
    /// [`EagerError::InvalidDevice`](crate::EagerError::InvalidDevice) if the
    /// configured device has no stream.
    pub fn stream(&self) -> Result<Stream> {
        if let Some(stream) = &*self.stream.read().unwrap_or_else(PoisonError::into_inner) {
            return Ok(stream.clone());
        }
        let mut slot = self.stream.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = &*slot {
            return Ok(stream.clone());
        }
        let stream = self.streams.get(self.config.device_id)?;
        *slot = Some(stream.clone());
        Ok(stream)
    }
}
