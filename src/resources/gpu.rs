//! `wgpu` device backing for compute streams.
//!
//! Device ids index the adapters reported by [`wgpu::Instance::enumerate_adapters`].
//! Adapter and device requests are awaited with `pollster`.
//!
//! The context is only attached to a stream. The built-in operators run
//! their kernels on the stream thread and submit nothing to the queue, so
//! [`GpuContext::wait_idle`] drains work submitted by custom operators
//! through [`Stream::gpu`](crate::Stream::gpu).

use crate::error::{EagerError, Result};

/// Holds the WGPU device and queue a stream synchronizes with.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// The device's submission queue.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Opens the adapter at position `device_id` and requests a device + queue.
    ///
    /// # Errors
    ///
    /// - [`EagerError::InvalidDevice`] if no adapter exists at that index
    /// - [`EagerError::Gpu`] if device acquisition fails
    pub fn new(device_id: i32) -> Result<Self> {
        let index = usize::try_from(device_id).map_err(|_| EagerError::InvalidDevice(device_id))?;
        let instance = wgpu::Instance::default();
        let adapter = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .nth(index)
            .ok_or(EagerError::InvalidDevice(device_id))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("briny_eager"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|e| EagerError::Gpu(e.to_string()))?;

        Ok(Self { device, queue })
    }

    /// Blocks until all work submitted to the queue has completed.
    ///
    /// # Errors
    ///
    /// The poll error message.
    pub fn wait_idle(&self) -> core::result::Result<(), String> {
        self.queue.submit(core::iter::empty());
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
