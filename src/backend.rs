//! Backend and storage-device tags.
//!
//! An operator is bound to exactly one [`Backend`] when it is constructed.
//! Batches carry a [`StorageDevice`] telling where their memory lives.
//!
//! # Supported Backends
//!
//! - `Cpu`: host operator, host inputs and host outputs.
//! - `Gpu`: accelerator operator, device inputs and device outputs.
//! - `Mixed`: staged operator: host inputs are transferred and processed on
//!   the device, producing device outputs.
//!
//! Which `(backend, input device, output device)` triples can actually run is
//! decided by the dispatch table in [`crate::direct`].

use core::convert::TryFrom;
use core::fmt;

/// Device id meaning "no accelerator"; streams are never created for it.
pub const CPU_ONLY_DEVICE_ID: i32 = -99999;

/// Enumeration of operator backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Host execution on a worker pool (default).
    #[default]
    Cpu = 0,
    /// Accelerator execution on a compute stream.
    Gpu,
    /// Host inputs, accelerator outputs.
    Mixed,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Gpu),
            2 => Ok(Self::Mixed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu => f.write_str("gpu"),
            Self::Mixed => f.write_str("mixed"),
        }
    }
}

/// Where the memory of a batch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StorageDevice {
    /// Host memory.
    #[default]
    Cpu = 0,
    /// Accelerator memory, only touched from a compute stream.
    Gpu,
}

impl TryFrom<u8> for StorageDevice {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Gpu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StorageDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu => f.write_str("gpu"),
        }
    }
}

/// The `(input, output)` storage devices requested for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePair {
    /// Device of every input batch.
    pub input: StorageDevice,
    /// Device of every returned output batch.
    pub output: StorageDevice,
}

impl DevicePair {
    /// Host in, host out.
    pub const CPU_TO_CPU: Self = Self::new(StorageDevice::Cpu, StorageDevice::Cpu);
    /// Device in, device out.
    pub const GPU_TO_GPU: Self = Self::new(StorageDevice::Gpu, StorageDevice::Gpu);
    /// Host in, device out (staged).
    pub const CPU_TO_GPU: Self = Self::new(StorageDevice::Cpu, StorageDevice::Gpu);

    /// Creates a pair.
    #[must_use]
    pub const fn new(input: StorageDevice, output: StorageDevice) -> Self {
        Self { input, output }
    }
}

impl fmt::Display for DevicePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.input, self.output)
    }
}
