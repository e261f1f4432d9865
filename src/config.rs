//! Default resource settings.
//!
//! The shared worker pool and the shared stream are created lazily from an
//! [`EagerConfig`]. The defaults are a single worker thread bound to device 0
//! without thread affinity, and one accelerator device.
//!
//! Environment overrides read by [`EagerConfig::from_env`]:
//!
//! | variable                    | field              |
//! |-----------------------------|--------------------|
//! | `BRINY_EAGER_NUM_THREADS`   | `num_threads`      |
//! | `BRINY_EAGER_DEVICE_ID`     | `device_id`        |
//! | `BRINY_EAGER_SET_AFFINITY`  | `set_affinity`     |
//! | `BRINY_EAGER_NUM_DEVICES`   | `num_devices`      |
//!
//! A config is consistent when it has at least one worker thread and its
//! `device_id` is either [`CPU_ONLY_DEVICE_ID`] or one of `0..num_devices`.
//! Inconsistent environment settings are dropped in favour of the defaults.

use crate::backend::CPU_ONLY_DEVICE_ID;
use briny::prelude::{Validate, ValidationError};
use std::str::FromStr;

/// Settings for lazily created default resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EagerConfig {
    /// Worker threads of the default pool.
    pub num_threads: usize,
    /// Device the default pool and default stream target.
    pub device_id: i32,
    /// Whether default pool threads are tied to `device_id`.
    pub set_affinity: bool,
    /// Number of accelerator devices streams may be created for.
    pub num_devices: usize,
}

impl Default for EagerConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            device_id: 0,
            set_affinity: false,
            num_devices: 1,
        }
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var, value = value.as_str(), "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

fn env_flag(var: &str, default: bool) -> bool {
    let Ok(value) = std::env::var(var) else {
        return default;
    };
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

impl EagerConfig {
    /// Defaults overridden by `BRINY_EAGER_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let base = Self::default();
        let cfg = Self {
            num_threads: env_or("BRINY_EAGER_NUM_THREADS", base.num_threads).max(1),
            device_id: env_or("BRINY_EAGER_DEVICE_ID", base.device_id),
            set_affinity: env_flag("BRINY_EAGER_SET_AFFINITY", base.set_affinity),
            num_devices: env_or("BRINY_EAGER_NUM_DEVICES", base.num_devices),
        };
        if cfg.validate().is_err() {
            tracing::warn!(
                device_id = cfg.device_id,
                num_devices = cfg.num_devices,
                "inconsistent environment settings, using defaults"
            );
            return base;
        }
        cfg
    }

    #[must_use]
    pub const fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    #[must_use]
    pub const fn with_device_id(mut self, device_id: i32) -> Self {
        self.device_id = device_id;
        self
    }

    #[must_use]
    pub const fn with_num_devices(mut self, num_devices: usize) -> Self {
        self.num_devices = num_devices;
        self
    }
}

impl Validate for EagerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let known_device = self.device_id == CPU_ONLY_DEVICE_ID
            || usize::try_from(self.device_id).is_ok_and(|id| id < self.num_devices);
        if self.num_threads == 0 || !known_device {
            return Err(ValidationError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_threaded_device_zero() {
        let cfg = EagerConfig::default();
        assert_eq!(cfg.num_threads, 1);
        assert_eq!(cfg.device_id, 0);
        assert!(!cfg.set_affinity);
        assert_eq!(cfg.with_num_threads(4).num_threads, 4);
    }

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(env_or("BRINY_EAGER_TEST_UNSET_VAR", 3usize), 3);
        assert!(env_flag("BRINY_EAGER_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn validation_checks_threads_and_device_range() {
        let cfg = EagerConfig::default().with_num_devices(2);
        assert!(cfg.validate().is_ok());
        assert!(cfg.with_device_id(1).validate().is_ok());
        assert!(cfg.with_device_id(2).validate().is_err());
        assert!(cfg.with_device_id(-1).validate().is_err());
        assert!(cfg.with_device_id(CPU_ONLY_DEVICE_ID).validate().is_ok());
        assert!(cfg.with_num_threads(0).validate().is_err());
        assert!(EagerConfig::default().with_num_devices(0).validate().is_err());
    }
}
