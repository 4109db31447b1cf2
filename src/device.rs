//! Compute device selection
//!
//! Training runs on exactly one device for the whole process. `Auto` prefers
//! an accelerator and falls back to the CPU; explicit choices fail loudly when
//! the backend is unavailable.

use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Device selection preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CUDA, then Metal, then CPU
    #[default]
    Auto,
    /// Always the CPU
    Cpu,
    /// A specific CUDA device
    Cuda {
        /// Device ordinal
        ordinal: usize,
    },
    /// A specific Metal device
    Metal {
        /// Device ordinal
        ordinal: usize,
    },
}

impl std::str::FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match lower.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal
                    .parse::<usize>()
                    .map_err(|_| Error::config(format!("invalid device ordinal in '{s}'")))?;
                (kind.to_string(), ordinal)
            }
            None => (lower, 0),
        };

        match kind.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda { ordinal }),
            "metal" | "mps" => Ok(Self::Metal { ordinal }),
            _ => Err(Error::config(format!("unknown device '{s}'"))),
        }
    }
}

/// Resolve a device preference to a concrete candle device
pub fn select_device(preference: DeviceType) -> Result<Device> {
    let device = match preference {
        DeviceType::Cpu => Device::Cpu,
        DeviceType::Cuda { ordinal } => Device::new_cuda(ordinal)
            .map_err(|e| Error::device(format!("CUDA device {ordinal} unavailable: {e}")))?,
        DeviceType::Metal { ordinal } => Device::new_metal(ordinal)
            .map_err(|e| Error::device(format!("Metal device {ordinal} unavailable: {e}")))?,
        DeviceType::Auto => {
            let cuda = Device::cuda_if_available(0)?;
            if cuda.is_cuda() {
                cuda
            } else {
                debug!("CUDA not available, probing Metal");
                Device::metal_if_available(0)?
            }
        }
    };

    info!("Using device: {}", device_label(&device));
    Ok(device)
}

/// Short human-readable name of a device
pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}
