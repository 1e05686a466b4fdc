//! Compute device enumeration.
//!
//! Index 0 is always the host thread pool; with the `opencl` feature every
//! device of every OpenCL platform follows in platform order.

use crate::NBodyError;

#[cfg(feature = "opencl")]
use opencl3::{
    device::{Device, CL_DEVICE_TYPE_ALL},
    platform::get_platforms,
    types::cl_device_id,
};

#[derive(Debug, Clone)]
pub enum DeviceKind {
    /// rayon pool with `threads` workers
    Host { threads: usize },
    #[cfg(feature = "opencl")]
    OpenCl(cl_device_id),
}

#[derive(Debug, Clone)]
pub struct ComputeDevice {
    pub kind: DeviceKind,
    pub name: String,
}

/// Every usable device. `threads` overrides the host pool size.
pub fn device_list(threads: Option<usize>) -> Result<Vec<ComputeDevice>, NBodyError> {
    let threads = match threads {
        Some(0) => return Err(NBodyError::Config("thread count must be > 0".to_owned())),
        Some(n) => n,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };
    #[allow(unused_mut)]
    let mut devices = vec![ComputeDevice {
        kind: DeviceKind::Host { threads },
        name: format!("Host CPU ({threads} threads)"),
    }];

    #[cfg(feature = "opencl")]
    devices.extend(opencl_devices()?);

    log::debug!("{} compute devices found", devices.len());
    Ok(devices)
}

pub fn select_device(devices: &[ComputeDevice], index: usize) -> Result<&ComputeDevice, NBodyError> {
    devices.get(index).ok_or(NBodyError::InvalidDevice {
        index,
        available: devices.len(),
    })
}

/// `--list` output.
pub fn format_device_list(devices: &[ComputeDevice]) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_owned();
    }
    let mut out = String::from("\nDevices:\n");
    for (i, d) in devices.iter().enumerate() {
        out.push_str(&format!("{i:2}: {}\n", d.name));
    }
    out
}

#[cfg(feature = "opencl")]
fn opencl_devices() -> Result<Vec<ComputeDevice>, NBodyError> {
    let platforms = match get_platforms() {
        Ok(p) => p,
        Err(e) => {
            // no ICD loader / no platforms: host only
            log::warn!("no OpenCL platforms available: {e}");
            return Ok(Vec::new());
        }
    };

    let mut devices = Vec::new();
    for platform in platforms {
        let ids = match platform.get_devices(CL_DEVICE_TYPE_ALL) {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("skipping platform {:?}: {e}", platform.name());
                continue;
            }
        };
        for id in ids {
            devices.push(ComputeDevice {
                kind: DeviceKind::OpenCl(id),
                name: device_name(&Device::new(id))?,
            });
        }
    }
    Ok(devices)
}

/// Display name; AMD devices report their board name instead of the
/// architecture code name.
#[cfg(feature = "opencl")]
pub fn device_name(device: &Device) -> Result<String, NBodyError> {
    let vendor = device.vendor()?;
    if vendor.contains("Advanced Micro Devices") {
        if let Ok(board) = device.board_name_amd() {
            if !board.is_empty() {
                return Ok(board);
            }
        }
    }
    Ok(device.name()?)
}
