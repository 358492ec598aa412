use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::probe::ProbeAdapter;
use crate::types::{Device, UNKNOWN};

/// Sweep `range` and return one device per live address in first-seen order.
///
/// Hosts the sweep reported without a hardware address get a direct ARP lookup;
/// a failed lookup is recorded as `"Unknown"` and never aborts discovery. Only a
/// sweep failure is returned as an error.
pub async fn discover(probe: &dyn ProbeAdapter, range: &str) -> Result<Vec<Device>, ScanError> {
    discover_with_cancel(probe, range, &CancellationToken::new()).await
}

/// Variant that stops issuing hardware address lookups once `cancel` trips.
/// Devices not looked up by then are recorded as `"Unknown"`.
pub async fn discover_with_cancel(
    probe: &dyn ProbeAdapter,
    range: &str,
    cancel: &CancellationToken,
) -> Result<Vec<Device>, ScanError> {
    let swept = probe.sweep(range).await?;
    let mut devices = dedup_by_address(swept);

    for device in devices.iter_mut().filter(|d| d.lacks_hardware_address()) {
        if cancel.is_cancelled() {
            device.hardware_address = UNKNOWN.to_string();
            continue;
        }
        device.hardware_address = match probe.resolve_hardware_address(&device.address).await {
            Ok(mac) if !mac.trim().is_empty() => mac,
            Ok(_) => UNKNOWN.to_string(),
            Err(e) => {
                warn!(address = %device.address, error = %e, "hardware address fallback failed");
                UNKNOWN.to_string()
            }
        };
    }

    debug!(range, devices = devices.len(), "discovery finished");
    Ok(devices)
}

/// Keep the first device per address; a later duplicate only contributes a
/// hardware address the first one lacked.
fn dedup_by_address(swept: Vec<Device>) -> Vec<Device> {
    let mut out: Vec<Device> = Vec::with_capacity(swept.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for device in swept {
        match index.get(&device.address) {
            Some(&i) => {
                if out[i].lacks_hardware_address() && !device.lacks_hardware_address() {
                    out[i].hardware_address = device.hardware_address;
                }
            }
            None => {
                index.insert(device.address.clone(), out.len());
                out.push(device);
            }
        }
    }
    out
}
