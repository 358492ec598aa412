use serde::{Deserialize, Serialize};

/// Sentinel used for a hardware address or fingerprint that could not be determined.
pub const UNKNOWN: &str = "Unknown";

/// Fingerprint placeholder shown until the resolver has handled a device.
pub const RESOLVING: &str = "Resolving…";

/// One live host found by a sweep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub address: String,
    /// MAC address, `"Unknown"`, or empty when the sweep did not supply one.
    pub hardware_address: String,
}

impl Device {
    pub fn new(address: impl Into<String>, hardware_address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            hardware_address: hardware_address.into(),
        }
    }

    /// True when the hardware address still needs a fallback lookup.
    pub fn lacks_hardware_address(&self) -> bool {
        let mac = self.hardware_address.trim();
        mac.is_empty() || mac == UNKNOWN
    }
}

/// A single OS guess reported by the fingerprint probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub os_name: String,
    /// 0..=100
    pub confidence: u8,
}

impl FingerprintMatch {
    pub fn new(os_name: impl Into<String>, confidence: u8) -> Self {
        Self {
            os_name: os_name.into(),
            confidence: confidence.min(100),
        }
    }
}

/// A discovered device plus its (eventually) resolved fingerprint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device: Device,
    pub fingerprint: String,
}

impl DeviceRecord {
    pub fn pending(device: Device) -> Self {
        Self {
            device,
            fingerprint: RESOLVING.to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.fingerprint == RESOLVING
    }
}

/// Terminal figures for one scan session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ScanSummary {
    /// All devices found by discovery, resolved or not.
    pub device_count: usize,
    /// Devices whose fingerprint update was emitted.
    pub resolved_count: usize,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub started_at: String,
}
