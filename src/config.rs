use std::path::PathBuf;
use std::time::Duration;

/// Settings for the nmap/ARP probe adapter.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// nmap executable, looked up on `PATH` when not absolute.
    pub nmap_path: PathBuf,

    /// Per-probe reply timeout, used for the sweep RTT bound and ARP fallback.
    pub probe_timeout: Duration,

    /// Hard limit on the whole sweep process.
    pub sweep_deadline: Duration,

    /// Hard limit on one host's OS fingerprint process.
    pub fingerprint_deadline: Duration,

    /// Interface for fallback ARP. `None` picks one matching the target.
    pub interface: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            nmap_path: PathBuf::from("nmap"),
            probe_timeout: Duration::from_secs(1),
            sweep_deadline: Duration::from_secs(120),
            fingerprint_deadline: Duration::from_secs(120),
            interface: None,
        }
    }
}

/// Settings for a scan session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum fingerprint probes in flight.
    pub concurrency: usize,
}

impl SessionConfig {
    pub const MAX_CONCURRENCY: usize = 64;

    pub fn with_concurrency(concurrency: usize) -> Self {
        Self { concurrency }
    }

    pub(crate) fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, Self::MAX_CONCURRENCY)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}
