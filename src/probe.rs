//! Probe capability used by discovery and fingerprinting.
//!
//! [`ProbeAdapter`] is the seam between the orchestration core and the network. The
//! production implementation, [`NmapProbe`], runs nmap for sweeps and OS detection
//! and sends raw ARP frames for the hardware-address fallback; tests plug in a mock.

use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

use crate::arp::ArpResolver;
use crate::config::ProbeConfig;
use crate::error::ScanError;
use crate::nmap;
use crate::targets;
use crate::types::{Device, FingerprintMatch, UNKNOWN};

#[async_trait]
pub trait ProbeAdapter: Send + Sync {
    /// Discover live hosts in `range`. The hardware address is empty when the
    /// mechanism did not report one.
    async fn sweep(&self, range: &str) -> Result<Vec<Device>, ScanError>;

    /// Ask one host for its hardware address. A silent host yields `"Unknown"`;
    /// only transport failures are errors.
    async fn resolve_hardware_address(&self, address: &str) -> Result<String, ScanError>;

    /// Candidate OS matches for one host. An empty list is a normal outcome.
    async fn fingerprint_os(&self, address: &str) -> Result<Vec<FingerprintMatch>, ScanError>;
}

pub struct NmapProbe {
    config: ProbeConfig,
    arp: ArpResolver,
}

impl NmapProbe {
    pub fn new(config: ProbeConfig) -> Self {
        let arp = ArpResolver::new(config.interface.clone(), config.probe_timeout);
        Self { config, arp }
    }
}

#[async_trait]
impl ProbeAdapter for NmapProbe {
    async fn sweep(&self, range: &str) -> Result<Vec<Device>, ScanError> {
        let range = targets::validate_range(range)?;
        let args = nmap::sweep_args(range, self.config.probe_timeout);
        let xml = nmap::run_xml(&self.config.nmap_path, &args, self.config.sweep_deadline)
            .await
            .map_err(|e| ScanError::NetworkUnavailable(format!("{e:#}")))?;
        let devices =
            nmap::sweep_devices(&xml).map_err(|e| ScanError::NetworkUnavailable(format!("{e:#}")))?;
        debug!(range, hosts = devices.len(), "sweep finished");
        Ok(devices)
    }

    async fn resolve_hardware_address(&self, address: &str) -> Result<String, ScanError> {
        let ip = match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => ip,
            // ARP has no IPv6 counterpart here
            _ => return Ok(UNKNOWN.to_string()),
        };
        let arp = self.arp.clone();
        let reply = tokio::task::spawn_blocking(move || arp.resolve(ip))
            .await
            .map_err(|e| ScanError::ProbeFailed(format!("ARP worker for {address}: {e}")))?
            .map_err(|e| ScanError::ProbeFailed(format!("ARP for {address}: {e:#}")))?;
        Ok(reply.map_or_else(|| UNKNOWN.to_string(), |mac| mac.to_string()))
    }

    async fn fingerprint_os(&self, address: &str) -> Result<Vec<FingerprintMatch>, ScanError> {
        let address = targets::validate_range(address)?;
        let args = nmap::fingerprint_args(address);
        let xml = nmap::run_xml(&self.config.nmap_path, &args, self.config.fingerprint_deadline)
            .await
            .map_err(|e| ScanError::ProbeFailed(format!("{address}: {e:#}")))?;
        nmap::os_matches_for(&xml, address)
            .map_err(|e| ScanError::ProbeFailed(format!("{address}: {e:#}")))
    }
}
