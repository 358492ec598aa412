#![allow(dead_code)]

use async_trait::async_trait;
use lan_fingerprint_rs::types::{Device, FingerprintMatch, UNKNOWN};
use lan_fingerprint_rs::{ProbeAdapter, ScanError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Scripted probe: fixed sweep output, per-address MAC and OS answers.
pub struct MockProbe {
    sweep: Result<Vec<Device>, ScanError>,
    macs: HashMap<String, Result<String, ScanError>>,
    fingerprints: HashMap<String, Result<Vec<FingerprintMatch>, ScanError>>,
    sweep_gate: Option<Arc<Notify>>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    cancel_on_mac_call: Option<(usize, CancellationToken)>,
    fingerprint_delay: Duration,
    pub mac_calls: Mutex<Vec<String>>,
    pub fingerprint_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockProbe {
    pub fn new(devices: Vec<Device>) -> Self {
        Self::with_sweep(Ok(devices))
    }

    pub fn failing_sweep(err: ScanError) -> Self {
        Self::with_sweep(Err(err))
    }

    fn with_sweep(sweep: Result<Vec<Device>, ScanError>) -> Self {
        Self {
            sweep,
            macs: HashMap::new(),
            fingerprints: HashMap::new(),
            sweep_gate: None,
            cancel_on_call: None,
            cancel_on_mac_call: None,
            fingerprint_delay: Duration::ZERO,
            mac_calls: Mutex::new(Vec::new()),
            fingerprint_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn mac(mut self, address: &str, answer: Result<&str, ScanError>) -> Self {
        self.macs
            .insert(address.to_string(), answer.map(str::to_string));
        self
    }

    pub fn os(mut self, address: &str, answer: Result<Vec<(&str, u8)>, ScanError>) -> Self {
        let answer = answer.map(|v| {
            v.into_iter()
                .map(|(name, conf)| FingerprintMatch::new(name, conf))
                .collect()
        });
        self.fingerprints.insert(address.to_string(), answer);
        self
    }

    /// Sweep waits until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.sweep_gate = Some(gate);
        self
    }

    /// Cancel `token` when the `n`-th fingerprint call starts (1-based).
    pub fn cancel_on_fingerprint_call(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((n, token));
        self
    }

    /// Cancel `token` when the `n`-th hardware address lookup starts (1-based).
    pub fn cancel_on_mac_call(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_on_mac_call = Some((n, token));
        self
    }

    pub fn fingerprint_delay(mut self, delay: Duration) -> Self {
        self.fingerprint_delay = delay;
        self
    }

    pub fn mac_calls(&self) -> Vec<String> {
        self.mac_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeAdapter for MockProbe {
    async fn sweep(&self, _range: &str) -> Result<Vec<Device>, ScanError> {
        if let Some(gate) = &self.sweep_gate {
            gate.notified().await;
        }
        self.sweep.clone()
    }

    async fn resolve_hardware_address(&self, address: &str) -> Result<String, ScanError> {
        let call = {
            let mut calls = self.mac_calls.lock().unwrap();
            calls.push(address.to_string());
            calls.len()
        };
        if let Some((n, token)) = &self.cancel_on_mac_call {
            if call == *n {
                token.cancel();
            }
        }
        self.macs
            .get(address)
            .cloned()
            .unwrap_or_else(|| Ok(UNKNOWN.to_string()))
    }

    async fn fingerprint_os(&self, address: &str) -> Result<Vec<FingerprintMatch>, ScanError> {
        let call = self.fingerprint_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_on_call {
            if call == *n {
                token.cancel();
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fingerprint_delay.is_zero() {
            tokio::time::sleep(self.fingerprint_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.fingerprints
            .get(address)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn devices(list: &[(&str, &str)]) -> Vec<Device> {
    list.iter().map(|(ip, mac)| Device::new(*ip, *mac)).collect()
}
