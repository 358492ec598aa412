use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use ::time::{format_description::well_known, OffsetDateTime};

use crate::config::SessionConfig;
use crate::discovery;
use crate::error::ScanError;
use crate::fingerprint;
use crate::probe::ProbeAdapter;
use crate::types::{DeviceRecord, ScanSummary};

/// Lifecycle of the controller's current (or last) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Sweeping,
    Resolving,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Sweeping | SessionState::Resolving)
    }
}

/// Progress notifications from a running session, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Emitted once, before any fingerprint update, with placeholder fingerprints.
    Discovered { records: Vec<DeviceRecord> },
    /// `index` is the device position in the `Discovered` list.
    FingerprintUpdated { index: usize, fingerprint: String },
    Completed { summary: ScanSummary },
    /// The session ended without a summary.
    Failed { error: ScanError },
}

/// Starts scan sessions, one at a time.
pub struct ScanController {
    probe: Arc<dyn ProbeAdapter>,
    config: SessionConfig,
    state: Arc<watch::Sender<SessionState>>,
}

impl ScanController {
    pub fn new(probe: Arc<dyn ProbeAdapter>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            probe,
            config,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Start a session on `range`. Must be called from within a tokio runtime.
    ///
    /// Fails with `InvalidInput` for an empty range and `ScanInProgress` while another
    /// session is sweeping or resolving; neither changes the state.
    pub fn start(&self, range: &str) -> Result<ScanHandle, ScanError> {
        self.start_with_cancel(range, CancellationToken::new())
    }

    /// Variant that accepts a `CancellationToken` to allow external cancellation.
    pub fn start_with_cancel(
        &self,
        range: &str,
        cancel: CancellationToken,
    ) -> Result<ScanHandle, ScanError> {
        let range = range.trim();
        if range.is_empty() {
            return Err(ScanError::InvalidInput("address range is empty".into()));
        }

        let claimed = self.state.send_if_modified(|s| {
            if s.is_active() {
                false
            } else {
                *s = SessionState::Sweeping;
                true
            }
        });
        if !claimed {
            return Err(ScanError::ScanInProgress);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session {
            probe: self.probe.clone(),
            concurrency: self.config.effective_concurrency(),
            state: StateGuard(self.state.clone()),
            events: tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(session.run(range.to_string()));

        Ok(ScanHandle {
            events: rx,
            cancel,
            task,
        })
    }
}

/// Caller's end of a running session.
pub struct ScanHandle {
    events: mpsc::UnboundedReceiver<ScanEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Vec<DeviceRecord>>,
}

impl ScanHandle {
    /// Next event, or `None` once the session has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Stop starting new hosts. Probes already running are allowed to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session and return its final records, in discovery order.
    pub async fn finish(self) -> anyhow::Result<Vec<DeviceRecord>> {
        self.task.await.context("scan session task failed")
    }

    /// Drain every event, then return them with the final records.
    pub async fn collect(mut self) -> anyhow::Result<(Vec<ScanEvent>, Vec<DeviceRecord>)> {
        let mut events = Vec::new();
        while let Some(ev) = self.events.recv().await {
            events.push(ev);
        }
        let records = self.finish().await?;
        Ok((events, records))
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<ScanEvent>,
        CancellationToken,
        JoinHandle<Vec<DeviceRecord>>,
    ) {
        (self.events, self.cancel, self.task)
    }
}

/// Releases the controller if a session task ends without reaching a terminal state.
struct StateGuard(Arc<watch::Sender<SessionState>>);

impl StateGuard {
    fn set(&self, next: SessionState) {
        info!(state = ?next, "session state");
        self.0.send_replace(next);
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| {
            if s.is_active() {
                *s = SessionState::Completed;
                true
            } else {
                false
            }
        });
    }
}

struct Session {
    probe: Arc<dyn ProbeAdapter>,
    concurrency: usize,
    state: StateGuard,
    events: mpsc::UnboundedSender<ScanEvent>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self, range: String) -> Vec<DeviceRecord> {
        let start = Instant::now();
        let started_at = now_rfc3339();
        info!(range = %range, concurrency = self.concurrency, "scan started");

        let discovered =
            discovery::discover_with_cancel(self.probe.as_ref(), &range, &self.cancel).await;
        let devices = match discovered {
            Ok(devices) => devices,
            Err(e) => {
                error!(range = %range, error = %e, "discovery failed");
                self.emit(ScanEvent::Failed { error: e });
                self.state.set(SessionState::Completed);
                return Vec::new();
            }
        };

        let mut records: Vec<DeviceRecord> =
            devices.into_iter().map(DeviceRecord::pending).collect();
        info!(devices = records.len(), "discovery complete");
        self.emit(ScanEvent::Discovered {
            records: records.clone(),
        });

        let resolved = if self.cancel.is_cancelled() {
            0
        } else {
            self.state.set(SessionState::Resolving);
            self.resolve_all(&mut records).await
        };

        let cancelled = self.cancel.is_cancelled();
        let summary = ScanSummary {
            device_count: records.len(),
            resolved_count: resolved,
            elapsed_secs: start.elapsed().as_secs_f64(),
            cancelled,
            started_at,
        };
        info!(
            devices = summary.device_count,
            resolved = summary.resolved_count,
            elapsed_secs = summary.elapsed_secs,
            cancelled,
            "scan finished"
        );
        // The terminal event goes out before the state leaves Sweeping/Resolving.
        self.emit(ScanEvent::Completed { summary });
        self.state.set(if cancelled {
            SessionState::Cancelled
        } else {
            SessionState::Completed
        });
        records
    }

    /// Fingerprint every record with at most `concurrency` probes in flight.
    ///
    /// Hosts are started in discovery order and cancellation is checked before each
    /// start. Returns the number of updates emitted.
    async fn resolve_all(&self, records: &mut [DeviceRecord]) -> usize {
        let mut pending = records
            .iter()
            .map(|r| r.device.address.clone())
            .enumerate()
            .collect::<Vec<_>>()
            .into_iter();
        let mut set = JoinSet::new();
        let mut resolved = 0usize;

        loop {
            while set.len() < self.concurrency && !self.cancel.is_cancelled() {
                let Some((index, address)) = pending.next() else {
                    break;
                };
                let probe = self.probe.clone();
                set.spawn(async move {
                    let fingerprint = fingerprint::resolve(probe.as_ref(), &address).await;
                    (index, fingerprint)
                });
            }

            let Some(joined) = set.join_next().await else {
                break;
            };
            match joined {
                Ok((index, fingerprint)) => {
                    records[index].fingerprint = fingerprint.clone();
                    resolved += 1;
                    self.emit(ScanEvent::FingerprintUpdated { index, fingerprint });
                }
                Err(e) => warn!(error = %e, "fingerprint task did not complete"),
            }
        }
        resolved
    }

    fn emit(&self, event: ScanEvent) {
        // A consumer that stopped listening does not stop the session.
        let _ = self.events.send(event);
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
