use tracing::warn;

use crate::probe::ProbeAdapter;
use crate::types::{FingerprintMatch, UNKNOWN};

/// Highest-confidence match; on ties the earliest one wins.
pub fn best_match(matches: &[FingerprintMatch]) -> Option<&FingerprintMatch> {
    matches
        .iter()
        .reduce(|best, m| if m.confidence > best.confidence { m } else { best })
}

/// Display form of a match, e.g. `Linux 4.x (90% accurate)`.
pub fn format_match(m: &FingerprintMatch) -> String {
    format!("{} ({}% accurate)", m.os_name, m.confidence)
}

/// Fingerprint one host and return its display string.
///
/// Returns `"Unknown"` when the probe has no candidates or fails; a failure here is
/// never propagated.
pub async fn resolve(probe: &dyn ProbeAdapter, address: &str) -> String {
    match probe.fingerprint_os(address).await {
        Ok(matches) => best_match(&matches)
            .map(format_match)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        Err(e) => {
            warn!(address, error = %e, "OS fingerprint failed");
            UNKNOWN.to_string()
        }
    }
}
