mod common;

use common::MockProbe;
use lan_fingerprint_rs::fingerprint::resolve;
use lan_fingerprint_rs::types::UNKNOWN;
use lan_fingerprint_rs::ScanError;

#[tokio::test]
async fn highest_confidence_wins() {
    let probe = MockProbe::new(Vec::new()).os("10.0.0.5", Ok(vec![("Linux 5.x", 85), ("Linux 4.x", 90)]));
    assert_eq!(resolve(&probe, "10.0.0.5").await, "Linux 4.x (90% accurate)");
}

#[tokio::test]
async fn no_candidates_is_unknown() {
    let probe = MockProbe::new(Vec::new()).os("10.0.0.5", Ok(vec![]));
    assert_eq!(resolve(&probe, "10.0.0.5").await, UNKNOWN);
}

#[tokio::test]
async fn probe_failure_is_contained() {
    let probe = MockProbe::new(Vec::new())
        .os("10.0.0.5", Err(ScanError::ProbeFailed("requires root privileges".into())));
    assert_eq!(resolve(&probe, "10.0.0.5").await, UNKNOWN);
}

#[tokio::test]
async fn resolve_is_deterministic() {
    let probe = MockProbe::new(Vec::new()).os(
        "10.0.0.7",
        Ok(vec![("OpenBSD 7", 88), ("FreeBSD 13", 88), ("NetBSD 9", 60)]),
    );
    let first = resolve(&probe, "10.0.0.7").await;
    let second = resolve(&probe, "10.0.0.7").await;
    assert_eq!(first, second);
    assert_eq!(first, "OpenBSD 7 (88% accurate)");
}
