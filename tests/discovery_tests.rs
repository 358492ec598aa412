mod common;

use common::{devices, MockProbe};
use lan_fingerprint_rs::discovery::{discover, discover_with_cancel};
use lan_fingerprint_rs::types::{Device, UNKNOWN};
use lan_fingerprint_rs::ScanError;
use std::collections::HashSet;

#[tokio::test]
async fn fallback_fills_missing_mac() {
    let probe = MockProbe::new(devices(&[("10.0.0.5", "")])).mac("10.0.0.5", Ok("aa:bb:cc:dd:ee:ff"));
    let out = discover(&probe, "10.0.0.0/24").await.unwrap();
    assert_eq!(out, vec![Device::new("10.0.0.5", "aa:bb:cc:dd:ee:ff")]);
}

#[tokio::test]
async fn addresses_are_unique_in_first_seen_order() {
    let probe = MockProbe::new(devices(&[
        ("10.0.0.9", "09:09:09:09:09:09"),
        ("10.0.0.2", "02:02:02:02:02:02"),
        ("10.0.0.9", "ff:ff:ff:ff:ff:ff"),
        ("10.0.0.4", "04:04:04:04:04:04"),
        ("10.0.0.2", "02:02:02:02:02:02"),
    ]));
    let out = discover(&probe, "10.0.0.0/24").await.unwrap();

    let addrs: Vec<&str> = out.iter().map(|d| d.address.as_str()).collect();
    assert_eq!(addrs, vec!["10.0.0.9", "10.0.0.2", "10.0.0.4"]);
    assert_eq!(out[0].hardware_address, "09:09:09:09:09:09");
    let unique: HashSet<&str> = addrs.iter().copied().collect();
    assert_eq!(unique.len(), addrs.len());
}

#[tokio::test]
async fn hosts_with_mac_skip_fallback() {
    let probe = MockProbe::new(devices(&[
        ("10.0.0.1", "01:01:01:01:01:01"),
        ("10.0.0.2", ""),
        ("10.0.0.3", UNKNOWN),
    ]));
    discover(&probe, "10.0.0.0/24").await.unwrap();
    assert_eq!(probe.mac_calls(), vec!["10.0.0.2", "10.0.0.3"]);
}

#[tokio::test]
async fn failed_fallback_records_unknown_and_keeps_other_hosts() {
    let probe = MockProbe::new(devices(&[("10.0.0.1", ""), ("10.0.0.2", ""), ("10.0.0.3", "")]))
        .mac("10.0.0.1", Ok("11:11:11:11:11:11"))
        .mac("10.0.0.2", Err(ScanError::ProbeFailed("socket closed".into())))
        .mac("10.0.0.3", Ok(""));
    let out = discover(&probe, "10.0.0.0/24").await.unwrap();

    assert_eq!(
        out,
        vec![
            Device::new("10.0.0.1", "11:11:11:11:11:11"),
            Device::new("10.0.0.2", UNKNOWN),
            Device::new("10.0.0.3", UNKNOWN),
        ]
    );
    assert!(out.iter().all(|d| !d.hardware_address.is_empty()));
}

#[tokio::test]
async fn silent_network_is_an_empty_list() {
    let probe = MockProbe::new(Vec::new());
    let out = discover(&probe, "10.0.0.0/24").await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn sweep_failure_is_surfaced() {
    let probe = MockProbe::failing_sweep(ScanError::NetworkUnavailable("no interface".into()));
    let err = discover(&probe, "10.0.0.0/24").await.unwrap_err();
    assert_eq!(err, ScanError::NetworkUnavailable("no interface".into()));
}

#[tokio::test]
async fn cancelled_discovery_skips_fallback() {
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let probe = MockProbe::new(devices(&[("10.0.0.5", ""), ("10.0.0.6", "66:66:66:66:66:66")]))
        .mac("10.0.0.5", Ok("aa:bb:cc:dd:ee:ff"));
    let out = discover_with_cancel(&probe, "10.0.0.0/24", &token).await.unwrap();

    assert!(probe.mac_calls().is_empty());
    assert_eq!(
        out,
        vec![
            Device::new("10.0.0.5", UNKNOWN),
            Device::new("10.0.0.6", "66:66:66:66:66:66"),
        ]
    );
}
