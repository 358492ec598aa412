//! Running nmap and reading its XML report (`-oX -`).

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::targets;
use crate::types::{Device, FingerprintMatch};

/// One `<host>` element of an nmap report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NmapHost {
    pub address: String,
    pub mac: Option<String>,
    pub up: bool,
    /// `<osmatch>` entries in document order.
    pub os_matches: Vec<FingerprintMatch>,
}

/// Arguments for a host-discovery sweep without port scanning.
pub fn sweep_args(range: &str, probe_timeout: Duration) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-sn".into(),
        "-n".into(),
        "--max-rtt-timeout".into(),
        format!("{}ms", probe_timeout.as_millis().max(1)),
    ];
    if targets::is_ipv6(range) {
        args.push("-6".into());
    }
    args.extend(["-oX".into(), "-".into(), range.into()]);
    args
}

/// Arguments for aggressive OS detection against a single address.
pub fn fingerprint_args(address: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-O".into(),
        "--osscan-guess".into(),
        "--fuzzy".into(),
        "-n".into(),
    ];
    if targets::is_ipv6(address) {
        args.push("-6".into());
    }
    args.extend(["-oX".into(), "-".into(), address.into()]);
    args
}

/// Run nmap with `args` and return its stdout, killing the process once `deadline` passes.
pub async fn run_xml(nmap: &Path, args: &[String], deadline: Duration) -> Result<String> {
    debug!(nmap = %nmap.display(), ?args, "launching nmap");
    let mut cmd = Command::new(nmap);
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    let output = time::timeout(deadline, cmd.output())
        .await
        .map_err(|_| anyhow!("nmap did not finish within {}s", deadline.as_secs()))?
        .with_context(|| format!("failed to launch {}", nmap.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        bail!("nmap exited with {}: {}", output.status, reason.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse every `<host>` of an nmap XML report.
pub fn parse_hosts(xml: &str) -> Result<Vec<NmapHost>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut hosts = Vec::new();
    let mut current: Option<NmapHost> = None;
    let mut status_seen = false;
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                handle_element(&e, &mut current, &mut status_seen, &mut saw_root)?
            }
            Ok(Event::Empty(e)) => {
                handle_element(&e, &mut current, &mut status_seen, &mut saw_root)?
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"host" {
                    if let Some(mut host) = current.take() {
                        if !status_seen {
                            host.up = true;
                        }
                        if !host.address.is_empty() {
                            hosts.push(host);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "malformed nmap XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        bail!("output is not an nmap XML report");
    }
    Ok(hosts)
}

fn handle_element(
    e: &BytesStart<'_>,
    current: &mut Option<NmapHost>,
    status_seen: &mut bool,
    saw_root: &mut bool,
) -> Result<()> {
    match e.name().as_ref() {
        b"nmaprun" => *saw_root = true,
        b"host" => {
            *current = Some(NmapHost::default());
            *status_seen = false;
        }
        b"finished" => {
            if attr(e, b"exit").as_deref() == Some("error") {
                let msg = attr(e, b"errormsg").unwrap_or_default();
                bail!("nmap reported an error: {msg}");
            }
        }
        name => {
            let Some(host) = current.as_mut() else {
                return Ok(());
            };
            match name {
                b"status" => {
                    *status_seen = true;
                    host.up = attr(e, b"state").as_deref() == Some("up");
                }
                b"address" => {
                    let addr = attr(e, b"addr").unwrap_or_default();
                    match attr(e, b"addrtype").as_deref() {
                        Some("mac") => host.mac = Some(addr),
                        Some("ipv4") | Some("ipv6") if host.address.is_empty() => {
                            host.address = addr
                        }
                        _ => {}
                    }
                }
                b"osmatch" => {
                    if let Some(os_name) = attr(e, b"name") {
                        host.os_matches
                            .push(FingerprintMatch::new(os_name, parse_accuracy(attr(e, b"accuracy"))));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_accuracy(raw: Option<String>) -> u8 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .map(|n| n.min(100) as u8)
        .unwrap_or(0)
}

/// Live hosts of a sweep report as devices; hardware address is empty when nmap had none.
pub fn sweep_devices(xml: &str) -> Result<Vec<Device>> {
    Ok(parse_hosts(xml)?
        .into_iter()
        .filter(|h| h.up)
        .map(|h| Device::new(h.address, h.mac.unwrap_or_default()))
        .collect())
}

/// OS matches reported for `address`, or for the only host when the report has one.
pub fn os_matches_for(xml: &str, address: &str) -> Result<Vec<FingerprintMatch>> {
    let mut hosts = parse_hosts(xml)?;
    if let Some(pos) = hosts.iter().position(|h| h.address == address) {
        return Ok(hosts.swap_remove(pos).os_matches);
    }
    if hosts.len() == 1 {
        return Ok(hosts.remove(0).os_matches);
    }
    Ok(Vec::new())
}
