//! Direct ARP request/reply for a single IPv4 host over a raw datalink channel.

use anyhow::{bail, Context, Result};
use pnet::datalink::{self, Channel, Config, MacAddr, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::debug;

const ETH_HDR_LEN: usize = 14;
const ARP_LEN: usize = 28;
/// Minimum Ethernet frame without FCS; the request is zero-padded to it.
const MIN_FRAME_LEN: usize = 60;

#[derive(Debug, Clone)]
pub struct ArpResolver {
    interface: Option<String>,
    timeout: Duration,
}

impl ArpResolver {
    pub fn new(interface: Option<String>, timeout: Duration) -> Self {
        Self { interface, timeout }
    }

    /// Send one ARP request for `target` and wait for its reply.
    ///
    /// Blocks for up to the configured timeout. `Ok(None)` means nobody answered;
    /// errors are reserved for interface or channel problems.
    pub fn resolve(&self, target: Ipv4Addr) -> Result<Option<MacAddr>> {
        let (iface, src_mac, src_ip) =
            select_interface(self.interface.as_deref(), target, datalink::interfaces())?;
        debug!(interface = %iface.name, %target, "sending ARP request");

        let config = Config {
            read_timeout: Some(Duration::from_millis(100)),
            ..Config::default()
        };
        let (mut tx, mut rx) = match datalink::channel(&iface, config)
            .with_context(|| format!("opening datalink channel on {}", iface.name))?
        {
            Channel::Ethernet(tx, rx) => (tx, rx),
            _ => bail!("non-ethernet channel for {}", iface.name),
        };

        let frame = build_request(src_mac, src_ip, target)?;
        match tx.send_to(&frame, None) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e).context("sending ARP request"),
            None => bail!("datalink sender on {} refused the frame", iface.name),
        }

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            match rx.next() {
                Ok(frame) => {
                    if let Some(mac) = parse_reply(frame, target) {
                        return Ok(Some(mac));
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(e).context("reading ARP reply"),
            }
        }
        Ok(None)
    }
}

/// Pick the interface to send from, with its MAC and the IPv4 source address to claim.
///
/// An explicitly named interface must exist and carry IPv4 and a MAC. Otherwise the
/// interface whose network contains `target` wins, then the first usable one.
fn select_interface(
    wanted: Option<&str>,
    target: Ipv4Addr,
    candidates: Vec<NetworkInterface>,
) -> Result<(NetworkInterface, MacAddr, Ipv4Addr)> {
    if let Some(name) = wanted {
        let iface = candidates
            .into_iter()
            .find(|i| i.name == name)
            .with_context(|| format!("interface {name} not found"))?;
        let mac = iface
            .mac
            .filter(|m| *m != MacAddr::zero())
            .with_context(|| format!("interface {name} has no MAC address"))?;
        let src = source_ipv4(&iface, target)
            .with_context(|| format!("interface {name} has no IPv4 address"))?;
        return Ok((iface, mac, src));
    }

    let usable: Vec<NetworkInterface> = candidates
        .into_iter()
        .filter(|i| i.is_up() && !i.is_loopback())
        .filter(|i| i.mac.is_some_and(|m| m != MacAddr::zero()))
        .filter(|i| source_ipv4(i, target).is_some())
        .collect();

    let chosen = usable
        .iter()
        .position(|i| on_link(i, target))
        .or(if usable.is_empty() { None } else { Some(0) });

    match chosen {
        Some(idx) => {
            let iface = usable[idx].clone();
            let mac = iface.mac.unwrap_or_else(MacAddr::zero);
            let src = source_ipv4(&iface, target).unwrap_or(Ipv4Addr::UNSPECIFIED);
            Ok((iface, mac, src))
        }
        None => bail!("no usable interface for ARP"),
    }
}

fn on_link(iface: &NetworkInterface, target: Ipv4Addr) -> bool {
    iface.ips.iter().any(|net| match net {
        IpNetwork::V4(v4) => v4.contains(target),
        IpNetwork::V6(_) => false,
    })
}

fn source_ipv4(iface: &NetworkInterface, target: Ipv4Addr) -> Option<Ipv4Addr> {
    let v4: Vec<_> = iface
        .ips
        .iter()
        .filter_map(|net| match net {
            IpNetwork::V4(v4) => Some(*v4),
            IpNetwork::V6(_) => None,
        })
        .collect();
    v4.iter()
        .find(|n| n.contains(target))
        .or_else(|| v4.first())
        .map(|n| n.ip())
}

/// Broadcast ARP "who-has `target`" frame.
pub fn build_request(src_mac: MacAddr, src_ip: Ipv4Addr, target: Ipv4Addr) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; MIN_FRAME_LEN];
    {
        let mut eth = MutableEthernetPacket::new(&mut buffer[..])
            .context("failed to create mutable Ethernet packet")?;
        eth.set_destination(MacAddr::broadcast());
        eth.set_source(src_mac);
        eth.set_ethertype(EtherTypes::Arp);
    }
    let mut arp = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN])
        .context("failed to create mutable ARP packet")?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(src_mac);
    arp.set_sender_proto_addr(src_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target);
    Ok(buffer)
}

/// Sender MAC of an ARP reply coming from `target`, if `frame` is one.
pub fn parse_reply(frame: &[u8], target: Ipv4Addr) -> Option<MacAddr> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply || arp.get_sender_proto_addr() != target {
        return None;
    }
    Some(arp.get_sender_hw_addr())
}
