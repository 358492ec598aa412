//! Library crate for lan-fingerprint-rs: LAN host discovery, MAC fallback resolution and
//! OS fingerprinting driven as a single asynchronous scan session.
pub mod arp;
pub mod config;
pub mod discovery;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod logging;
pub mod nmap;
pub mod probe;
pub mod server;
pub mod session;
pub mod table;
pub mod targets;
pub mod types;

pub use error::ScanError;
pub use probe::{NmapProbe, ProbeAdapter};
pub use session::{ScanController, ScanEvent, ScanHandle, SessionState};
