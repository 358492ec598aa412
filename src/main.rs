use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lan_fingerprint_rs::config::{ProbeConfig, SessionConfig};
use lan_fingerprint_rs::logging::{self, LogConfig, LogFormat};
use lan_fingerprint_rs::table::{Column, ResultTable};
use lan_fingerprint_rs::{export, server, targets};
use lan_fingerprint_rs::{NmapProbe, ScanController, ScanEvent};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

/// lan-fingerprint-rs — discover live LAN hosts, resolve their MAC addresses and guess their OS.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-fingerprint-rs",
    version,
    about = "Discover live LAN hosts, resolve their MAC addresses and guess their OS.",
    long_about = None
)]
struct Cli {
    /// CIDR (e.g., 192.168.1.0/24), single host, or nmap octet range. If omitted, auto-detect local /24.
    #[arg(long)]
    range: Option<String>,

    /// Interface used for fallback ARP lookups. Defaults to the one on the target's network.
    #[arg(long)]
    interface: Option<String>,

    /// nmap executable.
    #[arg(long, default_value = "nmap")]
    nmap: PathBuf,

    /// Per-probe reply timeout in milliseconds (sweep RTT bound and ARP fallback).
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Upper bound for the whole discovery sweep, in seconds.
    #[arg(long = "sweep-deadline-secs", default_value_t = 120)]
    sweep_deadline_secs: u64,

    /// Upper bound for one host's OS fingerprint, in seconds.
    #[arg(long = "fingerprint-deadline-secs", default_value_t = 120)]
    fingerprint_deadline_secs: u64,

    /// Max concurrent OS fingerprint probes.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Write results to this path; `.json` writes JSON, anything else CSV.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI instead of running a single scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the HTTP UI.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory with the static UI files.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,

    /// Log filter directive, overridden by RUST_LOG.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Log output: pretty, compact or json.
    #[arg(long = "log-format", default_value = "compact")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&LogConfig {
        level: cli.log_level.clone(),
        format: cli.log_format,
    })?;

    let probe_config = ProbeConfig {
        nmap_path: cli.nmap.clone(),
        probe_timeout: Duration::from_millis(cli.timeout_ms),
        sweep_deadline: Duration::from_secs(cli.sweep_deadline_secs),
        fingerprint_deadline: Duration::from_secs(cli.fingerprint_deadline_secs),
        interface: cli.interface.clone(),
    };
    let controller = Arc::new(ScanController::new(
        Arc::new(NmapProbe::new(probe_config)),
        SessionConfig::with_concurrency(cli.concurrency),
    ));

    if cli.serve_ui {
        let state = server::AppState::new(controller);
        let bind = cli.bind.clone();
        let ui_dir = cli.ui_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, state, ui_dir).await {
                tracing::error!("HTTP UI server error: {e:#}");
            }
        });
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
        let _ = tokio::signal::ctrl_c().await;
        return Ok(());
    }

    let range = match cli.range.clone() {
        Some(r) => r,
        None => default_range()?,
    };
    run_scan(&controller, &range, cli.output.as_deref()).await
}

/// First local IPv4 /24, used when no range was given.
fn default_range() -> Result<String> {
    let cidrs = targets::detect_local_cidrs().context("failed to detect local networks")?;
    if cidrs.len() > 1 {
        warn!(
            "several local networks detected ({}); scanning the first",
            cidrs
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    match cidrs.first() {
        Some(cidr) => Ok(cidr.to_string()),
        None => bail!("no local IPv4 network found; pass --range"),
    }
}

async fn run_scan(
    controller: &ScanController,
    range: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let mut handle = controller.start(range)?;
    println!("Scanning {range}…");

    // Ctrl-C stops starting new hosts
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel.cancel();
    });

    let mut table = ResultTable::default();
    table.begin(range);
    while let Some(event) = handle.next_event().await {
        match &event {
            ScanEvent::Discovered { records } => {
                println!("{} devices discovered, resolving OS…", records.len());
            }
            ScanEvent::FingerprintUpdated { index, fingerprint } => {
                if let Some(r) = table.records().get(*index) {
                    println!("  {:<15}  {}", r.device.address, fingerprint);
                }
            }
            ScanEvent::Completed { .. } | ScanEvent::Failed { .. } => {}
        }
        table.apply(&event);
    }
    handle.finish().await?;

    if let Some(err) = table.error() {
        bail!("{err}");
    }
    print_results_table(&table);

    if let Some(path) = output {
        if table.is_empty() {
            println!("Nothing to export.");
        } else {
            let format = export::export_to_path(path, table.records())?;
            info!(path = %path.display(), ?format, "results written");
            println!("Wrote results to {}", path.display());
        }
    }
    Ok(())
}

fn print_results_table(table: &ResultTable) {
    let widths: Vec<usize> = Column::ALL
        .iter()
        .map(|c| {
            table
                .records()
                .iter()
                .map(|r| c.cell(r).chars().count())
                .chain(std::iter::once(c.header().len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!();
    let header: Vec<String> = Column::ALL
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c.header(), w = *w))
        .collect();
    println!("{}", header.join("  "));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", rule.join("  "));
    for (_, r) in table.sorted(Column::Ip, false) {
        let row: Vec<String> = Column::ALL
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c.cell(r), w = *w))
            .collect();
        println!("{}", row.join("  "));
    }
    println!("\n{}", table.status_text());
}
