//! exaudio - audio device port process
//!
//! Runs under a controlling VM, reading command tuples on stdin and writing
//! replies on stdout. Logs go to stderr.

mod command;
mod config;
mod logging;
mod parent;
mod port;

use anyhow::Result;
use clap::Parser;
use exaudio_discovery::{AudioBackend, DeviceManager, DirectoryStatus, FixedBackend, ScanReport};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{BackendKind, Config};
use crate::logging::LogControl;
use crate::parent::ParentWatch;
use crate::port::Port;

#[derive(Parser, Debug)]
#[command(name = "exaudio")]
#[command(about = "Audio device directory and stream port for a controlling VM")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "exaudio.toml")]
    config: PathBuf,

    /// Log filter (trace, debug, info, warn, error or tracing directives)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Audio backend, overriding the configuration file
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    /// Run a single scan, print the directory as JSON and exit
    #[arg(long)]
    scan_once: bool,
}

#[derive(Serialize)]
struct ScanOnce<'a> {
    scan: &'a ScanReport,
    status: DirectoryStatus,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // the level from the config file replaces this one once it is read
    let mut log = LogControl::install(args.log_level.as_deref().unwrap_or("info"))?;
    info!("exaudio v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    match &args.log_level {
        Some(level) => config.daemon.log_level = level.clone(),
        None => log.set_directive(&config.daemon.log_level)?,
    }
    if let Some(kind) = args.backend {
        config.backend.kind = kind;
    }
    info!(
        path = %args.config.display(),
        backend = ?config.backend.kind,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(start(&config, args.scan_once, log));
    // stdin may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn start(config: &Config, scan_once: bool, log: LogControl) -> Result<()> {
    match config.backend.kind {
        #[cfg(feature = "cpal")]
        BackendKind::Cpal => {
            let backend = match &config.backend.host {
                Some(name) => exaudio_discovery::CpalBackend::from_host_name(name)?,
                None => exaudio_discovery::CpalBackend::new(),
            };
            run(backend, config, scan_once, log).await
        }
        #[cfg(not(feature = "cpal"))]
        BackendKind::Cpal => anyhow::bail!("built without cpal support, use --backend static"),
        BackendKind::Static => {
            let backend = FixedBackend::new(config.backend.static_enumeration());
            run(backend, config, scan_once, log).await
        }
    }
}

async fn run<B: AudioBackend>(
    backend: B,
    config: &Config,
    scan_once: bool,
    log: LogControl,
) -> Result<()> {
    let parent = match config.daemon.parent_check_interval_ms {
        0 => ParentWatch::disabled(),
        _ => ParentWatch::current(),
    };
    let mut manager = DeviceManager::new(backend);

    if scan_once {
        info!("Running single scan");
        let scan = manager.scan()?;
        let output = ScanOnce {
            scan: &scan,
            status: manager.status(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        manager.shutdown();
        return Ok(());
    }

    if config.daemon.scan_on_startup {
        if let Err(e) = manager.scan() {
            warn!(error = %e, "startup scan failed");
        }
    }

    let mut port = Port::new(tokio::io::stdin(), tokio::io::stdout(), manager, log)
        .with_parent(parent)
        .with_check_interval(Duration::from_millis(
            config.daemon.parent_check_interval_ms,
        ));
    let reason = port.run().await?;
    info!(reason = ?reason, "exaudio stopped");
    Ok(())
}
