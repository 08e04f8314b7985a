#![deny(missing_docs)]
//! # Fix publisher
//! Streams position fixes from a u-blox receiver to stdout as JSON lines.
mod config;
mod publish;
mod store;

use std::io;

use env_logger::Env;
use thiserror::Error;
use ublox_fix::{AcquisitionLoop, FixError, SerialTransport, Shutdown};

pub use config::PublisherCfg;
use publish::PublisherSink;
use store::FixStore;

#[derive(Error, Debug)]
/// Failures that stop the publisher
pub enum PublisherError {
    /// Acquisition failed
    #[error(transparent)]
    Fix(#[from] FixError),
    /// Configuration or store file access failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The configuration file could not be (de)serialized
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The Ctrl-C handler could not be installed
    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli: PublisherCfg = argh::from_env();
    if let Err(e) = run(cli) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: PublisherCfg) -> Result<(), PublisherError> {
    let save_config = cli.save_config;
    let cfg = if cli.load_config {
        match PublisherCfg::load_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Could not load saved configuration, using command line: {e}");
                cli
            }
        }
    } else {
        cli
    };
    if save_config {
        let path = cfg.store_default()?;
        log::info!("Saved configuration to {path:?}");
    }

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger())?;
    }

    let store = match &cfg.save_dir {
        Some(dir) => Some(FixStore::new(dir.clone(), cfg.compress)?),
        None => None,
    };
    let sink = PublisherSink::new(io::stdout(), store);
    let mut acq = AcquisitionLoop::connect(
        || SerialTransport::open(&cfg.serial_port, cfg.baud_rate),
        sink,
        shutdown,
        cfg.acquisition(),
    )?;
    let stats = acq.run()?;
    log::info!(
        "Published {} fixes ({} malformed, {} other sentences, {} empty reads)",
        stats.fixes,
        stats.malformed,
        stats.ignored,
        stats.timeouts
    );
    Ok(())
}
