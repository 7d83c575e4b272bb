//! lpr_dashboard - web view of recorded plates
//!
//! Serves the dashboard against the capture database until Ctrl-C. Never writes
//! to the database.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use openparking_lpr::dashboard::{DashboardConfig, DashboardServer};
use openparking_lpr::LprConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the license plate dashboard")]
struct Args {
    /// Config file (.toml or .json). Falls back to LPR_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one.
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = LprConfig::load(args.config.as_deref()).context("load configuration")?;

    let dashboard_config = DashboardConfig {
        addr: args.addr.unwrap_or(cfg.dashboard.addr),
        db_path: cfg.db_path.clone(),
        page_size: cfg.dashboard.page_size,
    };
    let handle = DashboardServer::new(dashboard_config).spawn()?;
    log::info!("dashboard listening on http://{}", handle.addr);
    log::info!("lpr_dashboard running. serving {}", cfg.db_path);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install Ctrl-C handler")?;

    let _ = rx.recv();
    log::info!("shutdown signal received, stopping dashboard...");
    handle.stop()?;
    Ok(())
}
