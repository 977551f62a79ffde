//! screenshot-all-layouts - Screenshot every OSK layout
//!
//! Needs phoc, swaybg, grim and montage (from ImageMagick) in $PATH.

use clap::Parser;
use log::{error, info};
use osk_layout_tools::args::ScreenshotArgs;
use osk_layout_tools::{driver, logging, DriverOptions, RunOutcome};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::task;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ScreenshotArgs::parse();
    logging::init(args.verbose);

    info!("screenshot-all-layouts v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let options = DriverOptions::new(&args, &config);
    let running = Arc::new(AtomicBool::new(true));

    let signal_running = running.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Exiting…");
            signal_running.store(false, Ordering::Relaxed);
        }
    });

    let run_flag = running.clone();
    let result = task::spawn_blocking(move || driver::run(&options, &run_flag)).await;

    match result {
        Ok(Ok(RunOutcome::Completed { screenshots, overview })) => {
            match overview {
                Some(path) => info!("Captured {} layouts, overview at {}", screenshots, path.display()),
                None => info!("Captured {} layouts", screenshots),
            }
            ExitCode::SUCCESS
        }
        Ok(Ok(RunOutcome::Interrupted { screenshots })) => {
            info!("Interrupted after {} layouts", screenshots);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Screenshot task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
