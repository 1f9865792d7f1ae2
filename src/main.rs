use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, WriteLogger};

use pagebridge::settings::{self, Settings};

/// Shows a document, one page at a time, in a Kitty-graphics terminal
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Document to open
    file: PathBuf,
}

fn init_logging(settings: &Settings) -> Result<()> {
    let path = settings::log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    WriteLogger::init(
        settings.log_level.to_filter(),
        Config::default(),
        File::create(&path).with_context(|| format!("creating log file {}", path.display()))?,
    )?;
    Ok(())
}

#[cfg(feature = "pdf")]
fn run(args: &Args, settings: &Settings) -> Result<()> {
    use pagebridge::engine::MupdfEngine;
    use pagebridge::panic_handler::initialize_panic_handler;
    use pagebridge::{DocumentSession, EventDispatcher, KittyBridge};

    // The terminal is only taken over once the document is known to open.
    let session = DocumentSession::open(MupdfEngine, args.file.clone())?;

    initialize_panic_handler();
    let bridge = KittyBridge::connect(settings.density).context("connecting to the terminal")?;

    let mut dispatcher = EventDispatcher::new(session, bridge, settings.fit_mode);
    dispatcher.start();
    dispatcher.run()?;
    Ok(())
}

#[cfg(not(feature = "pdf"))]
fn run(_args: &Args, _settings: &Settings) -> Result<()> {
    anyhow::bail!("built without a document engine; enable the `pdf` feature")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load();

    // Logging failures are not fatal, there is just no log.
    if let Err(e) = init_logging(&settings) {
        eprintln!("pagebridge: logging disabled: {e:#}");
    }

    info!(
        "Starting pagebridge on {} ({} fit)",
        args.file.display(),
        settings.fit_mode.as_str()
    );

    let result = run(&args, &settings);
    if let Err(e) = &result {
        error!("Fatal: {e:#}");
    }
    info!("Shutting down pagebridge");
    result
}
