use std::fs::File;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use planetviz::{Cli, LifecycleManager, TerminalHost};

/// Logs go to `--log-file` when given; the terminal itself is busy drawing.
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::sink).init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let mut host = TerminalHost::new(cli.fps);
    let handle = LifecycleManager::mount(&mut host, cli.mount_config())
        .context("failed to start the visualization")?;

    let outcome = loop {
        match handle.run_frame() {
            Ok(true) if !host.quit_requested() => {}
            Ok(_) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    handle.dispose();
    info!(ticks = handle.ticks(), "exiting");

    outcome.context("frame loop failed")
}
