mod scenario;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::scenario::Scenario;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: adview-sim <scenario.json>");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = PathBuf::from(&args[1]);
    let data = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let scenario = Scenario::from_json(&data)?;
    tracing::info!(steps = scenario.steps.len(), "replaying {}", path.display());

    let lines = scenario::run(&scenario)?;
    let mut out = std::io::stdout().lock();
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}
