use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use recordvault_core::vault::RecordStore;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Record name, relative to the principal's data directory
    pub name: String,

    /// Read the record from this file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,
}

#[instrument(level = "info", name = "cmd::write", skip_all, fields(name = %args.name))]
pub fn execute(store: &RecordStore, args: &Args) -> Result<()> {
    let content = match &args.input {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?
        }
        None => {
            let mut content = Vec::new();
            io::stdin()
                .read_to_end(&mut content)
                .context("Failed to read record from stdin")?;
            content
        }
    };

    store
        .save(&args.name, &content)
        .with_context(|| format!("Failed to write record '{}'", args.name))?;

    info!(bytes = content.len(), "record written");
    Ok(())
}
