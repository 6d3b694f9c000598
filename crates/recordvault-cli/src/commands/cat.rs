use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use thiserror::Error;
use tracing::{instrument, warn};

use recordvault_core::error::StoreError;
use recordvault_core::fs::record::UNREADABLE_MESSAGE;
use recordvault_core::vault::RecordStore;

/// A record failed authentication or padding checks.
///
/// Carries no detail so the output is identical for every kind of damage.
#[derive(Error, Debug)]
#[error("{}", UNREADABLE_MESSAGE)]
pub struct UnreadableRecord;

#[derive(ClapArgs)]
pub struct Args {
    /// Record name, relative to the principal's data directory
    pub name: String,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(name = %args.name))]
pub fn execute(store: &RecordStore, args: &Args) -> Result<()> {
    let content = match store.load(&args.name) {
        Ok(content) => content,
        Err(StoreError::Record(ref e)) if e.is_integrity_violation() => {
            warn!(name = %args.name, "record failed integrity check, possible tampering");
            return Err(UnreadableRecord.into());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read record '{}'", args.name)),
    };

    io::stdout().write_all(&content)?;
    Ok(())
}
