use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use recordvault_core::vault::{RecordStore, VaultLayout};

use crate::{PasswordOptions, get_new_password};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory of the new principal
    pub dir: PathBuf,
}

#[instrument(level = "info", name = "cmd::signup", skip_all, fields(dir = %args.dir.display()))]
pub fn execute(args: &Args, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<()> {
    let password = get_new_password(password_opts)?;

    let mut store = RecordStore::new(&args.dir, layout);
    store
        .sign_up(&password)
        .with_context(|| format!("Failed to create principal at {}", args.dir.display()))?;

    println!("Created principal at: {}", args.dir.display());
    Ok(())
}
