use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use recordvault_core::vault::VaultLayout;

use crate::{PasswordOptions, auth, unlock_store};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Principal directory
    pub dir: PathBuf,

    /// New password (insecure, prefer the prompt or RECORDVAULT_NEW_PASSWORD)
    #[arg(long, env = "RECORDVAULT_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: Option<String>,
}

#[instrument(level = "info", name = "cmd::passwd", skip_all, fields(dir = %args.dir.display()))]
pub fn execute(args: &Args, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<()> {
    let mut store = unlock_store(&args.dir, layout, password_opts)?;

    let new_password = match &args.new_password {
        Some(password) => password.clone(),
        None => auth::prompt_new_password("New password: ")?,
    };
    if new_password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    store
        .change_password(&new_password)
        .context("Failed to change password")?;

    println!("Password changed for: {}", args.dir.display());
    Ok(())
}
