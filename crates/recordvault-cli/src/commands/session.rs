use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Args as ClapArgs, Subcommand};
use tracing::{instrument, warn};

use recordvault_core::session::{SessionClaims, Sessions, TokenCodec};
use recordvault_core::vault::VaultLayout;

use super::cat::UnreadableRecord;
use crate::config::Config;
use crate::{PasswordOptions, unlock_store};

#[derive(ClapArgs)]
pub struct Args {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Sign session claims into a token
    Issue(IssueArgs),

    /// Print a token's payload from stdin without checking its signature
    Inspect,

    /// Verify a token from stdin and print its claims
    Verify(VerifyArgs),
}

#[derive(ClapArgs)]
pub struct KeyArgs {
    /// Signing key as hex
    #[arg(long, env = "RECORDVAULT_SESSION_KEY", hide_env_values = true)]
    pub key_hex: String,
}

impl KeyArgs {
    fn key(&self) -> Result<Vec<u8>> {
        hex::decode(self.key_hex.trim()).context("Signing key is not valid hex")
    }
}

#[derive(ClapArgs)]
pub struct IssueArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Principal id
    #[arg(long)]
    pub id: u64,

    /// Principal email
    #[arg(long)]
    pub email: String,

    /// Secondary credential to seal under the principal's keys
    #[arg(long, requires = "seal_with")]
    pub credential: Option<String>,

    /// Principal directory whose keys seal the credential
    #[arg(long, value_name = "DIR", requires = "credential")]
    pub seal_with: Option<PathBuf>,

    /// Print a Set-Cookie value instead of the bare token
    #[arg(long)]
    pub cookie: bool,
}

#[derive(ClapArgs)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Treat stdin as a Cookie request header
    #[arg(long)]
    pub cookie: bool,

    /// Open the sealed credential with this principal's keys
    #[arg(long, value_name = "DIR")]
    pub open_with: Option<PathBuf>,
}

pub fn execute(args: &Args, config: &Config, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<()> {
    match &args.command {
        SessionCommand::Issue(issue_args) => issue(issue_args, config, layout, password_opts),
        SessionCommand::Inspect => inspect(),
        SessionCommand::Verify(verify_args) => verify(verify_args, config, layout, password_opts),
    }
}

#[instrument(level = "info", name = "cmd::session::issue", skip_all, fields(id = args.id))]
fn issue(args: &IssueArgs, config: &Config, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<()> {
    let sealed_credential = match (&args.credential, &args.seal_with) {
        (Some(credential), Some(dir)) => {
            let store = unlock_store(dir, layout, password_opts)?;
            let sealed = store.cryptor()?.seal(credential.as_bytes())?;
            Some(STANDARD.encode(sealed))
        }
        _ => None,
    };

    let claims = SessionClaims {
        id: args.id,
        email: args.email.clone(),
        sealed_credential,
    };

    let sessions = Sessions::new(config.session.clone(), &args.key.key()?)?;
    if args.cookie {
        println!("{}", sessions.issue_cookie(&claims)?);
    } else {
        println!("{}", sessions.codec().issue(&claims)?);
    }
    Ok(())
}

#[instrument(level = "info", name = "cmd::session::inspect", skip_all)]
fn inspect() -> Result<()> {
    let token = read_stdin()?;
    let payload = TokenCodec::decode_unverified(&token).context("Failed to decode token")?;
    warn!("Printing an unverified payload, do not trust its contents");
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[instrument(level = "info", name = "cmd::session::verify", skip_all)]
fn verify(args: &VerifyArgs, config: &Config, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<()> {
    let input = read_stdin()?;
    let sessions = Sessions::new(config.session.clone(), &args.key.key()?)?;

    let claims: SessionClaims = if args.cookie {
        sessions.verify_cookie_header(&input)?
    } else {
        sessions.codec().verify(&input)?
    };
    println!("{}", serde_json::to_string_pretty(&claims)?);

    if let Some(dir) = &args.open_with {
        let sealed = claims
            .sealed_credential
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Token carries no sealed credential"))?;
        let sealed = STANDARD.decode(sealed).context("Sealed credential is not valid base64")?;

        let store = unlock_store(dir, layout, password_opts)?;
        let credential = match store.cryptor()?.open(&sealed) {
            Ok(credential) => credential,
            Err(e) if e.is_integrity_violation() => {
                warn!("sealed credential failed integrity check, possible tampering");
                return Err(UnreadableRecord.into());
            }
            Err(e) => return Err(e.into()),
        };
        println!("{}", String::from_utf8_lossy(&credential));
    }
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}
