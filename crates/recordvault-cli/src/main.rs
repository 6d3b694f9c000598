#![deny(unsafe_code)]

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod auth;
mod commands;
mod config;
mod exit_code;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recordvault_core::crypto::KdfParams;
use recordvault_core::error::{KeyVaultError, RecordError, SaltError, SessionError, StoreError, TokenError};
use recordvault_core::vault::{RecordStore, VaultLayout};

use crate::commands::{cat, generate_keys, passwd, session, signup, write};
use crate::config::Config;

/// Password-protected record storage for a single principal
#[derive(Parser)]
#[command(name = "recordvault")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Create a principal
    recordvault signup ~/records/alice

    # Store a record (pipe password from secret manager)
    echo \"$SECRET\" | recordvault --password-stdin write ~/records/alice notes/today < today.txt

    # Read it back
    recordvault cat ~/records/alice notes/today

    # Sign a session token
    recordvault session issue --key-hex \"$KEY\" --id 7 --email alice@example.com
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (default: the user config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Use weak key derivation parameters (tests and local development only)
    #[arg(long, env = "RECORDVAULT_FAST_KDF", global = true)]
    fast_kdf: bool,

    /// Principal password (insecure, prefer --password-stdin or RECORDVAULT_PASSWORD)
    #[arg(long, env = "RECORDVAULT_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Read password from stdin (first line)
    #[arg(long, conflicts_with = "password", global = true)]
    password_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Password options extracted from CLI for principal operations
#[derive(Clone, Default)]
pub struct PasswordOptions {
    pub password: Option<String>,
    pub password_stdin: bool,
}

impl From<&Cli> for PasswordOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            password: cli.password.clone(),
            password_stdin: cli.password_stdin,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a principal and its key vault
    Signup(signup::Args),

    /// Write stdin to an encrypted record
    Write(PrincipalCommand<write::Args>),

    /// Decrypt a record to stdout
    Cat(PrincipalCommand<cat::Args>),

    /// Change a principal's password
    Passwd(passwd::Args),

    /// Issue, inspect and verify signed session tokens
    Session(session::Args),

    /// Print random 32-byte keys as hex
    GenerateKeys(generate_keys::Args),
}

/// Wrapper for commands that operate on an unlocked principal
#[derive(Parser, Clone)]
pub struct PrincipalCommand<T: clap::Args> {
    /// Principal directory
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub args: T,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = Config::load(cli.config.as_deref())?;
    let layout = vault_layout(&config, cli.fast_kdf);
    let password_opts = PasswordOptions::from(&cli);

    match cli.command {
        Commands::Signup(args) => signup::execute(&args, layout, &password_opts),
        Commands::Passwd(args) => passwd::execute(&args, layout, &password_opts),
        Commands::Session(args) => session::execute(&args, &config, layout, &password_opts),
        Commands::GenerateKeys(args) => generate_keys::execute(&args),

        Commands::Write(cmd) => execute_principal_command(&cmd, layout, &password_opts, write::execute),
        Commands::Cat(cmd) => execute_principal_command(&cmd, layout, &password_opts, cat::execute),
    }
}

fn vault_layout(config: &Config, fast_kdf: bool) -> VaultLayout {
    let kdf = if fast_kdf {
        tracing::warn!("Using weak key derivation parameters");
        KdfParams::fast()
    } else {
        config.kdf
    };
    VaultLayout::default().with_kdf(kdf)
}

/// Execute a command that requires an unlocked principal
fn execute_principal_command<T, F>(
    cmd: &PrincipalCommand<T>,
    layout: VaultLayout,
    password_opts: &PasswordOptions,
    f: F,
) -> Result<()>
where
    T: clap::Args,
    F: FnOnce(&RecordStore, &T) -> Result<()>,
{
    let store = unlock_store(&cmd.dir, layout, password_opts)?;
    f(&store, &cmd.args)
}

/// Log in to an existing principal
pub fn unlock_store(dir: &Path, layout: VaultLayout, password_opts: &PasswordOptions) -> Result<RecordStore> {
    let mut store = RecordStore::new(dir, layout);
    if !store.has_signed_up() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("No principal at {}", dir.display()),
        ))
        .context("Run `recordvault signup` first");
    }

    let password = get_password(password_opts)?;
    store
        .login(&password)
        .with_context(|| format!("Failed to log in to {}", dir.display()))?;
    Ok(store)
}

/// Get password using the priority chain:
/// 1. --password-stdin
/// 2. --password / RECORDVAULT_PASSWORD
/// 3. Interactive prompt
pub fn get_password(opts: &PasswordOptions) -> Result<String> {
    if opts.password_stdin {
        read_password_from_stdin()
    } else if let Some(ref password) = opts.password {
        Ok(password.clone())
    } else {
        auth::prompt_password("Password: ")
    }
}

/// Like [`get_password`], but an interactive prompt asks twice.
pub fn get_new_password(opts: &PasswordOptions) -> Result<String> {
    if opts.password_stdin {
        read_password_from_stdin()
    } else if let Some(ref password) = opts.password {
        Ok(password.clone())
    } else {
        auth::prompt_new_password("New password: ")
    }
}

/// Read password from stdin (first line only)
fn read_password_from_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        anyhow::bail!(
            "--password-stdin requires password to be piped in.\n\
             Example: echo \"$SECRET\" | recordvault --password-stdin cat ~/records/alice notes"
        );
    }

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    let password = password.trim_end_matches('\n').trim_end_matches('\r');

    if password.is_empty() {
        anyhow::bail!("Password from stdin is empty");
    }

    Ok(password.to_string())
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<cat::UnreadableRecord>().is_some() {
            return exit_code::INTEGRITY;
        }

        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            match store_err {
                StoreError::Vault(vault_err) => return categorize_vault_error(vault_err),
                StoreError::Record(record_err) => return categorize_record_error(record_err),
                StoreError::NotAuthenticated => return exit_code::AUTH_FAILED,
                StoreError::InvalidName { .. } | StoreError::Io { .. } => {}
            }
        }

        if let Some(vault_err) = cause.downcast_ref::<KeyVaultError>() {
            return categorize_vault_error(vault_err);
        }

        if let Some(record_err) = cause.downcast_ref::<RecordError>() {
            return categorize_record_error(record_err);
        }

        if let Some(SaltError::Corrupted { .. }) = cause.downcast_ref::<SaltError>() {
            return exit_code::INTEGRITY;
        }

        if let Some(SessionError::Token(token_err)) = cause.downcast_ref::<SessionError>() {
            return categorize_token_error(token_err);
        }

        if let Some(token_err) = cause.downcast_ref::<TokenError>() {
            return categorize_token_error(token_err);
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::NotFound
        {
            return exit_code::NOT_FOUND;
        }
    }

    exit_code::GENERAL_ERROR
}

fn categorize_vault_error(e: &KeyVaultError) -> u8 {
    match e {
        KeyVaultError::WrongPassword | KeyVaultError::Locked => exit_code::AUTH_FAILED,
        KeyVaultError::PrivateStateCorrupted { .. } => exit_code::INTEGRITY,
        KeyVaultError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => exit_code::NOT_FOUND,
        _ => exit_code::GENERAL_ERROR,
    }
}

fn categorize_token_error(e: &TokenError) -> u8 {
    match e {
        TokenError::InvalidSignature | TokenError::UnsupportedAlgorithm(_) => exit_code::AUTH_FAILED,
        TokenError::Malformed { .. } => exit_code::INTEGRITY,
        TokenError::EmptyKey | TokenError::Payload(_) => exit_code::GENERAL_ERROR,
    }
}

fn categorize_record_error(e: &RecordError) -> u8 {
    if e.is_integrity_violation() {
        return exit_code::INTEGRITY;
    }
    match e {
        RecordError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => exit_code::NOT_FOUND,
        _ => exit_code::GENERAL_ERROR,
    }
}
