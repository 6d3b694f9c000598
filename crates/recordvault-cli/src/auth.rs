use std::io::{self, Write};

use anyhow::{Result, bail};
use rpassword::read_password;

/// Prompt for a password on the terminal without echo.
pub fn prompt_password(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;

    let password = read_password()?;

    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    Ok(password)
}

/// Prompt for a new password twice and require both entries to match.
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    let first = prompt_password(prompt)?;
    let second = prompt_password("Confirm password: ")?;

    if first != second {
        bail!("Passwords do not match");
    }

    Ok(first)
}
