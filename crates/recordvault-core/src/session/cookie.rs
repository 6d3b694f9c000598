#![forbid(unsafe_code)]

//! Session cookies carrying signed tokens.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::trace;

use super::token::{TokenCodec, TokenError};

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "session";

/// Cookie lifetime used when none is configured: 7 days.
pub const DEFAULT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors from reading a session cookie.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The request carries no cookie with the session name.
    #[error("No session cookie")]
    NoSession,

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Lifetime of an issued cookie, in seconds.
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// The session payload the record service signs into its cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: u64,
    pub email: String,
    /// A secondary credential sealed with
    /// [`RecordCryptor::seal`](crate::fs::RecordCryptor::seal), base64-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_credential: Option<String>,
}

/// A cookie to send to the client, rendered by `Display` as a
/// `Set-Cookie` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
    pub http_only: bool,
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Max-Age={}", self.name, self.value, self.max_age_secs)?;
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Issues and reads session cookies signed by a [`TokenCodec`].
#[derive(Debug, Clone)]
pub struct Sessions {
    config: SessionConfig,
    codec: TokenCodec,
}

impl Sessions {
    pub fn new(config: SessionConfig, key: &[u8]) -> Result<Self, SessionError> {
        Ok(Self {
            config,
            codec: TokenCodec::new(key)?,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Sign `claims` into a fresh session cookie.
    pub fn issue_cookie<T: Serialize + ?Sized>(&self, claims: &T) -> Result<SessionCookie, SessionError> {
        Ok(SessionCookie {
            name: self.config.cookie_name.clone(),
            value: self.codec.issue(claims)?,
            max_age_secs: self.config.max_age_secs,
            http_only: true,
        })
    }

    /// A cookie that clears the session on the client.
    pub fn removal_cookie(&self) -> SessionCookie {
        SessionCookie {
            name: self.config.cookie_name.clone(),
            value: String::new(),
            max_age_secs: 0,
            http_only: true,
        }
    }

    /// Find the session cookie in a `Cookie` request header and verify it.
    ///
    /// A present but empty cookie is a malformed token, not a missing session.
    pub fn verify_cookie_header<T: DeserializeOwned>(&self, header: &str) -> Result<T, SessionError> {
        let value = header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.config.cookie_name)
            .map(|(_, value)| value)
            .ok_or(SessionError::NoSession)?;

        trace!(cookie = %self.config.cookie_name, "verifying session cookie");
        Ok(self.codec.verify(value)?)
    }
}
