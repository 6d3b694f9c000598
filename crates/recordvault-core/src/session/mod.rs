//! Signed session tokens and the cookies that carry them.

pub mod cookie;
pub mod token;

pub use cookie::{SessionClaims, SessionConfig, SessionCookie, SessionError, Sessions};
pub use token::{Algorithm, TokenCodec, TokenError};
