//! Account service payload types.
//!
//! The account service is independent of the presence core: it shares the
//! process and the transport, nothing else. Failures come back as `Error`
//! frames (`DUPLICATE_EMAIL`, `INVALID_CREDENTIALS`) rather than dedicated
//! reply variants.

use serde::{Deserialize, Serialize};

/// Account creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    /// Display name to associate with the account.
    pub name: String,

    /// Email address, the account key.
    pub email: String,

    /// Password, compared verbatim on sign-in.
    pub password: String,
}

/// Confirmation of a successful sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpReply {
    /// Display name of the created account.
    pub name: String,
}

/// Credential check request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignIn {
    /// Email address of the account.
    pub email: String,

    /// Password to compare.
    pub password: String,
}

/// Successful sign-in response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInReply {
    /// Opaque session token (random 128-bit value, hex-encoded).
    pub token: String,

    /// Display name stored with the account.
    pub name: String,
}
