//! In-memory account registry for the credential service.
//!
//! Independent of the presence core: it shares the process and the wire, and
//! nothing else. Accounts are keyed by email and live only as long as the
//! process. Passwords are compared verbatim; credential hardening is out of
//! scope for this service.

use std::collections::HashMap;

use thiserror::Error;

/// Errors from account operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// Sign-up with an email that is already registered.
    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    /// Sign-in with an unknown email or a wrong password. Deliberately one
    /// variant for both so callers cannot probe which emails exist.
    #[error("invalid email or password")]
    InvalidCredentials,
}

/// One stored account.
#[derive(Debug, Clone)]
struct Account {
    /// Display name chosen at sign-up.
    name: String,
    /// Password, stored as received.
    password: String,
}

/// Registry of accounts keyed by email.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: HashMap<String, Account>,
}

impl AccountRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// - [`AccountError::DuplicateEmail`] if the email is already registered
    pub fn sign_up(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), AccountError> {
        let email = email.into();
        if self.accounts.contains_key(&email) {
            return Err(AccountError::DuplicateEmail(email));
        }

        self.accounts.insert(email, Account { name: name.into(), password: password.into() });
        Ok(())
    }

    /// Check credentials, returning the account's display name on success.
    ///
    /// # Errors
    ///
    /// - [`AccountError::InvalidCredentials`] if the email is unknown or the
    ///   password does not match
    pub fn authenticate(&self, email: &str, password: &str) -> Result<&str, AccountError> {
        let account = self.accounts.get(email).ok_or(AccountError::InvalidCredentials)?;
        if account.password != password {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(&account.name)
    }

    /// Number of stored accounts.
    #[must_use]
    pub fn count(&self) -> usize {
        self.accounts.len()
    }
}
