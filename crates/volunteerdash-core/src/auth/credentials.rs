use std::fmt;

use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "volunteerdash";

/// Galaxy Digital login material.
#[derive(Clone, Default)]
pub struct GalaxyCredentials {
    pub api_key: String,
    pub email: String,
    pub password: String,
}

impl GalaxyCredentials {
    pub fn new(api_key: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Names of the settings that are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("GALAXY_API_KEY");
        }
        if self.email.trim().is_empty() {
            missing.push("GALAXY_EMAIL");
        }
        if self.password.is_empty() {
            missing.push("GALAXY_PASSWORD");
        }
        missing
    }
}

impl fmt::Debug for GalaxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GalaxyCredentials")
            .field("api_key", &"<redacted>")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Galaxy passwords in the OS keychain, one entry per account email.
pub struct CredentialStore;

impl CredentialStore {
    /// Store a password in the OS keychain
    pub fn store(email: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, email).context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve the password for an email from the OS keychain
    pub fn get_password(email: &str) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, email).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete the stored password for an email
    pub fn delete(email: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, email).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }
}
