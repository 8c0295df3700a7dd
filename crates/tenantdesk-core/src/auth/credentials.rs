use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use keyring::Entry;

use super::CredentialRef;

const SERVICE_NAME: &str = "tenantdesk";

/// Where passwords needed for token refresh live.
pub trait CredentialSource: Send + Sync {
    /// Store the password for a username
    fn store(&self, credentials: &CredentialRef, password: &str) -> Result<()>;

    /// Retrieve the password for a username
    fn get_password(&self, credentials: &CredentialRef) -> Result<String>;

    /// Delete stored credentials for a username
    fn delete(&self, credentials: &CredentialRef) -> Result<()>;
}

/// Passwords kept in the OS keychain.
pub struct KeyringCredentials;

impl KeyringCredentials {
    fn entry(credentials: &CredentialRef) -> Result<Entry> {
        Entry::new(SERVICE_NAME, credentials.username()).context("Failed to create keyring entry")
    }

    /// Check if credentials exist for a username
    pub fn has_credentials(credentials: &CredentialRef) -> bool {
        Self::entry(credentials)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }

    /// Fetch a named secret from the keychain, creating it with `generate` on first use
    pub fn get_or_create_secret(name: &str, generate: impl FnOnce() -> String) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, name).context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                let secret = generate();
                entry
                    .set_password(&secret)
                    .context("Failed to store secret in keychain")?;
                Ok(secret)
            }
            Err(e) => Err(e).context("Failed to read secret from keychain"),
        }
    }
}

impl CredentialSource for KeyringCredentials {
    fn store(&self, credentials: &CredentialRef, password: &str) -> Result<()> {
        Self::entry(credentials)?
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    fn get_password(&self, credentials: &CredentialRef) -> Result<String> {
        Self::entry(credentials)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    fn delete(&self, credentials: &CredentialRef) -> Result<()> {
        Self::entry(credentials)?
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }
}

/// Passwords held in process memory only.
#[derive(Default)]
pub struct MemoryCredentials {
    passwords: RwLock<HashMap<String, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialSource for MemoryCredentials {
    fn store(&self, credentials: &CredentialRef, password: &str) -> Result<()> {
        let mut passwords = self
            .passwords
            .write()
            .map_err(|_| anyhow::anyhow!("Credential map lock poisoned"))?;
        passwords.insert(credentials.username().to_string(), password.to_string());
        Ok(())
    }

    fn get_password(&self, credentials: &CredentialRef) -> Result<String> {
        let passwords = self
            .passwords
            .read()
            .map_err(|_| anyhow::anyhow!("Credential map lock poisoned"))?;
        passwords
            .get(credentials.username())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No stored password for {}", credentials.username()))
    }

    fn delete(&self, credentials: &CredentialRef) -> Result<()> {
        let mut passwords = self
            .passwords
            .write()
            .map_err(|_| anyhow::anyhow!("Credential map lock poisoned"))?;
        passwords.remove(credentials.username());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_credentials() {
        let creds = MemoryCredentials::new();
        let user = CredentialRef::new("ops@example.com");

        assert!(creds.get_password(&user).is_err());
        creds.store(&user, "hunter2").expect("store");
        assert_eq!(creds.get_password(&user).expect("get"), "hunter2");
        creds.store(&user, "hunter3").expect("store");
        assert_eq!(creds.get_password(&user).expect("get"), "hunter3");
        creds.delete(&user).expect("delete");
        assert!(creds.get_password(&user).is_err());
    }
}
