//! Where the backend admin password lives when it is not written into `config.toml`.

use keyring::Entry;

use crate::error::{PlayerError, Result};

const BACKEND_ADMIN_SERVICE: &str = "symusic.backend.admin";

/// Backend admin passwords keyed by admin email.
pub trait CredentialStore: Send + Sync {
    fn backend_password(&self, email: &str) -> Result<Option<String>>;
    fn store_backend_password(&self, email: &str, password: &str) -> Result<()>;
    /// Removing an absent password succeeds.
    fn forget_backend_password(&self, email: &str) -> Result<()>;
}

/// OS keyring, one entry per admin email under `symusic.backend.admin`.
pub struct KeyringCredentialStore;

impl KeyringCredentialStore {
    fn entry(email: &str) -> Result<Entry> {
        Entry::new(BACKEND_ADMIN_SERVICE, email)
            .map_err(|err| PlayerError::Config(format!("keyring unavailable for {email}: {err}")))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn backend_password(&self, email: &str) -> Result<Option<String>> {
        match Self::entry(email)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(PlayerError::Config(format!(
                "reading backend password for {email}: {err}"
            ))),
        }
    }

    fn store_backend_password(&self, email: &str, password: &str) -> Result<()> {
        Self::entry(email)?.set_password(password).map_err(|err| {
            PlayerError::Config(format!("storing backend password for {email}: {err}"))
        })
    }

    fn forget_backend_password(&self, email: &str) -> Result<()> {
        match Self::entry(email)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(PlayerError::Config(format!(
                "removing backend password for {email}: {err}"
            ))),
        }
    }
}
