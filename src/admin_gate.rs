//! Admin session gate: a shared password plus a backend credential exchange.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::backends::{AuthService, BackendSession};
use crate::catalog::Song;
use crate::db_manager::DbManager;
use crate::error::{PlayerError, Result};

/// Externally supplied admin credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminCredentials {
    pub password: Option<String>,
    pub backend_email: Option<String>,
    pub backend_password: Option<String>,
    pub remember_session: bool,
    /// Grant admin on a remembered flag alone, without the shared password.
    pub trust_remembered_session: bool,
}

pub struct AdminGate {
    credentials: AdminCredentials,
    // None while running offline
    auth: Option<Arc<dyn AuthService>>,
    is_admin: bool,
    session: Option<BackendSession>,
}

impl AdminGate {
    pub fn new(credentials: AdminCredentials, auth: Option<Arc<dyn AuthService>>) -> Self {
        Self {
            credentials,
            auth,
            is_admin: false,
            session: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn session(&self) -> Option<&BackendSession> {
        self.session.as_ref()
    }

    /// Exchanges backend credentials. `Ok(None)` means there is no backend to sign in to.
    fn exchange(&self) -> Result<Option<BackendSession>> {
        let Some(auth) = &self.auth else {
            return Ok(None);
        };
        let email = self
            .credentials
            .backend_email
            .as_deref()
            .filter(|email| !email.trim().is_empty());
        let password = self
            .credentials
            .backend_password
            .as_deref()
            .filter(|password| !password.is_empty());
        let (Some(email), Some(password)) = (email, password) else {
            return Err(PlayerError::BackendAuth(
                "backend admin credentials are not configured".to_string(),
            ));
        };
        let session = auth.sign_in(email.trim(), password)?;
        debug!("AdminGate: backend session established for {}", session.email);
        Ok(Some(session))
    }

    /// Checks the shared password, then signs in to the backend.
    ///
    /// Admin state only changes when both steps succeed.
    pub fn login(&mut self, password: &str, remember: bool, cache: &DbManager) -> Result<()> {
        let expected = self
            .credentials
            .password
            .as_deref()
            .filter(|expected| !expected.is_empty())
            .ok_or_else(|| PlayerError::Config("admin password is not configured".to_string()))?;
        if password != expected {
            warn!("AdminGate: rejected admin password");
            return Err(PlayerError::InvalidCredential);
        }

        let session = self.exchange()?;
        if session.is_none() {
            info!("AdminGate: offline, admin limited to local changes");
        }
        self.session = session;
        self.is_admin = true;

        if remember && self.credentials.remember_session {
            if let Err(err) = cache.set_admin_remembered(true) {
                warn!("AdminGate: failed to remember admin session: {}", err);
            }
        }
        info!("AdminGate: admin login succeeded");
        Ok(())
    }

    /// Re-attempts the backend exchange for a remembered session.
    ///
    /// Returns whether admin state was granted. Unless remembered sessions are trusted, the
    /// restored backend session only saves the exchange on the next password login.
    pub fn restore_remembered(&mut self, cache: &DbManager) -> Result<bool> {
        if !cache.is_admin_remembered() {
            return Ok(false);
        }
        match self.exchange() {
            Ok(session) => {
                self.session = session;
                if self.credentials.trust_remembered_session {
                    self.is_admin = true;
                    info!("AdminGate: restored remembered admin session");
                } else {
                    info!("AdminGate: backend session restored, admin password still required");
                }
                Ok(self.is_admin)
            }
            Err(err) => {
                warn!("AdminGate: remembered session could not be restored: {}", err);
                if let Err(clear_err) = cache.set_admin_remembered(false) {
                    warn!("AdminGate: failed to clear remembered flag: {}", clear_err);
                }
                Err(err)
            }
        }
    }

    /// Replaces the backend password used by the next exchange. Admin state is untouched.
    pub fn set_backend_password(&mut self, password: Option<String>) {
        self.credentials.backend_password = password;
    }

    pub fn logout(&mut self, cache: &DbManager) {
        self.is_admin = false;
        self.session = None;
        if let Err(err) = cache.set_admin_remembered(false) {
            warn!("AdminGate: failed to clear remembered flag: {}", err);
        }
        info!("AdminGate: logged out");
    }

    /// Write gate for add and update.
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(PlayerError::NotAuthorized)
        }
    }

    /// Write gate for delete. The default song is protected whatever the admin state.
    pub fn check_delete(&self, song: &Song) -> Result<()> {
        if song.is_default() {
            return Err(PlayerError::ProtectedEntity(song.title.clone()));
        }
        self.require_admin()
    }
}
