//! Explicitly constructed application context: configuration, cache, remote handles and
//! the managers built on top of them.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::broadcast;

use crate::{
    admin_gate::AdminGate,
    backends::{
        firestore::{FirebaseAuth, FirestoreStore},
        AuthService, DocumentStore,
    },
    config::Config,
    credential_store::{CredentialStore, KeyringCredentialStore},
    db_manager::DbManager,
    error::{PlayerError, Result},
    library_manager::LibraryManager,
    media::MediaElement,
    playback_controller::PlaybackController,
    protocol::{Collection, Message, Notice, NoticeLevel},
    realtime::SnapshotSubscription,
};

/// Backend client handles shared with worker threads.
#[derive(Clone)]
pub(crate) struct RemoteHandles {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) auth: Arc<dyn AuthService>,
}

impl RemoteHandles {
    /// Builds Firestore handles from validated configuration.
    pub(crate) fn connect(config: &Config) -> Result<Self> {
        let settings = config.remote_settings()?;
        Ok(Self {
            store: Arc::new(FirestoreStore::new(settings.clone())),
            auth: Arc::new(FirebaseAuth::new(&settings)),
        })
    }
}

pub(crate) struct AppContext {
    pub(crate) config: Config,
    pub(crate) bus_sender: broadcast::Sender<Message>,
    pub(crate) cache: DbManager,
    pub(crate) admin_gate: AdminGate,
    pub(crate) library: LibraryManager,
    credential_store: Arc<dyn CredentialStore>,
    remote: Option<RemoteHandles>,
    subscriptions: Vec<SnapshotSubscription>,
}

impl AppContext {
    /// Opens the cache, connects the remote store and restores a remembered admin session.
    pub(crate) fn init(config: Config, bus_sender: broadcast::Sender<Message>) -> Result<Self> {
        let cache = DbManager::new(&config.cache_path()?)?;
        let remote = RemoteHandles::connect(&config);
        Ok(Self::with_backends(
            config,
            bus_sender,
            cache,
            Arc::new(KeyringCredentialStore),
            remote,
        ))
    }

    /// Builds the context around already-constructed backends.
    ///
    /// Configuration errors and an unreachable store fall back to offline mode.
    pub(crate) fn with_backends(
        config: Config,
        bus_sender: broadcast::Sender<Message>,
        cache: DbManager,
        credential_store: Arc<dyn CredentialStore>,
        remote: Result<RemoteHandles>,
    ) -> Self {
        let notify = |notice: Notice| {
            let _ = bus_sender.send(Message::Notice(notice));
        };
        let credentials = config.admin_credentials(|email| {
            credential_store
                .backend_password(email)
                .unwrap_or_else(|err| {
                    warn!("AppContext: backend password lookup failed: {}", err);
                    None
                })
        });

        let remote = match remote {
            Ok(handles) => match handles.store.list_categories() {
                Ok(_) => Some(handles),
                Err(err) if err.is_offline_trigger() => {
                    warn!("AppContext: remote store unreachable, going offline: {}", err);
                    notify(Notice::from_error(&err));
                    None
                }
                Err(err) => {
                    warn!("AppContext: remote probe failed: {}", err);
                    notify(Notice::from_error(&err));
                    Some(handles)
                }
            },
            Err(err) => {
                warn!("AppContext: remote store not configured, going offline: {}", err);
                notify(Notice::from_error(&err));
                None
            }
        };

        let base_url = config.storage.public_audio_base_url.clone();
        let library = match &remote {
            Some(handles) => {
                LibraryManager::online(Arc::clone(&handles.store), bus_sender.clone(), base_url)
            }
            None => LibraryManager::offline(base_url),
        };
        let mut admin_gate = AdminGate::new(
            credentials,
            remote.as_ref().map(|handles| Arc::clone(&handles.auth)),
        );
        match admin_gate.restore_remembered(&cache) {
            Ok(true) => notify(Notice::new(NoticeLevel::Success, "admin session restored")),
            Ok(false) => {}
            Err(err) => notify(Notice::from_error(&err)),
        }

        if remote.is_some() {
            notify(Notice::new(
                NoticeLevel::Success,
                "music player ready (remote store connected)",
            ));
        } else {
            notify(Notice::new(NoticeLevel::Info, "running in offline mode"));
        }

        Self {
            config,
            bus_sender,
            cache,
            admin_gate,
            library,
            credential_store,
            remote,
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn is_offline(&self) -> bool {
        self.remote.is_none()
    }

    /// Shows cached state and starts the realtime subscriptions.
    pub(crate) fn start<M: MediaElement>(&mut self, controller: &mut PlaybackController<M>) {
        self.library.load_cached(&self.cache, controller);
        let Some(remote) = &self.remote else {
            return;
        };
        for collection in [Collection::Categories, Collection::Songs] {
            self.subscriptions.push(SnapshotSubscription::subscribe(
                Arc::clone(&remote.store),
                collection,
                self.config.poll_interval(),
                self.bus_sender.clone(),
            ));
        }
        info!("AppContext: subscribed to {} collections", self.subscriptions.len());
    }

    /// Stops every subscription. Snapshots are no longer delivered after this returns.
    pub(crate) fn teardown(&mut self) {
        for mut subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
            info!(
                "AppContext: unsubscribed from {}",
                subscription.collection().name()
            );
        }
    }

    /// Saves the backend password for the configured admin email; the next login uses it.
    pub(crate) fn store_backend_password(&mut self, password: &str) -> Result<()> {
        let email = self.backend_email()?;
        self.credential_store.store_backend_password(email, password)?;
        self.admin_gate.set_backend_password(Some(password.to_string()));
        Ok(())
    }

    /// Removes the stored password. A password written in `config.toml` stays in effect.
    pub(crate) fn forget_backend_password(&mut self) -> Result<()> {
        let email = self.backend_email()?;
        self.credential_store.forget_backend_password(email)?;
        let fallback = Some(self.config.admin.backend_password.clone())
            .filter(|password| !password.is_empty());
        self.admin_gate.set_backend_password(fallback);
        Ok(())
    }

    fn backend_email(&self) -> Result<&str> {
        let email = self.config.admin.backend_email.trim();
        if email.is_empty() {
            return Err(PlayerError::Config(
                "admin.backend_email is not set".to_string(),
            ));
        }
        Ok(email)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryAuth, MemoryStore};
    use crate::credential_store::memory::MemoryCredentialStore;

    fn memory_handles(store: Arc<MemoryStore>) -> RemoteHandles {
        RemoteHandles {
            store,
            auth: Arc::new(MemoryAuth::new("admin@example.org", "backend-secret")),
        }
    }

    fn drain_notices(receiver: &mut broadcast::Receiver<Message>) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let Message::Notice(notice) = message {
                notices.push(notice);
            }
        }
        notices
    }

    #[test]
    fn test_config_error_falls_back_to_offline() {
        let (bus_sender, _) = broadcast::channel(16);
        let mut receiver = bus_sender.subscribe();
        let context = AppContext::with_backends(
            Config::default(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            Arc::new(MemoryCredentialStore::default()),
            Err(PlayerError::Config("remote.project_id is not set".to_string())),
        );
        assert!(context.is_offline());
        assert!(context.library.is_offline());

        let notices = drain_notices(&mut receiver);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices
            .iter()
            .any(|notice| notice.text == "running in offline mode"));
    }

    #[test]
    fn test_unreachable_store_falls_back_to_offline() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let (bus_sender, _) = broadcast::channel(16);
        let context = AppContext::with_backends(
            Config::default(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            Arc::new(MemoryCredentialStore::default()),
            Ok(memory_handles(store)),
        );
        assert!(context.is_offline());
    }

    #[test]
    fn test_reachable_store_stays_online() {
        let store = Arc::new(MemoryStore::new());
        let (bus_sender, _) = broadcast::channel(16);
        let mut receiver = bus_sender.subscribe();
        let mut context = AppContext::with_backends(
            Config::default(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            Arc::new(MemoryCredentialStore::default()),
            Ok(memory_handles(store)),
        );
        assert!(!context.is_offline());
        assert!(drain_notices(&mut receiver)
            .iter()
            .any(|notice| notice.level == NoticeLevel::Success));
        context.teardown();
    }

    #[test]
    fn test_keyring_commands_require_backend_email() {
        let (bus_sender, _) = broadcast::channel(16);
        let mut context = AppContext::with_backends(
            Config::default(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            Arc::new(MemoryCredentialStore::default()),
            Err(PlayerError::Config("offline".to_string())),
        );
        assert!(matches!(
            context.store_backend_password("secret"),
            Err(PlayerError::Config(_))
        ));
        assert!(matches!(
            context.forget_backend_password(),
            Err(PlayerError::Config(_))
        ));
    }

    fn admin_config() -> Config {
        let mut config = Config::default();
        config.admin.password = "letmein".to_string();
        config.admin.backend_email = "admin@example.org".to_string();
        config
    }

    #[test]
    fn test_stored_backend_password_is_used_at_startup() {
        let (bus_sender, _) = broadcast::channel(16);
        let mut context = AppContext::with_backends(
            admin_config(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            Arc::new(MemoryCredentialStore::with_password(
                "admin@example.org",
                "backend-secret",
            )),
            Ok(memory_handles(Arc::new(MemoryStore::new()))),
        );
        context
            .admin_gate
            .login("letmein", false, &context.cache)
            .expect("login with stored password");
        assert!(context.admin_gate.session().is_some());
        context.teardown();
    }

    #[test]
    fn test_storing_and_forgetting_backend_password_updates_login() {
        let credentials = Arc::new(MemoryCredentialStore::default());
        let (bus_sender, _) = broadcast::channel(16);
        let mut context = AppContext::with_backends(
            admin_config(),
            bus_sender,
            DbManager::new_in_memory().expect("cache"),
            credentials.clone(),
            Ok(memory_handles(Arc::new(MemoryStore::new()))),
        );
        assert!(matches!(
            context.admin_gate.login("letmein", false, &context.cache),
            Err(PlayerError::BackendAuth(_))
        ));

        context
            .store_backend_password("backend-secret")
            .expect("store password");
        assert_eq!(
            credentials.backend_password("admin@example.org"),
            Ok(Some("backend-secret".to_string()))
        );
        context
            .admin_gate
            .login("letmein", false, &context.cache)
            .expect("login after storing password");

        context.admin_gate.logout(&context.cache);
        context.forget_backend_password().expect("forget password");
        assert_eq!(credentials.backend_password("admin@example.org"), Ok(None));
        assert!(matches!(
            context.admin_gate.login("letmein", false, &context.cache),
            Err(PlayerError::BackendAuth(_))
        ));
        context.teardown();
    }
}
