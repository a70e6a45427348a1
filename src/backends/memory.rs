//! In-memory document store and auth service used by tests.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex,
};

use crate::backends::{AuthService, BackendSession, DocumentStore};
use crate::catalog::{Category, Song, SongFields};
use crate::error::{PlayerError, Result};

#[derive(Default)]
pub struct MemoryStore {
    songs: Mutex<Vec<Song>>,
    categories: Mutex<Vec<Category>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    require_session: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_songs(songs: Vec<Song>) -> Self {
        let store = Self::default();
        *store.songs.lock().expect("songs lock poisoned") = songs;
        store
    }

    /// Simulates an outage: every call fails with `RemoteUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Rejects writes made without a backend session.
    pub fn set_require_session(&self, required: bool) {
        self.require_session.store(required, Ordering::SeqCst);
    }

    pub fn songs(&self) -> Vec<Song> {
        self.songs.lock().expect("songs lock poisoned").clone()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories.lock().expect("categories lock poisoned").clone()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlayerError::RemoteUnavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, session: Option<&BackendSession>) -> Result<()> {
        self.check_available()?;
        if session.is_none() && self.require_session.load(Ordering::SeqCst) {
            return Err(PlayerError::PermissionDenied("write requires sign-in".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn next_id(&self) -> String {
        format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl DocumentStore for MemoryStore {
    fn list_songs(&self) -> Result<Vec<Song>> {
        self.check_available()?;
        let mut songs = self.songs();
        songs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(songs)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        self.check_available()?;
        let mut categories = self.categories();
        categories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(categories)
    }

    fn add_song(&self, fields: &SongFields, session: Option<&BackendSession>) -> Result<String> {
        self.check_write(session)?;
        let id = self.next_id();
        self.songs
            .lock()
            .expect("songs lock poisoned")
            .push(fields.clone().into_song(id.clone()));
        Ok(id)
    }

    fn update_song(
        &self,
        id: &str,
        fields: &SongFields,
        session: Option<&BackendSession>,
    ) -> Result<()> {
        self.check_write(session)?;
        let mut songs = self.songs.lock().expect("songs lock poisoned");
        let song = songs
            .iter_mut()
            .find(|song| song.id == id)
            .ok_or_else(|| PlayerError::NotFound(format!("song {id}")))?;
        *song = fields.clone().into_song(id.to_string());
        Ok(())
    }

    fn delete_song(&self, id: &str, session: Option<&BackendSession>) -> Result<()> {
        self.check_write(session)?;
        self.songs
            .lock()
            .expect("songs lock poisoned")
            .retain(|song| song.id != id);
        Ok(())
    }

    fn add_category(
        &self,
        name: &str,
        created_at: &str,
        session: Option<&BackendSession>,
    ) -> Result<String> {
        self.check_write(session)?;
        let id = self.next_id();
        self.categories
            .lock()
            .expect("categories lock poisoned")
            .push(Category {
                id: id.clone(),
                name: name.to_string(),
                created_at: created_at.to_string(),
            });
        Ok(id)
    }
}

/// Accepts exactly one email/password pair.
pub struct MemoryAuth {
    email: String,
    password: String,
    unavailable: AtomicBool,
}

impl MemoryAuth {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl AuthService for MemoryAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<BackendSession> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlayerError::RemoteUnavailable("simulated outage".to_string()));
        }
        if email != self.email || password != self.password {
            return Err(PlayerError::BackendAuth("INVALID_LOGIN_CREDENTIALS".to_string()));
        }
        Ok(BackendSession {
            email: email.to_string(),
            id_token: format!("token-for-{email}"),
        })
    }
}
