//! Remote document-store and authentication abstractions and their implementations.

pub mod firestore;
#[cfg(test)]
pub mod memory;

use crate::catalog::{Category, Song, SongFields};
use crate::error::Result;

/// Authenticated backend identity used for privileged writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSession {
    pub email: String,
    pub id_token: String,
}

/// Remote collections of songs and categories, newest first.
///
/// Writes take the backend session when one is established; stores whose access rules
/// allow anonymous writes accept `None`.
pub trait DocumentStore: Send + Sync {
    fn list_songs(&self) -> Result<Vec<Song>>;
    fn list_categories(&self) -> Result<Vec<Category>>;
    /// Creates a song document and returns its store-assigned id.
    fn add_song(&self, fields: &SongFields, session: Option<&BackendSession>) -> Result<String>;
    fn update_song(
        &self,
        id: &str,
        fields: &SongFields,
        session: Option<&BackendSession>,
    ) -> Result<()>;
    fn delete_song(&self, id: &str, session: Option<&BackendSession>) -> Result<()>;
    fn add_category(
        &self,
        name: &str,
        created_at: &str,
        session: Option<&BackendSession>,
    ) -> Result<String>;

    /// Point lookup by the natural key.
    fn find_song_by_title(&self, title: &str) -> Result<Option<Song>> {
        Ok(self
            .list_songs()?
            .into_iter()
            .find(|song| song.title == title))
    }
}

/// Exchanges backend credentials for a session.
pub trait AuthService: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> Result<BackendSession>;
}
