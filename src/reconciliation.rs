//! Local-first reconciliation of remote snapshots with the in-memory library.
//!
//! The policy keeps two promises: the default song is present exactly once after any
//! sequence of snapshots (duplicates and reorderings included), and whatever ends up in
//! memory is also what the local cache holds for the next offline start.

use log::{debug, info, warn};

use crate::catalog::{
    default_categories_local, default_song_local, now_iso8601, now_millis, Category, Song,
};
use crate::db_manager::DbManager;

/// Merges two song lists by title. Entries of `local` always win; remote entries are
/// appended in order when no entry with the same title is present yet.
pub fn merge_by_title(local: Vec<Song>, remote: Vec<Song>) -> Vec<Song> {
    let mut merged: Vec<Song> = Vec::with_capacity(local.len() + remote.len());
    for song in local.into_iter().chain(remote) {
        if !merged.iter().any(|existing| existing.title == song.title) {
            merged.push(song);
        }
    }
    merged
}

/// Result of applying a songs snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SongsReconciled {
    pub songs: Vec<Song>,
    /// The default song should be created remotely (after a by-title existence check).
    pub install_default_remotely: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CategoriesReconciled {
    Replace(Vec<Category>),
    /// The collection is empty; the seed categories should be written remotely.
    SeedRemotely,
    /// Still empty, but seeding was already requested.
    Unchanged,
}

/// Library loaded without the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineLibrary {
    pub songs: Vec<Song>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Default)]
pub struct ReconciliationPolicy {
    default_remote_requested: bool,
    categories_seed_requested: bool,
    last_songs_revision: Option<u64>,
    last_categories_revision: Option<u64>,
}

fn is_stale(last: Option<u64>, revision: u64) -> bool {
    last.is_some_and(|last| revision <= last)
}

impl ReconciliationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_remote_requested(&self) -> bool {
        self.default_remote_requested
    }

    /// Applies a songs snapshot against the current in-memory list.
    ///
    /// Returns `None` for stale or duplicate revisions. When the snapshot lacks the default
    /// song, the local copy of it is kept in front of the remote songs.
    pub fn on_songs_snapshot(
        &mut self,
        revision: u64,
        current: &[Song],
        snapshot: Vec<Song>,
        cache: &DbManager,
    ) -> Option<SongsReconciled> {
        if is_stale(self.last_songs_revision, revision) {
            debug!(
                "ReconciliationPolicy: ignoring songs revision {} (last {:?})",
                revision, self.last_songs_revision
            );
            return None;
        }
        self.last_songs_revision = Some(revision);

        let remote_has_default = snapshot.iter().any(Song::is_default);
        let (songs, install_default_remotely) = if remote_has_default {
            (merge_by_title(Vec::new(), snapshot), false)
        } else {
            let install = !self.default_remote_requested;
            if install {
                info!("ReconciliationPolicy: default song missing remotely, requesting install");
                self.default_remote_requested = true;
            }
            let local_default = current
                .iter()
                .find(|song| song.is_default())
                .cloned()
                .unwrap_or_else(|| default_song_local(now_millis()));
            (merge_by_title(vec![local_default], snapshot), install)
        };

        if let Err(err) = cache.save_songs(&songs) {
            warn!("ReconciliationPolicy: failed to persist songs: {}", err);
        }
        Some(SongsReconciled {
            songs,
            install_default_remotely,
        })
    }

    pub fn on_categories_snapshot(
        &mut self,
        revision: u64,
        snapshot: Vec<Category>,
        cache: &DbManager,
    ) -> Option<CategoriesReconciled> {
        if is_stale(self.last_categories_revision, revision) {
            debug!(
                "ReconciliationPolicy: ignoring categories revision {} (last {:?})",
                revision, self.last_categories_revision
            );
            return None;
        }
        self.last_categories_revision = Some(revision);

        if snapshot.is_empty() {
            if self.categories_seed_requested {
                return Some(CategoriesReconciled::Unchanged);
            }
            self.categories_seed_requested = true;
            return Some(CategoriesReconciled::SeedRemotely);
        }
        if let Err(err) = cache.save_categories(&snapshot) {
            warn!("ReconciliationPolicy: failed to persist categories: {}", err);
        }
        Some(CategoriesReconciled::Replace(snapshot))
    }
}

/// Loads the library from the local cache alone.
///
/// Missing categories are seeded locally; a cache without the default song gets a local copy.
pub fn bootstrap_offline(cache: &DbManager) -> OfflineLibrary {
    let cached = cache.load_songs().unwrap_or_default();
    let cached_len = cached.len();
    let mut songs = merge_by_title(Vec::new(), cached);
    if !songs.iter().any(Song::is_default) {
        songs.push(default_song_local(now_millis()));
    }
    if songs.len() != cached_len {
        if let Err(err) = cache.save_songs(&songs) {
            warn!("ReconciliationPolicy: failed to persist offline songs: {}", err);
        }
    }

    let categories = match cache.load_categories() {
        Some(categories) if !categories.is_empty() => categories,
        _ => {
            let seeded = default_categories_local(&now_iso8601());
            if let Err(err) = cache.save_categories(&seeded) {
                warn!("ReconciliationPolicy: failed to persist seed categories: {}", err);
            }
            seeded
        }
    };

    info!(
        "ReconciliationPolicy: offline library with {} songs and {} categories",
        songs.len(),
        categories.len()
    );
    OfflineLibrary { songs, categories }
}
