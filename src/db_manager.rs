use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use crate::catalog::{Category, Song};

const SONGS_KEY: &str = "songs";
const CATEGORIES_KEY: &str = "categories";
const ADMIN_REMEMBERED_KEY: &str = "admin-remembered";

/// Durable key/value cache for the library and the remembered-admin flag.
///
/// Reads never fail outward: unreadable or malformed entries are logged and treated as absent.
pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    warn!(
                        "DbManager: failed to create cache directory {}: {}",
                        parent.display(),
                        err
                    );
                }
            }
        }
        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO cache_entries (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get_raw(key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("DbManager: failed to read '{}': {}", key, err);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("DbManager: ignoring malformed '{}' entry: {}", key, err);
                None
            }
        }
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> crate::error::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put_raw(key, &raw)?;
        Ok(())
    }

    /// Cached song list; `None` when absent or unreadable.
    pub fn load_songs(&self) -> Option<Vec<Song>> {
        self.load_json(SONGS_KEY)
    }

    pub fn save_songs(&self, songs: &[Song]) -> crate::error::Result<()> {
        self.save_json(SONGS_KEY, songs)
    }

    pub fn load_categories(&self) -> Option<Vec<Category>> {
        self.load_json(CATEGORIES_KEY)
    }

    pub fn save_categories(&self, categories: &[Category]) -> crate::error::Result<()> {
        self.save_json(CATEGORIES_KEY, categories)
    }

    pub fn is_admin_remembered(&self) -> bool {
        match self.get_raw(ADMIN_REMEMBERED_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                warn!("DbManager: failed to read admin flag: {}", err);
                false
            }
        }
    }

    pub fn set_admin_remembered(&self, remembered: bool) -> crate::error::Result<()> {
        if remembered {
            self.put_raw(ADMIN_REMEMBERED_KEY, "true")?;
        } else {
            self.remove_raw(ADMIN_REMEMBERED_KEY)?;
        }
        Ok(())
    }
}
