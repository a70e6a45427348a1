//! Event-bus protocol shared by all runtime components.
//!
//! Everything that re-enters the event loop (user commands, media callbacks, snapshot
//! deliveries, remote write completions) is one of these messages.

use crate::catalog::{Category, Song, SongDraft};
use crate::error::PlayerError;

/// Repeat behavior applied when navigating beyond the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    All, // Wrap to the start of the view
    One, // Replay the current track on end
    Off, // Stop after the last track
}

impl RepeatMode {
    /// Next mode in the `all → one → off` cycle.
    pub fn cycled(self) -> Self {
        match self {
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
            RepeatMode::Off => RepeatMode::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::All => "repeat all",
            RepeatMode::One => "repeat one",
            RepeatMode::Off => "repeat off",
        }
    }
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Playback(PlaybackMessage),
    Media(MediaEvent),
    Library(LibraryMessage),
    Admin(AdminMessage),
    Notice(Notice),
    Shutdown,
}

/// User-issued playback commands.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackMessage {
    /// Index is in filtered-view coordinates.
    PlayViewIndex(usize),
    TogglePlay,
    Next,
    Previous,
    /// Fractional position in `[0, 1]`.
    Seek(f64),
    SetVolume(u8),
    ToggleMute,
    ToggleShuffle,
    CycleRepeat,
    SetCategory(String),
}

/// Callbacks from the media element. `session` identifies the load that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    TimeUpdate { session: u64, position_secs: f64 },
    LoadedMetadata { session: u64, duration_secs: f64 },
    Ended { session: u64 },
    Error { session: u64, message: String },
}

/// Remote collection names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Songs,
    Categories,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Songs => "songs",
            Collection::Categories => "categories",
        }
    }
}

/// Remote write kinds reported back by the write worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    AddSong { title: String },
    UpdateSong { title: String },
    DeleteSong { title: String },
    InstallDefaultSong,
    SeedCategories,
}

/// Library-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    SongsSnapshot { revision: u64, songs: Vec<Song> },
    CategoriesSnapshot { revision: u64, categories: Vec<Category> },
    SnapshotFailed { collection: Collection, error: PlayerError },
    AddSong(SongDraft),
    UpdateSong { id: String, draft: SongDraft },
    DeleteSong { id: String },
    RemoteWriteCompleted {
        write: RemoteWrite,
        result: Result<(), PlayerError>,
    },
    PrintSongs,
    PrintStatus,
}

/// Admin gate commands.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminMessage {
    Login { password: String, remember: bool },
    Logout,
    /// Stores the backend password for the configured admin email in the OS keyring.
    StoreBackendPassword(String),
    ForgetBackendPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-visible notification ("toast").
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn from_error(error: &PlayerError) -> Self {
        Self::new(error.notice_level(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_cycles_all_one_off() {
        assert_eq!(RepeatMode::All.cycled(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycled(), RepeatMode::Off);
        assert_eq!(RepeatMode::Off.cycled(), RepeatMode::All);
    }

    #[test]
    fn test_repeat_mode_deserializes_snake_case() {
        #[derive(serde::Deserialize)]
        struct Holder {
            mode: RepeatMode,
        }
        let holder: Holder = toml::from_str("mode = \"one\"").expect("parse repeat mode");
        assert_eq!(holder.mode, RepeatMode::One);
    }
}
