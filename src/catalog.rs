//! Song and category records plus the fixed seed data every install starts from.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Filter value that selects every song regardless of category.
pub const ALL_CATEGORIES: &str = "all";

/// Category names seeded whenever the category collection is observed empty.
pub const DEFAULT_CATEGORY_NAMES: [&str; 4] = ["금철", "주일", "QT", "기타"];

pub const DEFAULT_SONG_TITLE: &str = "그 손이 일하시네";

const DEFAULT_SONG_LYRICS: &str = "보이는 건 사람의 손
보이지 않게 일하신 손
오늘도 내 하루 속에
사랑의 외침 들리네

그분의 손이 일하시네
그분의 손이 붙드시네
돌아오라 부르시네
그 사랑의 손이 나를

내 힘 아닌 주의 손
내 뜻 아닌 주의 길
전능하신 그 손 의지하며
오늘 주께 응답하리

그분의 손이 일하시네
그분의 손이 붙드시네
오늘도 내 삶 속에서
그분의 사랑 외치시네";

/// A playable entry. `title` is the natural key used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    /// `m:ss` length hint, when the uploader supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(rename = "created_at", alias = "createdAt", default)]
    pub created_at: String,
}

impl Song {
    pub fn is_default(&self) -> bool {
        self.title == DEFAULT_SONG_TITLE
    }

    /// Document fields of this song, without the store-assigned id.
    pub fn fields(&self) -> SongFields {
        SongFields {
            title: self.title.clone(),
            category: self.category.clone(),
            date: self.date.clone(),
            description: self.description.clone(),
            audio_url: self.audio_url.clone(),
            lyrics: self.lyrics.clone(),
            youtube_url: self.youtube_url.clone(),
            duration: self.duration.clone(),
            created_at: self.created_at.clone(),
        }
    }

    /// Duration hint in seconds, parsed from `m:ss` or plain seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        parse_duration(self.duration.as_deref()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(rename = "created_at", alias = "createdAt", default)]
    pub created_at: String,
}

/// Song document body as written to the remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SongFields {
    pub title: String,
    pub category: String,
    pub date: Option<String>,
    pub description: Option<String>,
    pub audio_url: Option<String>,
    pub lyrics: Option<String>,
    pub youtube_url: Option<String>,
    pub duration: Option<String>,
    pub created_at: String,
}

impl SongFields {
    pub fn into_song(self, id: String) -> Song {
        Song {
            id,
            title: self.title,
            category: self.category,
            date: self.date,
            description: self.description,
            audio_url: self.audio_url,
            lyrics: self.lyrics,
            youtube_url: self.youtube_url,
            duration: self.duration,
            created_at: self.created_at,
        }
    }
}

/// Raw admin form input for adding or editing a song.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongDraft {
    pub title: String,
    pub category: String,
    pub description: String,
    pub youtube_url: String,
    pub lyrics: String,
}

impl SongDraft {
    /// Validates and normalizes the form into document fields.
    ///
    /// Title and category are required; optional fields are trimmed and dropped when blank.
    /// The audio URL is always derived from the title.
    pub fn into_fields(
        self,
        public_audio_base_url: &str,
        created_at: String,
    ) -> crate::error::Result<SongFields> {
        let title = self.title.trim().to_string();
        let category = self.category.trim().to_string();
        if title.is_empty() || category.is_empty() {
            return Err(crate::error::PlayerError::Validation(
                "song title and category are required".to_string(),
            ));
        }
        Ok(SongFields {
            audio_url: Some(audio_url_for_title(public_audio_base_url, &title)),
            title,
            category,
            date: None,
            description: non_blank(&self.description),
            lyrics: non_blank(&self.lyrics),
            youtube_url: non_blank(&self.youtube_url),
            duration: None,
            created_at,
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The song every install must contain exactly once.
pub fn default_song_fields() -> SongFields {
    SongFields {
        title: DEFAULT_SONG_TITLE.to_string(),
        category: "금철".to_string(),
        date: Some("2025-10-13".to_string()),
        description: Some("역대하24:17-27".to_string()),
        audio_url: Some(
            "https://pub-0e706e4324b149e9a79e2be1ad1de135.r2.dev/%EA%B7%B8%20%EC%86%90%EC%9D%B4%20%EC%9D%BC%ED%95%98%EC%8B%9C%EB%84%A4.mp3"
                .to_string(),
        ),
        lyrics: Some(DEFAULT_SONG_LYRICS.to_string()),
        youtube_url: None,
        duration: None,
        created_at: "2025-10-13T00:00:00.000Z".to_string(),
    }
}

/// Local copy of the default song, keyed with a timestamp-based id.
pub fn default_song_local(now_ms: i64) -> Song {
    default_song_fields().into_song(format!("default-song-{now_ms}"))
}

/// Seed categories for offline mode, with `local-<i>` ids.
pub fn default_categories_local(created_at: &str) -> Vec<Category> {
    DEFAULT_CATEGORY_NAMES
        .iter()
        .enumerate()
        .map(|(index, name)| Category {
            id: format!("local-{index}"),
            name: (*name).to_string(),
            created_at: created_at.to_string(),
        })
        .collect()
}

/// Public audio URL for a title: `<base>/<percent-encoded title>.mp3`.
pub fn audio_url_for_title(public_audio_base_url: &str, title: &str) -> String {
    let filename = if title.ends_with(".mp3") {
        title.to_string()
    } else {
        format!("{title}.mp3")
    };
    format!(
        "{}/{}",
        public_audio_base_url.trim().trim_end_matches('/'),
        urlencoding::encode(&filename)
    )
}

/// Renders seconds as `m:ss`.
pub fn format_time(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "0:00".to_string();
    }
    let whole = secs.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

/// Milliseconds since the Unix epoch, used for `local-<millis>` ids.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// RFC 3339 UTC timestamp with millisecond precision, e.g. `2025-10-13T00:00:00.000Z`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_duration(text: &str) -> Option<f64> {
    let text = text.trim();
    let secs = match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes.trim().parse().ok()?;
            let seconds: f64 = seconds.trim().parse().ok()?;
            minutes as f64 * 60.0 + seconds
        }
        None => text.parse().ok()?,
    };
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

#[cfg(test)]
pub(crate) fn sample_song(id: &str, category: &str) -> Song {
    SongFields {
        title: format!("title-{id}"),
        category: category.to_string(),
        date: None,
        description: None,
        audio_url: Some(format!("https://cdn.example.org/{id}.mp3")),
        lyrics: None,
        youtube_url: None,
        duration: None,
        created_at: "2025-01-01T00:00:00Z".to_string(),
    }
    .into_song(id.to_string())
}
