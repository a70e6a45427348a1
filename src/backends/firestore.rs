//! Firestore REST document store and Firebase identity-toolkit authentication.

use std::time::Duration;

use log::debug;
use serde_json::{json, Map, Value};

use crate::backends::{AuthService, BackendSession, DocumentStore};
use crate::catalog::{Category, Song, SongFields};
use crate::error::{PlayerError, Result};
use crate::protocol::Collection;

const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const PAGE_SIZE: usize = 300;
/// Fields an admin edit may change. Masked fields missing from the body are cleared remotely.
const SONG_EDITABLE_FIELDS: [&str; 6] = [
    "title",
    "category",
    "description",
    "youtubeUrl",
    "lyrics",
    "audioUrl",
];

/// Validated connection settings for the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub project_id: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout.min(Duration::from_secs(5)))
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

fn error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Maps an HTTP status from the document API onto the error taxonomy.
fn classify_status(context: &str, status: u16, body: &str) -> PlayerError {
    let message = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 | 403 => PlayerError::PermissionDenied(format!("{context}: {message}")),
        404 => PlayerError::NotFound(format!("{context}: {message}")),
        408 | 429 | 500..=599 => PlayerError::RemoteUnavailable(format!("{context}: {message}")),
        _ => PlayerError::Remote(format!("{context}: {message}")),
    }
}

fn map_request_error(context: &str, err: ureq::Error) -> PlayerError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            classify_status(context, status, &body)
        }
        ureq::Error::Transport(transport) => {
            PlayerError::RemoteUnavailable(format!("{context}: {transport}"))
        }
    }
}

fn read_json(context: &str, response: ureq::Response) -> Result<Value> {
    response
        .into_json()
        .map_err(|err| PlayerError::Remote(format!("{context}: malformed response: {err}")))
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    let value = fields.get(name)?;
    value
        .get("stringValue")
        .or_else(|| value.get("timestampValue"))
        .or_else(|| value.get("integerValue"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .or_else(|| value.get("doubleValue").and_then(Value::as_f64).map(|n| n.to_string()))
}

fn document_id(document: &Value) -> Option<String> {
    document
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_song(document: &Value) -> Option<Song> {
    let id = document_id(document)?;
    let fields = document.get("fields")?.as_object()?;
    Some(Song {
        id,
        title: string_field(fields, "title")?,
        category: string_field(fields, "category").unwrap_or_default(),
        date: string_field(fields, "date"),
        description: string_field(fields, "description"),
        audio_url: string_field(fields, "audioUrl"),
        lyrics: string_field(fields, "lyrics"),
        youtube_url: string_field(fields, "youtubeUrl"),
        duration: string_field(fields, "duration"),
        created_at: string_field(fields, "created_at").unwrap_or_default(),
    })
}

fn parse_category(document: &Value) -> Option<Category> {
    let id = document_id(document)?;
    let fields = document.get("fields")?.as_object()?;
    Some(Category {
        id,
        name: string_field(fields, "name")?,
        created_at: string_field(fields, "created_at").unwrap_or_default(),
    })
}

fn insert_string(fields: &mut Map<String, Value>, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), json!({ "stringValue": value }));
    }
}

fn song_document(song: &SongFields) -> Value {
    let mut fields = Map::new();
    insert_string(&mut fields, "title", Some(&song.title));
    insert_string(&mut fields, "category", Some(&song.category));
    insert_string(&mut fields, "date", song.date.as_deref());
    insert_string(&mut fields, "description", song.description.as_deref());
    insert_string(&mut fields, "audioUrl", song.audio_url.as_deref());
    insert_string(&mut fields, "lyrics", song.lyrics.as_deref());
    insert_string(&mut fields, "youtubeUrl", song.youtube_url.as_deref());
    insert_string(&mut fields, "duration", song.duration.as_deref());
    insert_string(&mut fields, "created_at", Some(&song.created_at));
    json!({ "fields": fields })
}

/// Update mask query and body for an edit. Cleared optional fields are in the mask but not
/// in the body, so the store deletes them.
fn song_update(song: &SongFields) -> (Vec<(&'static str, String)>, Value) {
    let mut fields = Map::new();
    insert_string(&mut fields, "title", Some(&song.title));
    insert_string(&mut fields, "category", Some(&song.category));
    insert_string(&mut fields, "description", song.description.as_deref());
    insert_string(&mut fields, "youtubeUrl", song.youtube_url.as_deref());
    insert_string(&mut fields, "lyrics", song.lyrics.as_deref());
    insert_string(&mut fields, "audioUrl", song.audio_url.as_deref());
    let mask = SONG_EDITABLE_FIELDS
        .iter()
        .map(|name| ("updateMask.fieldPaths", (*name).to_string()))
        .collect();
    (mask, json!({ "fields": fields }))
}

/// Document store backed by the Firestore REST API.
pub struct FirestoreStore {
    http_client: ureq::Agent,
    base_url: String,
    settings: RemoteSettings,
}

impl FirestoreStore {
    pub fn new(settings: RemoteSettings) -> Self {
        Self {
            http_client: build_agent(settings.request_timeout),
            base_url: FIRESTORE_BASE_URL.to_string(),
            settings,
        }
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.base_url,
            urlencoding::encode(&self.settings.project_id),
            collection.name()
        )
    }

    fn document_url(&self, collection: Collection, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    fn with_key(&self, url: &str, extra_query: &[(&str, String)]) -> String {
        let mut query_parts: Vec<String> = extra_query
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        query_parts.push(format!("key={}", urlencoding::encode(&self.settings.api_key)));
        format!("{url}?{}", query_parts.join("&"))
    }

    fn authorize(request: ureq::Request, session: Option<&BackendSession>) -> ureq::Request {
        match session {
            Some(session) => request.set("Authorization", &format!("Bearer {}", session.id_token)),
            None => request,
        }
    }

    /// Lists every document of a collection, newest first.
    fn list_documents(&self, collection: Collection) -> Result<Vec<Value>> {
        let context = format!("list {}", collection.name());
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("orderBy", "created_at desc".to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let url = self.with_key(&self.collection_url(collection), &query);
            let response = self
                .http_client
                .get(&url)
                .call()
                .map_err(|err| map_request_error(&context, err))?;
            let payload = read_json(&context, response)?;
            if let Some(Value::Array(page)) = payload.get("documents") {
                documents.extend(page.iter().cloned());
            }
            page_token = payload
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(ToOwned::to_owned);
            if page_token.is_none() {
                break;
            }
        }
        debug!(
            "FirestoreStore: listed {} documents from {}",
            documents.len(),
            collection.name()
        );
        Ok(documents)
    }

    fn create_document(
        &self,
        collection: Collection,
        body: Value,
        session: Option<&BackendSession>,
    ) -> Result<String> {
        let context = format!("create {} document", collection.name());
        let url = self.with_key(&self.collection_url(collection), &[]);
        let request = Self::authorize(self.http_client.post(&url), session);
        let response = request
            .send_json(body)
            .map_err(|err| map_request_error(&context, err))?;
        let payload = read_json(&context, response)?;
        document_id(&payload)
            .ok_or_else(|| PlayerError::Remote(format!("{context}: response missing document name")))
    }
}

impl DocumentStore for FirestoreStore {
    fn list_songs(&self) -> Result<Vec<Song>> {
        Ok(self
            .list_documents(Collection::Songs)?
            .iter()
            .filter_map(parse_song)
            .collect())
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .list_documents(Collection::Categories)?
            .iter()
            .filter_map(parse_category)
            .collect())
    }

    fn add_song(&self, fields: &SongFields, session: Option<&BackendSession>) -> Result<String> {
        self.create_document(Collection::Songs, song_document(fields), session)
    }

    fn update_song(
        &self,
        id: &str,
        fields: &SongFields,
        session: Option<&BackendSession>,
    ) -> Result<()> {
        let context = format!("update song {id}");
        let (mask, body) = song_update(fields);
        let url = self.with_key(&self.document_url(Collection::Songs, id), &mask);
        let request = Self::authorize(self.http_client.request("PATCH", &url), session);
        request
            .send_json(body)
            .map_err(|err| map_request_error(&context, err))?;
        Ok(())
    }

    fn delete_song(&self, id: &str, session: Option<&BackendSession>) -> Result<()> {
        let context = format!("delete song {id}");
        let url = self.with_key(&self.document_url(Collection::Songs, id), &[]);
        let request = Self::authorize(self.http_client.delete(&url), session);
        request
            .call()
            .map_err(|err| map_request_error(&context, err))?;
        Ok(())
    }

    fn add_category(
        &self,
        name: &str,
        created_at: &str,
        session: Option<&BackendSession>,
    ) -> Result<String> {
        let body = json!({
            "fields": {
                "name": { "stringValue": name },
                "created_at": { "stringValue": created_at },
            }
        });
        self.create_document(Collection::Categories, body, session)
    }
}

/// Email/password sign-in against the Firebase identity toolkit.
pub struct FirebaseAuth {
    http_client: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl FirebaseAuth {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            http_client: build_agent(settings.request_timeout),
            base_url: IDENTITY_TOOLKIT_BASE_URL.to_string(),
            api_key: settings.api_key.clone(),
        }
    }
}

impl AuthService for FirebaseAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<BackendSession> {
        let url = format!(
            "{}/accounts:signInWithPassword?key={}",
            self.base_url,
            urlencoding::encode(&self.api_key)
        );
        let response = self
            .http_client
            .post(&url)
            .send_json(json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .map_err(|err| match err {
                ureq::Error::Status(status, response) => {
                    let body = response.into_string().unwrap_or_default();
                    PlayerError::BackendAuth(
                        error_message(&body).unwrap_or_else(|| format!("HTTP {status}")),
                    )
                }
                ureq::Error::Transport(transport) => {
                    PlayerError::RemoteUnavailable(format!("sign in: {transport}"))
                }
            })?;
        let payload = read_json("sign in", response)?;
        let id_token = payload
            .get("idToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| PlayerError::BackendAuth("response missing id token".to_string()))?;
        let email = payload
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or(email);
        Ok(BackendSession {
            email: email.to_string(),
            id_token: id_token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_song_fields;

    fn settings() -> RemoteSettings {
        RemoteSettings {
            project_id: "symusic-test".to_string(),
            api_key: "key with space".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_status_codes_map_to_error_taxonomy() {
        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            classify_status("create songs document", 403, body),
            PlayerError::PermissionDenied(
                "create songs document: Missing or insufficient permissions.".to_string()
            )
        );
        assert!(matches!(
            classify_status("list songs", 503, ""),
            PlayerError::RemoteUnavailable(_)
        ));
        assert!(matches!(
            classify_status("list songs", 400, "not json"),
            PlayerError::Remote(_)
        ));
    }

    #[test]
    fn test_parse_song_document() {
        let document = json!({
            "name": "projects/p/databases/(default)/documents/songs/abc123",
            "fields": {
                "title": { "stringValue": "Morning" },
                "category": { "stringValue": "QT" },
                "audioUrl": { "stringValue": "https://cdn.example.org/Morning.mp3" },
                "created_at": { "timestampValue": "2025-01-01T00:00:00Z" }
            }
        });
        let song = parse_song(&document).expect("valid song document");
        assert_eq!(song.id, "abc123");
        assert_eq!(song.title, "Morning");
        assert_eq!(song.audio_url.as_deref(), Some("https://cdn.example.org/Morning.mp3"));
        assert_eq!(song.created_at, "2025-01-01T00:00:00Z");
        assert_eq!(song.lyrics, None);

        let untitled = json!({ "name": "x/songs/def", "fields": {} });
        assert!(parse_song(&untitled).is_none());
    }

    #[test]
    fn test_song_document_omits_missing_fields() {
        let document = song_document(&default_song_fields());
        let fields = document["fields"].as_object().expect("fields object");
        assert_eq!(fields["title"]["stringValue"], "그 손이 일하시네");
        assert!(fields.contains_key("audioUrl"));
        assert!(!fields.contains_key("youtubeUrl"));
        assert!(!fields.contains_key("duration"));
    }

    #[test]
    fn test_update_mask_covers_every_editable_field() {
        let mut fields = default_song_fields();
        fields.description = None;
        fields.youtube_url = None;
        let (mask, body) = song_update(&fields);

        let masked: Vec<&str> = mask
            .iter()
            .map(|(key, value)| {
                assert_eq!(*key, "updateMask.fieldPaths");
                value.as_str()
            })
            .collect();
        assert_eq!(
            masked,
            ["title", "category", "description", "youtubeUrl", "lyrics", "audioUrl"]
        );

        let sent = body["fields"].as_object().expect("fields object");
        assert!(!sent.contains_key("description"));
        assert!(!sent.contains_key("youtubeUrl"));
        assert!(!sent.contains_key("created_at"));
        assert_eq!(sent["lyrics"]["stringValue"], fields.lyrics.as_deref().unwrap_or_default());
    }

    #[test]
    fn test_urls_encode_key_and_query() {
        let store = FirestoreStore::new(settings());
        let url = store.with_key(
            &store.collection_url(Collection::Songs),
            &[("orderBy", "created_at desc".to_string())],
        );
        assert_eq!(
            url,
            "https://firestore.googleapis.com/v1/projects/symusic-test/databases/(default)/documents/songs?orderBy=created_at%20desc&key=key%20with%20space"
        );
        assert!(store
            .document_url(Collection::Songs, "abc")
            .ends_with("/documents/songs/abc"));
    }
}
