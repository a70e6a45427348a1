//! Song and category state: snapshot application and admin CRUD, online or offline.
//!
//! The song list itself lives in the playback controller's playlist; this manager decides
//! what goes into it. Remote writes run on a worker thread and report back over the bus.

use std::{
    sync::{mpsc, Arc},
    thread,
};

use log::{debug, error, info, warn};
use tokio::sync::broadcast::Sender;

use crate::admin_gate::AdminGate;
use crate::backends::{BackendSession, DocumentStore};
use crate::catalog::{
    default_song_fields, now_iso8601, now_millis, Category, Song, SongDraft, SongFields,
    DEFAULT_CATEGORY_NAMES, DEFAULT_SONG_TITLE,
};
use crate::db_manager::DbManager;
use crate::error::{PlayerError, Result};
use crate::media::MediaElement;
use crate::playback_controller::PlaybackController;
use crate::protocol::{LibraryMessage, Message, Notice, NoticeLevel, RemoteWrite};
use crate::reconciliation::{
    bootstrap_offline, CategoriesReconciled, ReconciliationPolicy,
};

enum WriteOp {
    AddSong(SongFields),
    UpdateSong { id: String, fields: SongFields },
    DeleteSong { id: String },
    InstallDefaultSong,
    SeedCategories,
}

struct WriteJob {
    write: RemoteWrite,
    op: WriteOp,
    session: Option<BackendSession>,
}

/// Serial remote-write worker. Completions are posted as `RemoteWriteCompleted`.
struct RemoteWriter {
    job_sender: Option<mpsc::Sender<WriteJob>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RemoteWriter {
    fn start(store: Arc<dyn DocumentStore>, bus_sender: Sender<Message>) -> Self {
        let (job_sender, job_receiver) = mpsc::channel::<WriteJob>();
        let worker = thread::Builder::new()
            .name("remote-writer".to_string())
            .spawn(move || {
                while let Ok(job) = job_receiver.recv() {
                    let result = Self::execute(store.as_ref(), job.op, job.session.as_ref());
                    if let Err(err) = &result {
                        warn!("RemoteWriter: {:?} failed: {}", job.write, err);
                    }
                    let _ = bus_sender.send(Message::Library(
                        LibraryMessage::RemoteWriteCompleted {
                            write: job.write,
                            result,
                        },
                    ));
                }
                debug!("RemoteWriter: stopped");
            });
        let worker = match worker {
            Ok(worker) => Some(worker),
            Err(err) => {
                error!("RemoteWriter: failed to start worker: {}", err);
                None
            }
        };
        Self {
            job_sender: Some(job_sender),
            worker,
        }
    }

    fn execute(
        store: &dyn DocumentStore,
        op: WriteOp,
        session: Option<&BackendSession>,
    ) -> Result<()> {
        match op {
            WriteOp::AddSong(fields) => store.add_song(&fields, session).map(|_| ()),
            WriteOp::UpdateSong { id, fields } => store.update_song(&id, &fields, session),
            WriteOp::DeleteSong { id } => store.delete_song(&id, session),
            WriteOp::InstallDefaultSong => {
                if store.find_song_by_title(DEFAULT_SONG_TITLE)?.is_some() {
                    debug!("RemoteWriter: default song already present remotely");
                    return Ok(());
                }
                store.add_song(&default_song_fields(), session)?;
                Ok(())
            }
            WriteOp::SeedCategories => {
                let created_at = now_iso8601();
                let mut first_error = None;
                for name in DEFAULT_CATEGORY_NAMES {
                    if let Err(err) = store.add_category(name, &created_at, session) {
                        warn!("RemoteWriter: failed to seed category {}: {}", name, err);
                        first_error.get_or_insert(err);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    fn submit(&self, write: RemoteWrite, op: WriteOp, session: Option<BackendSession>) -> Result<()> {
        let sender = self
            .job_sender
            .as_ref()
            .ok_or_else(|| PlayerError::RemoteUnavailable("remote writer stopped".to_string()))?;
        sender
            .send(WriteJob { write, op, session })
            .map_err(|_| PlayerError::RemoteUnavailable("remote writer stopped".to_string()))
    }
}

impl Drop for RemoteWriter {
    fn drop(&mut self) {
        // Closing the queue lets already-issued writes finish
        self.job_sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

pub struct LibraryManager {
    categories: Vec<Category>,
    policy: ReconciliationPolicy,
    // None in offline mode
    writer: Option<RemoteWriter>,
    add_in_flight: bool,
    public_audio_base_url: String,
}

impl LibraryManager {
    /// Online library: remote writes go through the document store.
    pub fn online(
        store: Arc<dyn DocumentStore>,
        bus_sender: Sender<Message>,
        public_audio_base_url: String,
    ) -> Self {
        Self {
            categories: Vec::new(),
            policy: ReconciliationPolicy::new(),
            writer: Some(RemoteWriter::start(store, bus_sender)),
            add_in_flight: false,
            public_audio_base_url,
        }
    }

    /// Offline library: every change stays in the local cache.
    pub fn offline(public_audio_base_url: String) -> Self {
        Self {
            categories: Vec::new(),
            policy: ReconciliationPolicy::new(),
            writer: None,
            add_in_flight: false,
            public_audio_base_url,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.writer.is_none()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Shows whatever the cache holds while the first snapshot is on its way.
    pub fn load_cached<M: MediaElement>(
        &mut self,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
    ) {
        if self.is_offline() {
            let library = bootstrap_offline(cache);
            self.categories = library.categories;
            controller.replace_songs(library.songs);
            return;
        }
        if let Some(songs) = cache.load_songs() {
            debug!("LibraryManager: showing {} cached songs", songs.len());
            controller.replace_songs(songs);
        }
        if let Some(categories) = cache.load_categories() {
            self.categories = categories;
        }
    }

    fn submit(&self, write: RemoteWrite, op: WriteOp, session: Option<&BackendSession>) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.submit(write, op, session.cloned()),
            None => Err(PlayerError::RemoteUnavailable("library is offline".to_string())),
        }
    }

    pub fn on_songs_snapshot<M: MediaElement>(
        &mut self,
        revision: u64,
        songs: Vec<Song>,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
        session: Option<&BackendSession>,
    ) {
        let Some(reconciled) =
            self.policy
                .on_songs_snapshot(revision, controller.playlist().songs(), songs, cache)
        else {
            return;
        };
        controller.replace_songs(reconciled.songs);
        if reconciled.install_default_remotely {
            if let Err(err) = self.submit(RemoteWrite::InstallDefaultSong, WriteOp::InstallDefaultSong, session) {
                warn!("LibraryManager: could not queue default song install: {}", err);
            }
        }
    }

    pub fn on_categories_snapshot(
        &mut self,
        revision: u64,
        categories: Vec<Category>,
        cache: &DbManager,
        session: Option<&BackendSession>,
    ) {
        match self.policy.on_categories_snapshot(revision, categories, cache) {
            Some(CategoriesReconciled::Replace(categories)) => self.categories = categories,
            Some(CategoriesReconciled::SeedRemotely) => {
                info!("LibraryManager: category collection empty, seeding defaults");
                if let Err(err) =
                    self.submit(RemoteWrite::SeedCategories, WriteOp::SeedCategories, session)
                {
                    warn!("LibraryManager: could not queue category seeding: {}", err);
                }
            }
            Some(CategoriesReconciled::Unchanged) | None => {}
        }
    }

    /// Adds a song from the admin form.
    pub fn add_song<M: MediaElement>(
        &mut self,
        draft: SongDraft,
        gate: &AdminGate,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
    ) -> Result<Notice> {
        gate.require_admin()?;
        if self.add_in_flight {
            return Err(PlayerError::Busy("song upload"));
        }
        let fields = draft.into_fields(&self.public_audio_base_url, now_iso8601())?;
        let title = fields.title.clone();
        Self::ensure_title_available(controller, &title, None)?;

        if self.is_offline() {
            let song = fields.into_song(format!("local-{}", now_millis()));
            let mut songs = Vec::with_capacity(controller.playlist().num_songs() + 1);
            songs.push(song);
            songs.extend(controller.playlist().songs().iter().cloned());
            self.store_offline(songs, cache, controller);
            return Ok(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' added (offline)"),
            ));
        }

        self.submit(
            RemoteWrite::AddSong {
                title: title.clone(),
            },
            WriteOp::AddSong(fields),
            gate.session(),
        )?;
        self.add_in_flight = true;
        Ok(Notice::new(NoticeLevel::Info, format!("adding '{title}'...")))
    }

    pub fn update_song<M: MediaElement>(
        &mut self,
        id: &str,
        draft: SongDraft,
        gate: &AdminGate,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
    ) -> Result<Notice> {
        gate.require_admin()?;
        let existing = Self::find_song(controller, id)?.clone();
        let mut fields = draft.into_fields(&self.public_audio_base_url, existing.created_at.clone())?;
        fields.date = existing.date.clone();
        fields.duration = existing.duration.clone();
        let title = fields.title.clone();
        if existing.is_default() && title != existing.title {
            return Err(PlayerError::ProtectedEntity(existing.title));
        }
        Self::ensure_title_available(controller, &title, Some(id))?;

        if self.is_offline() {
            let songs = controller
                .playlist()
                .songs()
                .iter()
                .map(|song| {
                    if song.id == id {
                        fields.clone().into_song(id.to_string())
                    } else {
                        song.clone()
                    }
                })
                .collect();
            self.store_offline(songs, cache, controller);
            return Ok(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' updated (offline)"),
            ));
        }

        self.submit(
            RemoteWrite::UpdateSong {
                title: title.clone(),
            },
            WriteOp::UpdateSong {
                id: id.to_string(),
                fields,
            },
            gate.session(),
        )?;
        Ok(Notice::new(NoticeLevel::Info, format!("updating '{title}'...")))
    }

    /// Deletes a song. Deleting the playing song stops playback once the delete is accepted.
    pub fn delete_song<M: MediaElement>(
        &mut self,
        id: &str,
        gate: &AdminGate,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
    ) -> Result<Notice> {
        let song = Self::find_song(controller, id)?;
        gate.check_delete(song)?;
        let title = song.title.clone();
        let is_playing_song = controller.current_song_id() == Some(id);

        if self.is_offline() {
            if is_playing_song {
                controller.stop();
            }
            let songs = controller
                .playlist()
                .songs()
                .iter()
                .filter(|song| song.id != id)
                .cloned()
                .collect();
            self.store_offline(songs, cache, controller);
            return Ok(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' deleted (offline)"),
            ));
        }

        self.submit(
            RemoteWrite::DeleteSong {
                title: title.clone(),
            },
            WriteOp::DeleteSong { id: id.to_string() },
            gate.session(),
        )?;
        if is_playing_song {
            controller.stop();
        }
        Ok(Notice::new(NoticeLevel::Info, format!("deleting '{title}'...")))
    }

    /// Turns a write completion into a notice. Bootstrap writes only log on failure.
    pub fn on_write_completed(
        &mut self,
        write: RemoteWrite,
        result: std::result::Result<(), PlayerError>,
    ) -> Option<Notice> {
        if matches!(write, RemoteWrite::AddSong { .. }) {
            self.add_in_flight = false;
        }
        match (write, result) {
            (RemoteWrite::AddSong { title }, Ok(())) => Some(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' added"),
            )),
            (RemoteWrite::UpdateSong { title }, Ok(())) => Some(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' updated"),
            )),
            (RemoteWrite::DeleteSong { title }, Ok(())) => Some(Notice::new(
                NoticeLevel::Success,
                format!("'{title}' deleted"),
            )),
            (RemoteWrite::InstallDefaultSong, Ok(())) => {
                info!("LibraryManager: default song installed remotely");
                None
            }
            (RemoteWrite::SeedCategories, Ok(())) => {
                info!("LibraryManager: default categories seeded remotely");
                None
            }
            (RemoteWrite::InstallDefaultSong | RemoteWrite::SeedCategories, Err(err)) => {
                warn!("LibraryManager: bootstrap write failed, not retrying: {}", err);
                None
            }
            (_, Err(err)) => Some(Notice::from_error(&err)),
        }
    }

    /// Releases the add guard when its completion may have been dropped from the bus.
    pub fn on_bus_lagged(&mut self) {
        if self.add_in_flight {
            warn!("LibraryManager: bus lagged while a song upload was pending, releasing guard");
            self.add_in_flight = false;
        }
    }

    /// Titles are the natural key; a second song with the same title is rejected.
    fn ensure_title_available<M: MediaElement>(
        controller: &PlaybackController<M>,
        title: &str,
        except_id: Option<&str>,
    ) -> Result<()> {
        let taken = controller
            .playlist()
            .songs()
            .iter()
            .any(|song| song.title == title && Some(song.id.as_str()) != except_id);
        if taken {
            return Err(PlayerError::Validation(format!(
                "a song titled '{title}' already exists"
            )));
        }
        Ok(())
    }

    fn find_song<'a, M: MediaElement>(
        controller: &'a PlaybackController<M>,
        id: &str,
    ) -> Result<&'a Song> {
        controller
            .playlist()
            .songs()
            .iter()
            .find(|song| song.id == id)
            .ok_or_else(|| PlayerError::NotFound(format!("song {id}")))
    }

    fn store_offline<M: MediaElement>(
        &self,
        songs: Vec<Song>,
        cache: &DbManager,
        controller: &mut PlaybackController<M>,
    ) {
        if let Err(err) = cache.save_songs(&songs) {
            warn!("LibraryManager: failed to persist offline change: {}", err);
        }
        controller.replace_songs(songs);
    }
}
