//! Single-threaded event loop that owns all player state and dispatches bus messages.

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    app_context::AppContext,
    catalog::format_time,
    error::PlayerError,
    media::MediaElement,
    playback_controller::{PlaybackController, PlaybackStatus},
    playlist::is_all_filter,
    protocol::{
        AdminMessage, LibraryMessage, Message, Notice, NoticeLevel, PlaybackMessage,
    },
};

pub(crate) struct AppRuntime<M: MediaElement> {
    context: AppContext,
    controller: PlaybackController<M>,
    bus_receiver: broadcast::Receiver<Message>,
}

impl<M: MediaElement> AppRuntime<M> {
    pub(crate) fn new(
        context: AppContext,
        controller: PlaybackController<M>,
        bus_receiver: broadcast::Receiver<Message>,
    ) -> Self {
        Self {
            context,
            controller,
            bus_receiver,
        }
    }

    /// Loads cached state and starts realtime delivery.
    pub(crate) fn start(&mut self) {
        self.context.start(&mut self.controller);
    }

    /// Runs until `Shutdown` arrives or every sender is gone.
    pub(crate) fn run(mut self) {
        loop {
            match self.bus_receiver.blocking_recv() {
                Ok(Message::Shutdown) => {
                    info!("AppRuntime: shutdown requested");
                    break;
                }
                Ok(message) => self.handle(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("AppRuntime: lagged on bus, skipped {} message(s)", skipped);
                    self.context.library.on_bus_lagged();
                }
                Err(RecvError::Closed) => break,
            }
        }
        self.controller.stop();
        self.context.teardown();
    }

    fn notify(&self, notice: Notice) {
        let _ = self.context.bus_sender.send(Message::Notice(notice));
    }

    fn notify_error(&self, err: &PlayerError) {
        self.notify(Notice::from_error(err));
    }

    pub(crate) fn handle(&mut self, message: Message) {
        match message {
            Message::Playback(message) => self.handle_playback(message),
            Message::Media(event) => {
                if let Err(err) = self.controller.on_media_event(event) {
                    self.notify_error(&err);
                }
            }
            Message::Library(message) => self.handle_library(message),
            Message::Admin(message) => self.handle_admin(message),
            Message::Notice(notice) => render_notice(&notice),
            Message::Shutdown => {}
        }
    }

    fn announce_now_playing(&self) {
        if let Some(song) = self.controller.current_song() {
            self.notify(Notice::new(
                NoticeLevel::Info,
                format!("now playing: {}", song.title),
            ));
        }
    }

    fn handle_playback(&mut self, message: PlaybackMessage) {
        match message {
            PlaybackMessage::PlayViewIndex(view_index) => match self.controller.play(view_index) {
                Ok(()) => self.announce_now_playing(),
                Err(err) => self.notify_error(&err),
            },
            PlaybackMessage::TogglePlay => {
                let was_stopped = self.controller.status() == PlaybackStatus::Stopped;
                match self.controller.toggle_play() {
                    Ok(()) if was_stopped => self.announce_now_playing(),
                    Ok(()) => {}
                    Err(err) => self.notify_error(&err),
                }
            }
            PlaybackMessage::Next => match self.controller.skip_next() {
                Ok(true) => self.announce_now_playing(),
                Ok(false) => debug!("AppRuntime: no next track"),
                Err(err) => self.notify_error(&err),
            },
            PlaybackMessage::Previous => match self.controller.skip_previous() {
                Ok(true) => self.announce_now_playing(),
                Ok(false) => debug!("AppRuntime: no previous track"),
                Err(err) => self.notify_error(&err),
            },
            PlaybackMessage::Seek(fraction) => {
                if !self.controller.seek(fraction) {
                    debug!("AppRuntime: seek ignored, duration unknown");
                }
            }
            PlaybackMessage::SetVolume(volume) => self.controller.set_volume(volume),
            PlaybackMessage::ToggleMute => self.controller.toggle_mute(),
            PlaybackMessage::ToggleShuffle => {
                let enabled = self.controller.toggle_shuffle();
                self.notify(Notice::new(
                    NoticeLevel::Info,
                    if enabled { "shuffle on" } else { "shuffle off" },
                ));
            }
            PlaybackMessage::CycleRepeat => {
                let mode = self.controller.cycle_repeat();
                self.notify(Notice::new(NoticeLevel::Info, mode.label()));
            }
            PlaybackMessage::SetCategory(category) => {
                let known = self.context.library.categories();
                let valid = is_all_filter(&category)
                    || known.is_empty()
                    || known.iter().any(|existing| existing.name == category);
                if valid {
                    self.controller.set_category(&category);
                } else {
                    self.notify_error(&PlayerError::NotFound(format!("category '{category}'")));
                }
            }
        }
    }

    fn handle_library(&mut self, message: LibraryMessage) {
        let context = &mut self.context;
        let result = match message {
            LibraryMessage::SongsSnapshot { revision, songs } => {
                context.library.on_songs_snapshot(
                    revision,
                    songs,
                    &context.cache,
                    &mut self.controller,
                    context.admin_gate.session(),
                );
                return;
            }
            LibraryMessage::CategoriesSnapshot {
                revision,
                categories,
            } => {
                context.library.on_categories_snapshot(
                    revision,
                    categories,
                    &context.cache,
                    context.admin_gate.session(),
                );
                return;
            }
            LibraryMessage::SnapshotFailed { collection, error } => {
                warn!(
                    "AppRuntime: {} snapshot failed: {}",
                    collection.name(),
                    error
                );
                Err(error)
            }
            LibraryMessage::AddSong(draft) => context.library.add_song(
                draft,
                &context.admin_gate,
                &context.cache,
                &mut self.controller,
            ),
            LibraryMessage::UpdateSong { id, draft } => context.library.update_song(
                &id,
                draft,
                &context.admin_gate,
                &context.cache,
                &mut self.controller,
            ),
            LibraryMessage::DeleteSong { id } => context.library.delete_song(
                &id,
                &context.admin_gate,
                &context.cache,
                &mut self.controller,
            ),
            LibraryMessage::RemoteWriteCompleted { write, result } => {
                if let Some(notice) = context.library.on_write_completed(write, result) {
                    self.notify(notice);
                }
                return;
            }
            LibraryMessage::PrintSongs => {
                self.print_songs();
                return;
            }
            LibraryMessage::PrintStatus => {
                self.print_status();
                return;
            }
        };
        match result {
            Ok(notice) => self.notify(notice),
            Err(err) => self.notify_error(&err),
        }
    }

    fn handle_admin(&mut self, message: AdminMessage) {
        let context = &mut self.context;
        let result = match message {
            AdminMessage::Login { password, remember } => context
                .admin_gate
                .login(&password, remember, &context.cache)
                .map(|()| Notice::new(NoticeLevel::Success, "admin mode enabled")),
            AdminMessage::Logout => {
                context.admin_gate.logout(&context.cache);
                Ok(Notice::new(NoticeLevel::Info, "admin mode disabled"))
            }
            AdminMessage::StoreBackendPassword(password) => context
                .store_backend_password(&password)
                .map(|()| Notice::new(NoticeLevel::Success, "backend password stored in keyring")),
            AdminMessage::ForgetBackendPassword => context
                .forget_backend_password()
                .map(|()| Notice::new(NoticeLevel::Info, "backend password removed from keyring")),
        };
        match result {
            Ok(notice) => self.notify(notice),
            Err(err) => self.notify_error(&err),
        }
    }

    fn print_songs(&self) {
        let playlist = self.controller.playlist();
        let current = self.controller.current_index();
        info!(
            "{} song(s) in '{}'{}",
            playlist.view_len(),
            playlist.category(),
            if self.context.is_offline() { " (offline)" } else { "" }
        );
        for (view_index, source_index) in playlist.view_source_indices().into_iter().enumerate() {
            let Some(song) = playlist.get_song(source_index) else {
                continue;
            };
            let marker = if current == Some(source_index) { ">" } else { " " };
            info!(
                "{} {:>3}  {}  [{}]  id={}",
                marker, view_index, song.title, song.category, song.id
            );
        }
        let categories: Vec<&str> = self
            .context
            .library
            .categories()
            .iter()
            .map(|category| category.name.as_str())
            .collect();
        info!("categories: {}", categories.join(", "));
    }

    fn print_status(&self) {
        let controller = &self.controller;
        let title = controller
            .current_song()
            .map(|song| song.title.as_str())
            .unwrap_or("-");
        let duration = controller
            .duration()
            .map(format_time)
            .unwrap_or_else(|| "-:--".to_string());
        info!(
            "{:?} '{}' {} / {} | volume {}{} | {} | shuffle {} | admin {}",
            controller.status(),
            title,
            format_time(controller.current_time()),
            duration,
            controller.volume(),
            if controller.is_muted() { " (muted)" } else { "" },
            controller.playlist().repeat_mode().label(),
            if controller.playlist().is_shuffle_enabled() { "on" } else { "off" },
            if self.context.admin_gate.is_admin() { "on" } else { "off" },
        );
    }
}

fn render_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice.text),
        NoticeLevel::Warning => warn!("{}", notice.text),
        NoticeLevel::Error => error!("{}", notice.text),
    }
}
