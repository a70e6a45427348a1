//! Playback state machine: `Stopped → Playing ⇄ Paused`, plus skip and track-end transitions.

use log::{debug, info, warn};

use crate::catalog::Song;
use crate::error::{PlayerError, Result};
use crate::media::{MediaElement, MediaSource};
use crate::playlist::Playlist;
use crate::protocol::{MediaEvent, RepeatMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

/// Startup playback preferences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub volume: u8,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            volume: 70,
            repeat_mode: RepeatMode::All,
            shuffle: false,
        }
    }
}

/// Owns the playlist, the current-track pointer and the media element.
pub struct PlaybackController<M: MediaElement> {
    playlist: Playlist,
    media: M,
    status: PlaybackStatus,
    // Source index into the unfiltered song list
    current_index: Option<usize>,
    current_song_id: Option<String>,
    selected_view_index: usize,
    session: u64,
    volume: u8,
    last_audible_volume: u8,
    muted: bool,
    current_time: f64,
    duration: Option<f64>,
}

impl<M: MediaElement> PlaybackController<M> {
    pub fn new(mut playlist: Playlist, mut media: M, settings: PlaybackSettings) -> Self {
        let volume = settings.volume.min(100);
        playlist.set_repeat_mode(settings.repeat_mode);
        playlist.set_shuffle(settings.shuffle);
        media.set_volume(f32::from(volume) / 100.0);
        Self {
            playlist,
            media,
            status: PlaybackStatus::Stopped,
            current_index: None,
            current_song_id: None,
            selected_view_index: 0,
            session: 0,
            volume,
            last_audible_volume: if volume > 0 { volume } else { 70 },
            muted: volume == 0,
            current_time: 0.0,
            duration: None,
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.current_index
            .and_then(|index| self.playlist.get_song(index))
    }

    /// Current track's position in the filtered view, if it is part of it.
    pub fn current_view_index(&self) -> Option<usize> {
        self.current_index
            .and_then(|index| self.playlist.view_index_of(index))
    }

    pub fn selected_view_index(&self) -> usize {
        self.selected_view_index
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    #[cfg(test)]
    pub(crate) fn media(&self) -> &M {
        &self.media
    }

    /// Plays the song at `view_index` of the filtered view.
    pub fn play(&mut self, view_index: usize) -> Result<()> {
        let view_len = self.playlist.view_len();
        let Some(source_index) = self.playlist.source_index_of(view_index) else {
            return Err(PlayerError::NotFound(format!(
                "track {view_index} (view has {view_len} tracks)"
            )));
        };
        self.start_source(source_index)?;
        self.selected_view_index = view_index;
        Ok(())
    }

    fn start_source(&mut self, source_index: usize) -> Result<()> {
        let song = self
            .playlist
            .get_song(source_index)
            .ok_or_else(|| PlayerError::NotFound(format!("track {source_index}")))?;
        let url = song
            .audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PlayerError::Playback(format!("no audio file for '{}'", song.title)))?
            .to_string();
        let source = MediaSource {
            url,
            duration_hint: song.duration_secs(),
        };
        let song_id = song.id.clone();
        let title = song.title.clone();

        let session = self.session.wrapping_add(1);
        if let Err(err) = self.media.load_and_play(session, &source) {
            warn!("PlaybackController: failed to play '{}': {}", title, err);
            return Err(err);
        }
        self.session = session;
        self.status = PlaybackStatus::Playing;
        self.current_index = Some(source_index);
        self.current_song_id = Some(song_id);
        self.current_time = 0.0;
        self.duration = source.duration_hint;
        info!("PlaybackController: now playing '{}' (session {})", title, session);
        Ok(())
    }

    /// `Playing → Paused`, `Paused → Playing`, `Stopped → Playing`.
    pub fn toggle_play(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing => {
                self.media.pause();
                self.status = PlaybackStatus::Paused;
                Ok(())
            }
            PlaybackStatus::Paused => {
                self.media.resume()?;
                self.status = PlaybackStatus::Playing;
                Ok(())
            }
            PlaybackStatus::Stopped => match self.current_index {
                Some(source_index) => self.start_source(source_index),
                None => self.play(self.selected_view_index),
            },
        }
    }

    /// Advances per the next-index algorithm. Returns `false` when there is no next track.
    pub fn skip_next(&mut self) -> Result<bool> {
        match self.playlist.next_view_index(self.current_view_index()) {
            Some(next) => self.play(next).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn skip_previous(&mut self) -> Result<bool> {
        match self.playlist.previous_view_index(self.current_view_index()) {
            Some(previous) => self.play(previous).map(|()| true),
            None => Ok(false),
        }
    }

    /// Applies a media callback. Events from superseded sessions are dropped.
    pub fn on_media_event(&mut self, event: MediaEvent) -> Result<()> {
        let session = match &event {
            MediaEvent::TimeUpdate { session, .. }
            | MediaEvent::LoadedMetadata { session, .. }
            | MediaEvent::Ended { session }
            | MediaEvent::Error { session, .. } => *session,
        };
        if session != self.session {
            debug!(
                "PlaybackController: dropping event from stale session {} (current {})",
                session, self.session
            );
            return Ok(());
        }
        match event {
            MediaEvent::TimeUpdate { position_secs, .. } => {
                self.current_time = position_secs;
                Ok(())
            }
            MediaEvent::LoadedMetadata { duration_secs, .. } => {
                if duration_secs.is_finite() && duration_secs > 0.0 {
                    self.duration = Some(duration_secs);
                }
                Ok(())
            }
            MediaEvent::Ended { .. } => self.handle_track_end(),
            MediaEvent::Error { message, .. } => {
                self.status = PlaybackStatus::Stopped;
                Err(PlayerError::Playback(message))
            }
        }
    }

    fn handle_track_end(&mut self) -> Result<()> {
        self.status = PlaybackStatus::Stopped;
        if self.playlist.repeat_mode() == RepeatMode::One && self.current_index.is_some() {
            self.media.seek(0.0);
            self.current_time = 0.0;
            self.media.resume()?;
            self.status = PlaybackStatus::Playing;
            return Ok(());
        }
        match self.playlist.next_view_index(self.current_view_index()) {
            Some(next) => self.play(next),
            None => {
                debug!("PlaybackController: reached end of view, stopping");
                Ok(())
            }
        }
    }

    /// Stops playback and forgets the current track.
    pub fn stop(&mut self) {
        self.media.pause();
        self.status = PlaybackStatus::Stopped;
        self.current_index = None;
        self.current_song_id = None;
        self.current_time = 0.0;
        self.duration = None;
    }

    /// Switches category; the selection moves to the first item of the new view.
    pub fn set_category(&mut self, category: &str) {
        self.playlist.set_category(category);
        self.selected_view_index = 0;
    }

    /// Replaces the song list, re-resolving the current track by id then title.
    pub fn replace_songs(&mut self, songs: Vec<Song>) {
        let previous = self.current_song().map(|song| (song.id.clone(), song.title.clone()));
        self.playlist.replace_songs(songs);

        self.current_index = previous.and_then(|(id, title)| {
            let songs = self.playlist.songs();
            songs
                .iter()
                .position(|song| song.id == id)
                .or_else(|| songs.iter().position(|song| song.title == title))
        });
        self.current_song_id = self.current_song().map(|song| song.id.clone());
        let view_len = self.playlist.view_len();
        if self.selected_view_index >= view_len {
            self.selected_view_index = 0;
        }
    }

    /// Id of the song the pointer refers to.
    pub fn current_song_id(&self) -> Option<&str> {
        self.current_song_id.as_deref()
    }

    /// Seeks to `fraction × duration`. Returns `false` while the duration is unknown.
    pub fn seek(&mut self, fraction: f64) -> bool {
        let Some(duration) = self.duration.filter(|duration| *duration > 0.0) else {
            return false;
        };
        if !fraction.is_finite() {
            return false;
        }
        let position = fraction.clamp(0.0, 1.0) * duration;
        self.media.seek(position);
        self.current_time = position;
        true
    }

    /// Sets volume in `[0, 100]`; zero mutes, anything else unmutes.
    pub fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(100);
        self.volume = volume;
        if volume == 0 {
            self.muted = true;
        } else {
            self.muted = false;
            self.last_audible_volume = volume;
        }
        self.media.set_volume(f32::from(volume) / 100.0);
    }

    pub fn toggle_mute(&mut self) {
        if self.muted {
            let restored = if self.volume > 0 {
                self.volume
            } else {
                self.last_audible_volume
            };
            self.set_volume(restored);
        } else {
            self.muted = true;
            self.media.set_volume(0.0);
        }
    }

    /// Flips shuffle; the permutation is regenerated when turned on.
    pub fn toggle_shuffle(&mut self) -> bool {
        let enabled = !self.playlist.is_shuffle_enabled();
        self.playlist.set_shuffle(enabled);
        enabled
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        let mode = self.playlist.repeat_mode().cycled();
        self.playlist.set_repeat_mode(mode);
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_song;
    use crate::media::tests::RecordingMedia;
    use rand::{rngs::StdRng, SeedableRng};

    fn controller_with(songs: Vec<Song>) -> PlaybackController<RecordingMedia> {
        let mut playlist = Playlist::with_rng(StdRng::seed_from_u64(11));
        playlist.replace_songs(songs);
        PlaybackController::new(playlist, RecordingMedia::default(), PlaybackSettings::default())
    }

    fn four_songs() -> Vec<Song> {
        vec![
            sample_song("a", "QT"),
            sample_song("b", "주일"),
            sample_song("c", "QT"),
            sample_song("d", "QT"),
        ]
    }

    #[test]
    fn test_play_rejects_out_of_range_index() {
        let mut controller = controller_with(four_songs());
        let err = controller.play(4).expect_err("index past the view");
        assert!(matches!(err, PlayerError::NotFound(_)));
        assert_eq!(controller.status(), PlaybackStatus::Stopped);
        assert!(controller.media().calls.iter().all(|c| !c.starts_with("load")));
    }

    #[test]
    fn test_play_maps_view_index_to_source_index() {
        let mut controller = controller_with(four_songs());
        controller.set_category("QT");
        controller.play(1).expect("play second QT song");
        assert_eq!(controller.current_index(), Some(2));
        assert_eq!(controller.current_view_index(), Some(1));
        assert_eq!(controller.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_failed_load_keeps_prior_state() {
        let mut controller = controller_with(four_songs());
        controller.play(0).expect("first play");
        controller.toggle_play().expect("pause");
        assert_eq!(controller.status(), PlaybackStatus::Paused);

        controller.media.fail_next_load = true;
        let err = controller.play(2).expect_err("load failure");
        assert!(matches!(err, PlayerError::Playback(_)));
        assert_eq!(controller.status(), PlaybackStatus::Paused);
        assert_eq!(controller.current_index(), Some(0));
    }

    #[test]
    fn test_song_without_audio_url_reports_playback_error() {
        let mut silent = sample_song("x", "QT");
        silent.audio_url = None;
        let mut controller = controller_with(vec![silent]);
        assert!(matches!(controller.play(0), Err(PlayerError::Playback(_))));
        assert_eq!(controller.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_toggle_play_cycles_states() {
        let mut controller = controller_with(four_songs());
        controller.toggle_play().expect("stopped → playing");
        assert_eq!(controller.status(), PlaybackStatus::Playing);
        assert_eq!(controller.current_index(), Some(0));
        controller.toggle_play().expect("playing → paused");
        assert_eq!(controller.status(), PlaybackStatus::Paused);
        controller.toggle_play().expect("paused → playing");
        assert_eq!(controller.status(), PlaybackStatus::Playing);
        assert_eq!(
            controller.media().calls.last().map(String::as_str),
            Some("resume")
        );
    }

    #[test]
    fn test_skip_next_is_cyclic_with_repeat_all() {
        let mut controller = controller_with(four_songs());
        controller.play(1).expect("play");
        for _ in 0..controller.playlist().view_len() {
            assert!(controller.skip_next().expect("skip"));
        }
        assert_eq!(controller.current_view_index(), Some(1));
    }

    #[test]
    fn test_skip_next_is_noop_at_end_with_repeat_off() {
        let mut controller = controller_with(four_songs());
        controller.cycle_repeat();
        controller.cycle_repeat();
        assert_eq!(controller.playlist().repeat_mode(), RepeatMode::Off);
        controller.play(3).expect("play last");
        assert!(!controller.skip_next().expect("no next"));
        assert_eq!(controller.current_index(), Some(3));
        assert!(controller.skip_previous().expect("previous"));
        assert_eq!(controller.current_index(), Some(2));
    }

    #[test]
    fn test_repeat_one_track_end_replays_same_index() {
        let mut controller = controller_with(four_songs());
        assert_eq!(controller.cycle_repeat(), RepeatMode::One);
        controller.play(2).expect("play");
        for _ in 0..5 {
            let session = controller.session;
            controller
                .on_media_event(MediaEvent::Ended { session })
                .expect("replay");
            assert_eq!(controller.current_index(), Some(2));
            assert_eq!(controller.status(), PlaybackStatus::Playing);
        }
        assert!(controller.media().calls.iter().any(|c| c == "seek:0"));
    }

    #[test]
    fn test_track_end_advances_or_stops() {
        let mut controller = controller_with(four_songs());
        controller.cycle_repeat();
        controller.cycle_repeat();
        controller.play(2).expect("play");
        let session = controller.session;
        controller
            .on_media_event(MediaEvent::Ended { session })
            .expect("advance");
        assert_eq!(controller.current_index(), Some(3));

        let session = controller.session;
        controller
            .on_media_event(MediaEvent::Ended { session })
            .expect("end of view");
        assert_eq!(controller.status(), PlaybackStatus::Stopped);
        assert_eq!(controller.current_index(), Some(3));
    }

    #[test]
    fn test_stale_session_events_are_ignored() {
        let mut controller = controller_with(four_songs());
        controller.play(0).expect("first");
        let stale = controller.session;
        controller.play(1).expect("second supersedes first");
        controller
            .on_media_event(MediaEvent::Ended { session: stale })
            .expect("ignored");
        assert_eq!(controller.current_index(), Some(1));
        assert_eq!(controller.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_media_error_reverts_to_not_playing() {
        let mut controller = controller_with(four_songs());
        controller.play(0).expect("play");
        let session = controller.session;
        let err = controller
            .on_media_event(MediaEvent::Error {
                session,
                message: "decode failed".to_string(),
            })
            .expect_err("surfaced");
        assert!(matches!(err, PlayerError::Playback(_)));
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_seek_requires_known_duration() {
        let mut controller = controller_with(four_songs());
        controller.play(0).expect("play");
        assert!(!controller.seek(0.5));

        let session = controller.session;
        controller
            .on_media_event(MediaEvent::LoadedMetadata {
                session,
                duration_secs: 200.0,
            })
            .expect("metadata");
        assert!(controller.seek(0.25));
        assert_eq!(controller.current_time(), 50.0);
        assert!(controller.seek(3.0));
        assert_eq!(controller.current_time(), 200.0);
    }

    #[test]
    fn test_volume_zero_mutes_and_nonzero_restores() {
        let mut controller = controller_with(four_songs());
        controller.set_volume(0);
        assert!(controller.is_muted());
        controller.set_volume(40);
        assert!(!controller.is_muted());
        assert_eq!(controller.volume(), 40);
        assert!((controller.media().volume - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_toggle_mute_restores_prior_volume() {
        let mut controller = controller_with(four_songs());
        controller.set_volume(55);
        controller.toggle_mute();
        assert!(controller.is_muted());
        assert_eq!(controller.media().volume, 0.0);
        controller.toggle_mute();
        assert!(!controller.is_muted());
        assert!((controller.media().volume - 0.55).abs() < f32::EPSILON);

        controller.set_volume(0);
        controller.toggle_mute();
        assert_eq!(controller.volume(), 55);
    }

    #[test]
    fn test_category_change_resets_selection_but_keeps_playing() {
        let mut controller = controller_with(four_songs());
        controller.play(3).expect("play");
        controller.set_category("주일");
        assert_eq!(controller.selected_view_index(), 0);
        assert_eq!(controller.status(), PlaybackStatus::Playing);
        assert_eq!(controller.current_index(), Some(3));
        assert_eq!(controller.current_view_index(), None);
    }

    #[test]
    fn test_replace_songs_follows_current_track() {
        let mut controller = controller_with(four_songs());
        controller.play(2).expect("play c");
        let mut reordered = four_songs();
        reordered.insert(0, sample_song("z", "QT"));
        controller.replace_songs(reordered);
        assert_eq!(controller.current_index(), Some(3));
        assert_eq!(controller.current_song_id(), Some("c"));

        controller.replace_songs(vec![sample_song("a", "QT")]);
        assert_eq!(controller.current_index(), None);
    }
}
