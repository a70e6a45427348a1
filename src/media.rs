//! Media-playback primitive driven by the playback controller.
//!
//! The controller only talks to [`MediaElement`]; completions (metadata, progress, end,
//! errors) come back over the bus as [`MediaEvent`]s tagged with the load session.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};
use tokio::sync::broadcast::Sender;

use crate::error::{PlayerError, Result};
use crate::protocol::{MediaEvent, Message};

/// What to load: the resolved audio URL plus an optional known length.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub url: String,
    pub duration_hint: Option<f64>,
}

/// Playback primitive. A new `load_and_play` supersedes any previous load.
pub trait MediaElement {
    fn load_and_play(&mut self, session: u64, source: &MediaSource) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self) -> Result<()>;
    fn seek(&mut self, position_secs: f64);
    /// Output gain in `[0, 1]`.
    fn set_volume(&mut self, level: f32);
}

fn validate_source(url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        return Ok(());
    }
    if let Some(path) = url.strip_prefix("file://") {
        if Path::new(path).is_file() {
            return Ok(());
        }
        return Err(PlayerError::Playback(format!("audio file not found: {path}")));
    }
    Err(PlayerError::Playback(format!(
        "unsupported audio source: {url}"
    )))
}

#[derive(Debug)]
struct ClockState {
    session: u64,
    loaded: bool,
    playing: bool,
    position_secs: f64,
    duration_secs: Option<f64>,
    volume: f32,
    last_tick: Instant,
}

/// Wall-clock media element for running without an audio device.
///
/// It tracks position while "playing", reports progress on a fixed tick and emits `Ended`
/// once the duration hint is reached. Sources without a hint play until paused or replaced.
pub struct HeadlessMediaElement {
    state: Arc<Mutex<ClockState>>,
    bus_sender: Sender<Message>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl HeadlessMediaElement {
    pub fn new(bus_sender: Sender<Message>, tick: Duration) -> Self {
        let state = Arc::new(Mutex::new(ClockState {
            session: 0,
            loaded: false,
            playing: false,
            position_secs: 0.0,
            duration_secs: None,
            volume: 1.0,
            last_tick: Instant::now(),
        }));
        let running = Arc::new(AtomicBool::new(true));

        let worker_state = Arc::clone(&state);
        let worker_running = Arc::clone(&running);
        let worker_sender = bus_sender.clone();
        let worker = thread::Builder::new()
            .name("media-clock".to_string())
            .spawn(move || {
                while worker_running.load(Ordering::Relaxed) {
                    thread::sleep(tick);
                    let event = {
                        let mut state = worker_state.lock().expect("media clock lock poisoned");
                        Self::advance(&mut state)
                    };
                    if let Some(event) = event {
                        let _ = worker_sender.send(Message::Media(event));
                    }
                }
                debug!("HeadlessMediaElement: clock stopped");
            })
            .ok();

        Self {
            state,
            bus_sender,
            running,
            worker,
        }
    }

    fn advance(state: &mut ClockState) -> Option<MediaEvent> {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_tick).as_secs_f64();
        state.last_tick = now;
        if !state.playing {
            return None;
        }
        state.position_secs += elapsed;
        if let Some(duration) = state.duration_secs {
            if state.position_secs >= duration {
                state.position_secs = duration;
                state.playing = false;
                return Some(MediaEvent::Ended {
                    session: state.session,
                });
            }
        }
        trace!(
            "HeadlessMediaElement: session {} at {:.2}s",
            state.session,
            state.position_secs
        );
        Some(MediaEvent::TimeUpdate {
            session: state.session,
            position_secs: state.position_secs,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().expect("media clock lock poisoned")
    }
}

impl MediaElement for HeadlessMediaElement {
    fn load_and_play(&mut self, session: u64, source: &MediaSource) -> Result<()> {
        validate_source(&source.url)?;
        {
            let mut state = self.lock();
            state.session = session;
            state.loaded = true;
            state.playing = true;
            state.position_secs = 0.0;
            state.duration_secs = source.duration_hint;
            state.last_tick = Instant::now();
        }
        debug!(
            "HeadlessMediaElement: session {} loaded {}",
            session, source.url
        );
        if let Some(duration_secs) = source.duration_hint {
            let _ = self.bus_sender.send(Message::Media(MediaEvent::LoadedMetadata {
                session,
                duration_secs,
            }));
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.lock();
        Self::advance(&mut state);
        state.playing = false;
    }

    fn resume(&mut self) -> Result<()> {
        let mut state = self.lock();
        if !state.loaded {
            return Err(PlayerError::Playback("no audio source loaded".to_string()));
        }
        if let Some(duration) = state.duration_secs {
            if state.position_secs >= duration {
                state.position_secs = 0.0;
            }
        }
        state.last_tick = Instant::now();
        state.playing = true;
        Ok(())
    }

    fn seek(&mut self, position_secs: f64) {
        let mut state = self.lock();
        let upper = state.duration_secs.unwrap_or(f64::MAX);
        state.position_secs = position_secs.clamp(0.0, upper);
        state.last_tick = Instant::now();
    }

    fn set_volume(&mut self, level: f32) {
        self.lock().volume = level.clamp(0.0, 1.0);
    }
}

impl Drop for HeadlessMediaElement {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::broadcast;

    /// Records every call; `fail_next_load` makes the next load fail.
    #[derive(Default)]
    pub(crate) struct RecordingMedia {
        pub calls: Vec<String>,
        pub fail_next_load: bool,
        pub volume: f32,
    }

    impl MediaElement for RecordingMedia {
        fn load_and_play(&mut self, session: u64, source: &MediaSource) -> Result<()> {
            if std::mem::take(&mut self.fail_next_load) {
                self.calls.push(format!("load-failed:{}", source.url));
                return Err(PlayerError::Playback("decode error".to_string()));
            }
            self.calls.push(format!("load:{session}:{}", source.url));
            Ok(())
        }

        fn pause(&mut self) {
            self.calls.push("pause".to_string());
        }

        fn resume(&mut self) -> Result<()> {
            self.calls.push("resume".to_string());
            Ok(())
        }

        fn seek(&mut self, position_secs: f64) {
            self.calls.push(format!("seek:{position_secs}"));
        }

        fn set_volume(&mut self, level: f32) {
            self.volume = level;
            self.calls.push(format!("volume:{level}"));
        }
    }

    #[test]
    fn test_validate_source_rejects_unknown_schemes() {
        assert!(validate_source("https://cdn.example.org/a.mp3").is_ok());
        assert!(matches!(
            validate_source("ftp://cdn.example.org/a.mp3"),
            Err(PlayerError::Playback(_))
        ));
        assert!(validate_source("file:///definitely/not/here.mp3").is_err());
    }

    #[test]
    fn test_headless_element_reports_metadata_and_end() {
        let (bus_sender, _) = broadcast::channel(64);
        let mut observer = bus_sender.subscribe();
        let mut media = HeadlessMediaElement::new(bus_sender.clone(), Duration::from_millis(5));
        media
            .load_and_play(
                3,
                &MediaSource {
                    url: "https://cdn.example.org/a.mp3".to_string(),
                    duration_hint: Some(0.02),
                },
            )
            .expect("load succeeds");

        let mut saw_metadata = false;
        let mut saw_end = false;
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline && !saw_end {
            match observer.try_recv() {
                Ok(Message::Media(MediaEvent::LoadedMetadata { session, .. })) => {
                    assert_eq!(session, 3);
                    saw_metadata = true;
                }
                Ok(Message::Media(MediaEvent::Ended { session })) => {
                    assert_eq!(session, 3);
                    saw_end = true;
                }
                Ok(_) => {}
                Err(_) => thread::sleep(Duration::from_millis(2)),
            }
        }
        assert!(saw_metadata);
        assert!(saw_end);
    }

    #[test]
    fn test_headless_resume_without_source_fails() {
        let (bus_sender, _) = broadcast::channel(8);
        let mut media = HeadlessMediaElement::new(bus_sender, Duration::from_millis(50));
        assert!(media.resume().is_err());
    }
}
