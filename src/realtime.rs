//! Realtime collection subscriptions implemented by polling the document store.
//!
//! Each subscription owns one poller thread. A snapshot is posted to the bus whenever the
//! collection contents change, tagged with a per-subscription revision that only increases.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use tokio::sync::broadcast::Sender;

use crate::backends::DocumentStore;
use crate::catalog::{Category, Song};
use crate::error::PlayerError;
use crate::protocol::{Collection, LibraryMessage, Message};

const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(PartialEq)]
enum Payload {
    Songs(Vec<Song>),
    Categories(Vec<Category>),
}

fn fetch(store: &dyn DocumentStore, collection: Collection) -> Result<Payload, PlayerError> {
    match collection {
        Collection::Songs => store.list_songs().map(Payload::Songs),
        Collection::Categories => store.list_categories().map(Payload::Categories),
    }
}

/// Handle to a running poller. Dropping it unsubscribes.
pub struct SnapshotSubscription {
    collection: Collection,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SnapshotSubscription {
    pub fn subscribe(
        store: Arc<dyn DocumentStore>,
        collection: Collection,
        poll_interval: Duration,
        bus_sender: Sender<Message>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name(format!("snapshot-{}", collection.name()))
            .spawn(move || {
                Self::poll_loop(
                    store.as_ref(),
                    collection,
                    poll_interval,
                    &bus_sender,
                    &worker_running,
                )
            });
        let worker = match worker {
            Ok(worker) => Some(worker),
            Err(err) => {
                warn!(
                    "SnapshotSubscription: failed to start {} poller: {}",
                    collection.name(),
                    err
                );
                None
            }
        };
        Self {
            collection,
            running,
            worker,
        }
    }

    fn poll_loop(
        store: &dyn DocumentStore,
        collection: Collection,
        poll_interval: Duration,
        bus_sender: &Sender<Message>,
        running: &AtomicBool,
    ) {
        let mut revision = 0u64;
        let mut last_delivered: Option<Payload> = None;
        let mut last_error: Option<PlayerError> = None;

        while running.load(Ordering::Relaxed) {
            let started = Instant::now();
            let result = fetch(store, collection);
            if !running.load(Ordering::Relaxed) {
                break;
            }
            match result {
                Ok(payload) => {
                    last_error = None;
                    if last_delivered.as_ref() != Some(&payload) {
                        revision += 1;
                        let message = match &payload {
                            Payload::Songs(songs) => LibraryMessage::SongsSnapshot {
                                revision,
                                songs: songs.clone(),
                            },
                            Payload::Categories(categories) => LibraryMessage::CategoriesSnapshot {
                                revision,
                                categories: categories.clone(),
                            },
                        };
                        debug!(
                            "SnapshotSubscription: {} revision {}",
                            collection.name(),
                            revision
                        );
                        let _ = bus_sender.send(Message::Library(message));
                        last_delivered = Some(payload);
                    }
                }
                Err(err) => {
                    if last_error.as_ref() != Some(&err) {
                        warn!(
                            "SnapshotSubscription: {} poll failed: {}",
                            collection.name(),
                            err
                        );
                        let _ = bus_sender.send(Message::Library(LibraryMessage::SnapshotFailed {
                            collection,
                            error: err.clone(),
                        }));
                        last_error = Some(err);
                    }
                }
            }

            let deadline = started + poll_interval;
            while running.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
            }
        }
        debug!("SnapshotSubscription: {} poller stopped", collection.name());
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Stops the poller. No snapshot is delivered after this returns.
    pub fn unsubscribe(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SnapshotSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
