mod admin_gate;
mod app_context;
mod app_runtime;
mod backends;
mod catalog;
mod command_input;
mod config;
mod credential_store;
mod db_manager;
mod error;
mod library_manager;
mod media;
mod playback_controller;
mod playlist;
mod protocol;
mod realtime;
mod reconciliation;

use std::time::Duration;

use app_context::AppContext;
use app_runtime::AppRuntime;
use config::{apply_env_overrides, load_or_create, sanitize_config};
use log::info;
use media::HeadlessMediaElement;
use playback_controller::PlaybackController;
use playlist::Playlist;
use tokio::sync::broadcast;

const MEDIA_TICK: Duration = Duration::from_millis(250);

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_dir = dirs::config_dir().ok_or("no configuration directory on this platform")?;
    let config_file = config_dir.join("symusic").join("config.toml");
    let config = sanitize_config(apply_env_overrides(load_or_create(&config_file), |key| {
        std::env::var(key).ok()
    }));
    log::set_max_level(config.log_level());

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);
    let bus_receiver = bus_sender.subscribe();

    let playback_settings = config.playback_settings();
    let context = AppContext::init(config, bus_sender.clone())?;
    let media = HeadlessMediaElement::new(bus_sender.clone(), MEDIA_TICK);
    let controller = PlaybackController::new(Playlist::new(), media, playback_settings);

    let mut runtime = AppRuntime::new(context, controller, bus_receiver);
    runtime.start();
    command_input::spawn_stdin_reader(bus_sender.clone())?;
    info!("{}", command_input::USAGE);

    let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runtime.run()));
    if let Err(payload) = run_result {
        log::error!(
            "AppRuntime terminated due to panic: {}",
            panic_payload_to_string(payload.as_ref())
        );
    }

    info!("Application exiting");
    Ok(())
}
