//! Line-oriented command driver reading from stdin.

use std::io::BufRead;
use std::thread;

use log::{debug, warn};
use tokio::sync::broadcast::Sender;

use crate::catalog::SongDraft;
use crate::protocol::{AdminMessage, LibraryMessage, Message, PlaybackMessage};

pub const USAGE: &str = "commands:
  play N | toggle | next | prev | seek FRACTION | volume 0-100 | mute
  shuffle | repeat | category NAME|all | list | status
  login PASSWORD [remember] | logout
  keyring set PASSWORD | keyring clear
  add TITLE | CATEGORY [| DESCRIPTION [| YOUTUBE_URL [| LYRICS]]]
  edit ID TITLE | CATEGORY [| DESCRIPTION [| YOUTUBE_URL [| LYRICS]]]
  delete ID | help | quit";

/// Parses a `|`-separated song form.
fn parse_draft(text: &str) -> Result<SongDraft, String> {
    let mut parts = text.split('|').map(str::trim);
    let title = parts.next().unwrap_or_default().to_string();
    let category = parts.next().unwrap_or_default().to_string();
    if title.is_empty() || category.is_empty() {
        return Err("expected TITLE | CATEGORY".to_string());
    }
    Ok(SongDraft {
        title,
        category,
        description: parts.next().unwrap_or_default().to_string(),
        youtube_url: parts.next().unwrap_or_default().to_string(),
        lyrics: parts.next().unwrap_or_default().replace("\\n", "\n"),
    })
}

fn required<'a>(argument: &'a str, name: &str) -> Result<&'a str, String> {
    if argument.is_empty() {
        Err(format!("missing {name}"))
    } else {
        Ok(argument)
    }
}

/// Parses one input line. `Ok(None)` for blank lines and `help`.
pub fn parse_command(line: &str) -> Result<Option<Message>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    let message = match command.to_ascii_lowercase().as_str() {
        "play" => {
            let index = required(argument, "track number")?
                .parse::<usize>()
                .map_err(|_| format!("invalid track number '{argument}'"))?;
            Message::Playback(PlaybackMessage::PlayViewIndex(index))
        }
        "toggle" | "pause" | "resume" => Message::Playback(PlaybackMessage::TogglePlay),
        "next" => Message::Playback(PlaybackMessage::Next),
        "prev" | "previous" => Message::Playback(PlaybackMessage::Previous),
        "seek" => {
            let fraction = required(argument, "position")?
                .parse::<f64>()
                .ok()
                .filter(|fraction| (0.0..=1.0).contains(fraction))
                .ok_or_else(|| format!("position must be within 0..1, got '{argument}'"))?;
            Message::Playback(PlaybackMessage::Seek(fraction))
        }
        "volume" => {
            let volume = required(argument, "volume")?
                .parse::<u8>()
                .ok()
                .filter(|volume| *volume <= 100)
                .ok_or_else(|| format!("volume must be within 0..100, got '{argument}'"))?;
            Message::Playback(PlaybackMessage::SetVolume(volume))
        }
        "mute" => Message::Playback(PlaybackMessage::ToggleMute),
        "shuffle" => Message::Playback(PlaybackMessage::ToggleShuffle),
        "repeat" => Message::Playback(PlaybackMessage::CycleRepeat),
        "category" => Message::Playback(PlaybackMessage::SetCategory(
            required(argument, "category name")?.to_string(),
        )),
        "list" => Message::Library(LibraryMessage::PrintSongs),
        "status" => Message::Library(LibraryMessage::PrintStatus),
        "login" => {
            let mut words = argument.split_whitespace();
            let password = words.next().ok_or("missing password")?.to_string();
            let remember = matches!(words.next(), Some("remember"));
            Message::Admin(AdminMessage::Login { password, remember })
        }
        "logout" => Message::Admin(AdminMessage::Logout),
        "keyring" => match argument.split_once(char::is_whitespace) {
            Some(("set", password)) if !password.trim().is_empty() => Message::Admin(
                AdminMessage::StoreBackendPassword(password.trim().to_string()),
            ),
            None if argument == "clear" => Message::Admin(AdminMessage::ForgetBackendPassword),
            _ => return Err("expected 'keyring set PASSWORD' or 'keyring clear'".to_string()),
        },
        "add" => Message::Library(LibraryMessage::AddSong(parse_draft(argument)?)),
        "edit" => {
            let (id, form) = argument
                .split_once(char::is_whitespace)
                .ok_or("expected ID TITLE | CATEGORY")?;
            Message::Library(LibraryMessage::UpdateSong {
                id: id.to_string(),
                draft: parse_draft(form)?,
            })
        }
        "delete" => Message::Library(LibraryMessage::DeleteSong {
            id: required(argument, "song id")?.to_string(),
        }),
        "quit" | "exit" => Message::Shutdown,
        "help" => return Ok(None),
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(message))
}

/// Reads stdin on a dedicated thread; end of input shuts the runtime down.
pub fn spawn_stdin_reader(bus_sender: Sender<Message>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("Failed to read command: {}", err);
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(message)) => {
                        let shutdown = matches!(message, Message::Shutdown);
                        if bus_sender.send(message).is_err() || shutdown {
                            return;
                        }
                    }
                    Ok(None) if line.trim().eq_ignore_ascii_case("help") => {
                        log::info!("{}", USAGE)
                    }
                    Ok(None) => {}
                    Err(err) => warn!("{} (type 'help' for commands)", err),
                }
            }
            debug!("stdin closed");
            let _ = bus_sender.send(Message::Shutdown);
        })
}
