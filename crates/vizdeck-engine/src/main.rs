//! vizdeck - headless engine runner
//!
//! Starts the engine from the saved config, applies the MIDI and autostart
//! settings, then reads simple commands from stdin until EOF or `quit`.
//!
//! Usage: `vizdeck [config.yaml]`

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use vizdeck_engine::{
    default_engine_config_path, load_engine_config, EngineBackends, EngineClient, EngineEvent,
    EngineService,
};

const HELP: &str = "commands: status | start <deck> | stop <deck> | next <deck> | prev <deck> \
                    | random <deck> | fade <0..1> | midi | quit";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_engine_config_path);
    log::info!("vizdeck starting up (config {:?})", config_path);

    let config = load_engine_config(&config_path);
    let midi = config.midi.clone();
    let autostart = config.autostart_decks.clone();
    let backends = EngineBackends::system(&config);

    let engine = EngineService::spawn(config, backends)?;
    let client = engine.client();
    let events = engine.subscribe();

    if let Some(port) = &midi.port_name {
        match client.midi_connect_by_name(port) {
            Ok(name) => log::info!("MIDI: connected to '{}'", name),
            Err(e) => log::warn!("MIDI: {}", e),
        }
    }
    let loaded = match (&midi.preset_file, &midi.builtin_preset) {
        (Some(file), _) => Some(client.midi_load_preset_file(file.clone())),
        (None, Some(name)) => Some(client.midi_load_builtin_preset(name)),
        (None, None) => None,
    };
    match loaded {
        Some(Ok(count)) => log::info!("MIDI: {} mappings loaded", count),
        Some(Err(e)) => log::warn!("MIDI: preset not loaded: {}", e),
        None => {}
    }

    for deck in autostart {
        if let Err(e) = client.start_deck(deck.index(), None) {
            log::error!("Deck {}: autostart failed: {}", deck, e);
        }
    }
    if let Err(e) = client.start_audio(None) {
        log::warn!("Audio: {} (decks will run without audio)", e);
    }

    let printer = std::thread::Builder::new()
        .name("vizdeck-events".into())
        .spawn(move || {
            for event in events {
                match event {
                    EngineEvent::DeckStateChanged { deck, state } => {
                        println!("deck {}: {}", deck, state)
                    }
                    EngineEvent::AudioWarning(message) => println!("audio: {}", message),
                    EngineEvent::MidiLearned(mapping) => println!("learned: {}", mapping.display_name),
                    EngineEvent::PresetChanged { deck, path } => {
                        println!("deck {}: preset {}", deck, path.display())
                    }
                }
            }
        })
        .context("Failed to spawn event printer")?;

    println!("{}", HELP);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            words => {
                if let Err(e) = run_command(&client, words) {
                    println!("error: {}", e);
                }
            }
        }
    }

    log::info!("vizdeck shutting down");
    if let Ok(config) = client.current_config() {
        if let Err(e) = vizdeck_core::config::save_config(&config, &config_path) {
            log::warn!("Failed to save config: {}", e);
        }
    }
    engine.shutdown();
    // Bus senders are gone once the engine thread exits
    let _ = printer.join();
    Ok(())
}

fn run_command(client: &EngineClient, words: &[&str]) -> anyhow::Result<()> {
    let deck = |i: usize| -> anyhow::Result<usize> {
        words
            .get(i)
            .context("missing deck index")?
            .parse()
            .context("deck index must be a number")
    };

    match words[0] {
        "status" => {
            let status = client.get_multi_deck_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "start" => client.start_deck(deck(1)?, None)?,
        "stop" => client.stop_deck(deck(1)?)?,
        "next" => print_item(client.playlist_next(deck(1)?)?),
        "prev" => print_item(client.playlist_previous(deck(1)?)?),
        "random" => print_item(client.playlist_random(deck(1)?)?),
        "fade" => {
            let position: f32 = words
                .get(1)
                .context("missing position")?
                .parse()
                .context("position must be a number")?;
            println!("crossfader {:.2}", client.crossfader_set_position(position)?);
        }
        "midi" => {
            let status = client.midi_get_status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        _ => println!("{}", HELP),
    }
    Ok(())
}

fn print_item(item: Option<vizdeck_core::playlist::PlaylistItem>) {
    match item {
        Some(item) => println!("-> {}", item.name),
        None => println!("no presets"),
    }
}
