//! Renderer worker processes
//!
//! A [`Worker`] is the engine-side handle of one renderer process. Commands
//! are queued to a writer thread so the control thread never blocks on a
//! full pipe; status lines are read on a reader thread and forwarded as
//! [`DeckEvent`]s tagged with the launch generation.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;

use crossbeam::channel::{self, Sender, TrySendError};

use super::protocol::{parse_event_line, RendererCommand, RendererConfig, WorkerEvent};
use crate::error::{EngineError, EngineResult};
use crate::types::DeckId;

/// Renderer executable name
pub const RENDERER_BINARY: &str = "vizdeck-renderer";

/// Commands buffered per worker before non-audio sends report back-pressure
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// A worker event tagged with its deck and launch generation
#[derive(Debug, Clone, PartialEq)]
pub struct DeckEvent {
    pub deck: DeckId,
    pub generation: u64,
    pub event: WorkerEvent,
}

pub type DeckEventSender = Sender<DeckEvent>;

/// Engine-side handle of a running renderer
pub trait Worker: Send {
    /// Queue a command for the renderer. Must not block.
    fn send(&mut self, command: &RendererCommand) -> io::Result<()>;

    /// Terminate the process immediately and reap it
    fn kill(&mut self) -> io::Result<()>;

    /// Poll for exit: `Some(code)` once the process has exited
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>>;
}

/// Spawns renderer workers
pub trait WorkerLauncher: Send {
    fn launch(
        &self,
        deck: DeckId,
        generation: u64,
        config: &RendererConfig,
        events: DeckEventSender,
    ) -> EngineResult<Box<dyn Worker>>;
}

/// Locate the renderer executable
///
/// Search order: explicit override, next to the current executable,
/// `/usr/bin`, `/usr/local/bin`.
pub fn find_renderer(override_path: Option<&Path>) -> EngineResult<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(RENDERER_BINARY));
    }
    candidates.push(Path::new("/usr/bin").join(RENDERER_BINARY));
    candidates.push(Path::new("/usr/local/bin").join(RENDERER_BINARY));

    match candidates.iter().find(|path| path.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(EngineError::RendererNotFound {
            searched: candidates,
        }),
    }
}

/// Launches renderers as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    renderer_override: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(renderer_override: Option<PathBuf>) -> Self {
        Self { renderer_override }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(
        &self,
        deck: DeckId,
        generation: u64,
        config: &RendererConfig,
        events: DeckEventSender,
    ) -> EngineResult<Box<dyn Worker>> {
        let renderer = find_renderer(self.renderer_override.as_deref())?;
        let config_json = serde_json::to_string(config).map_err(|e| EngineError::Spawn {
            deck,
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;

        log::info!("Deck {}: launching {:?}", deck, renderer);

        let mut child = Command::new(&renderer)
            .arg(&config_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EngineError::Spawn { deck, source })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Spawn {
                    deck,
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "renderer pipes missing"),
                });
            }
        };

        let worker = match ChildWorker::start(deck, generation, child, stdin, stdout, events) {
            Ok(worker) => worker,
            Err((mut child, source)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Spawn { deck, source });
            }
        };
        Ok(Box::new(worker))
    }
}

/// A renderer child process with its writer and reader threads
struct ChildWorker {
    deck: DeckId,
    child: Child,
    commands: Sender<RendererCommand>,
}

impl ChildWorker {
    fn start(
        deck: DeckId,
        generation: u64,
        child: Child,
        stdin: ChildStdin,
        stdout: ChildStdout,
        events: DeckEventSender,
    ) -> Result<Self, (Child, io::Error)> {
        let (commands, command_rx) = channel::bounded::<RendererCommand>(COMMAND_QUEUE_CAPACITY);

        let writer = thread::Builder::new()
            .name(format!("deck-{}-writer", deck))
            .spawn(move || {
                let mut stdin = io::BufWriter::new(stdin);
                for command in command_rx {
                    let written = serde_json::to_writer(&mut stdin, &command)
                        .map_err(io::Error::from)
                        .and_then(|_| stdin.write_all(b"\n"))
                        .and_then(|_| stdin.flush());
                    if let Err(e) = written {
                        log::debug!("Deck {}: renderer stdin closed: {}", deck, e);
                        break;
                    }
                }
            });
        if let Err(e) = writer {
            return Err((child, e));
        }

        let reader = thread::Builder::new()
            .name(format!("deck-{}-events", deck))
            .spawn(move || {
                let send = |event| {
                    events
                        .send(DeckEvent {
                            deck,
                            generation,
                            event,
                        })
                        .is_ok()
                };
                for line in BufReader::new(stdout).lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            log::debug!("Deck {}: status stream error: {}", deck, e);
                            break;
                        }
                    };
                    if let Some(event) = parse_event_line(&line) {
                        if !send(event) {
                            return;
                        }
                    }
                }
                send(WorkerEvent::OutputClosed);
            });
        if let Err(e) = reader {
            return Err((child, e));
        }

        Ok(Self {
            deck,
            child,
            commands,
        })
    }
}

impl Worker for ChildWorker {
    fn send(&mut self, command: &RendererCommand) -> io::Result<()> {
        match self.commands.try_send(command.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) if command.is_lossy() => {
                log::trace!("Deck {}: renderer busy, dropping audio packet", self.deck);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "renderer command queue full",
            )),
            Err(TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "renderer stdin closed",
            )),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().map(|_| ())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.child.try_wait()?.map(|status| status.code()))
    }
}

impl Drop for ChildWorker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            log::warn!("Deck {}: renderer still alive on drop, killing", self.deck);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
