//! In-process fakes for the worker seam

use std::io;
use std::sync::{Arc, Mutex};

use super::protocol::{RendererCommand, RendererConfig};
use super::worker::{DeckEventSender, Worker, WorkerLauncher};
use crate::error::{EngineError, EngineResult};
use crate::types::DeckId;

/// Shared view of what a fake worker received
#[derive(Clone, Default)]
pub(crate) struct FakeWorkerState {
    pub sent: Arc<Mutex<Vec<RendererCommand>>>,
    pub exit: Arc<Mutex<Option<Option<i32>>>>,
    pub killed: Arc<Mutex<bool>>,
    pub ignore_stop: Arc<Mutex<bool>>,
    pub broken_pipe: Arc<Mutex<bool>>,
}

struct FakeWorker(FakeWorkerState);

impl Worker for FakeWorker {
    fn send(&mut self, command: &RendererCommand) -> io::Result<()> {
        if *self.0.broken_pipe.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        }
        if *command == RendererCommand::Stop && !*self.0.ignore_stop.lock().unwrap() {
            *self.0.exit.lock().unwrap() = Some(Some(0));
        }
        self.0.sent.lock().unwrap().push(command.clone());
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        *self.0.killed.lock().unwrap() = true;
        *self.0.exit.lock().unwrap() = Some(None);
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(*self.0.exit.lock().unwrap())
    }
}

/// Launcher handing out fake workers; the last launch's state is exposed
#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    pub last: Arc<Mutex<Option<FakeWorkerState>>>,
    pub configs: Arc<Mutex<Vec<RendererConfig>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl FakeLauncher {
    pub fn worker(&self) -> FakeWorkerState {
        self.last.lock().unwrap().clone().expect("no worker launched")
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(
        &self,
        deck: DeckId,
        _generation: u64,
        config: &RendererConfig,
        _events: DeckEventSender,
    ) -> EngineResult<Box<dyn Worker>> {
        if *self.fail.lock().unwrap() {
            return Err(EngineError::Spawn {
                deck,
                source: io::Error::new(io::ErrorKind::Other, "no fork for you"),
            });
        }
        let state = FakeWorkerState::default();
        *self.last.lock().unwrap() = Some(state.clone());
        self.configs.lock().unwrap().push(config.clone());
        Ok(Box::new(FakeWorker(state)))
    }
}
