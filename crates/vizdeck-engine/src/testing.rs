//! In-process backends for exercising the engine without devices

use std::io;
use std::sync::{Arc, Mutex};

use vizdeck_core::audio::{AudioConfig, AudioError, AudioResult, CaptureBackend};
use vizdeck_core::deck::{
    DeckEvent, DeckEventSender, RendererCommand, RendererConfig, Worker, WorkerEvent,
    WorkerLauncher,
};
use vizdeck_core::video::{LoopbackDevice, MonitorInfo, SinkCapabilities, SinkProbe};
use vizdeck_core::{DeckId, EngineResult};
use vizdeck_midi::{MidiBackend, MidiInputSender, MidiPortInfo, MidiResult};

use crate::orchestrator::EngineBackends;

/// Commands and exit status of one fake renderer
#[derive(Clone, Default)]
pub(crate) struct FakeWorkerState {
    pub sent: Arc<Mutex<Vec<RendererCommand>>>,
    pub exit: Arc<Mutex<Option<Option<i32>>>>,
    pub broken_pipe: Arc<Mutex<bool>>,
}

impl FakeWorkerState {
    pub fn sent(&self) -> Vec<RendererCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Every later write fails as if the renderer closed its stdin
    pub fn break_pipe(&self) {
        *self.broken_pipe.lock().unwrap() = true;
    }

    pub fn crash(&self, code: i32) {
        *self.exit.lock().unwrap() = Some(Some(code));
    }
}

struct FakeWorker(FakeWorkerState);

impl Worker for FakeWorker {
    fn send(&mut self, command: &RendererCommand) -> io::Result<()> {
        if *self.0.broken_pipe.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        }
        if *command == RendererCommand::Stop {
            *self.0.exit.lock().unwrap() = Some(Some(0));
        }
        self.0.sent.lock().unwrap().push(command.clone());
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        *self.0.exit.lock().unwrap() = Some(None);
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(*self.0.exit.lock().unwrap())
    }
}

pub(crate) struct Launch {
    pub deck: DeckId,
    pub generation: u64,
    pub config: RendererConfig,
    pub events: DeckEventSender,
    pub worker: FakeWorkerState,
}

#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    pub launches: Arc<Mutex<Vec<Launch>>>,
}

impl FakeLauncher {
    fn latest<T>(&self, deck: DeckId, f: impl FnOnce(&Launch) -> T) -> T {
        let launches = self.launches.lock().unwrap();
        let launch = launches
            .iter()
            .rev()
            .find(|launch| launch.deck == deck)
            .expect("deck was never launched");
        f(launch)
    }

    pub fn worker(&self, deck: DeckId) -> FakeWorkerState {
        self.latest(deck, |launch| launch.worker.clone())
    }

    pub fn config(&self, deck: DeckId) -> RendererConfig {
        self.latest(deck, |launch| launch.config.clone())
    }

    /// Event as the renderer's reader thread would deliver it
    pub fn event(&self, deck: DeckId, event: WorkerEvent) -> DeckEvent {
        self.latest(deck, |launch| DeckEvent {
            deck,
            generation: launch.generation,
            event,
        })
    }

    /// Deliver a ready event through the launch's own channel
    pub fn send_ready(&self, deck: DeckId) {
        self.latest(deck, |launch| {
            launch
                .events
                .send(DeckEvent {
                    deck,
                    generation: launch.generation,
                    event: WorkerEvent::Ready,
                })
                .unwrap()
        })
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(
        &self,
        deck: DeckId,
        generation: u64,
        config: &RendererConfig,
        events: DeckEventSender,
    ) -> EngineResult<Box<dyn Worker>> {
        let worker = FakeWorkerState::default();
        self.launches.lock().unwrap().push(Launch {
            deck,
            generation,
            config: config.clone(),
            events,
            worker: worker.clone(),
        });
        Ok(Box::new(FakeWorker(worker)))
    }
}

/// Capture producing a constant block, or failing on demand
#[derive(Clone, Default)]
pub(crate) struct FakeCapture {
    pub failing: Arc<Mutex<bool>>,
    pub running: Arc<Mutex<bool>>,
}

impl FakeCapture {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl CaptureBackend for FakeCapture {
    fn start(&mut self, _config: &AudioConfig) -> AudioResult<()> {
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    fn stop(&mut self) {
        *self.running.lock().unwrap() = false;
    }

    fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn read_frames(&mut self, out: &mut Vec<f32>) -> AudioResult<usize> {
        if *self.failing.lock().unwrap() {
            return Err(AudioError::StreamError("device unplugged".to_string()));
        }
        out.extend_from_slice(&[0.5, -0.25, 0.5, -0.25]);
        Ok(2)
    }
}

/// MIDI backend with one port; keeps the sender so tests can play notes
#[derive(Clone, Default)]
pub(crate) struct FakeMidi {
    pub input: Arc<Mutex<Option<MidiInputSender>>>,
}

impl FakeMidi {
    /// Bytes as the driver callback would queue them
    pub fn play(&self, data: &[u8]) {
        let input = self.input.lock().unwrap();
        assert!(input.as_ref().expect("not connected").send(data));
    }
}

impl MidiBackend for FakeMidi {
    fn list_ports(&self) -> MidiResult<Vec<MidiPortInfo>> {
        Ok(vec![MidiPortInfo {
            index: 0,
            name: "Fake Controller".to_string(),
        }])
    }

    fn connect(&mut self, port_index: usize, input: MidiInputSender) -> MidiResult<String> {
        if port_index != 0 {
            return Err(vizdeck_midi::MidiError::PortUnavailable(format!(
                "no port {}",
                port_index
            )));
        }
        *self.input.lock().unwrap() = Some(input);
        Ok("Fake Controller".to_string())
    }

    fn disconnect(&mut self) {
        *self.input.lock().unwrap() = None;
    }
}

/// Fixed sinks and one 1080p monitor; records which thread asked
#[derive(Clone)]
pub(crate) struct FakeProbe {
    pub capabilities: SinkCapabilities,
    pub callers: Arc<Mutex<Vec<String>>>,
}

impl FakeProbe {
    fn record(&self) {
        let name = std::thread::current().name().unwrap_or("unnamed").to_string();
        self.callers.lock().unwrap().push(name);
    }

    pub fn callers(&self) -> Vec<String> {
        self.callers.lock().unwrap().clone()
    }
}

impl SinkProbe for FakeProbe {
    fn capabilities(&self) -> SinkCapabilities {
        self.capabilities
    }

    fn loopback_devices(&self) -> Vec<LoopbackDevice> {
        self.record();
        if self.capabilities.loopback {
            vec![LoopbackDevice {
                path: "/dev/video10".into(),
                name: "Vizdeck Loopback".into(),
            }]
        } else {
            Vec::new()
        }
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        self.record();
        vec![MonitorInfo {
            index: 0,
            name: "FAKE-1".into(),
            width: 1920,
            height: 1080,
            x: 0,
            y: 0,
            refresh_hz: Some(60.0),
            is_primary: true,
        }]
    }
}

/// Handles to the fakes behind an [`EngineBackends`]
#[derive(Clone)]
pub(crate) struct Fakes {
    pub launcher: FakeLauncher,
    pub capture: FakeCapture,
    pub midi: FakeMidi,
    pub probe: FakeProbe,
}

pub(crate) fn fake_backends(capabilities: SinkCapabilities) -> (EngineBackends, Fakes) {
    let fakes = Fakes {
        launcher: FakeLauncher::default(),
        capture: FakeCapture::default(),
        midi: FakeMidi::default(),
        probe: FakeProbe {
            capabilities,
            callers: Arc::default(),
        },
    };
    let backends = EngineBackends {
        launcher: Box::new(fakes.launcher.clone()),
        capture: Box::new(fakes.capture.clone()),
        midi: Box::new(fakes.midi.clone()),
        probe: Arc::new(fakes.probe.clone()),
    };
    (backends, fakes)
}

/// Create a preset file named `name` in `dir`
pub(crate) fn preset(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "[preset00]\n").unwrap();
    path
}
