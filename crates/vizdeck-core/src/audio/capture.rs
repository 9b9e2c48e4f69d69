//! Audio capture backends
//!
//! Captured audio lands in a lock-free SPSC ring buffer as interleaved
//! stereo f32. The producer side lives on a dedicated capture thread; the
//! control thread drains the consumer side once per pump tick.
//!
//! ```text
//! ┌────────────────────┐   push()    ┌──────────────────┐   drain    ┌────────────┐
//! │ cpal input stream  │ ──────────► │   rtrb ring      │ ─────────► │ AudioPump  │
//! │   or parec stdout  │             │  (~1s of audio)  │            │ (control)  │
//! └────────────────────┘             └──────────────────┘            └────────────┘
//! ```
//!
//! The cpal stream is not `Send`, so it is created, played and dropped on
//! its capture thread; the control thread only holds a stop channel.
//! Monitor sources (`*.monitor`) are recorded through `parec`, which works
//! the same under PulseAudio and PipeWire.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel::{self, Sender};
use rtrb::{Consumer, Producer, RingBuffer};

use super::config::AudioConfig;
use super::device::{default_input_device, find_default_monitor, find_input_device, is_monitor_name};
use super::error::{AudioError, AudioResult};

/// Source of captured audio
pub trait CaptureBackend: Send {
    /// Start capturing, replacing any running capture
    fn start(&mut self, config: &AudioConfig) -> AudioResult<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Append every interleaved stereo sample captured since the last call
    ///
    /// Returns the number of frames appended. Never blocks.
    fn read_frames(&mut self, out: &mut Vec<f32>) -> AudioResult<usize>;
}

/// Where a capture session gets its audio
#[derive(Debug, Clone, PartialEq, Eq)]
enum CaptureSource {
    /// cpal input device, default device when `None`
    Device(Option<String>),
    /// Pulse/PipeWire monitor source recorded with parec
    Monitor(String),
}

impl CaptureSource {
    fn resolve(config: &AudioConfig) -> Self {
        match config.requested_device() {
            Some(name) if is_monitor_name(name) => Self::Monitor(name.to_string()),
            Some(name) => Self::Device(Some(name.to_string())),
            None => match find_default_monitor() {
                Some(monitor) => {
                    log::debug!("Audio: auto-detected monitor {}", monitor);
                    Self::Monitor(monitor)
                }
                None => Self::Device(None),
            },
        }
    }
}

/// How a running session is torn down
enum SessionControl {
    Stream(Sender<()>),
    Process(Child),
}

struct CaptureSession {
    label: String,
    consumer: Consumer<f32>,
    error_flag: Arc<AtomicBool>,
    control: Option<SessionControl>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSession {
    fn shutdown(&mut self) {
        match self.control.take() {
            Some(SessionControl::Stream(stop_tx)) => {
                let _ = stop_tx.send(());
            }
            Some(SessionControl::Process(mut child)) => {
                let _ = child.kill();
                let _ = child.wait();
            }
            None => return,
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio: capture thread for {} panicked", self.label);
            }
        }
        log::info!("Audio: capture stopped ({})", self.label);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Production capture: cpal input devices and parec monitor sources
#[derive(Default)]
pub struct SystemCapture {
    session: Option<CaptureSession>,
}

impl SystemCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for SystemCapture {
    fn start(&mut self, config: &AudioConfig) -> AudioResult<()> {
        self.stop();

        let (producer, consumer) = RingBuffer::<f32>::new(config.ring_capacity());
        let error_flag = Arc::new(AtomicBool::new(false));

        let source = CaptureSource::resolve(config);
        let (label, control, thread) = match source {
            CaptureSource::Monitor(name) => {
                let (child, thread) = spawn_parec(&name, config, producer, error_flag.clone())?;
                (name, SessionControl::Process(child), thread)
            }
            CaptureSource::Device(name) => {
                let label = name.clone().unwrap_or_else(|| "default input".to_string());
                let (stop_tx, thread) = spawn_stream(name, config.clone(), producer, error_flag.clone())?;
                (label, SessionControl::Stream(stop_tx), thread)
            }
        };

        log::info!("Audio: capturing from {}", label);
        self.session = Some(CaptureSession {
            label,
            consumer,
            error_flag,
            control: Some(control),
            thread: Some(thread),
        });
        Ok(())
    }

    fn stop(&mut self) {
        // Drop runs the shutdown
        self.session = None;
    }

    fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.consumer.is_abandoned())
    }

    fn read_frames(&mut self, out: &mut Vec<f32>) -> AudioResult<usize> {
        let session = self.session.as_mut().ok_or(AudioError::NotStarted)?;

        if session.error_flag.swap(false, Ordering::Relaxed) {
            return Err(AudioError::StreamError(format!(
                "capture from {} reported an error",
                session.label
            )));
        }

        // Whole frames only; the producer always pushes L/R pairs
        let available = session.consumer.slots() & !1;
        if available == 0 {
            if session.consumer.is_abandoned() {
                return Err(AudioError::StreamError(format!(
                    "capture from {} ended",
                    session.label
                )));
            }
            return Ok(0);
        }

        let chunk = session
            .consumer
            .read_chunk(available)
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        let (first, second) = chunk.as_slices();
        out.extend_from_slice(first);
        out.extend_from_slice(second);
        chunk.commit_all();

        Ok(available / 2)
    }
}

/// Push one stereo frame, dropping it when the ring is full
fn push_frame(producer: &mut Producer<f32>, left: f32, right: f32) {
    if producer.slots() >= 2 {
        let _ = producer.push(left);
        let _ = producer.push(right);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// cpal input stream
// ═══════════════════════════════════════════════════════════════════════════

fn spawn_stream(
    device_name: Option<String>,
    config: AudioConfig,
    producer: Producer<f32>,
    error_flag: Arc<AtomicBool>,
) -> AudioResult<(Sender<()>, JoinHandle<()>)> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    let (ready_tx, ready_rx) = channel::bounded::<AudioResult<()>>(1);

    let thread = thread::Builder::new()
        .name("audio-capture".to_string())
        .spawn(move || {
            let stream = match open_stream(device_name.as_deref(), &config, producer, error_flag) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamPlayError(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream until stopped or the session is dropped
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(|e| AudioError::StreamBuildError(format!("failed to spawn capture thread: {}", e)))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((stop_tx, thread)),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(AudioError::StreamBuildError(
                "capture thread exited during startup".to_string(),
            ))
        }
    }
}

fn open_stream(
    device_name: Option<&str>,
    config: &AudioConfig,
    producer: Producer<f32>,
    error_flag: Arc<AtomicBool>,
) -> AudioResult<Stream> {
    let device = match device_name {
        Some(name) => find_input_device(name)?,
        None => default_input_device()?,
    };
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = select_input_config(&device, config)?;
    let sample_format = supported.sample_format();
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    };

    log::info!(
        "Audio: {} -> {} channels, {}Hz, {:?}, {} frames",
        name,
        stream_config.channels,
        stream_config.sample_rate.0,
        sample_format,
        config.buffer_size
    );

    match sample_format {
        SampleFormat::F32 => build_input_stream::<f32>(&device, &stream_config, producer, error_flag),
        SampleFormat::I16 => build_input_stream::<i16>(&device, &stream_config, producer, error_flag),
        SampleFormat::U16 => build_input_stream::<u16>(&device, &stream_config, producer, error_flag),
        SampleFormat::I32 => build_input_stream::<i32>(&device, &stream_config, producer, error_flag),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
}

/// Prefer f32 at the requested rate, else the device default
fn select_input_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let target = config.sample_rate;
    let preferred = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0);

    match preferred {
        Some(range) => Ok(range.with_sample_rate(cpal::SampleRate(target))),
        None => {
            let fallback = device
                .default_input_config()
                .map_err(|e| AudioError::ConfigError(e.to_string()))?;
            log::warn!(
                "Audio: device doesn't support {}Hz f32, using {}Hz {:?}",
                target,
                fallback.sample_rate().0,
                fallback.sample_format()
            );
            Ok(fallback)
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: Producer<f32>,
    error_flag: Arc<AtomicBool>,
) -> AudioResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                // Mono is duplicated, extra channels beyond stereo are ignored
                for frame in data.chunks(channels) {
                    let left = frame[0].to_sample::<f32>();
                    let right = frame.get(1).map_or(left, |&s| s.to_sample::<f32>());
                    push_frame(&mut producer, left, right);
                }
            },
            move |err| {
                log::error!("Audio: capture stream error: {}", err);
                error_flag.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════
// parec monitor capture
// ═══════════════════════════════════════════════════════════════════════════

fn spawn_parec(
    source: &str,
    config: &AudioConfig,
    mut producer: Producer<f32>,
    error_flag: Arc<AtomicBool>,
) -> AudioResult<(Child, JoinHandle<()>)> {
    // float32le stereo: 8 bytes per frame
    let latency_bytes = config.buffer_size.max(64) * 8;
    let mut child = Command::new("parec")
        .arg(format!("--device={}", source))
        .arg("--format=float32le")
        .arg("--channels=2")
        .arg(format!("--rate={}", config.sample_rate))
        .arg(format!("--latency={}", latency_bytes))
        .arg("--raw")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| AudioError::StreamPlayError(format!("failed to launch parec: {}", e)))?;

    let Some(mut stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(AudioError::StreamPlayError("parec stdout missing".to_string()));
    };

    let label = source.to_string();
    let thread = thread::Builder::new()
        .name("audio-parec".to_string())
        .spawn(move || {
            let mut buf = [0u8; 8192];
            let mut pending: Vec<u8> = Vec::with_capacity(16);
            loop {
                let n = match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::error!("Audio: parec read failed for {}: {}", label, e);
                        error_flag.store(true, Ordering::Relaxed);
                        break;
                    }
                };
                pending.extend_from_slice(&buf[..n]);
                let whole = pending.len() - pending.len() % 8;
                for frame in pending[..whole].chunks_exact(8) {
                    let left = f32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                    let right = f32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
                    push_frame(&mut producer, left, right);
                }
                pending.drain(..whole);
            }
            log::debug!("Audio: parec stream for {} closed", label);
        });

    match thread {
        Ok(thread) => Ok((child, thread)),
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(AudioError::StreamBuildError(format!(
                "failed to spawn capture thread: {}",
                e
            )))
        }
    }
}
