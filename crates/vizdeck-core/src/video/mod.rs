//! Video output routing
//!
//! A running renderer can mirror its frames into external sinks: a
//! v4l2loopback device (shows up as a webcam for OBS, Zoom, ...), an NDI
//! network source, or on Windows a Spout texture share. The renderer does the encoding; this module decides
//! which sinks each deck has enabled, checks that the platform supports
//! them, and produces the commands to send.
//!
//! Sink availability is detected once at startup. A missing kernel module
//! or runtime library is a permanent condition, reported through
//! [`VideoOutputRouter::is_ndi_available`] and friends.

mod monitors;
mod probe;
mod router;

pub use monitors::{list_monitors, parse_xrandr, primary_refresh_rate, MonitorInfo};
pub use probe::{
    video_output_listing, LoopbackDevice, SinkCapabilities, SinkProbe, SystemProbe,
    SPOUT_SENDER_NAME,
};
pub use router::{DeckOutputs, SinkChange, SinkState, VideoOutputRouter};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of external video sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// v4l2loopback virtual camera
    Loopback,
    /// NDI network source
    Ndi,
    /// Spout GPU texture share (Windows)
    Spout,
}

impl SinkKind {
    pub const ALL: [SinkKind; 3] = [SinkKind::Loopback, SinkKind::Ndi, SinkKind::Spout];

    /// The sink a listed output descriptor refers to
    pub fn from_descriptor(descriptor: &str) -> Self {
        if descriptor.trim_start().starts_with("Spout:") {
            Self::Spout
        } else {
            Self::Loopback
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loopback => f.write_str("Loopback"),
            Self::Ndi => f.write_str("NDI"),
            Self::Spout => f.write_str("Spout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_selects_sink() {
        assert_eq!(SinkKind::from_descriptor("Spout:Vizdeck"), SinkKind::Spout);
        assert_eq!(
            SinkKind::from_descriptor("/dev/video10:Vizdeck"),
            SinkKind::Loopback
        );
        assert_eq!(SinkKind::Spout.to_string(), "Spout");
    }
}
