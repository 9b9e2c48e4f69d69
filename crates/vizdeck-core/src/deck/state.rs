//! Deck lifecycle state

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a deck's renderer worker
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DeckState {
    #[default]
    Stopped,
    /// Worker spawned, waiting for its ready event
    Starting,
    Running,
    /// Stop requested, waiting for exit or the grace deadline
    Stopping,
    Faulted(String),
}

impl DeckState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether a worker process may still be alive in this state
    pub fn has_worker(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Faulted(_) => "faulted",
        }
    }
}

impl fmt::Display for DeckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faulted(reason) => write!(f, "faulted ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&DeckState::Faulted("boom".into())).unwrap();
        assert_eq!(json, r#"{"state":"faulted","reason":"boom"}"#);
        let json = serde_json::to_string(&DeckState::Running).unwrap();
        assert_eq!(json, r#"{"state":"running"}"#);
    }
}
