//! Per-deck sink selection

use serde::{Deserialize, Serialize};

use super::probe::SinkCapabilities;
use super::SinkKind;
use crate::deck::RendererCommand;
use crate::error::{EngineError, EngineResult};
use crate::types::{DeckId, NUM_DECKS};

/// One sink toggle on one deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkState {
    pub enabled: bool,
    /// Loopback device path, NDI source name or Spout sender name
    pub target: Option<String>,
}

/// Every sink toggle for a deck; each sink is independent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckOutputs {
    pub loopback: SinkState,
    pub ndi: SinkState,
    #[serde(default)]
    pub spout: SinkState,
}

impl DeckOutputs {
    fn sink(&self, kind: SinkKind) -> &SinkState {
        match kind {
            SinkKind::Loopback => &self.loopback,
            SinkKind::Ndi => &self.ndi,
            SinkKind::Spout => &self.spout,
        }
    }

    fn sink_mut(&mut self, kind: SinkKind) -> &mut SinkState {
        match kind {
            SinkKind::Loopback => &mut self.loopback,
            SinkKind::Ndi => &mut self.ndi,
            SinkKind::Spout => &mut self.spout,
        }
    }
}

/// A validated sink update that has not been applied yet
///
/// Produced by [`VideoOutputRouter::prepare`]; hand [`SinkChange::command`]
/// to the renderer and only then [`VideoOutputRouter::apply`] it, so a
/// renderer that refuses the command leaves the router as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkChange {
    pub deck: DeckId,
    pub kind: SinkKind,
    pub state: SinkState,
}

impl SinkChange {
    pub fn command(&self) -> RendererCommand {
        sink_command(self.kind, &self.state)
    }
}

/// Tracks which sinks each deck feeds
pub struct VideoOutputRouter {
    capabilities: SinkCapabilities,
    outputs: [DeckOutputs; NUM_DECKS],
}

impl VideoOutputRouter {
    /// Create a router for the capabilities detected at startup
    pub fn new(capabilities: SinkCapabilities) -> Self {
        Self {
            capabilities,
            outputs: Default::default(),
        }
    }

    pub fn capabilities(&self) -> SinkCapabilities {
        self.capabilities
    }

    pub fn is_available(&self, kind: SinkKind) -> bool {
        match kind {
            SinkKind::Loopback => self.capabilities.loopback,
            SinkKind::Ndi => self.capabilities.ndi,
            SinkKind::Spout => self.capabilities.spout,
        }
    }

    pub fn is_ndi_available(&self) -> bool {
        self.capabilities.ndi
    }

    pub fn outputs(&self, deck: DeckId) -> &DeckOutputs {
        &self.outputs[deck.index()]
    }

    /// Validate a sink toggle without touching the router
    ///
    /// A descriptor selects the target (a `"<path>:<name>"` loopback
    /// listing is reduced to its path, `"Spout:<name>"` to the name).
    /// Enabling requires a selected target, either given now or remembered
    /// from an earlier toggle.
    pub fn prepare(
        &self,
        deck: DeckId,
        kind: SinkKind,
        enabled: bool,
        descriptor: Option<&str>,
    ) -> EngineResult<SinkChange> {
        if !self.is_available(kind) {
            return Err(EngineError::SinkUnavailable(kind));
        }

        let target = descriptor
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| normalize_target(kind, d));

        let current = self.outputs[deck.index()].sink(kind);
        let target = target.or_else(|| current.target.clone());
        if enabled && target.is_none() {
            return Err(EngineError::NoSinkSelected(kind, deck));
        }
        Ok(SinkChange {
            deck,
            kind,
            state: SinkState { enabled, target },
        })
    }

    /// Commit a prepared change
    pub fn apply(&mut self, change: SinkChange) {
        log::info!(
            "Video: deck {} {} output {} ({})",
            change.deck,
            change.kind,
            if change.state.enabled { "enabled" } else { "disabled" },
            change.state.target.as_deref().unwrap_or("no target")
        );
        *self.outputs[change.deck.index()].sink_mut(change.kind) = change.state;
    }

    /// Commands re-applying every enabled sink, for a freshly started renderer
    pub fn replay_commands(&self, deck: DeckId) -> Vec<RendererCommand> {
        SinkKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let sink = self.outputs[deck.index()].sink(kind);
                sink.enabled.then(|| sink_command(kind, sink))
            })
            .collect()
    }
}

fn normalize_target(kind: SinkKind, descriptor: &str) -> String {
    match kind {
        SinkKind::Loopback => descriptor
            .split_once(':')
            .map_or(descriptor, |(path, _name)| path)
            .to_string(),
        SinkKind::Ndi => descriptor.to_string(),
        SinkKind::Spout => descriptor
            .strip_prefix("Spout:")
            .unwrap_or(descriptor)
            .to_string(),
    }
}

fn sink_command(kind: SinkKind, sink: &SinkState) -> RendererCommand {
    match kind {
        SinkKind::Loopback => RendererCommand::SetVideoOutput {
            enabled: sink.enabled,
            device_path: sink.target.clone(),
        },
        SinkKind::Ndi => RendererCommand::SetNdiOutput {
            enabled: sink.enabled,
            name: sink.target.clone(),
        },
        SinkKind::Spout => RendererCommand::SetSpoutOutput {
            enabled: sink.enabled,
            name: sink.target.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck(i: usize) -> DeckId {
        DeckId::new(i).unwrap()
    }

    fn set(
        router: &mut VideoOutputRouter,
        deck: DeckId,
        kind: SinkKind,
        enabled: bool,
        descriptor: Option<&str>,
    ) -> EngineResult<RendererCommand> {
        let change = router.prepare(deck, kind, enabled, descriptor)?;
        let command = change.command();
        router.apply(change);
        Ok(command)
    }

    fn router() -> VideoOutputRouter {
        VideoOutputRouter::new(SinkCapabilities {
            loopback: true,
            ndi: true,
            spout: true,
        })
    }

    #[test]
    fn test_unavailable_sink_rejected() {
        let mut router = VideoOutputRouter::new(SinkCapabilities {
            loopback: true,
            ndi: false,
            spout: false,
        });
        assert!(!router.is_ndi_available());
        assert!(matches!(
            set(&mut router, deck(0), SinkKind::Ndi, true, Some("Stage")),
            Err(EngineError::SinkUnavailable(SinkKind::Ndi))
        ));
        assert!(matches!(
            set(&mut router, deck(0), SinkKind::Spout, true, Some("Spout:Vizdeck")),
            Err(EngineError::SinkUnavailable(SinkKind::Spout))
        ));
    }

    #[test]
    fn test_enable_without_target_fails() {
        let mut router = router();
        assert!(matches!(
            set(&mut router, deck(1), SinkKind::Loopback, true, None),
            Err(EngineError::NoSinkSelected(SinkKind::Loopback, _))
        ));
        assert!(!router.outputs(deck(1)).loopback.enabled);
    }

    #[test]
    fn test_listing_descriptor_reduced_to_path() {
        let mut router = router();
        let descriptor = Some("/dev/video10:Vizdeck");
        let command = set(&mut router, deck(0), SinkKind::Loopback, true, descriptor).unwrap();
        assert_eq!(
            command,
            RendererCommand::SetVideoOutput {
                enabled: true,
                device_path: Some("/dev/video10".to_string()),
            }
        );
    }

    #[test]
    fn test_target_remembered_across_toggles() {
        let mut router = router();
        set(&mut router, deck(2), SinkKind::Ndi, true, Some("Deck 3")).unwrap();
        set(&mut router, deck(2), SinkKind::Ndi, false, None).unwrap();
        let command = set(&mut router, deck(2), SinkKind::Ndi, true, None).unwrap();
        assert_eq!(
            command,
            RendererCommand::SetNdiOutput {
                enabled: true,
                name: Some("Deck 3".to_string()),
            }
        );
    }

    #[test]
    fn test_sinks_are_independent_and_replayed() {
        let mut router = router();
        set(&mut router, deck(3), SinkKind::Loopback, true, Some("/dev/video11")).unwrap();
        set(&mut router, deck(3), SinkKind::Ndi, true, Some("Main")).unwrap();
        assert_eq!(router.replay_commands(deck(3)).len(), 2);

        set(&mut router, deck(3), SinkKind::Loopback, false, None).unwrap();
        assert_eq!(
            router.replay_commands(deck(3)),
            vec![RendererCommand::SetNdiOutput {
                enabled: true,
                name: Some("Main".to_string()),
            }]
        );
        assert!(router.replay_commands(deck(0)).is_empty());
    }

    #[test]
    fn test_prepared_change_is_not_applied_until_committed() {
        let mut router = router();
        let change = router
            .prepare(deck(1), SinkKind::Loopback, true, Some("/dev/video10:Vizdeck"))
            .unwrap();
        assert_eq!(
            change.command(),
            RendererCommand::SetVideoOutput {
                enabled: true,
                device_path: Some("/dev/video10".to_string()),
            }
        );
        assert_eq!(router.outputs(deck(1)), &DeckOutputs::default());

        router.apply(change);
        assert!(router.outputs(deck(1)).loopback.enabled);
        assert_eq!(router.replay_commands(deck(1)).len(), 1);
    }

    #[test]
    fn test_spout_descriptor_reduced_to_sender_name() {
        let mut router = router();
        let command = set(&mut router, deck(0), SinkKind::Spout, true, Some("Spout:Vizdeck")).unwrap();
        assert_eq!(
            command,
            RendererCommand::SetSpoutOutput {
                enabled: true,
                name: Some("Vizdeck".to_string()),
            }
        );
        assert_eq!(router.replay_commands(deck(0)), vec![command]);
    }
}
