//! Playlist advancement: shuffle picks and auto-cycle timers
//!
//! Timers are deadlines, not threads. The engine loop sleeps until
//! [`PlaylistScheduler::next_deadline`] and then collects
//! [`PlaylistScheduler::take_due`]; a deck whose timer was cancelled simply
//! has no deadline, so a stop and a firing timer can never race.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Playlist, PlaylistItem};
use crate::error::EngineResult;
use crate::types::{DeckId, NUM_DECKS};

/// Shuffle state and auto-cycle deadlines for all decks
pub struct PlaylistScheduler {
    rng: StdRng,
    deadlines: [Option<Instant>; NUM_DECKS],
}

impl Default for PlaylistScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistScheduler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            deadlines: [None; NUM_DECKS],
        }
    }

    /// Deterministic shuffle order
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            deadlines: [None; NUM_DECKS],
        }
    }

    // =========================================================================
    // Advancement
    // =========================================================================

    /// Advance to the next item (random when shuffling)
    ///
    /// Returns the new current item, or `None` for an empty playlist.
    pub fn next(&mut self, playlist: &mut Playlist) -> Option<PlaylistItem> {
        if playlist.shuffle {
            self.random(playlist)
        } else {
            playlist.step_forward()?;
            playlist.current().cloned()
        }
    }

    /// Go back to the previous item (random when shuffling)
    pub fn previous(&mut self, playlist: &mut Playlist) -> Option<PlaylistItem> {
        if playlist.shuffle {
            self.random(playlist)
        } else {
            playlist.step_back()?;
            playlist.current().cloned()
        }
    }

    /// Jump to a uniformly random item other than the current one
    ///
    /// With a single item that item stays current.
    pub fn random(&mut self, playlist: &mut Playlist) -> Option<PlaylistItem> {
        let len = playlist.len();
        if len == 0 {
            return None;
        }
        let index = self.pick_other(len, playlist.current_index());
        playlist.set_current(index).ok().cloned()
    }

    /// Make `index` current
    pub fn jump_to(&mut self, playlist: &mut Playlist, index: usize) -> EngineResult<PlaylistItem> {
        playlist.set_current(index).cloned()
    }

    fn pick_other(&mut self, len: usize, current: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        // Draw from the len-1 other slots and skip over the current one
        let pick = self.rng.gen_range(0..len - 1);
        if pick >= current {
            pick + 1
        } else {
            pick
        }
    }

    // =========================================================================
    // Auto-cycle timers
    // =========================================================================

    /// (Re)arm a deck's timer from `now`, or cancel it when auto-cycle is
    /// off or the playlist is empty
    pub fn arm(&mut self, deck: DeckId, playlist: &Playlist, now: Instant) {
        self.deadlines[deck.index()] = if playlist.auto_cycle && !playlist.is_empty() {
            Some(now + playlist.cycle_duration())
        } else {
            None
        };
    }

    pub fn cancel(&mut self, deck: DeckId) {
        self.deadlines[deck.index()] = None;
    }

    pub fn is_armed(&self, deck: DeckId) -> bool {
        self.deadlines[deck.index()].is_some()
    }

    /// Earliest pending deadline across all decks
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every deck whose deadline has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<DeckId> {
        let mut due = Vec::new();
        for deck in DeckId::all() {
            let slot = &mut self.deadlines[deck.index()];
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                due.push(deck);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::PlaylistSettings;
    use std::time::Duration;

    fn playlist(names: &[&str]) -> Playlist {
        let mut playlist = Playlist::default();
        for name in names {
            playlist.add(*name, format!("/p/{}.milk", name));
        }
        playlist
    }

    fn deck(i: usize) -> DeckId {
        DeckId::new(i).unwrap()
    }

    #[test]
    fn test_next_wraps_in_order() {
        let mut scheduler = PlaylistScheduler::with_seed(1);
        let mut list = playlist(&["A", "B", "C"]);
        assert_eq!(scheduler.next(&mut list).unwrap().name, "B");
        assert_eq!(scheduler.next(&mut list).unwrap().name, "C");
        assert_eq!(scheduler.next(&mut list).unwrap().name, "A");
        assert_eq!(list.current_index(), 0);
    }

    #[test]
    fn test_next_then_previous_restores_index() {
        let mut scheduler = PlaylistScheduler::with_seed(1);
        for start in 0..4 {
            let mut list = playlist(&["A", "B", "C", "D"]);
            list.set_current(start).unwrap();
            scheduler.next(&mut list);
            scheduler.previous(&mut list);
            assert_eq!(list.current_index(), start);
        }
    }

    #[test]
    fn test_empty_playlist_is_noop() {
        let mut scheduler = PlaylistScheduler::with_seed(1);
        let mut list = Playlist::default();
        list.shuffle = true;
        assert!(scheduler.next(&mut list).is_none());
        assert!(scheduler.previous(&mut list).is_none());
        assert!(scheduler.random(&mut list).is_none());
    }

    #[test]
    fn test_shuffle_never_repeats_current() {
        let mut scheduler = PlaylistScheduler::with_seed(42);
        let mut list = playlist(&["A", "B", "C", "D", "E"]);
        list.shuffle = true;
        let mut seen = [false; 5];
        for _ in 0..200 {
            let before = list.current_index();
            scheduler.next(&mut list).unwrap();
            assert_ne!(list.current_index(), before);
            seen[list.current_index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_shuffle_single_item_stays() {
        let mut scheduler = PlaylistScheduler::with_seed(3);
        let mut list = playlist(&["Only"]);
        list.shuffle = true;
        assert_eq!(scheduler.next(&mut list).unwrap().name, "Only");
        assert_eq!(list.current_index(), 0);
    }

    #[test]
    fn test_jump_to_out_of_range() {
        let mut scheduler = PlaylistScheduler::with_seed(3);
        let mut list = playlist(&["A", "B"]);
        assert_eq!(scheduler.jump_to(&mut list, 1).unwrap().name, "B");
        assert!(scheduler.jump_to(&mut list, 2).is_err());
        assert_eq!(list.current_index(), 1);
    }

    #[test]
    fn test_timer_arm_due_and_cancel() {
        let mut scheduler = PlaylistScheduler::with_seed(0);
        let mut list = playlist(&["A", "B"]);
        list.apply_settings(PlaylistSettings {
            shuffle: false,
            auto_cycle: true,
            cycle_secs: 10,
        })
        .unwrap();

        let t0 = Instant::now();
        scheduler.arm(deck(1), &list, t0);
        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_secs(10)));
        assert!(scheduler.take_due(t0 + Duration::from_secs(9)).is_empty());
        assert_eq!(scheduler.take_due(t0 + Duration::from_secs(10)), vec![deck(1)]);
        assert!(!scheduler.is_armed(deck(1)));

        scheduler.arm(deck(1), &list, t0);
        scheduler.cancel(deck(1));
        assert!(scheduler.take_due(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_arm_without_auto_cycle_disarms() {
        let mut scheduler = PlaylistScheduler::with_seed(0);
        let list = playlist(&["A"]);
        scheduler.arm(deck(0), &list, Instant::now());
        assert!(scheduler.next_deadline().is_none());
    }
}
