//! The four cult tracks.
//!
//! Each player holds a position from 0 to 10 on each track. Crossing the
//! milestone positions grants power, position 10 is single occupancy and
//! gated behind a town key, and each track carries a small set of priest
//! action spaces (one 3-step, two 2-step) that hold a committed priest for
//! the rest of the game.

use crate::errors::GameError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Highest position on a cult track
pub const TRACK_MAX: u32 = 10;

/// The four cult tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CultTrack {
    Fire,
    Water,
    Earth,
    Air,
}

impl CultTrack {
    pub const ALL: [CultTrack; 4] = [
        CultTrack::Fire,
        CultTrack::Water,
        CultTrack::Earth,
        CultTrack::Air,
    ];
}

/// Power granted for crossing a milestone position
fn milestone_power(position: u32) -> u32 {
    match position {
        3 => 1,
        5 => 2,
        7 => 2,
        10 => 3,
        _ => 0,
    }
}

/// Outcome of one advance call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Spaces actually advanced (may be 0)
    pub advanced: u32,
    /// Power earned from milestones crossed during this advance
    pub power_gained: u32,
    /// Whether a town key was consumed crossing into position 10
    pub key_spent: bool,
}

/// Priest action spaces on one track: a single 3-step space and two 2-step
/// spaces. A priest placed here stays for the rest of the game and counts
/// against the 7-priest limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackActionSpaces {
    pub three_step: Option<String>,
    pub two_step: [Option<String>; 2],
}

impl TrackActionSpaces {
    /// Claim a space for `steps` (2 or 3). Returns false if none is free.
    fn claim(&mut self, player_id: &str, steps: u32) -> bool {
        match steps {
            3 => {
                if self.three_step.is_none() {
                    self.three_step = Some(player_id.to_string());
                    return true;
                }
                false
            }
            2 => {
                for slot in self.two_step.iter_mut() {
                    if slot.is_none() {
                        *slot = Some(player_id.to_string());
                        return true;
                    }
                }
                false
            }
            _ => false,
        }
    }
}

/// State of all four cult tracks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CultTrackState {
    /// Per-player position on each track
    pub positions: HashMap<String, HashMap<CultTrack, u32>>,
    /// Players in the order they were registered. Ranking ties resolve in
    /// this order; it carries no rules significance beyond stability.
    pub player_order: Vec<String>,
    /// Who sits at position 10, per track. Only one player may, ever.
    pub position10_occupant: HashMap<CultTrack, String>,
    /// Priests committed to 2/3-step action spaces, per player. This is
    /// distinct from track position and is what the 7-priest limit counts.
    pub priests_on_action_spaces: HashMap<String, u32>,
    /// Occupancy of the priest action spaces per track
    pub action_spaces: HashMap<CultTrack, TrackActionSpaces>,
}

impl CultTrackState {
    pub fn new() -> Self {
        let mut action_spaces = HashMap::new();
        for track in CultTrack::ALL {
            action_spaces.insert(track, TrackActionSpaces::default());
        }
        Self {
            positions: HashMap::new(),
            player_order: Vec::new(),
            position10_occupant: HashMap::new(),
            priests_on_action_spaces: HashMap::new(),
            action_spaces,
        }
    }

    /// Register a player at position 0 on every track
    pub fn initialize_player(&mut self, player_id: &str) {
        if self.positions.contains_key(player_id) {
            return;
        }
        let mut map = HashMap::new();
        for track in CultTrack::ALL {
            map.insert(track, 0);
        }
        self.positions.insert(player_id.to_string(), map);
        self.player_order.push(player_id.to_string());
        self.priests_on_action_spaces
            .insert(player_id.to_string(), 0);
    }

    pub fn get_position(&self, player_id: &str, track: CultTrack) -> u32 {
        self.positions
            .get(player_id)
            .and_then(|m| m.get(&track))
            .copied()
            .unwrap_or(0)
    }

    /// Overwrite a position directly. Used for faction starting positions;
    /// never grants milestone bonuses.
    pub fn set_position(&mut self, player_id: &str, track: CultTrack, position: u32) {
        if let Some(map) = self.positions.get_mut(player_id) {
            map.insert(track, position.min(TRACK_MAX));
        }
    }

    /// Advance a player up to `spaces` on a track.
    ///
    /// The advance is capped by the track max, by position-10 occupancy
    /// (someone else at 10 caps everyone else at 9), and by key gating:
    /// crossing into 10 requires `key_available` and consumes the key.
    /// Milestone power is granted per milestone crossed, not just for the
    /// final position. Falling short is never an error.
    pub fn advance_player(
        &mut self,
        player_id: &str,
        track: CultTrack,
        spaces: u32,
        key_available: bool,
    ) -> AdvanceOutcome {
        let current = self.get_position(player_id, track);
        let mut target = (current + spaces).min(TRACK_MAX);

        let mut key_spent = false;
        if target == TRACK_MAX && current < TRACK_MAX {
            let occupied_by_other = self
                .position10_occupant
                .get(&track)
                .map(|p| p != player_id)
                .unwrap_or(false);
            if occupied_by_other || !key_available {
                target = TRACK_MAX - 1;
            } else {
                key_spent = true;
            }
        }

        if target <= current {
            return AdvanceOutcome {
                advanced: 0,
                power_gained: 0,
                key_spent: false,
            };
        }

        let mut power_gained = 0;
        for pos in (current + 1)..=target {
            power_gained += milestone_power(pos);
        }

        if let Some(map) = self.positions.get_mut(player_id) {
            map.insert(track, target);
        }
        if target == TRACK_MAX {
            self.position10_occupant
                .insert(track, player_id.to_string());
        }

        AdvanceOutcome {
            advanced: target - current,
            power_gained,
            key_spent,
        }
    }

    /// Place a priest on a 2/3-step action space, or send it for a single
    /// step (the priest returns to the supply and is not committed).
    /// Returns the number of steps bought.
    pub fn place_priest(
        &mut self,
        player_id: &str,
        track: CultTrack,
        steps: u32,
    ) -> Result<u32, GameError> {
        match steps {
            1 => Ok(1),
            2 | 3 => {
                let spaces = self
                    .action_spaces
                    .get_mut(&track)
                    .ok_or_else(|| GameError::InvalidAction("unknown cult track".into()))?;
                if !spaces.claim(player_id, steps) {
                    return Err(GameError::TileUnavailable(format!(
                        "{steps}-step cult space"
                    )));
                }
                *self
                    .priests_on_action_spaces
                    .entry(player_id.to_string())
                    .or_insert(0) += 1;
                Ok(steps)
            }
            _ => Err(GameError::InvalidAction(format!(
                "cannot send a priest for {steps} steps"
            ))),
        }
    }

    /// Priests this player has committed to cult action spaces. Counts
    /// against the 7-priest limit; track positions do not.
    pub fn total_priests_on_cult_tracks(&self, player_id: &str) -> u32 {
        self.priests_on_action_spaces
            .get(player_id)
            .copied()
            .unwrap_or(0)
    }

    /// Players ordered by position descending. Equal positions keep player
    /// registration order.
    pub fn get_rankings(&self, track: CultTrack) -> Vec<(String, u32)> {
        let mut ranked: Vec<(String, u32)> = self
            .player_order
            .iter()
            .map(|p| (p.clone(), self.get_position(p, track)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// End-game cult scoring: per track, 8/4/2 VP for the top three
    /// positions. Tied players split the combined pool of the award levels
    /// they span, rounded down. Players at position 0 score nothing.
    pub fn calculate_end_game_scoring(&self) -> HashMap<String, i32> {
        let mut scores: HashMap<String, i32> = HashMap::new();
        const AWARDS: [i32; 3] = [8, 4, 2];

        for track in CultTrack::ALL {
            let ranked: Vec<(String, u32)> = self
                .get_rankings(track)
                .into_iter()
                .filter(|(_, pos)| *pos > 0)
                .collect();

            let mut i = 0;
            let mut award_index = 0;
            while i < ranked.len() && award_index < AWARDS.len() {
                let position = ranked[i].1;
                let mut group_end = i;
                while group_end < ranked.len() && ranked[group_end].1 == position {
                    group_end += 1;
                }
                let group = &ranked[i..group_end];

                let mut pool = 0;
                let mut used = 0;
                for j in award_index..AWARDS.len() {
                    if used >= group.len() {
                        break;
                    }
                    pool += AWARDS[j];
                    used += 1;
                }
                let per_player = pool / group.len() as i32;
                for (player_id, _) in group {
                    *scores.entry(player_id.clone()).or_insert(0) += per_player;
                }

                award_index += group.len();
                i = group_end;
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state_with(players: &[&str]) -> CultTrackState {
        let mut cts = CultTrackState::new();
        for p in players {
            cts.initialize_player(p);
        }
        cts
    }

    #[test]
    fn advancing_crosses_milestones_incrementally() {
        let mut cts = state_with(&["p1"]);
        let out = cts.advance_player("p1", CultTrack::Fire, 5, false);
        assert_eq!(out.advanced, 5);
        // Milestones at 3 and 5 grant 1 + 2 power
        assert_eq!(out.power_gained, 3);
        assert_eq!(cts.get_position("p1", CultTrack::Fire), 5);
    }

    #[test]
    fn reaching_ten_requires_a_key() {
        let mut cts = state_with(&["p1"]);
        cts.set_position("p1", CultTrack::Earth, 8);

        let out = cts.advance_player("p1", CultTrack::Earth, 4, false);
        assert_eq!(out.advanced, 1);
        assert_eq!(cts.get_position("p1", CultTrack::Earth), 9);

        let out = cts.advance_player("p1", CultTrack::Earth, 1, true);
        assert_eq!(out.advanced, 1);
        assert!(out.key_spent);
        // Milestone at 10 grants 3 power
        assert_eq!(out.power_gained, 3);
        assert_eq!(
            cts.position10_occupant.get(&CultTrack::Earth),
            Some(&"p1".to_string())
        );
    }

    #[test]
    fn position_ten_is_single_occupancy() {
        let mut cts = state_with(&["p1", "p2"]);
        cts.set_position("p1", CultTrack::Air, 9);
        cts.set_position("p2", CultTrack::Air, 9);
        cts.advance_player("p1", CultTrack::Air, 1, true);

        // p2 is capped at 9 even with a key in hand
        let out = cts.advance_player("p2", CultTrack::Air, 5, true);
        assert_eq!(out.advanced, 0);
        assert!(!out.key_spent);
        assert_eq!(cts.get_position("p2", CultTrack::Air), 9);
    }

    #[test]
    fn priest_action_spaces_are_finite_and_counted() {
        let mut cts = state_with(&["p1", "p2"]);
        assert_eq!(cts.place_priest("p1", CultTrack::Water, 3).unwrap(), 3);
        assert_eq!(
            cts.place_priest("p2", CultTrack::Water, 3),
            Err(GameError::TileUnavailable("3-step cult space".into()))
        );
        assert_eq!(cts.place_priest("p1", CultTrack::Water, 2).unwrap(), 2);
        assert_eq!(cts.place_priest("p2", CultTrack::Water, 2).unwrap(), 2);
        assert_eq!(cts.total_priests_on_cult_tracks("p1"), 2);
        assert_eq!(cts.total_priests_on_cult_tracks("p2"), 1);
        // The 1-step send never occupies a space
        assert_eq!(cts.place_priest("p2", CultTrack::Water, 1).unwrap(), 1);
        assert_eq!(cts.total_priests_on_cult_tracks("p2"), 1);
    }

    #[test]
    fn rankings_break_ties_by_registration_order() {
        let mut cts = state_with(&["p1", "p2", "p3"]);
        cts.set_position("p1", CultTrack::Fire, 4);
        cts.set_position("p2", CultTrack::Fire, 6);
        cts.set_position("p3", CultTrack::Fire, 4);
        let ranked = cts.get_rankings(CultTrack::Fire);
        assert_eq!(
            ranked,
            vec![
                ("p2".to_string(), 6),
                ("p1".to_string(), 4),
                ("p3".to_string(), 4),
            ]
        );
    }

    #[test]
    fn end_game_scoring_splits_ties() {
        let mut cts = state_with(&["p1", "p2", "p3"]);
        // Two tied for first split 8+4 = 12 -> 6 each, third gets 2
        cts.set_position("p1", CultTrack::Fire, 7);
        cts.set_position("p2", CultTrack::Fire, 7);
        cts.set_position("p3", CultTrack::Fire, 3);
        let scores = cts.calculate_end_game_scoring();
        assert_eq!(scores.get("p1"), Some(&6));
        assert_eq!(scores.get("p2"), Some(&6));
        assert_eq!(scores.get("p3"), Some(&2));
    }

    #[test]
    fn zero_position_is_excluded_from_scoring() {
        let mut cts = state_with(&["p1", "p2"]);
        cts.set_position("p1", CultTrack::Water, 1);
        let scores = cts.calculate_end_game_scoring();
        assert_eq!(scores.get("p1"), Some(&8));
        assert_eq!(scores.get("p2"), None);
    }
}
