//! Scoring tiles and end-game scoring.
//!
//! Six of the nine scoring tiles are drawn per game, one per round. During
//! the round the tile pays VP for its matching action; at cleanup it pays
//! cult rewards per threshold crossed. Final scoring adds the largest
//! connected area bonus, cult majorities, and leftover resource conversion.

use crate::cult::CultTrack;
use crate::errors::GameError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The nine scoring tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoringTileType {
    /// 2 VP per dwelling; 4 steps Water = 1 priest
    DwellingWater,
    /// 2 VP per dwelling; 4 steps Fire = 4 power
    DwellingFire,
    /// 3 VP per trading house; 4 steps Water = 1 spade
    TradingHouseWater,
    /// 3 VP per trading house; 4 steps Air = 1 spade
    TradingHouseAir,
    /// 4 VP per temple; 2 coins per priest sent to cult this round
    TemplePriest,
    /// 5 VP per stronghold/sanctuary; 2 steps Fire = 1 worker
    StrongholdFire,
    /// 5 VP per stronghold/sanctuary; 2 steps Air = 1 worker
    StrongholdAir,
    /// 2 VP per spade; 1 step Earth = 1 coin
    Spades,
    /// 5 VP per town; 4 steps Earth = 1 spade
    Town,
}

/// Actions a scoring tile can reward during the round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringAction {
    Dwelling,
    TradingHouse,
    Stronghold,
    Temple,
    Spades,
    Town,
}

/// What the cult reward pays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CultReward {
    Priest,
    Power,
    Spade,
    Worker,
    Coin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTile {
    pub tile_type: ScoringTileType,
    pub action: ScoringAction,
    pub action_vp: i32,
    pub cult_track: CultTrack,
    /// Steps per reward; 0 marks the priest-payout tile
    pub cult_threshold: u32,
    pub cult_reward: CultReward,
    pub cult_reward_amount: u32,
}

/// All nine tiles
pub fn all_scoring_tiles() -> Vec<ScoringTile> {
    vec![
        ScoringTile {
            tile_type: ScoringTileType::DwellingWater,
            action: ScoringAction::Dwelling,
            action_vp: 2,
            cult_track: CultTrack::Water,
            cult_threshold: 4,
            cult_reward: CultReward::Priest,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::DwellingFire,
            action: ScoringAction::Dwelling,
            action_vp: 2,
            cult_track: CultTrack::Fire,
            cult_threshold: 4,
            cult_reward: CultReward::Power,
            cult_reward_amount: 4,
        },
        ScoringTile {
            tile_type: ScoringTileType::TradingHouseWater,
            action: ScoringAction::TradingHouse,
            action_vp: 3,
            cult_track: CultTrack::Water,
            cult_threshold: 4,
            cult_reward: CultReward::Spade,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::TradingHouseAir,
            action: ScoringAction::TradingHouse,
            action_vp: 3,
            cult_track: CultTrack::Air,
            cult_threshold: 4,
            cult_reward: CultReward::Spade,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::TemplePriest,
            action: ScoringAction::Temple,
            action_vp: 4,
            cult_track: CultTrack::Fire,
            cult_threshold: 0,
            cult_reward: CultReward::Coin,
            cult_reward_amount: 2,
        },
        ScoringTile {
            tile_type: ScoringTileType::StrongholdFire,
            action: ScoringAction::Stronghold,
            action_vp: 5,
            cult_track: CultTrack::Fire,
            cult_threshold: 2,
            cult_reward: CultReward::Worker,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::StrongholdAir,
            action: ScoringAction::Stronghold,
            action_vp: 5,
            cult_track: CultTrack::Air,
            cult_threshold: 2,
            cult_reward: CultReward::Worker,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::Spades,
            action: ScoringAction::Spades,
            action_vp: 2,
            cult_track: CultTrack::Earth,
            cult_threshold: 1,
            cult_reward: CultReward::Coin,
            cult_reward_amount: 1,
        },
        ScoringTile {
            tile_type: ScoringTileType::Town,
            action: ScoringAction::Town,
            action_vp: 5,
            cult_track: CultTrack::Earth,
            cult_threshold: 4,
            cult_reward: CultReward::Spade,
            cult_reward_amount: 1,
        },
    ]
}

/// The six tiles drawn for one game, indexed by round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringTileState {
    pub tiles: Vec<ScoringTile>,
    /// Priests sent to cult tracks this round, for the priest-payout tile
    pub priests_sent: HashMap<String, u32>,
}

impl ScoringTileState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw six tiles. The spades tile never lands in rounds 5 or 6.
    pub fn initialize_for_game<R: rand::Rng>(&mut self, rng: &mut R) -> Result<(), GameError> {
        use rand::seq::SliceRandom;
        let mut all = all_scoring_tiles();
        all.shuffle(rng);

        let mut selected: Vec<ScoringTile> = Vec::with_capacity(6);
        for tile in &all {
            if selected.len() >= 6 {
                break;
            }
            if tile.tile_type == ScoringTileType::Spades && selected.len() >= 4 {
                continue;
            }
            selected.push(*tile);
        }
        if selected.len() < 6 {
            for tile in &all {
                if selected.len() >= 6 {
                    break;
                }
                if !selected.iter().any(|s| s.tile_type == tile.tile_type) {
                    selected.push(*tile);
                }
            }
        }
        if selected.len() != 6 {
            return Err(GameError::InvalidAction(format!(
                "failed to select 6 scoring tiles, got {}",
                selected.len()
            )));
        }
        self.tiles = selected;
        Ok(())
    }

    /// Fix the tiles directly. Used by tests and custom setups.
    pub fn set_tiles(&mut self, tiles: Vec<ScoringTile>) {
        self.tiles = tiles;
    }

    pub fn tile_for_round(&self, round: u32) -> Option<&ScoringTile> {
        if !(1..=6).contains(&round) {
            return None;
        }
        self.tiles.get(round as usize - 1)
    }

    pub fn record_priest_sent(&mut self, player_id: &str) {
        *self.priests_sent.entry(player_id.to_string()).or_insert(0) += 1;
    }

    pub fn priests_sent(&self, player_id: &str) -> u32 {
        self.priests_sent.get(player_id).copied().unwrap_or(0)
    }

    pub fn reset_priests_sent(&mut self) {
        self.priests_sent.clear();
    }
}

/// A player's final score breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFinalScore {
    pub player_id: String,
    /// VP accumulated during the game
    pub base_vp: i32,
    /// VP from the largest connected area bonus
    pub area_vp: i32,
    /// VP from cult track majorities
    pub cult_vp: i32,
    /// VP from leftover resource conversion
    pub resource_vp: i32,
    pub total_vp: i32,
    pub largest_area: u32,
    /// Leftover resource value, the winner tiebreaker
    pub resource_value: u32,
}

/// Award the 18 VP largest-area bonus across `areas` (player -> area size).
/// Ties split the pool, rounded down.
pub fn area_bonuses(areas: &HashMap<String, u32>) -> HashMap<String, i32> {
    let mut bonuses = HashMap::new();
    let max_area = areas.values().copied().max().unwrap_or(0);
    if max_area == 0 {
        return bonuses;
    }
    let winners: Vec<&String> = areas
        .iter()
        .filter(|(_, size)| **size == max_area)
        .map(|(p, _)| p)
        .collect();
    let vp_each = 18 / winners.len() as i32;
    for player in winners {
        bonuses.insert(player.clone(), vp_each);
    }
    bonuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn spades_tile_never_in_rounds_five_or_six() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mut state = ScoringTileState::new();
            state.initialize_for_game(&mut rng).unwrap();
            assert_eq!(state.tiles.len(), 6);
            for round in [5u32, 6] {
                assert_ne!(
                    state.tile_for_round(round).unwrap().tile_type,
                    ScoringTileType::Spades
                );
            }
        }
    }

    #[test]
    fn tile_for_round_is_one_indexed() {
        let mut state = ScoringTileState::new();
        state.set_tiles(all_scoring_tiles().into_iter().take(6).collect());
        assert!(state.tile_for_round(0).is_none());
        assert_eq!(
            state.tile_for_round(1).unwrap().tile_type,
            ScoringTileType::DwellingWater
        );
        assert!(state.tile_for_round(7).is_none());
    }

    #[test]
    fn area_bonus_splits_on_ties() {
        let areas = HashMap::from([
            ("p1".to_string(), 5u32),
            ("p2".to_string(), 5),
            ("p3".to_string(), 3),
        ]);
        let bonuses = area_bonuses(&areas);
        assert_eq!(bonuses.get("p1"), Some(&9));
        assert_eq!(bonuses.get("p2"), Some(&9));
        assert_eq!(bonuses.get("p3"), None);
    }

    #[test]
    fn priest_tracking_resets_each_round() {
        let mut state = ScoringTileState::new();
        state.record_priest_sent("p1");
        state.record_priest_sent("p1");
        assert_eq!(state.priests_sent("p1"), 2);
        state.reset_priests_sent();
        assert_eq!(state.priests_sent("p1"), 0);
    }
}
