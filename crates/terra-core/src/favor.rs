//! Favor tiles.
//!
//! Gained when building temples or sanctuaries. Each tile advances the
//! player on a cult track immediately; most also carry an ongoing ability.
//! The +3 tiles exist once, all others three times. A player may hold at
//! most one tile of each type.

use crate::cult::CultTrack;
use crate::errors::GameError;
use crate::faction::Income;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The twelve favor tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FavorTileType {
    Fire3,
    Water3,
    Earth3,
    Air3,
    /// Fire +2: town power requirement drops to 6
    Fire2,
    /// Water +2: special action, advance 1 on any cult track
    Water2,
    /// Earth +2: income +1 worker, +1 power
    Earth2,
    /// Air +2: income +4 power
    Air2,
    /// Fire +1: income +3 coins
    Fire1,
    /// Water +1: +3 VP when upgrading dwelling to trading house
    Water1,
    /// Earth +1: +2 VP when building a dwelling
    Earth1,
    /// Air +1: pass VP by trading house count (2/3/3/4)
    Air1,
}

impl FavorTileType {
    pub const ALL: [FavorTileType; 12] = [
        FavorTileType::Fire3,
        FavorTileType::Water3,
        FavorTileType::Earth3,
        FavorTileType::Air3,
        FavorTileType::Fire2,
        FavorTileType::Water2,
        FavorTileType::Earth2,
        FavorTileType::Air2,
        FavorTileType::Fire1,
        FavorTileType::Water1,
        FavorTileType::Earth1,
        FavorTileType::Air1,
    ];

    pub fn cult_track(&self) -> CultTrack {
        match self {
            FavorTileType::Fire3 | FavorTileType::Fire2 | FavorTileType::Fire1 => CultTrack::Fire,
            FavorTileType::Water3 | FavorTileType::Water2 | FavorTileType::Water1 => {
                CultTrack::Water
            }
            FavorTileType::Earth3 | FavorTileType::Earth2 | FavorTileType::Earth1 => {
                CultTrack::Earth
            }
            FavorTileType::Air3 | FavorTileType::Air2 | FavorTileType::Air1 => CultTrack::Air,
        }
    }

    pub fn cult_advance(&self) -> u32 {
        match self {
            FavorTileType::Fire3
            | FavorTileType::Water3
            | FavorTileType::Earth3
            | FavorTileType::Air3 => 3,
            FavorTileType::Fire2
            | FavorTileType::Water2
            | FavorTileType::Earth2
            | FavorTileType::Air2 => 2,
            FavorTileType::Fire1
            | FavorTileType::Water1
            | FavorTileType::Earth1
            | FavorTileType::Air1 => 1,
        }
    }

    /// Copies in the supply: one for the +3 tiles, three otherwise
    pub fn supply(&self) -> u32 {
        match self.cult_advance() {
            3 => 1,
            _ => 3,
        }
    }
}

/// Pool and per-player ownership of favor tiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavorTileState {
    pub available: HashMap<FavorTileType, u32>,
    pub player_tiles: HashMap<String, Vec<FavorTileType>>,
}

impl Default for FavorTileState {
    fn default() -> Self {
        Self::new()
    }
}

impl FavorTileState {
    pub fn new() -> Self {
        Self {
            available: FavorTileType::ALL.iter().map(|t| (*t, t.supply())).collect(),
            player_tiles: HashMap::new(),
        }
    }

    pub fn is_available(&self, tile: FavorTileType) -> bool {
        self.available.get(&tile).copied().unwrap_or(0) > 0
    }

    pub fn has_tile(&self, player_id: &str, tile: FavorTileType) -> bool {
        self.player_tiles
            .get(player_id)
            .map(|tiles| tiles.contains(&tile))
            .unwrap_or(false)
    }

    /// Take a tile. Each player may hold at most one of each type.
    pub fn take_tile(&mut self, player_id: &str, tile: FavorTileType) -> Result<(), GameError> {
        if !self.is_available(tile) {
            return Err(GameError::TileUnavailable(format!("favor tile {tile:?}")));
        }
        if self.has_tile(player_id, tile) {
            return Err(GameError::InvalidAction(format!(
                "player already has favor tile {tile:?}"
            )));
        }
        if let Some(count) = self.available.get_mut(&tile) {
            *count -= 1;
        }
        self.player_tiles
            .entry(player_id.to_string())
            .or_default()
            .push(tile);
        Ok(())
    }

    pub fn player_tiles(&self, player_id: &str) -> &[FavorTileType] {
        self.player_tiles
            .get(player_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Income from the player's favor tiles
    pub fn income_bonus(&self, player_id: &str) -> Income {
        let mut income = Income::default();
        for tile in self.player_tiles(player_id) {
            match tile {
                FavorTileType::Fire1 => income.coins += 3,
                FavorTileType::Earth2 => {
                    income.workers += 1;
                    income.power += 1;
                }
                FavorTileType::Air2 => income.power += 4,
                _ => {}
            }
        }
        income
    }

    /// Power requirement for founding a town: 6 with the Fire +2 tile
    pub fn town_power_requirement(&self, player_id: &str) -> u32 {
        if self.has_tile(player_id, FavorTileType::Fire2) {
            6
        } else {
            7
        }
    }

    /// Pass VP from the Air +1 tile, by trading house count
    pub fn air1_pass_vp(&self, player_id: &str, trading_houses: u32) -> i32 {
        if !self.has_tile(player_id, FavorTileType::Air1) {
            return 0;
        }
        match trading_houses {
            0 => 0,
            1 => 2,
            2 | 3 => 3,
            _ => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plus_three_tiles_are_unique() {
        let mut pool = FavorTileState::new();
        pool.take_tile("p1", FavorTileType::Fire3).unwrap();
        assert_eq!(
            pool.take_tile("p2", FavorTileType::Fire3),
            Err(GameError::TileUnavailable("favor tile Fire3".into()))
        );
        // Three copies of the lesser tiles
        pool.take_tile("p1", FavorTileType::Water2).unwrap();
        pool.take_tile("p2", FavorTileType::Water2).unwrap();
        pool.take_tile("p3", FavorTileType::Water2).unwrap();
        assert!(!pool.is_available(FavorTileType::Water2));
    }

    #[test]
    fn one_tile_of_each_type_per_player() {
        let mut pool = FavorTileState::new();
        pool.take_tile("p1", FavorTileType::Earth2).unwrap();
        assert!(pool.take_tile("p1", FavorTileType::Earth2).is_err());
    }

    #[test]
    fn income_sums_across_tiles() {
        let mut pool = FavorTileState::new();
        pool.take_tile("p1", FavorTileType::Fire1).unwrap();
        pool.take_tile("p1", FavorTileType::Earth2).unwrap();
        pool.take_tile("p1", FavorTileType::Air2).unwrap();
        let income = pool.income_bonus("p1");
        assert_eq!(income.coins, 3);
        assert_eq!(income.workers, 1);
        assert_eq!(income.power, 5);
    }

    #[test]
    fn fire2_lowers_town_requirement() {
        let mut pool = FavorTileState::new();
        assert_eq!(pool.town_power_requirement("p1"), 7);
        pool.take_tile("p1", FavorTileType::Fire2).unwrap();
        assert_eq!(pool.town_power_requirement("p1"), 6);
    }

    #[test]
    fn air1_pass_vp_table() {
        let mut pool = FavorTileState::new();
        pool.take_tile("p1", FavorTileType::Air1).unwrap();
        assert_eq!(pool.air1_pass_vp("p1", 0), 0);
        assert_eq!(pool.air1_pass_vp("p1", 1), 2);
        assert_eq!(pool.air1_pass_vp("p1", 3), 3);
        assert_eq!(pool.air1_pass_vp("p1", 4), 4);
        assert_eq!(pool.air1_pass_vp("p2", 4), 0);
    }
}
