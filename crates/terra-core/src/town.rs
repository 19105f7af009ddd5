//! Towns and town tiles.
//!
//! A town forms when at least four of a player's connected buildings reach
//! a combined power value of 7 (6 with the Fire +2 favor tile). Forming a
//! town earns a one-time tile reward and a key for cult position 10.

use crate::cult::CultTrack;
use crate::errors::GameError;
use crate::map::{HexCoord, Map};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum connected buildings for a town
pub const TOWN_MIN_BUILDINGS: usize = 4;

/// The town tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TownTileType {
    /// +5 VP, +6 coins
    Vp5Coins,
    /// +6 VP, +8 power
    Vp6Power,
    /// +7 VP, +2 workers
    Vp7Workers,
    /// +4 VP, +1 shipping
    Vp4Shipping,
    /// +8 VP, +1 on every cult track
    Vp8Cults,
    /// +9 VP, +1 priest
    Vp9Priest,
    /// +11 VP
    Vp11,
    /// +2 VP, +2 on every cult track, 2 keys
    Vp2Cults,
}

impl TownTileType {
    pub const ALL: [TownTileType; 8] = [
        TownTileType::Vp5Coins,
        TownTileType::Vp6Power,
        TownTileType::Vp7Workers,
        TownTileType::Vp4Shipping,
        TownTileType::Vp8Cults,
        TownTileType::Vp9Priest,
        TownTileType::Vp11,
        TownTileType::Vp2Cults,
    ];

    pub fn vp(&self) -> i32 {
        match self {
            TownTileType::Vp5Coins => 5,
            TownTileType::Vp6Power => 6,
            TownTileType::Vp7Workers => 7,
            TownTileType::Vp4Shipping => 4,
            TownTileType::Vp8Cults => 8,
            TownTileType::Vp9Priest => 9,
            TownTileType::Vp11 => 11,
            TownTileType::Vp2Cults => 2,
        }
    }

    /// Keys granted by this tile
    pub fn keys(&self) -> u32 {
        match self {
            TownTileType::Vp2Cults => 2,
            _ => 1,
        }
    }

    /// Steps on every cult track, if any
    pub fn cult_advance_all(&self) -> u32 {
        match self {
            TownTileType::Vp8Cults => 1,
            TownTileType::Vp2Cults => 2,
            _ => 0,
        }
    }

    pub fn supply(&self) -> u32 {
        match self {
            TownTileType::Vp4Shipping | TownTileType::Vp11 | TownTileType::Vp2Cults => 1,
            _ => 2,
        }
    }
}

/// A qualifying cluster of buildings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub hexes: Vec<HexCoord>,
    pub player_id: String,
    pub total_power: u32,
}

/// Detect whether the cluster containing `start` qualifies as a town.
/// `power_requirement` is 7, or 6 with the Fire +2 favor tile. Hexes
/// already part of a formed town never seed a second one.
pub fn detect_town(
    map: &Map,
    start: &HexCoord,
    player_id: &str,
    power_requirement: u32,
) -> Option<Town> {
    let connected = map.find_connected_buildings(start, player_id);
    if connected.len() < TOWN_MIN_BUILDINGS {
        return None;
    }
    if connected
        .iter()
        .any(|h| map.get_cell(h).map(|c| c.in_town).unwrap_or(false))
    {
        return None;
    }
    let total_power: u32 = connected
        .iter()
        .filter_map(|h| map.get_cell(h))
        .filter_map(|c| c.building.as_ref())
        .map(|b| b.building_type.power_value())
        .sum();
    if total_power < power_requirement {
        return None;
    }
    Some(Town {
        hexes: connected,
        player_id: player_id.to_string(),
        total_power,
    })
}

/// Pool of town tiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownTileState {
    pub available: HashMap<TownTileType, u32>,
    pub player_tiles: HashMap<String, Vec<TownTileType>>,
}

impl Default for TownTileState {
    fn default() -> Self {
        Self::new()
    }
}

impl TownTileState {
    pub fn new() -> Self {
        Self {
            available: TownTileType::ALL.iter().map(|t| (*t, t.supply())).collect(),
            player_tiles: HashMap::new(),
        }
    }

    pub fn is_available(&self, tile: TownTileType) -> bool {
        self.available.get(&tile).copied().unwrap_or(0) > 0
    }

    pub fn take_tile(&mut self, player_id: &str, tile: TownTileType) -> Result<(), GameError> {
        if !self.is_available(tile) {
            return Err(GameError::TileUnavailable(format!("town tile {tile:?}")));
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

    pub fn player_tiles(&self, player_id: &str) -> &[TownTileType] {
        self.player_tiles
            .get(player_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Building, BuildingType, Cell, TerrainType};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap as StdHashMap;

    fn row_map(width: i32) -> Map {
        let mut cells = StdHashMap::new();
        for q in 0..width {
            cells.insert(HexCoord::new(q, 0), Cell::new(TerrainType::Plains));
        }
        Map::new(cells)
    }

    fn place(map: &mut Map, q: i32, player: &str, building_type: BuildingType) {
        map.get_cell_mut(&HexCoord::new(q, 0)).unwrap().building = Some(Building {
            building_type,
            player_id: player.to_string(),
        });
    }

    #[test]
    fn four_buildings_power_seven_forms_a_town() {
        let mut map = row_map(5);
        place(&mut map, 0, "p1", BuildingType::Dwelling);
        place(&mut map, 1, "p1", BuildingType::Dwelling);
        place(&mut map, 2, "p1", BuildingType::TradingHouse);
        place(&mut map, 3, "p1", BuildingType::Temple);

        // 1 + 1 + 2 + 2 = 6, short of 7
        assert!(detect_town(&map, &HexCoord::new(0, 0), "p1", 7).is_none());
        // Fire +2 favor drops the requirement to 6
        let town = detect_town(&map, &HexCoord::new(0, 0), "p1", 6).unwrap();
        assert_eq!(town.total_power, 6);
        assert_eq!(town.hexes.len(), 4);
    }

    #[test]
    fn three_buildings_never_form_a_town() {
        let mut map = row_map(4);
        place(&mut map, 0, "p1", BuildingType::Stronghold);
        place(&mut map, 1, "p1", BuildingType::Sanctuary);
        place(&mut map, 2, "p1", BuildingType::Temple);
        // Power 8 but only 3 buildings
        assert!(detect_town(&map, &HexCoord::new(0, 0), "p1", 7).is_none());
    }

    #[test]
    fn formed_towns_do_not_reform() {
        let mut map = row_map(5);
        for q in 0..4 {
            place(&mut map, q, "p1", BuildingType::TradingHouse);
        }
        assert!(detect_town(&map, &HexCoord::new(0, 0), "p1", 7).is_some());
        for q in 0..4 {
            map.get_cell_mut(&HexCoord::new(q, 0)).unwrap().in_town = true;
        }
        assert!(detect_town(&map, &HexCoord::new(0, 0), "p1", 7).is_none());
    }

    #[test]
    fn tile_supply_is_finite() {
        let mut pool = TownTileState::new();
        pool.take_tile("p1", TownTileType::Vp11).unwrap();
        assert!(pool.take_tile("p2", TownTileType::Vp11).is_err());
        pool.take_tile("p2", TownTileType::Vp5Coins).unwrap();
        pool.take_tile("p1", TownTileType::Vp5Coins).unwrap();
        assert!(!pool.is_available(TownTileType::Vp5Coins));
    }
}
