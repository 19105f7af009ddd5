//! The hex map.
//!
//! This module contains:
//! - Axial hex coordinates and adjacency
//! - Terrain types and the cyclic terraform wheel
//! - Buildings, bridges, and connected-area search
//!
//! The engine treats the map as a capability: adjacency queries, terrain
//! distance, and terraforming. Indirect adjacency reaches across river
//! hexes up to the asking player's shipping range.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Axial hex coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexCoord {
    /// Column (increases going east)
    pub q: i32,
    /// Row (increases going southeast)
    pub r: i32,
}

impl HexCoord {
    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The six direct neighbors
    pub fn neighbors(&self) -> [HexCoord; 6] {
        [
            HexCoord::new(self.q + 1, self.r),
            HexCoord::new(self.q + 1, self.r - 1),
            HexCoord::new(self.q, self.r - 1),
            HexCoord::new(self.q - 1, self.r),
            HexCoord::new(self.q - 1, self.r + 1),
            HexCoord::new(self.q, self.r + 1),
        ]
    }

    pub fn is_neighbor(&self, other: &HexCoord) -> bool {
        self.neighbors().contains(other)
    }
}

/// Terrain types. The seven land terrains sit on a cyclic terraform wheel;
/// river hexes can never be terraformed or built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainType {
    Desert,
    Plains,
    Swamp,
    Lakes,
    Forest,
    Mountains,
    Wasteland,
    River,
}

impl TerrainType {
    /// Position on the terraform wheel, clockwise
    fn wheel_index(&self) -> Option<u32> {
        match self {
            TerrainType::Desert => Some(0),
            TerrainType::Plains => Some(1),
            TerrainType::Swamp => Some(2),
            TerrainType::Lakes => Some(3),
            TerrainType::Forest => Some(4),
            TerrainType::Mountains => Some(5),
            TerrainType::Wasteland => Some(6),
            TerrainType::River => None,
        }
    }

    /// Spades needed to transform `self` into `other` (shortest way around
    /// the wheel). Returns None if either side is river.
    pub fn distance_to(&self, other: &TerrainType) -> Option<u32> {
        let a = self.wheel_index()?;
        let b = other.wheel_index()?;
        let diff = (a as i32 - b as i32).unsigned_abs();
        Some(diff.min(7 - diff))
    }

    /// One step along the wheel toward `target`, the shortest way around.
    /// Used by single-spade transforms. River never moves.
    pub fn step_toward(&self, target: &TerrainType) -> TerrainType {
        const WHEEL: [TerrainType; 7] = [
            TerrainType::Desert,
            TerrainType::Plains,
            TerrainType::Swamp,
            TerrainType::Lakes,
            TerrainType::Forest,
            TerrainType::Mountains,
            TerrainType::Wasteland,
        ];
        let (Some(a), Some(b)) = (self.wheel_index(), target.wheel_index()) else {
            return *self;
        };
        if a == b {
            return *self;
        }
        let forward = (b + 7 - a) % 7;
        let next = if forward <= 7 - forward {
            (a + 1) % 7
        } else {
            (a + 6) % 7
        };
        WHEEL[next as usize]
    }
}

/// Building types, ordered by upgrade tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingType {
    Dwelling,
    TradingHouse,
    Temple,
    Sanctuary,
    Stronghold,
}

impl BuildingType {
    /// Power value for leech offers and town qualification
    pub fn power_value(&self) -> u32 {
        match self {
            BuildingType::Dwelling => 1,
            BuildingType::TradingHouse => 2,
            BuildingType::Temple => 2,
            BuildingType::Sanctuary => 3,
            BuildingType::Stronghold => 3,
        }
    }

    /// Per-player supply limit
    pub fn limit(&self) -> u32 {
        match self {
            BuildingType::Dwelling => 8,
            BuildingType::TradingHouse => 4,
            BuildingType::Temple => 3,
            BuildingType::Sanctuary => 1,
            BuildingType::Stronghold => 1,
        }
    }
}

/// A building on the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub building_type: BuildingType,
    pub player_id: String,
}

/// One map cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub terrain: TerrainType,
    pub building: Option<Building>,
    /// Set once the cell belongs to a formed town
    pub in_town: bool,
}

impl Cell {
    pub fn new(terrain: TerrainType) -> Self {
        Self {
            terrain,
            building: None,
            in_town: false,
        }
    }
}

/// A bridge between two hexes, stored with endpoints ordered so each pair
/// has one canonical representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bridge {
    pub a: HexCoord,
    pub b: HexCoord,
}

impl Bridge {
    pub fn new(a: HexCoord, b: HexCoord) -> Self {
        if a <= b {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    pub fn connects(&self, x: &HexCoord, y: &HexCoord) -> bool {
        (self.a == *x && self.b == *y) || (self.a == *y && self.b == *x)
    }
}

/// The game map. Serialized through [`MapJson`] so hex coordinates never
/// end up as JSON object keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MapJson", from = "MapJson")]
pub struct Map {
    pub cells: HashMap<HexCoord, Cell>,
    pub bridges: HashSet<Bridge>,
}

impl Map {
    pub fn new(cells: HashMap<HexCoord, Cell>) -> Self {
        Self {
            cells,
            bridges: HashSet::new(),
        }
    }

    /// A small rectangular map with a deterministic terrain pattern and a
    /// river row through the middle. Enough board for full games; the
    /// official layouts load through `Map::new`.
    pub fn standard(width: i32, height: i32) -> Self {
        const WHEEL: [TerrainType; 7] = [
            TerrainType::Desert,
            TerrainType::Plains,
            TerrainType::Swamp,
            TerrainType::Lakes,
            TerrainType::Forest,
            TerrainType::Mountains,
            TerrainType::Wasteland,
        ];
        let mut cells = HashMap::new();
        for r in 0..height {
            for q in 0..width {
                let terrain = if r == height / 2 && q % 3 != 0 {
                    TerrainType::River
                } else {
                    WHEEL[((q + r * 3) % 7) as usize]
                };
                cells.insert(HexCoord::new(q, r), Cell::new(terrain));
            }
        }
        Self::new(cells)
    }

    pub fn get_cell(&self, coord: &HexCoord) -> Option<&Cell> {
        self.cells.get(coord)
    }

    pub fn get_cell_mut(&mut self, coord: &HexCoord) -> Option<&mut Cell> {
        self.cells.get_mut(coord)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&HexCoord, &Cell)> {
        self.cells.iter()
    }

    /// Direct adjacency: neighboring hexes, or hexes joined by a bridge
    pub fn is_directly_adjacent(&self, a: &HexCoord, b: &HexCoord) -> bool {
        a.is_neighbor(b) || self.bridges.iter().any(|br| br.connects(a, b))
    }

    /// Indirect adjacency: reachable by crossing up to `shipping_level`
    /// consecutive river hexes. Shipping 0 means direct adjacency only.
    pub fn is_indirectly_adjacent(&self, a: &HexCoord, b: &HexCoord, shipping_level: u32) -> bool {
        if self.is_directly_adjacent(a, b) {
            return true;
        }
        if shipping_level == 0 {
            return false;
        }
        // BFS outward from `a` through river cells only
        let mut frontier = VecDeque::new();
        let mut seen = HashSet::new();
        frontier.push_back((*a, 0u32));
        seen.insert(*a);
        while let Some((coord, depth)) = frontier.pop_front() {
            if depth >= shipping_level {
                continue;
            }
            for n in coord.neighbors() {
                if n == *b {
                    return true;
                }
                if seen.contains(&n) {
                    continue;
                }
                if let Some(cell) = self.cells.get(&n) {
                    if cell.terrain == TerrainType::River {
                        seen.insert(n);
                        frontier.push_back((n, depth + 1));
                    }
                }
            }
        }
        false
    }

    /// Spade distance between a cell's terrain and a target terrain
    pub fn terrain_distance(&self, coord: &HexCoord, target: TerrainType) -> Option<u32> {
        self.cells
            .get(coord)
            .and_then(|cell| cell.terrain.distance_to(&target))
    }

    /// Retile a cell. Rivers can never change.
    pub fn transform_terrain(&mut self, coord: &HexCoord, terrain: TerrainType) -> bool {
        match self.cells.get_mut(coord) {
            Some(cell) if cell.terrain != TerrainType::River && terrain != TerrainType::River => {
                cell.terrain = terrain;
                true
            }
            _ => false,
        }
    }

    pub fn has_bridge(&self, a: &HexCoord, b: &HexCoord) -> bool {
        self.bridges.iter().any(|br| br.connects(a, b))
    }

    /// Whether a bridge between `a` and `b` would be legal: no bridge there
    /// yet, the hexes are not direct neighbors, and exactly one river hex
    /// sits between them
    pub fn can_build_bridge(&self, a: &HexCoord, b: &HexCoord) -> bool {
        if self.has_bridge(a, b) || a.is_neighbor(b) {
            return false;
        }
        a.neighbors().iter().any(|n| {
            n.is_neighbor(b)
                && self
                    .cells
                    .get(n)
                    .map(|c| c.terrain == TerrainType::River)
                    .unwrap_or(false)
        })
    }

    /// Build a bridge between two land hexes separated by one river hex
    pub fn build_bridge(&mut self, a: HexCoord, b: HexCoord) -> bool {
        if !self.can_build_bridge(&a, &b) {
            return false;
        }
        self.bridges.insert(Bridge::new(a, b));
        true
    }

    /// All hexes holding one player's buildings connected to `start`,
    /// through direct adjacency and bridges
    pub fn find_connected_buildings(&self, start: &HexCoord, player_id: &str) -> Vec<HexCoord> {
        let owned = |coord: &HexCoord| {
            self.cells
                .get(coord)
                .and_then(|c| c.building.as_ref())
                .map(|b| b.player_id == player_id)
                .unwrap_or(false)
        };
        if !owned(start) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut stack = vec![*start];
        seen.insert(*start);
        while let Some(coord) = stack.pop() {
            let mut candidates: Vec<HexCoord> = coord.neighbors().to_vec();
            for bridge in &self.bridges {
                if bridge.a == coord {
                    candidates.push(bridge.b);
                } else if bridge.b == coord {
                    candidates.push(bridge.a);
                }
            }
            for n in candidates {
                if owned(&n) && seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        let mut result: Vec<HexCoord> = seen.into_iter().collect();
        result.sort();
        result
    }

    /// Size of the player's largest connected building group
    pub fn largest_connected_area(&self, player_id: &str) -> u32 {
        let mut visited: HashSet<HexCoord> = HashSet::new();
        let mut largest = 0;
        for (coord, cell) in &self.cells {
            let mine = cell
                .building
                .as_ref()
                .map(|b| b.player_id == player_id)
                .unwrap_or(false);
            if !mine || visited.contains(coord) {
                continue;
            }
            let component = self.find_connected_buildings(coord, player_id);
            largest = largest.max(component.len() as u32);
            visited.extend(component);
        }
        largest
    }

    /// Count a player's buildings of one type
    pub fn count_buildings(&self, player_id: &str, building_type: BuildingType) -> u32 {
        self.cells
            .values()
            .filter(|c| {
                c.building
                    .as_ref()
                    .map(|b| b.player_id == player_id && b.building_type == building_type)
                    .unwrap_or(false)
            })
            .count() as u32
    }

    /// Convert to a JSON-friendly representation with arrays instead of maps
    pub fn to_json(&self) -> MapJson {
        let mut cells: Vec<CellJson> = self
            .cells
            .iter()
            .map(|(coord, cell)| CellJson {
                coord: *coord,
                terrain: cell.terrain,
                building: cell.building.clone(),
                in_town: cell.in_town,
            })
            .collect();
        cells.sort_by_key(|c| c.coord);
        MapJson {
            cells,
            bridges: {
                let mut bridges: Vec<Bridge> = self.bridges.iter().copied().collect();
                bridges.sort_by_key(|b| (b.a, b.b));
                bridges
            },
        }
    }
}

/// JSON-friendly map representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapJson {
    pub cells: Vec<CellJson>,
    pub bridges: Vec<Bridge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellJson {
    pub coord: HexCoord,
    pub terrain: TerrainType,
    pub building: Option<Building>,
    pub in_town: bool,
}

impl From<Map> for MapJson {
    fn from(map: Map) -> Self {
        map.to_json()
    }
}

impl From<MapJson> for Map {
    fn from(json: MapJson) -> Self {
        let mut cells = HashMap::new();
        for cell in json.cells {
            cells.insert(
                cell.coord,
                Cell {
                    terrain: cell.terrain,
                    building: cell.building,
                    in_town: cell.in_town,
                },
            );
        }
        Self {
            cells,
            bridges: json.bridges.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn land_map(width: i32, height: i32, terrain: TerrainType) -> Map {
        let mut cells = HashMap::new();
        for r in 0..height {
            for q in 0..width {
                cells.insert(HexCoord::new(q, r), Cell::new(terrain));
            }
        }
        Map::new(cells)
    }

    fn place(map: &mut Map, coord: HexCoord, player: &str, building_type: BuildingType) {
        map.get_cell_mut(&coord).unwrap().building = Some(Building {
            building_type,
            player_id: player.to_string(),
        });
    }

    #[test]
    fn terraform_wheel_is_cyclic() {
        assert_eq!(
            TerrainType::Desert.distance_to(&TerrainType::Plains),
            Some(1)
        );
        // Shortest way around: Desert -> Wasteland is one step backwards
        assert_eq!(
            TerrainType::Desert.distance_to(&TerrainType::Wasteland),
            Some(1)
        );
        assert_eq!(TerrainType::Desert.distance_to(&TerrainType::Lakes), Some(3));
        assert_eq!(TerrainType::River.distance_to(&TerrainType::Plains), None);
    }

    #[test]
    fn indirect_adjacency_crosses_rivers_up_to_shipping() {
        let mut map = land_map(5, 1, TerrainType::Plains);
        map.get_cell_mut(&HexCoord::new(1, 0)).unwrap().terrain = TerrainType::River;
        map.get_cell_mut(&HexCoord::new(2, 0)).unwrap().terrain = TerrainType::River;

        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(3, 0);
        assert!(!map.is_indirectly_adjacent(&a, &b, 1));
        assert!(map.is_indirectly_adjacent(&a, &b, 2));
    }

    #[test]
    fn bridges_make_hexes_directly_adjacent() {
        let mut map = land_map(3, 1, TerrainType::Plains);
        map.get_cell_mut(&HexCoord::new(1, 0)).unwrap().terrain = TerrainType::River;
        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(2, 0);
        assert!(!map.is_directly_adjacent(&a, &b));
        assert!(map.build_bridge(a, b));
        assert!(map.is_directly_adjacent(&a, &b));
        // No duplicate bridges
        assert!(!map.build_bridge(b, a));
    }

    #[test]
    fn connected_search_includes_bridges() {
        let mut map = land_map(4, 1, TerrainType::Plains);
        map.get_cell_mut(&HexCoord::new(1, 0)).unwrap().terrain = TerrainType::River;
        place(&mut map, HexCoord::new(0, 0), "p1", BuildingType::Dwelling);
        place(&mut map, HexCoord::new(2, 0), "p1", BuildingType::Dwelling);
        place(&mut map, HexCoord::new(3, 0), "p1", BuildingType::Temple);

        assert_eq!(
            map.find_connected_buildings(&HexCoord::new(0, 0), "p1").len(),
            1
        );
        map.build_bridge(HexCoord::new(0, 0), HexCoord::new(2, 0));
        assert_eq!(
            map.find_connected_buildings(&HexCoord::new(0, 0), "p1").len(),
            3
        );
        assert_eq!(map.largest_connected_area("p1"), 3);
    }

    #[test]
    fn building_counts_per_type() {
        let mut map = land_map(3, 2, TerrainType::Forest);
        place(&mut map, HexCoord::new(0, 0), "p1", BuildingType::Dwelling);
        place(&mut map, HexCoord::new(1, 0), "p1", BuildingType::Dwelling);
        place(&mut map, HexCoord::new(2, 0), "p2", BuildingType::Dwelling);
        assert_eq!(map.count_buildings("p1", BuildingType::Dwelling), 2);
        assert_eq!(map.count_buildings("p2", BuildingType::Dwelling), 1);
        assert_eq!(map.count_buildings("p1", BuildingType::Temple), 0);
    }
}
