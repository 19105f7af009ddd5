//! Faction capability tables.
//!
//! The engine consumes factions as a capability: given a faction and a
//! category, return a cost, an income, or an ability flag. All fourteen
//! factions are data in this one closed enum; faction-specific behavior in
//! the action layer keys off the flags and effects defined here.

use crate::cult::CultTrack;
use crate::map::{BuildingType, TerrainType};
use crate::resources::{Cost, PowerBowls, ResourcePool};
use serde::{Deserialize, Serialize};

/// Color class. Auctions may nominate at most one faction per color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactionColor {
    Yellow,
    Brown,
    Black,
    Blue,
    Green,
    Gray,
    Red,
}

/// All playable factions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactionType {
    Nomads,
    Fakirs,
    ChaosMagicians,
    Giants,
    Swarmlings,
    Mermaids,
    Witches,
    Auren,
    Halflings,
    Cultists,
    Alchemists,
    Darklings,
    Engineers,
    Dwarves,
}

/// Once-per-round special actions unlocked by strongholds, favor tiles, or
/// bonus cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialActionKind {
    /// Witches stronghold: free dwelling on any forest hex
    WitchesRide,
    /// Auren stronghold: advance 2 on one cult track
    AurenCult,
    /// Swarmlings stronghold: free dwelling-to-trading-house upgrade
    SwarmlingsUpgrade,
    /// Nomads stronghold: transform one adjacent hex to desert for free
    NomadsSandstorm,
    /// Giants stronghold: two free spades on one adjacent hex
    GiantsTransform,
    /// Chaos Magicians stronghold: take a second action this turn
    ChaosMagiciansDouble,
    /// Mermaids stronghold: one free shipping advance (passive, applied once)
    MermaidsShipping,
    /// Water +2 favor tile: advance 1 on any cult track
    FavorCultStep,
    /// Bonus card: one free spade
    BonusSpade,
    /// Bonus card: advance 1 on any cult track
    BonusCult,
}

/// What completing a stronghold grants, beyond the ability flag itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrongholdEffect {
    /// A once-per-round special action
    Special(SpecialActionKind),
    /// Halflings: immediately receive 3 spades to apply, one hex at a time,
    /// with an optional dwelling build on one of them
    SpadeChain,
    /// Darklings: immediately convert up to 3 workers into priests
    Ordination,
    /// Alchemists: passive +2 power per spade from now on
    PowerPerSpade,
    /// Cultists: one-time 7 power
    PowerBurst,
    /// Dwarves and Fakirs: passive range/discount improvements
    Passive,
    /// Engineers: 3 VP per bridge when passing
    BridgeVP,
}

/// Per-round income granted by buildings, favor tiles, and bonus cards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Income {
    pub coins: u32,
    pub workers: u32,
    pub priests: u32,
    pub power: u32,
}

impl Income {
    pub fn add(&mut self, other: Income) {
        self.coins += other.coins;
        self.workers += other.workers;
        self.priests += other.priests;
        self.power += other.power;
    }
}

impl FactionType {
    pub const ALL: [FactionType; 14] = [
        FactionType::Nomads,
        FactionType::Fakirs,
        FactionType::ChaosMagicians,
        FactionType::Giants,
        FactionType::Swarmlings,
        FactionType::Mermaids,
        FactionType::Witches,
        FactionType::Auren,
        FactionType::Halflings,
        FactionType::Cultists,
        FactionType::Alchemists,
        FactionType::Darklings,
        FactionType::Engineers,
        FactionType::Dwarves,
    ];

    pub fn color(&self) -> FactionColor {
        match self {
            FactionType::Nomads | FactionType::Fakirs => FactionColor::Yellow,
            FactionType::ChaosMagicians | FactionType::Giants => FactionColor::Red,
            FactionType::Swarmlings | FactionType::Mermaids => FactionColor::Blue,
            FactionType::Witches | FactionType::Auren => FactionColor::Green,
            FactionType::Halflings | FactionType::Cultists => FactionColor::Brown,
            FactionType::Alchemists | FactionType::Darklings => FactionColor::Black,
            FactionType::Engineers | FactionType::Dwarves => FactionColor::Gray,
        }
    }

    pub fn home_terrain(&self) -> TerrainType {
        match self.color() {
            FactionColor::Yellow => TerrainType::Desert,
            FactionColor::Red => TerrainType::Wasteland,
            FactionColor::Blue => TerrainType::Lakes,
            FactionColor::Green => TerrainType::Forest,
            FactionColor::Brown => TerrainType::Plains,
            FactionColor::Black => TerrainType::Swamp,
            FactionColor::Gray => TerrainType::Mountains,
        }
    }

    pub fn starting_resources(&self) -> ResourcePool {
        match self {
            FactionType::Halflings => ResourcePool::new(15, 3, 0, PowerBowls::new(3, 9, 0)),
            FactionType::Swarmlings => ResourcePool::new(20, 8, 0, PowerBowls::new(3, 9, 0)),
            FactionType::ChaosMagicians => ResourcePool::new(15, 4, 0, PowerBowls::new(5, 7, 0)),
            FactionType::Fakirs => ResourcePool::new(15, 3, 1, PowerBowls::new(7, 5, 0)),
            FactionType::Nomads => ResourcePool::new(15, 2, 0, PowerBowls::new(5, 7, 0)),
            _ => ResourcePool::new(15, 3, 0, PowerBowls::new(5, 7, 0)),
        }
    }

    /// Starting cult positions, per track
    pub fn starting_cult(&self) -> Vec<(CultTrack, u32)> {
        match self {
            FactionType::Witches => vec![(CultTrack::Air, 2)],
            FactionType::Auren => vec![(CultTrack::Air, 1), (CultTrack::Water, 1)],
            FactionType::Halflings => vec![(CultTrack::Air, 1), (CultTrack::Earth, 1)],
            FactionType::Cultists => vec![(CultTrack::Earth, 1), (CultTrack::Fire, 1)],
            FactionType::Alchemists => vec![(CultTrack::Fire, 1), (CultTrack::Air, 1)],
            FactionType::Darklings => vec![(CultTrack::Water, 1), (CultTrack::Earth, 1)],
            FactionType::Mermaids => vec![(CultTrack::Water, 2)],
            FactionType::Swarmlings => vec![
                (CultTrack::Fire, 1),
                (CultTrack::Water, 1),
                (CultTrack::Earth, 1),
                (CultTrack::Air, 1),
            ],
            FactionType::Giants => vec![(CultTrack::Fire, 1), (CultTrack::Air, 1)],
            FactionType::ChaosMagicians => vec![(CultTrack::Fire, 2)],
            FactionType::Nomads => vec![(CultTrack::Fire, 1), (CultTrack::Earth, 1)],
            FactionType::Fakirs => vec![(CultTrack::Fire, 1), (CultTrack::Air, 1)],
            FactionType::Engineers | FactionType::Dwarves => vec![],
        }
    }

    pub fn starting_shipping(&self) -> u32 {
        match self {
            FactionType::Mermaids => 1,
            _ => 0,
        }
    }

    /// Maximum shipping level; None means the track is disabled entirely
    pub fn max_shipping(&self) -> Option<u32> {
        match self {
            FactionType::Dwarves | FactionType::Fakirs => None,
            _ => Some(5),
        }
    }

    /// Maximum digging level; None means the track is disabled entirely
    pub fn max_digging(&self) -> Option<u32> {
        match self {
            FactionType::Darklings => None,
            FactionType::Fakirs => Some(1),
            _ => Some(2),
        }
    }

    /// Number of dwellings placed during setup
    pub fn setup_dwellings(&self) -> u32 {
        match self {
            FactionType::ChaosMagicians => 1,
            FactionType::Nomads => 3,
            _ => 2,
        }
    }

    pub fn building_cost(&self, building_type: BuildingType) -> Cost {
        match (self, building_type) {
            (FactionType::Engineers, BuildingType::Dwelling) => Cost::new(1, 1, 0),
            (FactionType::Engineers, BuildingType::TradingHouse) => Cost::new(4, 1, 0),
            (FactionType::Engineers, BuildingType::Temple) => Cost::new(4, 1, 0),
            (FactionType::Engineers, BuildingType::Sanctuary) => Cost::new(6, 3, 0),
            (FactionType::Engineers, BuildingType::Stronghold) => Cost::new(6, 3, 0),
            (FactionType::Swarmlings, BuildingType::Dwelling) => Cost::new(3, 2, 0),
            (FactionType::Swarmlings, BuildingType::TradingHouse) => Cost::new(8, 3, 0),
            (FactionType::Swarmlings, BuildingType::Temple) => Cost::new(6, 3, 0),
            (FactionType::Swarmlings, BuildingType::Sanctuary) => Cost::new(8, 5, 0),
            (FactionType::Swarmlings, BuildingType::Stronghold) => Cost::new(8, 5, 0),
            (
                FactionType::Auren
                | FactionType::ChaosMagicians
                | FactionType::Cultists
                | FactionType::Mermaids,
                BuildingType::Sanctuary,
            ) => Cost::new(8, 4, 0),
            (FactionType::Darklings, BuildingType::Sanctuary) => Cost::new(10, 4, 0),
            (FactionType::ChaosMagicians, BuildingType::Stronghold) => Cost::new(4, 4, 0),
            (
                FactionType::Cultists | FactionType::Halflings,
                BuildingType::Stronghold,
            ) => Cost::new(8, 4, 0),
            (FactionType::Fakirs, BuildingType::Stronghold) => Cost::new(10, 4, 0),
            (_, BuildingType::Dwelling) => Cost::new(2, 1, 0),
            (_, BuildingType::TradingHouse) => Cost::new(6, 2, 0),
            (_, BuildingType::Temple) => Cost::new(5, 2, 0),
            (_, BuildingType::Sanctuary) => Cost::new(6, 4, 0),
            (_, BuildingType::Stronghold) => Cost::new(6, 4, 0),
        }
    }

    /// Workers per spade at a given digging level
    pub fn workers_per_spade(&self, digging_level: u32) -> u32 {
        3u32.saturating_sub(digging_level).max(1)
    }

    /// Giants always pay exactly two spades to transform any terrain
    pub fn fixed_spade_count(&self) -> Option<u32> {
        match self {
            FactionType::Giants => Some(2),
            _ => None,
        }
    }

    pub fn shipping_advance_cost(&self) -> Cost {
        Cost::new(4, 0, 1)
    }

    pub fn digging_advance_cost(&self) -> Cost {
        match self {
            FactionType::Halflings => Cost::new(1, 2, 1),
            _ => Cost::new(2, 5, 1),
        }
    }

    /// Base income printed on the faction board
    pub fn base_income(&self) -> Income {
        match self {
            FactionType::ChaosMagicians | FactionType::Swarmlings => Income {
                workers: 2,
                ..Income::default()
            },
            _ => Income {
                workers: 1,
                ..Income::default()
            },
        }
    }

    /// Worker income from `count` dwellings
    pub fn dwelling_income(&self, count: u32) -> Income {
        let per_slot: [u32; 8] = match self {
            // Engineers' third and sixth dwellings produce nothing
            FactionType::Engineers => [1, 1, 0, 1, 1, 0, 1, 1],
            // The eighth dwelling produces nothing
            _ => [1, 1, 1, 1, 1, 1, 1, 0],
        };
        let workers = per_slot.iter().take(count.min(8) as usize).sum();
        Income {
            workers,
            ..Income::default()
        }
    }

    /// Coin and power income from `count` trading houses
    pub fn trading_house_income(&self, count: u32) -> Income {
        let (coins_per, power_per): ([u32; 4], [u32; 4]) = match self {
            FactionType::Swarmlings => ([2, 2, 2, 3], [1, 2, 2, 2]),
            FactionType::Alchemists => ([2, 2, 3, 4], [1, 1, 1, 1]),
            _ => ([2, 2, 2, 2], [1, 1, 2, 2]),
        };
        let take = count.min(4) as usize;
        Income {
            coins: coins_per[..take].iter().sum(),
            power: power_per[..take].iter().sum(),
            ..Income::default()
        }
    }

    /// Priest income from `count` temples
    pub fn temple_income(&self, count: u32) -> Income {
        match (self, count) {
            // Engineers' second temple yields 5 power instead of a priest
            (FactionType::Engineers, c) if c >= 2 => Income {
                priests: c.min(3) - 1,
                power: 5,
                ..Income::default()
            },
            (_, c) => Income {
                priests: c.min(3),
                ..Income::default()
            },
        }
    }

    pub fn sanctuary_income(&self) -> Income {
        Income {
            priests: 1,
            ..Income::default()
        }
    }

    pub fn stronghold_income(&self) -> Income {
        match self {
            FactionType::Swarmlings => Income {
                power: 4,
                ..Income::default()
            },
            _ => Income {
                power: 2,
                ..Income::default()
            },
        }
    }

    pub fn stronghold_effect(&self) -> StrongholdEffect {
        match self {
            FactionType::Witches => StrongholdEffect::Special(SpecialActionKind::WitchesRide),
            FactionType::Auren => StrongholdEffect::Special(SpecialActionKind::AurenCult),
            FactionType::Swarmlings => {
                StrongholdEffect::Special(SpecialActionKind::SwarmlingsUpgrade)
            }
            FactionType::Nomads => StrongholdEffect::Special(SpecialActionKind::NomadsSandstorm),
            FactionType::Giants => StrongholdEffect::Special(SpecialActionKind::GiantsTransform),
            FactionType::ChaosMagicians => {
                StrongholdEffect::Special(SpecialActionKind::ChaosMagiciansDouble)
            }
            FactionType::Mermaids => StrongholdEffect::Special(SpecialActionKind::MermaidsShipping),
            FactionType::Halflings => StrongholdEffect::SpadeChain,
            FactionType::Darklings => StrongholdEffect::Ordination,
            FactionType::Alchemists => StrongholdEffect::PowerPerSpade,
            FactionType::Cultists => StrongholdEffect::PowerBurst,
            FactionType::Engineers => StrongholdEffect::BridgeVP,
            FactionType::Dwarves | FactionType::Fakirs => StrongholdEffect::Passive,
        }
    }

    /// Flat VP per spade, regardless of stronghold
    pub fn spade_vp_bonus(&self) -> i32 {
        match self {
            FactionType::Halflings => 1,
            FactionType::Darklings => 2,
            _ => 0,
        }
    }

    /// Power per spade once the stronghold is built
    pub fn stronghold_power_per_spade(&self) -> u32 {
        match self {
            FactionType::Alchemists => 2,
            _ => 0,
        }
    }

    /// Alchemists trade VP and coins both ways
    pub fn has_vp_coin_exchange(&self) -> bool {
        matches!(self, FactionType::Alchemists)
    }

    /// End-game resource conversion rate: coins per VP
    pub fn coins_per_vp(&self) -> u32 {
        match self {
            FactionType::Alchemists => 2,
            _ => 3,
        }
    }

    /// Favor tiles drawn per temple or sanctuary
    pub fn favor_tiles_per_temple(&self) -> u32 {
        match self {
            FactionType::ChaosMagicians => 2,
            _ => 1,
        }
    }

    /// Cultists react to leech resolution with a cult step or bonus power
    pub fn has_leech_bonus(&self) -> bool {
        matches!(self, FactionType::Cultists)
    }

    /// Darklings pay priests instead of workers for spades
    pub fn digs_with_priests(&self) -> bool {
        matches!(self, FactionType::Darklings)
    }

    /// Engineers build bridges from workers instead of a power action
    pub fn bridge_worker_cost(&self) -> Option<u32> {
        match self {
            FactionType::Engineers => Some(2),
            _ => None,
        }
    }

    /// The shipping bonus card's temporary +1 does not apply to factions
    /// without a shipping track
    pub fn benefits_from_shipping_bonus(&self) -> bool {
        self.max_shipping().is_some()
    }
}
