//! Terravia - a territory-building strategy game engine
//!
//! This crate provides the complete rules engine for Terravia, including:
//! - Hex map with terrain transformation, bridges, and river shipping
//! - Fourteen factions across seven colors, each with its own economy
//! - The full action set with validation and pending-decision follow-ups
//! - Cult tracks, power bowls, towns, favor, bonus, and scoring tiles
//! - A concurrency-safe multi-game manager with revisions and idempotent
//!   action submission
//!
//! # Architecture
//!
//! The engine is deterministic and transport-agnostic: every mutation goes
//! through an [`actions::Action`] applied to a [`state::GameState`].
//! Servers wrap games in a [`manager::Manager`], which adds optimistic
//! concurrency on top without knowing anything about the rules.
//!
//! # Modules
//!
//! - [`map`]: Hex coordinates, terrain wheel, buildings, and adjacency
//! - [`faction`]: Faction identities, costs, incomes, and special powers
//! - [`resources`]: Resource pools and the three-bowl power cycle
//! - [`state`]: The game state machine, rounds, and turn rotation
//! - [`actions`]: The closed action set with validation and execution
//! - [`manager`]: Multi-game registry with revisions and idempotency

pub mod actions;
pub mod auction;
pub mod bonus;
pub mod cult;
pub mod errors;
pub mod faction;
pub mod favor;
pub mod manager;
pub mod map;
pub mod power_actions;
pub mod resources;
pub mod scoring;
pub mod state;
pub mod town;

// Re-export commonly used types
pub use actions::{Action, ActionType, ConversionType};
pub use auction::{AuctionState, SetupMode};
pub use bonus::BonusCardType;
pub use cult::CultTrack;
pub use errors::GameError;
pub use faction::{FactionType, SpecialActionKind};
pub use favor::FavorTileType;
pub use manager::{ActionMeta, ActionResult, CreateGameOptions, Manager, ManagerError};
pub use map::{Building, BuildingType, HexCoord, Map, TerrainType};
pub use power_actions::PowerActionType;
pub use resources::{Cost, PowerBowls, ResourcePool};
pub use scoring::ScoringTileType;
pub use state::{GamePhase, GameState, Player};
pub use town::TownTileType;
