//! Error types shared across the rules engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when validating or applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("not your turn")]
    NotYourTurn,

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("player not found: {0}")]
    PlayerNotFound(String),

    #[error("player has no faction selected")]
    NoFaction,

    #[error("insufficient resources")]
    InsufficientResources,

    #[error("insufficient power in bowl 3")]
    InsufficientPower,

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("building limit reached for {0}")]
    BuildingLimit(String),

    #[error("{0} is not available")]
    TileUnavailable(String),

    #[error("player has already passed")]
    AlreadyPassed,

    #[error("action already used this round: {0}")]
    ActionAlreadyUsed(String),

    #[error("waiting on {player}: {decision}")]
    PendingDecision { player: String, decision: String },

    #[error("auction error: {0}")]
    Auction(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),
}
