//! WebSocket protocol messages for Terravia multiplayer.

use serde::{Deserialize, Serialize};
use terra_core::{Action, ActionMeta, SetupMode};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a new game with a fixed roster of seats
    CreateGame {
        game_id: Option<String>,
        players: Vec<String>,
        #[serde(default)]
        randomize_turn_order: bool,
        #[serde(default = "default_setup_mode")]
        setup_mode: SetupMode,
    },

    /// Bind this connection to a seat in a game
    JoinGame { game_id: String, seat: String },

    /// Submit a game action with its idempotency metadata
    Action {
        game_id: String,
        action: Action,
        meta: ActionMeta,
    },

    /// Request a full state snapshot
    GetState { game_id: String },

    /// Request the list of games
    ListGames,

    /// Ping for keepalive
    Ping,
}

fn default_setup_mode() -> SetupMode {
    SetupMode::Standard
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with the connection ID
    Welcome { connection_id: Uuid },

    /// Game created successfully
    GameCreated { game_id: String },

    /// Seat bound successfully
    JoinedGame { game_id: String, seat: String },

    /// Full state snapshot, revision included
    State {
        game_id: String,
        state: serde_json::Value,
    },

    /// Action applied (or replayed) successfully
    ActionApplied {
        game_id: String,
        revision: i64,
        duplicate: bool,
    },

    /// List of game IDs
    GameList { games: Vec<String> },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}
