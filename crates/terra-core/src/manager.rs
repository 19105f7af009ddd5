//! Multi-game registry with optimistic concurrency.
//!
//! Each game carries a revision that increments on every applied action.
//! Clients echo the revision they acted against; a stale echo is rejected
//! instead of silently reordering play. Action IDs make submission
//! idempotent, so a client that retries after a dropped response cannot
//! apply its action twice.

use crate::actions::{Action, ActionType};
use crate::auction::{AuctionState, SetupMode};
use crate::errors::GameError;
use crate::state::{GamePhase, GameState};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ManagerError {
    #[error("game not found: {0}")]
    GameNotFound(String),
    #[error("game already exists: {0}")]
    GameExists(String),
    #[error("revision mismatch: expected {expected}, current {current}")]
    RevisionMismatch { expected: i64, current: i64 },
    #[error("seat {seat} cannot act for {player}")]
    SeatMismatch { seat: String, player: String },
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Options for creating a game
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreateGameOptions {
    pub randomize_turn_order: bool,
    pub setup_mode: SetupMode,
}

impl Default for CreateGameOptions {
    fn default() -> Self {
        Self {
            randomize_turn_order: false,
            setup_mode: SetupMode::Standard,
        }
    }
}

/// Client-supplied metadata accompanying an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMeta {
    /// Unique per submission; replays with the same ID are no-ops
    pub action_id: String,
    /// Revision the client acted against; negative skips the check
    #[serde(default = "default_expected_revision")]
    pub expected_revision: i64,
    /// Connection identity, when the transport knows who is submitting
    #[serde(default)]
    pub seat_id: Option<String>,
}

fn default_expected_revision() -> i64 {
    -1
}

/// Outcome of a successful (or replayed) submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub revision: i64,
    /// True when the action ID had already been applied
    pub duplicate: bool,
}

struct GameEntry {
    state: GameState,
    revision: i64,
    /// Action ID to the revision it produced
    applied_action_ids: HashMap<String, i64>,
}

/// Thread-safe registry of running games
#[derive(Default)]
pub struct Manager {
    games: RwLock<HashMap<String, GameEntry>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_game(&self, game_id: &str, player_ids: &[String]) -> Result<(), ManagerError> {
        self.create_game_with_options(game_id, player_ids, CreateGameOptions::default())
    }

    pub fn create_game_with_options(
        &self,
        game_id: &str,
        player_ids: &[String],
        options: CreateGameOptions,
    ) -> Result<(), ManagerError> {
        let mut games = lock_write(&self.games);
        if games.contains_key(game_id) {
            return Err(ManagerError::GameExists(game_id.to_string()));
        }

        let mut gs = GameState::new();
        for player_id in player_ids {
            gs.add_player(player_id)?;
        }
        let mut turn_order: Vec<String> = player_ids.to_vec();
        let mut rng = rand::thread_rng();
        if options.randomize_turn_order {
            turn_order.shuffle(&mut rng);
        }
        gs.turn_order = turn_order.clone();
        gs.setup_mode = options.setup_mode;
        gs.scoring_tiles.initialize_for_game(&mut rng)?;
        gs.bonus_cards.select_random_cards(player_ids.len(), &mut rng);
        if options.setup_mode != SetupMode::Standard {
            gs.auction = Some(AuctionState::new(turn_order, options.setup_mode));
        }

        games.insert(
            game_id.to_string(),
            GameEntry {
                state: gs,
                revision: 0,
                applied_action_ids: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn remove_game(&self, game_id: &str) -> bool {
        lock_write(&self.games).remove(game_id).is_some()
    }

    pub fn list_games(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock_read(&self.games).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get_game(&self, game_id: &str) -> Result<GameState, ManagerError> {
        lock_read(&self.games)
            .get(game_id)
            .map(|e| e.state.clone())
            .ok_or_else(|| ManagerError::GameNotFound(game_id.to_string()))
    }

    pub fn get_revision(&self, game_id: &str) -> Result<i64, ManagerError> {
        lock_read(&self.games)
            .get(game_id)
            .map(|e| e.revision)
            .ok_or_else(|| ManagerError::GameNotFound(game_id.to_string()))
    }

    /// Full state plus revision, ready to send to clients
    pub fn serialize_state_with_revision(
        &self,
        game_id: &str,
    ) -> Result<serde_json::Value, ManagerError> {
        let games = lock_read(&self.games);
        let entry = games
            .get(game_id)
            .ok_or_else(|| ManagerError::GameNotFound(game_id.to_string()))?;
        let mut value = serde_json::to_value(&entry.state)
            .map_err(|e| GameError::InvalidAction(format!("serialization failed: {e}")))?;
        if let Some(object) = value.as_object_mut() {
            object.insert("revision".into(), serde_json::json!(entry.revision));
        }
        Ok(value)
    }

    /// Apply an action without metadata. Used by tests and trusted callers;
    /// network submissions go through [`execute_action_with_meta`].
    ///
    /// [`execute_action_with_meta`]: Manager::execute_action_with_meta
    pub fn execute_action(
        &self,
        game_id: &str,
        action: &Action,
    ) -> Result<ActionResult, ManagerError> {
        self.apply(game_id, action, None)
    }

    pub fn execute_action_with_meta(
        &self,
        game_id: &str,
        action: &Action,
        meta: &ActionMeta,
    ) -> Result<ActionResult, ManagerError> {
        self.apply(game_id, action, Some(meta))
    }

    fn apply(
        &self,
        game_id: &str,
        action: &Action,
        meta: Option<&ActionMeta>,
    ) -> Result<ActionResult, ManagerError> {
        let mut games = lock_write(&self.games);
        let entry = games
            .get_mut(game_id)
            .ok_or_else(|| ManagerError::GameNotFound(game_id.to_string()))?;

        if let Some(meta) = meta {
            // Idempotency wins over every other check: a replay of an
            // already-applied action reports the original outcome even if
            // the revision has moved on since.
            if let Some(revision) = entry.applied_action_ids.get(&meta.action_id) {
                return Ok(ActionResult {
                    revision: *revision,
                    duplicate: true,
                });
            }
            if meta.expected_revision >= 0 && meta.expected_revision != entry.revision {
                return Err(ManagerError::RevisionMismatch {
                    expected: meta.expected_revision,
                    current: entry.revision,
                });
            }
            if let Some(seat) = &meta.seat_id {
                if seat != action.player_id() {
                    return Err(ManagerError::SeatMismatch {
                        seat: seat.clone(),
                        player: action.player_id().to_string(),
                    });
                }
            }
        }

        validate_pending_gate(&entry.state, action)?;
        action.execute(&mut entry.state)?;
        entry.revision += 1;
        if let Some(meta) = meta {
            entry
                .applied_action_ids
                .insert(meta.action_id.clone(), entry.revision);
        }
        Ok(ActionResult {
            revision: entry.revision,
            duplicate: false,
        })
    }
}

fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Free exchanges are never gated
fn is_free(action_type: ActionType) -> bool {
    matches!(action_type, ActionType::Conversion | ActionType::BurnPower)
}

/// Sequencing gate checked before an action's own validation. Open
/// decisions resolve in a fixed precedence; while one is open, only the
/// resolving action and free exchanges are accepted.
pub(crate) fn validate_pending_gate(gs: &GameState, action: &Action) -> Result<(), GameError> {
    let at = action.action_type();
    if is_free(at) {
        return Ok(());
    }

    if let Some(player) = gs
        .pending_leech_offers
        .iter()
        .find(|(_, offers)| !offers.is_empty())
        .map(|(player, _)| player)
    {
        if !matches!(
            at,
            ActionType::AcceptPowerLeech | ActionType::DeclinePowerLeech
        ) {
            return Err(GameError::PendingDecision {
                player: player.clone(),
                decision: "power leech offer".into(),
            });
        }
        return Ok(());
    }
    if let Some(pending) = &gs.pending_cultists_choice {
        if at != ActionType::CultistsCultChoice {
            return Err(GameError::PendingDecision {
                player: pending.player_id.clone(),
                decision: "cultists cult choice".into(),
            });
        }
        return Ok(());
    }
    if let Some(pending) = &gs.pending_favor_selection {
        if at != ActionType::SelectFavorTile {
            return Err(GameError::PendingDecision {
                player: pending.player_id.clone(),
                decision: "favor tile selection".into(),
            });
        }
        return Ok(());
    }
    if let Some(pending) = &gs.pending_darklings_ordination {
        if at != ActionType::DarklingsOrdination {
            return Err(GameError::PendingDecision {
                player: pending.player_id.clone(),
                decision: "priest ordination".into(),
            });
        }
        return Ok(());
    }
    if let Some(pending) = &gs.pending_halflings_spades {
        if at != ActionType::HalflingsApplySpade {
            return Err(GameError::PendingDecision {
                player: pending.player_id.clone(),
                decision: "stronghold spades".into(),
            });
        }
        return Ok(());
    }
    if let Some((player, _)) = gs.pending_spade_player() {
        if !matches!(
            at,
            ActionType::ApplyPendingSpade | ActionType::DiscardPendingSpade
        ) {
            return Err(GameError::PendingDecision {
                player: player.to_string(),
                decision: "pending spades".into(),
            });
        }
        return Ok(());
    }
    if let Some(player) = gs.pending_cult_reward_spade_player() {
        if at != ActionType::CultRewardSpade {
            return Err(GameError::PendingDecision {
                player: player.to_string(),
                decision: "cult reward spade".into(),
            });
        }
        return Ok(());
    }
    if let Some(pending) = &gs.pending_town_cult_top {
        if at != ActionType::SelectTownCultTop {
            return Err(GameError::PendingDecision {
                player: pending.player_id.clone(),
                decision: "town cult top choice".into(),
            });
        }
        return Ok(());
    }
    // Delayable town formations (Mermaids river towns) never gate; a
    // formation that must resolve now does.
    if let Some(player) = gs.pending_town_selection_player() {
        if at != ActionType::SelectTownTile {
            return Err(GameError::PendingDecision {
                player: player.to_string(),
                decision: "town tile selection".into(),
            });
        }
        return Ok(());
    }

    match gs.phase {
        GamePhase::FactionSelection => {
            if !matches!(
                at,
                ActionType::SelectFaction
                    | ActionType::AuctionNominate
                    | ActionType::AuctionBid
                    | ActionType::FastAuctionBids
            ) {
                return Err(GameError::InvalidPhase("faction selection".into()));
            }
        }
        GamePhase::Setup => {
            if !matches!(at, ActionType::SetupDwelling | ActionType::SetupBonusCard) {
                return Err(GameError::InvalidPhase("setup".into()));
            }
        }
        _ => {}
    }

    if action.requires_turn_ownership()
        && matches!(gs.phase, GamePhase::Action | GamePhase::FactionSelection)
        && gs.current_player_id() != Some(action.player_id())
    {
        return Err(GameError::NotYourTurn);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faction::FactionType;
    use pretty_assertions::assert_eq;

    fn players() -> Vec<String> {
        vec!["p1".into(), "p2".into()]
    }

    fn select(player: &str, faction: FactionType) -> Action {
        Action::SelectFaction {
            player_id: player.into(),
            faction,
        }
    }

    #[test]
    fn duplicate_game_ids_are_rejected() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        assert_eq!(
            manager.create_game("g1", &players()),
            Err(ManagerError::GameExists("g1".into()))
        );
        assert_eq!(manager.list_games(), vec!["g1"]);
    }

    #[test]
    fn revisions_increment_per_applied_action() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        assert_eq!(manager.get_revision("g1").unwrap(), 0);

        let result = manager
            .execute_action("g1", &select("p1", FactionType::Witches))
            .unwrap();
        assert_eq!(
            result,
            ActionResult {
                revision: 1,
                duplicate: false
            }
        );
        assert_eq!(manager.get_revision("g1").unwrap(), 1);
    }

    #[test]
    fn replayed_action_ids_are_idempotent() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        let meta = ActionMeta {
            action_id: "a1".into(),
            expected_revision: 0,
            seat_id: None,
        };
        let action = select("p1", FactionType::Witches);
        let first = manager.execute_action_with_meta("g1", &action, &meta).unwrap();
        assert_eq!(first.revision, 1);
        assert!(!first.duplicate);

        // The retry reports the original revision and applies nothing
        let replay = manager.execute_action_with_meta("g1", &action, &meta).unwrap();
        assert_eq!(
            replay,
            ActionResult {
                revision: 1,
                duplicate: true
            }
        );
        assert_eq!(manager.get_revision("g1").unwrap(), 1);
    }

    #[test]
    fn stale_revisions_are_rejected() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        manager
            .execute_action("g1", &select("p1", FactionType::Witches))
            .unwrap();

        let stale = ActionMeta {
            action_id: "a2".into(),
            expected_revision: 0,
            seat_id: None,
        };
        assert_eq!(
            manager.execute_action_with_meta("g1", &select("p2", FactionType::Nomads), &stale),
            Err(ManagerError::RevisionMismatch {
                expected: 0,
                current: 1
            })
        );

        // A negative expectation opts out of the check
        let unchecked = ActionMeta {
            action_id: "a3".into(),
            expected_revision: -1,
            seat_id: None,
        };
        let result = manager
            .execute_action_with_meta("g1", &select("p2", FactionType::Nomads), &unchecked)
            .unwrap();
        assert_eq!(result.revision, 2);
    }

    #[test]
    fn seats_can_only_submit_their_own_actions() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        let meta = ActionMeta {
            action_id: "a1".into(),
            expected_revision: -1,
            seat_id: Some("p2".into()),
        };
        assert_eq!(
            manager.execute_action_with_meta("g1", &select("p1", FactionType::Witches), &meta),
            Err(ManagerError::SeatMismatch {
                seat: "p2".into(),
                player: "p1".into()
            })
        );
    }

    #[test]
    fn faction_selection_follows_turn_order() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        // p2 cannot pick before p1
        let err = manager
            .execute_action("g1", &select("p2", FactionType::Nomads))
            .unwrap_err();
        assert_eq!(err, ManagerError::Game(GameError::NotYourTurn));

        manager
            .execute_action("g1", &select("p1", FactionType::Witches))
            .unwrap();
        manager
            .execute_action("g1", &select("p2", FactionType::Nomads))
            .unwrap();
        let gs = manager.get_game("g1").unwrap();
        assert_eq!(gs.phase, GamePhase::Setup);
    }

    #[test]
    fn open_decisions_gate_other_actions() {
        use crate::state::PendingFavorSelection;

        let mut gs = GameState::new();
        gs.add_player("p1").unwrap();
        gs.add_player("p2").unwrap();
        gs.turn_order = vec!["p1".into(), "p2".into()];
        gs.phase = GamePhase::Action;
        gs.pending_favor_selection = Some(PendingFavorSelection {
            player_id: "p1".into(),
            remaining: 1,
        });

        let pass = Action::Pass {
            player_id: "p1".into(),
            bonus_card: None,
        };
        assert_eq!(
            validate_pending_gate(&gs, &pass),
            Err(GameError::PendingDecision {
                player: "p1".into(),
                decision: "favor tile selection".into()
            })
        );
        // Free exchanges stay open
        let convert = Action::Convert {
            player_id: "p2".into(),
            conversion: crate::actions::ConversionType::WorkerToCoin,
            amount: 1,
        };
        assert_eq!(validate_pending_gate(&gs, &convert), Ok(()));
        let select = Action::SelectFavorTile {
            player_id: "p1".into(),
            tile: crate::favor::FavorTileType::Fire1,
        };
        assert_eq!(validate_pending_gate(&gs, &select), Ok(()));
    }

    #[test]
    fn serialized_state_carries_the_revision() {
        let manager = Manager::new();
        manager.create_game("g1", &players()).unwrap();
        manager
            .execute_action("g1", &select("p1", FactionType::Witches))
            .unwrap();
        let value = manager.serialize_state_with_revision("g1").unwrap();
        assert_eq!(value["revision"], serde_json::json!(1));
        assert_eq!(value["phase"], serde_json::json!("FactionSelection"));
    }
}
