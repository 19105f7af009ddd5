//! Shared power actions.
//!
//! Six actions on the common board, each claimable by one player per round
//! in exchange for power from bowl 3. Claims reset when a new round starts.

use crate::errors::GameError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The six shared power actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerActionType {
    /// 3 power: build a bridge
    Bridge,
    /// 3 power: gain 1 priest
    Priest,
    /// 4 power: gain 2 workers
    Workers,
    /// 4 power: gain 7 coins
    Coins,
    /// 4 power: 1 free spade
    OneSpade,
    /// 6 power: 2 free spades
    TwoSpades,
}

impl PowerActionType {
    pub const ALL: [PowerActionType; 6] = [
        PowerActionType::Bridge,
        PowerActionType::Priest,
        PowerActionType::Workers,
        PowerActionType::Coins,
        PowerActionType::OneSpade,
        PowerActionType::TwoSpades,
    ];

    /// Power cost from bowl 3
    pub fn cost(&self) -> u32 {
        match self {
            PowerActionType::Bridge => 3,
            PowerActionType::Priest => 3,
            PowerActionType::Workers => 4,
            PowerActionType::Coins => 4,
            PowerActionType::OneSpade => 4,
            PowerActionType::TwoSpades => 6,
        }
    }

    /// Spades granted, for the terraform actions
    pub fn spades(&self) -> u32 {
        match self {
            PowerActionType::OneSpade => 1,
            PowerActionType::TwoSpades => 2,
            _ => 0,
        }
    }
}

/// Per-round claims on the shared actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerActionState {
    /// Who claimed each action this round
    pub claimed: HashMap<PowerActionType, String>,
}

impl PowerActionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, action: PowerActionType) -> bool {
        !self.claimed.contains_key(&action)
    }

    /// Claim an action for the round. Exclusive and irreversible until
    /// the next round starts.
    pub fn claim(&mut self, player_id: &str, action: PowerActionType) -> Result<(), GameError> {
        if !self.is_available(action) {
            return Err(GameError::ActionAlreadyUsed(format!(
                "power action {action:?}"
            )));
        }
        self.claimed.insert(action, player_id.to_string());
        Ok(())
    }

    /// Called by round start
    pub fn reset(&mut self) {
        self.claimed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn each_action_claimable_once_per_round() {
        let mut state = PowerActionState::new();
        state.claim("p1", PowerActionType::Coins).unwrap();
        assert_eq!(
            state.claim("p2", PowerActionType::Coins),
            Err(GameError::ActionAlreadyUsed("power action Coins".into()))
        );
        state.claim("p2", PowerActionType::Workers).unwrap();

        state.reset();
        assert!(state.is_available(PowerActionType::Coins));
        state.claim("p2", PowerActionType::Coins).unwrap();
    }

    #[test]
    fn cost_table() {
        assert_eq!(PowerActionType::Bridge.cost(), 3);
        assert_eq!(PowerActionType::Priest.cost(), 3);
        assert_eq!(PowerActionType::Workers.cost(), 4);
        assert_eq!(PowerActionType::Coins.cost(), 4);
        assert_eq!(PowerActionType::OneSpade.cost(), 4);
        assert_eq!(PowerActionType::TwoSpades.cost(), 6);
        assert_eq!(PowerActionType::TwoSpades.spades(), 2);
    }
}
