//! Player resources and the power bowl cycle.
//!
//! This module contains:
//! - `ResourcePool` with coins, workers, priests, and the three power bowls
//! - `Cost` for action pricing and atomic spending
//! - Power gain/spend/burn and the fixed power-to-resource exchange rates

use crate::errors::GameError;
use serde::{Deserialize, Serialize};

/// Hard cap on priests per player: priests in hand plus priests placed on
/// cult action spaces may never exceed this.
pub const PRIEST_LIMIT: u32 = 7;

/// Exchange rates for converting power (from bowl 3) into resources.
pub const POWER_PER_COIN: u32 = 1;
pub const POWER_PER_WORKER: u32 = 3;
pub const POWER_PER_PRIEST: u32 = 5;

/// The cost of an action in the four spendable categories.
///
/// Power cost is always paid from bowl 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    pub coins: u32,
    pub workers: u32,
    pub priests: u32,
    pub power: u32,
}

impl Cost {
    pub fn new(coins: u32, workers: u32, priests: u32) -> Self {
        Self {
            coins,
            workers,
            priests,
            power: 0,
        }
    }

    pub fn power(amount: u32) -> Self {
        Self {
            coins: 0,
            workers: 0,
            priests: 0,
            power: amount,
        }
    }
}

/// The three power bowls.
///
/// Tokens cycle bowl 1 -> bowl 2 -> bowl 3 when power is gained and drop back
/// from bowl 3 to bowl 1 when spent. The total token count is conserved
/// except when power is burned (2 from bowl 2 become 1 in bowl 3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerBowls {
    pub bowl1: u32,
    pub bowl2: u32,
    pub bowl3: u32,
}

impl PowerBowls {
    pub fn new(bowl1: u32, bowl2: u32, bowl3: u32) -> Self {
        Self {
            bowl1,
            bowl2,
            bowl3,
        }
    }

    /// Total tokens across all bowls
    pub fn total(&self) -> u32 {
        self.bowl1 + self.bowl2 + self.bowl3
    }
}

/// A player's spendable resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub coins: u32,
    pub workers: u32,
    pub priests: u32,
    pub power: PowerBowls,
}

impl ResourcePool {
    pub fn new(coins: u32, workers: u32, priests: u32, power: PowerBowls) -> Self {
        Self {
            coins,
            workers,
            priests,
            power,
        }
    }

    /// Check if the pool covers a cost (power from bowl 3)
    pub fn can_afford(&self, cost: &Cost) -> bool {
        self.coins >= cost.coins
            && self.workers >= cost.workers
            && self.priests >= cost.priests
            && self.power.bowl3 >= cost.power
    }

    /// Deduct a cost. Either every category is deducted or nothing is.
    pub fn spend(&mut self, cost: &Cost) -> Result<(), GameError> {
        if !self.can_afford(cost) {
            return Err(GameError::InsufficientResources);
        }
        self.coins -= cost.coins;
        self.workers -= cost.workers;
        self.priests -= cost.priests;
        if cost.power > 0 {
            self.spend_power(cost.power)?;
        }
        Ok(())
    }

    /// Gain power, cycling tokens bowl 1 -> bowl 2 -> bowl 3.
    ///
    /// Returns the number of tokens actually moved, which may be less than
    /// requested when the upstream bowls run dry. Running short is not an
    /// error: the pool silently absorbs what it can.
    pub fn gain_power(&mut self, amount: u32) -> u32 {
        let mut moved = 0;
        for _ in 0..amount {
            if self.power.bowl1 > 0 {
                self.power.bowl1 -= 1;
                self.power.bowl2 += 1;
            } else if self.power.bowl2 > 0 {
                self.power.bowl2 -= 1;
                self.power.bowl3 += 1;
            } else {
                break;
            }
            moved += 1;
        }
        moved
    }

    /// Spend power from bowl 3; spent tokens return to bowl 1.
    pub fn spend_power(&mut self, amount: u32) -> Result<(), GameError> {
        if self.power.bowl3 < amount {
            return Err(GameError::InsufficientPower);
        }
        self.power.bowl3 -= amount;
        self.power.bowl1 += amount;
        Ok(())
    }

    /// Burn power: remove `amount` tokens from bowl 2 permanently to move
    /// the same number of bowl-2 tokens straight into bowl 3.
    pub fn burn_power(&mut self, amount: u32) -> Result<(), GameError> {
        if self.power.bowl2 < amount * 2 {
            return Err(GameError::InsufficientPower);
        }
        self.power.bowl2 -= amount * 2;
        self.power.bowl3 += amount;
        Ok(())
    }

    /// The maximum power this pool could still usefully absorb.
    /// Used to cap leech offers.
    pub fn power_gain_capacity(&self) -> u32 {
        self.power.bowl1 * 2 + self.power.bowl2
    }

    /// Gain priests subject to the 7-priest limit. `committed` is the number
    /// of this player's priests currently sitting on cult action spaces.
    /// Returns the number actually gained; overflow is silently dropped.
    pub fn gain_priests(&mut self, amount: u32, committed: u32) -> u32 {
        let in_play = self.priests + committed;
        let room = PRIEST_LIMIT.saturating_sub(in_play);
        let gained = amount.min(room);
        self.priests += gained;
        gained
    }

    /// Convert power from bowl 3 into coins (1 power per coin)
    pub fn convert_power_to_coins(&mut self, coins: u32) -> Result<(), GameError> {
        self.spend_power(coins * POWER_PER_COIN)?;
        self.coins += coins;
        Ok(())
    }

    /// Convert power from bowl 3 into workers (3 power per worker)
    pub fn convert_power_to_workers(&mut self, workers: u32) -> Result<(), GameError> {
        self.spend_power(workers * POWER_PER_WORKER)?;
        self.workers += workers;
        Ok(())
    }

    /// Convert a priest into a worker
    pub fn convert_priests_to_workers(&mut self, amount: u32) -> Result<(), GameError> {
        if self.priests < amount {
            return Err(GameError::InsufficientResources);
        }
        self.priests -= amount;
        self.workers += amount;
        Ok(())
    }

    /// Convert a worker into a coin
    pub fn convert_workers_to_coins(&mut self, amount: u32) -> Result<(), GameError> {
        if self.workers < amount {
            return Err(GameError::InsufficientResources);
        }
        self.workers -= amount;
        self.coins += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn gain_power_cycles_through_bowls_in_order() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(5, 7, 0));
        let moved = pool.gain_power(6);
        assert_eq!(moved, 6);
        // All six moves come from bowl 1 first
        assert_eq!(pool.power, PowerBowls::new(0, 12, 1));
    }

    #[test]
    fn gain_power_caps_silently_when_bowls_empty() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(0, 2, 10));
        let moved = pool.gain_power(5);
        assert_eq!(moved, 2);
        assert_eq!(pool.power, PowerBowls::new(0, 0, 12));
    }

    #[test]
    fn power_total_is_conserved_by_gain_and_spend() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(5, 7, 0));
        let before = pool.power.total();
        pool.gain_power(9);
        pool.spend_power(2).unwrap();
        assert_eq!(pool.power.total(), before);
    }

    #[test]
    fn spend_power_requires_bowl3_balance() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(0, 0, 1));
        assert_eq!(pool.spend_power(2), Err(GameError::InsufficientPower));
        assert_eq!(pool.power.bowl3, 1);
    }

    #[test]
    fn burn_power_halves_bowl2() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(0, 6, 0));
        pool.burn_power(2).unwrap();
        assert_eq!(pool.power, PowerBowls::new(0, 2, 2));
        assert_eq!(pool.power.total(), 4);
    }

    #[test]
    fn spend_is_atomic() {
        let mut pool = ResourcePool::new(3, 1, 0, PowerBowls::default());
        let cost = Cost::new(2, 2, 0);
        assert_eq!(pool.spend(&cost), Err(GameError::InsufficientResources));
        assert_eq!(pool.coins, 3);
        assert_eq!(pool.workers, 1);
    }

    #[test]
    fn priest_gain_respects_seven_priest_limit() {
        let mut pool = ResourcePool::new(0, 0, 5, PowerBowls::default());
        // Two priests committed on action spaces leaves no room
        assert_eq!(pool.gain_priests(3, 2), 0);
        assert_eq!(pool.priests, 5);
        // One committed leaves room for exactly one
        assert_eq!(pool.gain_priests(3, 1), 1);
        assert_eq!(pool.priests, 6);
    }

    #[test]
    fn conversions_use_fixed_rates() {
        let mut pool = ResourcePool::new(0, 0, 0, PowerBowls::new(0, 0, 9));
        pool.convert_power_to_coins(2).unwrap();
        pool.convert_power_to_workers(2).unwrap();
        assert_eq!(pool.coins, 2);
        assert_eq!(pool.workers, 2);
        assert_eq!(pool.power.bowl3, 1);
        assert_eq!(pool.convert_power_to_workers(1), Err(GameError::InsufficientPower));
    }
}
