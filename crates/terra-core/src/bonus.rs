//! Bonus cards.
//!
//! A game uses player count + 3 of the ten cards. Each player holds at most
//! one, taken when passing; the previous card returns to the pool only at
//! that moment. Unclaimed cards accrue one coin per round cleanup, paid out
//! to whoever eventually takes them.

use crate::errors::GameError;
use crate::faction::Income;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The ten bonus cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BonusCardType {
    /// Income: +1 priest
    Priest,
    /// Income: +3 power, shipping +1 for the round (not Dwarves/Fakirs)
    Shipping,
    /// Income: +2 coins, pass: +1 VP per dwelling
    DwellingVp,
    /// Income: +1 worker, +3 power
    WorkerPower,
    /// Income: +2 coins, special action: 1 free spade
    Spade,
    /// Income: +1 worker, pass: +2 VP per trading house
    TradingHouseVp,
    /// Income: +6 coins
    SixCoins,
    /// Income: +4 coins, special action: advance 1 on any cult track
    CultAdvance,
    /// Income: +2 workers, pass: +4 VP per stronghold/sanctuary built
    StrongholdSanctuaryVp,
    /// Income: +3 power, pass: +3 VP per shipping level (not Dwarves/Fakirs)
    ShippingVp,
}

impl BonusCardType {
    pub const ALL: [BonusCardType; 10] = [
        BonusCardType::Priest,
        BonusCardType::Shipping,
        BonusCardType::DwellingVp,
        BonusCardType::WorkerPower,
        BonusCardType::Spade,
        BonusCardType::TradingHouseVp,
        BonusCardType::SixCoins,
        BonusCardType::CultAdvance,
        BonusCardType::StrongholdSanctuaryVp,
        BonusCardType::ShippingVp,
    ];

    pub fn income(&self) -> Income {
        let (coins, workers, priests, power) = match self {
            BonusCardType::Priest => (0, 0, 1, 0),
            BonusCardType::Shipping => (0, 0, 0, 3),
            BonusCardType::DwellingVp => (2, 0, 0, 0),
            BonusCardType::WorkerPower => (0, 1, 0, 3),
            BonusCardType::Spade => (2, 0, 0, 0),
            BonusCardType::TradingHouseVp => (0, 1, 0, 0),
            BonusCardType::SixCoins => (6, 0, 0, 0),
            BonusCardType::CultAdvance => (4, 0, 0, 0),
            BonusCardType::StrongholdSanctuaryVp => (0, 2, 0, 0),
            BonusCardType::ShippingVp => (0, 0, 0, 3),
        };
        Income {
            coins,
            workers,
            priests,
            power,
        }
    }

    /// Temporary shipping bump for the round the card is held
    pub fn shipping_bonus(&self) -> u32 {
        match self {
            BonusCardType::Shipping => 1,
            _ => 0,
        }
    }

    pub fn has_special_action(&self) -> bool {
        matches!(self, BonusCardType::Spade | BonusCardType::CultAdvance)
    }
}

/// Pool of bonus cards in play
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusCardState {
    /// Unclaimed cards and the coins accumulated on each
    pub available: HashMap<BonusCardType, u32>,
    /// Card currently held per player
    pub player_cards: HashMap<String, BonusCardType>,
}

impl BonusCardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw player_count + 3 cards at random into the pool
    pub fn select_random_cards<R: rand::Rng>(&mut self, player_count: usize, rng: &mut R) {
        use rand::seq::SliceRandom;
        let mut all = BonusCardType::ALL.to_vec();
        all.shuffle(rng);
        let count = (player_count + 3).min(all.len());
        self.available = all.into_iter().take(count).map(|c| (c, 0)).collect();
    }

    /// Fix the available cards. Used by tests and custom setups.
    pub fn set_available(&mut self, cards: &[BonusCardType]) {
        self.available = cards.iter().map(|c| (*c, 0)).collect();
    }

    pub fn is_available(&self, card: BonusCardType) -> bool {
        self.available.contains_key(&card)
    }

    pub fn coins_on_card(&self, card: BonusCardType) -> u32 {
        self.available.get(&card).copied().unwrap_or(0)
    }

    /// Take a card from the pool. Returns the coins sitting on it.
    /// The player's previous card (if any) must be returned first via
    /// `return_card`; holding two is an error.
    pub fn take_card(&mut self, player_id: &str, card: BonusCardType) -> Result<u32, GameError> {
        if !self.is_available(card) {
            return Err(GameError::TileUnavailable(format!("bonus card {card:?}")));
        }
        if self.player_cards.contains_key(player_id) {
            return Err(GameError::InvalidAction(
                "player already holds a bonus card this round".into(),
            ));
        }
        let coins = self.available.remove(&card).unwrap_or(0);
        self.player_cards.insert(player_id.to_string(), card);
        Ok(coins)
    }

    /// Return the player's card to the pool with zero coins
    pub fn return_card(&mut self, player_id: &str) {
        if let Some(card) = self.player_cards.remove(player_id) {
            self.available.insert(card, 0);
        }
    }

    /// One coin lands on every unclaimed card at cleanup
    pub fn add_coins_to_leftover_cards(&mut self) {
        for coins in self.available.values_mut() {
            *coins += 1;
        }
    }

    pub fn player_card(&self, player_id: &str) -> Option<BonusCardType> {
        self.player_cards.get(player_id).copied()
    }
}

/// Pass VP for the card given the player's board presence
pub fn pass_vp(
    card: BonusCardType,
    dwellings: u32,
    trading_houses: u32,
    strongholds: u32,
    sanctuaries: u32,
    shipping_level: u32,
    shipping_counts: bool,
) -> i32 {
    match card {
        BonusCardType::DwellingVp => dwellings as i32,
        BonusCardType::TradingHouseVp => trading_houses as i32 * 2,
        BonusCardType::StrongholdSanctuaryVp => (strongholds + sanctuaries) as i32 * 4,
        BonusCardType::ShippingVp if shipping_counts => shipping_level as i32 * 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn coins_accumulate_on_unclaimed_cards_and_pay_out() {
        let mut pool = BonusCardState::new();
        pool.set_available(&[BonusCardType::SixCoins, BonusCardType::Priest]);
        pool.add_coins_to_leftover_cards();
        pool.add_coins_to_leftover_cards();
        assert_eq!(pool.coins_on_card(BonusCardType::Priest), 2);

        let coins = pool.take_card("p1", BonusCardType::Priest).unwrap();
        assert_eq!(coins, 2);
        assert!(!pool.is_available(BonusCardType::Priest));
    }

    #[test]
    fn returned_card_reenters_the_pool_clean() {
        let mut pool = BonusCardState::new();
        pool.set_available(&[BonusCardType::Spade]);
        pool.add_coins_to_leftover_cards();
        pool.take_card("p1", BonusCardType::Spade).unwrap();
        pool.return_card("p1");
        assert!(pool.is_available(BonusCardType::Spade));
        assert_eq!(pool.coins_on_card(BonusCardType::Spade), 0);
    }

    #[test]
    fn one_card_per_player_at_a_time() {
        let mut pool = BonusCardState::new();
        pool.set_available(&[BonusCardType::Priest, BonusCardType::SixCoins]);
        pool.take_card("p1", BonusCardType::Priest).unwrap();
        assert!(pool.take_card("p1", BonusCardType::SixCoins).is_err());
    }

    #[test]
    fn shipping_pass_vp_excludes_factions_without_shipping() {
        assert_eq!(pass_vp(BonusCardType::ShippingVp, 0, 0, 0, 0, 2, true), 6);
        assert_eq!(pass_vp(BonusCardType::ShippingVp, 0, 0, 0, 0, 2, false), 0);
        assert_eq!(pass_vp(BonusCardType::StrongholdSanctuaryVp, 0, 0, 1, 1, 0, true), 8);
    }
}
