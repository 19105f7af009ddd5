//! Faction auctions.
//!
//! Players bid starting VP reductions (from a base of 40) on nominated
//! factions. Turn order for the rest of the game follows nomination order.
//! Two protocols share the nomination phase:
//! - regular auction: open ascending bids rotating among seatless players
//! - fast auction: one sealed bid vector per seat, resolved by exhaustive
//!   search over all faction assignments

use crate::errors::GameError;
use crate::faction::FactionType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Starting VP before any reduction
pub const BASE_STARTING_VP: i32 = 40;

/// How factions are assigned at the start of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupMode {
    /// Sequential faction pick, no bidding
    Standard,
    /// Open ascending auction
    Auction,
    /// Sealed simultaneous auction
    FastAuction,
}

/// Result of the auction for one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionResult {
    pub player_id: String,
    pub faction: FactionType,
    pub starting_vp: i32,
    pub vp_bid: i32,
}

/// State of an in-progress or completed auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    pub active: bool,
    pub mode: SetupMode,
    /// Factions in nomination order; this order becomes the turn order
    pub nomination_order: Vec<FactionType>,
    /// Current VP reduction per faction
    pub current_bids: HashMap<FactionType, i32>,
    /// Current holder per faction
    pub faction_holders: HashMap<FactionType, String>,
    pub seat_order: Vec<String>,
    pub current_bidder_index: usize,
    pub nomination_phase: bool,
    pub nominations_complete: usize,
    /// Sealed bid vectors, fast auction only
    pub fast_bids: HashMap<String, HashMap<FactionType, i32>>,
    pub fast_submitted: HashMap<String, bool>,
}

impl AuctionState {
    pub fn new(seat_order: Vec<String>, mode: SetupMode) -> Self {
        Self {
            active: true,
            mode,
            nomination_order: Vec::new(),
            current_bids: HashMap::new(),
            faction_holders: HashMap::new(),
            seat_order,
            current_bidder_index: 0,
            nomination_phase: true,
            nominations_complete: 0,
            fast_bids: HashMap::new(),
            fast_submitted: HashMap::new(),
        }
    }

    fn player_has_faction(&self, player_id: &str) -> bool {
        self.faction_holders.values().any(|h| h == player_id)
    }

    /// Nominate one faction during the nomination phase
    pub fn nominate_faction(
        &mut self,
        player_id: &str,
        faction: FactionType,
    ) -> Result<(), GameError> {
        if !self.active {
            return Err(GameError::Auction("auction is not active".into()));
        }
        if !self.nomination_phase {
            return Err(GameError::Auction("nomination phase is over".into()));
        }
        if self.seat_order.get(self.nominations_complete).map(String::as_str) != Some(player_id) {
            return Err(GameError::Auction("not your turn to nominate".into()));
        }
        if self.nomination_order.contains(&faction) {
            return Err(GameError::Auction("faction already nominated".into()));
        }
        if self
            .nomination_order
            .iter()
            .any(|f| f.color() == faction.color())
        {
            return Err(GameError::Auction(
                "a faction of this color has already been nominated".into(),
            ));
        }

        self.nomination_order.push(faction);
        self.current_bids.insert(faction, 0);
        self.nominations_complete += 1;

        if self.nominations_complete == self.seat_order.len() {
            self.nomination_phase = false;
            self.current_bidder_index = 0;
        }
        Ok(())
    }

    /// Place one open bid during the regular auction's bidding phase
    pub fn place_bid(
        &mut self,
        player_id: &str,
        faction: FactionType,
        vp_reduction: i32,
    ) -> Result<(), GameError> {
        if self.mode != SetupMode::Auction {
            return Err(GameError::Auction(
                "place bid is only available in regular auction mode".into(),
            ));
        }
        self.validate_bid(player_id, faction, vp_reduction)?;
        self.execute_bid(player_id, faction, vp_reduction);
        Ok(())
    }

    fn validate_bid(
        &self,
        player_id: &str,
        faction: FactionType,
        vp_reduction: i32,
    ) -> Result<(), GameError> {
        if !self.active {
            return Err(GameError::Auction("auction is not active".into()));
        }
        if self.nomination_phase {
            return Err(GameError::Auction("still in nomination phase".into()));
        }
        if self.player_has_faction(player_id) {
            return Err(GameError::Auction("you already have a faction".into()));
        }
        if self.seat_order.get(self.current_bidder_index).map(String::as_str) != Some(player_id) {
            return Err(GameError::Auction("not your turn to bid".into()));
        }
        let current_bid = match self.current_bids.get(&faction) {
            Some(bid) => *bid,
            None => return Err(GameError::Auction("faction not in auction".into())),
        };
        if !(0..=BASE_STARTING_VP).contains(&vp_reduction) {
            return Err(GameError::Auction(
                "VP reduction must be between 0 and 40".into(),
            ));
        }
        // Overbidding a held faction must strictly exceed the current bid
        if self.faction_holders.contains_key(&faction) && vp_reduction <= current_bid {
            return Err(GameError::Auction(format!(
                "must reduce VP by at least 1 more than current bid ({current_bid})"
            )));
        }
        Ok(())
    }

    fn execute_bid(&mut self, player_id: &str, faction: FactionType, vp_reduction: i32) {
        // The bidder's previously held faction re-enters the pool, and the
        // outbid holder loses holdership, both atomically with the new bid
        self.faction_holders.retain(|_, holder| holder != player_id);
        self.current_bids.insert(faction, vp_reduction);
        self.faction_holders.insert(faction, player_id.to_string());

        self.advance_to_next_bidder(|auction, candidate| !auction.player_has_faction(candidate));

        if self.is_complete() {
            self.active = false;
        }
    }

    fn advance_to_next_bidder<F>(&mut self, still_needs_turn: F)
    where
        F: Fn(&AuctionState, &str) -> bool,
    {
        let start = self.current_bidder_index;
        loop {
            self.current_bidder_index = (self.current_bidder_index + 1) % self.seat_order.len();
            if self.current_bidder_index == start {
                break;
            }
            let candidate = self.seat_order[self.current_bidder_index].clone();
            if still_needs_turn(self, &candidate) {
                break;
            }
        }
    }

    /// Submit one sealed bid vector covering every nominated faction
    pub fn submit_fast_bids(
        &mut self,
        player_id: &str,
        bids: &HashMap<FactionType, i32>,
    ) -> Result<(), GameError> {
        if !self.active {
            return Err(GameError::Auction("auction is not active".into()));
        }
        if self.mode != SetupMode::FastAuction {
            return Err(GameError::Auction(
                "fast bid submission is only available in fast auction mode".into(),
            ));
        }
        if self.nomination_phase {
            return Err(GameError::Auction("still in nomination phase".into()));
        }
        if self.seat_order.get(self.current_bidder_index).map(String::as_str) != Some(player_id) {
            return Err(GameError::Auction(
                "not your turn to submit fast auction bids".into(),
            ));
        }
        if self.fast_submitted.get(player_id).copied().unwrap_or(false) {
            return Err(GameError::Auction(
                "player already submitted fast auction bids".into(),
            ));
        }
        if self.nomination_order.is_empty() {
            return Err(GameError::Auction(
                "no nominated factions available for fast auction bids".into(),
            ));
        }
        if bids.len() != self.nomination_order.len() {
            return Err(GameError::Auction(format!(
                "must submit bids for exactly {} nominated factions",
                self.nomination_order.len()
            )));
        }

        let mut player_bids = HashMap::with_capacity(self.nomination_order.len());
        for faction in &self.nomination_order {
            let value = *bids.get(faction).ok_or_else(|| {
                GameError::Auction(format!("missing fast auction bid for faction {faction:?}"))
            })?;
            if !(0..=BASE_STARTING_VP).contains(&value) {
                return Err(GameError::Auction(format!(
                    "VP reduction for faction {faction:?} must be between 0 and 40"
                )));
            }
            player_bids.insert(*faction, value);
        }

        self.fast_bids.insert(player_id.to_string(), player_bids);
        self.fast_submitted.insert(player_id.to_string(), true);
        self.advance_to_next_bidder(|auction, candidate| {
            !auction.fast_submitted.get(candidate).copied().unwrap_or(false)
        });

        if self.all_fast_bids_submitted() {
            self.resolve_fast_auction()?;
            self.active = false;
        }
        Ok(())
    }

    fn all_fast_bids_submitted(&self) -> bool {
        self.seat_order
            .iter()
            .all(|p| self.fast_submitted.get(p).copied().unwrap_or(false))
    }

    /// Exhaustive search over all faction-to-seat assignments, maximizing
    /// total VP reduction. Ties break first toward the lexicographically
    /// largest per-seat bid vector, then toward the lexicographically
    /// smallest faction-index assignment. Seat count is at most 5, so the
    /// search space is at most 120 permutations.
    fn resolve_fast_auction(&mut self) -> Result<(), GameError> {
        if self.nomination_order.len() != self.seat_order.len() {
            return Err(GameError::Auction(format!(
                "cannot resolve fast auction: nominations ({}) must match players ({})",
                self.nomination_order.len(),
                self.seat_order.len()
            )));
        }

        let n = self.seat_order.len();
        let mut best: Option<(i32, Vec<i32>, Vec<usize>)> = None;
        let mut assignment = vec![0usize; n];
        let mut used = vec![false; n];

        self.search_assignments(0, n, &mut assignment, &mut used, &mut best);

        let (_, _, best_faction_idx) =
            best.ok_or_else(|| GameError::Auction("unable to resolve fast auction assignments".into()))?;

        for (seat, faction_idx) in best_faction_idx.iter().enumerate() {
            let player_id = self.seat_order[seat].clone();
            let faction = self.nomination_order[*faction_idx];
            let bid = self.fast_bids[&player_id][&faction];
            self.current_bids.insert(faction, bid);
            self.faction_holders.insert(faction, player_id);
        }
        Ok(())
    }

    fn search_assignments(
        &self,
        seat: usize,
        n: usize,
        assignment: &mut Vec<usize>,
        used: &mut Vec<bool>,
        best: &mut Option<(i32, Vec<i32>, Vec<usize>)>,
    ) {
        if seat == n {
            let mut score = 0;
            let mut seat_bids = Vec::with_capacity(n);
            for (i, player_id) in self.seat_order.iter().enumerate() {
                let faction = self.nomination_order[assignment[i]];
                let bid = self.fast_bids[player_id][&faction];
                seat_bids.push(bid);
                score += bid;
            }
            let candidate_better = match best {
                None => true,
                Some((best_score, best_bids, best_idx)) => {
                    score > *best_score
                        || (score == *best_score && seat_bids > *best_bids)
                        || (score == *best_score
                            && seat_bids == *best_bids
                            && assignment < best_idx)
                }
            };
            if candidate_better {
                *best = Some((score, seat_bids, assignment.clone()));
            }
            return;
        }
        for faction_idx in 0..n {
            if used[faction_idx] {
                continue;
            }
            used[faction_idx] = true;
            assignment[seat] = faction_idx;
            self.search_assignments(seat + 1, n, assignment, used, best);
            used[faction_idx] = false;
        }
    }

    /// Whether every seat holds a faction
    pub fn is_complete(&self) -> bool {
        self.seat_order.iter().all(|p| self.player_has_faction(p))
    }

    /// Player whose input the auction is waiting on, if any
    pub fn current_bidder(&self) -> Option<&str> {
        if self.nomination_phase {
            return self
                .seat_order
                .get(self.nominations_complete)
                .map(String::as_str);
        }
        self.seat_order
            .get(self.current_bidder_index)
            .map(String::as_str)
    }

    /// Starting VP for a faction after the final bid
    pub fn starting_vp(&self, faction: FactionType) -> i32 {
        BASE_STARTING_VP - self.current_bids.get(&faction).copied().unwrap_or(0)
    }

    /// Winners in nomination order of their faction. This is how nomination
    /// order becomes the new turn order.
    pub fn turn_order(&self) -> Vec<String> {
        self.nomination_order
            .iter()
            .filter_map(|f| self.faction_holders.get(f).cloned())
            .collect()
    }

    pub fn player_faction(&self, player_id: &str) -> Option<FactionType> {
        self.faction_holders
            .iter()
            .find(|(_, holder)| holder.as_str() == player_id)
            .map(|(faction, _)| *faction)
    }

    /// Per-player summary of a completed auction
    pub fn summary(&self) -> HashMap<String, AuctionResult> {
        let mut results = HashMap::new();
        for player_id in &self.seat_order {
            if let Some(faction) = self.player_faction(player_id) {
                results.insert(
                    player_id.clone(),
                    AuctionResult {
                        player_id: player_id.clone(),
                        faction,
                        starting_vp: self.starting_vp(faction),
                        vp_bid: self.current_bids.get(&faction).copied().unwrap_or(0),
                    },
                );
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seats() -> Vec<String> {
        vec!["p1".to_string(), "p2".to_string(), "p3".to_string()]
    }

    fn nominated(mode: SetupMode) -> AuctionState {
        let mut auction = AuctionState::new(seats(), mode);
        auction.nominate_faction("p1", FactionType::Nomads).unwrap();
        auction.nominate_faction("p2", FactionType::Witches).unwrap();
        auction
            .nominate_faction("p3", FactionType::Engineers)
            .unwrap();
        auction
    }

    #[test]
    fn nomination_enforces_seat_order_and_color_uniqueness() {
        let mut auction = AuctionState::new(seats(), SetupMode::Auction);
        assert!(auction.nominate_faction("p2", FactionType::Nomads).is_err());
        auction.nominate_faction("p1", FactionType::Nomads).unwrap();
        // Fakirs share the Nomads' color class
        assert!(auction.nominate_faction("p2", FactionType::Fakirs).is_err());
        auction.nominate_faction("p2", FactionType::Witches).unwrap();
        auction
            .nominate_faction("p3", FactionType::Engineers)
            .unwrap();
        assert!(!auction.nomination_phase);
    }

    #[test]
    fn uncontested_bids_keep_nomination_order() {
        let mut auction = nominated(SetupMode::Auction);
        auction.place_bid("p1", FactionType::Nomads, 0).unwrap();
        auction.place_bid("p2", FactionType::Witches, 1).unwrap();
        auction.place_bid("p3", FactionType::Engineers, 2).unwrap();

        assert!(!auction.active);
        assert!(auction.is_complete());
        assert_eq!(auction.starting_vp(FactionType::Nomads), 40);
        assert_eq!(auction.starting_vp(FactionType::Witches), 39);
        assert_eq!(auction.starting_vp(FactionType::Engineers), 38);
        assert_eq!(auction.turn_order(), seats());
    }

    #[test]
    fn overbid_must_strictly_exceed_and_releases_holder() {
        let mut auction = nominated(SetupMode::Auction);
        auction.place_bid("p1", FactionType::Witches, 2).unwrap();
        // p2 matching the bid is rejected
        assert!(auction.place_bid("p2", FactionType::Witches, 2).is_err());
        auction.place_bid("p2", FactionType::Witches, 3).unwrap();

        // p1 lost holdership and must bid again later
        assert_eq!(
            auction.player_faction("p1"),
            None,
        );
        assert_eq!(
            auction.player_faction("p2"),
            Some(FactionType::Witches)
        );
        // Turn rotation skips p2 who now holds a faction
        assert_eq!(auction.current_bidder(), Some("p3"));
    }

    #[test]
    fn fast_auction_resolves_the_reference_matrix() {
        let mut auction = nominated(SetupMode::FastAuction);

        let bids = |n: i32, w: i32, e: i32| {
            HashMap::from([
                (FactionType::Nomads, n),
                (FactionType::Witches, w),
                (FactionType::Engineers, e),
            ])
        };
        auction.submit_fast_bids("p1", &bids(2, 4, 1)).unwrap();
        auction.submit_fast_bids("p2", &bids(0, 3, 5)).unwrap();
        auction.submit_fast_bids("p3", &bids(1, 2, 4)).unwrap();

        assert!(!auction.active);
        assert_eq!(auction.player_faction("p1"), Some(FactionType::Witches));
        assert_eq!(auction.player_faction("p2"), Some(FactionType::Engineers));
        assert_eq!(auction.player_faction("p3"), Some(FactionType::Nomads));
        assert_eq!(auction.starting_vp(FactionType::Witches), 36);
        assert_eq!(auction.starting_vp(FactionType::Engineers), 35);
        assert_eq!(auction.starting_vp(FactionType::Nomads), 39);
        // Turn order follows nomination order of the won factions
        assert_eq!(
            auction.turn_order(),
            vec!["p3".to_string(), "p1".to_string(), "p2".to_string()]
        );
    }

    #[test]
    fn fast_auction_is_deterministic_on_ties() {
        // All-zero bids: every assignment scores 0, so the tie-breaks pick
        // the lexicographically smallest faction-index assignment
        let mut auction = nominated(SetupMode::FastAuction);
        let zero = HashMap::from([
            (FactionType::Nomads, 0),
            (FactionType::Witches, 0),
            (FactionType::Engineers, 0),
        ]);
        auction.submit_fast_bids("p1", &zero).unwrap();
        auction.submit_fast_bids("p2", &zero).unwrap();
        auction.submit_fast_bids("p3", &zero).unwrap();

        assert_eq!(auction.player_faction("p1"), Some(FactionType::Nomads));
        assert_eq!(auction.player_faction("p2"), Some(FactionType::Witches));
        assert_eq!(auction.player_faction("p3"), Some(FactionType::Engineers));
    }

    #[test]
    fn fast_bids_must_cover_every_faction() {
        let mut auction = nominated(SetupMode::FastAuction);
        let partial = HashMap::from([(FactionType::Nomads, 3)]);
        assert!(auction.submit_fast_bids("p1", &partial).is_err());
    }

    #[test]
    fn completed_auction_is_a_bijection() {
        let mut auction = nominated(SetupMode::Auction);
        auction.place_bid("p1", FactionType::Engineers, 1).unwrap();
        auction.place_bid("p2", FactionType::Engineers, 2).unwrap();
        auction.place_bid("p3", FactionType::Nomads, 0).unwrap();
        auction.place_bid("p1", FactionType::Witches, 0).unwrap();

        assert!(auction.is_complete());
        let summary = auction.summary();
        assert_eq!(summary.len(), 3);
        let mut factions: Vec<FactionType> =
            summary.values().map(|r| r.faction).collect();
        factions.sort_by_key(|f| format!("{f:?}"));
        factions.dedup();
        assert_eq!(factions.len(), 3);
    }
}
