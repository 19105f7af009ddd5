//! The closed set of game actions.
//!
//! Every mutation of a game goes through one `Action` value: validation is
//! pure, execution validates first and then applies the whole effect or
//! nothing. Turn rotation happens inside execution, so callers never need
//! to know which actions end a turn and which leave follow-up decisions
//! open.

use crate::auction::SetupMode;
use crate::bonus::{pass_vp, BonusCardType};
use crate::cult::CultTrack;
use crate::errors::GameError;
use crate::faction::{FactionType, SpecialActionKind, StrongholdEffect};
use crate::favor::FavorTileType;
use crate::map::{Building, BuildingType, HexCoord, TerrainType};
use crate::power_actions::PowerActionType;
use crate::resources::{Cost, POWER_PER_PRIEST, PRIEST_LIMIT};
use crate::scoring::ScoringAction;
use crate::state::{GamePhase, GameState, PendingSpades, SetupSubphase};
use crate::town::TownTileType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discriminant used for gate checks and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    TransformAndBuild,
    UpgradeBuilding,
    AdvanceShipping,
    AdvanceDigging,
    SendPriestToCult,
    PowerAction,
    EngineersBridge,
    SpecialAction,
    Conversion,
    BurnPower,
    Pass,
    AcceptPowerLeech,
    DeclinePowerLeech,
    CultistsCultChoice,
    SelectFavorTile,
    SelectTownTile,
    SelectTownCultTop,
    DarklingsOrdination,
    HalflingsApplySpade,
    ApplyPendingSpade,
    DiscardPendingSpade,
    CultRewardSpade,
    SelectFaction,
    AuctionNominate,
    AuctionBid,
    FastAuctionBids,
    SetupDwelling,
    SetupBonusCard,
}

/// Free exchanges available any time during the owner's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionType {
    PowerToCoins,
    PowerToWorkers,
    PowerToPriests,
    PriestToWorker,
    WorkerToCoin,
    /// Alchemists only: 1 VP for 1 coin
    VpToCoin,
    /// Alchemists only: 2 coins for 1 VP
    CoinToVp,
}

/// Every action a client can submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    TransformAndBuild {
        player_id: String,
        hex: HexCoord,
        build_dwelling: bool,
    },
    UpgradeBuilding {
        player_id: String,
        hex: HexCoord,
        to: BuildingType,
    },
    AdvanceShipping {
        player_id: String,
    },
    AdvanceDigging {
        player_id: String,
    },
    SendPriestToCult {
        player_id: String,
        track: CultTrack,
        steps: u32,
    },
    PowerAction {
        player_id: String,
        action: PowerActionType,
        /// Endpoints, bridge action only
        bridge: Option<(HexCoord, HexCoord)>,
    },
    /// Engineers only: a bridge paid in workers, reusable whenever legal
    EngineersBridge {
        player_id: String,
        bridge: (HexCoord, HexCoord),
    },
    Special {
        player_id: String,
        kind: SpecialActionKind,
        track: Option<CultTrack>,
        hex: Option<HexCoord>,
        build_dwelling: bool,
    },
    Convert {
        player_id: String,
        conversion: ConversionType,
        amount: u32,
    },
    BurnPower {
        player_id: String,
        amount: u32,
    },
    Pass {
        player_id: String,
        bonus_card: Option<BonusCardType>,
    },
    AcceptPowerLeech {
        player_id: String,
        offer_index: usize,
    },
    DeclinePowerLeech {
        player_id: String,
        offer_index: usize,
    },
    CultistsCultChoice {
        player_id: String,
        track: CultTrack,
    },
    SelectFavorTile {
        player_id: String,
        tile: FavorTileType,
    },
    SelectTownTile {
        player_id: String,
        tile: TownTileType,
    },
    SelectTownCultTop {
        player_id: String,
        track: CultTrack,
    },
    DarklingsOrdination {
        player_id: String,
        workers: u32,
    },
    HalflingsApplySpade {
        player_id: String,
        hex: HexCoord,
        build_dwelling: bool,
    },
    ApplyPendingSpade {
        player_id: String,
        hex: HexCoord,
        build_dwelling: bool,
    },
    DiscardPendingSpade {
        player_id: String,
    },
    CultRewardSpade {
        player_id: String,
        hex: HexCoord,
    },
    SelectFaction {
        player_id: String,
        faction: FactionType,
    },
    AuctionNominate {
        player_id: String,
        faction: FactionType,
    },
    AuctionBid {
        player_id: String,
        faction: FactionType,
        vp_reduction: i32,
    },
    FastAuctionBids {
        player_id: String,
        bids: HashMap<FactionType, i32>,
    },
    SetupDwelling {
        player_id: String,
        hex: HexCoord,
    },
    SetupBonusCard {
        player_id: String,
        card: BonusCardType,
    },
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::TransformAndBuild { .. } => ActionType::TransformAndBuild,
            Action::UpgradeBuilding { .. } => ActionType::UpgradeBuilding,
            Action::AdvanceShipping { .. } => ActionType::AdvanceShipping,
            Action::AdvanceDigging { .. } => ActionType::AdvanceDigging,
            Action::SendPriestToCult { .. } => ActionType::SendPriestToCult,
            Action::PowerAction { .. } => ActionType::PowerAction,
            Action::EngineersBridge { .. } => ActionType::EngineersBridge,
            Action::Special { .. } => ActionType::SpecialAction,
            Action::Convert { .. } => ActionType::Conversion,
            Action::BurnPower { .. } => ActionType::BurnPower,
            Action::Pass { .. } => ActionType::Pass,
            Action::AcceptPowerLeech { .. } => ActionType::AcceptPowerLeech,
            Action::DeclinePowerLeech { .. } => ActionType::DeclinePowerLeech,
            Action::CultistsCultChoice { .. } => ActionType::CultistsCultChoice,
            Action::SelectFavorTile { .. } => ActionType::SelectFavorTile,
            Action::SelectTownTile { .. } => ActionType::SelectTownTile,
            Action::SelectTownCultTop { .. } => ActionType::SelectTownCultTop,
            Action::DarklingsOrdination { .. } => ActionType::DarklingsOrdination,
            Action::HalflingsApplySpade { .. } => ActionType::HalflingsApplySpade,
            Action::ApplyPendingSpade { .. } => ActionType::ApplyPendingSpade,
            Action::DiscardPendingSpade { .. } => ActionType::DiscardPendingSpade,
            Action::CultRewardSpade { .. } => ActionType::CultRewardSpade,
            Action::SelectFaction { .. } => ActionType::SelectFaction,
            Action::AuctionNominate { .. } => ActionType::AuctionNominate,
            Action::AuctionBid { .. } => ActionType::AuctionBid,
            Action::FastAuctionBids { .. } => ActionType::FastAuctionBids,
            Action::SetupDwelling { .. } => ActionType::SetupDwelling,
            Action::SetupBonusCard { .. } => ActionType::SetupBonusCard,
        }
    }

    pub fn player_id(&self) -> &str {
        match self {
            Action::TransformAndBuild { player_id, .. }
            | Action::UpgradeBuilding { player_id, .. }
            | Action::AdvanceShipping { player_id }
            | Action::AdvanceDigging { player_id }
            | Action::SendPriestToCult { player_id, .. }
            | Action::PowerAction { player_id, .. }
            | Action::EngineersBridge { player_id, .. }
            | Action::Special { player_id, .. }
            | Action::Convert { player_id, .. }
            | Action::BurnPower { player_id, .. }
            | Action::Pass { player_id, .. }
            | Action::AcceptPowerLeech { player_id, .. }
            | Action::DeclinePowerLeech { player_id, .. }
            | Action::CultistsCultChoice { player_id, .. }
            | Action::SelectFavorTile { player_id, .. }
            | Action::SelectTownTile { player_id, .. }
            | Action::SelectTownCultTop { player_id, .. }
            | Action::DarklingsOrdination { player_id, .. }
            | Action::HalflingsApplySpade { player_id, .. }
            | Action::ApplyPendingSpade { player_id, .. }
            | Action::DiscardPendingSpade { player_id }
            | Action::CultRewardSpade { player_id, .. }
            | Action::SelectFaction { player_id, .. }
            | Action::AuctionNominate { player_id, .. }
            | Action::AuctionBid { player_id, .. }
            | Action::FastAuctionBids { player_id, .. }
            | Action::SetupDwelling { player_id, .. }
            | Action::SetupBonusCard { player_id, .. } => player_id,
        }
    }

    /// Whether the turn gate should check this action against the current
    /// player. Pending-decision resolutions, free exchanges, and the setup
    /// and auction flows carry their own ordering and are exempt.
    pub fn requires_turn_ownership(&self) -> bool {
        !matches!(
            self.action_type(),
            ActionType::AcceptPowerLeech
                | ActionType::DeclinePowerLeech
                | ActionType::Conversion
                | ActionType::BurnPower
                | ActionType::CultistsCultChoice
                | ActionType::SelectFavorTile
                | ActionType::SelectTownTile
                | ActionType::SelectTownCultTop
                | ActionType::DarklingsOrdination
                | ActionType::HalflingsApplySpade
                | ActionType::ApplyPendingSpade
                | ActionType::DiscardPendingSpade
                | ActionType::CultRewardSpade
                | ActionType::SetupDwelling
                | ActionType::SetupBonusCard
                | ActionType::AuctionNominate
                | ActionType::AuctionBid
                | ActionType::FastAuctionBids
        )
    }

    /// Pure validation against a snapshot of the state
    pub fn validate(&self, gs: &GameState) -> Result<(), GameError> {
        match self {
            Action::TransformAndBuild {
                player_id,
                hex,
                build_dwelling,
            } => validate_transform_and_build(gs, player_id, hex, *build_dwelling),
            Action::UpgradeBuilding { player_id, hex, to } => {
                validate_upgrade(gs, player_id, hex, *to)
            }
            Action::AdvanceShipping { player_id } => validate_advance_shipping(gs, player_id),
            Action::AdvanceDigging { player_id } => validate_advance_digging(gs, player_id),
            Action::SendPriestToCult {
                player_id, steps, ..
            } => validate_send_priest(gs, player_id, *steps),
            Action::PowerAction {
                player_id,
                action,
                bridge,
            } => validate_power_action(gs, player_id, *action, bridge),
            Action::EngineersBridge { player_id, bridge } => {
                validate_engineers_bridge(gs, player_id, &bridge.0, &bridge.1)
            }
            Action::Special {
                player_id,
                kind,
                track,
                hex,
                build_dwelling,
            } => validate_special(gs, player_id, *kind, track, hex, *build_dwelling),
            Action::Convert {
                player_id,
                conversion,
                amount,
            } => validate_conversion(gs, player_id, *conversion, *amount),
            Action::BurnPower { player_id, amount } => {
                let player = gs.get_player(player_id)?;
                if player.resources.power.bowl2 < amount * 2 {
                    return Err(GameError::InsufficientPower);
                }
                Ok(())
            }
            Action::Pass {
                player_id,
                bonus_card,
            } => validate_pass(gs, player_id, bonus_card),
            Action::AcceptPowerLeech {
                player_id,
                offer_index,
            }
            | Action::DeclinePowerLeech {
                player_id,
                offer_index,
            } => {
                gs.get_player(player_id)?;
                let has_offer = gs
                    .pending_leech_offers
                    .get(player_id)
                    .map(|v| *offer_index < v.len())
                    .unwrap_or(false);
                if !has_offer {
                    return Err(GameError::InvalidAction(format!(
                        "no pending power offer at index {offer_index}"
                    )));
                }
                Ok(())
            }
            Action::CultistsCultChoice { player_id, .. } => {
                match &gs.pending_cultists_choice {
                    Some(pending) if pending.player_id == *player_id => Ok(()),
                    Some(pending) => Err(GameError::PendingDecision {
                        player: pending.player_id.clone(),
                        decision: "cultists cult choice".into(),
                    }),
                    None => Err(GameError::InvalidAction(
                        "no pending cultists cult choice".into(),
                    )),
                }
            }
            Action::SelectFavorTile { player_id, tile } => {
                let pending = gs.pending_favor_selection.as_ref().ok_or_else(|| {
                    GameError::InvalidAction("no pending favor tile selection".into())
                })?;
                if pending.player_id != *player_id {
                    return Err(GameError::PendingDecision {
                        player: pending.player_id.clone(),
                        decision: "favor tile selection".into(),
                    });
                }
                if !gs.favor_tiles.is_available(*tile) {
                    return Err(GameError::TileUnavailable(format!("favor tile {tile:?}")));
                }
                if gs.favor_tiles.has_tile(player_id, *tile) {
                    return Err(GameError::InvalidAction(format!(
                        "player already has favor tile {tile:?}"
                    )));
                }
                Ok(())
            }
            Action::SelectTownTile { player_id, tile } => {
                let has_formation = gs
                    .pending_town_formations
                    .get(player_id)
                    .map(|v| !v.is_empty())
                    .unwrap_or(false);
                if !has_formation {
                    return Err(GameError::InvalidAction(format!(
                        "no pending town formation for {player_id}"
                    )));
                }
                if !gs.town_tiles.is_available(*tile) {
                    return Err(GameError::TileUnavailable(format!("town tile {tile:?}")));
                }
                Ok(())
            }
            Action::SelectTownCultTop { player_id, track } => {
                let pending = gs
                    .pending_town_cult_top
                    .as_ref()
                    .ok_or_else(|| GameError::InvalidAction("no pending cult top choice".into()))?;
                if pending.player_id != *player_id {
                    return Err(GameError::PendingDecision {
                        player: pending.player_id.clone(),
                        decision: "town cult top choice".into(),
                    });
                }
                if !pending.candidate_tracks.contains(track) {
                    return Err(GameError::InvalidAction(format!(
                        "{track:?} is not a candidate track"
                    )));
                }
                Ok(())
            }
            Action::DarklingsOrdination { player_id, workers } => {
                let pending = gs.pending_darklings_ordination.as_ref().ok_or_else(|| {
                    GameError::InvalidAction("no pending priest ordination".into())
                })?;
                if pending.player_id != *player_id {
                    return Err(GameError::PendingDecision {
                        player: pending.player_id.clone(),
                        decision: "priest ordination".into(),
                    });
                }
                if *workers > pending.remaining {
                    return Err(GameError::InvalidAction(format!(
                        "can convert at most {} workers",
                        pending.remaining
                    )));
                }
                if gs.get_player(player_id)?.resources.workers < *workers {
                    return Err(GameError::InsufficientResources);
                }
                Ok(())
            }
            Action::HalflingsApplySpade { player_id, hex, .. } => {
                let pending = gs.pending_halflings_spades.as_ref().ok_or_else(|| {
                    GameError::InvalidAction("no pending stronghold spades".into())
                })?;
                if pending.player_id != *player_id {
                    return Err(GameError::PendingDecision {
                        player: pending.player_id.clone(),
                        decision: "stronghold spades".into(),
                    });
                }
                if pending.remaining == 0 {
                    return Err(GameError::InvalidAction("no spades remaining".into()));
                }
                validate_spade_target(gs, player_id, hex)
            }
            Action::ApplyPendingSpade { player_id, hex, .. } => {
                if gs
                    .pending_spades
                    .get(player_id)
                    .map(|s| s.count)
                    .unwrap_or(0)
                    == 0
                {
                    return Err(GameError::InvalidAction("no pending spades".into()));
                }
                validate_spade_target(gs, player_id, hex)
            }
            Action::DiscardPendingSpade { player_id } => {
                if gs
                    .pending_spades
                    .get(player_id)
                    .map(|s| s.count)
                    .unwrap_or(0)
                    == 0
                {
                    return Err(GameError::InvalidAction("no pending spades".into()));
                }
                Ok(())
            }
            Action::CultRewardSpade { player_id, hex } => {
                if gs
                    .pending_cult_reward_spades
                    .get(player_id)
                    .copied()
                    .unwrap_or(0)
                    == 0
                {
                    return Err(GameError::InvalidAction(
                        "no pending cult reward spades".into(),
                    ));
                }
                validate_cult_spade_target(gs, player_id, hex)
            }
            Action::SelectFaction { player_id, faction } => {
                validate_select_faction(gs, player_id, *faction)
            }
            Action::AuctionNominate { .. }
            | Action::AuctionBid { .. }
            | Action::FastAuctionBids { .. } => {
                if gs.phase != GamePhase::FactionSelection {
                    return Err(GameError::InvalidPhase(
                        "auction actions require faction selection".into(),
                    ));
                }
                if gs.auction.is_none() {
                    return Err(GameError::Auction("no auction in this game".into()));
                }
                Ok(())
            }
            Action::SetupDwelling { player_id, hex } => {
                validate_setup_dwelling(gs, player_id, hex)
            }
            Action::SetupBonusCard { player_id, card } => {
                if gs.phase != GamePhase::Setup || gs.setup_subphase != SetupSubphase::BonusCards
                {
                    return Err(GameError::InvalidPhase(
                        "bonus card setup is not in progress".into(),
                    ));
                }
                if gs.current_setup_bonus_player() != Some(player_id.as_str()) {
                    return Err(GameError::NotYourTurn);
                }
                if !gs.bonus_cards.is_available(*card) {
                    return Err(GameError::TileUnavailable(format!("bonus card {card:?}")));
                }
                Ok(())
            }
        }
    }

    /// Validate and apply. The state is only touched after validation
    /// passes.
    pub fn execute(&self, gs: &mut GameState) -> Result<(), GameError> {
        self.validate(gs)?;
        match self {
            Action::TransformAndBuild {
                player_id,
                hex,
                build_dwelling,
            } => execute_transform_and_build(gs, player_id, hex, *build_dwelling),
            Action::UpgradeBuilding { player_id, hex, to } => {
                execute_upgrade(gs, player_id, hex, *to)
            }
            Action::AdvanceShipping { player_id } => {
                let faction = gs
                    .get_player(player_id)?
                    .faction
                    .ok_or(GameError::NoFaction)?;
                let cost = faction.shipping_advance_cost();
                let player = gs.get_player_mut(player_id)?;
                player.resources.spend(&cost)?;
                player.shipping_level += 1;
                player.victory_points += player.shipping_level as i32 + 1;
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::AdvanceDigging { player_id } => {
                let faction = gs
                    .get_player(player_id)?
                    .faction
                    .ok_or(GameError::NoFaction)?;
                let cost = faction.digging_advance_cost();
                let player = gs.get_player_mut(player_id)?;
                player.resources.spend(&cost)?;
                player.digging_level += 1;
                player.victory_points += 6;
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::SendPriestToCult {
                player_id,
                track,
                steps,
            } => {
                let steps = gs.cult_tracks.place_priest(player_id, *track, *steps)?;
                gs.get_player_mut(player_id)?.resources.priests -= 1;
                gs.advance_cult_track(player_id, *track, steps)?;
                gs.scoring_tiles.record_priest_sent(player_id);
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::PowerAction {
                player_id,
                action,
                bridge,
            } => execute_power_action(gs, player_id, *action, bridge),
            Action::EngineersBridge { player_id, bridge } => {
                execute_engineers_bridge(gs, player_id, &bridge.0, &bridge.1)
            }
            Action::Special {
                player_id,
                kind,
                track,
                hex,
                build_dwelling,
            } => execute_special(gs, player_id, *kind, track, hex, *build_dwelling),
            Action::Convert {
                player_id,
                conversion,
                amount,
            } => execute_conversion(gs, player_id, *conversion, *amount),
            Action::BurnPower { player_id, amount } => {
                gs.get_player_mut(player_id)?.resources.burn_power(*amount)
            }
            Action::Pass {
                player_id,
                bonus_card,
            } => execute_pass(gs, player_id, bonus_card),
            Action::AcceptPowerLeech {
                player_id,
                offer_index,
            } => gs.accept_leech_offer(player_id, *offer_index),
            Action::DeclinePowerLeech {
                player_id,
                offer_index,
            } => gs.decline_leech_offer(player_id, *offer_index),
            Action::CultistsCultChoice { player_id, track } => {
                gs.pending_cultists_choice = None;
                gs.advance_cult_track(player_id, *track, 1)?;
                Ok(())
            }
            Action::SelectFavorTile { player_id, tile } => {
                execute_select_favor_tile(gs, player_id, *tile)
            }
            Action::SelectTownTile { player_id, tile } => {
                execute_select_town_tile(gs, player_id, *tile)
            }
            Action::SelectTownCultTop { player_id, track } => {
                gs.advance_cult_track(player_id, *track, 1)?;
                if let Some(pending) = gs.pending_town_cult_top.as_mut() {
                    pending.candidate_tracks.retain(|t| t != track);
                    pending.remaining = pending.remaining.saturating_sub(1);
                    if pending.remaining == 0 || pending.candidate_tracks.is_empty() {
                        gs.pending_town_cult_top = None;
                    }
                }
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::DarklingsOrdination { player_id, workers } => {
                gs.pending_darklings_ordination = None;
                gs.get_player_mut(player_id)?.resources.workers -= workers;
                gs.gain_priests(player_id, *workers);
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::HalflingsApplySpade {
                player_id,
                hex,
                build_dwelling,
            } => execute_halflings_spade(gs, player_id, hex, *build_dwelling),
            Action::ApplyPendingSpade {
                player_id,
                hex,
                build_dwelling,
            } => execute_pending_spade(gs, player_id, hex, *build_dwelling),
            Action::DiscardPendingSpade { player_id } => {
                gs.pending_spades.remove(player_id);
                finish_turn(gs, player_id);
                Ok(())
            }
            Action::CultRewardSpade { player_id, hex } => {
                transform_one_step(gs, player_id, hex)?;
                if let Some(remaining) = gs.pending_cult_reward_spades.get_mut(player_id) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        gs.pending_cult_reward_spades.remove(player_id);
                    }
                }
                Ok(())
            }
            Action::SelectFaction { player_id, faction } => {
                gs.assign_faction(player_id, *faction, 20)?;
                gs.next_turn();
                let all_assigned = gs.turn_order.iter().all(|id| {
                    gs.players
                        .get(id)
                        .map(|p| p.faction.is_some())
                        .unwrap_or(false)
                });
                if all_assigned {
                    gs.initialize_setup_sequence();
                }
                Ok(())
            }
            Action::AuctionNominate { player_id, faction } => {
                let auction = gs
                    .auction
                    .as_mut()
                    .ok_or_else(|| GameError::Auction("no auction in this game".into()))?;
                auction.nominate_faction(player_id, *faction)?;
                sync_current_player_to_auction(gs);
                Ok(())
            }
            Action::AuctionBid {
                player_id,
                faction,
                vp_reduction,
            } => {
                let auction = gs
                    .auction
                    .as_mut()
                    .ok_or_else(|| GameError::Auction("no auction in this game".into()))?;
                auction.place_bid(player_id, *faction, *vp_reduction)?;
                if gs.auction.as_ref().map(|a| !a.active).unwrap_or(false) {
                    finalize_auction(gs)?;
                } else {
                    sync_current_player_to_auction(gs);
                }
                Ok(())
            }
            Action::FastAuctionBids { player_id, bids } => {
                let auction = gs
                    .auction
                    .as_mut()
                    .ok_or_else(|| GameError::Auction("no auction in this game".into()))?;
                auction.submit_fast_bids(player_id, bids)?;
                if gs.auction.as_ref().map(|a| !a.active).unwrap_or(false) {
                    finalize_auction(gs)?;
                } else {
                    sync_current_player_to_auction(gs);
                }
                Ok(())
            }
            Action::SetupDwelling { player_id, hex } => {
                let cell = gs
                    .map
                    .get_cell_mut(hex)
                    .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
                cell.building = Some(Building {
                    building_type: BuildingType::Dwelling,
                    player_id: player_id.clone(),
                });
                *gs.setup_placed_dwellings
                    .entry(player_id.clone())
                    .or_insert(0) += 1;
                gs.advance_setup_after_dwelling();
                Ok(())
            }
            Action::SetupBonusCard { player_id, card } => {
                let coins = gs.bonus_cards.take_card(player_id, *card)?;
                gs.get_player_mut(player_id)?.resources.coins += coins;
                gs.advance_setup_after_bonus_selection();
                Ok(())
            }
        }
    }
}

// ---- shared helpers ----------------------------------------------------

fn require_action_phase(gs: &GameState, player_id: &str) -> Result<(), GameError> {
    if gs.phase != GamePhase::Action {
        return Err(GameError::InvalidPhase(format!("{:?}", gs.phase)));
    }
    if gs.get_player(player_id)?.has_passed {
        return Err(GameError::AlreadyPassed);
    }
    Ok(())
}

/// Spade count and payment needed to fully transform a hex to home terrain
fn transform_cost(
    gs: &GameState,
    player_id: &str,
    hex: &HexCoord,
) -> Result<(u32, Cost), GameError> {
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let cell = gs
        .map
        .get_cell(hex)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    let distance = cell
        .terrain
        .distance_to(&faction.home_terrain())
        .ok_or_else(|| GameError::InvalidLocation("river cannot be terraformed".into()))?;
    let spades = faction.fixed_spade_count().unwrap_or(distance);
    let cost = if faction.digs_with_priests() {
        Cost::new(0, 0, spades)
    } else {
        Cost::new(0, spades * faction.workers_per_spade(player.digging_level), 0)
    };
    Ok((spades, cost))
}

fn validate_transform_and_build(
    gs: &GameState,
    player_id: &str,
    hex: &HexCoord,
    build_dwelling: bool,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let cell = gs
        .map
        .get_cell(hex)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    if cell.building.is_some() {
        return Err(GameError::InvalidLocation("hex already has a building".into()));
    }
    if !gs.is_adjacent_to_player_building(hex, player_id) {
        return Err(GameError::InvalidLocation(
            "hex is not adjacent to your buildings".into(),
        ));
    }

    let mut total = Cost::default();
    if cell.terrain != faction.home_terrain() {
        let (_, cost) = transform_cost(gs, player_id, hex)?;
        total.workers += cost.workers;
        total.priests += cost.priests;
    }
    if build_dwelling {
        let limit = BuildingType::Dwelling.limit();
        if gs.map.count_buildings(player_id, BuildingType::Dwelling) >= limit {
            return Err(GameError::BuildingLimit(format!(
                "already at {limit} dwellings"
            )));
        }
        let dwelling = faction.building_cost(BuildingType::Dwelling);
        total.coins += dwelling.coins;
        total.workers += dwelling.workers;
        total.priests += dwelling.priests;
    }
    if !player.resources.can_afford(&total) {
        return Err(GameError::InsufficientResources);
    }
    Ok(())
}

fn execute_transform_and_build(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
    build_dwelling: bool,
) -> Result<(), GameError> {
    let home = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?
        .home_terrain();
    let needs_transform = gs
        .map
        .get_cell(hex)
        .map(|c| c.terrain != home)
        .unwrap_or(false);

    if needs_transform {
        let (spades, cost) = transform_cost(gs, player_id, hex)?;
        gs.get_player_mut(player_id)?.resources.spend(&cost)?;
        gs.map.transform_terrain(hex, home);
        apply_spade_rewards(gs, player_id, spades);
    }
    if build_dwelling {
        build_dwelling_at(gs, player_id, hex, false)?;
    }
    finish_turn(gs, player_id);
    Ok(())
}

/// Spade side effects: scoring tile VP, faction VP, stronghold power
fn apply_spade_rewards(gs: &mut GameState, player_id: &str, spades: u32) {
    let Ok(player) = gs.get_player(player_id) else {
        return;
    };
    let faction = player.faction;
    let has_stronghold = player.has_stronghold;
    for _ in 0..spades {
        gs.award_action_vp(player_id, ScoringAction::Spades);
    }
    if let Some(faction) = faction {
        let vp = faction.spade_vp_bonus() * spades as i32;
        let power = if has_stronghold {
            faction.stronghold_power_per_spade() * spades
        } else {
            0
        };
        if let Some(player) = gs.players.get_mut(player_id) {
            player.victory_points += vp;
            if power > 0 {
                player.resources.gain_power(power);
            }
        }
    }
}

/// Room and, when `paid`, resources for one more dwelling
fn validate_dwelling_capacity(
    gs: &GameState,
    player_id: &str,
    paid: bool,
) -> Result<(), GameError> {
    let limit = BuildingType::Dwelling.limit();
    if gs.map.count_buildings(player_id, BuildingType::Dwelling) >= limit {
        return Err(GameError::BuildingLimit(format!(
            "already at {limit} dwellings"
        )));
    }
    if paid {
        let player = gs.get_player(player_id)?;
        let faction = player.faction.ok_or(GameError::NoFaction)?;
        if !player
            .resources
            .can_afford(&faction.building_cost(BuildingType::Dwelling))
        {
            return Err(GameError::InsufficientResources);
        }
    }
    Ok(())
}

/// Place a dwelling, paying its cost unless `free`, and run the follow-ups:
/// favor VP, scoring VP, power offers, town detection.
fn build_dwelling_at(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
    free: bool,
) -> Result<(), GameError> {
    let faction = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?;
    let limit = BuildingType::Dwelling.limit();
    if gs.map.count_buildings(player_id, BuildingType::Dwelling) >= limit {
        return Err(GameError::BuildingLimit(format!(
            "already at {limit} dwellings"
        )));
    }
    if !free {
        let cost = faction.building_cost(BuildingType::Dwelling);
        gs.get_player_mut(player_id)?.resources.spend(&cost)?;
    }
    let cell = gs
        .map
        .get_cell_mut(hex)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    if cell.building.is_some() {
        return Err(GameError::InvalidLocation("hex already has a building".into()));
    }
    cell.building = Some(Building {
        building_type: BuildingType::Dwelling,
        player_id: player_id.to_string(),
    });

    if gs.favor_tiles.has_tile(player_id, FavorTileType::Earth1) {
        if let Some(player) = gs.players.get_mut(player_id) {
            player.victory_points += 2;
        }
    }
    gs.award_action_vp(player_id, ScoringAction::Dwelling);
    gs.trigger_power_leech(hex, player_id);
    gs.check_town_formation(hex, player_id);
    Ok(())
}

fn upgrade_cost(gs: &GameState, player_id: &str, hex: &HexCoord, to: BuildingType) -> Cost {
    let Some(faction) = gs.get_player(player_id).ok().and_then(|p| p.faction) else {
        return Cost::default();
    };
    let mut cost = faction.building_cost(to);
    // A trading house next to an opponent costs half the coins
    if to == BuildingType::TradingHouse {
        let opponent_adjacent = hex.neighbors().iter().any(|n| {
            gs.map
                .get_cell(n)
                .and_then(|c| c.building.as_ref())
                .map(|b| b.player_id != player_id)
                .unwrap_or(false)
        });
        if opponent_adjacent {
            cost.coins /= 2;
        }
    }
    cost
}

fn valid_upgrade(from: BuildingType, to: BuildingType) -> bool {
    matches!(
        (from, to),
        (BuildingType::Dwelling, BuildingType::TradingHouse)
            | (BuildingType::TradingHouse, BuildingType::Temple)
            | (BuildingType::TradingHouse, BuildingType::Stronghold)
            | (BuildingType::Temple, BuildingType::Sanctuary)
    )
}

fn validate_upgrade(
    gs: &GameState,
    player_id: &str,
    hex: &HexCoord,
    to: BuildingType,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    player.faction.ok_or(GameError::NoFaction)?;
    let building = gs
        .map
        .get_cell(hex)
        .and_then(|c| c.building.as_ref())
        .ok_or_else(|| GameError::InvalidLocation("no building at hex".into()))?;
    if building.player_id != player_id {
        return Err(GameError::InvalidLocation(
            "building belongs to another player".into(),
        ));
    }
    if !valid_upgrade(building.building_type, to) {
        return Err(GameError::InvalidAction(format!(
            "cannot upgrade {:?} to {to:?}",
            building.building_type
        )));
    }
    if gs.map.count_buildings(player_id, to) >= to.limit() {
        return Err(GameError::BuildingLimit(format!(
            "already at {} {to:?}",
            to.limit()
        )));
    }
    let cost = upgrade_cost(gs, player_id, hex, to);
    if !player.resources.can_afford(&cost) {
        return Err(GameError::InsufficientResources);
    }
    Ok(())
}

fn execute_upgrade(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
    to: BuildingType,
) -> Result<(), GameError> {
    let faction = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?;
    let cost = upgrade_cost(gs, player_id, hex, to);
    let from = gs
        .map
        .get_cell(hex)
        .and_then(|c| c.building.as_ref())
        .map(|b| b.building_type)
        .ok_or_else(|| GameError::InvalidLocation("no building at hex".into()))?;

    gs.get_player_mut(player_id)?.resources.spend(&cost)?;
    if let Some(cell) = gs.map.get_cell_mut(hex) {
        cell.building = Some(Building {
            building_type: to,
            player_id: player_id.to_string(),
        });
    }

    match to {
        BuildingType::TradingHouse => {
            gs.award_action_vp(player_id, ScoringAction::TradingHouse);
            if from == BuildingType::Dwelling
                && gs.favor_tiles.has_tile(player_id, FavorTileType::Water1)
            {
                if let Some(player) = gs.players.get_mut(player_id) {
                    player.victory_points += 3;
                }
            }
        }
        BuildingType::Temple | BuildingType::Sanctuary => {
            let action = if to == BuildingType::Temple {
                ScoringAction::Temple
            } else {
                ScoringAction::Stronghold
            };
            gs.award_action_vp(player_id, action);
            gs.pending_favor_selection = Some(crate::state::PendingFavorSelection {
                player_id: player_id.to_string(),
                remaining: faction.favor_tiles_per_temple(),
            });
        }
        BuildingType::Stronghold => {
            gs.award_action_vp(player_id, ScoringAction::Stronghold);
            apply_stronghold_effect(gs, player_id, faction);
        }
        BuildingType::Dwelling => {}
    }

    gs.trigger_power_leech(hex, player_id);
    gs.check_town_formation(hex, player_id);
    finish_turn(gs, player_id);
    Ok(())
}

fn apply_stronghold_effect(gs: &mut GameState, player_id: &str, faction: FactionType) {
    if let Some(player) = gs.players.get_mut(player_id) {
        player.has_stronghold = true;
    }
    match faction.stronghold_effect() {
        StrongholdEffect::SpadeChain => {
            gs.pending_halflings_spades = Some(crate::state::PendingHalflingsSpades {
                player_id: player_id.to_string(),
                remaining: 3,
                dwelling_available: true,
            });
        }
        StrongholdEffect::Ordination => {
            gs.pending_darklings_ordination = Some(crate::state::PendingDarklingsOrdination {
                player_id: player_id.to_string(),
                remaining: 3,
            });
        }
        StrongholdEffect::PowerBurst => {
            if let Some(player) = gs.players.get_mut(player_id) {
                player.resources.gain_power(7);
            }
        }
        StrongholdEffect::Special(SpecialActionKind::MermaidsShipping) => {
            if let Some(player) = gs.players.get_mut(player_id) {
                player.shipping_level += 1;
            }
        }
        StrongholdEffect::Special(_)
        | StrongholdEffect::PowerPerSpade
        | StrongholdEffect::Passive
        | StrongholdEffect::BridgeVP => {}
    }
}

fn validate_advance_shipping(gs: &GameState, player_id: &str) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let max = faction
        .max_shipping()
        .ok_or_else(|| GameError::InvalidAction("faction has no shipping track".into()))?;
    if player.shipping_level >= max {
        return Err(GameError::InvalidAction("shipping already at maximum".into()));
    }
    if !player.resources.can_afford(&faction.shipping_advance_cost()) {
        return Err(GameError::InsufficientResources);
    }
    Ok(())
}

fn validate_advance_digging(gs: &GameState, player_id: &str) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let max = faction
        .max_digging()
        .ok_or_else(|| GameError::InvalidAction("faction has no digging track".into()))?;
    if player.digging_level >= max {
        return Err(GameError::InvalidAction("digging already at maximum".into()));
    }
    if !player.resources.can_afford(&faction.digging_advance_cost()) {
        return Err(GameError::InsufficientResources);
    }
    Ok(())
}

fn validate_send_priest(gs: &GameState, player_id: &str, steps: u32) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    player.faction.ok_or(GameError::NoFaction)?;
    if player.resources.priests == 0 {
        return Err(GameError::InsufficientResources);
    }
    if !(1..=3).contains(&steps) {
        return Err(GameError::InvalidAction(format!(
            "cannot send a priest for {steps} steps"
        )));
    }
    Ok(())
}

fn validate_power_action(
    gs: &GameState,
    player_id: &str,
    action: PowerActionType,
    bridge: &Option<(HexCoord, HexCoord)>,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    if !gs.power_actions.is_available(action) {
        return Err(GameError::ActionAlreadyUsed(format!(
            "power action {action:?}"
        )));
    }
    if player.resources.power.bowl3 < action.cost() {
        return Err(GameError::InsufficientPower);
    }
    if action == PowerActionType::Bridge {
        let (a, b) = bridge
            .as_ref()
            .ok_or_else(|| GameError::InvalidAction("bridge endpoints required".into()))?;
        if player.bridges_built >= 3 {
            return Err(GameError::BuildingLimit("already at 3 bridges".into()));
        }
        if gs.map.has_bridge(a, b) {
            return Err(GameError::InvalidLocation("bridge already exists".into()));
        }
        if !gs.map.can_build_bridge(a, b) {
            return Err(GameError::InvalidLocation(
                "bridge must span a single river hex".into(),
            ));
        }
    }
    Ok(())
}

fn execute_power_action(
    gs: &mut GameState,
    player_id: &str,
    action: PowerActionType,
    bridge: &Option<(HexCoord, HexCoord)>,
) -> Result<(), GameError> {
    // Bridge placement is the one effect that can still fail; it runs
    // before any power is spent or the action claimed
    if action == PowerActionType::Bridge {
        let (a, b) = bridge
            .as_ref()
            .ok_or_else(|| GameError::InvalidAction("bridge endpoints required".into()))?;
        if !gs.map.build_bridge(*a, *b) {
            return Err(GameError::InvalidLocation(
                "bridge must span a single river hex".into(),
            ));
        }
        gs.get_player_mut(player_id)?.bridges_built += 1;
        // A bridge can join two clusters into a town
        gs.check_town_formation(a, player_id);
        gs.check_town_formation(b, player_id);
    }

    gs.get_player_mut(player_id)?
        .resources
        .spend_power(action.cost())?;
    gs.power_actions.claim(player_id, action)?;

    match action {
        PowerActionType::Bridge => {}
        PowerActionType::Priest => gs.gain_priests(player_id, 1),
        PowerActionType::Workers => gs.get_player_mut(player_id)?.resources.workers += 2,
        PowerActionType::Coins => gs.get_player_mut(player_id)?.resources.coins += 7,
        PowerActionType::OneSpade | PowerActionType::TwoSpades => {
            let entry = gs
                .pending_spades
                .entry(player_id.to_string())
                .or_insert(PendingSpades {
                    count: 0,
                    build_allowed: true,
                });
            entry.count += action.spades();
            entry.build_allowed = true;
        }
    }
    finish_turn(gs, player_id);
    Ok(())
}

fn validate_engineers_bridge(
    gs: &GameState,
    player_id: &str,
    a: &HexCoord,
    b: &HexCoord,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let workers = faction.bridge_worker_cost().ok_or_else(|| {
        GameError::InvalidAction("faction cannot build bridges with workers".into())
    })?;
    if !player.has_stronghold {
        return Err(GameError::InvalidAction(
            "bridge building needs the stronghold".into(),
        ));
    }
    if player.resources.workers < workers {
        return Err(GameError::InsufficientResources);
    }
    if player.bridges_built >= 3 {
        return Err(GameError::BuildingLimit("already at 3 bridges".into()));
    }
    for hex in [a, b] {
        let cell = gs
            .map
            .get_cell(hex)
            .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
        if cell.terrain == TerrainType::River {
            return Err(GameError::InvalidLocation(
                "bridge endpoints must be land hexes".into(),
            ));
        }
    }
    let owns_endpoint = [a, b].iter().any(|hex| {
        gs.map
            .get_cell(hex)
            .and_then(|c| c.building.as_ref())
            .map(|bld| bld.player_id == player_id)
            .unwrap_or(false)
    });
    if !owns_endpoint {
        return Err(GameError::InvalidLocation(
            "bridge must touch one of your buildings".into(),
        ));
    }
    if gs.map.has_bridge(a, b) {
        return Err(GameError::InvalidLocation("bridge already exists".into()));
    }
    if !gs.map.can_build_bridge(a, b) {
        return Err(GameError::InvalidLocation(
            "bridge must span a single river hex".into(),
        ));
    }
    Ok(())
}

fn execute_engineers_bridge(
    gs: &mut GameState,
    player_id: &str,
    a: &HexCoord,
    b: &HexCoord,
) -> Result<(), GameError> {
    let workers = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?
        .bridge_worker_cost()
        .ok_or_else(|| {
            GameError::InvalidAction("faction cannot build bridges with workers".into())
        })?;
    // Placement first, workers only once the bridge stands
    if !gs.map.build_bridge(*a, *b) {
        return Err(GameError::InvalidLocation(
            "bridge must span a single river hex".into(),
        ));
    }
    let player = gs.get_player_mut(player_id)?;
    player.resources.workers -= workers;
    player.bridges_built += 1;
    // A bridge can join two clusters into a town
    gs.check_town_formation(a, player_id);
    gs.check_town_formation(b, player_id);
    finish_turn(gs, player_id);
    Ok(())
}

/// What a special action needs available before it can fire
fn special_available(gs: &GameState, player_id: &str, kind: SpecialActionKind) -> bool {
    let Ok(player) = gs.get_player(player_id) else {
        return false;
    };
    let Some(faction) = player.faction else {
        return false;
    };
    match kind {
        SpecialActionKind::FavorCultStep => {
            gs.favor_tiles.has_tile(player_id, FavorTileType::Water2)
        }
        SpecialActionKind::BonusSpade => {
            gs.bonus_cards.player_card(player_id) == Some(BonusCardType::Spade)
        }
        SpecialActionKind::BonusCult => {
            gs.bonus_cards.player_card(player_id) == Some(BonusCardType::CultAdvance)
        }
        SpecialActionKind::MermaidsShipping => false,
        _ => {
            player.has_stronghold
                && faction.stronghold_effect() == StrongholdEffect::Special(kind)
        }
    }
}

fn validate_special(
    gs: &GameState,
    player_id: &str,
    kind: SpecialActionKind,
    track: &Option<CultTrack>,
    hex: &Option<HexCoord>,
    build_dwelling: bool,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    let player = gs.get_player(player_id)?;
    if !special_available(gs, player_id, kind) {
        return Err(GameError::InvalidAction(format!(
            "special action {kind:?} is not available"
        )));
    }
    if player.special_actions_used.contains(&kind) {
        return Err(GameError::ActionAlreadyUsed(format!("special {kind:?}")));
    }
    match kind {
        SpecialActionKind::AurenCult
        | SpecialActionKind::FavorCultStep
        | SpecialActionKind::BonusCult => {
            track.ok_or_else(|| GameError::InvalidAction("cult track required".into()))?;
            Ok(())
        }
        SpecialActionKind::WitchesRide => {
            let hex = hex
                .as_ref()
                .ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            let cell = gs
                .map
                .get_cell(hex)
                .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
            if cell.terrain != TerrainType::Forest {
                return Err(GameError::InvalidLocation("ride targets forest hexes".into()));
            }
            if cell.building.is_some() {
                return Err(GameError::InvalidLocation("hex already has a building".into()));
            }
            validate_dwelling_capacity(gs, player_id, false)
        }
        SpecialActionKind::SwarmlingsUpgrade => {
            let hex = hex
                .as_ref()
                .ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            let building = gs
                .map
                .get_cell(hex)
                .and_then(|c| c.building.as_ref())
                .ok_or_else(|| GameError::InvalidLocation("no building at hex".into()))?;
            if building.player_id != player_id
                || building.building_type != BuildingType::Dwelling
            {
                return Err(GameError::InvalidLocation(
                    "must target one of your dwellings".into(),
                ));
            }
            let limit = BuildingType::TradingHouse.limit();
            if gs.map.count_buildings(player_id, BuildingType::TradingHouse) >= limit {
                return Err(GameError::BuildingLimit(format!(
                    "already at {limit} trading houses"
                )));
            }
            Ok(())
        }
        SpecialActionKind::NomadsSandstorm | SpecialActionKind::GiantsTransform => {
            let hex = hex
                .as_ref()
                .ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            let cell = gs
                .map
                .get_cell(hex)
                .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
            if cell.building.is_some() {
                return Err(GameError::InvalidLocation("hex already has a building".into()));
            }
            if cell.terrain == TerrainType::River {
                return Err(GameError::InvalidLocation("cannot transform river".into()));
            }
            if !gs.is_adjacent_to_player_building(hex, player_id) {
                return Err(GameError::InvalidLocation(
                    "hex is not adjacent to your buildings".into(),
                ));
            }
            if build_dwelling {
                validate_dwelling_capacity(gs, player_id, true)?;
            }
            Ok(())
        }
        SpecialActionKind::ChaosMagiciansDouble | SpecialActionKind::BonusSpade => Ok(()),
        SpecialActionKind::MermaidsShipping => Err(GameError::InvalidAction(
            "shipping bonus applies automatically".into(),
        )),
    }
}

fn execute_special(
    gs: &mut GameState,
    player_id: &str,
    kind: SpecialActionKind,
    track: &Option<CultTrack>,
    hex: &Option<HexCoord>,
    build_dwelling: bool,
) -> Result<(), GameError> {
    match kind {
        SpecialActionKind::AurenCult => {
            let track =
                track.ok_or_else(|| GameError::InvalidAction("cult track required".into()))?;
            gs.advance_cult_track(player_id, track, 2)?;
        }
        SpecialActionKind::FavorCultStep | SpecialActionKind::BonusCult => {
            let track =
                track.ok_or_else(|| GameError::InvalidAction("cult track required".into()))?;
            gs.advance_cult_track(player_id, track, 1)?;
        }
        SpecialActionKind::WitchesRide => {
            let hex = hex.ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            build_dwelling_at(gs, player_id, &hex, true)?;
        }
        SpecialActionKind::SwarmlingsUpgrade => {
            let hex = hex.ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            if let Some(cell) = gs.map.get_cell_mut(&hex) {
                cell.building = Some(Building {
                    building_type: BuildingType::TradingHouse,
                    player_id: player_id.to_string(),
                });
            }
            gs.award_action_vp(player_id, ScoringAction::TradingHouse);
            gs.trigger_power_leech(&hex, player_id);
            gs.check_town_formation(&hex, player_id);
        }
        SpecialActionKind::NomadsSandstorm => {
            let hex = hex.ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            let home = gs
                .get_player(player_id)?
                .faction
                .ok_or(GameError::NoFaction)?
                .home_terrain();
            gs.map.transform_terrain(&hex, home);
            if build_dwelling {
                build_dwelling_at(gs, player_id, &hex, false)?;
            }
        }
        SpecialActionKind::GiantsTransform => {
            let hex = hex.ok_or_else(|| GameError::InvalidAction("target hex required".into()))?;
            let home = gs
                .get_player(player_id)?
                .faction
                .ok_or(GameError::NoFaction)?
                .home_terrain();
            gs.map.transform_terrain(&hex, home);
            apply_spade_rewards(gs, player_id, 2);
            if build_dwelling {
                build_dwelling_at(gs, player_id, &hex, false)?;
            }
        }
        SpecialActionKind::ChaosMagiciansDouble => {
            // The turn does not rotate; the flag grants a second full action
            gs.get_player_mut(player_id)?
                .special_actions_used
                .insert(kind);
            gs.extra_turn_pending = Some(player_id.to_string());
            return Ok(());
        }
        SpecialActionKind::BonusSpade => {
            let entry = gs
                .pending_spades
                .entry(player_id.to_string())
                .or_insert(PendingSpades {
                    count: 0,
                    build_allowed: true,
                });
            entry.count += 1;
            entry.build_allowed = true;
        }
        SpecialActionKind::MermaidsShipping => {
            return Err(GameError::InvalidAction(
                "shipping bonus applies automatically".into(),
            ));
        }
    }
    // The once-per-round slot is consumed only after the effect has landed
    gs.get_player_mut(player_id)?
        .special_actions_used
        .insert(kind);
    finish_turn(gs, player_id);
    Ok(())
}

fn validate_conversion(
    gs: &GameState,
    player_id: &str,
    conversion: ConversionType,
    amount: u32,
) -> Result<(), GameError> {
    let player = gs.get_player(player_id)?;
    if amount == 0 {
        return Err(GameError::InvalidAction("amount must be positive".into()));
    }
    match conversion {
        ConversionType::PowerToCoins => {
            if player.resources.power.bowl3 < amount {
                return Err(GameError::InsufficientPower);
            }
        }
        ConversionType::PowerToWorkers => {
            if player.resources.power.bowl3 < amount * 3 {
                return Err(GameError::InsufficientPower);
            }
        }
        ConversionType::PowerToPriests => {
            if player.resources.power.bowl3 < amount * POWER_PER_PRIEST {
                return Err(GameError::InsufficientPower);
            }
            let committed = gs.cult_tracks.total_priests_on_cult_tracks(player_id);
            if player.resources.priests + committed + amount > PRIEST_LIMIT {
                return Err(GameError::InvalidAction("priest limit reached".into()));
            }
        }
        ConversionType::PriestToWorker => {
            if player.resources.priests < amount {
                return Err(GameError::InsufficientResources);
            }
        }
        ConversionType::WorkerToCoin => {
            if player.resources.workers < amount {
                return Err(GameError::InsufficientResources);
            }
        }
        ConversionType::VpToCoin => {
            let faction = player.faction.ok_or(GameError::NoFaction)?;
            if !faction.has_vp_coin_exchange() {
                return Err(GameError::InvalidAction(
                    "faction cannot trade VP for coins".into(),
                ));
            }
            if player.victory_points < amount as i32 {
                return Err(GameError::InsufficientResources);
            }
        }
        ConversionType::CoinToVp => {
            let faction = player.faction.ok_or(GameError::NoFaction)?;
            if !faction.has_vp_coin_exchange() {
                return Err(GameError::InvalidAction(
                    "faction cannot trade coins for VP".into(),
                ));
            }
            if player.resources.coins < amount * faction.coins_per_vp() {
                return Err(GameError::InsufficientResources);
            }
        }
    }
    Ok(())
}

fn execute_conversion(
    gs: &mut GameState,
    player_id: &str,
    conversion: ConversionType,
    amount: u32,
) -> Result<(), GameError> {
    match conversion {
        ConversionType::PowerToCoins => gs
            .get_player_mut(player_id)?
            .resources
            .convert_power_to_coins(amount),
        ConversionType::PowerToWorkers => gs
            .get_player_mut(player_id)?
            .resources
            .convert_power_to_workers(amount),
        ConversionType::PowerToPriests => {
            gs.get_player_mut(player_id)?
                .resources
                .spend_power(amount * POWER_PER_PRIEST)?;
            gs.gain_priests(player_id, amount);
            Ok(())
        }
        ConversionType::PriestToWorker => gs
            .get_player_mut(player_id)?
            .resources
            .convert_priests_to_workers(amount),
        ConversionType::WorkerToCoin => gs
            .get_player_mut(player_id)?
            .resources
            .convert_workers_to_coins(amount),
        ConversionType::VpToCoin => {
            let player = gs.get_player_mut(player_id)?;
            player.victory_points -= amount as i32;
            player.resources.coins += amount;
            Ok(())
        }
        ConversionType::CoinToVp => {
            let rate = gs
                .get_player(player_id)?
                .faction
                .map(|f| f.coins_per_vp())
                .unwrap_or(2);
            let player = gs.get_player_mut(player_id)?;
            player.resources.coins -= amount * rate;
            player.victory_points += amount as i32;
            Ok(())
        }
    }
}

fn validate_pass(
    gs: &GameState,
    player_id: &str,
    bonus_card: &Option<BonusCardType>,
) -> Result<(), GameError> {
    require_action_phase(gs, player_id)?;
    if gs.round < 6 {
        let card = bonus_card.ok_or_else(|| {
            GameError::InvalidAction("a bonus card must be taken when passing".into())
        })?;
        if !gs.bonus_cards.is_available(card) {
            return Err(GameError::TileUnavailable(format!("bonus card {card:?}")));
        }
    } else if bonus_card.is_some() {
        return Err(GameError::InvalidAction(
            "no bonus card is taken in the final round".into(),
        ));
    }
    Ok(())
}

fn execute_pass(
    gs: &mut GameState,
    player_id: &str,
    bonus_card: &Option<BonusCardType>,
) -> Result<(), GameError> {
    let player = gs.get_player(player_id)?;
    let faction = player.faction.ok_or(GameError::NoFaction)?;
    let has_stronghold = player.has_stronghold;
    let bridges = player.bridges_built;
    let shipping_level = player.shipping_level;

    let dwellings = gs.map.count_buildings(player_id, BuildingType::Dwelling);
    let trading_houses = gs.map.count_buildings(player_id, BuildingType::TradingHouse);
    let strongholds = gs.map.count_buildings(player_id, BuildingType::Stronghold);
    let sanctuaries = gs.map.count_buildings(player_id, BuildingType::Sanctuary);

    let mut vp = 0;
    if let Some(card) = gs.bonus_cards.player_card(player_id) {
        vp += pass_vp(
            card,
            dwellings,
            trading_houses,
            strongholds,
            sanctuaries,
            shipping_level,
            faction.benefits_from_shipping_bonus(),
        );
    }
    vp += gs.favor_tiles.air1_pass_vp(player_id, trading_houses);
    if has_stronghold && faction.stronghold_effect() == StrongholdEffect::BridgeVP {
        vp += bridges as i32 * 3;
    }

    if gs.round < 6 {
        gs.bonus_cards.return_card(player_id);
        if let Some(card) = bonus_card {
            let coins = gs.bonus_cards.take_card(player_id, *card)?;
            gs.get_player_mut(player_id)?.resources.coins += coins;
        }
    }

    let player = gs.get_player_mut(player_id)?;
    player.victory_points += vp;
    player.has_passed = true;
    gs.pass_order.push(player_id.to_string());
    finish_turn(gs, player_id);
    Ok(())
}

fn validate_select_faction(
    gs: &GameState,
    player_id: &str,
    faction: FactionType,
) -> Result<(), GameError> {
    if gs.phase != GamePhase::FactionSelection {
        return Err(GameError::InvalidPhase(format!("{:?}", gs.phase)));
    }
    if gs.setup_mode != SetupMode::Standard {
        return Err(GameError::InvalidAction(
            "faction selection is handled by the auction".into(),
        ));
    }
    if gs.get_player(player_id)?.faction.is_some() {
        return Err(GameError::InvalidAction("faction already selected".into()));
    }
    for other in gs.players.values() {
        if let Some(taken) = other.faction {
            if taken.color() == faction.color() {
                return Err(GameError::InvalidAction(format!(
                    "a {:?} faction is already taken",
                    faction.color()
                )));
            }
        }
    }
    Ok(())
}

fn validate_setup_dwelling(
    gs: &GameState,
    player_id: &str,
    hex: &HexCoord,
) -> Result<(), GameError> {
    if gs.phase != GamePhase::Setup || gs.setup_subphase != SetupSubphase::Dwellings {
        return Err(GameError::InvalidPhase(
            "setup dwellings are not in progress".into(),
        ));
    }
    if gs.current_setup_dwelling_player() != Some(player_id) {
        return Err(GameError::NotYourTurn);
    }
    let faction = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?;
    let cell = gs
        .map
        .get_cell(hex)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    if cell.building.is_some() {
        return Err(GameError::InvalidLocation("hex already has a building".into()));
    }
    if cell.terrain != faction.home_terrain() {
        return Err(GameError::InvalidLocation(
            "setup dwellings go on home terrain".into(),
        ));
    }
    Ok(())
}

/// Shared target check for all single-spade follow-ups
fn validate_spade_target(gs: &GameState, player_id: &str, hex: &HexCoord) -> Result<(), GameError> {
    let faction = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?;
    let cell = gs
        .map
        .get_cell(hex)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    if cell.building.is_some() {
        return Err(GameError::InvalidLocation("hex already has a building".into()));
    }
    if cell.terrain == TerrainType::River {
        return Err(GameError::InvalidLocation("cannot transform river".into()));
    }
    if cell.terrain == faction.home_terrain() {
        return Err(GameError::InvalidLocation("hex is already home terrain".into()));
    }
    if !gs.is_adjacent_to_player_building(hex, player_id) {
        return Err(GameError::InvalidLocation(
            "hex is not adjacent to your buildings".into(),
        ));
    }
    Ok(())
}

/// Cult reward spades reach over the player's own shipping level only; a
/// held shipping bonus card does not extend their range.
fn validate_cult_spade_target(
    gs: &GameState,
    player_id: &str,
    hex: &HexCoord,
) -> Result<(), GameError> {
    validate_spade_target(gs, player_id, hex)?;
    let shipping = gs.get_player(player_id)?.shipping_level;
    let reachable = gs
        .map
        .cells()
        .filter(|(_, cell)| {
            cell.building
                .as_ref()
                .map(|b| b.player_id == player_id)
                .unwrap_or(false)
        })
        .any(|(coord, _)| {
            gs.map.is_directly_adjacent(hex, coord)
                || (shipping > 0 && gs.map.is_indirectly_adjacent(hex, coord, shipping))
        });
    if !reachable {
        return Err(GameError::InvalidLocation(
            "hex is not adjacent to your buildings".into(),
        ));
    }
    Ok(())
}

/// Move a hex one wheel step toward the player's home terrain
fn transform_one_step(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
) -> Result<TerrainType, GameError> {
    let home = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?
        .home_terrain();
    let current = gs
        .map
        .get_cell(hex)
        .map(|c| c.terrain)
        .ok_or_else(|| GameError::InvalidLocation(format!("{hex:?}")))?;
    let next = current.step_toward(&home);
    gs.map.transform_terrain(hex, next);
    Ok(next)
}

fn execute_halflings_spade(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
    build_dwelling: bool,
) -> Result<(), GameError> {
    let home = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?
        .home_terrain();
    let reached = transform_one_step(gs, player_id, hex)?;
    apply_spade_rewards(gs, player_id, 1);

    let mut done = false;
    let mut can_build = false;
    if let Some(pending) = gs.pending_halflings_spades.as_mut() {
        pending.remaining -= 1;
        can_build = pending.dwelling_available;
        done = pending.remaining == 0;
    }
    if build_dwelling && can_build && reached == home {
        build_dwelling_at(gs, player_id, hex, false)?;
        if let Some(pending) = gs.pending_halflings_spades.as_mut() {
            pending.dwelling_available = false;
        }
    }
    if done {
        gs.pending_halflings_spades = None;
        finish_turn(gs, player_id);
    }
    Ok(())
}

fn execute_pending_spade(
    gs: &mut GameState,
    player_id: &str,
    hex: &HexCoord,
    build_dwelling: bool,
) -> Result<(), GameError> {
    let home = gs
        .get_player(player_id)?
        .faction
        .ok_or(GameError::NoFaction)?
        .home_terrain();
    let reached = transform_one_step(gs, player_id, hex)?;
    apply_spade_rewards(gs, player_id, 1);

    let spades = gs
        .pending_spades
        .get_mut(player_id)
        .ok_or_else(|| GameError::InvalidAction("no pending spades".into()))?;
    spades.count -= 1;
    let build_allowed = spades.build_allowed;
    let done = spades.count == 0;
    if done {
        gs.pending_spades.remove(player_id);
    }
    if build_dwelling && build_allowed && reached == home {
        build_dwelling_at(gs, player_id, hex, false)?;
    }
    if done {
        finish_turn(gs, player_id);
    }
    Ok(())
}

fn execute_select_favor_tile(
    gs: &mut GameState,
    player_id: &str,
    tile: FavorTileType,
) -> Result<(), GameError> {
    gs.favor_tiles.take_tile(player_id, tile)?;

    let mut complete = false;
    if let Some(pending) = gs.pending_favor_selection.as_mut() {
        pending.remaining = pending.remaining.saturating_sub(1);
        complete = pending.remaining == 0;
    }
    if complete {
        gs.pending_favor_selection = None;
        // Fire +2 can lower the town requirement, so look for new towns
        // before the cult advance: a pending formation counts as a key
        gs.check_all_town_formations();
    }
    gs.advance_cult_track(player_id, tile.cult_track(), tile.cult_advance())?;
    if complete {
        finish_turn(gs, player_id);
    }
    Ok(())
}

fn execute_select_town_tile(
    gs: &mut GameState,
    player_id: &str,
    tile: TownTileType,
) -> Result<(), GameError> {
    let formation = {
        let formations = gs
            .pending_town_formations
            .get_mut(player_id)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                GameError::InvalidAction(format!("no pending town formation for {player_id}"))
            })?;
        formations.remove(0)
    };
    if gs
        .pending_town_formations
        .get(player_id)
        .map(|v| v.is_empty())
        .unwrap_or(false)
    {
        gs.pending_town_formations.remove(player_id);
    }

    for hex in &formation.town.hexes {
        if let Some(cell) = gs.map.get_cell_mut(hex) {
            cell.in_town = true;
        }
    }

    gs.town_tiles.take_tile(player_id, tile)?;
    let faction = gs.get_player(player_id)?.faction;
    {
        let player = gs.get_player_mut(player_id)?;
        player.victory_points += tile.vp();
        player.keys += tile.keys();
        player.towns_formed += 1;
        match tile {
            TownTileType::Vp5Coins => player.resources.coins += 6,
            TownTileType::Vp6Power => {
                player.resources.gain_power(8);
            }
            TownTileType::Vp7Workers => player.resources.workers += 2,
            TownTileType::Vp4Shipping => {
                if let Some(max) = faction.and_then(|f| f.max_shipping()) {
                    if player.shipping_level < max {
                        player.shipping_level += 1;
                    }
                }
            }
            _ => {}
        }
    }
    if tile == TownTileType::Vp9Priest {
        gs.gain_priests(player_id, 1);
    }
    gs.award_action_vp(player_id, ScoringAction::Town);

    let advance = tile.cult_advance_all();
    if advance > 0 {
        apply_town_cult_advance(gs, player_id, advance)?;
    }

    finish_turn(gs, player_id);
    Ok(())
}

/// Advance on all four tracks at once. When more tracks could enter
/// position 10 than the player has keys, candidates cap at 9 and the
/// choice of which ones top out is queued.
fn apply_town_cult_advance(
    gs: &mut GameState,
    player_id: &str,
    spaces: u32,
) -> Result<(), GameError> {
    let keys = gs.get_player(player_id)?.keys;
    let mut candidates = Vec::new();
    for track in CultTrack::ALL {
        let position = gs.cult_tracks.get_position(player_id, track);
        let occupied_by_other = gs
            .cult_tracks
            .position10_occupant
            .get(&track)
            .map(|p| p != player_id)
            .unwrap_or(false);
        if position < 10 && position + spaces >= 10 && !occupied_by_other {
            candidates.push(track);
        }
    }

    if candidates.len() as u32 > keys {
        for track in CultTrack::ALL {
            if candidates.contains(&track) {
                let outcome = gs
                    .cult_tracks
                    .advance_player(player_id, track, spaces, false);
                if outcome.power_gained > 0 {
                    if let Some(player) = gs.players.get_mut(player_id) {
                        player.resources.gain_power(outcome.power_gained);
                    }
                }
            } else {
                gs.advance_cult_track(player_id, track, spaces)?;
            }
        }
        if keys > 0 {
            gs.pending_town_cult_top = Some(crate::state::PendingTownCultTop {
                player_id: player_id.to_string(),
                candidate_tracks: candidates,
                remaining: keys,
            });
        }
    } else {
        for track in CultTrack::ALL {
            gs.advance_cult_track(player_id, track, spaces)?;
        }
    }
    Ok(())
}

/// Advance the round's turn unless the acting player still owes a decision
/// that must resolve inside their own turn.
fn finish_turn(gs: &mut GameState, player_id: &str) {
    let blocked = gs
        .pending_favor_selection
        .as_ref()
        .map(|p| p.player_id == player_id)
        .unwrap_or(false)
        || gs
            .pending_town_formations
            .get(player_id)
            .map(|v| v.iter().any(|f| !f.can_be_delayed))
            .unwrap_or(false)
        || gs
            .pending_town_cult_top
            .as_ref()
            .map(|p| p.player_id == player_id)
            .unwrap_or(false)
        || gs
            .pending_darklings_ordination
            .as_ref()
            .map(|p| p.player_id == player_id)
            .unwrap_or(false)
        || gs
            .pending_halflings_spades
            .as_ref()
            .map(|p| p.player_id == player_id)
            .unwrap_or(false)
        || gs
            .pending_spades
            .get(player_id)
            .map(|s| s.count > 0)
            .unwrap_or(false);
    if blocked {
        return;
    }
    if gs.current_player_id() == Some(player_id) {
        gs.advance_after_action();
    }
}

/// Keep the table's current player aligned with whoever the auction is
/// waiting on.
fn sync_current_player_to_auction(gs: &mut GameState) {
    let Some(expected) = gs
        .auction
        .as_ref()
        .and_then(|a| a.current_bidder())
        .map(str::to_string)
    else {
        return;
    };
    if let Some(index) = gs.turn_order.iter().position(|id| *id == expected) {
        gs.current_player_index = index;
    }
}

/// Hand out factions and starting VP once every seat holds one, then start
/// the dwelling placement sequence in the auction's turn order.
fn finalize_auction(gs: &mut GameState) -> Result<(), GameError> {
    let Some(auction) = gs.auction.clone() else {
        return Ok(());
    };
    if !auction.is_complete() {
        return Err(GameError::Auction("auction is not complete".into()));
    }
    for player_id in &auction.seat_order {
        let faction = auction
            .player_faction(player_id)
            .ok_or_else(|| GameError::Auction(format!("no faction for {player_id}")))?;
        gs.assign_faction(player_id, faction, auction.starting_vp(faction))?;
    }
    gs.turn_order = auction.turn_order();
    gs.current_player_index = 0;
    gs.initialize_setup_sequence();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Cell;
    use crate::resources::PowerBowls;
    use pretty_assertions::assert_eq;

    fn game() -> GameState {
        let mut gs = GameState::new();
        for id in ["p1", "p2"] {
            gs.add_player(id).unwrap();
        }
        gs.turn_order = vec!["p1".into(), "p2".into()];
        gs.assign_faction("p1", FactionType::Witches, 20).unwrap();
        gs.assign_faction("p2", FactionType::Nomads, 20).unwrap();
        gs.phase = GamePhase::Action;
        gs.scoring_tiles
            .set_tiles(crate::scoring::all_scoring_tiles().into_iter().take(6).collect());
        gs
    }

    fn set_terrain(gs: &mut GameState, q: i32, r: i32, terrain: TerrainType) {
        gs.map.cells.insert(HexCoord::new(q, r), Cell::new(terrain));
    }

    fn put_building(gs: &mut GameState, q: i32, r: i32, player: &str, bt: BuildingType) {
        let cell = gs
            .map
            .cells
            .entry(HexCoord::new(q, r))
            .or_insert_with(|| Cell::new(TerrainType::Plains));
        cell.building = Some(Building {
            building_type: bt,
            player_id: player.to_string(),
        });
    }

    #[test]
    fn transform_pays_workers_by_wheel_distance() {
        let mut gs = game();
        // Witches home is Forest; Lakes is one wheel step away
        set_terrain(&mut gs, 0, 30, TerrainType::Lakes);
        put_building(&mut gs, 1, 30, "p1", BuildingType::Dwelling);
        let workers = gs.players["p1"].resources.workers;

        Action::TransformAndBuild {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            build_dwelling: false,
        }
        .execute(&mut gs)
        .unwrap();
        // One spade at digging level 0 costs 3 workers
        assert_eq!(gs.players["p1"].resources.workers, workers - 3);
        assert_eq!(
            gs.map.get_cell(&HexCoord::new(0, 30)).unwrap().terrain,
            TerrainType::Forest
        );
    }

    #[test]
    fn building_a_dwelling_costs_and_scores() {
        let mut gs = game();
        set_terrain(&mut gs, 0, 30, TerrainType::Forest);
        put_building(&mut gs, 1, 30, "p1", BuildingType::Dwelling);
        let coins = gs.players["p1"].resources.coins;
        let vp = gs.players["p1"].victory_points;

        Action::TransformAndBuild {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            build_dwelling: true,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.players["p1"].resources.coins, coins - 2);
        // Round 1 scoring tile pays 2 VP per dwelling
        assert_eq!(gs.players["p1"].victory_points, vp + 2);
    }

    #[test]
    fn upgrade_paths_are_restricted() {
        assert!(valid_upgrade(BuildingType::Dwelling, BuildingType::TradingHouse));
        assert!(valid_upgrade(BuildingType::TradingHouse, BuildingType::Temple));
        assert!(valid_upgrade(BuildingType::TradingHouse, BuildingType::Stronghold));
        assert!(valid_upgrade(BuildingType::Temple, BuildingType::Sanctuary));
        assert!(!valid_upgrade(BuildingType::Dwelling, BuildingType::Temple));
        assert!(!valid_upgrade(BuildingType::Dwelling, BuildingType::Stronghold));
        assert!(!valid_upgrade(BuildingType::Temple, BuildingType::Stronghold));
    }

    #[test]
    fn trading_house_is_cheaper_next_to_an_opponent() {
        let mut gs = game();
        put_building(&mut gs, 0, 30, "p1", BuildingType::Dwelling);
        put_building(&mut gs, 1, 30, "p2", BuildingType::Dwelling);
        let cost = upgrade_cost(&gs, "p1", &HexCoord::new(0, 30), BuildingType::TradingHouse);
        assert_eq!(cost.coins, 3);

        let mut lonely = game();
        put_building(&mut lonely, 0, 30, "p1", BuildingType::Dwelling);
        let cost = upgrade_cost(&lonely, "p1", &HexCoord::new(0, 30), BuildingType::TradingHouse);
        assert_eq!(cost.coins, 6);
    }

    #[test]
    fn temple_upgrade_queues_favor_selection() {
        let mut gs = game();
        put_building(&mut gs, 0, 30, "p1", BuildingType::TradingHouse);
        Action::UpgradeBuilding {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            to: BuildingType::Temple,
        }
        .execute(&mut gs)
        .unwrap();
        let pending = gs.pending_favor_selection.as_ref().unwrap();
        assert_eq!(pending.player_id, "p1");
        assert_eq!(pending.remaining, 1);
        // The turn stays open while the selection is pending
        assert_eq!(gs.current_player_id(), Some("p1"));

        Action::SelectFavorTile {
            player_id: "p1".into(),
            tile: FavorTileType::Fire1,
        }
        .execute(&mut gs)
        .unwrap();
        assert!(gs.pending_favor_selection.is_none());
        assert_eq!(gs.current_player_id(), Some("p2"));
    }

    #[test]
    fn power_action_spades_queue_a_followup() {
        let mut gs = game();
        gs.players.get_mut("p1").unwrap().resources.power = PowerBowls::new(0, 0, 12);
        set_terrain(&mut gs, 0, 30, TerrainType::Lakes);
        put_building(&mut gs, 1, 30, "p1", BuildingType::Dwelling);

        Action::PowerAction {
            player_id: "p1".into(),
            action: PowerActionType::TwoSpades,
            bridge: None,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.pending_spades["p1"].count, 2);
        assert!(!gs.power_actions.is_available(PowerActionType::TwoSpades));
        // Still p1's window until the spades resolve
        assert_eq!(gs.current_player_id(), Some("p1"));

        Action::ApplyPendingSpade {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            build_dwelling: false,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(
            gs.map.get_cell(&HexCoord::new(0, 30)).unwrap().terrain,
            TerrainType::Forest
        );
        assert_eq!(gs.pending_spades["p1"].count, 1);

        Action::DiscardPendingSpade {
            player_id: "p1".into(),
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.current_player_id(), Some("p2"));
    }

    #[test]
    fn each_power_action_claims_exclusively() {
        let mut gs = game();
        for id in ["p1", "p2"] {
            gs.players.get_mut(id).unwrap().resources.power = PowerBowls::new(0, 0, 12);
        }
        Action::PowerAction {
            player_id: "p1".into(),
            action: PowerActionType::Coins,
            bridge: None,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.players["p1"].resources.coins, 15 + 7);

        let err = Action::PowerAction {
            player_id: "p2".into(),
            action: PowerActionType::Coins,
            bridge: None,
        }
        .execute(&mut gs)
        .unwrap_err();
        assert_eq!(
            err,
            GameError::ActionAlreadyUsed("power action Coins".into())
        );
    }

    #[test]
    fn pass_takes_a_new_bonus_card_with_accrued_coins() {
        let mut gs = game();
        gs.bonus_cards
            .set_available(&[BonusCardType::SixCoins, BonusCardType::Priest]);
        gs.bonus_cards.add_coins_to_leftover_cards();
        let coins = gs.players["p1"].resources.coins;

        Action::Pass {
            player_id: "p1".into(),
            bonus_card: Some(BonusCardType::SixCoins),
        }
        .execute(&mut gs)
        .unwrap();
        assert!(gs.players["p1"].has_passed);
        assert_eq!(gs.pass_order, vec!["p1"]);
        assert_eq!(gs.players["p1"].resources.coins, coins + 1);
        assert_eq!(gs.current_player_id(), Some("p2"));
    }

    #[test]
    fn final_round_pass_takes_no_card() {
        let mut gs = game();
        gs.round = 6;
        let err = Action::Pass {
            player_id: "p1".into(),
            bonus_card: Some(BonusCardType::SixCoins),
        }
        .validate(&gs)
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));

        Action::Pass {
            player_id: "p1".into(),
            bonus_card: None,
        }
        .execute(&mut gs)
        .unwrap();
        assert!(gs.players["p1"].has_passed);
    }

    #[test]
    fn darklings_dig_with_priests_and_score() {
        let mut gs = game();
        gs.assign_faction("p1", FactionType::Darklings, 20).unwrap();
        gs.players.get_mut("p1").unwrap().resources.priests = 2;
        // Darklings home is Swamp; Lakes is one wheel step away
        set_terrain(&mut gs, 0, 30, TerrainType::Lakes);
        put_building(&mut gs, 1, 30, "p1", BuildingType::Dwelling);
        let vp = gs.players["p1"].victory_points;

        Action::TransformAndBuild {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            build_dwelling: false,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.players["p1"].resources.priests, 1);
        assert_eq!(gs.players["p1"].victory_points, vp + 2);
    }

    #[test]
    fn conversions_are_free_and_do_not_rotate_the_turn() {
        let mut gs = game();
        gs.players.get_mut("p1").unwrap().resources.power = PowerBowls::new(0, 0, 5);
        Action::Convert {
            player_id: "p1".into(),
            conversion: ConversionType::PowerToCoins,
            amount: 2,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.players["p1"].resources.coins, 15 + 2);
        assert_eq!(gs.current_player_id(), Some("p1"));
    }

    #[test]
    fn priest_conversion_respects_the_limit() {
        let mut gs = game();
        let p1 = gs.players.get_mut("p1").unwrap();
        p1.resources.power = PowerBowls::new(0, 0, 12);
        p1.resources.priests = 6;
        let err = Action::Convert {
            player_id: "p1".into(),
            conversion: ConversionType::PowerToPriests,
            amount: 2,
        }
        .validate(&gs)
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn standard_faction_selection_flows_into_setup() {
        let mut gs = GameState::new();
        for id in ["p1", "p2"] {
            gs.add_player(id).unwrap();
        }
        gs.turn_order = vec!["p1".into(), "p2".into()];

        Action::SelectFaction {
            player_id: "p1".into(),
            faction: FactionType::Witches,
        }
        .execute(&mut gs)
        .unwrap();
        // Auren share the Witches' color and are blocked
        let err = Action::SelectFaction {
            player_id: "p2".into(),
            faction: FactionType::Auren,
        }
        .validate(&gs)
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));

        Action::SelectFaction {
            player_id: "p2".into(),
            faction: FactionType::Nomads,
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.phase, GamePhase::Setup);
        assert_eq!(gs.setup_subphase, SetupSubphase::Dwellings);
        assert_eq!(gs.players["p1"].victory_points, 20);
        // Forward, reverse, then the Nomads' third dwelling
        assert_eq!(gs.setup_dwelling_order, vec!["p1", "p2", "p2", "p1", "p2"]);
    }

    #[test]
    fn stronghold_unlocks_the_faction_special_once_per_round() {
        let mut gs = game();
        gs.bonus_cards.set_available(&[BonusCardType::SixCoins]);
        put_building(&mut gs, 0, 30, "p1", BuildingType::TradingHouse);
        gs.players.get_mut("p1").unwrap().resources.coins = 20;
        gs.players.get_mut("p1").unwrap().resources.workers = 10;

        Action::UpgradeBuilding {
            player_id: "p1".into(),
            hex: HexCoord::new(0, 30),
            to: BuildingType::Stronghold,
        }
        .execute(&mut gs)
        .unwrap();
        assert!(gs.players["p1"].has_stronghold);

        // p2 passes, play returns to p1
        Action::Pass {
            player_id: "p2".into(),
            bonus_card: Some(BonusCardType::SixCoins),
        }
        .execute(&mut gs)
        .unwrap();

        set_terrain(&mut gs, 5, 30, TerrainType::Forest);
        Action::Special {
            player_id: "p1".into(),
            kind: SpecialActionKind::WitchesRide,
            track: None,
            hex: Some(HexCoord::new(5, 30)),
            build_dwelling: false,
        }
        .execute(&mut gs)
        .unwrap();
        let cell = gs.map.get_cell(&HexCoord::new(5, 30)).unwrap();
        assert_eq!(
            cell.building.as_ref().unwrap().building_type,
            BuildingType::Dwelling
        );
        assert!(gs.players["p1"]
            .special_actions_used
            .contains(&SpecialActionKind::WitchesRide));
        // A second ride this round is rejected
        let err = Action::Special {
            player_id: "p1".into(),
            kind: SpecialActionKind::WitchesRide,
            track: None,
            hex: Some(HexCoord::new(5, 30)),
            build_dwelling: false,
        }
        .validate(&gs)
        .unwrap_err();
        assert!(matches!(err, GameError::ActionAlreadyUsed(_)));
    }

    #[test]
    fn rejected_bridge_spends_nothing_and_leaves_the_action_open() {
        let mut gs = game();
        gs.players.get_mut("p1").unwrap().resources.power = PowerBowls::new(0, 0, 12);
        // Direct neighbors with no river between them
        set_terrain(&mut gs, 0, 30, TerrainType::Plains);
        set_terrain(&mut gs, 1, 30, TerrainType::Plains);

        let action = Action::PowerAction {
            player_id: "p1".into(),
            action: PowerActionType::Bridge,
            bridge: Some((HexCoord::new(0, 30), HexCoord::new(1, 30))),
        };
        assert!(matches!(
            action.validate(&gs),
            Err(GameError::InvalidLocation(_))
        ));
        let err = action.execute(&mut gs).unwrap_err();
        assert!(matches!(err, GameError::InvalidLocation(_)));
        assert_eq!(gs.players["p1"].resources.power.bowl3, 12);
        assert!(gs.power_actions.is_available(PowerActionType::Bridge));
        assert!(gs.map.bridges.is_empty());
    }

    #[test]
    fn ride_at_the_dwelling_limit_keeps_the_special_unused() {
        let mut gs = game();
        gs.players.get_mut("p1").unwrap().has_stronghold = true;
        for q in 0..8 {
            put_building(&mut gs, q, 30, "p1", BuildingType::Dwelling);
        }
        set_terrain(&mut gs, 10, 30, TerrainType::Forest);

        let action = Action::Special {
            player_id: "p1".into(),
            kind: SpecialActionKind::WitchesRide,
            track: None,
            hex: Some(HexCoord::new(10, 30)),
            build_dwelling: false,
        };
        let err = action.execute(&mut gs).unwrap_err();
        assert!(matches!(err, GameError::BuildingLimit(_)));
        // The once-per-round special survives the failed ride
        assert!(!gs.players["p1"]
            .special_actions_used
            .contains(&SpecialActionKind::WitchesRide));
        assert!(gs
            .map
            .get_cell(&HexCoord::new(10, 30))
            .unwrap()
            .building
            .is_none());
    }

    #[test]
    fn engineers_bridge_a_river_for_two_workers() {
        let mut gs = game();
        gs.assign_faction("p1", FactionType::Engineers, 20).unwrap();
        let p1 = gs.players.get_mut("p1").unwrap();
        p1.has_stronghold = true;
        p1.resources.workers = 5;
        put_building(&mut gs, 0, 30, "p1", BuildingType::Dwelling);
        set_terrain(&mut gs, 1, 30, TerrainType::River);
        set_terrain(&mut gs, 2, 30, TerrainType::Plains);

        Action::EngineersBridge {
            player_id: "p1".into(),
            bridge: (HexCoord::new(0, 30), HexCoord::new(2, 30)),
        }
        .execute(&mut gs)
        .unwrap();
        assert_eq!(gs.players["p1"].resources.workers, 3);
        assert_eq!(gs.players["p1"].bridges_built, 1);
        assert!(gs.map.has_bridge(&HexCoord::new(0, 30), &HexCoord::new(2, 30)));

        // Worker bridges are not once per round; a second span is still legal
        set_terrain(&mut gs, 0, 31, TerrainType::River);
        set_terrain(&mut gs, 0, 32, TerrainType::Plains);
        Action::EngineersBridge {
            player_id: "p1".into(),
            bridge: (HexCoord::new(0, 30), HexCoord::new(0, 32)),
        }
        .validate(&gs)
        .unwrap();

        // Other factions cannot pay workers for bridges
        let err = Action::EngineersBridge {
            player_id: "p2".into(),
            bridge: (HexCoord::new(0, 30), HexCoord::new(2, 30)),
        }
        .validate(&gs)
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }
}
