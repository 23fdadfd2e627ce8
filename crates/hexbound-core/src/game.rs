//! Core game state machine.
//!
//! This module contains the main `GameState` struct and the turn controller.
//! `GameState::apply_with_rng` checks a command against the current phase,
//! the acting seat and the rules; only a legal command mutates the state, and
//! the result is the list of notifications to fan out. A rejected command
//! leaves the state untouched.

use crate::actions::{CardPlay, Command, GameEvent, Notification, TradeOffer};
use crate::board::{Board, Resource, Seat};
use crate::grid::{Edge, Intersection, TileCoord};
use crate::ledger::Ledger;
use crate::player::{costs, DevelopmentCard, DevelopmentDeck, Player, ResourceHand};
use crate::production::{self, ROBBER_ROLL};
use crate::roads;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Rule configuration for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Number of seats (2 to 4)
    pub seats: u8,
    /// Points needed to win
    pub victory_points: u32,
    /// Minimum road length for the longest road bonus
    pub min_longest_road: u32,
    /// Minimum army size for the largest army bonus
    pub min_largest_army: u32,
}

impl GameConfig {
    /// Same game with the classic 5-road / 3-knight bonus thresholds
    pub fn with_standard_thresholds(self) -> Self {
        Self {
            min_longest_road: 5,
            min_largest_army: 3,
            ..self
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seats: 4,
            victory_points: 10,
            min_longest_road: 0,
            min_largest_army: 0,
        }
    }
}

/// Game phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Initial placement, snake order
    Setup {
        /// 1 walks the seats forward, 2 walks them back
        round: u8,
        placing: SetupPlacing,
    },

    /// Start of turn, the active seat must roll
    AwaitingRoll,

    /// After the roll: build, trade, buy and use cards, pass
    AwaitingAction,

    /// A 7 was rolled
    AwaitingRobber { stage: RobberStage },

    /// Terminal
    GameOver { winner: Seat },
}

/// What we're placing during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupPlacing {
    Settlement,
    Road,
}

/// Progress of a robber interrupt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobberStage {
    /// Seats that still have to discard
    Discard { pending: Vec<Seat> },
    /// The active seat must move the robber
    Move,
}

/// Commands that are not allowed right now
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IllegalAction {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("No such seat")]
    UnknownSeat,

    #[error("Invalid action for current phase")]
    WrongPhase,

    #[error("Game is over")]
    GameOver,

    #[error("A development card was already bought this turn")]
    CardAlreadyBought,

    #[error("A development card was already used this turn")]
    CardAlreadyUsed,

    #[error("Don't have that card")]
    MissingCard,

    #[error("Cards bought this turn can be used from the next turn")]
    CardNotYetUsable,

    #[error("No development cards left in deck")]
    DeckEmpty,

    #[error("No pieces remaining")]
    PieceLimit,

    #[error("Invalid card choice")]
    InvalidCardChoice,

    #[error("Must discard exactly {required} cards")]
    InvalidDiscard { required: u32 },

    #[error("Waiting for discards")]
    DiscardsPending,

    #[error("No open trade with that code")]
    NoSuchTrade,

    #[error("Trade is not addressed to you")]
    NotAddressed,

    #[error("Invalid trade offer")]
    InvalidOffer,

    #[error("A game needs 2 to 4 seats, one name each")]
    SeatCount,
}

/// Errors that can occur when applying commands
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Illegal action: {0}")]
    IllegalAction(#[from] IllegalAction),

    #[error("Cannot afford this")]
    InsufficientResources,

    #[error("Invalid placement location")]
    InvalidPosition,

    #[error("Invalid trade ratio")]
    InvalidTradeRatio,
}

/// Once-per-turn limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFlags {
    pub card_bought: bool,
    pub card_used: bool,
}

/// The complete game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub config: GameConfig,
    /// The game board (tiles and robber)
    pub board: Board,
    /// Structures and roads
    pub ledger: Ledger,
    /// All players, indexed by seat
    pub players: Vec<Player>,
    /// Undrawn development cards
    pub deck: DevelopmentDeck,
    /// Seat whose turn it is
    pub current_player: Seat,
    pub phase: GamePhase,
    /// Turn number (0 during setup, then from 1)
    pub turn_number: u32,
    /// Last dice roll this turn
    pub dice: Option<(u8, u8)>,
    pub flags: TurnFlags,
    pub longest_road_holder: Option<Seat>,
    pub largest_army_holder: Option<Seat>,
    /// Player trade offers still open this turn
    pub open_trades: Vec<TradeOffer>,
    next_trade_code: u32,
    /// Setup phase tracking: which settlement was just placed
    setup_anchor: Option<Intersection>,
}

/// Counts standing in for a hand that is hidden from the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenHand {
    pub seat: Seat,
    pub resources: u32,
    pub dev_cards: u32,
}

/// The game as one seat may see it. Other players' resources and
/// development cards are emptied in `state` and reported as counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    pub seat: Seat,
    pub state: GameState,
    pub hidden: Vec<HiddenHand>,
}

impl GameState {
    /// Create a new game on a random standard board
    pub fn new(config: GameConfig, names: Vec<String>) -> Result<Self, GameError> {
        let mut rng = rand::thread_rng();
        Self::new_with_rng(config, names, &mut rng)
    }

    /// Create a new game using the given RNG for the board
    pub fn new_with_rng<R: Rng>(
        config: GameConfig,
        names: Vec<String>,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        Self::with_board(config, names, Board::standard_with_rng(rng))
    }

    /// Create a new game on a given board
    pub fn with_board(config: GameConfig, names: Vec<String>, board: Board) -> Result<Self, GameError> {
        if !(2..=4).contains(&config.seats) || names.len() != config.seats as usize {
            return Err(IllegalAction::SeatCount.into());
        }
        let players = names
            .into_iter()
            .enumerate()
            .map(|(seat, name)| Player::new(seat as Seat, name))
            .collect();

        Ok(Self {
            config,
            board,
            ledger: Ledger::new(),
            players,
            deck: DevelopmentDeck::standard(),
            current_player: 0,
            phase: GamePhase::Setup {
                round: 1,
                placing: SetupPlacing::Settlement,
            },
            turn_number: 0,
            dice: None,
            flags: TurnFlags::default(),
            longest_road_holder: None,
            largest_army_holder: None,
            open_trades: Vec::new(),
            next_trade_code: 1,
            setup_anchor: None,
        })
    }

    // ==================== Queries ====================

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, seat: Seat) -> Option<&Player> {
        self.players.get(seat as usize)
    }

    /// 2 per city, 1 per settlement, 1 per held Point card, 2 per bonus
    pub fn points(&self, seat: Seat) -> u32 {
        self.player(seat).map_or(0, |player| {
            self.ledger.structure_points(seat) + player.bonus_points()
        })
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, GamePhase::GameOver { .. })
    }

    pub fn winner(&self) -> Option<Seat> {
        match self.phase {
            GamePhase::GameOver { winner } => Some(winner),
            _ => None,
        }
    }

    /// Seats the game is waiting on
    pub fn awaited_seats(&self) -> Vec<Seat> {
        match &self.phase {
            GamePhase::AwaitingRobber {
                stage: RobberStage::Discard { pending },
            } => pending.clone(),
            GamePhase::GameOver { .. } => Vec::new(),
            _ => vec![self.current_player],
        }
    }

    /// Snapshot for `seat` with the other hands hidden
    pub fn view_for(&self, seat: Seat) -> SeatView {
        let mut state = self.clone();
        let mut hidden = Vec::new();
        for player in state.players.iter_mut().filter(|p| p.seat != seat) {
            hidden.push(HiddenHand {
                seat: player.seat,
                resources: player.resources.total(),
                dev_cards: (player.dev_cards.len() + player.dev_cards_bought_this_turn.len()) as u32,
            });
            player.resources = ResourceHand::new();
            player.dev_cards.clear();
            player.dev_cards_bought_this_turn.clear();
            // Army size stays public
            player
                .drawn_cards
                .retain(|card| matches!(card, DevelopmentCard::Knight));
        }
        SeatView {
            seat,
            state,
            hidden,
        }
    }

    /// Where the setup road may go: free edges leaving the settlement just
    /// placed
    pub fn legal_initial_road_positions(&self) -> Vec<Edge> {
        let Some(anchor) = self.setup_anchor else {
            return Vec::new();
        };
        anchor
            .adjacent()
            .into_iter()
            .filter_map(|neighbor| Edge::new(anchor, neighbor).ok())
            .filter(|edge| self.ledger.road_at(edge).is_none())
            .collect()
    }

    // ==================== Command dispatch ====================

    /// Apply a command using the thread RNG
    pub fn apply(&mut self, seat: Seat, command: Command) -> Result<Vec<Notification>, GameError> {
        let mut rng = rand::thread_rng();
        self.apply_with_rng(seat, command, &mut rng)
    }

    /// Apply a command for `seat`
    pub fn apply_with_rng<R: Rng>(
        &mut self,
        seat: Seat,
        command: Command,
        rng: &mut R,
    ) -> Result<Vec<Notification>, GameError> {
        if self.is_finished() {
            return Err(IllegalAction::GameOver.into());
        }
        if self.player(seat).is_none() {
            return Err(IllegalAction::UnknownSeat.into());
        }

        let name = command.name();
        let mut out = Vec::new();

        match command {
            Command::PlaceInitialSettlement { position } => {
                self.place_initial_settlement(seat, position, &mut out)?
            }
            Command::PlaceInitialRoad { position } => {
                self.place_initial_road(seat, position, &mut out)?
            }
            Command::RollDice => self.roll_dice(seat, rng, &mut out)?,
            Command::PassTurn => {
                self.require_turn(seat)?;
                self.require_phase(matches!(self.phase, GamePhase::AwaitingAction))?;
                self.advance_turn(false, &mut out);
            }
            Command::Discard { cards } => self.discard(seat, cards, &mut out)?,
            Command::MoveRobber { tile, victim } => {
                self.move_robber(seat, tile, victim, rng, &mut out)?
            }
            Command::BuildSettlement { position } => {
                self.build_settlement(seat, position, &mut out)?
            }
            Command::BuildCity { position } => self.build_city(seat, position, &mut out)?,
            Command::BuildRoad { position } => self.build_road(seat, position, &mut out)?,
            Command::BuyDevelopmentCard => self.buy_development_card(seat, rng, &mut out)?,
            Command::UseDevelopmentCard { play } => {
                self.use_development_card(seat, play, rng, &mut out)?
            }
            Command::ProposeTrade { to, give, take } => {
                self.propose_trade(seat, to, give, take, &mut out)?
            }
            Command::AcceptTrade { code } => self.accept_trade(seat, code, &mut out)?,
            Command::RefuseTrade { code } => self.refuse_trade(seat, code, &mut out)?,
            Command::TradeWithBank { give, take } => {
                self.trade_with_bank(seat, give, take, &mut out)?
            }
        }

        self.refresh_bonuses(&mut out);
        self.check_victory(&mut out);
        debug!(seat, command = name, phase = ?self.phase, "command applied");
        Ok(out)
    }

    /// Resolve a turn timeout for the awaited seat(s).
    ///
    /// Setup places the first legal settlement or road, a pending roll or
    /// action phase passes the turn, and a robber interrupt discards the
    /// largest piles for everyone still pending, leaves the robber where it
    /// is and passes the turn.
    pub fn expire_turn<R: Rng>(&mut self, _rng: &mut R) -> Vec<Notification> {
        let mut out = Vec::new();
        let seat = self.current_player;

        match self.phase.clone() {
            GamePhase::GameOver { .. } => return out,
            GamePhase::Setup {
                placing: SetupPlacing::Settlement,
                ..
            } => {
                let first = self.ledger.legal_initial_settlement_positions().first().copied();
                let placed = first
                    .ok_or(GameError::InvalidPosition)
                    .and_then(|position| self.place_initial_settlement(seat, position, &mut out));
                if let Err(error) = placed {
                    warn!(seat, %error, "automatic settlement placement failed");
                }
            }
            GamePhase::Setup {
                placing: SetupPlacing::Road,
                ..
            } => {
                let first = self.legal_initial_road_positions().first().copied();
                let placed = first
                    .ok_or(GameError::InvalidPosition)
                    .and_then(|position| self.place_initial_road(seat, position, &mut out));
                if let Err(error) = placed {
                    warn!(seat, %error, "automatic road placement failed");
                }
            }
            GamePhase::AwaitingRoll | GamePhase::AwaitingAction => {
                self.advance_turn(true, &mut out);
            }
            GamePhase::AwaitingRobber { stage } => {
                if let RobberStage::Discard { pending } = stage {
                    for late in pending {
                        let player = &mut self.players[late as usize];
                        let required = production::discard_required(player.resources.total());
                        let cards = player.resources.largest_piles(required);
                        player.resources.try_subtract(&cards);
                        out.push(Notification::broadcast(GameEvent::CardsDiscarded {
                            seat: late,
                            count: cards.total(),
                        }));
                    }
                }
                self.advance_turn(true, &mut out);
            }
        }

        warn!(seat, phase = ?self.phase, "turn expired");
        self.refresh_bonuses(&mut out);
        self.check_victory(&mut out);
        out
    }

    // ==================== Guards ====================

    fn require_turn(&self, seat: Seat) -> Result<(), GameError> {
        if seat != self.current_player {
            return Err(IllegalAction::NotYourTurn.into());
        }
        Ok(())
    }

    fn require_phase(&self, allowed: bool) -> Result<(), GameError> {
        if !allowed {
            return Err(IllegalAction::WrongPhase.into());
        }
        Ok(())
    }

    fn require_action_phase(&self, seat: Seat) -> Result<(), GameError> {
        self.require_turn(seat)?;
        self.require_phase(matches!(self.phase, GamePhase::AwaitingAction))
    }

    /// Deduct `cost`, or fail without touching anything
    fn pay(&mut self, seat: Seat, cost: &ResourceHand) -> Result<(), GameError> {
        if !self.players[seat as usize].resources.try_subtract(cost) {
            return Err(GameError::InsufficientResources);
        }
        Ok(())
    }

    // ==================== Placement ====================

    /// Record a settlement and grant the ports it touches
    fn settle(&mut self, seat: Seat, position: Intersection) {
        let found = self.board.resources_of(&position);
        self.ledger.place_settlement(seat, position, found.resources);
        let player = &mut self.players[seat as usize];
        for port in found.ports {
            player.privileges.grant(port);
        }
        player.settlements_remaining = player.settlements_remaining.saturating_sub(1);
    }

    fn lay_road(&mut self, seat: Seat, position: Edge, out: &mut Vec<Notification>) {
        self.ledger.place_road(seat, position);
        let player = &mut self.players[seat as usize];
        player.roads_remaining = player.roads_remaining.saturating_sub(1);
        out.push(Notification::broadcast(GameEvent::BuildRoad { position, seat }));
    }

    fn place_initial_settlement(
        &mut self,
        seat: Seat,
        position: Intersection,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        let GamePhase::Setup {
            round,
            placing: SetupPlacing::Settlement,
        } = self.phase
        else {
            return Err(IllegalAction::WrongPhase.into());
        };
        self.require_turn(seat)?;
        if self.players[seat as usize].settlements_remaining == 0 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if !self.ledger.is_isolated(&position) {
            return Err(GameError::InvalidPosition);
        }

        self.settle(seat, position);
        self.setup_anchor = Some(position);
        self.phase = GamePhase::Setup {
            round,
            placing: SetupPlacing::Road,
        };
        out.push(Notification::broadcast(GameEvent::BuildSettlement { position, seat }));
        Ok(())
    }

    fn place_initial_road(
        &mut self,
        seat: Seat,
        position: Edge,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        let GamePhase::Setup {
            round,
            placing: SetupPlacing::Road,
        } = self.phase
        else {
            return Err(IllegalAction::WrongPhase.into());
        };
        self.require_turn(seat)?;
        if self.players[seat as usize].roads_remaining == 0 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if !self.legal_initial_road_positions().contains(&position) {
            return Err(GameError::InvalidPosition);
        }

        self.lay_road(seat, position, out);
        self.setup_anchor = None;
        self.advance_setup(round, out);
        Ok(())
    }

    /// Snake order: seats forward in round 1, backward in round 2, then
    /// seat 0 rolls.
    fn advance_setup(&mut self, round: u8, out: &mut Vec<Notification>) {
        let last = (self.players.len() - 1) as Seat;
        let next_settlement = |round| GamePhase::Setup {
            round,
            placing: SetupPlacing::Settlement,
        };

        match round {
            1 if self.current_player < last => {
                self.current_player += 1;
                self.phase = next_settlement(1);
            }
            1 => self.phase = next_settlement(2),
            _ if self.current_player > 0 => {
                self.current_player -= 1;
                self.phase = next_settlement(2);
            }
            _ => {
                self.current_player = 0;
                self.turn_number = 1;
                self.phase = GamePhase::AwaitingRoll;
                info!("setup complete");
            }
        }

        out.push(Notification::broadcast(GameEvent::ActionNeeded {
            turn: self.current_player,
        }));
    }

    fn build_settlement(
        &mut self,
        seat: Seat,
        position: Intersection,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        if self.players[seat as usize].settlements_remaining == 0 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if !self.ledger.legal_settlement_positions(seat).contains(&position) {
            return Err(GameError::InvalidPosition);
        }
        self.pay(seat, &costs::settlement())?;

        self.settle(seat, position);
        out.push(Notification::broadcast(GameEvent::BuildSettlement { position, seat }));
        Ok(())
    }

    fn build_city(
        &mut self,
        seat: Seat,
        position: Intersection,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        if self.players[seat as usize].cities_remaining == 0 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if !self.ledger.legal_city_positions(seat).contains(&position) {
            return Err(GameError::InvalidPosition);
        }
        self.pay(seat, &costs::city())?;

        self.ledger.upgrade_to_city(seat, &position);
        let player = &mut self.players[seat as usize];
        player.cities_remaining -= 1;
        // The settlement piece goes back to the supply
        player.settlements_remaining += 1;
        out.push(Notification::broadcast(GameEvent::BuildCity { position, seat }));
        Ok(())
    }

    fn build_road(
        &mut self,
        seat: Seat,
        position: Edge,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        if self.players[seat as usize].roads_remaining == 0 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if !self.ledger.legal_road_positions(seat).contains(&position) {
            return Err(GameError::InvalidPosition);
        }
        self.pay(seat, &costs::road())?;

        self.lay_road(seat, position, out);
        Ok(())
    }

    // ==================== Dice and robber ====================

    fn roll_dice<R: Rng>(
        &mut self,
        seat: Seat,
        rng: &mut R,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_turn(seat)?;
        self.require_phase(matches!(self.phase, GamePhase::AwaitingRoll))?;

        let dice = production::roll_dice(rng);
        self.dice = Some(dice);
        out.push(Notification::broadcast(GameEvent::DiceResult { dice }));

        if dice.0 + dice.1 == ROBBER_ROLL {
            let pending: Vec<Seat> = self
                .players
                .iter()
                .filter(|p| production::discard_required(p.resources.total()) > 0)
                .map(|p| p.seat)
                .collect();
            if pending.is_empty() {
                self.phase = GamePhase::AwaitingRobber {
                    stage: RobberStage::Move,
                };
            } else {
                out.push(Notification::broadcast(GameEvent::DiscardRequested {
                    players: pending.clone(),
                }));
                self.phase = GamePhase::AwaitingRobber {
                    stage: RobberStage::Discard { pending },
                };
            }
        } else {
            let gains = production::resources_for_roll(&self.board, &self.ledger, dice.0 + dice.1);
            for (owner, hand) in &gains {
                self.players[*owner as usize].resources.add_hand(hand);
            }
            out.push(Notification::broadcast(GameEvent::ResourcesProduced {
                gains: gains.into_iter().collect(),
            }));
            self.phase = GamePhase::AwaitingAction;
        }

        out.push(Notification::broadcast(GameEvent::ActionNeeded {
            turn: self.current_player,
        }));
        Ok(())
    }

    fn discard(
        &mut self,
        seat: Seat,
        cards: ResourceHand,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        let GamePhase::AwaitingRobber {
            stage: RobberStage::Discard { pending },
        } = &self.phase
        else {
            return Err(IllegalAction::WrongPhase.into());
        };
        if !pending.contains(&seat) {
            return Err(IllegalAction::NotYourTurn.into());
        }
        let held = self.players[seat as usize].resources;
        let required = production::discard_required(held.total());
        if cards.checked_total() != Some(required) {
            return Err(IllegalAction::InvalidDiscard { required }.into());
        }
        let rest = held
            .checked_sub(&cards)
            .ok_or(GameError::InsufficientResources)?;

        let pending: Vec<Seat> = pending.iter().copied().filter(|s| *s != seat).collect();
        self.players[seat as usize].resources = rest;
        out.push(Notification::broadcast(GameEvent::CardsDiscarded {
            seat,
            count: required,
        }));
        if pending.is_empty() {
            self.phase = GamePhase::AwaitingRobber {
                stage: RobberStage::Move,
            };
            out.push(Notification::broadcast(GameEvent::ActionNeeded {
                turn: self.current_player,
            }));
        } else {
            self.phase = GamePhase::AwaitingRobber {
                stage: RobberStage::Discard { pending },
            };
        }
        Ok(())
    }

    fn move_robber<R: Rng>(
        &mut self,
        seat: Seat,
        tile: TileCoord,
        victim: Option<Seat>,
        rng: &mut R,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_turn(seat)?;
        match &self.phase {
            GamePhase::AwaitingRobber {
                stage: RobberStage::Move,
            } => {}
            GamePhase::AwaitingRobber { .. } => return Err(IllegalAction::DiscardsPending.into()),
            _ => return Err(IllegalAction::WrongPhase.into()),
        }
        self.check_robber_target(seat, &tile, victim)?;

        self.relocate_robber(seat, tile, victim, rng, out);
        self.phase = GamePhase::AwaitingAction;
        out.push(Notification::broadcast(GameEvent::ActionNeeded {
            turn: self.current_player,
        }));
        Ok(())
    }

    /// The robber must move to another land tile, and a victim must be
    /// someone else with a structure on that tile.
    fn check_robber_target(
        &self,
        seat: Seat,
        tile: &TileCoord,
        victim: Option<Seat>,
    ) -> Result<(), GameError> {
        if !self.board.is_robber_candidate(tile) || *tile == self.board.robber() {
            return Err(GameError::InvalidPosition);
        }
        if let Some(victim) = victim {
            if victim == seat || !self.ledger.owners_touching(tile).contains(&victim) {
                return Err(GameError::InvalidPosition);
            }
        }
        Ok(())
    }

    fn relocate_robber<R: Rng>(
        &mut self,
        thief: Seat,
        tile: TileCoord,
        victim: Option<Seat>,
        rng: &mut R,
        out: &mut Vec<Notification>,
    ) {
        self.board.set_robber(tile);
        out.push(Notification::broadcast(GameEvent::RobberMoved { position: tile }));

        let Some(victim) = victim else {
            return;
        };
        let Some(resource) = self.players[victim as usize].resources.steal_random(rng) else {
            debug!(thief, victim, "nothing to steal");
            return;
        };
        self.players[thief as usize].resources.add(resource, 1);

        for player in &self.players {
            let seen = player.seat == thief || player.seat == victim;
            out.push(Notification::to_seat(
                player.seat,
                GameEvent::ResourceStolen {
                    resource: seen.then_some(resource),
                    victim,
                },
            ));
        }
    }

    // ==================== Development cards ====================

    fn buy_development_card<R: Rng>(
        &mut self,
        seat: Seat,
        rng: &mut R,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        if self.flags.card_bought {
            return Err(IllegalAction::CardAlreadyBought.into());
        }
        if self.deck.is_empty() {
            return Err(IllegalAction::DeckEmpty.into());
        }
        self.pay(seat, &costs::development_card())?;

        let card = self.deck.draw(rng).ok_or(IllegalAction::DeckEmpty)?;
        self.players[seat as usize].receive_dev_card(card);
        self.flags.card_bought = true;
        out.push(Notification::to_seat(
            seat,
            GameEvent::DevelopmentCardBought {
                seat,
                card: Some(card),
            },
        ));
        out.push(Notification::all_except(
            seat,
            GameEvent::DevelopmentCardBought { seat, card: None },
        ));
        Ok(())
    }

    fn use_development_card<R: Rng>(
        &mut self,
        seat: Seat,
        play: CardPlay,
        rng: &mut R,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_turn(seat)?;
        let is_knight = matches!(play, CardPlay::Knight { .. });
        match self.phase {
            GamePhase::AwaitingAction => {}
            GamePhase::AwaitingRoll if is_knight => {}
            _ => return Err(IllegalAction::WrongPhase.into()),
        }
        if !is_knight && self.flags.card_used {
            return Err(IllegalAction::CardAlreadyUsed.into());
        }

        let card = play.card();
        let player = &self.players[seat as usize];
        if !player.dev_cards.contains(&card) {
            if player.dev_cards_bought_this_turn.contains(&card) {
                return Err(IllegalAction::CardNotYetUsable.into());
            }
            return Err(IllegalAction::MissingCard.into());
        }

        match play {
            CardPlay::Knight { tile, victim } => self.check_robber_target(seat, &tile, victim)?,
            CardPlay::Monopoly { .. } => {}
            CardPlay::Plenty { take } => {
                if take.checked_total() != Some(2) {
                    return Err(IllegalAction::InvalidCardChoice.into());
                }
            }
            CardPlay::RoadBuilding { first, second } => {
                self.check_road_building(seat, &first, &second)?
            }
        }

        self.players[seat as usize].consume_dev_card(card);
        if !is_knight {
            self.flags.card_used = true;
        }
        out.push(Notification::broadcast(GameEvent::DevelopmentCardUsed { seat, card }));

        match play {
            CardPlay::Knight { tile, victim } => self.relocate_robber(seat, tile, victim, rng, out),
            CardPlay::Monopoly { resource } => {
                let total_moved = self.monopolize(seat, resource);
                out.push(Notification::broadcast(GameEvent::MonopolyResolved {
                    resource,
                    total_moved,
                }));
            }
            CardPlay::Plenty { take } => {
                self.players[seat as usize].resources.add_hand(&take);
            }
            CardPlay::RoadBuilding { first, second } => {
                self.lay_road(seat, first, out);
                self.lay_road(seat, second, out);
            }
        }
        Ok(())
    }

    /// Both roads must be legal, the second possibly extending the first
    fn check_road_building(&self, seat: Seat, first: &Edge, second: &Edge) -> Result<(), GameError> {
        if self.players[seat as usize].roads_remaining < 2 {
            return Err(IllegalAction::PieceLimit.into());
        }
        if first == second || !self.ledger.legal_road_positions(seat).contains(first) {
            return Err(GameError::InvalidPosition);
        }
        let mut trial = self.ledger.clone();
        trial.place_road(seat, *first);
        if !trial.legal_road_positions(seat).contains(second) {
            return Err(GameError::InvalidPosition);
        }
        Ok(())
    }

    /// Move every other player's `resource` to `seat`; returns the amount
    fn monopolize(&mut self, seat: Seat, resource: Resource) -> u32 {
        let total: u32 = self
            .players
            .iter_mut()
            .filter(|p| p.seat != seat)
            .map(|p| p.resources.take_all(resource))
            .fold(0u32, u32::saturating_add);
        self.players[seat as usize].resources.add(resource, total);
        total
    }

    // ==================== Trading ====================

    fn propose_trade(
        &mut self,
        seat: Seat,
        to: Option<Seat>,
        give: ResourceHand,
        take: ResourceHand,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        if give.is_empty() || take.is_empty() {
            return Err(IllegalAction::InvalidOffer.into());
        }
        if let Some(to) = to {
            if to == seat || self.player(to).is_none() {
                return Err(IllegalAction::InvalidOffer.into());
            }
        }
        if !self.players[seat as usize].resources.can_afford(&give) {
            return Err(GameError::InsufficientResources);
        }

        let offer = TradeOffer {
            code: self.next_trade_code,
            from: seat,
            to,
            give,
            take,
        };
        self.next_trade_code += 1;
        self.open_trades.push(offer);
        out.push(Notification::broadcast(GameEvent::TradeOffer(offer)));
        Ok(())
    }

    fn find_trade(&self, code: u32) -> Result<TradeOffer, GameError> {
        self.open_trades
            .iter()
            .find(|offer| offer.code == code)
            .copied()
            .ok_or_else(|| IllegalAction::NoSuchTrade.into())
    }

    fn close_trade(&mut self, code: u32) {
        self.open_trades.retain(|offer| offer.code != code);
    }

    fn accept_trade(&mut self, seat: Seat, code: u32, out: &mut Vec<Notification>) -> Result<(), GameError> {
        self.require_phase(matches!(self.phase, GamePhase::AwaitingAction))?;
        let offer = self.find_trade(code)?;
        if !offer.is_addressed_to(seat) {
            return Err(IllegalAction::NotAddressed.into());
        }
        let mut proposer = self.players[offer.from as usize]
            .resources
            .checked_sub(&offer.give)
            .ok_or(GameError::InsufficientResources)?;
        let mut acceptor = self.players[seat as usize]
            .resources
            .checked_sub(&offer.take)
            .ok_or(GameError::InsufficientResources)?;

        proposer.add_hand(&offer.take);
        acceptor.add_hand(&offer.give);
        self.players[offer.from as usize].resources = proposer;
        self.players[seat as usize].resources = acceptor;
        self.close_trade(code);
        out.push(Notification::broadcast(GameEvent::TradeAccept { code, by: seat }));
        Ok(())
    }

    /// Refusing an offer addressed only to you closes it; the proposer
    /// refusing their own offer withdraws it.
    fn refuse_trade(&mut self, seat: Seat, code: u32, out: &mut Vec<Notification>) -> Result<(), GameError> {
        self.require_phase(matches!(self.phase, GamePhase::AwaitingAction))?;
        let offer = self.find_trade(code)?;
        if seat != offer.from && !offer.is_addressed_to(seat) {
            return Err(IllegalAction::NotAddressed.into());
        }
        if seat == offer.from || offer.to == Some(seat) {
            self.close_trade(code);
        }
        out.push(Notification::broadcast(GameEvent::TradeRefuse { code, by: seat }));
        Ok(())
    }

    fn trade_with_bank(
        &mut self,
        seat: Seat,
        give: ResourceHand,
        take: ResourceHand,
        out: &mut Vec<Notification>,
    ) -> Result<(), GameError> {
        self.require_action_phase(seat)?;
        production::validate_bank_trade(&self.players[seat as usize].privileges, &give, &take)?;
        self.pay(seat, &give)?;

        self.players[seat as usize].resources.add_hand(&take);
        out.push(Notification::broadcast(GameEvent::BankTrade { seat, give, take }));
        Ok(())
    }

    // ==================== Turn flow and scoring ====================

    fn advance_turn(&mut self, forced: bool, out: &mut Vec<Notification>) {
        let from = self.current_player;
        self.players[from as usize].end_turn();
        self.open_trades.clear();
        self.flags = TurnFlags::default();
        self.dice = None;

        let to = ((from as usize + 1) % self.players.len()) as Seat;
        self.current_player = to;
        self.turn_number += 1;
        self.phase = GamePhase::AwaitingRoll;

        out.push(Notification::broadcast(GameEvent::TurnPassed { from, to, forced }));
        out.push(Notification::broadcast(GameEvent::ActionNeeded { turn: to }));
    }

    /// Re-evaluate both bonuses; each goes to the unique strict maximum
    fn refresh_bonuses(&mut self, out: &mut Vec<Notification>) {
        let armies: Vec<u32> = self.players.iter().map(Player::army_size).collect();
        let army_holder = unique_leader(&armies, self.config.min_largest_army);
        if army_holder != self.largest_army_holder {
            self.largest_army_holder = army_holder;
            for player in &mut self.players {
                player.has_largest_army = Some(player.seat) == army_holder;
            }
            let size = army_holder.map_or(0, |seat| armies[seat as usize]);
            info!(holder = ?army_holder, size, "largest army changed");
            out.push(Notification::broadcast(GameEvent::LargestArmyChanged {
                holder: army_holder,
                size,
            }));
        }

        let lengths: Vec<u32> = self
            .players
            .iter()
            .map(|p| roads::longest_road(&self.ledger.roads_of(p.seat)))
            .collect();
        let road_holder = unique_leader(&lengths, self.config.min_longest_road);
        if road_holder != self.longest_road_holder {
            self.longest_road_holder = road_holder;
            for player in &mut self.players {
                player.has_longest_road = Some(player.seat) == road_holder;
            }
            let length = road_holder.map_or(0, |seat| lengths[seat as usize]);
            info!(holder = ?road_holder, length, "longest road changed");
            out.push(Notification::broadcast(GameEvent::LongestRoadChanged {
                holder: road_holder,
                length,
            }));
        }
    }

    /// End the game if someone reached the target, active seat first
    fn check_victory(&mut self, out: &mut Vec<Notification>) {
        if self.is_finished() {
            return;
        }
        let count = self.players.len();
        let winner = (0..count)
            .map(|offset| ((self.current_player as usize + offset) % count) as Seat)
            .find(|&seat| self.points(seat) >= self.config.victory_points);
        if let Some(winner) = winner {
            info!(winner, points = self.points(winner), "game over");
            self.phase = GamePhase::GameOver { winner };
            out.push(Notification::broadcast(GameEvent::GameOver { winner }));
        }
    }
}

/// Seat holding the unique maximum, if it is positive and at least `min`
fn unique_leader(values: &[u32], min: u32) -> Option<Seat> {
    let best = *values.iter().max()?;
    if best == 0 || best < min {
        return None;
    }
    let mut leaders = values.iter().enumerate().filter(|(_, v)| **v == best);
    match (leaders.next(), leaders.next()) {
        (Some((seat, _)), None) => Some(seat as Seat),
        _ => None,
    }
}

/// Whether a held card of this kind could be played now (used by clients
/// to grey out buttons)
pub fn card_is_playable(state: &GameState, seat: Seat, card: DevelopmentCard) -> bool {
    let Some(player) = state.player(seat) else {
        return false;
    };
    if !card.is_playable() || !player.dev_cards.contains(&card) || seat != state.current_player {
        return false;
    }
    match (card, &state.phase) {
        (DevelopmentCard::Knight, GamePhase::AwaitingRoll | GamePhase::AwaitingAction) => true,
        (_, GamePhase::AwaitingAction) => !state.flags.card_used,
        _ => false,
    }
}
