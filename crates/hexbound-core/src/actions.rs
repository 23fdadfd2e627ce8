//! Commands players send and the events they produce.
//!
//! This module defines every command the turn controller accepts, the
//! events emitted when commands succeed, and who each event is addressed to.

use crate::board::{Resource, Seat};
use crate::grid::{Edge, Intersection, TileCoord};
use crate::player::{DevelopmentCard, ResourceHand};
use serde::{Deserialize, Serialize};

/// Everything a seat can ask the game to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    // ==================== Setup Phase ====================
    PlaceInitialSettlement { position: Intersection },
    /// Must touch the settlement just placed
    PlaceInitialRoad { position: Edge },

    // ==================== Turn Actions ====================
    RollDice,
    PassTurn,

    // ==================== Robber ====================
    /// Give up cards after a 7 was rolled
    Discard { cards: ResourceHand },
    /// Move the robber, optionally stealing from a player next to `tile`
    MoveRobber { tile: TileCoord, victim: Option<Seat> },

    // ==================== Building ====================
    BuildSettlement { position: Intersection },
    BuildCity { position: Intersection },
    BuildRoad { position: Edge },
    BuyDevelopmentCard,

    // ==================== Development Cards ====================
    UseDevelopmentCard { play: CardPlay },

    // ==================== Trading ====================
    /// Offer `give` for `take`, to one seat or to everyone
    ProposeTrade {
        to: Option<Seat>,
        give: ResourceHand,
        take: ResourceHand,
    },
    AcceptTrade { code: u32 },
    RefuseTrade { code: u32 },
    TradeWithBank { give: ResourceHand, take: ResourceHand },
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlaceInitialSettlement { .. } => "place_initial_settlement",
            Command::PlaceInitialRoad { .. } => "place_initial_road",
            Command::RollDice => "roll_dice",
            Command::PassTurn => "pass_turn",
            Command::Discard { .. } => "discard",
            Command::MoveRobber { .. } => "move_robber",
            Command::BuildSettlement { .. } => "build_settlement",
            Command::BuildCity { .. } => "build_city",
            Command::BuildRoad { .. } => "build_road",
            Command::BuyDevelopmentCard => "buy_development_card",
            Command::UseDevelopmentCard { .. } => "use_development_card",
            Command::ProposeTrade { .. } => "propose_trade",
            Command::AcceptTrade { .. } => "accept_trade",
            Command::RefuseTrade { .. } => "refuse_trade",
            Command::TradeWithBank { .. } => "trade_with_bank",
        }
    }
}

/// A development card together with the choices it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardPlay {
    Knight { tile: TileCoord, victim: Option<Seat> },
    Monopoly { resource: Resource },
    RoadBuilding { first: Edge, second: Edge },
    /// Exactly two resources of any split
    Plenty { take: ResourceHand },
}

impl CardPlay {
    /// The card this play consumes
    pub fn card(&self) -> DevelopmentCard {
        match self {
            CardPlay::Knight { .. } => DevelopmentCard::Knight,
            CardPlay::Monopoly { .. } => DevelopmentCard::Monopoly,
            CardPlay::RoadBuilding { .. } => DevelopmentCard::RoadBuilding,
            CardPlay::Plenty { .. } => DevelopmentCard::Plenty,
        }
    }
}

/// An open offer between players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub code: u32,
    pub from: Seat,
    /// `None` means any other seat may accept
    pub to: Option<Seat>,
    /// What the proposer gives
    pub give: ResourceHand,
    /// What the proposer wants back
    pub take: ResourceHand,
}

impl TradeOffer {
    /// Whether `seat` may answer this offer
    pub fn is_addressed_to(&self, seat: Seat) -> bool {
        seat != self.from && self.to.map_or(true, |to| to == seat)
    }
}

/// Events that occur as a result of commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum GameEvent {
    /// Seat `turn` is now expected to act
    ActionNeeded { turn: Seat },

    DiceResult { dice: (u8, u8) },

    /// Resources distributed after a roll
    ResourcesProduced { gains: Vec<(Seat, ResourceHand)> },

    BuildSettlement { position: Intersection, seat: Seat },
    BuildCity { position: Intersection, seat: Seat },
    BuildRoad { position: Edge, seat: Seat },

    /// The card is only revealed to the buyer
    DevelopmentCardBought {
        seat: Seat,
        card: Option<DevelopmentCard>,
    },
    DevelopmentCardUsed { seat: Seat, card: DevelopmentCard },
    MonopolyResolved { resource: Resource, total_moved: u32 },

    RobberMoved { position: TileCoord },
    /// The resource is only revealed to thief and victim
    ResourceStolen {
        resource: Option<Resource>,
        victim: Seat,
    },
    /// Seats that must discard before the robber moves
    DiscardRequested { players: Vec<Seat> },
    CardsDiscarded { seat: Seat, count: u32 },

    TradeOffer(TradeOffer),
    TradeAccept { code: u32, by: Seat },
    TradeRefuse { code: u32, by: Seat },
    BankTrade {
        seat: Seat,
        give: ResourceHand,
        take: ResourceHand,
    },

    LongestRoadChanged { holder: Option<Seat>, length: u32 },
    LargestArmyChanged { holder: Option<Seat>, size: u32 },

    TurnPassed { from: Seat, to: Seat, forced: bool },
    GameOver { winner: Seat },
}

/// Who receives an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    Seat(Seat),
    AllExcept(Seat),
    Broadcast,
}

impl Audience {
    pub fn includes(&self, seat: Seat) -> bool {
        match self {
            Audience::Seat(s) => *s == seat,
            Audience::AllExcept(s) => *s != seat,
            Audience::Broadcast => true,
        }
    }
}

/// An event and its recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub audience: Audience,
    pub event: GameEvent,
}

impl Notification {
    pub fn broadcast(event: GameEvent) -> Self {
        Self {
            audience: Audience::Broadcast,
            event,
        }
    }

    pub fn to_seat(seat: Seat, event: GameEvent) -> Self {
        Self {
            audience: Audience::Seat(seat),
            event,
        }
    }

    pub fn all_except(seat: Seat, event: GameEvent) -> Self {
        Self {
            audience: Audience::AllExcept(seat),
            event,
        }
    }
}
