//! Player state and resource management.
//!
//! This module contains:
//! - ResourceHand, the five resource counters with checked subtraction
//! - Building costs
//! - Port trading privileges
//! - Development card types and the draw-without-replacement deck
//! - Player struct with resources, cards, pieces and bonus flags

use crate::board::{PortKind, Resource, Seat};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-player piece limits
pub const MAX_SETTLEMENTS: u32 = 5;
pub const MAX_CITIES: u32 = 4;
pub const MAX_ROADS: u32 = 15;

/// A hand of resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHand {
    pub rock: u32,
    pub brick: u32,
    pub sheep: u32,
    pub wheat: u32,
    pub wood: u32,
}

impl ResourceHand {
    /// Create an empty hand
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hand with specific amounts
    pub fn with_amounts(rock: u32, brick: u32, sheep: u32, wheat: u32, wood: u32) -> Self {
        Self {
            rock,
            brick,
            sheep,
            wheat,
            wood,
        }
    }

    /// Create a hand with a single resource
    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut hand = Self::new();
        hand.add(resource, amount);
        hand
    }

    /// Total number of resource cards, saturating at `u32::MAX`
    pub fn total(&self) -> u32 {
        self.checked_total().unwrap_or(u32::MAX)
    }

    /// Total number of resource cards, or `None` if it does not fit a `u32`.
    /// Hands sent by clients are measured with this.
    pub fn checked_total(&self) -> Option<u32> {
        Resource::ALL
            .iter()
            .try_fold(0u32, |sum, &resource| sum.checked_add(self.get(resource)))
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Get count of a specific resource
    pub fn get(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Rock => self.rock,
            Resource::Brick => self.brick,
            Resource::Sheep => self.sheep,
            Resource::Wheat => self.wheat,
            Resource::Wood => self.wood,
        }
    }

    fn slot(&mut self, resource: Resource) -> &mut u32 {
        match resource {
            Resource::Rock => &mut self.rock,
            Resource::Brick => &mut self.brick,
            Resource::Sheep => &mut self.sheep,
            Resource::Wheat => &mut self.wheat,
            Resource::Wood => &mut self.wood,
        }
    }

    /// Set count of a specific resource
    pub fn set(&mut self, resource: Resource, count: u32) {
        *self.slot(resource) = count;
    }

    /// Add resources to hand
    pub fn add(&mut self, resource: Resource, amount: u32) {
        let slot = self.slot(resource);
        *slot = slot.saturating_add(amount);
    }

    /// Add another hand to this one
    pub fn add_hand(&mut self, other: &ResourceHand) {
        for resource in Resource::ALL {
            self.add(resource, other.get(resource));
        }
    }

    /// Check if can afford a cost
    pub fn can_afford(&self, cost: &ResourceHand) -> bool {
        Resource::ALL
            .iter()
            .all(|&resource| self.get(resource) >= cost.get(resource))
    }

    /// The hand left after paying `cost`, or `None` if any counter would go
    /// negative
    pub fn checked_sub(&self, cost: &ResourceHand) -> Option<ResourceHand> {
        Some(Self {
            rock: self.rock.checked_sub(cost.rock)?,
            brick: self.brick.checked_sub(cost.brick)?,
            sheep: self.sheep.checked_sub(cost.sheep)?,
            wheat: self.wheat.checked_sub(cost.wheat)?,
            wood: self.wood.checked_sub(cost.wood)?,
        })
    }

    /// Try to subtract, returning false (and leaving the hand untouched) if
    /// insufficient
    pub fn try_subtract(&mut self, cost: &ResourceHand) -> bool {
        match self.checked_sub(cost) {
            Some(rest) => {
                *self = rest;
                true
            }
            None => false,
        }
    }

    /// Kinds with at least one card
    pub fn held_kinds(&self) -> Vec<Resource> {
        Resource::ALL
            .iter()
            .copied()
            .filter(|&resource| self.get(resource) > 0)
            .collect()
    }

    /// Remove one card of a kind chosen uniformly among the kinds held
    /// (robber steal)
    pub fn steal_random<R: Rng>(&mut self, rng: &mut R) -> Option<Resource> {
        let resource = *self.held_kinds().choose(rng)?;
        *self.slot(resource) -= 1;
        Some(resource)
    }

    /// Take every card of one kind, leaving zero
    pub fn take_all(&mut self, resource: Resource) -> u32 {
        std::mem::take(self.slot(resource))
    }

    /// Pick `count` cards from the largest piles, one at a time. Used when a
    /// player fails to choose a discard in time.
    pub fn largest_piles(&self, count: u32) -> ResourceHand {
        let mut left = *self;
        let mut picked = ResourceHand::new();
        for _ in 0..count.min(self.total()) {
            let Some(&biggest) = Resource::ALL.iter().max_by_key(|&&r| left.get(r)) else {
                break;
            };
            *left.slot(biggest) -= 1;
            picked.add(biggest, 1);
        }
        picked
    }
}

/// Building costs
pub mod costs {
    use super::ResourceHand;

    /// Cost to build a road: 1 brick, 1 wood
    pub fn road() -> ResourceHand {
        ResourceHand::with_amounts(0, 1, 0, 0, 1)
    }

    /// Cost to build a settlement: 1 brick, 1 sheep, 1 wheat, 1 wood
    pub fn settlement() -> ResourceHand {
        ResourceHand::with_amounts(0, 1, 1, 1, 1)
    }

    /// Cost to upgrade to city: 3 rock, 2 wheat
    pub fn city() -> ResourceHand {
        ResourceHand::with_amounts(3, 0, 0, 2, 0)
    }

    /// Cost to buy a development card: 1 rock, 1 sheep, 1 wheat
    pub fn development_card() -> ResourceHand {
        ResourceHand::with_amounts(1, 0, 1, 1, 0)
    }
}

/// Port trading privileges. Granted when a structure is placed next to a
/// port and never revoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePrivileges {
    pub generic: bool,
    /// Indexed by `Resource::index`
    pub specific: [bool; 5],
}

impl TradePrivileges {
    pub fn grant(&mut self, port: PortKind) {
        match port {
            PortKind::Generic => self.generic = true,
            PortKind::Specific(resource) => self.specific[resource.index()] = true,
        }
    }

    pub fn has(&self, port: PortKind) -> bool {
        match port {
            PortKind::Generic => self.generic,
            PortKind::Specific(resource) => self.specific[resource.index()],
        }
    }

    /// Bank exchange rate when giving `resource`
    pub fn rate_for(&self, resource: Resource) -> u32 {
        if self.has(PortKind::Specific(resource)) {
            2
        } else if self.generic {
            3
        } else {
            4
        }
    }
}

/// Development card types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevelopmentCard {
    /// Move the robber and steal; counts toward Largest Army
    Knight,
    /// Worth 1 point while held, never played
    Point,
    /// Collect every opponent's holding of one resource
    Monopoly,
    /// Build 2 roads for free
    RoadBuilding,
    /// Take any 2 resources from the bank
    Plenty,
}

impl DevelopmentCard {
    /// Whether this card can be played (Point cards are never played)
    pub fn is_playable(&self) -> bool {
        !matches!(self, DevelopmentCard::Point)
    }
}

/// Undrawn development cards. Draws are uniform without replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentDeck {
    cards: Vec<DevelopmentCard>,
}

impl DevelopmentDeck {
    /// The standard 25-card deck
    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(25);

        // 14 Knights
        cards.extend(std::iter::repeat(DevelopmentCard::Knight).take(14));

        // 5 Points
        cards.extend(std::iter::repeat(DevelopmentCard::Point).take(5));

        // 2 each of the rest
        cards.extend(std::iter::repeat(DevelopmentCard::Monopoly).take(2));
        cards.extend(std::iter::repeat(DevelopmentCard::RoadBuilding).take(2));
        cards.extend(std::iter::repeat(DevelopmentCard::Plenty).take(2));

        Self { cards }
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Remove and return a uniformly random card
    pub fn draw<R: Rng>(&mut self, rng: &mut R) -> Option<DevelopmentCard> {
        if self.cards.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.cards.len());
        Some(self.cards.swap_remove(index))
    }
}

impl Default for DevelopmentDeck {
    fn default() -> Self {
        Self::standard()
    }
}

/// A single player's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub seat: Seat,
    /// Display name
    pub name: String,
    /// Current resources
    pub resources: ResourceHand,
    /// Development cards usable from this turn on
    pub dev_cards: Vec<DevelopmentCard>,
    /// Development cards bought this turn (usable from the next turn)
    pub dev_cards_bought_this_turn: Vec<DevelopmentCard>,
    /// Every card ever drawn; never shrinks
    pub drawn_cards: Vec<DevelopmentCard>,
    /// Port privileges
    pub privileges: TradePrivileges,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
    pub settlements_remaining: u32,
    pub cities_remaining: u32,
    pub roads_remaining: u32,
}

impl Player {
    /// Create a new player
    pub fn new(seat: Seat, name: String) -> Self {
        Self {
            seat,
            name,
            resources: ResourceHand::new(),
            dev_cards: Vec::new(),
            dev_cards_bought_this_turn: Vec::new(),
            drawn_cards: Vec::new(),
            privileges: TradePrivileges::default(),
            has_longest_road: false,
            has_largest_army: false,
            settlements_remaining: MAX_SETTLEMENTS,
            cities_remaining: MAX_CITIES,
            roads_remaining: MAX_ROADS,
        }
    }

    /// Army size: Knight cards ever drawn
    pub fn army_size(&self) -> u32 {
        self.drawn_cards
            .iter()
            .filter(|c| matches!(c, DevelopmentCard::Knight))
            .count() as u32
    }

    /// Point cards held (never played, so equal to those drawn)
    pub fn point_cards(&self) -> u32 {
        self.dev_cards
            .iter()
            .chain(&self.dev_cards_bought_this_turn)
            .filter(|c| matches!(c, DevelopmentCard::Point))
            .count() as u32
    }

    /// Points from cards and bonuses; structures are counted by the game
    pub fn bonus_points(&self) -> u32 {
        let mut points = self.point_cards();
        if self.has_longest_road {
            points += 2;
        }
        if self.has_largest_army {
            points += 2;
        }
        points
    }

    pub fn can_build_road(&self) -> bool {
        self.resources.can_afford(&costs::road())
    }

    pub fn can_build_settlement(&self) -> bool {
        self.resources.can_afford(&costs::settlement())
    }

    pub fn can_build_city(&self) -> bool {
        self.resources.can_afford(&costs::city())
    }

    pub fn can_buy_dev_card(&self) -> bool {
        self.resources.can_afford(&costs::development_card())
    }

    /// Record a freshly drawn card
    pub fn receive_dev_card(&mut self, card: DevelopmentCard) {
        self.dev_cards_bought_this_turn.push(card);
        self.drawn_cards.push(card);
    }

    /// Remove one usable copy of `card`. Returns false if none is held.
    pub fn consume_dev_card(&mut self, card: DevelopmentCard) -> bool {
        match self.dev_cards.iter().position(|c| *c == card) {
            Some(index) => {
                self.dev_cards.remove(index);
                true
            }
            None => false,
        }
    }

    /// Called at end of turn - move bought cards to the usable pile
    pub fn end_turn(&mut self) {
        self.dev_cards.append(&mut self.dev_cards_bought_this_turn);
    }
}
