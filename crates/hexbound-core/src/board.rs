//! Board tiles, resources, ports and the robber.
//!
//! This module contains:
//! - Resource and port kinds
//! - Tile kinds and the fixed 7-row board shape
//! - Randomized standard board generation
//! - Tile queries used by placement, production and the robber

use crate::grid::{Intersection, TileCoord, TopologyError, ROW_LENGTHS};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Seat index of a player (0 up to the session size).
pub type Seat = u8;

/// Resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resource {
    Rock,
    Brick,
    Sheep,
    Wheat,
    Wood,
}

impl Resource {
    /// All resource types
    pub const ALL: [Resource; 5] = [
        Resource::Rock,
        Resource::Brick,
        Resource::Sheep,
        Resource::Wheat,
        Resource::Wood,
    ];

    /// Stable index, used for per-resource flag arrays
    pub fn index(&self) -> usize {
        match self {
            Resource::Rock => 0,
            Resource::Brick => 1,
            Resource::Sheep => 2,
            Resource::Wheat => 3,
            Resource::Wood => 4,
        }
    }
}

/// Trade kind printed on a port tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// 3:1 for any resource
    Generic,
    /// 2:1 for one resource
    Specific(Resource),
}

impl PortKind {
    /// The bank exchange rate this port grants
    pub fn rate(&self) -> u32 {
        match self {
            PortKind::Generic => 3,
            PortKind::Specific(_) => 2,
        }
    }

    /// Port kinds on a standard board
    pub fn standard_set() -> Vec<PortKind> {
        let mut ports: Vec<PortKind> = Resource::ALL.iter().map(|&r| PortKind::Specific(r)).collect();
        ports.extend(std::iter::repeat(PortKind::Generic).take(4));
        ports
    }
}

/// Type of a board tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Sea,
    Port(PortKind),
    /// Produces `resource` whenever `number` is rolled
    Resource { resource: Resource, number: u8 },
    Desert,
}

impl TileKind {
    /// Land tiles are where the robber may stand
    pub fn is_land(&self) -> bool {
        matches!(self, TileKind::Resource { .. } | TileKind::Desert)
    }
}

/// A single tile with its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub coord: TileCoord,
    pub kind: TileKind,
}

/// Slot types of the fixed board shape.
/// `P` = port, `S` = sea, `L` = land (resource or desert).
const SHAPE: [&str; 7] = [
    "PSPS",
    "SLLLP",
    "PLLLLS",
    "SLLLLLP",
    "PLLLLS",
    "SLLLP",
    "PSPS",
];

/// Resource tile counts: 3 Rock, 3 Brick, 4 Sheep, 4 Wheat, 4 Wood.
const RESOURCE_COUNTS: [(Resource, usize); 5] = [
    (Resource::Rock, 3),
    (Resource::Brick, 3),
    (Resource::Sheep, 4),
    (Resource::Wheat, 4),
    (Resource::Wood, 4),
];

/// Production numbers handed out to resource tiles.
pub const PRODUCTION_NUMBERS: [u8; 18] = [2, 3, 3, 4, 4, 5, 5, 6, 6, 8, 8, 9, 9, 10, 10, 11, 11, 12];

/// What an intersection's tiles offer to a structure built there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionYield {
    /// Resource and production number of each resource tile
    pub resources: Vec<(Resource, u8)>,
    /// Port kinds among the tiles
    pub ports: Vec<PortKind>,
}

/// The game board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Tiles row by row, following `ROW_LENGTHS`
    rows: Vec<Vec<Tile>>,
    /// Tile currently holding the robber
    robber: TileCoord,
}

impl Board {
    /// Create a randomized standard board
    pub fn standard() -> Self {
        let mut rng = rand::thread_rng();
        Self::standard_with_rng(&mut rng)
    }

    /// Create a randomized standard board using the given RNG
    pub fn standard_with_rng<R: Rng>(rng: &mut R) -> Self {
        let mut numbers = PRODUCTION_NUMBERS.to_vec();
        numbers.shuffle(rng);

        // Numbers go to resource tiles only; the desert is added afterwards
        let mut land: Vec<TileKind> = RESOURCE_COUNTS
            .iter()
            .flat_map(|&(resource, count)| std::iter::repeat(resource).take(count))
            .zip(numbers)
            .map(|(resource, number)| TileKind::Resource { resource, number })
            .collect();
        land.push(TileKind::Desert);
        land.shuffle(rng);

        let mut ports = PortKind::standard_set();
        ports.shuffle(rng);

        let mut land = land.into_iter();
        let mut ports = ports.into_iter();
        let mut robber = TileCoord::new(3, 3);

        let rows = SHAPE
            .iter()
            .enumerate()
            .map(|(row, slots)| {
                slots
                    .chars()
                    .enumerate()
                    .map(|(col, slot)| {
                        let coord = TileCoord::new(row as u8, col as u8);
                        let kind = match slot {
                            'P' => ports.next().map_or(TileKind::Sea, TileKind::Port),
                            'L' => land.next().unwrap_or(TileKind::Desert),
                            _ => TileKind::Sea,
                        };
                        if kind == TileKind::Desert {
                            robber = coord;
                        }
                        Tile { coord, kind }
                    })
                    .collect()
            })
            .collect();

        Self { rows, robber }
    }

    /// Build a board from explicit tile kinds, row by row.
    ///
    /// Rows must match the standard shape and contain exactly one desert,
    /// which receives the robber.
    pub fn from_kinds(kinds: Vec<Vec<TileKind>>) -> Result<Self, TopologyError> {
        if kinds.len() != ROW_LENGTHS.len()
            || kinds.iter().zip(ROW_LENGTHS).any(|(row, len)| row.len() != len)
        {
            return Err(TopologyError::BadShape);
        }
        let rows: Vec<Vec<Tile>> = kinds
            .into_iter()
            .enumerate()
            .map(|(row, kinds)| {
                kinds
                    .into_iter()
                    .enumerate()
                    .map(|(col, kind)| Tile {
                        coord: TileCoord::new(row as u8, col as u8),
                        kind,
                    })
                    .collect()
            })
            .collect();
        let deserts: Vec<TileCoord> = rows
            .iter()
            .flatten()
            .filter(|tile| tile.kind == TileKind::Desert)
            .map(|tile| tile.coord)
            .collect();
        match deserts.as_slice() {
            [robber] => Ok(Self { robber: *robber, rows }),
            _ => Err(TopologyError::BadShape),
        }
    }

    /// Tile kinds row by row, the inverse of `from_kinds`
    pub fn kinds(&self) -> Vec<Vec<TileKind>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|tile| tile.kind).collect())
            .collect()
    }

    pub fn tile(&self, coord: &TileCoord) -> Option<&Tile> {
        self.rows.get(coord.row as usize)?.get(coord.col as usize)
    }

    /// All tiles in row-major order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.rows.iter().flatten()
    }

    /// Tile currently holding the robber
    pub fn robber(&self) -> TileCoord {
        self.robber
    }

    /// Move the robber. Callers validate the target with `is_robber_candidate`.
    pub fn set_robber(&mut self, coord: TileCoord) {
        self.robber = coord;
    }

    /// Every tile the robber may stand on (desert or resource)
    pub fn robber_candidates(&self) -> Vec<TileCoord> {
        self.tiles()
            .filter(|tile| tile.kind.is_land())
            .map(|tile| tile.coord)
            .collect()
    }

    pub fn is_robber_candidate(&self, coord: &TileCoord) -> bool {
        self.tile(coord).is_some_and(|tile| tile.kind.is_land())
    }

    /// Resource/number pairs and port kinds among an intersection's tiles
    pub fn resources_of(&self, point: &Intersection) -> IntersectionYield {
        let mut result = IntersectionYield::default();
        for coord in point.tiles() {
            match self.tile(&coord).map(|tile| tile.kind) {
                Some(TileKind::Resource { resource, number }) => {
                    result.resources.push((resource, number))
                }
                Some(TileKind::Port(kind)) => result.ports.push(kind),
                _ => {}
            }
        }
        result
    }

    /// Resource tiles numbered `roll`, excluding the robber's tile
    pub fn producing_tiles(&self, roll: u8) -> Vec<(TileCoord, Resource)> {
        self.tiles()
            .filter(|tile| tile.coord != self.robber)
            .filter_map(|tile| match tile.kind {
                TileKind::Resource { resource, number } if number == roll => {
                    Some((tile.coord, resource))
                }
                _ => None,
            })
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}
