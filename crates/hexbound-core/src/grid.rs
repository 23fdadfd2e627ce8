//! Tile, intersection and edge addressing for the board grid.
//!
//! The board is a hexagon of hex tiles laid out in seven offset rows of
//! lengths 4, 5, 6, 7, 6, 5, 4 (the outer ring is sea and ports). Tiles are
//! addressed by `(row, col)`:
//! - `TileCoord`: identifies a single tile
//! - `Intersection`: the three tiles meeting at a corner, where settlements
//!   and cities go
//! - `Edge`: two adjacent intersections, where roads go
//!
//! Intersections and edges are stored in sorted (canonical) form, so the same
//! point described with its tiles in any order compares equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Number of tiles in each row, top to bottom.
pub const ROW_LENGTHS: [usize; 7] = [4, 5, 6, 7, 6, 5, 4];

/// Number of rows on the board.
pub const ROWS: usize = ROW_LENGTHS.len();

/// Errors raised when building an address from raw coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("tile ({0}, {1}) is outside the board")]
    OutOfBounds(i32, i32),

    #[error("an intersection needs 3 distinct tiles, got {0}")]
    TileCount(usize),

    #[error("tiles do not meet at a single point")]
    NotAnIntersection,

    #[error("an edge needs 2 adjacent intersections")]
    NotAnEdge,

    #[error("board rows have the wrong shape")]
    BadShape,
}

/// Length of a row, if the row exists.
fn row_len(row: i32) -> Option<usize> {
    usize::try_from(row).ok().and_then(|r| ROW_LENGTHS.get(r).copied())
}

/// Position of one tile in the offset-row grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub row: u8,
    pub col: u8,
}

impl TileCoord {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Build a coordinate from signed values, returning `None` when it falls
    /// off the board.
    pub fn checked(row: i32, col: i32) -> Option<Self> {
        let len = row_len(row)?;
        if col < 0 || col as usize >= len {
            return None;
        }
        Some(Self::new(row as u8, col as u8))
    }

    /// Every tile on the board in row-major order.
    pub fn all() -> impl Iterator<Item = TileCoord> {
        ROW_LENGTHS
            .iter()
            .enumerate()
            .flat_map(|(row, &len)| (0..len).map(move |col| TileCoord::new(row as u8, col as u8)))
    }

    /// The two tiles of `other_row` touching this tile.
    ///
    /// When the other row is longer, it is shifted half a tile to the left,
    /// so this tile touches columns `col` and `col + 1` there; when it is
    /// shorter, columns `col - 1` and `col`.
    fn vertical_neighbors(&self, other_row: i32) -> [Option<TileCoord>; 2] {
        let (Some(here), Some(there)) = (row_len(self.row as i32), row_len(other_row)) else {
            return [None, None];
        };
        let col = self.col as i32;
        if there > here {
            [
                TileCoord::checked(other_row, col),
                TileCoord::checked(other_row, col + 1),
            ]
        } else {
            [
                TileCoord::checked(other_row, col - 1),
                TileCoord::checked(other_row, col),
            ]
        }
    }

    /// All in-bounds tiles sharing a border with this one.
    pub fn neighbors(&self) -> Vec<TileCoord> {
        let row = self.row as i32;
        let col = self.col as i32;
        let [up_left, up_right] = self.vertical_neighbors(row - 1);
        let [down_left, down_right] = self.vertical_neighbors(row + 1);
        [
            TileCoord::checked(row, col - 1),
            up_left,
            up_right,
            TileCoord::checked(row, col + 1),
            down_right,
            down_left,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_adjacent(&self, other: &TileCoord) -> bool {
        self.neighbors().contains(other)
    }
}

/// A corner of the board: the three tiles that meet there, sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<TileCoord>", into = "Vec<TileCoord>")]
pub struct Intersection {
    tiles: [TileCoord; 3],
}

impl Intersection {
    /// Build an intersection from three tiles in any order.
    pub fn new(a: TileCoord, b: TileCoord, c: TileCoord) -> Result<Self, TopologyError> {
        let mut tiles = [a, b, c];
        tiles.sort();
        if tiles[0] == tiles[1] || tiles[1] == tiles[2] {
            return Err(TopologyError::TileCount(2));
        }
        for tile in &tiles {
            if TileCoord::checked(tile.row as i32, tile.col as i32).is_none() {
                return Err(TopologyError::OutOfBounds(tile.row as i32, tile.col as i32));
            }
        }
        let [x, y, z] = tiles;
        if !(x.is_adjacent(&y) && y.is_adjacent(&z) && x.is_adjacent(&z)) {
            return Err(TopologyError::NotAnIntersection);
        }
        Ok(Self { tiles })
    }

    /// The three tiles, in canonical order.
    pub fn tiles(&self) -> [TileCoord; 3] {
        self.tiles
    }

    /// Whether `tile` is one of the three tiles meeting here.
    pub fn touches(&self, tile: &TileCoord) -> bool {
        self.tiles.contains(tile)
    }

    /// Every intersection on the board, sorted.
    pub fn all() -> Vec<Intersection> {
        let mut found = BTreeSet::new();
        for tile in TileCoord::all() {
            let neighbors = tile.neighbors();
            for (i, first) in neighbors.iter().enumerate() {
                for second in &neighbors[i + 1..] {
                    if let Ok(point) = Intersection::new(tile, *first, *second) {
                        found.insert(point);
                    }
                }
            }
        }
        found.into_iter().collect()
    }

    /// Intersections one road-length away.
    ///
    /// Two of the three tiles share a row; the remaining "odd" tile sits one
    /// row above or below them. Walking along the border between the odd tile
    /// and a row tile reaches the corner completed by the odd tile's
    /// horizontal neighbor on that side. Walking along the border between the
    /// two row tiles reaches the corner completed by the tile they share in
    /// the row on the far side from the odd tile.
    pub fn adjacent(&self) -> Vec<Intersection> {
        let [a, b, c] = self.tiles;
        // Sorting by (row, col) puts the odd tile first or last.
        let (odd, left, right) = if a.row == b.row { (c, a, b) } else { (a, b, c) };

        let mut result = Vec::with_capacity(3);
        let odd_row = odd.row as i32;
        let odd_col = odd.col as i32;

        if let Some(border) = TileCoord::checked(odd_row, odd_col - 1) {
            if let Ok(point) = Intersection::new(odd, left, border) {
                result.push(point);
            }
        }
        if let Some(border) = TileCoord::checked(odd_row, odd_col + 1) {
            if let Ok(point) = Intersection::new(odd, right, border) {
                result.push(point);
            }
        }

        let pair_row = left.row as i32;
        let far_row = 2 * pair_row - odd_row;
        if let (Some(far_len), Some(pair_len)) = (row_len(far_row), row_len(pair_row)) {
            let shift = if far_len > pair_len { 1 } else { 0 };
            if let Some(border) = TileCoord::checked(far_row, left.col as i32 + shift) {
                if let Ok(point) = Intersection::new(border, left, right) {
                    result.push(point);
                }
            }
        }

        result
    }

    pub fn is_adjacent_to(&self, other: &Intersection) -> bool {
        self.adjacent().contains(other)
    }
}

impl TryFrom<Vec<TileCoord>> for Intersection {
    type Error = TopologyError;

    fn try_from(tiles: Vec<TileCoord>) -> Result<Self, Self::Error> {
        match tiles.as_slice() {
            [a, b, c] => Intersection::new(*a, *b, *c),
            other => Err(TopologyError::TileCount(other.len())),
        }
    }
}

impl From<Intersection> for Vec<TileCoord> {
    fn from(point: Intersection) -> Self {
        point.tiles.to_vec()
    }
}

/// A road slot: two adjacent intersections, sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Intersection>", into = "Vec<Intersection>")]
pub struct Edge {
    ends: [Intersection; 2],
}

impl Edge {
    /// Build an edge from two intersections in any order.
    pub fn new(a: Intersection, b: Intersection) -> Result<Self, TopologyError> {
        if !a.is_adjacent_to(&b) {
            return Err(TopologyError::NotAnEdge);
        }
        let ends = if a < b { [a, b] } else { [b, a] };
        Ok(Self { ends })
    }

    pub fn endpoints(&self) -> [Intersection; 2] {
        self.ends
    }

    pub fn touches(&self, point: &Intersection) -> bool {
        self.ends.contains(point)
    }

    /// The endpoint that is not `point`, if `point` is an endpoint.
    pub fn other_end(&self, point: &Intersection) -> Option<Intersection> {
        match self.ends {
            [a, b] if a == *point => Some(b),
            [a, b] if b == *point => Some(a),
            _ => None,
        }
    }

    /// The single endpoint shared with `other`. Identical edges share two
    /// endpoints and are not connected.
    pub fn shared_endpoint(&self, other: &Edge) -> Option<Intersection> {
        if self == other {
            return None;
        }
        self.ends.into_iter().find(|end| other.touches(end))
    }

    pub fn is_connected_to(&self, other: &Edge) -> bool {
        self.shared_endpoint(other).is_some()
    }
}

impl TryFrom<Vec<Intersection>> for Edge {
    type Error = TopologyError;

    fn try_from(ends: Vec<Intersection>) -> Result<Self, Self::Error> {
        match ends.as_slice() {
            [a, b] => Edge::new(*a, *b),
            _ => Err(TopologyError::NotAnEdge),
        }
    }
}

impl From<Edge> for Vec<Intersection> {
    fn from(edge: Edge) -> Self {
        edge.ends.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(row: u8, col: u8) -> TileCoord {
        TileCoord::new(row, col)
    }

    #[test]
    fn test_tile_count() {
        assert_eq!(TileCoord::all().count(), 37);
    }

    #[test]
    fn test_interior_tile_has_six_neighbors() {
        for tile in [t(3, 3), t(2, 2), t(4, 2), t(1, 1), t(5, 2)] {
            assert_eq!(tile.neighbors().len(), 6, "{:?}", tile);
        }
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        for tile in TileCoord::all() {
            for neighbor in tile.neighbors() {
                assert!(neighbor.is_adjacent(&tile), "{:?} / {:?}", tile, neighbor);
            }
        }
    }

    #[test]
    fn test_neighbors_across_middle_row() {
        // Above the middle row the row is shorter; below too.
        let mut up = t(3, 2).neighbors();
        up.sort();
        assert_eq!(up, vec![t(2, 1), t(2, 2), t(3, 1), t(3, 3), t(4, 1), t(4, 2)]);
    }

    #[test]
    fn test_board_has_54_intersections() {
        assert_eq!(Intersection::all().len(), 54);
    }

    #[test]
    fn test_intersection_order_independent() {
        let a = Intersection::new(t(1, 1), t(2, 1), t(1, 2)).unwrap();
        let b = Intersection::new(t(1, 2), t(1, 1), t(2, 1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_meeting_tiles_rejected() {
        assert_eq!(
            Intersection::new(t(0, 0), t(0, 1), t(0, 2)),
            Err(TopologyError::NotAnIntersection)
        );
        assert!(Intersection::new(t(0, 0), t(0, 0), t(1, 0)).is_err());
    }

    #[test]
    fn test_interior_intersection_has_three_neighbors() {
        let point = Intersection::new(t(3, 3), t(2, 2), t(3, 2)).unwrap();
        let adjacent = point.adjacent();
        assert_eq!(adjacent.len(), 3);
        for other in &adjacent {
            assert_ne!(*other, point);
            assert!(other.is_adjacent_to(&point), "adjacency must be symmetric");
            // Neighbors share exactly two tiles.
            let shared = other.tiles().iter().filter(|tile| point.touches(tile)).count();
            assert_eq!(shared, 2);
        }
    }

    #[test]
    fn test_adjacency_symmetric_everywhere() {
        for point in Intersection::all() {
            for other in point.adjacent() {
                assert!(other.is_adjacent_to(&point), "{:?} -> {:?}", point, other);
            }
        }
    }

    #[test]
    fn test_adjacency_in_lower_half() {
        // Odd tile below, rows shrinking.
        let point = Intersection::new(t(4, 0), t(3, 0), t(3, 1)).unwrap();
        let mut adjacent = point.adjacent();
        adjacent.sort();
        let mut expected = vec![
            Intersection::new(t(4, 0), t(3, 1), t(4, 1)).unwrap(),
            Intersection::new(t(2, 0), t(3, 0), t(3, 1)).unwrap(),
        ];
        expected.sort();
        assert_eq!(adjacent, expected);
    }

    #[test]
    fn test_edge_canonical() {
        let a = Intersection::new(t(3, 3), t(2, 2), t(3, 2)).unwrap();
        let b = a.adjacent()[0];
        assert_eq!(Edge::new(a, b).unwrap(), Edge::new(b, a).unwrap());
    }

    #[test]
    fn test_edge_rejects_distant_points() {
        let a = Intersection::new(t(0, 0), t(1, 0), t(1, 1)).unwrap();
        let b = Intersection::new(t(5, 0), t(6, 0), t(5, 1)).unwrap();
        assert_eq!(Edge::new(a, b), Err(TopologyError::NotAnEdge));
    }

    #[test]
    fn test_edge_connection_needs_one_shared_end() {
        let a = Intersection::new(t(3, 3), t(2, 2), t(3, 2)).unwrap();
        let [b, c, _] = [a.adjacent()[0], a.adjacent()[1], a.adjacent()[2]];
        let first = Edge::new(a, b).unwrap();
        let second = Edge::new(a, c).unwrap();
        assert!(first.is_connected_to(&second));
        assert!(!first.is_connected_to(&first));
        assert_eq!(first.shared_endpoint(&second), Some(a));
        assert_eq!(first.other_end(&a), Some(b));
    }

    #[test]
    fn test_intersection_json_accepts_any_order() {
        let json = r#"[{"row":2,"col":1},{"row":1,"col":1},{"row":1,"col":2}]"#;
        let parsed: Intersection = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, Intersection::new(t(1, 1), t(1, 2), t(2, 1)).unwrap());

        let bad = r#"[{"row":0,"col":0},{"row":6,"col":0},{"row":3,"col":3}]"#;
        assert!(serde_json::from_str::<Intersection>(bad).is_err());
    }
}
