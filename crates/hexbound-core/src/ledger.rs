//! Structures and roads placed on the board.
//!
//! The ledger is the per-session record of who built what where, plus the
//! placement rules that only depend on that record:
//! - at most one structure per intersection, and no structure directly
//!   next to another one (distance rule)
//! - at most one road per edge
//! - after setup, settlements and roads must extend the builder's own roads

use crate::board::{Resource, Seat};
use crate::grid::{Edge, Intersection, TileCoord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Settlement or city
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    Settlement,
    City,
}

impl StructureKind {
    /// Points this structure is worth
    pub fn points(&self) -> u32 {
        match self {
            StructureKind::Settlement => 1,
            StructureKind::City => 2,
        }
    }

    /// Resource multiplier for production
    pub fn multiplier(&self) -> u32 {
        match self {
            StructureKind::Settlement => 1,
            StructureKind::City => 2,
        }
    }
}

/// A settlement or city on an intersection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub owner: Seat,
    pub position: Intersection,
    pub kind: StructureKind,
    /// Resource and production number of each neighboring resource tile
    pub yields: Vec<(Resource, u8)>,
}

impl Structure {
    pub fn touches(&self, tile: &TileCoord) -> bool {
        self.position.touches(tile)
    }
}

/// A road on an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Road {
    pub owner: Seat,
    pub position: Edge,
}

/// Every structure and road in a session, in build order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub structures: Vec<Structure>,
    pub roads: Vec<Road>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Queries ====================

    pub fn structure_at(&self, point: &Intersection) -> Option<&Structure> {
        self.structures.iter().find(|s| s.position == *point)
    }

    pub fn road_at(&self, edge: &Edge) -> Option<&Road> {
        self.roads.iter().find(|r| r.position == *edge)
    }

    pub fn structures_of(&self, seat: Seat) -> impl Iterator<Item = &Structure> {
        self.structures.iter().filter(move |s| s.owner == seat)
    }

    /// A player's roads in build order
    pub fn roads_of(&self, seat: Seat) -> Vec<Edge> {
        self.roads
            .iter()
            .filter(|r| r.owner == seat)
            .map(|r| r.position)
            .collect()
    }

    pub fn count(&self, seat: Seat, kind: StructureKind) -> u32 {
        self.structures_of(seat).filter(|s| s.kind == kind).count() as u32
    }

    /// Points from structures: 1 per settlement, 2 per city
    pub fn structure_points(&self, seat: Seat) -> u32 {
        self.structures_of(seat).map(|s| s.kind.points()).sum()
    }

    /// Structures bordering `tile`
    pub fn structures_touching<'a>(
        &'a self,
        tile: &'a TileCoord,
    ) -> impl Iterator<Item = &'a Structure> + 'a {
        self.structures.iter().filter(move |s| s.touches(tile))
    }

    /// Owners of structures bordering `tile`
    pub fn owners_touching(&self, tile: &TileCoord) -> BTreeSet<Seat> {
        self.structures_touching(tile).map(|s| s.owner).collect()
    }

    /// Distance rule: the intersection and all of its neighbors are empty
    pub fn is_isolated(&self, point: &Intersection) -> bool {
        self.structure_at(point).is_none()
            && point
                .adjacent()
                .iter()
                .all(|neighbor| self.structure_at(neighbor).is_none())
    }

    /// Distinct endpoints of a player's roads, in build order
    pub fn road_endpoints(&self, seat: Seat) -> Vec<Intersection> {
        let mut seen = BTreeSet::new();
        self.roads_of(seat)
            .iter()
            .flat_map(|edge| edge.endpoints())
            .filter(|point| seen.insert(*point))
            .collect()
    }

    // ==================== Placement rules ====================

    /// Setup placements: any isolated intersection on the board
    pub fn legal_initial_settlement_positions(&self) -> Vec<Intersection> {
        Intersection::all()
            .into_iter()
            .filter(|point| self.is_isolated(point))
            .collect()
    }

    /// Isolated endpoints of the player's roads
    pub fn legal_settlement_positions(&self, seat: Seat) -> Vec<Intersection> {
        self.road_endpoints(seat)
            .into_iter()
            .filter(|point| self.is_isolated(point))
            .collect()
    }

    /// Unoccupied edges leaving an endpoint of the player's roads
    pub fn legal_road_positions(&self, seat: Seat) -> Vec<Edge> {
        let mut result = Vec::new();
        for point in self.road_endpoints(seat) {
            for neighbor in point.adjacent() {
                let Ok(edge) = Edge::new(point, neighbor) else {
                    continue;
                };
                if self.road_at(&edge).is_none() && !result.contains(&edge) {
                    result.push(edge);
                }
            }
        }
        result
    }

    /// Intersections holding the player's settlements
    pub fn legal_city_positions(&self, seat: Seat) -> Vec<Intersection> {
        self.structures_of(seat)
            .filter(|s| s.kind == StructureKind::Settlement)
            .map(|s| s.position)
            .collect()
    }

    // ==================== Mutations ====================
    // Callers check legality first.

    pub fn place_settlement(&mut self, seat: Seat, position: Intersection, yields: Vec<(Resource, u8)>) {
        self.structures.push(Structure {
            owner: seat,
            position,
            kind: StructureKind::Settlement,
            yields,
        });
    }

    /// Upgrade the player's own settlement. Returns false, changing nothing,
    /// if there is none at `position`.
    pub fn upgrade_to_city(&mut self, seat: Seat, position: &Intersection) -> bool {
        match self.structures.iter_mut().find(|s| {
            s.position == *position && s.owner == seat && s.kind == StructureKind::Settlement
        }) {
            Some(structure) => {
                structure.kind = StructureKind::City;
                true
            }
            None => false,
        }
    }

    pub fn place_road(&mut self, seat: Seat, position: Edge) {
        self.roads.push(Road {
            owner: seat,
            position,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point(a: (u8, u8), b: (u8, u8), c: (u8, u8)) -> Intersection {
        Intersection::new(
            TileCoord::new(a.0, a.1),
            TileCoord::new(b.0, b.1),
            TileCoord::new(c.0, c.1),
        )
        .unwrap()
    }

    fn center() -> Intersection {
        point((2, 2), (3, 2), (3, 3))
    }

    #[test]
    fn test_distance_rule() {
        let mut ledger = Ledger::new();
        let all_before = ledger.legal_initial_settlement_positions().len();
        assert_eq!(all_before, 54);

        ledger.place_settlement(0, center(), Vec::new());
        let legal = ledger.legal_initial_settlement_positions();
        assert!(!legal.contains(&center()));
        for neighbor in center().adjacent() {
            assert!(!legal.contains(&neighbor));
        }
        assert_eq!(legal.len(), 54 - 1 - 3);
    }

    #[test]
    fn test_road_positions_extend_own_roads() {
        let mut ledger = Ledger::new();
        let here = center();
        let there = here.adjacent()[0];
        let first = Edge::new(here, there).unwrap();
        ledger.place_road(0, first);

        let legal = ledger.legal_road_positions(0);
        assert!(!legal.contains(&first));
        // 2 free edges at each endpoint of an interior road
        assert_eq!(legal.len(), 4);
        assert!(legal.iter().all(|edge| edge.is_connected_to(&first)));
        assert!(ledger.legal_road_positions(1).is_empty());
    }

    #[test]
    fn test_road_positions_skip_other_players_roads() {
        let mut ledger = Ledger::new();
        let here = center();
        let [a, b, c] = [here.adjacent()[0], here.adjacent()[1], here.adjacent()[2]];
        ledger.place_road(0, Edge::new(here, a).unwrap());
        ledger.place_road(1, Edge::new(here, b).unwrap());

        let legal = ledger.legal_road_positions(0);
        assert!(!legal.contains(&Edge::new(here, b).unwrap()));
        assert!(legal.contains(&Edge::new(here, c).unwrap()));
        for edge in &legal {
            assert!(ledger.road_at(edge).is_none());
        }
    }

    #[test]
    fn test_settlement_positions_need_road_and_distance() {
        let mut ledger = Ledger::new();
        let home = center();
        let step = home.adjacent()[0];
        let far = step
            .adjacent()
            .into_iter()
            .find(|p| *p != home && !home.is_adjacent_to(p))
            .unwrap();
        ledger.place_settlement(0, home, Vec::new());
        ledger.place_road(0, Edge::new(home, step).unwrap());
        assert!(ledger.legal_settlement_positions(0).is_empty());

        ledger.place_road(0, Edge::new(step, far).unwrap());
        assert_eq!(ledger.legal_settlement_positions(0), vec![far]);
    }

    #[test]
    fn test_city_upgrade_only_own_settlement() {
        let mut ledger = Ledger::new();
        ledger.place_settlement(1, center(), Vec::new());

        assert!(!ledger.upgrade_to_city(0, &center()));
        assert_eq!(ledger.structure_at(&center()).unwrap().kind, StructureKind::Settlement);

        assert_eq!(ledger.legal_city_positions(1), vec![center()]);
        assert!(ledger.upgrade_to_city(1, &center()));
        assert_eq!(ledger.count(1, StructureKind::Settlement), 0);
        assert_eq!(ledger.count(1, StructureKind::City), 1);
        assert_eq!(ledger.structure_points(1), 2);
        assert!(!ledger.upgrade_to_city(1, &center()));
    }

    #[test]
    fn test_owners_touching_tile() {
        let mut ledger = Ledger::new();
        ledger.place_settlement(2, center(), Vec::new());
        assert_eq!(
            ledger.owners_touching(&TileCoord::new(3, 3)),
            BTreeSet::from([2])
        );
        assert!(ledger.owners_touching(&TileCoord::new(0, 0)).is_empty());
    }
}
