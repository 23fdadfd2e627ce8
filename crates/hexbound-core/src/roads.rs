//! Longest road computation.
//!
//! A player's roads form a graph over intersections. The longest road is the
//! longest branch that can be walked over distinct roads where no
//! intersection is passed a third time: a branch may close a loop, but never
//! walks through it again.

use crate::grid::{Edge, Intersection};
use std::collections::BTreeMap;

/// Arena form of a set of roads: edges `0..n`, vertices indexed in order of
/// first appearance, adjacency lists from vertex to edge indices.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    ends: Vec<[usize; 2]>,
    adjacency: Vec<Vec<usize>>,
}

/// One step of the explicit DFS stack.
struct Step {
    edge: usize,
    /// Vertex at the tail of the branch
    tip: usize,
    /// Next entry of `adjacency[tip]` to try
    cursor: usize,
}

impl RoadNetwork {
    pub fn new(roads: &[Edge]) -> Self {
        let mut index: BTreeMap<Intersection, usize> = BTreeMap::new();
        let mut network = Self::default();
        for (edge_id, road) in roads.iter().enumerate() {
            let mut ends = [0; 2];
            for (slot, point) in road.endpoints().into_iter().enumerate() {
                let next = index.len();
                let vertex = *index.entry(point).or_insert(next);
                if vertex == network.adjacency.len() {
                    network.adjacency.push(Vec::new());
                }
                network.adjacency[vertex].push(edge_id);
                ends[slot] = vertex;
            }
            network.ends.push(ends);
        }
        network
    }

    pub fn road_count(&self) -> usize {
        self.ends.len()
    }

    /// Length of the longest branch, seeded from every road
    pub fn longest(&self) -> u32 {
        let mut in_branch = vec![false; self.ends.len()];
        let mut uses = vec![0u8; self.adjacency.len()];
        let mut best = 0;
        for seed in 0..self.ends.len() {
            for tip in self.ends[seed] {
                best = best.max(self.explore(seed, tip, &mut in_branch, &mut uses));
            }
        }
        best
    }

    /// Longest branch starting with `seed` and growing from its `tip` end.
    fn explore(&self, seed: usize, tip: usize, in_branch: &mut [bool], uses: &mut [u8]) -> u32 {
        let mut stack = vec![Step {
            edge: seed,
            tip,
            cursor: 0,
        }];
        in_branch[seed] = true;
        for vertex in self.ends[seed] {
            uses[vertex] += 1;
        }
        let mut best = 1;

        while let Some(step) = stack.last_mut() {
            let Some(&next) = self.adjacency[step.tip].get(step.cursor) else {
                let done = stack.pop();
                if let Some(done) = done {
                    in_branch[done.edge] = false;
                    for vertex in self.ends[done.edge] {
                        uses[vertex] -= 1;
                    }
                }
                continue;
            };
            step.cursor += 1;

            let tip = step.tip;
            // A tip used twice closed a loop; the branch ends there.
            if in_branch[next] || uses[tip] >= 2 {
                continue;
            }
            let [a, b] = self.ends[next];
            let far = if a == tip { b } else { a };
            if uses[far] >= 2 {
                continue;
            }

            in_branch[next] = true;
            uses[tip] += 1;
            uses[far] += 1;
            stack.push(Step {
                edge: next,
                tip: far,
                cursor: 0,
            });
            best = best.max(stack.len() as u32);
        }

        best
    }
}

/// Longest road length over a player's roads
pub fn longest_road(roads: &[Edge]) -> u32 {
    RoadNetwork::new(roads).longest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileCoord;
    use pretty_assertions::assert_eq;

    /// Intersections along the border between row `upper` and the row
    /// below it, in walking order. Consecutive points are adjacent.
    fn seam(upper: u8) -> Vec<Intersection> {
        let on_seam: Vec<Intersection> = Intersection::all()
            .into_iter()
            .filter(|p| p.tiles().iter().all(|t| t.row == upper || t.row == upper + 1))
            .collect();
        let neighbors_on_seam =
            |p: &Intersection| on_seam.iter().filter(|q| p.is_adjacent_to(q)).count();
        let mut here = *on_seam.iter().find(|p| neighbors_on_seam(p) == 1).unwrap();
        let mut walk = vec![here];
        while let Some(next) = on_seam
            .iter()
            .find(|q| here.is_adjacent_to(q) && !walk.contains(q))
        {
            walk.push(*next);
            here = *next;
        }
        walk
    }

    fn path(points: &[Intersection]) -> Vec<Edge> {
        points
            .windows(2)
            .map(|pair| Edge::new(pair[0], pair[1]).unwrap())
            .collect()
    }

    /// Six edges around one land tile
    fn ring(tile: TileCoord) -> Vec<Edge> {
        let corners: Vec<Intersection> = Intersection::all()
            .into_iter()
            .filter(|p| p.touches(&tile))
            .collect();
        let mut edges = Vec::new();
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                if a.is_adjacent_to(b) {
                    edges.push(Edge::new(*a, *b).unwrap());
                }
            }
        }
        edges
    }

    #[test]
    fn test_seam_helper() {
        // Rows of 6 and 7 tiles meet in 11 corners
        assert_eq!(seam(2).len(), 11);
        assert_eq!(seam(4).len(), 9);
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(longest_road(&[]), 0);
        let single = path(&seam(2)[..2]);
        assert_eq!(longest_road(&single), 1);
    }

    #[test]
    fn test_straight_chain() {
        let points = seam(2);
        for len in 1..=10 {
            let roads = path(&points[..=len]);
            assert_eq!(longest_road(&roads), len as u32);
        }
    }

    #[test]
    fn test_chain_in_any_order() {
        let mut roads = path(&seam(2)[..6]);
        roads.reverse();
        roads.swap(1, 3);
        assert_eq!(longest_road(&roads), 5);
    }

    #[test]
    fn test_disconnected_single_road_does_not_add() {
        let mut roads = path(&seam(1)[..6]);
        let stray = path(&seam(4)[..2]);
        roads.insert(0, stray[0]);
        assert_eq!(roads.len(), 6);
        assert_eq!(longest_road(&roads), 5);
    }

    #[test]
    fn test_three_way_fork() {
        let points = seam(2);
        let hub = points[6];
        let side = hub
            .adjacent()
            .into_iter()
            .find(|p| !points.contains(p))
            .unwrap();
        // Arms of 3, 2 and 1 roads
        let mut roads = path(&points[3..=6]);
        roads.extend(path(&points[6..=8]));
        roads.push(Edge::new(hub, side).unwrap());
        assert_eq!(roads.len(), 6);
        assert_eq!(longest_road(&roads), 5);
    }

    #[test]
    fn test_closed_ring() {
        let roads = ring(TileCoord::new(3, 3));
        assert_eq!(roads.len(), 6);
        assert_eq!(longest_road(&roads), 6);
    }

    #[test]
    fn test_ring_with_tail() {
        let mut roads = ring(TileCoord::new(3, 3));
        let corner = roads[0].endpoints()[0];
        let on_ring = |p: &Intersection| roads.iter().any(|r| r.touches(p));
        let outside = corner.adjacent().into_iter().find(|p| !on_ring(p)).unwrap();
        roads.push(Edge::new(corner, outside).unwrap());
        // The junction cannot be passed a third time
        assert_eq!(longest_road(&roads), 6);
    }

    #[test]
    fn test_network_indexes_shared_vertices() {
        let roads = path(&seam(2)[..4]);
        let network = RoadNetwork::new(&roads);
        assert_eq!(network.road_count(), 3);
        assert_eq!(network.adjacency.len(), 4);
    }
}
