//! Phase 2's budgeted, direction-aligned BFS over the world graph (§4.4.3,
//! §9 "Displacement vectors for Phase 2").
//!
//! The search is really a Dijkstra keyed by cumulative travel time (the
//! quantity the budget bounds), with hop count as the tie-break baked into
//! the same ordering the final assignment uses (§4.4.3's
//! `(hops ASC, cumulativeTravelMs ASC, locationId ASC)`).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use uuid::Uuid;

use crate::direction::Direction;
use crate::repository::Location;
use crate::terrain::DEFAULT_TRAVEL_DURATION_MS;

/// The eight planar directions considered for alignment. `up`/`down`/`in`/`out`
/// carry no displacement and never participate (§9).
const PLANAR_DIRECTIONS: [Direction; 8] = [
    Direction::North,
    Direction::South,
    Direction::East,
    Direction::West,
    Direction::Northeast,
    Direction::Northwest,
    Direction::Southeast,
    Direction::Southwest,
];

/// A node reached during the budgeted BFS, with the data needed both to
/// rank it for assignment and to test direction alignment.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub location_id: Uuid,
    pub hops: u32,
    pub cumulative_travel_ms: u64,
    pub displacement: (f64, f64),
}

impl Candidate {
    /// The direction whose normalized unit vector has the largest dot
    /// product with this candidate's displacement. Direction vectors are
    /// normalized for this comparison (not the unnormalized ±1 convention
    /// used while accumulating displacement) so that a longer diagonal
    /// vector doesn't out-compete a shorter cardinal one purely on
    /// magnitude (§9, §4.4.3 "tolerance" example).
    pub fn best_aligned_direction(&self) -> Option<Direction> {
        let (dx, dy) = self.displacement;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let mut best: Option<(Direction, f64)> = None;
        for dir in PLANAR_DIRECTIONS {
            let (ux, uy) = dir.unit_vector();
            let len = ((ux * ux + uy * uy) as f64).sqrt();
            let (nx, ny) = (ux as f64 / len, uy as f64 / len);
            let dot = dx * nx + dy * ny;
            match &best {
                Some((_, best_dot)) if *best_dot >= dot => {}
                _ => best = Some((dir, dot)),
            }
        }
        best.map(|(dir, _)| dir)
    }
}

/// Sort key implementing §4.4.3's assignment ordering:
/// `(hops ASC, cumulativeTravelMs ASC, locationId ASC lex)`.
fn assignment_key(candidate: &Candidate) -> (u32, u64, String) {
    (candidate.hops, candidate.cumulative_travel_ms, candidate.location_id.to_string())
}

#[derive(PartialEq, Eq)]
struct HeapEntry {
    cumulative_travel_ms: u64,
    hops: u32,
    location_id: Uuid,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest (closest) entry
        // pops first.
        other
            .cumulative_travel_ms
            .cmp(&self.cumulative_travel_ms)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.location_id.cmp(&self.location_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Budgeted Dijkstra from `root` over `locations`, returning every
/// reachable node within `budget_ms` of cumulative edge weight, annotated
/// with its shortest path's hop count, cumulative travel time, and
/// accumulated displacement.
///
/// Excludes `root` itself and anything in `exclude` (the root's existing
/// direct neighbours, per §4.4.3 "exclude locations already directly
/// adjacent to root").
pub fn budgeted_reachable(
    root_id: Uuid,
    locations: &HashMap<Uuid, Location>,
    budget_ms: u64,
    exclude: &std::collections::HashSet<Uuid>,
) -> Vec<Candidate> {
    let mut best: HashMap<Uuid, (u64, u32, (f64, f64))> = HashMap::new();
    let mut heap = BinaryHeap::new();

    best.insert(root_id, (0, 0, (0.0, 0.0)));
    heap.push(HeapEntry {
        cumulative_travel_ms: 0,
        hops: 0,
        location_id: root_id,
    });

    while let Some(HeapEntry {
        cumulative_travel_ms,
        hops,
        location_id,
    }) = heap.pop()
    {
        let (best_ms, best_hops, displacement) = match best.get(&location_id) {
            Some(v) => *v,
            None => continue,
        };
        // Stale heap entry (a better path to this node was already found).
        if best_ms != cumulative_travel_ms || best_hops != hops {
            continue;
        }

        let Some(location) = locations.get(&location_id) else {
            continue;
        };

        for exit in &location.exits {
            let weight = exit.travel_duration_ms.unwrap_or(DEFAULT_TRAVEL_DURATION_MS);
            let next_ms = cumulative_travel_ms + weight;
            if next_ms > budget_ms {
                continue;
            }
            let next_hops = hops + 1;
            let (ux, uy) = exit.direction.unit_vector();
            let ratio = weight as f64 / DEFAULT_TRAVEL_DURATION_MS as f64;
            let next_displacement = (displacement.0 + ux as f64 * ratio, displacement.1 + uy as f64 * ratio);

            let better = match best.get(&exit.to) {
                None => true,
                Some((existing_ms, existing_hops, _)) => {
                    next_ms < *existing_ms || (next_ms == *existing_ms && next_hops < *existing_hops)
                }
            };
            if better {
                best.insert(exit.to, (next_ms, next_hops, next_displacement));
                heap.push(HeapEntry {
                    cumulative_travel_ms: next_ms,
                    hops: next_hops,
                    location_id: exit.to,
                });
            }
        }
    }

    let mut candidates: Vec<Candidate> = best
        .into_iter()
        .filter(|(id, _)| *id != root_id && !exclude.contains(id))
        .map(|(location_id, (cumulative_travel_ms, hops, displacement))| Candidate {
            location_id,
            hops,
            cumulative_travel_ms,
            displacement,
        })
        .collect();

    candidates.sort_by(|a, b| assignment_key(a).cmp(&assignment_key(b)));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_aligned_prefers_cardinal_over_diagonal_for_cardinal_drift() {
        // south(2) then west(9): matches the §4.4.3 tolerance example.
        let candidate = Candidate {
            location_id: Uuid::new_v4(),
            hops: 2,
            cumulative_travel_ms: 0,
            displacement: (-9.0, 2.0),
        };
        assert_eq!(candidate.best_aligned_direction(), Some(Direction::West));
    }

    #[test]
    fn best_aligned_picks_diagonal_for_diagonal_drift() {
        let candidate = Candidate {
            location_id: Uuid::new_v4(),
            hops: 1,
            cumulative_travel_ms: 0,
            displacement: (5.0, 5.0),
        };
        assert_eq!(candidate.best_aligned_direction(), Some(Direction::Southeast));
    }

    #[test]
    fn best_aligned_rejects_primarily_diagonal_for_cardinal_request() {
        // south then southwest: displacement is primarily southwest, so a
        // `west` expansion must not consider this candidate best-aligned.
        let candidate = Candidate {
            location_id: Uuid::new_v4(),
            hops: 2,
            cumulative_travel_ms: 0,
            displacement: (-1.0, 2.0),
        };
        assert_eq!(candidate.best_aligned_direction(), Some(Direction::Southwest));
    }

    #[test]
    fn assignment_key_orders_by_hops_then_travel_then_id() {
        let a = Candidate {
            location_id: Uuid::nil(),
            hops: 1,
            cumulative_travel_ms: 100,
            displacement: (0.0, 0.0),
        };
        let b = Candidate {
            location_id: Uuid::max(),
            hops: 1,
            cumulative_travel_ms: 50,
            displacement: (0.0, 0.0),
        };
        assert_eq!(assignment_key(&b).cmp(&assignment_key(&a)), Ordering::Less);
    }
}
