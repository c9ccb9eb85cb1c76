//! One transfer round: a single-source-multi-target Dijkstra over the
//! street graph, biased toward the destination with an admissible
//! great-circle heuristic (A*).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use hashbrown::HashMap;

use crate::model::geometry::{great_circle_meters, travel_ms};
use crate::model::{Dataset, Mode};
use crate::routing::planner::PlannerConfig;
use crate::routing::rounds::{LegKind, Rounds, StopArrival};
use crate::{TimeMs, VertexId};

/// How many heap pops between wall-clock deadline polls.
const DEADLINE_POLL_INTERVAL: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransferNode {
    score: TimeMs,
    arrival: TimeMs,
    vertex: VertexId,
    transfer_time: u32,
}

// Min-heap by score inside std's max-heap, with a total order on
// (score, arrival, vertex) so equal-score pops are deterministic.
impl Ord for TransferNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.arrival.cmp(&self.arrival))
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for TransferNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The per-transfer budget for a mode, if it has one. Driving is
/// unbudgeted.
fn transfer_budget_ms(config: &PlannerConfig, mode: Mode) -> Option<u32> {
    match mode {
        Mode::Foot => Some(config.max_walking_ms),
        Mode::Bike => Some(config.max_cycling_ms),
        Mode::Car => None,
    }
}

/// Admissible travel-time lower bound from a vertex to the destination:
/// great-circle distance at the minimum plausible speed of the mode.
fn heuristic_ms(data: &Dataset, from: VertexId, to: VertexId, speed_m_per_ms: f64) -> TimeMs {
    let a = &data.vertices[from as usize];
    let b = &data.vertices[to as usize];
    travel_ms(
        great_circle_meters(a.latitude, a.longitude, b.latitude, b.longitude),
        speed_m_per_ms,
    )
}

/// Runs the transfer scan at `index`: reads round `index`, writes round
/// `index + 1`. Seeds are the marked-for-transfer vertices whose labels
/// admit `mode`; improved vertices are marked for the next transit round.
///
/// Returns `false` when `deadline` expired before the frontier drained;
/// labels written up to that point are valid but the round is incomplete.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_transfer_round(
    data: &Dataset,
    config: &PlannerConfig,
    rounds: &mut Rounds,
    target: VertexId,
    index: usize,
    mode: Mode,
    unrestricted: bool,
    deadline: Option<Instant>,
) -> bool {
    let (head, tail) = rounds.rounds.split_at_mut(index + 1);
    let round = &head[index];
    let next = &mut tail[0];

    for (&stop, label) in round.iter() {
        next.insert(
            stop,
            StopArrival {
                arrival: label.arrival,
                leg: LegKind::NoChange,
                enter_key: 0,
                departure: 0,
                transfer_time: 0,
                vehicles: label.vehicles,
            },
        );
    }

    let min_speed = match mode {
        Mode::Foot => config.walking_speed,
        Mode::Bike => config.cycle_speed,
        Mode::Car => config.car_min_avg_speed,
    };
    let budget = transfer_budget_ms(config, mode);
    let leg = LegKind::of_mode(mode);

    let mut heap = BinaryHeap::new();
    // Best arrival pushed per vertex; stale heap entries are skipped on
    // pop instead of being removed (lazy decrease-key).
    let mut best: HashMap<VertexId, TimeMs> = HashMap::new();

    for stop in rounds.marked_stops_for_transfer.drain() {
        let Some(label) = next.get(&stop) else {
            continue;
        };
        // Foot is always available; other modes require a vehicle carried
        // into this vertex.
        if label.vehicles & mode.bit() == 0 && mode != Mode::Foot {
            continue;
        }
        heap.push(TransferNode {
            score: label.arrival + heuristic_ms(data, stop, target, min_speed),
            arrival: label.arrival,
            vertex: stop,
            transfer_time: label.transfer_time,
        });
        best.insert(stop, label.arrival);
    }

    let mut pops: u32 = 0;

    while let Some(node) = heap.pop() {
        pops = pops.wrapping_add(1);
        if pops % DEADLINE_POLL_INTERVAL == 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::debug!("transfer round {index} hit its deadline after {pops} pops");
                    return false;
                }
            }
        }

        // Superseded by a later decrease; settle each vertex once.
        if best.get(&node.vertex).is_some_and(|&b| node.arrival > b) {
            continue;
        }

        for arc in &data.street_graph[node.vertex as usize] {
            let cost = arc.cost(mode);
            if cost == 0 {
                continue;
            }

            let transfer_time = node.transfer_time + cost;
            if !unrestricted && budget.is_some_and(|max| transfer_time > max) {
                continue;
            }

            let arrival = node.arrival + TimeMs::from(cost);

            // Prune against the best known arrival at the arc target and
            // at the destination.
            if rounds
                .earliest_arrivals
                .get(&arc.target)
                .is_some_and(|&known| known <= arrival)
            {
                continue;
            }
            if rounds
                .earliest_arrivals
                .get(&target)
                .is_some_and(|&known| known <= arrival)
            {
                continue;
            }

            next.insert(
                arc.target,
                StopArrival {
                    arrival,
                    leg,
                    enter_key: node.vertex,
                    departure: node.arrival,
                    transfer_time,
                    vehicles: mode.bit(),
                },
            );
            rounds.marked_stops.insert(arc.target);
            rounds.earliest_arrivals.insert(arc.target, arrival);
            best.insert(arc.target, arrival);

            heap.push(TransferNode {
                score: arrival + heuristic_ms(data, arc.target, target, min_speed),
                arrival,
                vertex: arc.target,
                transfer_time,
            });
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{StreetArc, Vertex};

    /// A walk-only chain X -(300 s)- Y -(400 s)- Z, bidirectional.
    fn chain() -> Dataset {
        let vertex = |lon: f64| Vertex {
            latitude: 48.0,
            longitude: lon,
            stop: None,
        };
        let arc = |target, walk_ms| StreetArc {
            target,
            walk_ms,
            cycle_ms: 0,
            car_ms: 0,
        };
        let mut data = Dataset {
            vertices: vec![vertex(11.000), vertex(11.003), vertex(11.007)],
            street_graph: vec![
                vec![arc(1, 300_000)],
                vec![arc(0, 300_000), arc(2, 400_000)],
                vec![arc(1, 400_000)],
            ],
            stop_to_routes: vec![vec![], vec![], vec![]],
            ..Dataset::default()
        };
        data.rebuild_vertex_trees();
        data
    }

    fn seeded(departure: TimeMs) -> Rounds {
        let mut rounds = Rounds::new(1);
        rounds.rounds[0].insert(
            0,
            StopArrival {
                arrival: departure,
                leg: LegKind::Origin,
                enter_key: 0,
                departure: 0,
                transfer_time: 0,
                vehicles: Mode::Foot.bit(),
            },
        );
        rounds.marked_stops_for_transfer.insert(0);
        rounds.earliest_arrivals.insert(0, departure);
        rounds
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            max_walking_ms: 600_000,
            ..PlannerConfig::default()
        }
    }

    #[test]
    fn budget_cuts_off_beyond_max_walking() {
        let data = chain();
        let mut rounds = seeded(1_000_000);
        let done = run_transfer_round(&data, &config(), &mut rounds, 2, 0, Mode::Foot, false, None);

        assert!(done);
        // Y is within the 600 s budget, Z (700 s accumulated) is not.
        assert_eq!(rounds.earliest_arrivals.get(&1), Some(&1_300_000));
        assert_eq!(rounds.earliest_arrivals.get(&2), None);
        let label = rounds.rounds[1].get(&1).unwrap();
        assert_eq!(label.leg, LegKind::Walk);
        assert_eq!(label.transfer_time, 300_000);
        assert_eq!(label.enter_key, 0);
        assert_eq!(label.departure, 1_000_000);
    }

    #[test]
    fn unrestricted_round_ignores_the_budget() {
        let data = chain();
        let mut rounds = seeded(1_000_000);
        run_transfer_round(&data, &config(), &mut rounds, 2, 0, Mode::Foot, true, None);

        assert_eq!(rounds.earliest_arrivals.get(&2), Some(&1_700_000));
        let label = rounds.rounds[1].get(&2).unwrap();
        assert_eq!(label.transfer_time, 700_000);
    }

    #[test]
    fn mode_gate_blocks_unavailable_vehicles() {
        let data = chain();
        let mut rounds = seeded(1_000_000);
        // The seed label only carries a foot vehicle; cycling must not
        // start from it, and no arc is cyclable anyway.
        let done = run_transfer_round(&data, &config(), &mut rounds, 2, 0, Mode::Bike, true, None);
        assert!(done);
        assert!(rounds.rounds[1].get(&1).is_none());
    }

    #[test]
    fn settles_via_the_shorter_path() {
        // A diamond: 0 -> 1 -> 3 is faster than 0 -> 2 -> 3.
        let vertex = |lon: f64| Vertex {
            latitude: 48.0,
            longitude: lon,
            stop: None,
        };
        let arc = |target, walk_ms| StreetArc {
            target,
            walk_ms,
            cycle_ms: 0,
            car_ms: 0,
        };
        let mut data = Dataset {
            vertices: vec![vertex(11.0), vertex(11.001), vertex(11.002), vertex(11.003)],
            street_graph: vec![
                vec![arc(1, 100_000), arc(2, 50_000)],
                vec![arc(3, 50_000)],
                vec![arc(3, 200_000)],
                vec![],
            ],
            stop_to_routes: vec![vec![]; 4],
            ..Dataset::default()
        };
        data.rebuild_vertex_trees();

        let mut rounds = seeded(0);
        run_transfer_round(&data, &config(), &mut rounds, 3, 0, Mode::Foot, true, None);

        assert_eq!(rounds.earliest_arrivals.get(&3), Some(&150_000));
        let label = rounds.rounds[1].get(&3).unwrap();
        assert_eq!(label.enter_key, 1);
    }

    #[test]
    fn deadline_polling_is_coarser_than_small_graphs() {
        let data = chain();
        let mut rounds = seeded(1_000_000);
        let past = Instant::now() - std::time::Duration::from_secs(1);
        // The deadline is polled every DEADLINE_POLL_INTERVAL pops, so a
        // three-vertex frontier drains before the first poll and the
        // round completes even with an expired deadline.
        let done =
            run_transfer_round(&data, &config(), &mut rounds, 2, 0, Mode::Foot, true, Some(past));
        assert!(done);
        assert_eq!(rounds.earliest_arrivals.get(&2), Some(&1_700_000));
    }
}
