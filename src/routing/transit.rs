//! One RAPTOR round: scan every route touching a marked stop and improve
//! arrival labels with journeys taking one more transit trip.

use crate::model::{Dataset, Mode};
use crate::routing::rounds::{LegKind, Rounds, StopArrival};
use crate::{DayNumber, RouteId, TripId, VertexId};

/// Runs the transit scan at `index`: reads round `index`, writes round
/// `index + 1`. Marked stops from the previous round are consumed and the
/// stops improved here are marked for the next round.
pub(crate) fn run_transit_round(
    data: &Dataset,
    rounds: &mut Rounds,
    target: VertexId,
    index: usize,
    transfer_padding_ms: u64,
) {
    let (head, tail) = rounds.rounds.split_at_mut(index + 1);
    let round = &head[index];
    let next = &mut tail[0];

    // Copy-forward: every label survives into the next round until a
    // scan improves on it.
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

    // Queue every route through a marked stop, with the earliest position
    // at which the route can be entered.
    rounds.queue.clear();
    for stop in rounds.marked_stops.drain() {
        for pair in &data.stop_to_routes[stop as usize] {
            let enter = rounds.queue.entry(pair.route).or_insert(pair.stop_index);
            if pair.stop_index < *enter {
                *enter = pair.stop_index;
            }
        }
    }

    // Scan routes in id order so that equal-arrival ties always resolve
    // the same way.
    let mut queue: Vec<(RouteId, u32)> = rounds.queue.iter().map(|(&r, &p)| (r, p)).collect();
    queue.sort_unstable();

    let mut visited = 0usize;

    for (route_id, enter_pos) in queue {
        let route = &data.routes[route_id as usize];
        let mut current: Option<(TripId, DayNumber)> = None;

        for (pos, &stop) in route.stops.iter().enumerate().skip(enter_pos as usize) {
            visited += 1;

            if let Some((trip_id, day)) = current {
                let arrival = data.trips[trip_id as usize].stop_times[pos].arrival_at_day(day);

                // The label must beat both the best known arrival here and
                // the best known arrival at the destination; anything else
                // can never be part of an improving journey.
                let improves_stop = rounds
                    .earliest_arrivals
                    .get(&stop)
                    .is_none_or(|&best| arrival < best);
                let improves_target = rounds
                    .earliest_arrivals
                    .get(&target)
                    .is_none_or(|&best| arrival < best);

                if improves_stop && improves_target {
                    next.insert(
                        stop,
                        StopArrival {
                            arrival,
                            leg: LegKind::Transit(trip_id),
                            enter_key: pos as u64,
                            departure: u64::from(day),
                            transfer_time: 0,
                            vehicles: Mode::Foot.bit(),
                        },
                    );
                    rounds.marked_stops.insert(stop);
                    rounds.earliest_arrivals.insert(stop, arrival);
                }
            }

            // Try to catch an earlier trip at this stop.
            if let Some(label) = round.get(&stop) {
                let catchable = match current {
                    None => true,
                    Some((trip_id, day)) => {
                        label.arrival
                            <= data.trips[trip_id as usize].stop_times[pos].departure_at_day(day)
                    }
                };
                if catchable {
                    if let Some(found) =
                        data.earliest_trip(route_id, pos, label.arrival + transfer_padding_ms)
                    {
                        current = Some(found);
                    }
                }
            }
        }
    }

    log::debug!("transit round {index}: visited {visited} route stops");
}
