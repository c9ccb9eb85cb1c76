//! Stop stitching: connects every transit stop to its nearby street
//! vertices so that journeys can leave and enter the timetable network.

use rayon::prelude::*;
use rstar::{primitives::GeomWithData, RTree};

use crate::model::geometry::{great_circle_meters, travel_ms};
use crate::model::{Dataset, StreetArc};
use crate::routing::PlannerConfig;
use crate::VertexId;

/// Neighbours considered per stop.
const STITCH_CANDIDATES: usize = 30;

/// Adds bidirectional foot arcs between each stop vertex and its nearest
/// neighbours within `max_stops_connection_ms` of walking. Stops are
/// entered on foot, so the stitching arcs carry no cycle or car cost.
///
/// Candidate search runs in parallel; the graph itself is only mutated in
/// the sequential pass afterwards. Rebuilds the spatial indices.
pub fn connect_stops(data: &mut Dataset, config: &PlannerConfig) {
    let tree = RTree::bulk_load(
        data.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| GeomWithData::new([v.longitude, v.latitude], i as VertexId))
            .collect(),
    );

    let stops: Vec<VertexId> = (0..data.vertices.len() as VertexId)
        .filter(|&v| data.vertices[v as usize].is_stop())
        .collect();

    let vertices = &data.vertices;
    let links: Vec<(VertexId, VertexId, u32)> = stops
        .par_iter()
        .flat_map_iter(|&stop| {
            let from = &vertices[stop as usize];
            tree.nearest_neighbor_iter(&[from.longitude, from.latitude])
                .take(STITCH_CANDIDATES)
                .filter_map(move |candidate| {
                    let other = candidate.data;
                    if other == stop {
                        return None;
                    }
                    let to = &vertices[other as usize];
                    let walk_ms = travel_ms(
                        great_circle_meters(
                            from.latitude,
                            from.longitude,
                            to.latitude,
                            to.longitude,
                        ),
                        config.walking_speed,
                    )
                    .max(1);
                    (walk_ms <= u64::from(config.max_stops_connection_ms))
                        .then(|| (stop, other, walk_ms as u32))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    for &(from, to, walk_ms) in &links {
        let arc = |target| StreetArc {
            target,
            walk_ms,
            cycle_ms: 0,
            car_ms: 0,
        };
        data.street_graph[from as usize].push(arc(to));
        data.street_graph[to as usize].push(arc(from));
    }

    log::info!("stitched {} stops with {} connection arcs", stops.len(), links.len() * 2);
    data.rebuild_vertex_trees();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::timetable::TimetableBuilder;
    use crate::model::Mode;

    #[test]
    fn stitches_stops_within_the_cap() {
        let mut builder = TimetableBuilder::new();
        // Roughly 100 m apart; the far junction is several km away.
        let stop = builder.add_stop("s", "S", 48.0000, 11.0000);
        let near = builder.add_street_vertex(1, 48.0009, 11.0000);
        let far = builder.add_street_vertex(2, 48.1000, 11.0000);
        builder.add_two_way_arc(near, far, 1_000_000, 0, 0);
        let mut data = builder.build().unwrap();

        let config = PlannerConfig::default();
        connect_stops(&mut data, &config);

        let targets: Vec<VertexId> = data.street_graph[stop as usize]
            .iter()
            .map(|arc| arc.target)
            .collect();
        assert!(targets.contains(&near));
        assert!(!targets.contains(&far), "beyond max_stops_connection_ms");

        // The reverse arc exists and the stop is now walk-reachable.
        assert!(data.street_graph[near as usize]
            .iter()
            .any(|arc| arc.target == stop && arc.walk_ms > 0 && arc.cycle_ms == 0));
        assert!(data
            .vertex_trees
            .nearest(Mode::Foot, 48.0, 11.0, 10)
            .contains(&stop));
    }
}
