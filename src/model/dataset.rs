//! The immutable fused dataset consumed by every query.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::spatial::VertexTrees;
use super::types::{Route, RouteInfo, Service, StopRoutePair, StreetArc, Trip, TripInfo, Vertex};
use crate::{DayNumber, Error, RouteId, TimeMs, TripId, VertexId, DAY_MS};

/// Key of a reorder permutation for `(route, stop position)`.
pub fn reorder_key(route: RouteId, stop_index: u32) -> u64 {
    u64::from(route) << 32 | u64::from(stop_index)
}

/// The consolidated routing data model: transit timetables fused with the
/// street graph over one dense vertex space. Produced once at startup and
/// shared read-only across queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// How many calendar days the longest trip spans past its departure
    /// day; bounds the day-rollback in [`Dataset::earliest_trip`].
    pub max_trip_day_length: u32,

    pub services: Vec<Service>,
    pub routes: Vec<Route>,
    /// For every vertex, the routes it belongs to and its position in
    /// each. Empty for pure street vertices.
    pub stop_to_routes: Vec<Vec<StopRoutePair>>,
    pub trips: Vec<Trip>,
    /// Adjacency lists indexed by source vertex.
    pub street_graph: Vec<Vec<StreetArc>>,
    /// Per-`(route, stop position)` trip permutations restoring departure
    /// monotonicity where the natural order (by first-stop departure)
    /// does not hold. Keyed by [`reorder_key`].
    pub reorders: HashMap<u64, Vec<u32>>,

    pub vertices: Vec<Vertex>,
    /// Feed stop id -> vertex.
    pub stops_index: HashMap<String, VertexId>,
    /// External street-node id -> vertex.
    pub nodes_index: HashMap<i64, VertexId>,
    /// RAPTOR route -> external route metadata index.
    pub gtfs_route_index: Vec<u32>,
    pub route_info: Vec<RouteInfo>,
    pub trip_info: Vec<TripInfo>,
    pub trip_to_route: Vec<RouteId>,

    /// Rebuilt from `vertices` + `street_graph`, never persisted.
    #[serde(skip)]
    pub vertex_trees: VertexTrees,
}

impl Dataset {
    pub fn rebuild_vertex_trees(&mut self) {
        self.vertex_trees = VertexTrees::build(&self.vertices, &self.street_graph);
    }

    pub fn log_stats(&self) {
        log::info!(
            "dataset: {} vertices, {} routes, {} trips, {} services, {} reorders, max trip day length {}",
            self.vertices.len(),
            self.routes.len(),
            self.trips.len(),
            self.services.len(),
            self.reorders.len(),
            self.max_trip_day_length,
        );
    }

    /// Whether the trip's service calendar is active on `day`.
    pub fn trip_runs_on_day(&self, trip: TripId, day: DayNumber) -> bool {
        self.services[self.trips[trip as usize].service as usize].runs_on(day)
    }

    /// The earliest trip of `route_id` departing from stop position `pos`
    /// at or after `min_departure` (absolute ms), together with the day
    /// the trip departed on. Walks up to `max_trip_day_length` days back
    /// to catch trips that started on an earlier day and are still under
    /// way past midnight.
    pub fn earliest_trip(
        &self,
        route_id: RouteId,
        pos: usize,
        min_departure: TimeMs,
    ) -> Option<(TripId, DayNumber)> {
        let route = &self.routes[route_id as usize];
        let mut day = (min_departure / DAY_MS) as DayNumber;
        let in_day = (min_departure % DAY_MS) as u32;

        for i in 0..=self.max_trip_day_length {
            let shifted = u64::from(in_day) + u64::from(i) * DAY_MS;
            let Ok(min_dep_in_day) = u32::try_from(shifted) else {
                break;
            };
            if let Some(trip) = self.earliest_trip_in_day(route, route_id, pos, min_dep_in_day, day)
            {
                return Some((trip, day));
            }
            match day.checked_sub(1) {
                Some(previous) => day = previous,
                None => break,
            }
        }

        None
    }

    fn earliest_trip_in_day(
        &self,
        route: &Route,
        route_id: RouteId,
        pos: usize,
        min_dep_in_day: u32,
        day: DayNumber,
    ) -> Option<TripId> {
        match self.reorders.get(&reorder_key(route_id, pos as u32)) {
            None => self.earliest_trip_with(route, pos, min_dep_in_day, day, |i| route.trips[i]),
            Some(perm) => self.earliest_trip_with(route, pos, min_dep_in_day, day, |i| {
                route.trips[perm[i] as usize]
            }),
        }
    }

    /// Binary search over the (possibly permuted) trip order, which is
    /// ascending in the departure at `pos`, then a forward scan for the
    /// first trip whose service runs on `day`.
    fn earliest_trip_with(
        &self,
        route: &Route,
        pos: usize,
        min_dep_in_day: u32,
        day: DayNumber,
        trip_at: impl Fn(usize) -> TripId,
    ) -> Option<TripId> {
        let n = route.trips.len();
        if n == 0 {
            return None;
        }
        let departure = |i: usize| self.trips[trip_at(i) as usize].stop_times[pos].departure;

        if departure(0) >= min_dep_in_day {
            return self.first_running(day, 0, n, &trip_at);
        }
        if departure(n - 1) < min_dep_in_day {
            return None;
        }

        // Invariant: departure(low) < min_dep_in_day <= departure(high).
        let mut low = 0;
        let mut high = n - 1;
        while high - low > 1 {
            let mid = (low + high) / 2;
            if departure(mid) < min_dep_in_day {
                low = mid;
            } else {
                high = mid;
            }
        }
        self.first_running(day, high, n, &trip_at)
    }

    fn first_running(
        &self,
        day: DayNumber,
        start: usize,
        n: usize,
        trip_at: &impl Fn(usize) -> TripId,
    ) -> Option<TripId> {
        (start..n)
            .map(trip_at)
            .find(|&trip| self.trip_runs_on_day(trip, day))
    }

    /// Checks the structural invariants that every valid dataset must
    /// satisfy. Run after construction and after loading a snapshot.
    pub fn validate(&self) -> Result<(), Error> {
        let vertex_count = self.vertices.len();

        if self.stop_to_routes.len() != vertex_count {
            return Err(Error::InvalidData(format!(
                "stop_to_routes length {} != vertex count {vertex_count}",
                self.stop_to_routes.len()
            )));
        }
        if self.street_graph.len() != vertex_count {
            return Err(Error::InvalidData(format!(
                "street_graph length {} != vertex count {vertex_count}",
                self.street_graph.len()
            )));
        }
        if self.trip_to_route.len() != self.trips.len() {
            return Err(Error::InvalidData(format!(
                "trip_to_route length {} != trip count {}",
                self.trip_to_route.len(),
                self.trips.len()
            )));
        }
        if self.trip_info.len() != self.trips.len() {
            return Err(Error::InvalidData(format!(
                "trip_info length {} != trip count {}",
                self.trip_info.len(),
                self.trips.len()
            )));
        }
        if self.gtfs_route_index.len() != self.routes.len() {
            return Err(Error::InvalidData(format!(
                "gtfs_route_index length {} != route count {}",
                self.gtfs_route_index.len(),
                self.routes.len()
            )));
        }

        for (arcs, vertex) in self.street_graph.iter().zip(0u64..) {
            for arc in arcs {
                if arc.target as usize >= vertex_count {
                    return Err(Error::InvalidData(format!(
                        "arc {vertex} -> {} exceeds vertex count {vertex_count}",
                        arc.target
                    )));
                }
            }
        }

        for (route_id, route) in self.routes.iter().enumerate() {
            for &trip in &route.trips {
                let Some(trip_data) = self.trips.get(trip as usize) else {
                    return Err(Error::InvalidData(format!(
                        "route {route_id} references unknown trip {trip}"
                    )));
                };
                if trip_data.stop_times.len() != route.stops.len() {
                    return Err(Error::InvalidData(format!(
                        "trip {trip} has {} stop times but route {route_id} has {} stops",
                        trip_data.stop_times.len(),
                        route.stops.len()
                    )));
                }
                if trip_data.service as usize >= self.services.len() {
                    return Err(Error::InvalidData(format!(
                        "trip {trip} references unknown service {}",
                        trip_data.service
                    )));
                }
            }
            for (pos, &stop) in route.stops.iter().enumerate() {
                let known = self
                    .stop_to_routes
                    .get(stop as usize)
                    .is_some_and(|pairs| {
                        pairs.iter().any(|p| {
                            p.route as usize == route_id && p.stop_index as usize == pos
                        })
                    });
                if !known {
                    return Err(Error::InvalidData(format!(
                        "vertex {stop} is missing its stop_to_routes entry for route \
                         {route_id} position {pos}"
                    )));
                }
            }
        }

        for (&key, perm) in &self.reorders {
            let route_id = (key >> 32) as usize;
            let pos = (key & 0xffff_ffff) as usize;
            let Some(route) = self.routes.get(route_id) else {
                return Err(Error::InvalidData(format!(
                    "reorder references unknown route {route_id}"
                )));
            };
            if pos >= route.stops.len() || perm.len() != route.trips.len() {
                return Err(Error::InvalidData(format!(
                    "reorder for route {route_id} position {pos} is malformed"
                )));
            }
            let mut last = 0u32;
            for &idx in perm {
                let Some(&trip) = route.trips.get(idx as usize) else {
                    return Err(Error::InvalidData(format!(
                        "reorder for route {route_id} position {pos} indexes past its trips"
                    )));
                };
                let departure = self.trips[trip as usize].stop_times[pos].departure;
                if departure < last {
                    return Err(Error::InvalidData(format!(
                        "reorder for route {route_id} position {pos} is not sorted by departure"
                    )));
                }
                last = departure;
            }
        }

        Ok(())
    }
}
