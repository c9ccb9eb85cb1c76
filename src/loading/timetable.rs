//! Timetable assembly: turns concrete trips into the RAPTOR shape the
//! scanners need — routes keyed by identical stop sequences, trips sorted
//! by first-stop departure, and reorder permutations where a downstream
//! stop breaks that order.

use hashbrown::HashMap;

use crate::model::dataset::reorder_key;
use crate::model::{
    Dataset, Route, RouteInfo, Service, StopInfo, StopRoutePair, Stopover, StreetArc, Trip,
    TripInfo, Vertex,
};
use crate::{Error, RouteId, ServiceId, TripId, VertexId, DAY_MS};

/// One concrete trip before route grouping: a line, a service and the
/// ordered `(stop vertex, arrival offset, departure offset)` rows.
#[derive(Debug, Clone)]
struct TripDraft {
    line: u32,
    service: ServiceId,
    stops: Vec<(VertexId, u32, u32)>,
}

/// Assembles a [`Dataset`] from vertices, services, lines and trips.
/// Street arcs can be added here too; stop stitching is a separate pass
/// (see [`super::stitch`]).
#[derive(Debug, Default)]
pub struct TimetableBuilder {
    vertices: Vec<Vertex>,
    street_graph: Vec<Vec<StreetArc>>,
    services: Vec<Service>,
    lines: Vec<RouteInfo>,
    drafts: Vec<TripDraft>,
    trip_info: Vec<TripInfo>,
    stops_index: HashMap<String, VertexId>,
    nodes_index: HashMap<i64, VertexId>,
}

impl TimetableBuilder {
    pub fn new() -> Self {
        TimetableBuilder::default()
    }

    fn push_vertex(&mut self, vertex: Vertex) -> VertexId {
        let id = self.vertices.len() as VertexId;
        self.vertices.push(vertex);
        self.street_graph.push(Vec::new());
        id
    }

    /// Adds a street junction known under an external node id.
    pub fn add_street_vertex(&mut self, node_id: i64, latitude: f64, longitude: f64) -> VertexId {
        if let Some(&existing) = self.nodes_index.get(&node_id) {
            return existing;
        }
        let id = self.push_vertex(Vertex {
            latitude,
            longitude,
            stop: None,
        });
        self.nodes_index.insert(node_id, id);
        id
    }

    /// Adds a transit stop.
    pub fn add_stop(&mut self, stop_id: &str, name: &str, latitude: f64, longitude: f64) -> VertexId {
        if let Some(&existing) = self.stops_index.get(stop_id) {
            return existing;
        }
        let id = self.push_vertex(Vertex {
            latitude,
            longitude,
            stop: Some(StopInfo {
                id: stop_id.to_string(),
                name: name.to_string(),
            }),
        });
        self.stops_index.insert(stop_id.to_string(), id);
        id
    }

    pub fn add_service(&mut self, mut service: Service) -> ServiceId {
        service.added_exceptions.sort_unstable();
        service.removed_exceptions.sort_unstable();
        let id = self.services.len() as ServiceId;
        self.services.push(service);
        id
    }

    /// Adds an external line (feed route) and returns its metadata index.
    pub fn add_line(&mut self, short_name: &str) -> u32 {
        let id = self.lines.len() as u32;
        self.lines.push(RouteInfo {
            short_name: short_name.to_string(),
        });
        id
    }

    /// Adds a directed street arc. Zero costs prohibit the mode.
    pub fn add_arc(&mut self, from: VertexId, to: VertexId, walk_ms: u32, cycle_ms: u32, car_ms: u32) {
        self.street_graph[from as usize].push(StreetArc {
            target: to,
            walk_ms,
            cycle_ms,
            car_ms,
        });
    }

    /// Convenience for a bidirectional arc with the same costs both ways.
    pub fn add_two_way_arc(
        &mut self,
        a: VertexId,
        b: VertexId,
        walk_ms: u32,
        cycle_ms: u32,
        car_ms: u32,
    ) {
        self.add_arc(a, b, walk_ms, cycle_ms, car_ms);
        self.add_arc(b, a, walk_ms, cycle_ms, car_ms);
    }

    /// Adds a concrete trip with `(stop vertex, arrival offset, departure
    /// offset)` rows, offsets in ms since the trip's day-0 midnight.
    pub fn add_trip(
        &mut self,
        line: u32,
        service: ServiceId,
        trip_id: &str,
        headsign: &str,
        stops: &[(VertexId, u32, u32)],
    ) -> Result<TripId, Error> {
        if stops.is_empty() {
            return Err(Error::InvalidData(format!("trip {trip_id} has no stops")));
        }
        let id = self.drafts.len() as TripId;
        self.drafts.push(TripDraft {
            line,
            service,
            stops: stops.to_vec(),
        });
        self.trip_info.push(TripInfo {
            id: trip_id.to_string(),
            headsign: headsign.to_string(),
        });
        Ok(id)
    }

    pub fn build(self) -> Result<Dataset, Error> {
        let trip_count = self.drafts.len();

        let mut max_trip_day_length = 0u32;
        let trips: Vec<Trip> = self
            .drafts
            .iter()
            .map(|draft| Trip {
                service: draft.service,
                stop_times: draft
                    .stops
                    .iter()
                    .map(|&(_, arrival, departure)| {
                        let days = u32::max(arrival, departure) / DAY_MS as u32;
                        max_trip_day_length = max_trip_day_length.max(days);
                        Stopover { arrival, departure }
                    })
                    .collect(),
            })
            .collect();

        // Partition trips into RAPTOR routes: one route per (line,
        // distinct stop sequence). Route ids are assigned in first-seen
        // trip order to keep builds deterministic.
        let mut groups: HashMap<(u32, Vec<VertexId>), Vec<TripId>> = HashMap::new();
        let mut group_order: Vec<(u32, Vec<VertexId>)> = Vec::new();
        for (trip_idx, draft) in self.drafts.iter().enumerate() {
            let sequence: Vec<VertexId> = draft.stops.iter().map(|&(stop, _, _)| stop).collect();
            let key = (draft.line, sequence);
            let members = groups.entry(key.clone()).or_insert_with(|| {
                group_order.push(key);
                Vec::new()
            });
            members.push(trip_idx as TripId);
        }

        let mut routes = Vec::with_capacity(group_order.len());
        let mut gtfs_route_index = Vec::with_capacity(group_order.len());
        let mut reorders = HashMap::new();
        let mut stop_to_routes: Vec<Vec<StopRoutePair>> = vec![Vec::new(); self.vertices.len()];
        let mut trip_to_route = vec![0 as RouteId; trip_count];

        for key in group_order {
            let route_id = routes.len() as RouteId;
            let (line, stops) = key.clone();
            let mut members = groups.remove(&key).unwrap_or_default();
            members
                .sort_by_key(|&trip| (trips[trip as usize].stop_times[0].departure, trip));

            for &trip in &members {
                trip_to_route[trip as usize] = route_id;
            }
            for (pos, &stop) in stops.iter().enumerate() {
                stop_to_routes[stop as usize].push(StopRoutePair {
                    route: route_id,
                    stop_index: pos as u32,
                });
            }

            // A downstream stop whose departures are not monotone in the
            // natural trip order gets a permutation restoring it.
            for pos in 0..stops.len() {
                let departure_at = |trip: TripId| trips[trip as usize].stop_times[pos].departure;
                let sorted = members.windows(2).all(|w| departure_at(w[0]) <= departure_at(w[1]));
                if sorted {
                    continue;
                }
                let mut permutation: Vec<u32> = (0..members.len() as u32).collect();
                permutation.sort_by_key(|&i| (departure_at(members[i as usize]), i));
                reorders.insert(reorder_key(route_id, pos as u32), permutation);
            }

            routes.push(Route {
                stops,
                trips: members,
            });
            gtfs_route_index.push(line);
        }

        let mut data = Dataset {
            max_trip_day_length,
            services: self.services,
            routes,
            stop_to_routes,
            trips,
            street_graph: self.street_graph,
            reorders,
            vertices: self.vertices,
            stops_index: self.stops_index,
            nodes_index: self.nodes_index,
            gtfs_route_index,
            route_info: self.lines,
            trip_info: self.trip_info,
            trip_to_route,
            ..Dataset::default()
        };
        data.rebuild_vertex_trees();
        data.validate()?;
        data.log_stats();
        Ok(data)
    }
}
