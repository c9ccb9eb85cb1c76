//! End-to-end planner scenarios over small synthetic networks.

use std::sync::Arc;

use omnibus::model::weekday;
use omnibus::prelude::*;
use omnibus::routing::LegKind;

const MINUTE: u32 = 60_000;
const HOUR: u32 = 60 * MINUTE;
/// Base day for all scenarios; services below run every weekday.
const DAY: DayNumber = 19_700;

fn at(day: DayNumber, offset: u32) -> TimeMs {
    TimeMs::from(day) * DAY_MS + TimeMs::from(offset)
}

fn daily() -> Service {
    Service {
        weekdays: 0x7f,
        start_day: 0,
        end_day: DayNumber::MAX,
        added_exceptions: Vec::new(),
        removed_exceptions: Vec::new(),
    }
}

fn test_config() -> PlannerConfig {
    PlannerConfig {
        transfer_padding_ms: TimeMs::from(2 * MINUTE),
        ..PlannerConfig::default()
    }
}

fn planner(data: Dataset) -> Planner {
    Planner::new(Arc::new(data), test_config())
}

/// Stops `A -> B` with a single 08:00 -> 08:10 trip on line "10".
fn single_trip_network() -> (Dataset, VertexId, VertexId) {
    let mut builder = TimetableBuilder::new();
    let a = builder.add_stop("a", "Alpha", 48.00, 11.00);
    let b = builder.add_stop("b", "Beta", 48.01, 11.00);
    let service = builder.add_service(daily());
    let line = builder.add_line("10");
    builder
        .add_trip(
            line,
            service,
            "trip-10-1",
            "Beta",
            &[(a, 8 * HOUR, 8 * HOUR), (b, 8 * HOUR + 10 * MINUTE, 8 * HOUR + 10 * MINUTE)],
        )
        .unwrap();
    (builder.build().unwrap(), a, b)
}

/// Stops `A -> B -> C` served by two lines: line 1 arrives at B at 08:10,
/// line 2 leaves B at `b_departure` and reaches C at 08:20.
fn connection_network(b_departure: u32) -> (Dataset, VertexId, VertexId) {
    let mut builder = TimetableBuilder::new();
    let a = builder.add_stop("a", "Alpha", 48.00, 11.00);
    let b = builder.add_stop("b", "Beta", 48.01, 11.00);
    let c = builder.add_stop("c", "Gamma", 48.02, 11.00);
    let service = builder.add_service(daily());
    let line1 = builder.add_line("1");
    let line2 = builder.add_line("2");
    builder
        .add_trip(
            line1,
            service,
            "trip-1",
            "Beta",
            &[(a, 8 * HOUR, 8 * HOUR), (b, 8 * HOUR + 10 * MINUTE, 8 * HOUR + 10 * MINUTE)],
        )
        .unwrap();
    builder
        .add_trip(
            line2,
            service,
            "trip-2",
            "Gamma",
            &[(b, b_departure, b_departure), (c, 8 * HOUR + 20 * MINUTE, 8 * HOUR + 20 * MINUTE)],
        )
        .unwrap();
    (builder.build().unwrap(), a, c)
}

#[test]
fn s1_direct_ride_on_a_single_trip() {
    let (data, a, b) = single_trip_network();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let journey = planner
        .route_transit(&mut rounds, &[a], b, at(DAY, 7 * HOUR + 55 * MINUTE))
        .unwrap();

    assert_eq!(journey.legs.len(), 1);
    let leg = &journey.legs[0];
    assert_eq!(leg.mode, LegMode::Transit);
    assert_eq!(leg.departure, at(DAY, 8 * HOUR));
    assert_eq!(leg.arrival, at(DAY, 8 * HOUR + 10 * MINUTE));
    assert_eq!(leg.stopovers.len(), 2);
    let line = leg.line.as_ref().unwrap();
    assert_eq!(line.name, "10");
    assert_eq!(line.trip_id, "trip-10-1");
}

#[test]
fn s2_no_route_after_the_last_trip_left() {
    let (data, a, b) = single_trip_network();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let result = planner.route_transit(&mut rounds, &[a], b, at(DAY, 8 * HOUR + 5 * MINUTE));
    assert!(matches!(result, Err(Error::NoRoute)));
}

#[test]
fn s3_connection_respecting_transfer_padding() {
    // Trip 2 leaves B at 08:13; arriving 08:10 plus 2 min padding fits.
    let (data, a, c) = connection_network(8 * HOUR + 13 * MINUTE);
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let journey = planner
        .route_transit(&mut rounds, &[a], c, at(DAY, 7 * HOUR + 55 * MINUTE))
        .unwrap();

    assert_eq!(journey.legs.len(), 2);
    assert_eq!(journey.legs[0].mode, LegMode::Transit);
    assert_eq!(journey.legs[1].mode, LegMode::Transit);
    assert_eq!(journey.arrival(), Some(at(DAY, 8 * HOUR + 20 * MINUTE)));
    // Legs connect in time.
    assert!(journey.legs[1].departure >= journey.legs[0].arrival);
    // The best-known arrival at the destination matches the journey.
    assert_eq!(rounds.earliest_arrivals.get(&c), Some(&journey.arrival().unwrap()));
}

#[test]
fn s4_padding_blocks_a_tight_connection() {
    // Trip 2 leaves B at 08:11, inside the 2 min padding after 08:10.
    let (data, a, c) = connection_network(8 * HOUR + 11 * MINUTE);
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let result = planner.route_transit(&mut rounds, &[a], c, at(DAY, 7 * HOUR + 55 * MINUTE));
    assert!(matches!(result, Err(Error::NoRoute)));
}

#[test]
fn s5_walking_budget_truncates_transfer_rounds_until_the_fallback() {
    // X -(300 s)- Y -(400 s)- Z, all walking, 600 s per-transfer budget.
    let mut builder = TimetableBuilder::new();
    let x = builder.add_street_vertex(1, 48.0, 11.000);
    let y = builder.add_street_vertex(2, 48.0, 11.003);
    let z = builder.add_street_vertex(3, 48.0, 11.007);
    builder.add_two_way_arc(x, y, 300_000, 0, 0);
    builder.add_two_way_arc(y, z, 400_000, 0, 0);
    let data = builder.build().unwrap();

    let planner = Planner::new(
        Arc::new(data),
        PlannerConfig {
            max_walking_ms: 600_000,
            ..test_config()
        },
    );
    let mut rounds = planner.new_rounds();

    let departure = at(DAY, 9 * HOUR);
    let journey = planner
        .route_transit(&mut rounds, &[x], z, departure)
        .unwrap();

    // The budgeted transfer round reaches Y but has to stop short of Z,
    // where the accumulated walk would exceed the budget.
    let reached_y = rounds.rounds[2].get(&y).unwrap();
    assert_eq!(reached_y.leg, LegKind::Walk);
    assert!(reached_y.transfer_time <= 600_000);
    assert!(rounds.rounds[2].get(&z).is_none());

    // Z is only reached by the unrestricted fallback round: one leg per
    // transfer round, both on foot.
    assert_eq!(journey.legs.len(), 2);
    assert!(journey.legs.iter().all(|leg| leg.mode == LegMode::Walking));
    assert_eq!(journey.arrival(), Some(departure + 700_000));
}

#[test]
fn s6_overnight_trip_found_by_day_rollback() {
    let mut builder = TimetableBuilder::new();
    let p = builder.add_stop("p", "Pier", 48.00, 11.00);
    let q = builder.add_stop("q", "Quay", 48.01, 11.00);
    // The night service exists on DAY only; its stop times run past 25 h.
    let service = builder.add_service(Service {
        weekdays: 1 << weekday(DAY),
        start_day: DAY,
        end_day: DAY,
        added_exceptions: Vec::new(),
        removed_exceptions: Vec::new(),
    });
    let line = builder.add_line("N1");
    let dep = 25 * HOUR + 20 * MINUTE;
    let arr = 25 * HOUR + 50 * MINUTE;
    builder
        .add_trip(line, service, "night-1", "Quay", &[(p, dep, dep), (q, arr, arr)])
        .unwrap();
    let data = builder.build().unwrap();
    assert_eq!(data.max_trip_day_length, 1);

    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    // 01:15 the next morning catches the trip that departed "yesterday".
    let journey = planner
        .route_transit(&mut rounds, &[p], q, at(DAY + 1, 1 * HOUR + 15 * MINUTE))
        .unwrap();

    assert_eq!(journey.legs.len(), 1);
    assert_eq!(journey.legs[0].departure, at(DAY, dep));
    assert_eq!(journey.arrival(), Some(at(DAY + 1, 1 * HOUR + 50 * MINUTE)));
}

/// Street vertex at A's side, transit A -> B, street vertex at B's side.
fn mixed_network() -> (Dataset, VertexId, VertexId) {
    let mut builder = TimetableBuilder::new();
    let a = builder.add_stop("a", "Alpha", 48.0000, 11.00);
    let b = builder.add_stop("b", "Beta", 48.0100, 11.00);
    let sv = builder.add_street_vertex(1, 48.0008, 11.00);
    let dv = builder.add_street_vertex(2, 48.0112, 11.00);
    builder.add_two_way_arc(sv, a, 2 * MINUTE, 0, 0);
    builder.add_two_way_arc(b, dv, 3 * MINUTE, 0, 0);
    let service = builder.add_service(daily());
    let line = builder.add_line("10");
    builder
        .add_trip(
            line,
            service,
            "trip-10-1",
            "Beta",
            &[(a, 8 * HOUR, 8 * HOUR), (b, 8 * HOUR + 10 * MINUTE, 8 * HOUR + 10 * MINUTE)],
        )
        .unwrap();
    (builder.build().unwrap(), sv, dv)
}

#[test]
fn walk_ride_walk_across_the_street_graph() {
    let (data, sv, dv) = mixed_network();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let journey = planner
        .route_transit(&mut rounds, &[sv], dv, at(DAY, 7 * HOUR + 50 * MINUTE))
        .unwrap();

    let modes: Vec<LegMode> = journey.legs.iter().map(|leg| leg.mode).collect();
    assert_eq!(modes, vec![LegMode::Walking, LegMode::Transit, LegMode::Walking]);

    // 08:10 arrival at B plus the 3 min walk.
    assert_eq!(journey.arrival(), Some(at(DAY, 8 * HOUR + 13 * MINUTE)));
    assert_eq!(
        rounds.earliest_arrivals.get(&dv),
        Some(&journey.arrival().unwrap())
    );

    // Leg boundaries are monotone in time.
    for pair in journey.legs.windows(2) {
        assert!(pair[1].departure >= pair[0].arrival);
    }
    // Stopovers within each leg are monotone too.
    for leg in &journey.legs {
        let mut previous = leg.departure;
        for stopover in &leg.stopovers {
            if let Some(arrival) = stopover.arrival {
                assert!(arrival >= previous);
                previous = arrival;
            }
            if let Some(departure) = stopover.departure {
                assert!(departure >= previous);
                previous = departure;
            }
        }
    }
}

/// A 6x6 walkable grid, ~100 m spacing, 130 s per edge.
fn grid_network() -> (Dataset, Vec<VertexId>) {
    let mut builder = TimetableBuilder::new();
    let mut ids = Vec::new();
    for i in 0..6i64 {
        for j in 0..6i64 {
            let id = builder.add_street_vertex(
                i * 6 + j,
                48.0 + i as f64 * 0.0009,
                11.0 + j as f64 * 0.0009,
            );
            ids.push(id);
        }
    }
    let cost = 130_000;
    for i in 0..6usize {
        for j in 0..6usize {
            if i + 1 < 6 {
                builder.add_two_way_arc(ids[i * 6 + j], ids[(i + 1) * 6 + j], cost, 0, 0);
            }
            if j + 1 < 6 {
                builder.add_two_way_arc(ids[i * 6 + j], ids[i * 6 + j + 1], cost, 0, 0);
            }
        }
    }
    (builder.build().unwrap(), ids)
}

#[test]
fn pure_walk_query_over_a_grid() {
    let (data, ids) = grid_network();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let origin = ids[0];
    let destination = ids[35];
    let journey = planner
        .route_street(&mut rounds, &[origin], destination, at(DAY, 9 * HOUR), Mode::Foot)
        .unwrap();

    assert_eq!(journey.legs.len(), 1);
    let leg = &journey.legs[0];
    assert_eq!(leg.mode, LegMode::Walking);
    // Ten grid edges on any shortest path.
    assert_eq!(leg.arrival, at(DAY, 9 * HOUR) + 10 * 130_000);
    assert_eq!(leg.stopovers.len(), 11);
}

#[test]
fn street_modes_respect_arc_permissions() {
    let mut builder = TimetableBuilder::new();
    let x = builder.add_street_vertex(1, 48.0000, 11.0);
    let y = builder.add_street_vertex(2, 48.0009, 11.0);
    let z = builder.add_street_vertex(3, 48.0018, 11.0);
    // X-Y allows everything, Y-Z has no cycling cost.
    builder.add_two_way_arc(x, y, 130_000, 30_000, 15_000);
    builder.add_two_way_arc(y, z, 130_000, 0, 15_000);
    let data = builder.build().unwrap();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let depart = at(DAY, 9 * HOUR);
    let result = planner.route_street(&mut rounds, &[x], z, depart, Mode::Bike);
    assert!(matches!(result, Err(Error::NoRoute)));

    let journey = planner
        .route_street(&mut rounds, &[x], z, depart, Mode::Car)
        .unwrap();
    assert_eq!(journey.legs[0].mode, LegMode::Driving);
    assert_eq!(journey.arrival(), Some(depart + 30_000));
}

#[test]
fn full_route_binds_locations_and_splices_endpoints() {
    let (data, _) = grid_network();
    let planner = planner(data);
    let mut rounds = planner.new_rounds();

    let request = RouteRequest {
        origin: Location { latitude: 48.0, longitude: 11.0 },
        destination: Location { latitude: 48.0 + 5.0 * 0.0009, longitude: 11.0 + 5.0 * 0.0009 },
        departure: at(DAY, 9 * HOUR),
        mode: RequestMode::Foot,
    };
    let journey = planner.route(&mut rounds, &request).unwrap();

    assert!(!journey.legs.is_empty());
    let first = journey.legs.first().unwrap();
    let last = journey.legs.last().unwrap();

    // The requested coordinates are grafted onto the journey endpoints.
    assert_eq!(first.origin.vertex, None);
    assert_eq!(first.origin.latitude, request.origin.latitude);
    assert_eq!(last.destination.vertex, None);
    assert_eq!(last.destination.latitude, request.destination.latitude);
    assert!(journey.arrival() >= journey.departure());
}

#[test]
fn transit_route_splices_padded_access_and_egress_legs() {
    let mut builder = TimetableBuilder::new();
    let a = builder.add_stop("a", "Alpha", 48.00, 11.00);
    let b = builder.add_stop("b", "Beta", 48.01, 11.00);
    // A dense walkable neighborhood around A keeps the destination stop
    // out of the origin's 30 candidate vertices.
    for i in 0..30i64 {
        let v = builder.add_street_vertex(100 + i, 48.0001 + i as f64 * 0.00001, 11.0001);
        builder.add_two_way_arc(a, v, 60_000, 0, 0);
    }
    let bv = builder.add_street_vertex(200, 48.0101, 11.0001);
    builder.add_two_way_arc(b, bv, 60_000, 0, 0);
    let service = builder.add_service(daily());
    let line = builder.add_line("10");
    builder
        .add_trip(
            line,
            service,
            "trip-10-1",
            "Beta",
            &[(a, 8 * HOUR, 8 * HOUR), (b, 8 * HOUR + 10 * MINUTE, 8 * HOUR + 10 * MINUTE)],
        )
        .unwrap();
    let data = builder.build().unwrap();

    let planner = planner(data);
    let mut rounds = planner.new_rounds();
    let request = RouteRequest {
        origin: Location { latitude: 48.00, longitude: 11.00 },
        destination: Location { latitude: 48.01, longitude: 11.00 },
        departure: at(DAY, 7 * HOUR + 55 * MINUTE),
        mode: RequestMode::Transit,
    };
    let journey = planner.route(&mut rounds, &request).unwrap();

    let modes: Vec<LegMode> = journey.legs.iter().map(|leg| leg.mode).collect();
    assert_eq!(modes, vec![LegMode::Walking, LegMode::Transit, LegMode::Walking]);

    // Access side: the synthetic walk ends one transfer padding before
    // the 08:00 boarding. The request point coincides with stop A, so
    // the walk itself takes no time.
    let access = &journey.legs[0];
    assert_eq!(access.origin.vertex, None);
    assert_eq!(access.origin.latitude, request.origin.latitude);
    assert_eq!(access.departure, at(DAY, 7 * HOUR + 58 * MINUTE));
    assert_eq!(access.arrival, at(DAY, 7 * HOUR + 58 * MINUTE));
    assert_eq!(access.stopovers.len(), 2);

    let ride = &journey.legs[1];
    assert_eq!(ride.departure, at(DAY, 8 * HOUR));
    assert_eq!(ride.arrival, at(DAY, 8 * HOUR + 10 * MINUTE));

    // Egress side: departs right at the ride's arrival, with no padding
    // on this side; the request point coincides with stop B.
    let egress = &journey.legs[2];
    assert_eq!(egress.destination.vertex, None);
    assert_eq!(egress.destination.latitude, request.destination.latitude);
    assert_eq!(egress.departure, at(DAY, 8 * HOUR + 10 * MINUTE));
    assert_eq!(egress.arrival, at(DAY, 8 * HOUR + 10 * MINUTE));
    assert_eq!(egress.stopovers.len(), 2);
}

#[test]
fn repeated_queries_are_deterministic() {
    let (data, a, c) = connection_network(8 * HOUR + 13 * MINUTE);
    let planner = planner(data);

    let mut first_rounds = planner.new_rounds();
    let first = planner
        .route_transit(&mut first_rounds, &[a], c, at(DAY, 7 * HOUR + 55 * MINUTE))
        .unwrap();

    let mut second_rounds = planner.new_rounds();
    let second = planner
        .route_transit(&mut second_rounds, &[a], c, at(DAY, 7 * HOUR + 55 * MINUTE))
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn pooled_rounds_are_reused_across_queries() {
    let (data, a, b) = single_trip_network();
    let planner = planner(data);
    let pool = RoundsPool::new(2, planner.config().transfer_limit);

    let arrival = {
        let mut rounds = pool.checkout();
        planner
            .route_transit(&mut rounds, &[a], b, at(DAY, 7 * HOUR + 55 * MINUTE))
            .unwrap()
            .arrival()
    };

    // The same instance, state wiped by the next session, must give the
    // same answer again.
    let mut rounds = pool.checkout();
    let journey = planner
        .route_transit(&mut rounds, &[a], b, at(DAY, 7 * HOUR + 55 * MINUTE))
        .unwrap();
    assert_eq!(journey.arrival(), arrival);
}

#[test]
fn cache_round_trip_preserves_dataset_and_journeys() {
    let (data, sv, dv) = mixed_network();
    let file = tempfile::NamedTempFile::new().unwrap();
    cache::save(&data, file.path()).unwrap();
    let reloaded = cache::load(file.path()).unwrap();

    // Identical modulo the rebuilt spatial indices, which serde skips.
    assert_eq!(
        serde_json::to_value(&data).unwrap(),
        serde_json::to_value(&reloaded).unwrap()
    );

    let departure = at(DAY, 7 * HOUR + 50 * MINUTE);
    let planner_original = planner(data);
    let planner_reloaded = planner(reloaded);
    let mut rounds = planner_original.new_rounds();

    let original = planner_original
        .route_transit(&mut rounds, &[sv], dv, departure)
        .unwrap();
    let from_cache = planner_reloaded
        .route_transit(&mut rounds, &[sv], dv, departure)
        .unwrap();
    assert_eq!(original, from_cache);
}
