//! Journey reconstruction: walk the round labels backward from the
//! destination and synthesize an ordered list of legs.

use hashbrown::HashMap;

use crate::model::{Dataset, StopInfo};
use crate::routing::rounds::{LegKind, Rounds, StopArrival};
use crate::{DayNumber, Error, TimeMs, TripId, VertexId};

/// How a leg is traveled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegMode {
    Walking,
    Cycling,
    Driving,
    Transit,
}

/// A named point of a journey. `vertex` is absent for the synthetic
/// endpoints grafted onto the journey from the request coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub vertex: Option<VertexId>,
    pub latitude: f64,
    pub longitude: f64,
    pub stop: Option<StopInfo>,
}

impl Place {
    pub(crate) fn at_vertex(data: &Dataset, vertex: VertexId) -> Place {
        let v = &data.vertices[vertex as usize];
        Place {
            vertex: Some(vertex),
            latitude: v.latitude,
            longitude: v.longitude,
            stop: v.stop.clone(),
        }
    }
}

/// One stop event within a leg. The first stopover of a leg has no
/// arrival and the last no departure.
#[derive(Debug, Clone, PartialEq)]
pub struct LegStopover {
    pub place: Place,
    pub arrival: Option<TimeMs>,
    pub departure: Option<TimeMs>,
}

/// Transit line display data.
#[derive(Debug, Clone, PartialEq)]
pub struct LineInfo {
    pub name: String,
    pub trip_id: String,
    pub headsign: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JourneyLeg {
    pub mode: LegMode,
    pub origin: Place,
    pub destination: Place,
    pub departure: TimeMs,
    pub arrival: TimeMs,
    pub stopovers: Vec<LegStopover>,
    /// Present on transit legs only.
    pub line: Option<LineInfo>,
}

/// An ordered origin-to-destination sequence of legs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Journey {
    pub legs: Vec<JourneyLeg>,
}

impl Journey {
    pub fn departure(&self) -> Option<TimeMs> {
        self.legs.first().map(|leg| leg.departure)
    }

    pub fn arrival(&self) -> Option<TimeMs> {
        self.legs.last().map(|leg| leg.arrival)
    }
}

/// Walks backward from `destination` starting at `last_round` and emits
/// legs in reverse, then flips them into origin-to-destination order.
pub(crate) fn reconstruct(
    data: &Dataset,
    rounds: &Rounds,
    destination: VertexId,
    last_round: usize,
) -> Result<Journey, Error> {
    let mut legs = Vec::new();
    let mut position = destination;
    let mut index = last_round;

    while index > 0 {
        let label = rounds.rounds[index].get(&position).ok_or_else(|| {
            Error::InvalidData(format!("no label for vertex {position} in round {index}"))
        })?;

        match label.leg {
            LegKind::NoChange => {}
            LegKind::Origin => break,
            LegKind::Walk | LegKind::Cycle | LegKind::Car => {
                let (leg, tail) = street_leg(data, &rounds.rounds[index], position, label.leg)?;
                legs.push(leg);
                position = tail;
            }
            LegKind::Transit(trip_id) => {
                let (leg, boarded_at) =
                    transit_leg(data, &rounds.rounds[index - 1], label, trip_id)?;
                legs.push(leg);
                position = boarded_at;
            }
        }

        index -= 1;
    }

    legs.reverse();
    Ok(Journey { legs })
}

/// Follows a same-kind chain of street labels backward through
/// `enter_key` and emits one leg covering the collected vertex path.
fn street_leg(
    data: &Dataset,
    round: &HashMap<VertexId, StopArrival>,
    destination: VertexId,
    kind: LegKind,
) -> Result<(JourneyLeg, VertexId), Error> {
    let mut position = destination;
    let mut label = round
        .get(&position)
        .ok_or_else(|| Error::InvalidData(format!("no label for vertex {position}")))?;
    let mut path = vec![position];

    while label.leg == kind {
        let previous_position = label.enter_key;
        let previous = round.get(&previous_position).ok_or_else(|| {
            Error::InvalidData(format!(
                "street chain references vertex {previous_position} with no label"
            ))
        })?;
        if previous.arrival > label.arrival {
            return Err(Error::InvalidData(format!(
                "street predecessor {previous_position} arrives after its successor {position}"
            )));
        }
        position = previous_position;
        label = previous;
        path.push(position);
    }

    let mut stopovers = Vec::with_capacity(path.len());
    for (i, &stop) in path.iter().rev().enumerate() {
        let arrival = round[&stop].arrival;
        stopovers.push(LegStopover {
            place: Place::at_vertex(data, stop),
            arrival: (i != 0).then_some(arrival),
            departure: (i != path.len() - 1).then_some(arrival),
        });
    }

    let mode = match kind {
        LegKind::Cycle => LegMode::Cycling,
        LegKind::Car => LegMode::Driving,
        _ => LegMode::Walking,
    };
    let leg = JourneyLeg {
        mode,
        origin: Place::at_vertex(data, position),
        destination: Place::at_vertex(data, destination),
        departure: round[&position].arrival,
        arrival: round[&destination].arrival,
        stopovers,
        line: None,
    };

    Ok((leg, position))
}

/// Emits the transit leg recorded in `label` (trip, alight position and
/// departure day). The boarding position is the nearest position before
/// the alight position whose stop holds a previous-round label.
fn transit_leg(
    data: &Dataset,
    previous_round: &HashMap<VertexId, StopArrival>,
    label: &StopArrival,
    trip_id: TripId,
) -> Result<(JourneyLeg, VertexId), Error> {
    let trip = &data.trips[trip_id as usize];
    let route_id = data.trip_to_route[trip_id as usize];
    let route = &data.routes[route_id as usize];
    let alight = label.enter_key as usize;
    let day = label.departure as DayNumber;

    let mut board = 0;
    for pos in (0..alight).rev() {
        if previous_round.contains_key(&route.stops[pos]) {
            board = pos;
            break;
        }
    }
    if board == 0 && !previous_round.contains_key(&route.stops[0]) {
        return Err(Error::InvalidData(format!(
            "no boarding position for trip {trip_id} on route {route_id}"
        )));
    }

    let stopovers: Vec<LegStopover> = (board..=alight)
        .map(|pos| LegStopover {
            place: Place::at_vertex(data, route.stops[pos]),
            arrival: Some(trip.stop_times[pos].arrival_at_day(day)),
            departure: Some(trip.stop_times[pos].departure_at_day(day)),
        })
        .collect();

    let info = &data.trip_info[trip_id as usize];
    let line = LineInfo {
        name: data.route_info[data.gtfs_route_index[route_id as usize] as usize]
            .short_name
            .clone(),
        trip_id: info.id.clone(),
        headsign: info.headsign.clone(),
    };

    let leg = JourneyLeg {
        mode: LegMode::Transit,
        origin: Place::at_vertex(data, route.stops[board]),
        destination: Place::at_vertex(data, route.stops[alight]),
        departure: trip.stop_times[board].departure_at_day(day),
        arrival: trip.stop_times[alight].arrival_at_day(day),
        stopovers,
        line: Some(line),
    };

    Ok((leg, route.stops[board]))
}
