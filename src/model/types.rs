//! Core types of the fused routing model.

use serde::{Deserialize, Serialize};

use crate::{DayNumber, Error, RouteId, ServiceId, TimeMs, TripId, VertexId, DAY_MS};

/// Transit-stop descriptor attached to a vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopInfo {
    /// External (feed) stop id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A point on the combined graph. Every transit stop is a vertex, every
/// street junction is a vertex; they share one dense id space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub latitude: f64,
    pub longitude: f64,
    /// Present iff this vertex is a transit stop.
    pub stop: Option<StopInfo>,
}

impl Vertex {
    pub fn is_stop(&self) -> bool {
        self.stop.is_some()
    }
}

/// A directed street edge with one traversal cost per mode, in
/// milliseconds. A zero cost prohibits the mode on this arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetArc {
    pub target: VertexId,
    pub walk_ms: u32,
    pub cycle_ms: u32,
    pub car_ms: u32,
}

impl StreetArc {
    pub fn cost(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Foot => self.walk_ms,
            Mode::Bike => self.cycle_ms,
            Mode::Car => self.car_ms,
        }
    }
}

/// One scheduled stop event of a trip. Offsets are milliseconds since the
/// trip's day-0 midnight and may exceed 24 h for trips crossing midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stopover {
    pub arrival: u32,
    pub departure: u32,
}

impl Stopover {
    pub fn arrival_at_day(&self, day: DayNumber) -> TimeMs {
        TimeMs::from(self.arrival) + TimeMs::from(day) * DAY_MS
    }

    pub fn departure_at_day(&self, day: DayNumber) -> TimeMs {
        TimeMs::from(self.departure) + TimeMs::from(day) * DAY_MS
    }
}

/// One concrete run: a service calendar plus one stop event per stop of
/// its route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub service: ServiceId,
    pub stop_times: Vec<Stopover>,
}

/// A route in the RAPTOR sense: the maximal set of trips sharing the exact
/// same ordered stop sequence. Trips are sorted by departure at the first
/// stop; deviating downstream orderings are patched by reorder
/// permutations stored on the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub stops: Vec<VertexId>,
    pub trips: Vec<TripId>,
}

/// Membership of a stop vertex in a route, with its position in the
/// route's stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRoutePair {
    pub route: RouteId,
    pub stop_index: u32,
}

/// Returns the weekday index of a day number, 0 = Monday-relative
/// numbering with `(day + 4) % 7` (day 0 of the Unix epoch was a
/// Thursday).
pub fn weekday(day: DayNumber) -> u8 {
    ((day + 4) % 7) as u8
}

/// A service calendar: active weekdays over an inclusive day range, plus
/// sorted added/removed exception days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Bitfield; bit `i` corresponds to weekday index `i` (see [`weekday`]).
    pub weekdays: u8,
    pub start_day: DayNumber,
    pub end_day: DayNumber,
    pub added_exceptions: Vec<DayNumber>,
    pub removed_exceptions: Vec<DayNumber>,
}

impl Service {
    pub fn runs_on(&self, day: DayNumber) -> bool {
        if day < self.start_day || day > self.end_day {
            return false;
        }
        if self.removed_exceptions.binary_search(&day).is_ok() {
            return false;
        }
        if self.added_exceptions.binary_search(&day).is_ok() {
            return true;
        }
        self.weekdays & (1 << weekday(day)) != 0
    }
}

/// Display metadata of an external (feed) route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub short_name: String,
}

/// Display metadata of a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripInfo {
    /// External (feed) trip id.
    pub id: String,
    pub headsign: String,
}

/// A street travel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Foot,
    Bike,
    Car,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Foot, Mode::Bike, Mode::Car];

    /// Position of this mode in vehicle bitmasks.
    pub fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// A mode requested by the caller. Transit implies walking for transfers;
/// the street modes are standalone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Foot,
    Bike,
    Car,
    Transit,
}

impl RequestMode {
    /// The street mode used for transfers and location binding.
    pub fn street_mode(self) -> Mode {
        match self {
            RequestMode::Foot | RequestMode::Transit => Mode::Foot,
            RequestMode::Bike => Mode::Bike,
            RequestMode::Car => Mode::Car,
        }
    }
}

impl std::str::FromStr for RequestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "foot" => Ok(RequestMode::Foot),
            "bike" => Ok(RequestMode::Bike),
            "car" => Ok(RequestMode::Car),
            "transit" => Ok(RequestMode::Transit),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}
