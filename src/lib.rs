//! Multimodal journey planning over a fused transit + street network.
//!
//! The crate combines a round-based RAPTOR search over scheduled transit
//! with Dijkstra/A* transfer rounds over the street graph. Transit stops
//! and street junctions share one dense vertex space, so a journey can
//! freely alternate between riding vehicles and moving through the street
//! network on foot, by bike or by car.
//!
//! The immutable [`model::Dataset`] is built once (see [`loading`]) and
//! shared read-only across any number of concurrent queries; each query
//! borrows a reusable [`routing::Rounds`] scratch instance, typically from
//! a [`routing::RoundsPool`].

pub mod error;
pub mod loading;
pub mod model;
pub mod prelude;
pub mod routing;

pub use error::Error;

/// Index of a vertex in the fused graph. Transit stops and street
/// junctions share this id space.
pub type VertexId = u64;
/// Index of a RAPTOR route (a maximal set of trips with an identical
/// ordered stop sequence).
pub type RouteId = u32;
/// Index of a concrete trip.
pub type TripId = u32;
/// Index of a service calendar.
pub type ServiceId = u32;
/// Absolute time in milliseconds since the Unix epoch.
pub type TimeMs = u64;
/// Whole days since the Unix epoch. Day 0 was a Thursday.
pub type DayNumber = u32;

/// Milliseconds in one day.
pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;
