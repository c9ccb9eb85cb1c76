//! Re-exports of the public API surface.

pub use crate::error::Error;
pub use crate::loading::{cache, connect_stops, TimetableBuilder};
pub use crate::model::{Dataset, Mode, RequestMode, Service, StopInfo, Vertex};
pub use crate::routing::{
    Journey, JourneyLeg, LegMode, Location, Planner, PlannerConfig, RouteRequest, Rounds,
    RoundsPool,
};
pub use crate::{DayNumber, RouteId, ServiceId, TimeMs, TripId, VertexId, DAY_MS};
