//! The routing engine: per-query state, the two scanners, the planner
//! driving them, and journey reconstruction.

pub mod journey;
pub mod planner;
pub mod rounds;
mod transfer;
mod transit;

pub use journey::{Journey, JourneyLeg, LegMode, LegStopover, LineInfo, Place};
pub use planner::{Location, Planner, PlannerConfig, RouteRequest};
pub use rounds::{LegKind, PooledRounds, Rounds, RoundsPool, StopArrival};
