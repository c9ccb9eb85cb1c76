//! Dataset preparation: timetable assembly, stop stitching and the
//! snapshot cache. Parsing of external feed formats is the caller's
//! concern; this module starts from already-decoded vertices, services
//! and trips.

pub mod cache;
pub mod stitch;
pub mod timetable;

pub use stitch::connect_stops;
pub use timetable::TimetableBuilder;
