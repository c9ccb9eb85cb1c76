//! Data model for multimodal routing: the fused transit + street dataset
//! and its spatial indices.

pub mod dataset;
pub mod geometry;
pub mod spatial;
pub mod types;

pub use dataset::{reorder_key, Dataset};
pub use spatial::VertexTrees;
pub use types::{
    weekday, Mode, RequestMode, Route, RouteInfo, Service, StopInfo, StopRoutePair, Stopover,
    StreetArc, Trip, TripInfo, Vertex,
};
