use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The destination is unreachable within the transfer limit, even
    /// after the unrestricted fallback round. A normal query outcome.
    #[error("no route found")]
    NoRoute,
    #[error("unknown mode: {0}")]
    UnknownMode(String),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("no origin vertex found for the provided location")]
    NoOriginMatch,
    #[error("no destination vertex found for the provided location")]
    NoDestinationMatch,
    /// A structural dataset invariant does not hold.
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
