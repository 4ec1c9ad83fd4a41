use thiserror::Error;

use crate::{
    aircraft::LegId,
    airport::AirportCode,
    commitment::ResourceId,
};

/// Failure of a collaborator store: I/O, or data that could not be decoded
/// into the tagged model at the store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("bad timestamp: {0}")]
    Format(#[from] chrono::ParseError),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("missing engine configuration")]
    MissingConfig,
}

/// Outcomes the engine surfaces to its caller as explicit failures.
///
/// A resource that cannot serve a leg is never an error; it is simply absent
/// from the ranking. A crew shortage is reported next to the ranking.
#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("leg {0} not found")]
    LegNotFound(LegId),

    #[error("route metadata for leg {0} not found")]
    RouteMetadataMissing(LegId),

    #[error("no route from {origin} to {dest}")]
    RouteNotFound {
        origin: AirportCode,
        dest: AirportCode,
    },

    #[error("leg {0} has no aircraft bound")]
    AircraftNotAssigned(LegId),

    #[error("{0} not found")]
    ResourceNotFound(ResourceId),

    #[error("{resource} is already committed to leg {conflicting} overlapping leg {leg}")]
    ConflictOnCommit {
        resource: ResourceId,
        leg: LegId,
        conflicting: LegId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssignmentError {
    /// Missing required context: the caller asked about something that does
    /// not exist, as opposed to a conflict it may resolve by re-ranking.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LegNotFound(_)
                | Self::RouteMetadataMissing(_)
                | Self::RouteNotFound { .. }
                | Self::AircraftNotAssigned(_)
                | Self::ResourceNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictOnCommit { .. })
    }
}
