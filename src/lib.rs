//! Assignment engine for scheduled airline legs: ranks the aircraft and
//! crew able to fly a leg and commits the chosen ones without double-booking.

pub mod aircraft;
pub mod airport;
pub mod chain;
pub mod commitment;
pub mod config;
pub mod crew;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod ferry;
pub mod location;
pub mod logger;
pub mod model;
pub mod scenario;
pub mod store;

pub use aircraft::{Aircraft, AircraftId, AircraftSize, HaulClass, Leg, LegId};
pub use airport::{AirportCode, Route};
pub use commitment::ResourceId;
pub use config::EngineConfig;
pub use crew::{CrewId, CrewMember, CrewRequirement, CrewRole, MatchQuality};
pub use dispatcher::{
    Annotation, CandidateResult, CandidateStatus, CrewPlan, Dispatcher, LegRequest, Shortage,
};
pub use error::{AssignmentError, StoreError};
pub use model::Model;
pub use scenario::SqliteStore;
pub use store::{FleetStore, ScheduleStore, Store};
