//! Contracts the engine consumes from the surrounding application.
//!
//! Implementations decode their raw rows into the tagged model here, at the
//! boundary; engine logic never sees unparsed text.

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    aircraft::{Aircraft, AircraftId, AircraftSize, LegId},
    airport::{AirportCode, Route},
    commitment::ResourceId,
    crew::{CrewId, CrewMember, CrewRole},
    error::StoreError,
};

/// Operational context of an existing leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegContext {
    pub id: LegId,
    pub origin: AirportCode,
    pub dest: AirportCode,
    pub departure: DateTime<Utc>,
    pub duration: TimeDelta,
    /// Size of the bound aircraft, if one is bound yet.
    pub aircraft_size: Option<AircraftSize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegLookup {
    Found(LegContext),
    /// The leg exists but its route row does not.
    RouteMissing,
    NotFound,
}

/// Where a resource landed last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastArrival {
    pub leg: LegId,
    pub location: AirportCode,
    pub arrival: DateTime<Utc>,
}

/// A resource's next committed departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextDeparture {
    pub leg: LegId,
    pub location: AirportCode,
    pub departure: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The resource already flies `conflicting` inside the leg's buffered window.
    Conflict {
        resource: ResourceId,
        conflicting: LegId,
    },
    LegMissing,
    ResourceMissing(ResourceId),
}

/// Resource identities, static attributes, and availability pools.
pub trait FleetStore {
    fn aircraft(&self, id: AircraftId) -> Result<Option<Aircraft>, StoreError>;
    fn crew_member(&self, id: CrewId) -> Result<Option<CrewMember>, StoreError>;

    /// Aircraft with no committed flight time intersecting `[window_start, window_end]`.
    fn uncommitted_aircraft(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Aircraft>, StoreError>;

    /// Crew of `role` with no committed flight time intersecting the window.
    fn uncommitted_crew(
        &self,
        role: CrewRole,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CrewMember>, StoreError>;
}

/// Committed legs, the route catalog, and assignment write-back.
pub trait ScheduleStore {
    fn leg_context(&self, leg: LegId) -> Result<LegLookup, StoreError>;

    fn route(&self, from: AirportCode, to: AirportCode) -> Result<Option<Route>, StoreError>;

    /// Latest non-cancelled scheduled leg `from → to` that arrives no later than `arrive_by`.
    fn connecting_leg(
        &self,
        from: AirportCode,
        to: AirportCode,
        arrive_by: DateTime<Utc>,
    ) -> Result<Option<LegId>, StoreError>;

    /// Destination of the resource's latest commitment departing before `before`.
    fn last_arrival_before(
        &self,
        resource: ResourceId,
        before: DateTime<Utc>,
    ) -> Result<Option<LastArrival>, StoreError>;

    /// Earliest commitment of the resource departing after `after`.
    fn next_departure_after(
        &self,
        resource: ResourceId,
        after: DateTime<Utc>,
    ) -> Result<Option<NextDeparture>, StoreError>;

    /// Binds the aircraft to the leg, replacing any previous aircraft.
    /// Must re-check overlap and write atomically.
    fn commit_aircraft(
        &self,
        leg: LegId,
        aircraft: AircraftId,
        turnaround: TimeDelta,
    ) -> Result<CommitOutcome, StoreError>;

    /// Replaces the leg's crew list. Must re-check every member and write
    /// atomically; on any conflict nothing is written.
    fn commit_crew(
        &self,
        leg: LegId,
        crew: &[CrewId],
        turnaround: TimeDelta,
    ) -> Result<CommitOutcome, StoreError>;
}

/// Everything the dispatcher needs from its collaborator.
pub trait Store: FleetStore + ScheduleStore {}

impl<T: FleetStore + ScheduleStore + ?Sized> Store for T {}
