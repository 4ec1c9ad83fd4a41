//! In-memory schedule and fleet. Implements both store contracts, so it
//! serves as the engine's collaborator in tests and embedded use.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::{
    aircraft::{Aircraft, AircraftId, Leg, LegId},
    airport::{AirportCode, Route},
    commitment::{buffered_window, Commitment, CommitmentIndex, ResourceId},
    crew::{CrewId, CrewMember, CrewRole},
    error::StoreError,
    store::{
        CommitOutcome, FleetStore, LastArrival, LegContext, LegLookup, NextDeparture,
        ScheduleStore,
    },
};

#[derive(Default)]
struct Schedule {
    legs: HashMap<LegId, Leg>,
    crew_assignments: HashMap<LegId, Vec<CrewId>>,
    index: CommitmentIndex,
    next_leg_id: LegId,
}

impl Schedule {
    fn commitments_of(&self, resource: ResourceId) -> Vec<Commitment> {
        let mut commitments: Vec<Commitment> = self
            .index
            .legs_of(resource)
            .into_iter()
            .filter_map(|id| self.legs.get(&id))
            .map(|leg| Commitment::new(resource, leg))
            .collect();
        commitments.sort_by_key(|c| (c.departure, c.leg));
        commitments
    }

    fn live_leg(&self, id: LegId) -> Option<&Leg> {
        self.legs.get(&id).filter(|leg| !leg.cancelled)
    }

    fn set_aircraft(&mut self, id: LegId, aircraft: AircraftId) {
        let Some(leg) = self.legs.get_mut(&id) else {
            return;
        };
        if let Some(previous) = leg.aircraft.replace(aircraft) {
            self.index.remove(ResourceId::Aircraft(previous), id);
        }
        let commitment = Commitment::new(ResourceId::Aircraft(aircraft), leg);
        self.index.insert(&commitment);
    }

    fn set_crew(&mut self, id: LegId, crew: Vec<CrewId>) {
        let Some(leg) = self.legs.get(&id) else {
            return;
        };
        for previous in self.crew_assignments.remove(&id).unwrap_or_default() {
            self.index.remove(ResourceId::Crew(previous), id);
        }
        for member in &crew {
            self.index
                .insert(&Commitment::new(ResourceId::Crew(*member), leg));
        }
        self.crew_assignments.insert(id, crew);
    }
}

pub struct Model {
    pub fleet: HashMap<AircraftId, Aircraft>,
    pub crew: HashMap<CrewId, CrewMember>,
    pub routes: HashMap<(AirportCode, AirportCode), Route>,
    schedule: RwLock<Schedule>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            fleet: HashMap::new(),
            crew: HashMap::new(),
            routes: HashMap::new(),
            schedule: RwLock::new(Schedule {
                next_leg_id: 1,
                ..Schedule::default()
            }),
        }
    }

    pub fn add_aircraft(&mut self, aircraft: Aircraft) {
        self.fleet.insert(aircraft.id, aircraft);
    }

    pub fn add_crew(&mut self, member: CrewMember) {
        self.crew.insert(member.id, member);
    }

    pub fn add_route(&mut self, origin: AirportCode, dest: AirportCode, duration: TimeDelta) {
        self.routes.insert(
            (origin, dest),
            Route {
                origin,
                dest,
                duration,
            },
        );
    }

    pub fn add_leg(
        &mut self,
        origin: AirportCode,
        dest: AirportCode,
        departure: DateTime<Utc>,
        duration: TimeDelta,
    ) -> LegId {
        let schedule = self.schedule.get_mut();
        let id = schedule.next_leg_id;
        schedule.next_leg_id += 1;
        schedule.legs.insert(
            id,
            Leg {
                id,
                origin,
                dest,
                departure,
                duration,
                aircraft: None,
                cancelled: false,
            },
        );
        id
    }

    /// Schedules a leg whose duration comes from the route catalog.
    pub fn add_leg_on_route(
        &mut self,
        origin: AirportCode,
        dest: AirportCode,
        departure: DateTime<Utc>,
    ) -> Option<LegId> {
        let duration = self.routes.get(&(origin, dest))?.duration;
        Some(self.add_leg(origin, dest, departure, duration))
    }

    /// Binds without any feasibility check, for loading an existing schedule.
    pub fn bind_aircraft(&mut self, leg: LegId, aircraft: AircraftId) -> Result<(), StoreError> {
        let schedule = self.schedule.get_mut();
        if !schedule.legs.contains_key(&leg) {
            return Err(StoreError::InvalidRecord(format!("no leg {}", leg)));
        }
        schedule.set_aircraft(leg, aircraft);
        Ok(())
    }

    /// Replaces the crew list without any feasibility check.
    pub fn bind_crew(&mut self, leg: LegId, crew: &[CrewId]) -> Result<(), StoreError> {
        let schedule = self.schedule.get_mut();
        if !schedule.legs.contains_key(&leg) {
            return Err(StoreError::InvalidRecord(format!("no leg {}", leg)));
        }
        schedule.set_crew(leg, crew.to_vec());
        Ok(())
    }

    /// Cancelled legs stay on record but release their resources.
    pub fn cancel_leg(&mut self, id: LegId) -> bool {
        let schedule = self.schedule.get_mut();
        let Some(leg) = schedule.legs.get_mut(&id) else {
            return false;
        };
        leg.cancelled = true;
        if let Some(aircraft) = leg.aircraft {
            schedule.index.remove(ResourceId::Aircraft(aircraft), id);
        }
        for member in schedule.crew_assignments.get(&id).into_iter().flatten() {
            schedule.index.remove(ResourceId::Crew(*member), id);
        }
        true
    }

    pub fn leg(&self, id: LegId) -> Option<Leg> {
        self.schedule.read().legs.get(&id).cloned()
    }

    pub fn crew_of(&self, id: LegId) -> Vec<CrewId> {
        self.schedule
            .read()
            .crew_assignments
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Live commitments of a resource, by departure.
    pub fn commitments(&self, resource: ResourceId) -> Vec<Commitment> {
        self.schedule.read().commitments_of(resource)
    }
}

impl FleetStore for Model {
    fn aircraft(&self, id: AircraftId) -> Result<Option<Aircraft>, StoreError> {
        Ok(self.fleet.get(&id).cloned())
    }

    fn crew_member(&self, id: CrewId) -> Result<Option<CrewMember>, StoreError> {
        Ok(self.crew.get(&id).cloned())
    }

    fn uncommitted_aircraft(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Aircraft>, StoreError> {
        let schedule = self.schedule.read();
        let mut pool: Vec<Aircraft> = self
            .fleet
            .values()
            .filter(|a| {
                schedule
                    .index
                    .is_free(ResourceId::Aircraft(a.id), window_start, window_end)
            })
            .cloned()
            .collect();
        pool.sort_by_key(|a| a.id);
        Ok(pool)
    }

    fn uncommitted_crew(
        &self,
        role: CrewRole,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CrewMember>, StoreError> {
        let schedule = self.schedule.read();
        let mut pool: Vec<CrewMember> = self
            .crew
            .values()
            .filter(|c| c.role == role)
            .filter(|c| {
                schedule
                    .index
                    .is_free(ResourceId::Crew(c.id), window_start, window_end)
            })
            .cloned()
            .collect();
        pool.sort_by_key(|c| c.id);
        Ok(pool)
    }
}

impl ScheduleStore for Model {
    fn leg_context(&self, id: LegId) -> Result<LegLookup, StoreError> {
        let schedule = self.schedule.read();
        let Some(leg) = schedule.live_leg(id) else {
            return Ok(LegLookup::NotFound);
        };
        Ok(LegLookup::Found(LegContext {
            id,
            origin: leg.origin,
            dest: leg.dest,
            departure: leg.departure,
            duration: leg.duration,
            aircraft_size: leg
                .aircraft
                .and_then(|a| self.fleet.get(&a))
                .map(|a| a.size),
        }))
    }

    fn route(&self, from: AirportCode, to: AirportCode) -> Result<Option<Route>, StoreError> {
        Ok(self.routes.get(&(from, to)).cloned())
    }

    fn connecting_leg(
        &self,
        from: AirportCode,
        to: AirportCode,
        arrive_by: DateTime<Utc>,
    ) -> Result<Option<LegId>, StoreError> {
        Ok(self
            .schedule
            .read()
            .legs
            .values()
            .filter(|l| !l.cancelled && l.origin == from && l.dest == to)
            .filter(|l| l.arrival() <= arrive_by)
            .max_by_key(|l| (l.departure, l.id))
            .map(|l| l.id))
    }

    fn last_arrival_before(
        &self,
        resource: ResourceId,
        before: DateTime<Utc>,
    ) -> Result<Option<LastArrival>, StoreError> {
        Ok(self
            .schedule
            .read()
            .commitments_of(resource)
            .into_iter()
            .filter(|c| c.departure < before)
            .last()
            .map(|c| LastArrival {
                leg: c.leg,
                location: c.dest,
                arrival: c.arrival,
            }))
    }

    fn next_departure_after(
        &self,
        resource: ResourceId,
        after: DateTime<Utc>,
    ) -> Result<Option<NextDeparture>, StoreError> {
        Ok(self
            .schedule
            .read()
            .commitments_of(resource)
            .into_iter()
            .find(|c| c.departure > after)
            .map(|c| NextDeparture {
                leg: c.leg,
                location: c.origin,
                departure: c.departure,
            }))
    }

    fn commit_aircraft(
        &self,
        leg: LegId,
        aircraft: AircraftId,
        turnaround: TimeDelta,
    ) -> Result<CommitOutcome, StoreError> {
        let resource = ResourceId::Aircraft(aircraft);
        if !self.fleet.contains_key(&aircraft) {
            return Ok(CommitOutcome::ResourceMissing(resource));
        }
        let mut schedule = self.schedule.write();
        let Some(target) = schedule.live_leg(leg) else {
            return Ok(CommitOutcome::LegMissing);
        };
        let (start, end) = buffered_window(target.departure, target.arrival(), turnaround);
        if let Some(conflicting) = schedule.index.conflict(resource, start, end, Some(leg)) {
            return Ok(CommitOutcome::Conflict {
                resource,
                conflicting,
            });
        }
        schedule.set_aircraft(leg, aircraft);
        Ok(CommitOutcome::Committed)
    }

    fn commit_crew(
        &self,
        leg: LegId,
        crew: &[CrewId],
        turnaround: TimeDelta,
    ) -> Result<CommitOutcome, StoreError> {
        if let Some(missing) = crew.iter().find(|id| !self.crew.contains_key(id)) {
            return Ok(CommitOutcome::ResourceMissing(ResourceId::Crew(*missing)));
        }
        let mut schedule = self.schedule.write();
        let Some(target) = schedule.live_leg(leg) else {
            return Ok(CommitOutcome::LegMissing);
        };
        let (start, end) = buffered_window(target.departure, target.arrival(), turnaround);
        for member in crew {
            let resource = ResourceId::Crew(*member);
            if let Some(conflicting) = schedule.index.conflict(resource, start, end, Some(leg)) {
                return Ok(CommitOutcome::Conflict {
                    resource,
                    conflicting,
                });
            }
        }
        let mut members = crew.to_vec();
        members.sort_unstable();
        members.dedup();
        schedule.set_crew(leg, members);
        Ok(CommitOutcome::Committed)
    }
}
