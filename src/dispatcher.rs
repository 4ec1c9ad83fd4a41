//! Entity responsible for matching resources (aircraft, crew) to legs and
//! writing the chosen assignment back.
//!
//! Responsibilities:
//! - Resolve the leg being staffed (existing leg, planned leg, or route lookup)
//! - Fetch the pool of resources not busy around the leg
//! - Filter the pool by capability, location and the resource's next commitment
//! - Score and order survivors; crew are additionally cut to quota
//! - Commit a chosen assignment, re-checking overlap inside the store

use std::{cmp::Ordering, fmt, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    aircraft::{Aircraft, AircraftId, AircraftSize, HaulClass, LegId},
    airport::AirportCode,
    chain::check_future_chain,
    commitment::{buffered_window, ResourceId},
    config::EngineConfig,
    crew::{CrewId, CrewMember, CrewRequirement, CrewRole, MatchQuality},
    error::{AssignmentError, StoreError},
    ferry::plan_reposition,
    location::location_of,
    store::{CommitOutcome, LegLookup, ScheduleStore, Store},
};

/// Common projection of anything the engine can assign.
pub trait Resource: Clone {
    fn resource_id(&self) -> ResourceId;
    fn home_base(&self) -> Option<AirportCode>;
    fn display_name(&self) -> String;
}

impl Resource for Aircraft {
    fn resource_id(&self) -> ResourceId {
        ResourceId::Aircraft(self.id)
    }
    fn home_base(&self) -> Option<AirportCode> {
        self.home_base
    }
    fn display_name(&self) -> String {
        format!("{} #{} ({})", self.manufacturer, self.id, self.size)
    }
}

impl Resource for CrewMember {
    fn resource_id(&self) -> ResourceId {
        ResourceId::Crew(self.id)
    }
    fn home_base(&self) -> Option<AirportCode> {
        self.home_base
    }
    fn display_name(&self) -> String {
        CrewMember::display_name(self)
    }
}

/// The leg a ranking is computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegRequest {
    /// A leg already in the schedule
    Existing(LegId),
    /// A leg not yet created, with explicit duration
    Planned {
        origin: AirportCode,
        dest: AirportCode,
        departure: DateTime<Utc>,
        duration: TimeDelta,
    },
    /// A leg not yet created, duration taken from the route catalog
    OnRoute {
        origin: AirportCode,
        dest: AirportCode,
        departure: DateTime<Utc>,
    },
}

/// Resolved parameters of the leg being staffed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegParams {
    pub leg: Option<LegId>,
    pub origin: AirportCode,
    pub dest: AirportCode,
    pub departure: DateTime<Utc>,
    pub duration: TimeDelta,
    pub haul: HaulClass,
    pub aircraft_size: Option<AircraftSize>,
}

impl LegParams {
    #[inline]
    pub fn arrival(&self) -> DateTime<Utc> {
        self.departure + self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Local,
    Ferry { from: AirportCode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    InefficientSize,
    Match(MatchQuality),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InefficientSize => "Inefficient Size",
            Self::Match(MatchQuality::Perfect) => "Perfect Match",
            Self::Match(MatchQuality::Standard) => "Standard Match",
            Self::Match(MatchQuality::Overqualified) => "Overqualified",
        })
    }
}

/// One surviving candidate. Produced fresh per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateResult<R> {
    pub resource: R,
    pub status: CandidateStatus,
    /// Lower is better
    pub score: u32,
    pub ferry_needed: bool,
    /// Scheduled leg that could carry the resource to the origin
    pub connecting_leg: Option<LegId>,
    pub annotation: Option<Annotation>,
}

impl<R> CandidateResult<R> {
    /// Human-readable status, e.g. `Requires Ferry from LHR (Inefficient Size)`.
    pub fn describe(&self) -> String {
        let base = match self.status {
            CandidateStatus::Local => "Available Locally".to_owned(),
            CandidateStatus::Ferry { from } => format!("Requires Ferry from {}", from),
        };
        match self.annotation {
            Some(annotation) => format!("{} ({})", base, annotation),
            None => base,
        }
    }
}

/// Per-kind rules plugged into the shared filter/score pipeline.
pub trait SelectionPolicy {
    type Resource: Resource;

    /// Capability gate: may this resource work a leg of this class at all?
    fn admits(&self, resource: &Self::Resource, haul: HaulClass) -> bool;

    /// Efficiency penalty and annotation for an admitted resource.
    fn assess(
        &self,
        resource: &Self::Resource,
        haul: HaulClass,
        config: &EngineConfig,
    ) -> (u32, Option<Annotation>);

    /// Order between equally scored candidates.
    fn tie_break(
        &self,
        a: &CandidateResult<Self::Resource>,
        b: &CandidateResult<Self::Resource>,
    ) -> Ordering;
}

/// Filters and scores `pool` for `leg`, best candidate first.
///
/// The pool must already exclude resources busy inside the leg's buffered
/// window. Candidates that cannot serve the leg are dropped silently.
pub fn rank<S, P>(
    store: &S,
    policy: &P,
    leg: &LegParams,
    pool: Vec<P::Resource>,
    config: &EngineConfig,
) -> Result<Vec<CandidateResult<P::Resource>>, StoreError>
where
    S: ScheduleStore + ?Sized,
    P: SelectionPolicy,
{
    let mut ranked = Vec::with_capacity(pool.len());
    for resource in pool {
        let id = resource.resource_id();
        if !policy.admits(&resource, leg.haul) {
            debug!(%id, haul = %leg.haul, "discarded: not capable");
            continue;
        }

        let fact = location_of(store, id, resource.home_base(), leg.departure, config)?;
        let (status, mut score, connecting_leg) = if fact.location == leg.origin {
            (CandidateStatus::Local, 0, None)
        } else {
            let ready = fact.since.map(|t| t + config.turnaround_time);
            match plan_reposition(
                store,
                fact.location,
                leg.origin,
                ready,
                leg.departure,
                config,
            )? {
                Some(plan) => (
                    CandidateStatus::Ferry {
                        from: fact.location,
                    },
                    config.ferry_penalty,
                    plan.connecting_leg,
                ),
                None => {
                    debug!(%id, at = %fact.location, "discarded: cannot reposition");
                    continue;
                }
            }
        };

        let chain = check_future_chain(store, id, leg.dest, leg.arrival(), config)?;
        if !chain.is_honored() {
            debug!(%id, ?chain, "discarded: would miss next commitment");
            continue;
        }

        let (penalty, annotation) = policy.assess(&resource, leg.haul, config);
        score += penalty;
        ranked.push(CandidateResult {
            ferry_needed: matches!(status, CandidateStatus::Ferry { .. }),
            resource,
            status,
            score,
            connecting_leg,
            annotation,
        });
    }
    ranked.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| policy.tie_break(a, b)));
    Ok(ranked)
}

/// Crew candidates for a leg, cut to quota plus spares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewPlan {
    pub leg: Option<LegId>,
    pub requirement: CrewRequirement,
    pub pilots: Vec<CandidateResult<CrewMember>>,
    pub attendants: Vec<CandidateResult<CrewMember>>,
    pub shortage: Option<Shortage>,
}

impl CrewPlan {
    pub fn is_ready(&self) -> bool {
        self.shortage.is_none()
    }
}

/// How many candidates each role lacks. A warning, not an error: the
/// caller decides whether to go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortage {
    pub pilots: usize,
    pub attendants: usize,
}

pub struct Dispatcher<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: Store + ?Sized> Dispatcher<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn leg_params(&self, request: &LegRequest) -> Result<LegParams, AssignmentError> {
        let threshold = self.config.long_haul_threshold;
        match *request {
            LegRequest::Existing(id) => match self.store.leg_context(id)? {
                LegLookup::Found(ctx) => Ok(LegParams {
                    leg: Some(id),
                    origin: ctx.origin,
                    dest: ctx.dest,
                    departure: ctx.departure,
                    duration: ctx.duration,
                    haul: HaulClass::classify(ctx.duration, threshold),
                    aircraft_size: ctx.aircraft_size,
                }),
                LegLookup::RouteMissing => Err(AssignmentError::RouteMetadataMissing(id)),
                LegLookup::NotFound => Err(AssignmentError::LegNotFound(id)),
            },
            LegRequest::Planned {
                origin,
                dest,
                departure,
                duration,
            } => Ok(LegParams {
                leg: None,
                origin,
                dest,
                departure,
                duration,
                haul: HaulClass::classify(duration, threshold),
                aircraft_size: None,
            }),
            LegRequest::OnRoute {
                origin,
                dest,
                departure,
            } => {
                let route = self
                    .store
                    .route(origin, dest)?
                    .ok_or(AssignmentError::RouteNotFound { origin, dest })?;
                Ok(LegParams {
                    leg: None,
                    origin,
                    dest,
                    departure,
                    duration: route.duration,
                    haul: HaulClass::classify(route.duration, threshold),
                    aircraft_size: None,
                })
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn rank_aircraft(
        &self,
        request: &LegRequest,
    ) -> Result<Vec<CandidateResult<Aircraft>>, AssignmentError> {
        let leg = self.leg_params(request)?;
        let (start, end) = buffered_window(leg.departure, leg.arrival(), self.config.turnaround_time);
        let pool = self.store.uncommitted_aircraft(start, end)?;
        let ranked = rank(
            &*self.store,
            &strategies::AircraftPolicy,
            &leg,
            pool,
            &self.config,
        )?;
        debug!(candidates = ranked.len(), "aircraft ranked");
        Ok(ranked)
    }

    /// All crew of `role` able to work the leg, best first.
    #[instrument(level = "debug", skip(self))]
    pub fn rank_crew(
        &self,
        request: &LegRequest,
        role: CrewRole,
    ) -> Result<Vec<CandidateResult<CrewMember>>, AssignmentError> {
        let leg = self.leg_params(request)?;
        self.rank_crew_for(&leg, role)
    }

    fn rank_crew_for(
        &self,
        leg: &LegParams,
        role: CrewRole,
    ) -> Result<Vec<CandidateResult<CrewMember>>, AssignmentError> {
        let (start, end) = buffered_window(leg.departure, leg.arrival(), self.config.turnaround_time);
        let pool = self.store.uncommitted_crew(role, start, end)?;
        Ok(rank(
            &*self.store,
            &strategies::CrewPolicy,
            leg,
            pool,
            &self.config,
        )?)
    }

    /// Crew candidates for an existing leg, sized by the aircraft bound to it.
    #[instrument(level = "debug", skip(self))]
    pub fn plan_crew(&self, leg: LegId) -> Result<CrewPlan, AssignmentError> {
        let params = self.leg_params(&LegRequest::Existing(leg))?;
        let size = params
            .aircraft_size
            .ok_or(AssignmentError::AircraftNotAssigned(leg))?;
        self.plan_crew_with(&params, size)
    }

    /// Crew candidates for any leg flown by an aircraft of `size`.
    #[instrument(level = "debug", skip(self))]
    pub fn plan_crew_for(
        &self,
        request: &LegRequest,
        size: AircraftSize,
    ) -> Result<CrewPlan, AssignmentError> {
        let params = self.leg_params(request)?;
        self.plan_crew_with(&params, size)
    }

    fn plan_crew_with(
        &self,
        leg: &LegParams,
        size: AircraftSize,
    ) -> Result<CrewPlan, AssignmentError> {
        let requirement = CrewRequirement::for_aircraft(size);
        let spare = self.config.spare_candidates;

        let mut pilots = self.rank_crew_for(leg, CrewRole::Pilot)?;
        pilots.truncate(requirement.pilots + spare);
        let mut attendants = self.rank_crew_for(leg, CrewRole::Attendant)?;
        attendants.truncate(requirement.attendants + spare);

        let shortage = Shortage {
            pilots: requirement.pilots.saturating_sub(pilots.len()),
            attendants: requirement.attendants.saturating_sub(attendants.len()),
        };
        let shortage = if shortage.pilots > 0 || shortage.attendants > 0 {
            warn!(
                leg = ?leg.leg,
                missing_pilots = shortage.pilots,
                missing_attendants = shortage.attendants,
                "crew shortage"
            );
            Some(shortage)
        } else {
            None
        };

        Ok(CrewPlan {
            leg: leg.leg,
            requirement,
            pilots,
            attendants,
            shortage,
        })
    }

    /// Binds `aircraft` to `leg`. Fails with `ConflictOnCommit` if the
    /// aircraft was committed elsewhere since it was ranked.
    #[instrument(level = "debug", skip(self))]
    pub fn commit_aircraft(&self, leg: LegId, aircraft: AircraftId) -> Result<(), AssignmentError> {
        let outcome = self
            .store
            .commit_aircraft(leg, aircraft, self.config.turnaround_time)?;
        self.settle(leg, outcome)?;
        info!(leg, aircraft, "aircraft assigned");
        Ok(())
    }

    /// Replaces the crew of `leg` with the given pilots and attendants,
    /// all or nothing.
    #[instrument(level = "debug", skip(self))]
    pub fn commit_crew(
        &self,
        leg: LegId,
        pilots: &[CrewId],
        attendants: &[CrewId],
    ) -> Result<(), AssignmentError> {
        let crew: Vec<CrewId> = pilots.iter().chain(attendants).copied().collect();
        let outcome = self
            .store
            .commit_crew(leg, &crew, self.config.turnaround_time)?;
        self.settle(leg, outcome)?;
        info!(leg, crew = crew.len(), "crew assigned");
        Ok(())
    }

    fn settle(&self, leg: LegId, outcome: CommitOutcome) -> Result<(), AssignmentError> {
        match outcome {
            CommitOutcome::Committed => Ok(()),
            CommitOutcome::Conflict {
                resource,
                conflicting,
            } => {
                warn!(leg, %resource, conflicting, "assignment conflict on commit");
                Err(AssignmentError::ConflictOnCommit {
                    resource,
                    leg,
                    conflicting,
                })
            }
            CommitOutcome::LegMissing => Err(AssignmentError::LegNotFound(leg)),
            CommitOutcome::ResourceMissing(resource) => {
                Err(AssignmentError::ResourceNotFound(resource))
            }
        }
    }
}

// MARK: Strategies

pub mod strategies {
    use super::*;

    /// Big aircraft only on long legs; big aircraft on short legs cost extra.
    /// Ties go to the lower aircraft id.
    pub struct AircraftPolicy;

    impl SelectionPolicy for AircraftPolicy {
        type Resource = Aircraft;

        fn admits(&self, aircraft: &Aircraft, haul: HaulClass) -> bool {
            !(haul == HaulClass::Long && aircraft.size == AircraftSize::Small)
        }

        fn assess(
            &self,
            aircraft: &Aircraft,
            haul: HaulClass,
            config: &EngineConfig,
        ) -> (u32, Option<Annotation>) {
            if haul == HaulClass::Short && aircraft.size == AircraftSize::Big {
                (config.oversize_penalty, Some(Annotation::InefficientSize))
            } else {
                (0, None)
            }
        }

        fn tie_break(
            &self,
            a: &CandidateResult<Aircraft>,
            b: &CandidateResult<Aircraft>,
        ) -> Ordering {
            a.resource.id.cmp(&b.resource.id)
        }
    }

    /// Long legs need long-haul certification. No efficiency penalty, but
    /// among equals an exact fit beats an overqualified member, then by name.
    pub struct CrewPolicy;

    fn quality_rank(candidate: &CandidateResult<CrewMember>) -> u8 {
        match candidate.annotation {
            Some(Annotation::Match(quality)) => quality.rank(),
            _ => 0,
        }
    }

    impl SelectionPolicy for CrewPolicy {
        type Resource = CrewMember;

        fn admits(&self, member: &CrewMember, haul: HaulClass) -> bool {
            member.match_quality(haul).is_some()
        }

        fn assess(
            &self,
            member: &CrewMember,
            haul: HaulClass,
            _config: &EngineConfig,
        ) -> (u32, Option<Annotation>) {
            (0, member.match_quality(haul).map(Annotation::Match))
        }

        fn tie_break(
            &self,
            a: &CandidateResult<CrewMember>,
            b: &CandidateResult<CrewMember>,
        ) -> Ordering {
            quality_rank(a)
                .cmp(&quality_rank(b))
                .then_with(|| a.resource.last_name.cmp(&b.resource.last_name))
                .then_with(|| a.resource.first_name.cmp(&b.resource.first_name))
                .then_with(|| a.resource.id.cmp(&b.resource.id))
        }
    }
}
