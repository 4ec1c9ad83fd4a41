//! Repositioning (ferry / deadhead) feasibility.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::{
    aircraft::LegId,
    airport::AirportCode,
    config::EngineConfig,
    error::StoreError,
    store::ScheduleStore,
};

/// A feasible move of a resource to where it is next needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reposition {
    pub from: AirportCode,
    pub to: AirportCode,
    pub duration: TimeDelta,
    /// Latest landing that still leaves a full turnaround before the deadline
    pub required_arrival: DateTime<Utc>,
    /// Scheduled leg on the same route that lands in time, if any
    pub connecting_leg: Option<LegId>,
}

/// Whether a resource at `from` can be at `to` before `deadline`.
///
/// No route in the catalog means infeasible. With `strict_ferry_timing`
/// off, an existing route is enough. With it on, a resource that only
/// becomes free at `available_from` must also be able to fly the route and
/// land by `deadline - turnaround`.
pub fn plan_reposition<S: ScheduleStore + ?Sized>(
    store: &S,
    from: AirportCode,
    to: AirportCode,
    available_from: Option<DateTime<Utc>>,
    deadline: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<Option<Reposition>, StoreError> {
    let Some(route) = store.route(from, to)? else {
        debug!(%from, %to, "no route for repositioning");
        return Ok(None);
    };
    let required_arrival = deadline - config.turnaround_time;

    if config.strict_ferry_timing {
        if let Some(ready) = available_from {
            if ready + route.duration > required_arrival {
                debug!(
                    %from,
                    %to,
                    %ready,
                    %required_arrival,
                    "repositioning cannot land before the deadline"
                );
                return Ok(None);
            }
        }
    }

    let connecting_leg = store.connecting_leg(from, to, required_arrival)?;
    Ok(Some(Reposition {
        from,
        to,
        duration: route.duration,
        required_arrival,
        connecting_leg,
    }))
}
