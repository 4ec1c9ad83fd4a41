//! Forward-looking check: after flying a leg, can the resource still make
//! the next leg it is already committed to?

use chrono::{DateTime, Utc};

use crate::{
    airport::AirportCode,
    commitment::ResourceId,
    config::EngineConfig,
    error::StoreError,
    ferry::{plan_reposition, Reposition},
    store::{NextDeparture, ScheduleStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureChain {
    /// Nothing committed afterwards
    Clear,
    /// Lands where the next leg departs, with enough turnaround
    Turnaround(NextDeparture),
    /// Lands elsewhere but can be repositioned in time
    Reposition(NextDeparture, Reposition),
    /// Accepting the leg would strand the resource
    Blocked(NextDeparture),
}

impl FutureChain {
    pub fn is_honored(&self) -> bool {
        !matches!(self, Self::Blocked(_))
    }
}

pub fn check_future_chain<S: ScheduleStore + ?Sized>(
    store: &S,
    resource: ResourceId,
    arrival_location: AirportCode,
    arrival_time: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<FutureChain, StoreError> {
    let Some(next) = store.next_departure_after(resource, arrival_time)? else {
        return Ok(FutureChain::Clear);
    };

    if next.location == arrival_location {
        return Ok(if arrival_time + config.turnaround_time <= next.departure {
            FutureChain::Turnaround(next)
        } else {
            FutureChain::Blocked(next)
        });
    }

    let ready = arrival_time + config.turnaround_time;
    Ok(
        match plan_reposition(
            store,
            arrival_location,
            next.location,
            Some(ready),
            next.departure,
            config,
        )? {
            Some(plan) => FutureChain::Reposition(next, plan),
            None => FutureChain::Blocked(next),
        },
    )
}
