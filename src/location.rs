use chrono::{DateTime, Utc};

use crate::{
    aircraft::LegId,
    airport::AirportCode,
    commitment::ResourceId,
    config::EngineConfig,
    error::StoreError,
    store::ScheduleStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    /// Destination of this committed leg
    History(LegId),
    HomeBase,
    DefaultHub,
}

/// "Resource is at `location` from `since` on." Computed per query and never
/// cached, so it always reflects the latest committed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationFact {
    pub location: AirportCode,
    /// Arrival of the leg the fact was derived from; `None` for fallbacks.
    pub since: Option<DateTime<Utc>>,
    pub source: LocationSource,
}

/// Where `resource` physically is at `as_of`: the destination of its latest
/// commitment departing before `as_of`, else its home base, else the
/// configured hub. Missing data degrades to the fallback; only store
/// failures are errors.
pub fn location_of<S: ScheduleStore + ?Sized>(
    store: &S,
    resource: ResourceId,
    home_base: Option<AirportCode>,
    as_of: DateTime<Utc>,
    config: &EngineConfig,
) -> Result<LocationFact, StoreError> {
    if let Some(last) = store.last_arrival_before(resource, as_of)? {
        return Ok(LocationFact {
            location: last.location,
            since: Some(last.arrival),
            source: LocationSource::History(last.leg),
        });
    }
    Ok(match home_base {
        Some(base) => LocationFact {
            location: base,
            since: None,
            source: LocationSource::HomeBase,
        },
        None => LocationFact {
            location: config.default_hub,
            since: None,
            source: LocationSource::DefaultHub,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aircraft::{Aircraft, AircraftSize},
        model::Model,
    };
    use chrono::{TimeDelta, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn latest_history_wins() {
        let lhr = "LHR".parse().unwrap();
        let jfk = "JFK".parse().unwrap();
        let mut model = Model::new();
        model.add_aircraft(Aircraft::new(1, "Airbus", AircraftSize::Big));
        let first = model.add_leg(AirportCode::TLV, lhr, at(1, 6), TimeDelta::hours(5));
        let second = model.add_leg(lhr, jfk, at(1, 14), TimeDelta::hours(8));
        model.bind_aircraft(first, 1).unwrap();
        model.bind_aircraft(second, 1).unwrap();

        let config = EngineConfig::default();
        let ac = ResourceId::Aircraft(1);

        let fact = location_of(&model, ac, None, at(1, 12), &config).unwrap();
        assert_eq!(fact.location, lhr);
        assert_eq!(fact.source, LocationSource::History(first));
        assert_eq!(fact.since, Some(at(1, 11)));

        // Still in the air, but its destination is where it will be
        let fact = location_of(&model, ac, None, at(1, 15), &config).unwrap();
        assert_eq!(fact.location, jfk);

        // Departure must be strictly before the reference time
        let fact = location_of(&model, ac, None, at(1, 6), &config).unwrap();
        assert_eq!(fact.source, LocationSource::DefaultHub);
    }

    #[test]
    fn falls_back_to_home_base_then_hub() {
        let model = Model::new();
        let config = EngineConfig::default();
        let lca = "LCA".parse().unwrap();

        let fact = location_of(&model, ResourceId::Crew(3), Some(lca), at(2, 0), &config).unwrap();
        assert_eq!((fact.location, fact.source), (lca, LocationSource::HomeBase));

        let fact = location_of(&model, ResourceId::Crew(3), None, at(2, 0), &config).unwrap();
        assert_eq!(fact.location, AirportCode::TLV);
        assert_eq!(fact.since, None);
    }

    #[test]
    fn cancelled_legs_leave_no_history() {
        let lhr = "LHR".parse().unwrap();
        let mut model = Model::new();
        model.add_aircraft(Aircraft::new(1, "Boeing", AircraftSize::Small));
        let leg = model.add_leg(AirportCode::TLV, lhr, at(1, 6), TimeDelta::hours(5));
        model.bind_aircraft(leg, 1).unwrap();
        model.cancel_leg(leg);

        let fact = location_of(
            &model,
            ResourceId::Aircraft(1),
            None,
            at(2, 0),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(fact.location, AirportCode::TLV);
    }
}
