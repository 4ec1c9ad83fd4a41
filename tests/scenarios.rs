use std::{sync::Arc, thread};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use recovair_assign::{
    dispatcher::CandidateStatus, Aircraft, AircraftId, AircraftSize, AirportCode, Annotation,
    AssignmentError, CrewMember, CrewRole, Dispatcher, EngineConfig, LegRequest, MatchQuality,
    Model, ResourceId, SqliteStore,
};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

fn code(s: &str) -> AirportCode {
    s.parse().unwrap()
}

fn tlv_jfk() -> LegRequest {
    LegRequest::Planned {
        origin: AirportCode::TLV,
        dest: code("JFK"),
        departure: at(1, 10),
        duration: TimeDelta::hours(11),
    }
}

fn tlv_lca() -> LegRequest {
    LegRequest::Planned {
        origin: AirportCode::TLV,
        dest: code("LCA"),
        departure: at(1, 10),
        duration: TimeDelta::hours(1),
    }
}

fn ids(ranking: &[recovair_assign::CandidateResult<Aircraft>]) -> Vec<AircraftId> {
    ranking.iter().map(|c| c.resource.id).collect()
}

/// Small X and big Y at TLV; big Z last landed at LHR.
fn long_haul_fleet() -> Model {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(1, "Embraer", AircraftSize::Small).based_at(AirportCode::TLV));
    model.add_aircraft(Aircraft::new(2, "Boeing", AircraftSize::Big).based_at(AirportCode::TLV));
    model.add_aircraft(Aircraft::new(3, "Airbus", AircraftSize::Big));
    model.add_route(code("LHR"), AirportCode::TLV, TimeDelta::hours(5));
    let inbound = Utc.with_ymd_and_hms(2024, 5, 31, 10, 0, 0).unwrap();
    let leg = model.add_leg(code("JFK"), code("LHR"), inbound, TimeDelta::hours(7));
    model.bind_aircraft(leg, 3).unwrap();
    model
}

#[test]
fn long_haul_excludes_small_and_prefers_local() {
    let dispatcher = Dispatcher::new(Arc::new(long_haul_fleet()), EngineConfig::default());
    let ranking = dispatcher.rank_aircraft(&tlv_jfk()).unwrap();

    assert_eq!(ids(&ranking), vec![2, 3]);

    let local = &ranking[0];
    assert_eq!(local.status, CandidateStatus::Local);
    assert_eq!(local.score, 0);
    assert!(!local.ferry_needed);

    let ferried = &ranking[1];
    assert_eq!(
        ferried.status,
        CandidateStatus::Ferry {
            from: code("LHR")
        }
    );
    assert_eq!(ferried.score, 10);
    assert!(ferried.ferry_needed);
}

#[test]
fn short_haul_penalizes_big_aircraft() {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(7, "Boeing", AircraftSize::Big));
    model.add_aircraft(Aircraft::new(8, "Embraer", AircraftSize::Small));
    let dispatcher = Dispatcher::new(Arc::new(model), EngineConfig::default());

    let ranking = dispatcher.rank_aircraft(&tlv_lca()).unwrap();
    assert_eq!(ids(&ranking), vec![8, 7]);
    assert_eq!((ranking[0].score, ranking[0].annotation), (0, None));
    assert_eq!(
        (ranking[1].score, ranking[1].annotation),
        (5, Some(Annotation::InefficientSize))
    );
    assert_eq!(
        ranking[1].describe(),
        "Available Locally (Inefficient Size)"
    );
}

#[test]
fn crew_certification_gates_long_haul_only() {
    let mut model = Model::new();
    model.add_crew(CrewMember::new(1, "Maya", "Cohen", CrewRole::Pilot, true));
    model.add_crew(CrewMember::new(2, "Itai", "Levi", CrewRole::Pilot, false));
    let dispatcher = Dispatcher::new(Arc::new(model), EngineConfig::default());

    let short = dispatcher.rank_crew(&tlv_lca(), CrewRole::Pilot).unwrap();
    assert_eq!(short.len(), 2);
    let certified = short.iter().find(|c| c.resource.id == 1).unwrap();
    assert_eq!(
        certified.annotation,
        Some(Annotation::Match(MatchQuality::Overqualified))
    );

    let long = dispatcher.rank_crew(&tlv_jfk(), CrewRole::Pilot).unwrap();
    assert_eq!(long.len(), 1);
    assert_eq!(long[0].resource.id, 1);
    assert_eq!(
        long[0].annotation,
        Some(Annotation::Match(MatchQuality::Perfect))
    );

    // Attendants are a different pool entirely
    assert!(dispatcher
        .rank_crew(&tlv_lca(), CrewRole::Attendant)
        .unwrap()
        .is_empty());
}

/// Local aircraft whose next leg departs ATH at 14:00.
fn committed_at_athens(with_route: bool) -> Model {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(1, "Airbus", AircraftSize::Small).based_at(AirportCode::TLV));
    let next = model.add_leg(code("ATH"), AirportCode::TLV, at(1, 14), TimeDelta::hours(2));
    model.bind_aircraft(next, 1).unwrap();
    if with_route {
        model.add_route(code("LCA"), code("ATH"), TimeDelta::hours(2));
    }
    model
}

#[test]
fn stranding_next_commitment_excludes_local_aircraft() {
    let dispatcher = Dispatcher::new(Arc::new(committed_at_athens(false)), EngineConfig::default());
    assert!(dispatcher.rank_aircraft(&tlv_lca()).unwrap().is_empty());

    let dispatcher = Dispatcher::new(Arc::new(committed_at_athens(true)), EngineConfig::default());
    let ranking = dispatcher.rank_aircraft(&tlv_lca()).unwrap();
    assert_eq!(ids(&ranking), vec![1]);
    assert_eq!(ranking[0].status, CandidateStatus::Local);
}

#[test]
fn ranking_is_idempotent_until_a_commit() {
    let mut model = long_haul_fleet();
    let leg = model.add_leg(AirportCode::TLV, code("JFK"), at(1, 10), TimeDelta::hours(11));
    let dispatcher = Dispatcher::new(Arc::new(model), EngineConfig::default());
    let request = LegRequest::Existing(leg);

    let first = dispatcher.rank_aircraft(&request).unwrap();
    let second = dispatcher.rank_aircraft(&request).unwrap();
    assert_eq!(first, second);

    dispatcher.commit_aircraft(leg, first[0].resource.id).unwrap();
    let after = dispatcher.rank_aircraft(&request).unwrap();
    assert_eq!(ids(&after), vec![3]);
}

#[test]
fn full_crew_plan_then_commit() {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(1, "Airbus", AircraftSize::Small));
    for id in 1..=3 {
        model.add_crew(CrewMember::new(id, "P", &format!("Pilot{}", id), CrewRole::Pilot, false));
    }
    for id in 10..=13 {
        model.add_crew(CrewMember::new(
            id,
            "A",
            &format!("Attendant{}", id),
            CrewRole::Attendant,
            false,
        ));
    }
    let leg = model.add_leg(AirportCode::TLV, code("LCA"), at(1, 10), TimeDelta::hours(1));
    let dispatcher = Dispatcher::new(Arc::new(model), EngineConfig::default());

    dispatcher.commit_aircraft(leg, 1).unwrap();
    let plan = dispatcher.plan_crew(leg).unwrap();
    assert!(plan.is_ready());
    assert_eq!((plan.pilots.len(), plan.attendants.len()), (3, 4));

    let pilots: Vec<_> = plan.pilots[..plan.requirement.pilots]
        .iter()
        .map(|c| c.resource.id)
        .collect();
    let attendants: Vec<_> = plan.attendants[..plan.requirement.attendants]
        .iter()
        .map(|c| c.resource.id)
        .collect();
    dispatcher.commit_crew(leg, &pilots, &attendants).unwrap();
    assert_eq!(dispatcher.store().crew_of(leg), vec![1, 2, 10, 11, 12]);

    // Committed crew are busy for a leg inside the buffered window
    let overlapping = LegRequest::Planned {
        origin: AirportCode::TLV,
        dest: code("LCA"),
        departure: at(1, 12),
        duration: TimeDelta::hours(1),
    };
    let remaining = dispatcher.rank_crew(&overlapping, CrewRole::Pilot).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].resource.id, 3);
}

#[test]
fn concurrent_commits_never_double_book() {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(1, "Airbus", AircraftSize::Small));
    let legs: Vec<_> = (0..4)
        .map(|i| {
            let departure = at(1, 10) + TimeDelta::minutes(30 * i);
            model.add_leg(AirportCode::TLV, code("LCA"), departure, TimeDelta::hours(1))
        })
        .collect();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(model), EngineConfig::default()));

    let results: Vec<Result<(), AssignmentError>> = thread::scope(|scope| {
        let handles: Vec<_> = legs
            .iter()
            .map(|&leg| {
                let dispatcher = dispatcher.clone();
                scope.spawn(move || dispatcher.commit_aircraft(leg, 1))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // All four legs lie within one another's buffered windows
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(AssignmentError::is_conflict));
    assert_eq!(
        dispatcher
            .store()
            .commitments(ResourceId::Aircraft(1))
            .len(),
        1
    );
}

#[test]
fn sqlite_store_backs_the_same_rankings() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .execute_batch(
            "INSERT INTO aircraft VALUES (1, 'Embraer', 'small', 'TLV');
             INSERT INTO aircraft VALUES (2, 'Boeing', 'big', 'TLV');
             INSERT INTO aircraft VALUES (3, 'Airbus', 'Big', NULL);
             INSERT INTO routes VALUES (1, 'JFK', 'LHR', '07:00:00');
             INSERT INTO routes VALUES (2, 'LHR', 'TLV', '05:00:00');
             INSERT INTO routes VALUES (3, 'TLV', 'JFK', '11:00:00');
             INSERT INTO flights VALUES (1, 1, '2024-05-31 10:00:00', 3, 'Scheduled');
             INSERT INTO flights VALUES (2, 3, '2024-06-01 10:00:00', NULL, 'Scheduled');",
        )
        .unwrap();
    store.save_config(&EngineConfig::default()).unwrap();
    let config = store.read_config().unwrap();
    let dispatcher = Dispatcher::new(Arc::new(store), config);

    let ranking = dispatcher.rank_aircraft(&LegRequest::Existing(2)).unwrap();
    assert_eq!(ids(&ranking), vec![2, 3]);
    assert_eq!(ranking[1].score, 10);

    dispatcher.commit_aircraft(2, 2).unwrap();
    let err = dispatcher.plan_crew(99).unwrap_err();
    assert!(err.is_not_found());
    let plan = dispatcher.plan_crew(2).unwrap();
    assert_eq!(plan.requirement.pilots, 3);
    assert!(!plan.is_ready());
}

/// Big aircraft 3 lands at LHR at 06:00 on the day of the TLV departure.
fn late_lhr_arrival() -> (Model, recovair_assign::LegId) {
    let mut model = Model::new();
    model.add_aircraft(Aircraft::new(2, "Boeing", AircraftSize::Big).based_at(AirportCode::TLV));
    model.add_aircraft(Aircraft::new(3, "Airbus", AircraftSize::Big));
    model.add_route(code("LHR"), AirportCode::TLV, TimeDelta::hours(5));
    let inbound = model.add_leg(
        code("JFK"),
        code("LHR"),
        Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap(),
        TimeDelta::hours(7),
    );
    model.bind_aircraft(inbound, 3).unwrap();
    model
        .add_leg_on_route(
            code("LHR"),
            AirportCode::TLV,
            Utc.with_ymd_and_hms(2024, 5, 31, 20, 0, 0).unwrap(),
        )
        .unwrap();
    let connecting = model
        .add_leg_on_route(code("LHR"), AirportCode::TLV, at(1, 2))
        .unwrap();
    (model, connecting)
}

#[test]
fn strict_ferry_timing_drops_late_repositioning() {
    let (model, connecting) = late_lhr_arrival();
    let model = Arc::new(model);

    let lenient = Dispatcher::new(model.clone(), EngineConfig::default());
    let ranking = lenient.rank_aircraft(&tlv_jfk()).unwrap();
    assert_eq!(ids(&ranking), vec![2, 3]);
    assert_eq!(ranking[0].connecting_leg, None);
    assert_eq!(
        ranking[1].status,
        CandidateStatus::Ferry {
            from: code("LHR")
        }
    );
    // Latest LHR-TLV leg landing by 08:00, two hours before departure
    assert_eq!(ranking[1].connecting_leg, Some(connecting));

    // Free at 08:00 plus a five hour ferry misses the 08:00 landing cutoff
    let strict = Dispatcher::new(
        model,
        EngineConfig {
            strict_ferry_timing: true,
            ..EngineConfig::default()
        },
    );
    let ranking = strict.rank_aircraft(&tlv_jfk()).unwrap();
    assert_eq!(ids(&ranking), vec![2]);
}

#[test]
fn cancelled_leg_can_be_neither_ranked_nor_committed() {
    let mut model = long_haul_fleet();
    let leg = model.add_leg(AirportCode::TLV, code("JFK"), at(1, 10), TimeDelta::hours(11));
    assert!(model.cancel_leg(leg));
    let dispatcher = Dispatcher::new(Arc::new(model), EngineConfig::default());

    let ranked = dispatcher.rank_aircraft(&LegRequest::Existing(leg));
    assert!(matches!(ranked, Err(AssignmentError::LegNotFound(id)) if id == leg));
    assert!(dispatcher.commit_aircraft(leg, 2).unwrap_err().is_not_found());
}
