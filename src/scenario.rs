//! SQLite adapter for the operational schedule.
//!
//! Rows are decoded into the tagged model as they are read; sizes, roles,
//! airport codes, durations and timestamps never leave this module as text.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::{
    aircraft::{format_duration, parse_duration, Aircraft, AircraftId, AircraftSize, Leg, LegId},
    airport::{AirportCode, Route},
    commitment::{buffered_window, Commitment, CommitmentIndex, ResourceId},
    config::{EngineConfig, RawEngineConfig},
    crew::{CrewId, CrewMember, CrewRole},
    error::StoreError,
    store::{
        CommitOutcome, FleetStore, LastArrival, LegContext, LegLookup, NextDeparture,
        ScheduleStore,
    },
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS routes (
    route_id INTEGER PRIMARY KEY,
    origin_airport TEXT NOT NULL,
    destination_airport TEXT NOT NULL,
    flight_duration TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS aircraft (
    aircraft_id INTEGER PRIMARY KEY,
    manufacturer TEXT NOT NULL,
    size TEXT NOT NULL,
    current_location TEXT
);
CREATE TABLE IF NOT EXISTS crew_members (
    employee_id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role_type TEXT NOT NULL,
    long_haul_certified INTEGER NOT NULL DEFAULT 0,
    current_location TEXT
);
CREATE TABLE IF NOT EXISTS flights (
    flight_id INTEGER PRIMARY KEY,
    route_id INTEGER NOT NULL,
    departure_time TEXT NOT NULL,
    aircraft_id INTEGER,
    flight_status TEXT NOT NULL DEFAULT 'Scheduled'
);
CREATE TABLE IF NOT EXISTS crew_assignments (
    flight_id INTEGER NOT NULL,
    employee_id INTEGER NOT NULL,
    PRIMARY KEY (flight_id, employee_id)
);
CREATE TABLE IF NOT EXISTS engine_config (
    turnaround_minutes INTEGER,
    long_haul_threshold_minutes INTEGER,
    ferry_penalty INTEGER,
    oversize_penalty INTEGER,
    strict_ferry_timing INTEGER,
    default_hub TEXT,
    spare_candidates INTEGER
);
";

const LEG_SELECT: &str = "SELECT f.flight_id AS flight_id, f.departure_time AS departure_time, \
    f.aircraft_id AS aircraft_id, f.flight_status AS flight_status, \
    r.origin_airport AS origin_airport, r.destination_airport AS destination_airport, \
    r.flight_duration AS flight_duration \
    FROM flights f JOIN routes r ON r.route_id = f.route_id";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub const TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs raw SQL, e.g. to load a fixture or a dump of an existing schedule.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    pub fn read_config(&self) -> Result<EngineConfig, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT turnaround_minutes, long_haul_threshold_minutes, ferry_penalty, oversize_penalty, strict_ferry_timing, default_hub, spare_candidates FROM engine_config LIMIT 1",
        )?;
        let mut rows = stmt.query(params![])?;
        let Some(row) = rows.next()? else {
            return Err(StoreError::MissingConfig);
        };

        let spare: Option<u32> = row.get("spare_candidates")?;
        let raw = RawEngineConfig {
            turnaround_minutes: row.get("turnaround_minutes")?,
            long_haul_threshold_minutes: row.get("long_haul_threshold_minutes")?,
            ferry_penalty: row.get("ferry_penalty")?,
            oversize_penalty: row.get("oversize_penalty")?,
            strict_ferry_timing: row.get("strict_ferry_timing")?,
            default_hub: optional_code(row.get("default_hub")?)?,
            spare_candidates: spare.map(|n| n as usize),
        };
        EngineConfig::try_from(raw)
    }

    pub fn save_config(&self, config: &EngineConfig) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM engine_config", params![])?;
        tx.execute(
            "INSERT INTO engine_config VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                config.turnaround_time.num_minutes(),
                config.long_haul_threshold.num_minutes(),
                config.ferry_penalty,
                config.oversize_penalty,
                config.strict_ferry_timing,
                config.default_hub.as_str(),
                config.spare_candidates as u32,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn insert_route(
        &self,
        origin: AirportCode,
        dest: AirportCode,
        duration: TimeDelta,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO routes (origin_airport, destination_airport, flight_duration) VALUES (?1, ?2, ?3)",
            params![origin.as_str(), dest.as_str(), format_duration(duration)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_aircraft(&self, aircraft: &Aircraft) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO aircraft (aircraft_id, manufacturer, size, current_location) VALUES (?1, ?2, ?3, ?4)",
            params![
                aircraft.id,
                aircraft.manufacturer,
                aircraft.size.to_string(),
                aircraft.home_base.map(|c| c.as_str().to_owned()),
            ],
        )?;
        Ok(())
    }

    pub fn insert_crew(&self, member: &CrewMember) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO crew_members (employee_id, first_name, last_name, role_type, long_haul_certified, current_location) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                member.id,
                member.first_name,
                member.last_name,
                member.role.to_string(),
                member.long_haul_certified,
                member.home_base.map(|c| c.as_str().to_owned()),
            ],
        )?;
        Ok(())
    }

    /// Schedules a flight on a route; returns the new leg id.
    pub fn insert_flight(&self, route_id: i64, departure: DateTime<Utc>) -> Result<LegId, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO flights (route_id, departure_time) VALUES (?1, ?2)",
            params![route_id, Self::format_time(&departure)],
        )?;
        Ok(conn.last_insert_rowid() as LegId)
    }

    pub fn cancel_flight(&self, leg: LegId) -> Result<bool, StoreError> {
        let changed = self.conn.lock().execute(
            "UPDATE flights SET flight_status = 'Cancelled' WHERE flight_id = ?1",
            params![leg as i64],
        )?;
        Ok(changed > 0)
    }

    pub fn crew_of(&self, leg: LegId) -> Result<Vec<CrewId>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT employee_id FROM crew_assignments WHERE flight_id = ?1 ORDER BY employee_id",
        )?;
        let mut rows = stmt.query(params![leg as i64])?;
        let mut crew = Vec::new();
        while let Some(row) = rows.next()? {
            crew.push(row.get("employee_id")?);
        }
        Ok(crew)
    }

    pub fn parse_time(time: &str) -> Result<DateTime<Utc>, StoreError> {
        Ok(NaiveDateTime::parse_from_str(time.trim(), Self::TIME_FORMAT)?.and_utc())
    }

    pub fn format_time(time: &DateTime<Utc>) -> String {
        time.format(Self::TIME_FORMAT).to_string()
    }
}

// MARK: Row decoding

fn optional_code(text: Option<String>) -> Result<Option<AirportCode>, StoreError> {
    text.filter(|s| !s.trim().is_empty())
        .map(|s| s.parse())
        .transpose()
}

fn decode_leg(row: &Row) -> Result<Leg, StoreError> {
    let status: String = row.get("flight_status")?;
    Ok(Leg {
        id: row.get::<&str, i64>("flight_id")? as LegId,
        origin: row.get::<&str, String>("origin_airport")?.parse()?,
        dest: row.get::<&str, String>("destination_airport")?.parse()?,
        departure: SqliteStore::parse_time(&row.get::<&str, String>("departure_time")?)?,
        duration: parse_duration(&row.get::<&str, String>("flight_duration")?)?,
        aircraft: row.get("aircraft_id")?,
        cancelled: status.trim().eq_ignore_ascii_case("cancelled"),
    })
}

fn decode_aircraft(row: &Row) -> Result<Aircraft, StoreError> {
    Ok(Aircraft {
        id: row.get("aircraft_id")?,
        manufacturer: row.get("manufacturer")?,
        size: row.get::<&str, String>("size")?.parse()?,
        home_base: optional_code(row.get("current_location")?)?,
    })
}

fn decode_crew(row: &Row) -> Result<CrewMember, StoreError> {
    Ok(CrewMember {
        id: row.get("employee_id")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        role: row.get::<&str, String>("role_type")?.parse()?,
        long_haul_certified: row.get("long_haul_certified")?,
        home_base: optional_code(row.get("current_location")?)?,
    })
}

fn query_legs<P: Params>(conn: &Connection, clause: &str, params: P) -> Result<Vec<Leg>, StoreError> {
    let mut stmt = conn.prepare(&format!("{} {}", LEG_SELECT, clause))?;
    let mut rows = stmt.query(params)?;
    let mut legs = Vec::new();
    while let Some(row) = rows.next()? {
        legs.push(decode_leg(row)?);
    }
    Ok(legs)
}

fn live_leg(conn: &Connection, id: LegId) -> Result<Option<Leg>, StoreError> {
    Ok(query_legs(conn, "WHERE f.flight_id = ?1", params![id as i64])?
        .into_iter()
        .find(|leg| !leg.cancelled))
}

/// Live commitments of one resource, by departure.
fn commitments(conn: &Connection, resource: ResourceId) -> Result<Vec<Commitment>, StoreError> {
    let legs = match resource {
        ResourceId::Aircraft(id) => query_legs(conn, "WHERE f.aircraft_id = ?1", params![id])?,
        ResourceId::Crew(id) => query_legs(
            conn,
            "JOIN crew_assignments ca ON ca.flight_id = f.flight_id WHERE ca.employee_id = ?1",
            params![id],
        )?,
    };
    let mut commitments: Vec<Commitment> = legs
        .iter()
        .filter(|leg| !leg.cancelled)
        .map(|leg| Commitment::new(resource, leg))
        .collect();
    commitments.sort_by_key(|c| (c.departure, c.leg));
    Ok(commitments)
}

/// Interval index over every live commitment in the schedule.
fn schedule_index(conn: &Connection) -> Result<CommitmentIndex, StoreError> {
    let legs: HashMap<LegId, Leg> = query_legs(conn, "", params![])?
        .into_iter()
        .filter(|leg| !leg.cancelled)
        .map(|leg| (leg.id, leg))
        .collect();

    let mut index = CommitmentIndex::new();
    for leg in legs.values() {
        if let Some(aircraft) = leg.aircraft {
            index.insert(&Commitment::new(ResourceId::Aircraft(aircraft), leg));
        }
    }
    let mut stmt = conn.prepare("SELECT flight_id, employee_id FROM crew_assignments")?;
    let mut rows = stmt.query(params![])?;
    while let Some(row) = rows.next()? {
        let flight: i64 = row.get("flight_id")?;
        if let Some(leg) = legs.get(&(flight as LegId)) {
            index.insert(&Commitment::new(ResourceId::Crew(row.get("employee_id")?), leg));
        }
    }
    Ok(index)
}

fn conflict_for(
    conn: &Connection,
    resource: ResourceId,
    target: &Leg,
    turnaround: TimeDelta,
) -> Result<Option<LegId>, StoreError> {
    let (start, end) = buffered_window(target.departure, target.arrival(), turnaround);
    let index = CommitmentIndex::from_commitments(&commitments(conn, resource)?);
    Ok(index.conflict(resource, start, end, Some(target.id)))
}

impl FleetStore for SqliteStore {
    fn aircraft(&self, id: AircraftId) -> Result<Option<Aircraft>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT aircraft_id, manufacturer, size, current_location FROM aircraft WHERE aircraft_id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        let aircraft = rows.next()?.map(decode_aircraft).transpose()?;
        Ok(aircraft)
    }

    fn crew_member(&self, id: CrewId) -> Result<Option<CrewMember>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT employee_id, first_name, last_name, role_type, long_haul_certified, current_location FROM crew_members WHERE employee_id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        let member = rows.next()?.map(decode_crew).transpose()?;
        Ok(member)
    }

    fn uncommitted_aircraft(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Aircraft>, StoreError> {
        let conn = self.conn.lock();
        let index = schedule_index(&conn)?;
        let mut stmt = conn.prepare(
            "SELECT aircraft_id, manufacturer, size, current_location FROM aircraft ORDER BY aircraft_id",
        )?;
        let mut rows = stmt.query(params![])?;
        let mut pool = Vec::new();
        while let Some(row) = rows.next()? {
            let aircraft = decode_aircraft(row)?;
            if index.is_free(ResourceId::Aircraft(aircraft.id), window_start, window_end) {
                pool.push(aircraft);
            }
        }
        Ok(pool)
    }

    fn uncommitted_crew(
        &self,
        role: CrewRole,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CrewMember>, StoreError> {
        let conn = self.conn.lock();
        let index = schedule_index(&conn)?;
        let mut stmt = conn.prepare(
            "SELECT employee_id, first_name, last_name, role_type, long_haul_certified, current_location FROM crew_members ORDER BY employee_id",
        )?;
        let mut rows = stmt.query(params![])?;
        let mut pool = Vec::new();
        while let Some(row) = rows.next()? {
            let member = decode_crew(row)?;
            if member.role == role
                && index.is_free(ResourceId::Crew(member.id), window_start, window_end)
            {
                pool.push(member);
            }
        }
        Ok(pool)
    }
}

impl ScheduleStore for SqliteStore {
    fn leg_context(&self, id: LegId) -> Result<LegLookup, StoreError> {
        let conn = self.conn.lock();
        let known: Option<i64> = conn
            .query_row(
                "SELECT flight_id FROM flights WHERE flight_id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(LegLookup::NotFound);
        }
        let Some(leg) = query_legs(&conn, "WHERE f.flight_id = ?1", params![id as i64])?
            .into_iter()
            .next()
        else {
            debug!(leg = id, "flight references an unknown route");
            return Ok(LegLookup::RouteMissing);
        };
        if leg.cancelled {
            return Ok(LegLookup::NotFound);
        }

        let aircraft_size = match leg.aircraft {
            Some(aircraft) => conn
                .query_row(
                    "SELECT size FROM aircraft WHERE aircraft_id = ?1",
                    params![aircraft],
                    |row| row.get::<usize, String>(0),
                )
                .optional()?
                .map(|size| size.parse::<AircraftSize>())
                .transpose()?,
            None => None,
        };
        Ok(LegLookup::Found(LegContext {
            id,
            origin: leg.origin,
            dest: leg.dest,
            departure: leg.departure,
            duration: leg.duration,
            aircraft_size,
        }))
    }

    fn route(&self, from: AirportCode, to: AirportCode) -> Result<Option<Route>, StoreError> {
        let conn = self.conn.lock();
        let duration: Option<String> = conn
            .query_row(
                "SELECT flight_duration FROM routes WHERE upper(trim(origin_airport)) = ?1 AND upper(trim(destination_airport)) = ?2 LIMIT 1",
                params![from.as_str(), to.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match duration {
            Some(text) => Some(Route {
                origin: from,
                dest: to,
                duration: parse_duration(&text)?,
            }),
            None => None,
        })
    }

    fn connecting_leg(
        &self,
        from: AirportCode,
        to: AirportCode,
        arrive_by: DateTime<Utc>,
    ) -> Result<Option<LegId>, StoreError> {
        let conn = self.conn.lock();
        let legs = query_legs(
            &conn,
            "WHERE upper(trim(r.origin_airport)) = ?1 AND upper(trim(r.destination_airport)) = ?2",
            params![from.as_str(), to.as_str()],
        )?;
        Ok(legs
            .into_iter()
            .filter(|leg| !leg.cancelled && leg.arrival() <= arrive_by)
            .max_by_key(|leg| (leg.departure, leg.id))
            .map(|leg| leg.id))
    }

    fn last_arrival_before(
        &self,
        resource: ResourceId,
        before: DateTime<Utc>,
    ) -> Result<Option<LastArrival>, StoreError> {
        let conn = self.conn.lock();
        Ok(commitments(&conn, resource)?
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
        let conn = self.conn.lock();
        Ok(commitments(&conn, resource)?
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
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM aircraft WHERE aircraft_id = ?1)",
            params![aircraft],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(CommitOutcome::ResourceMissing(resource));
        }
        let Some(target) = live_leg(&tx, leg)? else {
            return Ok(CommitOutcome::LegMissing);
        };
        if let Some(conflicting) = conflict_for(&tx, resource, &target, turnaround)? {
            return Ok(CommitOutcome::Conflict {
                resource,
                conflicting,
            });
        }

        tx.execute(
            "UPDATE flights SET aircraft_id = ?1 WHERE flight_id = ?2",
            params![aircraft, leg as i64],
        )?;
        tx.commit()?;
        info!(leg, aircraft, "aircraft written to flights");
        Ok(CommitOutcome::Committed)
    }

    fn commit_crew(
        &self,
        leg: LegId,
        crew: &[CrewId],
        turnaround: TimeDelta,
    ) -> Result<CommitOutcome, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for member in crew {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM crew_members WHERE employee_id = ?1)",
                params![member],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(CommitOutcome::ResourceMissing(ResourceId::Crew(*member)));
            }
        }
        let Some(target) = live_leg(&tx, leg)? else {
            return Ok(CommitOutcome::LegMissing);
        };
        for member in crew {
            let resource = ResourceId::Crew(*member);
            if let Some(conflicting) = conflict_for(&tx, resource, &target, turnaround)? {
                return Ok(CommitOutcome::Conflict {
                    resource,
                    conflicting,
                });
            }
        }

        let mut members = crew.to_vec();
        members.sort_unstable();
        members.dedup();
        tx.execute(
            "DELETE FROM crew_assignments WHERE flight_id = ?1",
            params![leg as i64],
        )?;
        for member in &members {
            tx.execute(
                "INSERT INTO crew_assignments (flight_id, employee_id) VALUES (?1, ?2)",
                params![leg as i64, member],
            )?;
        }
        tx.commit()?;
        info!(leg, crew = members.len(), "crew written to crew_assignments");
        Ok(CommitOutcome::Committed)
    }
}
