use std::{fmt, str::FromStr};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{airport::AirportCode, error::StoreError};

pub type LegId = u64;
pub type AircraftId = u32;

/// Legs longer than this are long-haul.
pub const LONG_HAUL_HOURS: i64 = 6;

/// Longest leg or route a store may report.
pub const MAX_LEG_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HaulClass {
    Short,
    Long,
}

impl HaulClass {
    /// A leg is long-haul only when strictly longer than `threshold`.
    pub fn classify(duration: TimeDelta, threshold: TimeDelta) -> Self {
        if duration > threshold {
            Self::Long
        } else {
            Self::Short
        }
    }
}

impl fmt::Display for HaulClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Short => "Short",
            Self::Long => "Long",
        })
    }
}

/// A single scheduled movement between two locations.
///
/// Owner: the schedule store. The engine only ever reads legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub id: LegId,
    pub origin: AirportCode,
    pub dest: AirportCode,
    pub departure: DateTime<Utc>,
    pub duration: TimeDelta,
    pub aircraft: Option<AircraftId>,
    /// Cancelled legs never occupy a resource
    pub cancelled: bool,
}

impl Leg {
    #[inline]
    pub fn arrival(&self) -> DateTime<Utc> {
        self.departure + self.duration
    }

    pub fn haul_class(&self, threshold: TimeDelta) -> HaulClass {
        HaulClass::classify(self.duration, threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AircraftSize {
    Small,
    Big,
}

impl FromStr for AircraftSize {
    type Err = StoreError;

    /// Stored sizes have been written as both `Big` and `big`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "big" => Ok(Self::Big),
            _ => Err(StoreError::InvalidRecord(format!(
                "unknown aircraft size {:?}",
                s
            ))),
        }
    }
}

impl fmt::Display for AircraftSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Small => "Small",
            Self::Big => "Big",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aircraft {
    pub id: AircraftId,
    pub manufacturer: String,
    pub size: AircraftSize,
    /// Only consulted when the aircraft has no flight history.
    pub home_base: Option<AirportCode>,
}

impl Aircraft {
    pub fn new(id: AircraftId, manufacturer: impl Into<String>, size: AircraftSize) -> Self {
        Self {
            id,
            manufacturer: manufacturer.into(),
            size,
            home_base: None,
        }
    }

    pub fn based_at(mut self, home_base: AirportCode) -> Self {
        self.home_base = Some(home_base);
        self
    }
}

/// Normalizes a stored duration. Accepts `H:MM:SS`, `H:MM` and a bare
/// number of minutes, up to [`MAX_LEG_HOURS`].
pub fn parse_duration(text: &str) -> Result<TimeDelta, StoreError> {
    let bad = || StoreError::InvalidRecord(format!("bad duration {:?}", text));
    let parts = text
        .trim()
        .split(':')
        .map(|part| part.parse::<i64>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.iter().any(|p| *p < 0) {
        return Err(bad());
    }
    let duration = match parts[..] {
        [minutes] => TimeDelta::try_minutes(minutes),
        [hours, minutes] if minutes < 60 => TimeDelta::try_hours(hours)
            .and_then(|h| h.checked_add(&TimeDelta::try_minutes(minutes)?)),
        [hours, minutes, seconds] if minutes < 60 && seconds < 60 => TimeDelta::try_hours(hours)
            .and_then(|h| h.checked_add(&TimeDelta::try_minutes(minutes)?))
            .and_then(|hm| hm.checked_add(&TimeDelta::try_seconds(seconds)?)),
        _ => None,
    };
    match duration {
        Some(d) if d <= TimeDelta::hours(MAX_LEG_HOURS) => Ok(d),
        _ => Err(bad()),
    }
}

pub fn format_duration(duration: TimeDelta) -> String {
    let secs = duration.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
