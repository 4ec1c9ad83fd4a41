use std::{fmt, str::FromStr};

use crate::{
    aircraft::{AircraftSize, HaulClass},
    airport::AirportCode,
    error::StoreError,
};

pub type CrewId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrewRole {
    Pilot,
    Attendant,
}

impl FromStr for CrewRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pilot" => Ok(Self::Pilot),
            "attendant" | "flight attendant" => Ok(Self::Attendant),
            _ => Err(StoreError::InvalidRecord(format!("unknown crew role {:?}", s))),
        }
    }
}

impl fmt::Display for CrewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pilot => "Pilot",
            Self::Attendant => "Flight Attendant",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewMember {
    pub id: CrewId,
    pub first_name: String,
    pub last_name: String,
    pub role: CrewRole,
    pub long_haul_certified: bool,
    pub home_base: Option<AirportCode>,
}

impl CrewMember {
    pub fn new(
        id: CrewId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: CrewRole,
        long_haul_certified: bool,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            long_haul_certified,
            home_base: None,
        }
    }

    pub fn based_at(mut self, home_base: AirportCode) -> Self {
        self.home_base = Some(home_base);
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// How well the member's certification fits a leg of the given class.
    /// `None` means the member may not work the leg at all.
    pub fn match_quality(&self, haul: HaulClass) -> Option<MatchQuality> {
        match (haul, self.long_haul_certified) {
            (HaulClass::Long, true) => Some(MatchQuality::Perfect),
            (HaulClass::Long, false) => None,
            (HaulClass::Short, true) => Some(MatchQuality::Overqualified),
            (HaulClass::Short, false) => Some(MatchQuality::Standard),
        }
    }
}

/// Ordered best first: an exact certification fit beats keeping a
/// long-haul-certified member busy on a short leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchQuality {
    Perfect,
    Standard,
    Overqualified,
}

impl MatchQuality {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Perfect | Self::Standard => 0,
            Self::Overqualified => 1,
        }
    }
}

/// Number of crew each role needs on a leg flown by an aircraft of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrewRequirement {
    pub pilots: usize,
    pub attendants: usize,
}

impl CrewRequirement {
    pub fn for_aircraft(size: AircraftSize) -> Self {
        match size {
            AircraftSize::Big => Self {
                pilots: 3,
                attendants: 6,
            },
            AircraftSize::Small => Self {
                pilots: 2,
                attendants: 3,
            },
        }
    }

    pub fn required(&self, role: CrewRole) -> usize {
        match role {
            CrewRole::Pilot => self.pilots,
            CrewRole::Attendant => self.attendants,
        }
    }
}
