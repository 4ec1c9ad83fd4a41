use std::{fmt, str::FromStr};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Three-letter IATA location code, always stored upper-case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AirportCode([u8; 3]);

impl AirportCode {
    /// Reference hub used when a resource has neither history nor a home base.
    pub const TLV: AirportCode = AirportCode(*b"TLV");

    pub const fn new(code: [u8; 3]) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII letters
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for AirportCode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bytes = trimmed.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(StoreError::InvalidRecord(format!(
                "bad airport code {:?}",
                s
            )));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }
}

impl TryFrom<String> for AirportCode {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AirportCode> for String {
    fn from(value: AirportCode) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the static route catalog. Existence of a route is what makes a
/// repositioning move possible at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub origin: AirportCode,
    pub dest: AirportCode,
    pub duration: TimeDelta,
}
