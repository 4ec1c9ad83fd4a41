use chrono::TimeDelta;
use serde::Deserialize;

use crate::{
    aircraft::{LONG_HAUL_HOURS, MAX_LEG_HOURS},
    airport::AirportCode,
    error::StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mandatory ground time before and after every leg (cleaning, crew change).
    pub turnaround_time: TimeDelta,

    /// Legs strictly longer than this are long-haul.
    pub long_haul_threshold: TimeDelta,

    /// Cost of an empty repositioning leg.
    pub ferry_penalty: u32,

    /// Cost of flying a big aircraft on a short leg.
    pub oversize_penalty: u32,

    /// When false, a repositioning move is feasible whenever a route exists.
    /// When true, the route's own duration must also fit before the deadline.
    pub strict_ferry_timing: bool,

    /// Location assumed for resources with no history and no home base.
    pub default_hub: AirportCode,

    /// Extra crew candidates offered per role beyond the required count.
    pub spare_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turnaround_time: TimeDelta::hours(2),
            long_haul_threshold: TimeDelta::hours(LONG_HAUL_HOURS),
            ferry_penalty: 10,
            oversize_penalty: 5,
            strict_ferry_timing: false,
            default_hub: AirportCode::TLV,
            spare_candidates: 5,
        }
    }
}

/// Serialized form of [`EngineConfig`], durations in minutes. Missing
/// fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEngineConfig {
    pub turnaround_minutes: Option<i64>,
    pub long_haul_threshold_minutes: Option<i64>,
    pub ferry_penalty: Option<u32>,
    pub oversize_penalty: Option<u32>,
    pub strict_ferry_timing: Option<bool>,
    pub default_hub: Option<AirportCode>,
    pub spare_candidates: Option<usize>,
}

/// Turnaround and haul threshold must lie within `0..=MAX_LEG_HOURS` hours.
fn bounded_minutes(minutes: i64) -> Option<TimeDelta> {
    TimeDelta::try_minutes(minutes)
        .filter(|d| *d >= TimeDelta::zero() && *d <= TimeDelta::hours(MAX_LEG_HOURS))
}

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = StoreError;

    fn try_from(raw: RawEngineConfig) -> Result<Self, StoreError> {
        let defaults = EngineConfig::default();
        let minutes = |value: Option<i64>, field: &str, default: TimeDelta| match value {
            None => Ok(default),
            Some(m) => bounded_minutes(m).ok_or_else(|| {
                StoreError::InvalidRecord(format!("{} out of range: {}", field, m))
            }),
        };
        Ok(Self {
            turnaround_time: minutes(
                raw.turnaround_minutes,
                "turnaround_minutes",
                defaults.turnaround_time,
            )?,
            long_haul_threshold: minutes(
                raw.long_haul_threshold_minutes,
                "long_haul_threshold_minutes",
                defaults.long_haul_threshold,
            )?,
            ferry_penalty: raw.ferry_penalty.unwrap_or(defaults.ferry_penalty),
            oversize_penalty: raw.oversize_penalty.unwrap_or(defaults.oversize_penalty),
            strict_ferry_timing: raw
                .strict_ferry_timing
                .unwrap_or(defaults.strict_ferry_timing),
            default_hub: raw.default_hub.unwrap_or(defaults.default_hub),
            spare_candidates: raw.spare_candidates.unwrap_or(defaults.spare_candidates),
        })
    }
}

impl EngineConfig {
    /// Defaults overridden by `ASSIGN_*` environment variables. Unparseable
    /// or out-of-range values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let value = lookup(key)?;
            match value.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %value, "ignoring unparseable config value");
                    None
                }
            }
        }

        fn duration(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<i64> {
            let minutes = parsed(lookup, key)?;
            if bounded_minutes(minutes).is_none() {
                tracing::warn!(key, minutes, "ignoring out-of-range config duration");
                return None;
            }
            Some(minutes)
        }

        let raw = RawEngineConfig {
            turnaround_minutes: duration(&lookup, "ASSIGN_TURNAROUND_MINUTES"),
            long_haul_threshold_minutes: duration(&lookup, "ASSIGN_LONG_HAUL_MINUTES"),
            ferry_penalty: parsed(&lookup, "ASSIGN_FERRY_PENALTY"),
            oversize_penalty: parsed(&lookup, "ASSIGN_OVERSIZE_PENALTY"),
            strict_ferry_timing: parsed(&lookup, "ASSIGN_STRICT_FERRY_TIMING"),
            default_hub: parsed(&lookup, "ASSIGN_DEFAULT_HUB"),
            spare_candidates: parsed(&lookup, "ASSIGN_SPARE_CANDIDATES"),
        };
        match Self::try_from(raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(%err, "falling back to default engine config");
                Self::default()
            }
        }
    }
}
