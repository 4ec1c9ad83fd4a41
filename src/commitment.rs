//! Resource ↔ leg bindings and the interval index used to exclude
//! resources that are busy around a leg.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, TimeDelta, Utc};
use rust_lapper::{Interval, Lapper};

use crate::{
    aircraft::{AircraftId, Leg, LegId},
    airport::AirportCode,
    crew::CrewId,
};

/// Tagged identity over both resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceId {
    Aircraft(AircraftId),
    Crew(CrewId),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aircraft(id) => write!(f, "aircraft {}", id),
            Self::Crew(id) => write!(f, "crew member {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub resource: ResourceId,
    pub leg: LegId,
    pub origin: AirportCode,
    pub dest: AirportCode,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
}

impl Commitment {
    pub fn new(resource: ResourceId, leg: &Leg) -> Self {
        Self {
            resource,
            leg: leg.id,
            origin: leg.origin,
            dest: leg.dest,
            departure: leg.departure,
            arrival: leg.arrival(),
        }
    }
}

/// Buffered window a new leg needs its resources free for. Committed flight
/// time must not intersect it; touching the edge is allowed, so a gap of
/// exactly one buffer between legs is legal.
pub fn buffered_window(
    departure: DateTime<Utc>,
    arrival: DateTime<Utc>,
    buffer: TimeDelta,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let buffer = buffer.max(TimeDelta::zero());
    (departure - buffer, arrival + buffer)
}

/// Order-preserving map of a signed timestamp onto `u64`.
#[inline]
fn key(time: DateTime<Utc>) -> u64 {
    (time.timestamp() as u64) ^ (1 << 63)
}

/// Per-resource interval trees over committed flight time.
#[derive(Default)]
pub struct CommitmentIndex {
    by_resource: HashMap<ResourceId, Lapper<u64, LegId>>,
}

impl CommitmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_commitments<'a>(commitments: impl IntoIterator<Item = &'a Commitment>) -> Self {
        let mut intervals: HashMap<ResourceId, Vec<Interval<u64, LegId>>> = HashMap::new();
        for c in commitments {
            intervals.entry(c.resource).or_default().push(Interval {
                start: key(c.departure),
                stop: key(c.arrival),
                val: c.leg,
            });
        }
        Self {
            by_resource: intervals
                .into_iter()
                .map(|(resource, ivs)| (resource, Lapper::new(ivs)))
                .collect(),
        }
    }

    pub fn insert(&mut self, commitment: &Commitment) {
        let interval = Interval {
            start: key(commitment.departure),
            stop: key(commitment.arrival),
            val: commitment.leg,
        };
        match self.by_resource.get_mut(&commitment.resource) {
            Some(lapper) => lapper.insert(interval),
            None => {
                self.by_resource
                    .insert(commitment.resource, Lapper::new(vec![interval]));
            }
        }
    }

    /// Lapper has no removal, so the resource's tree is rebuilt.
    pub fn remove(&mut self, resource: ResourceId, leg: LegId) {
        if let Some(lapper) = self.by_resource.get_mut(&resource) {
            let kept: Vec<_> = lapper.iter().filter(|iv| iv.val != leg).cloned().collect();
            if kept.is_empty() {
                self.by_resource.remove(&resource);
            } else {
                *lapper = Lapper::new(kept);
            }
        }
    }

    /// Smallest leg id whose flight time intersects `[start, end]`, skipping
    /// `ignore` (the leg being re-assigned).
    pub fn conflict(
        &self,
        resource: ResourceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore: Option<LegId>,
    ) -> Option<LegId> {
        let (start, end) = (key(start), key(end));
        if start >= end {
            return None;
        }
        self.by_resource
            .get(&resource)?
            .find(start, end)
            .map(|iv| iv.val)
            .filter(|leg| Some(*leg) != ignore)
            .min()
    }

    pub fn is_free(&self, resource: ResourceId, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.conflict(resource, start, end, None).is_none()
    }

    pub fn legs_of(&self, resource: ResourceId) -> Vec<LegId> {
        self.by_resource
            .get(&resource)
            .map(|lapper| lapper.iter().map(|iv| iv.val).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn commitment(resource: ResourceId, leg: LegId, dep: u32, arr: u32) -> Commitment {
        Commitment {
            resource,
            leg,
            origin: AirportCode::TLV,
            dest: "LCA".parse().unwrap(),
            departure: at(dep),
            arrival: at(arr),
        }
    }

    #[test]
    fn buffer_gap_is_exclusive_at_the_edge() {
        let ac = ResourceId::Aircraft(1);
        let index = CommitmentIndex::from_commitments(&[commitment(ac, 10, 8, 10)]);
        let buffer = TimeDelta::hours(2);

        // Departing exactly one buffer after the committed arrival is fine
        let (s, e) = buffered_window(at(12), at(13), buffer);
        assert!(index.is_free(ac, s, e));

        // One hour short of the buffer is not
        let (s, e) = buffered_window(at(11), at(13), buffer);
        assert_eq!(index.conflict(ac, s, e, None), Some(10));
        assert_eq!(index.conflict(ac, s, e, Some(10)), None);
    }

    #[test]
    fn resources_are_independent() {
        let a = ResourceId::Aircraft(1);
        let c = ResourceId::Crew(1);
        let mut index = CommitmentIndex::new();
        index.insert(&commitment(a, 1, 8, 10));
        assert!(index.is_free(c, at(7), at(11)));
        assert!(!index.is_free(a, at(7), at(11)));
    }

    #[test]
    fn removal_rebuilds_tree() {
        let a = ResourceId::Crew(4);
        let mut index = CommitmentIndex::new();
        index.insert(&commitment(a, 1, 8, 10));
        index.insert(&commitment(a, 2, 14, 16));
        index.remove(a, 1);
        assert!(index.is_free(a, at(7), at(11)));
        assert_eq!(index.legs_of(a), vec![2]);
        index.remove(a, 2);
        assert!(index.legs_of(a).is_empty());
    }

    #[test]
    fn negative_buffer_still_excludes_overlap() {
        let ac = ResourceId::Aircraft(1);
        let index = CommitmentIndex::from_commitments(&[commitment(ac, 1, 10, 11)]);
        let (s, e) = buffered_window(at(10), at(11), TimeDelta::hours(-2));
        assert_eq!((s, e), (at(10), at(11)));
        assert_eq!(index.conflict(ac, s, e, None), Some(1));
    }

    #[test]
    fn instants_before_1970_keep_their_order() {
        let old = |hour: u32| Utc.with_ymd_and_hms(1965, 3, 1, hour, 0, 0).unwrap();
        assert!(key(old(8)) < key(old(9)));
        assert!(key(old(23)) < key(at(0)));

        let ac = ResourceId::Aircraft(1);
        let index = CommitmentIndex::from_commitments(&[Commitment {
            departure: old(8),
            arrival: old(10),
            ..commitment(ac, 1, 0, 1)
        }]);
        assert_eq!(index.conflict(ac, old(9), old(12), None), Some(1));
        assert!(index.is_free(ac, old(10), old(12)));
        assert!(index.is_free(ac, old(5), old(8)));
    }
}
