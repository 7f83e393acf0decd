//! Point-in-time copies of hospital state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audit::{fingerprint, AuditResult};
use crate::models::{ResourceKind, ResourceSubtype, ResourceUnit, UnitId, UnitStatus};

/// Unit counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub free: u32,
    pub reserved: u32,
    pub occupied: u32,
}

impl StatusCounts {
    pub fn total(&self) -> u32 {
        self.free + self.reserved + self.occupied
    }

    fn add(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Free => self.free += 1,
            UnitStatus::Reserved => self.reserved += 1,
            UnitStatus::Occupied => self.occupied += 1,
        }
    }
}

/// Read-only copy of every unit, consistent as of `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalState {
    /// Store revision this copy reflects
    pub revision: u64,
    pub taken_at: String,
    /// Units sorted by identifier
    pub units: Vec<ResourceUnit>,
}

/// The part of a snapshot that describes state, for fingerprinting.
#[derive(Serialize)]
struct StateDigestView<'a> {
    revision: u64,
    units: &'a [ResourceUnit],
}

impl HospitalState {
    pub(crate) fn new(revision: u64, mut units: Vec<ResourceUnit>) -> Self {
        units.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            revision,
            taken_at: chrono::Utc::now().to_rfc3339(),
            units,
        }
    }

    pub fn find(&self, id: &UnitId) -> Option<&ResourceUnit> {
        self.units
            .binary_search_by(|u| u.id.cmp(id))
            .ok()
            .map(|i| &self.units[i])
    }

    pub fn units_of(&self, subtype: ResourceSubtype) -> impl Iterator<Item = &ResourceUnit> {
        self.units.iter().filter(move |u| u.subtype == subtype)
    }

    pub fn units_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceUnit> {
        self.units.iter().filter(move |u| u.kind() == kind)
    }

    /// Status counts for one subtype.
    pub fn count_by_status(&self, subtype: ResourceSubtype) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for unit in self.units_of(subtype) {
            counts.add(unit.status());
        }
        counts
    }

    /// Status counts for every subtype present.
    pub fn status_counts(&self) -> BTreeMap<ResourceSubtype, StatusCounts> {
        let mut counts: BTreeMap<ResourceSubtype, StatusCounts> = BTreeMap::new();
        for unit in &self.units {
            counts.entry(unit.subtype).or_default().add(unit.status());
        }
        counts
    }

    /// Claims the subtype can still accept: free units for beds and
    /// equipment, summed spare capacity for staff.
    pub fn free_supply(&self, subtype: ResourceSubtype) -> u32 {
        if subtype.is_exclusive() {
            self.count_by_status(subtype).free
        } else {
            self.units_of(subtype).map(ResourceUnit::spare_capacity).sum()
        }
    }

    /// Fingerprint of the revision and unit contents (not the timestamp).
    pub fn digest(&self) -> AuditResult<String> {
        fingerprint(&StateDigestView {
            revision: self.revision,
            units: &self.units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientId;

    fn state() -> HospitalState {
        HospitalState::new(
            4,
            vec![
                ResourceUnit::new("VENT-02", ResourceSubtype::Ventilator),
                ResourceUnit::new("VENT-01", ResourceSubtype::Ventilator)
                    .occupied_by(PatientId::new("P1")),
                ResourceUnit::new("DR-A", ResourceSubtype::EdPhysician).with_unrecorded_load(3),
                ResourceUnit::new("DR-B", ResourceSubtype::EdPhysician).with_unrecorded_load(5),
            ],
        )
    }

    #[test]
    fn test_units_sorted_and_found() {
        let state = state();
        let ids: Vec<&str> = state.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["DR-A", "DR-B", "VENT-01", "VENT-02"]);
        assert!(state.find(&UnitId::new("VENT-02")).is_some());
        assert!(state.find(&UnitId::new("VENT-09")).is_none());
    }

    #[test]
    fn test_free_supply() {
        let state = state();
        assert_eq!(state.free_supply(ResourceSubtype::Ventilator), 1);
        // DR-A has 2 spare, DR-B is full
        assert_eq!(state.free_supply(ResourceSubtype::EdPhysician), 2);
        assert_eq!(state.free_supply(ResourceSubtype::IcuBed), 0);
    }

    #[test]
    fn test_status_counts_conserve_units() {
        let state = state();
        let vents = state.count_by_status(ResourceSubtype::Ventilator);
        assert_eq!(vents, StatusCounts { free: 1, reserved: 0, occupied: 1 });

        let total: u32 = state.status_counts().values().map(StatusCounts::total).sum();
        assert_eq!(total as usize, state.units.len());
    }

    #[test]
    fn test_digest_ignores_timestamp() {
        let a = state();
        let mut b = state();
        b.taken_at = "2024-10-30T08:00:00Z".into();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }
}
