//! Hospital state store.
//!
//! Single source of truth for beds, staff and equipment. Every unit sits
//! behind its own mutex so operations on disjoint units never contend; a
//! store-wide revision counter is bumped once per successful mutation and
//! stamped onto the mutated unit as its version.
//!
//! Snapshots are taken optimistically: copy every unit, then check that the
//! revision did not move. After `snapshot_attempts` failed tries the
//! snapshot briefly quiesces writers through the gate and copies under it.

mod snapshot;

pub use snapshot::*;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Claim, ClaimState, Department, Holder, PatientId, ResourceSubtype, ResourceUnit, UnitId,
};

/// Default optimistic snapshot attempts before falling back to the gate.
pub const DEFAULT_SNAPSHOT_ATTEMPTS: u32 = 3;

/// Store errors.
///
/// Running out of matching units is not an error; see [`ReserveOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    #[error("Duplicate unit: {0}")]
    DuplicateUnit(UnitId),

    #[error("Unit {unit} cannot start with capacity {capacity} and {claims} claims")]
    InvalidUnit {
        unit: UnitId,
        capacity: u32,
        claims: usize,
    },

    #[error("Unit {unit} changed concurrently (expected version {expected}, found {actual})")]
    Conflict {
        unit: UnitId,
        expected: u64,
        actual: u64,
    },

    #[error("Unit {unit} has no free capacity")]
    Unavailable { unit: UnitId },

    #[error("Patient {patient} already holds unit {unit}")]
    DuplicateClaim { unit: UnitId, patient: PatientId },

    #[error("Unit {unit} has {holders} holders; name the patient to release")]
    AmbiguousRelease { unit: UnitId, holders: usize },

    #[error("Patient {patient} holds no claim on unit {unit}")]
    NotHeld { unit: UnitId, patient: PatientId },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::LockPoisoned
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What a reservation is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveCriteria {
    pub subtype: ResourceSubtype,
    /// Restrict to units owned by this department
    pub department: Option<Department>,
}

impl ReserveCriteria {
    pub fn subtype(subtype: ResourceSubtype) -> Self {
        Self {
            subtype,
            department: None,
        }
    }

    pub fn in_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }

    fn admits(&self, unit: &ResourceUnit, patient: &PatientId) -> bool {
        unit.matches(self.subtype, self.department)
            && unit.is_free()
            && unit.claim_of(patient).is_none()
    }
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    /// The unit as it stands after the reservation
    Reserved(ResourceUnit),
    /// No matching unit had free capacity; nothing was mutated
    NotAvailable,
}

impl ReserveOutcome {
    pub fn unit(&self) -> Option<&ResourceUnit> {
        match self {
            ReserveOutcome::Reserved(unit) => Some(unit),
            ReserveOutcome::NotAvailable => None,
        }
    }
}

/// Result of a release.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    /// A claim was removed
    Released(Claim),
    /// There was nothing to release; nothing was mutated
    AlreadyFree,
}

/// Concurrent store of resource units.
pub struct StateStore {
    /// Fixed at construction; only unit contents change
    units: BTreeMap<UnitId, Mutex<ResourceUnit>>,
    /// Unit ids per subtype, in identifier order
    by_subtype: BTreeMap<ResourceSubtype, Vec<UnitId>>,
    revision: AtomicU64,
    /// Mutations hold it shared; the snapshot fallback holds it exclusively
    gate: RwLock<()>,
    snapshot_attempts: u32,
}

impl StateStore {
    /// Build a store from initial units.
    ///
    /// Beds and equipment must have capacity 1; every unit needs a nonzero
    /// capacity and no more seeded claims than it has capacity for.
    pub fn new(units: impl IntoIterator<Item = ResourceUnit>) -> StoreResult<Self> {
        let mut slots = BTreeMap::new();
        let mut by_subtype: BTreeMap<ResourceSubtype, Vec<UnitId>> = BTreeMap::new();

        for mut unit in units {
            if slots.contains_key(&unit.id) {
                return Err(StoreError::DuplicateUnit(unit.id));
            }
            check_seed(&unit)?;
            unit.version = 0;
            by_subtype.entry(unit.subtype).or_default().push(unit.id.clone());
            slots.insert(unit.id.clone(), Mutex::new(unit));
        }
        for ids in by_subtype.values_mut() {
            ids.sort();
        }

        Ok(Self {
            units: slots,
            by_subtype,
            revision: AtomicU64::new(0),
            gate: RwLock::new(()),
            snapshot_attempts: DEFAULT_SNAPSHOT_ATTEMPTS,
        })
    }

    /// Set optimistic snapshot attempts (at least one).
    pub fn with_snapshot_attempts(mut self, attempts: u32) -> Self {
        self.snapshot_attempts = attempts.max(1);
        self
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Copy of one unit.
    pub fn unit(&self, id: &UnitId) -> StoreResult<ResourceUnit> {
        Ok(self.slot(id)?.lock()?.clone())
    }

    /// Consistent copy of every unit, tagged with the revision it reflects.
    pub fn snapshot(&self) -> StoreResult<HospitalState> {
        for attempt in 1..=self.snapshot_attempts {
            let before = self.revision();
            let units = self.copy_units()?;
            if self.revision() == before {
                return Ok(HospitalState::new(before, units));
            }
            debug!(attempt, "Snapshot raced a mutation, retrying");
        }

        let _quiesced = self.gate.write()?;
        let revision = self.revision();
        let units = self.copy_units()?;
        Ok(HospitalState::new(revision, units))
    }

    /// Reserve one free unit matching `criteria` for `patient`.
    ///
    /// Beds and equipment: lowest identifier first. Staff: lowest workload,
    /// then lowest identifier. Staff selection is optimistic, so a racing
    /// mutation on the chosen member yields [`StoreError::Conflict`].
    pub fn reserve(
        &self,
        criteria: &ReserveCriteria,
        patient: &PatientId,
    ) -> StoreResult<ReserveOutcome> {
        let Some(ids) = self.by_subtype.get(&criteria.subtype) else {
            debug!(subtype = %criteria.subtype, patient_id = %patient, "No units of subtype");
            return Ok(ReserveOutcome::NotAvailable);
        };

        let _gate = self.gate.read()?;
        let outcome = if criteria.subtype.is_exclusive() {
            self.reserve_first_free(ids, criteria, patient)?
        } else {
            self.reserve_least_loaded(ids, criteria, patient)?
        };

        match &outcome {
            ReserveOutcome::Reserved(unit) => debug!(
                unit = %unit.id,
                subtype = %criteria.subtype,
                patient_id = %patient,
                version = unit.version,
                "Unit reserved"
            ),
            ReserveOutcome::NotAvailable => debug!(
                subtype = %criteria.subtype,
                patient_id = %patient,
                "No matching unit available"
            ),
        }
        Ok(outcome)
    }

    fn reserve_first_free(
        &self,
        ids: &[UnitId],
        criteria: &ReserveCriteria,
        patient: &PatientId,
    ) -> StoreResult<ReserveOutcome> {
        for id in ids {
            let mut unit = self.slot(id)?.lock()?;
            if criteria.admits(&unit, patient) {
                unit.claims.push(Claim::reserved(patient.clone()));
                self.stamp(&mut unit);
                return Ok(ReserveOutcome::Reserved(unit.clone()));
            }
        }
        Ok(ReserveOutcome::NotAvailable)
    }

    fn reserve_least_loaded(
        &self,
        ids: &[UnitId],
        criteria: &ReserveCriteria,
        patient: &PatientId,
    ) -> StoreResult<ReserveOutcome> {
        // Observe one unit at a time; never hold two unit locks.
        let mut best: Option<(u32, &UnitId, u64)> = None;
        for id in ids {
            let unit = self.slot(id)?.lock()?;
            if !criteria.admits(&unit, patient) {
                continue;
            }
            // Ids are sorted, so a strict comparison keeps the lowest id on ties.
            if best.map_or(true, |(load, _, _)| unit.workload() < load) {
                best = Some((unit.workload(), id, unit.version));
            }
        }

        let Some((_, id, observed)) = best else {
            return Ok(ReserveOutcome::NotAvailable);
        };

        let mut unit = self.slot(id)?.lock()?;
        if unit.version != observed {
            warn!(
                unit = %id,
                expected = observed,
                actual = unit.version,
                patient_id = %patient,
                "Staff member changed between selection and reservation"
            );
            return Err(StoreError::Conflict {
                unit: id.clone(),
                expected: observed,
                actual: unit.version,
            });
        }
        unit.claims.push(Claim::reserved(patient.clone()));
        self.stamp(&mut unit);
        Ok(ReserveOutcome::Reserved(unit.clone()))
    }

    /// Reserve a specific unit (manual override).
    ///
    /// With `expected_version`, the reservation only applies if the unit has
    /// not changed since the caller observed it.
    pub fn reserve_unit(
        &self,
        id: &UnitId,
        patient: &PatientId,
        expected_version: Option<u64>,
    ) -> StoreResult<ResourceUnit> {
        let _gate = self.gate.read()?;
        let mut unit = self.slot(id)?.lock()?;

        if let Some(expected) = expected_version {
            if unit.version != expected {
                return Err(StoreError::Conflict {
                    unit: id.clone(),
                    expected,
                    actual: unit.version,
                });
            }
        }
        if unit.claim_of(patient).is_some() {
            return Err(StoreError::DuplicateClaim {
                unit: id.clone(),
                patient: patient.clone(),
            });
        }
        if !unit.is_free() {
            return Err(StoreError::Unavailable { unit: id.clone() });
        }

        unit.claims.push(Claim::reserved(patient.clone()));
        self.stamp(&mut unit);
        debug!(unit = %id, patient_id = %patient, version = unit.version, "Unit reserved by override");
        Ok(unit.clone())
    }

    /// Release a claim on a unit.
    ///
    /// With a patient, only that patient's claim is released. Without one,
    /// the unit's sole claim is released; a staff member holding several
    /// claims must be released per patient. Releasing something not held is
    /// a no-op, so repeated releases leave the store unchanged.
    pub fn release(&self, id: &UnitId, patient: Option<&PatientId>) -> StoreResult<ReleaseOutcome> {
        let _gate = self.gate.read()?;
        let mut unit = self.slot(id)?.lock()?;

        let index = match patient {
            Some(patient) => unit.claims.iter().position(|c| c.is_held_by(patient)),
            None => match unit.claims.len() {
                0 => None,
                1 => Some(0),
                holders => {
                    return Err(StoreError::AmbiguousRelease {
                        unit: id.clone(),
                        holders,
                    })
                }
            },
        };

        let Some(index) = index else {
            return Ok(ReleaseOutcome::AlreadyFree);
        };

        let claim = unit.claims.remove(index);
        self.stamp(&mut unit);
        debug!(unit = %id, holder = ?claim.holder, version = unit.version, "Unit released");
        Ok(ReleaseOutcome::Released(claim))
    }

    /// Mark a patient's reservation as consumed (RESERVED → OCCUPIED).
    ///
    /// Committing an already occupied claim is a no-op.
    pub fn commit_occupancy(&self, id: &UnitId, patient: &PatientId) -> StoreResult<ResourceUnit> {
        let _gate = self.gate.read()?;
        let mut unit = self.slot(id)?.lock()?;

        let claim = unit
            .claims
            .iter_mut()
            .find(|c| c.is_held_by(patient))
            .ok_or_else(|| StoreError::NotHeld {
                unit: id.clone(),
                patient: patient.clone(),
            })?;

        if claim.state == ClaimState::Reserved {
            claim.state = ClaimState::Occupied;
            self.stamp(&mut unit);
            debug!(unit = %id, patient_id = %patient, version = unit.version, "Occupancy committed");
        }
        Ok(unit.clone())
    }

    /// Drop a patient's claim only while it is still RESERVED.
    ///
    /// Returns whether a claim was removed. Occupied claims are left alone.
    pub fn cancel_reservation(&self, id: &UnitId, patient: &PatientId) -> StoreResult<bool> {
        let _gate = self.gate.read()?;
        let mut unit = self.slot(id)?.lock()?;

        let Some(index) = unit
            .claims
            .iter()
            .position(|c| c.is_held_by(patient) && c.state == ClaimState::Reserved)
        else {
            return Ok(false);
        };

        unit.claims.remove(index);
        self.stamp(&mut unit);
        Ok(true)
    }

    /// Holders of a unit, oldest claim first.
    pub fn holders(&self, id: &UnitId) -> StoreResult<Vec<Holder>> {
        let unit = self.slot(id)?.lock()?;
        Ok(unit.claims.iter().map(|c| c.holder.clone()).collect())
    }

    fn slot(&self, id: &UnitId) -> StoreResult<&Mutex<ResourceUnit>> {
        self.units
            .get(id)
            .ok_or_else(|| StoreError::UnknownUnit(id.clone()))
    }

    /// Bump the revision and stamp it on the unit. Call with the unit locked.
    fn stamp(&self, unit: &mut ResourceUnit) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        unit.version = revision;
        revision
    }

    fn copy_units(&self) -> StoreResult<Vec<ResourceUnit>> {
        self.units
            .values()
            .map(|slot| -> StoreResult<ResourceUnit> { Ok(slot.lock()?.clone()) })
            .collect()
    }
}

fn check_seed(unit: &ResourceUnit) -> StoreResult<()> {
    let capacity_ok = if unit.is_exclusive() {
        unit.capacity == 1
    } else {
        unit.capacity > 0
    };
    if !capacity_ok || unit.workload() > unit.capacity {
        return Err(StoreError::InvalidUnit {
            unit: unit.id.clone(),
            capacity: unit.capacity,
            claims: unit.claims.len(),
        });
    }
    Ok(())
}
