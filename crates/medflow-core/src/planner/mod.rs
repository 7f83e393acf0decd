//! Allocation planner.
//!
//! Pipeline: Need Lists → Contention Detection → Conflict Resolution →
//! Union Order → Sequential Reservation
//!
//! One batch runs on one thread. Several planners may share a store; the
//! store's per-unit locking keeps their reservations apart, and each batch
//! applies its reservations strictly in its own processing order.

mod abort;
mod demand;
mod needs;

pub use abort::AbortSignal;
pub use demand::{detect_contention, processing_order, Contention};
pub use needs::needs_for;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    AllocationOutcome, AllocationPlan, AllocationStatus, ClinicalAssessment, Need, PatientId,
    ReservedUnit, ResourceSubtype, ResourceUnit, UnitId, UnmetNeed, UnmetReason,
};
use crate::resolver::ConflictResolver;
use crate::store::{
    HospitalState, ReserveCriteria, ReserveOutcome, StateStore, StoreError, StoreResult,
};

/// Retries after a concurrent-modification conflict before giving up on a need.
const CONFLICT_RETRIES: u32 = 1;

/// Planner errors.
///
/// Unavailable or conflicted needs are recorded in the plan, not raised.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Batch {batch_id} aborted; released {released} reservations")]
    Aborted { batch_id: String, released: usize },

    #[error("Patient {0} appears more than once in the batch")]
    DuplicatePatient(PatientId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Store operations the planner relies on.
pub trait ReservationBackend {
    fn snapshot(&self) -> StoreResult<HospitalState>;

    fn revision(&self) -> u64;

    fn reserve(&self, criteria: &ReserveCriteria, patient: &PatientId) -> StoreResult<ReserveOutcome>;

    /// Drop a still-uncommitted reservation; `false` if there was none.
    fn cancel_reservation(&self, id: &UnitId, patient: &PatientId) -> StoreResult<bool>;
}

impl ReservationBackend for StateStore {
    fn snapshot(&self) -> StoreResult<HospitalState> {
        StateStore::snapshot(self)
    }

    fn revision(&self) -> u64 {
        StateStore::revision(self)
    }

    fn reserve(&self, criteria: &ReserveCriteria, patient: &PatientId) -> StoreResult<ReserveOutcome> {
        StateStore::reserve(self, criteria, patient)
    }

    fn cancel_reservation(&self, id: &UnitId, patient: &PatientId) -> StoreResult<bool> {
        StateStore::cancel_reservation(self, id, patient)
    }
}

/// Walks a scored batch and reserves resources against the store.
pub struct AllocationPlanner<'a, S: ?Sized = StateStore> {
    store: &'a S,
    resolver: ConflictResolver,
}

impl<'a, S: ReservationBackend + ?Sized> AllocationPlanner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            resolver: ConflictResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Allocate a batch to completion.
    pub fn allocate(&self, batch: &[ClinicalAssessment]) -> PlanResult<AllocationPlan> {
        self.allocate_with_abort(batch, &AbortSignal::new())
    }

    /// Allocate a batch, checking `abort` before every reservation.
    ///
    /// On abort, every unit this batch reserved and nobody has committed yet
    /// is released before the error is returned.
    pub fn allocate_with_abort(
        &self,
        batch: &[ClinicalAssessment],
        abort: &AbortSignal,
    ) -> PlanResult<AllocationPlan> {
        check_unique(batch)?;
        let batch_id = Uuid::new_v4().to_string();

        // Step 1: Need lists against a consistent view of supply
        let state = self.store.snapshot()?;
        let needs: Vec<Vec<Need>> = batch.iter().map(needs_for).collect();

        // Step 2: Resolve each contested subtype
        let resolutions: Vec<_> = detect_contention(&needs, &state)
            .into_iter()
            .map(|contention| {
                info!(
                    batch_id = %batch_id,
                    conflict = %contention.conflict_type,
                    "Contention detected"
                );
                self.resolver.resolve(
                    contention.contenders.iter().map(|&i| &batch[i]),
                    contention.conflict_type,
                )
            })
            .collect();

        // Step 3: Reserve in union order
        let order = processing_order(batch, &resolutions);
        let mut granted: Vec<(UnitId, PatientId)> = Vec::new();
        let mut outcomes = Vec::with_capacity(batch.len());

        for (position, &index) in order.iter().enumerate() {
            let assessment = &batch[index];
            let patient = &assessment.patient_id;
            let mut reserved = Vec::new();
            let mut unmet = Vec::new();

            for need in &needs[index] {
                if abort.is_aborted() {
                    let released = self.rollback(&granted);
                    warn!(batch_id = %batch_id, released, "Allocation batch aborted");
                    return Err(PlanError::Aborted { batch_id, released });
                }

                let (units, missing) = self.satisfy(need, patient);
                granted.extend(units.iter().map(|u| (u.unit_id.clone(), patient.clone())));
                reserved.extend(units);
                unmet.extend(missing);
            }

            let status = AllocationOutcome::status_for(&reserved, &unmet);
            debug!(
                batch_id = %batch_id,
                patient_id = %patient,
                order = position + 1,
                status = status.as_str(),
                reserved = reserved.len(),
                unmet = unmet.len(),
                "Patient allocated"
            );
            outcomes.push(AllocationOutcome {
                patient_id: patient.clone(),
                allocation_order: position as u32 + 1,
                priority_tier: assessment.priority_tier,
                reserved,
                unmet,
                status,
            });
        }

        let plan = AllocationPlan {
            batch_id,
            outcomes,
            resolutions,
            revision_before: state.revision,
            revision_after: self.store.revision(),
            completed_at: chrono::Utc::now().to_rfc3339(),
        };

        info!(
            batch_id = %plan.batch_id,
            patients = plan.outcomes.len(),
            conflicts = plan.resolutions.len(),
            fully_allocated = count_status(&plan, AllocationStatus::FullyAllocated),
            partial = count_status(&plan, AllocationStatus::PartiallyAllocated),
            deferred = count_status(&plan, AllocationStatus::Deferred),
            "Allocation batch complete"
        );
        Ok(plan)
    }

    /// Reserve one need: the primary subtype, else the first alternate
    /// that is available. An unavailable primary is reported unmet even
    /// when an alternate stands in for it.
    fn satisfy(&self, need: &Need, patient: &PatientId) -> (Vec<ReservedUnit>, Option<UnmetNeed>) {
        match self.reserve_with_retry(need.subtype, patient) {
            Ok(Some(unit)) => (
                vec![ReservedUnit {
                    unit_id: unit.id,
                    subtype: need.subtype,
                    substitute_for: None,
                }],
                None,
            ),
            Ok(None) => {
                let unmet = UnmetNeed {
                    subtype: need.subtype,
                    reason: UnmetReason::NotAvailable,
                };
                let substitute = need.alternates.iter().find_map(|&alternate| {
                    match self.reserve_with_retry(alternate, patient) {
                        Ok(Some(unit)) => Some(ReservedUnit {
                            unit_id: unit.id,
                            subtype: alternate,
                            substitute_for: Some(need.subtype),
                        }),
                        Ok(None) | Err(_) => None,
                    }
                });
                if let Some(unit) = &substitute {
                    debug!(
                        patient_id = %patient,
                        primary = %need.subtype,
                        substitute = %unit.subtype,
                        unit = %unit.unit_id,
                        "Alternate reserved"
                    );
                }
                (substitute.into_iter().collect(), Some(unmet))
            }
            Err(reason) => (
                Vec::new(),
                Some(UnmetNeed {
                    subtype: need.subtype,
                    reason,
                }),
            ),
        }
    }

    /// Reserve one unit of `subtype`, retrying once on a conflict.
    fn reserve_with_retry(
        &self,
        subtype: ResourceSubtype,
        patient: &PatientId,
    ) -> Result<Option<ResourceUnit>, UnmetReason> {
        let criteria = ReserveCriteria::subtype(subtype);
        let mut attempt = 0;

        loop {
            match self.store.reserve(&criteria, patient) {
                Ok(ReserveOutcome::Reserved(unit)) => return Ok(Some(unit)),
                Ok(ReserveOutcome::NotAvailable) => return Ok(None),
                Err(StoreError::Conflict { unit, .. }) if attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(patient_id = %patient, subtype = %subtype, unit = %unit, attempt, "Retrying after conflict");
                }
                Err(StoreError::Conflict { unit, .. }) => {
                    warn!(patient_id = %patient, subtype = %subtype, unit = %unit, "Conflict persisted after retry");
                    return Err(UnmetReason::StateConflict);
                }
                Err(error) => {
                    warn!(patient_id = %patient, subtype = %subtype, error = %error, "Reservation failed");
                    return Err(UnmetReason::StoreFault);
                }
            }
        }
    }

    /// Release every reservation in `granted` that is still uncommitted.
    fn rollback(&self, granted: &[(UnitId, PatientId)]) -> usize {
        granted
            .iter()
            .filter(|(unit, patient)| match self.store.cancel_reservation(unit, patient) {
                Ok(released) => released,
                Err(error) => {
                    warn!(unit = %unit, patient_id = %patient, error = %error, "Release during abort failed");
                    false
                }
            })
            .count()
    }
}

fn check_unique(batch: &[ClinicalAssessment]) -> PlanResult<()> {
    let mut seen = BTreeSet::new();
    for assessment in batch {
        if !seen.insert(&assessment.patient_id) {
            return Err(PlanError::DuplicatePatient(assessment.patient_id.clone()));
        }
    }
    Ok(())
}

fn count_status(plan: &AllocationPlan, status: AllocationStatus) -> usize {
    plan.outcomes.iter().filter(|o| o.status == status).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::models::{PatientCase, VitalSigns};
    use crate::scoring::score;

    fn critical(id: &str, age: u32) -> ClinicalAssessment {
        score(
            &PatientCase::new(id, age)
                .with_vitals(VitalSigns::new(140.0, 85.0, 86.0))
                .with_symptoms(["chest pain"]),
        )
    }

    fn stable(id: &str) -> ClinicalAssessment {
        score(&PatientCase::new(id, 30).with_vitals(VitalSigns::new(80.0, 120.0, 98.0)))
    }

    fn store() -> StateStore {
        StateStore::new(vec![
            ResourceUnit::new("ICU-1", ResourceSubtype::IcuBed),
            ResourceUnit::new("TB-1", ResourceSubtype::TraumaBay),
            ResourceUnit::new("GB-1", ResourceSubtype::GeneralBed),
            ResourceUnit::new("GB-2", ResourceSubtype::GeneralBed),
            ResourceUnit::new("DR-A", ResourceSubtype::EdPhysician),
            ResourceUnit::new("RN-A", ResourceSubtype::EdNurse),
            ResourceUnit::new("CARD-A", ResourceSubtype::Cardiologist).with_capacity(2),
            ResourceUnit::new("VENT-01", ResourceSubtype::Ventilator),
            ResourceUnit::new("VENT-02", ResourceSubtype::Ventilator),
            ResourceUnit::new("MON-01", ResourceSubtype::CardiacMonitor),
            ResourceUnit::new("MON-02", ResourceSubtype::CardiacMonitor),
            ResourceUnit::new("DEFIB-01", ResourceSubtype::Defibrillator),
            ResourceUnit::new("DEFIB-02", ResourceSubtype::Defibrillator),
        ])
        .unwrap()
    }

    #[test]
    fn test_uncontested_batch_fully_allocated() {
        let store = store();
        let plan = AllocationPlanner::new(&store)
            .allocate(&[stable("S1"), stable("S2")])
            .unwrap();

        assert!(plan.resolutions.is_empty());
        assert_eq!(plan.processing_order(), vec![&PatientId::new("S1"), &PatientId::new("S2")]);
        assert!(plan
            .outcomes
            .iter()
            .all(|o| o.status == AllocationStatus::FullyAllocated));
        assert_eq!(plan.revision_after - plan.revision_before, 6);
    }

    #[test]
    fn test_icu_shortage_uses_alternate() {
        let store = store();
        let plan = AllocationPlanner::new(&store)
            .allocate(&[critical("P-YOUNG", 50), critical("P-OLD", 85)])
            .unwrap();

        let icu = plan.contested(ResourceSubtype::IcuBed).unwrap();
        assert_eq!(icu.conflict_type.code(), "icu_bed_shortage");

        let first = &plan.outcomes[0];
        let second = &plan.outcomes[1];
        assert_eq!(first.patient_id.as_str(), "P-OLD");
        assert_eq!(first.unit_for(ResourceSubtype::IcuBed).unwrap().as_str(), "ICU-1");
        assert!(second.is_unmet(ResourceSubtype::IcuBed));
        assert_eq!(second.status, AllocationStatus::PartiallyAllocated);

        let bay = second
            .reserved
            .iter()
            .find(|r| r.subtype == ResourceSubtype::TraumaBay)
            .unwrap();
        assert_eq!(bay.substitute_for, Some(ResourceSubtype::IcuBed));
    }

    #[test]
    fn test_deferred_when_nothing_left() {
        let store = StateStore::new(vec![ResourceUnit::new("ICU-1", ResourceSubtype::IcuBed)]).unwrap();
        let plan = AllocationPlanner::new(&store).allocate(&[stable("S1")]).unwrap();

        assert_eq!(plan.outcomes[0].status, AllocationStatus::Deferred);
        assert_eq!(plan.revision_before, plan.revision_after);
    }

    #[test]
    fn test_duplicate_patient_rejected() {
        let store = store();
        let result = AllocationPlanner::new(&store).allocate(&[stable("S1"), stable("S1")]);
        assert!(matches!(result, Err(PlanError::DuplicatePatient(_))));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_abort_before_start_reserves_nothing() {
        let store = store();
        let signal = AbortSignal::new();
        signal.abort();

        let result = AllocationPlanner::new(&store).allocate_with_abort(&[stable("S1")], &signal);
        assert!(matches!(result, Err(PlanError::Aborted { released: 0, .. })));
        assert_eq!(store.revision(), 0);
    }

    /// Fails reservations of one subtype with `failure` until `failures`
    /// runs out, counting every attempt on that subtype.
    struct FailingStore {
        inner: StateStore,
        subtype: ResourceSubtype,
        failures: Cell<u32>,
        failure: fn() -> StoreError,
        attempts: Cell<u32>,
    }

    impl FailingStore {
        fn new(subtype: ResourceSubtype, failures: u32, failure: fn() -> StoreError) -> Self {
            Self {
                inner: store(),
                subtype,
                failures: Cell::new(failures),
                failure,
                attempts: Cell::new(0),
            }
        }
    }

    fn conflict() -> StoreError {
        StoreError::Conflict {
            unit: UnitId::new("DR-A"),
            expected: 0,
            actual: 1,
        }
    }

    impl ReservationBackend for FailingStore {
        fn snapshot(&self) -> StoreResult<HospitalState> {
            self.inner.snapshot()
        }

        fn revision(&self) -> u64 {
            self.inner.revision()
        }

        fn reserve(&self, criteria: &ReserveCriteria, patient: &PatientId) -> StoreResult<ReserveOutcome> {
            if criteria.subtype == self.subtype {
                self.attempts.set(self.attempts.get() + 1);
                if self.failures.get() > 0 {
                    self.failures.set(self.failures.get() - 1);
                    return Err((self.failure)());
                }
            }
            self.inner.reserve(criteria, patient)
        }

        fn cancel_reservation(&self, id: &UnitId, patient: &PatientId) -> StoreResult<bool> {
            self.inner.cancel_reservation(id, patient)
        }
    }

    /// Trips `signal` once `after` reservations have been granted.
    struct AbortingStore<'s> {
        inner: &'s StateStore,
        signal: AbortSignal,
        after: usize,
        granted: Cell<usize>,
    }

    impl ReservationBackend for AbortingStore<'_> {
        fn snapshot(&self) -> StoreResult<HospitalState> {
            self.inner.snapshot()
        }

        fn revision(&self) -> u64 {
            self.inner.revision()
        }

        fn reserve(&self, criteria: &ReserveCriteria, patient: &PatientId) -> StoreResult<ReserveOutcome> {
            let outcome = self.inner.reserve(criteria, patient)?;
            if outcome.unit().is_some() {
                self.granted.set(self.granted.get() + 1);
                if self.granted.get() == self.after {
                    self.signal.abort();
                }
            }
            Ok(outcome)
        }

        fn cancel_reservation(&self, id: &UnitId, patient: &PatientId) -> StoreResult<bool> {
            self.inner.cancel_reservation(id, patient)
        }
    }

    #[test]
    fn test_persistent_conflict_retried_once_then_unmet() {
        let store = FailingStore::new(ResourceSubtype::EdPhysician, 2, conflict);
        let plan = AllocationPlanner::new(&store)
            .allocate(&[stable("S1"), stable("S2")])
            .unwrap();

        let first = plan.outcome(&PatientId::new("S1")).unwrap();
        assert_eq!(
            first.unmet,
            vec![UnmetNeed {
                subtype: ResourceSubtype::EdPhysician,
                reason: UnmetReason::StateConflict,
            }]
        );
        assert_eq!(first.status, AllocationStatus::PartiallyAllocated);
        assert!(first.unit_for(ResourceSubtype::GeneralBed).is_some());
        assert!(first.unit_for(ResourceSubtype::EdNurse).is_some());

        // One initial attempt and one retry for S1, then one clean attempt for S2
        assert_eq!(store.attempts.get(), 3);
        let second = plan.outcome(&PatientId::new("S2")).unwrap();
        assert_eq!(second.status, AllocationStatus::FullyAllocated);
        assert_eq!(second.unit_for(ResourceSubtype::EdPhysician).unwrap().as_str(), "DR-A");
    }

    #[test]
    fn test_conflict_cleared_by_retry() {
        let store = FailingStore::new(ResourceSubtype::EdPhysician, 1, conflict);
        let plan = AllocationPlanner::new(&store).allocate(&[stable("S1")]).unwrap();

        assert_eq!(store.attempts.get(), 2);
        let outcome = &plan.outcomes[0];
        assert_eq!(outcome.status, AllocationStatus::FullyAllocated);
        assert!(outcome.unmet.is_empty());
        assert_eq!(outcome.unit_for(ResourceSubtype::EdPhysician).unwrap().as_str(), "DR-A");
    }

    #[test]
    fn test_store_fault_not_retried() {
        let store = FailingStore::new(ResourceSubtype::EdNurse, 5, || StoreError::LockPoisoned);
        let plan = AllocationPlanner::new(&store).allocate(&[stable("S1")]).unwrap();

        assert_eq!(store.attempts.get(), 1);
        assert_eq!(
            plan.outcomes[0].unmet,
            vec![UnmetNeed {
                subtype: ResourceSubtype::EdNurse,
                reason: UnmetReason::StoreFault,
            }]
        );
    }

    #[test]
    fn test_abort_mid_batch_releases_granted_units() {
        let inner = store();
        let before = inner.snapshot().unwrap();
        let signal = AbortSignal::new();
        // P-OLD takes all seven of its needs; P-YOUNG then gets a ventilator,
        // a defibrillator and the trauma bay standing in for the ICU bed.
        let store = AbortingStore {
            inner: &inner,
            signal: signal.clone(),
            after: 10,
            granted: Cell::new(0),
        };

        let result = AllocationPlanner::new(&store)
            .allocate_with_abort(&[critical("P-YOUNG", 50), critical("P-OLD", 85)], &signal);

        assert!(matches!(result, Err(PlanError::Aborted { released: 10, .. })));
        let after = inner.snapshot().unwrap();
        assert_eq!(after.status_counts(), before.status_counts());
        assert!(after.units.iter().all(|u| u.claims.is_empty()));
        assert!(inner.holders(&UnitId::new("TB-1")).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_skips_committed() {
        let store = store();
        let planner = AllocationPlanner::new(&store);
        let patient = PatientId::new("P1");
        let vent = UnitId::new("VENT-01");
        let bed = UnitId::new("ICU-1");

        store.reserve_unit(&vent, &patient, None).unwrap();
        store.reserve_unit(&bed, &patient, None).unwrap();
        store.commit_occupancy(&bed, &patient).unwrap();

        let released = planner.rollback(&[(vent.clone(), patient.clone()), (bed.clone(), patient.clone())]);
        assert_eq!(released, 1);
        assert!(store.unit(&vent).unwrap().is_free());
        assert!(!store.unit(&bed).unwrap().is_free());
    }
}
