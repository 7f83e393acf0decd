//! Allocation outcome models.

use serde::{Deserialize, Serialize};

use crate::audit::{fingerprint, AuditResult};

use super::assessment::PriorityTier;
use super::conflict::ConflictResolution;
use super::patient::PatientId;
use super::resource::{ResourceSubtype, UnitId};

/// One resource a patient needs, with acceptable substitutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Need {
    pub subtype: ResourceSubtype,
    /// Tried in order once the primary subtype is not available
    pub alternates: Vec<ResourceSubtype>,
}

impl Need {
    pub fn new(subtype: ResourceSubtype) -> Self {
        Self {
            subtype,
            alternates: Vec::new(),
        }
    }

    pub fn with_alternates(subtype: ResourceSubtype, alternates: &[ResourceSubtype]) -> Self {
        Self {
            subtype,
            alternates: alternates.to_vec(),
        }
    }
}

/// Overall allocation status for a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    FullyAllocated,
    PartiallyAllocated,
    Deferred,
}

impl AllocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::FullyAllocated => "FULLY_ALLOCATED",
            AllocationStatus::PartiallyAllocated => "PARTIALLY_ALLOCATED",
            AllocationStatus::Deferred => "DEFERRED",
        }
    }
}

/// A unit reserved for a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedUnit {
    pub unit_id: UnitId,
    pub subtype: ResourceSubtype,
    /// Set when this unit stands in for an unavailable primary subtype
    pub substitute_for: Option<ResourceSubtype>,
}

/// Why a need went unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmetReason {
    /// No matching unit was free
    NotAvailable,
    /// Concurrent interference persisted after the retry
    StateConflict,
    /// The store rejected the operation for this unit
    StoreFault,
}

impl UnmetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmetReason::NotAvailable => "NOT_AVAILABLE",
            UnmetReason::StateConflict => "STATE_CONFLICT",
            UnmetReason::StoreFault => "STORE_FAULT",
        }
    }
}

/// A need that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetNeed {
    pub subtype: ResourceSubtype,
    pub reason: UnmetReason,
}

/// Per-patient record of what was and was not reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub patient_id: PatientId,
    /// 1-based position in the batch's processing order
    pub allocation_order: u32,
    pub priority_tier: PriorityTier,
    /// Reserved units, in the order they were granted
    pub reserved: Vec<ReservedUnit>,
    pub unmet: Vec<UnmetNeed>,
    pub status: AllocationStatus,
}

impl AllocationOutcome {
    /// Derive the status from what was granted.
    pub fn status_for(reserved: &[ReservedUnit], unmet: &[UnmetNeed]) -> AllocationStatus {
        if unmet.is_empty() {
            AllocationStatus::FullyAllocated
        } else if reserved.is_empty() {
            AllocationStatus::Deferred
        } else {
            AllocationStatus::PartiallyAllocated
        }
    }

    pub fn reserved_unit_ids(&self) -> Vec<&UnitId> {
        self.reserved.iter().map(|r| &r.unit_id).collect()
    }

    /// Unit reserved for a subtype, whether as primary or substitute.
    pub fn unit_for(&self, subtype: ResourceSubtype) -> Option<&UnitId> {
        self.reserved
            .iter()
            .find(|r| r.subtype == subtype)
            .map(|r| &r.unit_id)
    }

    pub fn is_unmet(&self, subtype: ResourceSubtype) -> bool {
        self.unmet.iter().any(|u| u.subtype == subtype)
    }
}

/// Result of one allocation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Unique batch ID
    pub batch_id: String,
    /// Outcomes in processing order
    pub outcomes: Vec<AllocationOutcome>,
    /// One resolution per contested subtype, in subtype order
    pub resolutions: Vec<ConflictResolution>,
    /// Store revision observed before the first reservation
    pub revision_before: u64,
    /// Store revision observed after the last reservation
    pub revision_after: u64,
    /// Completion timestamp
    pub completed_at: String,
}

/// The deterministic part of a plan, used for fingerprinting.
#[derive(Serialize)]
struct PlanDigestView<'a> {
    outcomes: &'a [AllocationOutcome],
    resolutions: &'a [ConflictResolution],
}

impl AllocationPlan {
    /// SHA-256 over outcomes and resolutions. Batch ID, revisions and
    /// timestamps are excluded so identical decisions hash identically.
    pub fn digest(&self) -> AuditResult<String> {
        fingerprint(&PlanDigestView {
            outcomes: &self.outcomes,
            resolutions: &self.resolutions,
        })
    }

    pub fn outcome(&self, patient: &PatientId) -> Option<&AllocationOutcome> {
        self.outcomes.iter().find(|o| &o.patient_id == patient)
    }

    pub fn processing_order(&self) -> Vec<&PatientId> {
        self.outcomes.iter().map(|o| &o.patient_id).collect()
    }

    /// Patients not fully allocated.
    pub fn waiting_patients(&self) -> Vec<&PatientId> {
        self.outcomes
            .iter()
            .filter(|o| o.status != AllocationStatus::FullyAllocated)
            .map(|o| &o.patient_id)
            .collect()
    }

    /// True when any need in the batch went unmet.
    pub fn resources_exhausted(&self) -> bool {
        self.outcomes.iter().any(|o| !o.unmet.is_empty())
    }

    pub fn contested(&self, subtype: ResourceSubtype) -> Option<&ConflictResolution> {
        self.resolutions
            .iter()
            .find(|r| r.conflict_type.subtype == subtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved(id: &str, subtype: ResourceSubtype) -> ReservedUnit {
        ReservedUnit {
            unit_id: id.into(),
            subtype,
            substitute_for: None,
        }
    }

    fn unmet(subtype: ResourceSubtype) -> UnmetNeed {
        UnmetNeed {
            subtype,
            reason: UnmetReason::NotAvailable,
        }
    }

    #[test]
    fn test_status_for() {
        let bed = vec![reserved("ICU-3", ResourceSubtype::IcuBed)];
        let vent = vec![unmet(ResourceSubtype::Ventilator)];

        assert_eq!(AllocationOutcome::status_for(&bed, &[]), AllocationStatus::FullyAllocated);
        assert_eq!(AllocationOutcome::status_for(&bed, &vent), AllocationStatus::PartiallyAllocated);
        assert_eq!(AllocationOutcome::status_for(&[], &vent), AllocationStatus::Deferred);
    }

    #[test]
    fn test_digest_ignores_batch_metadata() {
        let outcome = AllocationOutcome {
            patient_id: "P1".into(),
            allocation_order: 1,
            priority_tier: PriorityTier::Critical,
            reserved: vec![reserved("ICU-3", ResourceSubtype::IcuBed)],
            unmet: vec![],
            status: AllocationStatus::FullyAllocated,
        };
        let plan_a = AllocationPlan {
            batch_id: "a".into(),
            outcomes: vec![outcome.clone()],
            resolutions: vec![],
            revision_before: 1,
            revision_after: 2,
            completed_at: "2024-10-30T08:00:00Z".into(),
        };
        let mut plan_b = plan_a.clone();
        plan_b.batch_id = "b".into();
        plan_b.revision_before = 7;
        plan_b.revision_after = 8;
        plan_b.completed_at = "2024-10-30T09:00:00Z".into();

        assert_eq!(plan_a.digest().unwrap(), plan_b.digest().unwrap());

        plan_b.outcomes[0].status = AllocationStatus::PartiallyAllocated;
        assert_ne!(plan_a.digest().unwrap(), plan_b.digest().unwrap());
    }
}
