//! Conflict resolution models.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::assessment::PriorityTier;
use super::patient::PatientId;
use super::resource::ResourceSubtype;

/// Factors combined into the composite allocation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFactor {
    ClinicalScore,
    SurvivalProbability,
    WaitTolerance,
    AgeVulnerability,
}

impl PriorityFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityFactor::ClinicalScore => "clinical_score",
            PriorityFactor::SurvivalProbability => "survival_probability",
            PriorityFactor::WaitTolerance => "wait_tolerance",
            PriorityFactor::AgeVulnerability => "age_vulnerability",
        }
    }
}

/// Batch-normalized priority terms, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityTerms {
    pub clinical: f64,
    pub survival: f64,
    pub wait: f64,
    pub age: f64,
}

/// Why a patient landed where it did in the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    /// Factor with the largest weighted contribution
    pub dominant_factor: PriorityFactor,
    /// Raw (un-normalized) value of that factor for this patient
    pub dominant_value: f64,
    /// Weighted contribution of that factor to the composite
    pub contribution: f64,
}

/// One entry of a resolved allocation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPatient {
    pub patient_id: PatientId,
    /// 1 = first access to the contested resource
    pub allocation_order: u32,
    /// Weighted composite priority
    pub composite: f64,
    pub clinical_score: u8,
    pub priority_tier: PriorityTier,
    pub terms: PriorityTerms,
    pub justification: Justification,
}

/// Contested resource and the size of the shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictType {
    pub subtype: ResourceSubtype,
    /// Claims requested by the batch
    pub demand: u32,
    /// Free supply estimated when the batch started
    pub supply: u32,
}

impl ConflictType {
    /// Reason code of the form `<resource_subtype>_shortage`.
    pub fn code(&self) -> String {
        format!("{}_shortage", self.subtype.as_str())
    }

    pub fn shortage(&self) -> u32 {
        self.demand.saturating_sub(self.supply)
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} requested, {} free)", self.code(), self.demand, self.supply)
    }
}

/// How an order was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Ranked by the weighted composite priority
    CompositePriority,
    /// Only one contender; nothing to rank
    SinglePatient,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::CompositePriority => "composite_priority",
            ResolutionStrategy::SinglePatient => "single_patient",
        }
    }
}

/// Total order over patients contending for one resource subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_type: ConflictType,
    pub ranking: Vec<RankedPatient>,
    pub strategy: ResolutionStrategy,
}

impl ConflictResolution {
    /// Patients in allocation order.
    pub fn order(&self) -> impl Iterator<Item = &PatientId> {
        self.ranking.iter().map(|r| &r.patient_id)
    }

    /// 1-based rank of a patient, if it contended.
    pub fn rank_of(&self, patient: &PatientId) -> Option<u32> {
        self.ranking
            .iter()
            .find(|r| &r.patient_id == patient)
            .map(|r| r.allocation_order)
    }
}
