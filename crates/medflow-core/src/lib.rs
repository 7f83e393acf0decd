//! MedFlow Core Library
//!
//! Emergency department resource orchestration: triage scoring, conflict
//! resolution among patients competing for scarce resources, and
//! transactional allocation against a shared hospital state.
//!
//! # Architecture
//!
//! ```text
//! PatientCase batch
//!        │
//!        ▼
//!  Clinical Scorer ──► ClinicalAssessment (score, tier, survival, needs)
//!        │
//!        ▼
//!  Allocation Planner
//!        │  need lists ──► contention detection ──► Conflict Resolver
//!        │                                              │
//!        │◄──────────── union priority order ◄──────────┘
//!        ▼
//!  ┌───────────────────────────────┐        ┌──────────────────┐
//!  │          State Store          │◄───────│  Query Service   │
//!  │  per-unit locks + revision    │snapshot│  filters, alerts │
//!  └───────────────┬───────────────┘        └──────────────────┘
//!                  │
//!                  ▼
//!           AllocationPlan ──► Audit Trail (hash chain)
//! ```
//!
//! # Core Principle
//!
//! **No two patients ever hold the same exclusive unit.** Every reservation
//! goes through the store's per-unit exclusion; the planner only decides the
//! order in which reservations are attempted.
//!
//! # Modules
//!
//! - [`models`]: Domain types (PatientCase, ResourceUnit, AllocationPlan, etc.)
//! - [`scoring`]: Clinical scorer
//! - [`store`]: Concurrent hospital state store and snapshots
//! - [`resolver`]: Composite-priority conflict resolver
//! - [`planner`]: Batch allocation planner
//! - [`query`]: Read-only state queries and capacity alerts
//! - [`config`]: Engine configuration and inventory loading
//! - [`audit`]: Hash-chained audit trail

pub mod audit;
pub mod config;
pub mod models;
pub mod planner;
pub mod query;
pub mod resolver;
pub mod scoring;
pub mod store;

// Re-export commonly used types
pub use audit::{AuditEntry, AuditTrail};
pub use config::{EngineConfig, HospitalConfig, Inventory};
pub use models::{
    AllocationOutcome, AllocationPlan, AllocationStatus, ClinicalAssessment, ConflictResolution,
    Department, PatientCase, PatientId, PriorityTier, ResourceKind, ResourceSubtype, ResourceUnit,
    UnitId, VitalSigns,
};
pub use planner::{AbortSignal, AllocationPlanner, ReservationBackend};
pub use query::{QueryService, StateQuery, StateView};
pub use resolver::{ConflictResolver, PriorityWeights};
pub use scoring::ClinicalScorer;
pub use store::{HospitalState, StateStore};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use store::{ReleaseOutcome, ReserveCriteria};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MedFlowError {
    #[error("State error: {0}")]
    StateError(String),

    #[error("Allocation error: {0}")]
    AllocationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<store::StoreError> for MedFlowError {
    fn from(e: store::StoreError) -> Self {
        MedFlowError::StateError(e.to_string())
    }
}

impl From<planner::PlanError> for MedFlowError {
    fn from(e: planner::PlanError) -> Self {
        MedFlowError::AllocationError(e.to_string())
    }
}

impl From<config::ConfigError> for MedFlowError {
    fn from(e: config::ConfigError) -> Self {
        MedFlowError::ConfigError(e.to_string())
    }
}

impl From<audit::AuditError> for MedFlowError {
    fn from(e: audit::AuditError) -> Self {
        MedFlowError::AuditError(e.to_string())
    }
}

impl From<models::ParseSubtypeError> for MedFlowError {
    fn from(e: models::ParseSubtypeError) -> Self {
        MedFlowError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for MedFlowError {
    fn from(e: serde_json::Error) -> Self {
        MedFlowError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedFlowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedFlowError::StateError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Create an engine over the built-in emergency department inventory.
#[uniffi::export]
pub fn engine_with_default_inventory() -> Result<Arc<MedFlowEngine>, MedFlowError> {
    Ok(Arc::new(MedFlowEngine::from_config(
        &HospitalConfig::emergency_department(),
    )?))
}

/// Create an engine from a hospital configuration in TOML.
#[uniffi::export]
pub fn engine_from_config_toml(toml: String) -> Result<Arc<MedFlowEngine>, MedFlowError> {
    let config = HospitalConfig::from_toml(&toml)?;
    Ok(Arc::new(MedFlowEngine::from_config(&config)?))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct MedFlowEngine {
    store: Arc<StateStore>,
    config: EngineConfig,
    scorer: ClinicalScorer,
    audit: Mutex<AuditTrail>,
}

impl MedFlowEngine {
    pub fn from_config(config: &HospitalConfig) -> Result<Self, MedFlowError> {
        Ok(Self {
            store: Arc::new(config.build_store()?),
            config: config.engine.clone(),
            scorer: ClinicalScorer::new(),
            audit: Mutex::new(AuditTrail::new()),
        })
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Score and allocate a batch, recording it in the audit trail.
    pub fn run_batch(&self, patients: &[PatientCase]) -> Result<AllocationPlan, MedFlowError> {
        let assessments = self.scorer.score_batch(patients);
        let planner = AllocationPlanner::new(self.store.as_ref())
            .with_resolver(ConflictResolver::new(self.config.weights));
        let plan = planner.allocate(&assessments)?;

        let mut audit = self.audit.lock()?;
        audit.record(&plan)?;
        Ok(plan)
    }

    /// Run a query with the configured alert thresholds.
    pub fn run_query(&self, query: &StateQuery) -> Result<StateView, MedFlowError> {
        let service = QueryService::new(&self.store).with_thresholds(self.config.alerts);
        Ok(service.query(query)?)
    }

    /// Verify the audit chain.
    pub fn verify_audit(&self) -> Result<usize, MedFlowError> {
        let audit = self.audit.lock()?;
        audit.verify()?;
        Ok(audit.len())
    }
}

#[uniffi::export]
impl MedFlowEngine {
    // =========================================================================
    // Triage
    // =========================================================================

    /// Score patients without touching hospital state.
    pub fn triage(&self, patients: Vec<FfiPatientCase>) -> Vec<FfiAssessment> {
        patients
            .into_iter()
            .map(|p| self.scorer.score(&p.into()).into())
            .collect()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Score and allocate a batch of patients.
    pub fn allocate_batch(
        &self,
        patients: Vec<FfiPatientCase>,
    ) -> Result<FfiAllocationPlan, MedFlowError> {
        let cases: Vec<PatientCase> = patients.into_iter().map(Into::into).collect();
        let plan = self.run_batch(&cases)?;
        let digest = plan.digest()?;
        Ok(FfiAllocationPlan::new(plan, digest))
    }

    // =========================================================================
    // State Operations
    // =========================================================================

    /// Query hospital state.
    pub fn query(&self, query: FfiStateQuery) -> Result<FfiStateView, MedFlowError> {
        let query = query.parse()?;
        let view = self.run_query(&query)?;
        let aggregate_json = view
            .aggregate
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok(FfiStateView {
            revision: view.revision,
            taken_at: view.taken_at,
            units: view.units.into_iter().map(Into::into).collect(),
            aggregate_json,
        })
    }

    /// Reserve the least-loaded free unit of a subtype. None when nothing is free.
    pub fn reserve(
        &self,
        subtype: String,
        department: Option<String>,
        patient_id: String,
    ) -> Result<Option<FfiResourceUnit>, MedFlowError> {
        let mut criteria = ReserveCriteria::subtype(subtype.parse()?);
        if let Some(department) = department {
            criteria = criteria.in_department(department.parse()?);
        }
        let outcome = self.store.reserve(&criteria, &PatientId::new(patient_id))?;
        Ok(outcome.unit().cloned().map(Into::into))
    }

    /// Release a claim. Returns false when there was nothing to release.
    pub fn release(
        &self,
        unit_id: String,
        patient_id: Option<String>,
    ) -> Result<bool, MedFlowError> {
        let patient = patient_id.map(PatientId::new);
        let outcome = self.store.release(&UnitId::new(unit_id), patient.as_ref())?;
        Ok(matches!(outcome, ReleaseOutcome::Released(_)))
    }

    /// Turn a patient's reservation into occupancy.
    pub fn commit_occupancy(
        &self,
        unit_id: String,
        patient_id: String,
    ) -> Result<FfiResourceUnit, MedFlowError> {
        let unit = self
            .store
            .commit_occupancy(&UnitId::new(unit_id), &PatientId::new(patient_id))?;
        Ok(unit.into())
    }

    /// Current store revision.
    pub fn snapshot_revision(&self) -> u64 {
        self.store.revision()
    }

    /// Hash of the latest audit entry.
    pub fn audit_head(&self) -> Result<Option<String>, MedFlowError> {
        let audit = self.audit.lock()?;
        Ok(audit.head().map(str::to_string))
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientCase {
    pub patient_id: String,
    pub name: Option<String>,
    pub age: u32,
    pub heart_rate: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub gcs: Option<u8>,
    pub symptoms: Vec<String>,
    pub medical_history: Vec<String>,
    pub clinical_note: Option<String>,
}

impl From<FfiPatientCase> for PatientCase {
    fn from(p: FfiPatientCase) -> Self {
        PatientCase {
            patient_id: PatientId::new(p.patient_id),
            name: p.name,
            age: p.age,
            vital_signs: VitalSigns {
                heart_rate: p.heart_rate,
                systolic_bp: p.systolic_bp,
                oxygen_saturation: p.oxygen_saturation,
                gcs: p.gcs,
            },
            symptoms: p.symptoms,
            medical_history: p.medical_history,
            clinical_note: p.clinical_note,
        }
    }
}

/// FFI-safe clinical assessment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAssessment {
    pub patient_id: String,
    pub clinical_score: u8,
    pub priority_tier: String,
    pub survival_probability: f64,
    pub recommended_department: String,
    pub required_specialists: Vec<String>,
    pub required_equipment: Vec<String>,
    pub required_tests: Vec<String>,
    pub max_wait_time_minutes: u32,
    pub risk_factors: Vec<String>,
    pub degraded: bool,
    pub degraded_inputs: Vec<String>,
}

impl From<ClinicalAssessment> for FfiAssessment {
    fn from(a: ClinicalAssessment) -> Self {
        Self {
            patient_id: a.patient_id.to_string(),
            clinical_score: a.clinical_score,
            priority_tier: a.priority_tier.as_str().to_string(),
            survival_probability: a.survival_probability,
            recommended_department: a.recommended_department.as_str().to_string(),
            required_specialists: a.required_specialists.iter().map(|s| s.to_string()).collect(),
            required_equipment: a.required_equipment.iter().map(|s| s.to_string()).collect(),
            required_tests: a.required_tests.into_iter().collect(),
            max_wait_time_minutes: a.max_wait_time_minutes,
            risk_factors: a.risk_factors.iter().map(|f| f.code().to_string()).collect(),
            degraded: a.degraded,
            degraded_inputs: a.degraded_inputs.iter().map(|v| v.as_str().to_string()).collect(),
        }
    }
}

/// FFI-safe allocation plan.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocationPlan {
    pub batch_id: String,
    pub outcomes: Vec<FfiAllocationOutcome>,
    pub resolutions: Vec<FfiConflictResolution>,
    pub revision_before: u64,
    pub revision_after: u64,
    pub completed_at: String,
    pub digest: String,
}

impl FfiAllocationPlan {
    fn new(plan: AllocationPlan, digest: String) -> Self {
        Self {
            batch_id: plan.batch_id,
            outcomes: plan.outcomes.into_iter().map(Into::into).collect(),
            resolutions: plan.resolutions.into_iter().map(Into::into).collect(),
            revision_before: plan.revision_before,
            revision_after: plan.revision_after,
            completed_at: plan.completed_at,
            digest,
        }
    }
}

/// FFI-safe per-patient outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocationOutcome {
    pub patient_id: String,
    pub allocation_order: u32,
    pub priority_tier: String,
    pub status: String,
    pub reserved: Vec<FfiReservedUnit>,
    pub unmet: Vec<FfiUnmetNeed>,
}

impl From<AllocationOutcome> for FfiAllocationOutcome {
    fn from(o: AllocationOutcome) -> Self {
        Self {
            patient_id: o.patient_id.to_string(),
            allocation_order: o.allocation_order,
            priority_tier: o.priority_tier.as_str().to_string(),
            status: o.status.as_str().to_string(),
            reserved: o
                .reserved
                .into_iter()
                .map(|r| FfiReservedUnit {
                    unit_id: r.unit_id.to_string(),
                    subtype: r.subtype.to_string(),
                    substitute_for: r.substitute_for.map(|s| s.to_string()),
                })
                .collect(),
            unmet: o
                .unmet
                .into_iter()
                .map(|u| FfiUnmetNeed {
                    subtype: u.subtype.to_string(),
                    reason: u.reason.as_str().to_string(),
                })
                .collect(),
        }
    }
}

/// FFI-safe reserved unit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReservedUnit {
    pub unit_id: String,
    pub subtype: String,
    pub substitute_for: Option<String>,
}

/// FFI-safe unmet need.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUnmetNeed {
    pub subtype: String,
    pub reason: String,
}

/// FFI-safe conflict resolution.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConflictResolution {
    pub conflict_type: String,
    pub demand: u32,
    pub supply: u32,
    pub strategy: String,
    pub ranking: Vec<FfiRankedPatient>,
}

impl From<ConflictResolution> for FfiConflictResolution {
    fn from(r: ConflictResolution) -> Self {
        Self {
            conflict_type: r.conflict_type.code(),
            demand: r.conflict_type.demand,
            supply: r.conflict_type.supply,
            strategy: r.strategy.as_str().to_string(),
            ranking: r
                .ranking
                .into_iter()
                .map(|p| FfiRankedPatient {
                    patient_id: p.patient_id.to_string(),
                    allocation_order: p.allocation_order,
                    composite: p.composite,
                    clinical_score: p.clinical_score,
                    dominant_factor: p.justification.dominant_factor.as_str().to_string(),
                    dominant_value: p.justification.dominant_value,
                })
                .collect(),
        }
    }
}

/// FFI-safe ranked patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRankedPatient {
    pub patient_id: String,
    pub allocation_order: u32,
    pub composite: f64,
    pub clinical_score: u8,
    pub dominant_factor: String,
    pub dominant_value: f64,
}

/// FFI-safe resource unit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResourceUnit {
    pub unit_id: String,
    pub subtype: String,
    pub kind: String,
    pub department: Option<String>,
    pub name: Option<String>,
    pub capacity: u32,
    pub workload: u32,
    pub status: String,
    pub version: u64,
}

impl From<ResourceUnit> for FfiResourceUnit {
    fn from(unit: ResourceUnit) -> Self {
        Self {
            kind: unit.kind().to_string(),
            workload: unit.workload(),
            status: unit.status().as_str().to_string(),
            unit_id: unit.id.to_string(),
            subtype: unit.subtype.to_string(),
            department: unit.department.map(|d| d.to_string()),
            name: unit.name,
            capacity: unit.capacity,
            version: unit.version,
        }
    }
}

/// FFI-safe state query. Unset fields match everything.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiStateQuery {
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub department: Option<String>,
    pub aggregate: Option<String>,
}

impl FfiStateQuery {
    fn parse(self) -> Result<StateQuery, MedFlowError> {
        Ok(StateQuery {
            kind: self.kind.map(|k| k.parse()).transpose()?,
            subtype: self.subtype.map(|s| s.parse()).transpose()?,
            department: self.department.map(|d| d.parse()).transpose()?,
            aggregate: self.aggregate.map(|a| a.parse()).transpose()?,
        })
    }
}

/// FFI-safe state view. The aggregate, when requested, is JSON.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStateView {
    pub revision: u64,
    pub taken_at: String,
    pub units: Vec<FfiResourceUnit>,
    pub aggregate_json: Option<String>,
}
