//! Clinical assessment models produced by the scorer.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::patient::PatientId;
use super::resource::{ParseSubtypeError, ResourceSubtype};

/// Upper bound of the clinical score.
pub const MAX_CLINICAL_SCORE: u8 = 20;

/// Discrete urgency classification.
///
/// Ordered by urgency: `Stable < Urgent < Emergency < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityTier {
    Stable,
    Urgent,
    Emergency,
    Critical,
}

impl PriorityTier {
    /// Tier for a clinical score: >=15 critical, 11-14 emergency, 6-10 urgent, <6 stable.
    pub fn from_score(score: u8) -> Self {
        match score {
            15..=u8::MAX => PriorityTier::Critical,
            11..=14 => PriorityTier::Emergency,
            6..=10 => PriorityTier::Urgent,
            _ => PriorityTier::Stable,
        }
    }

    /// Longest safe wait before care starts.
    pub fn max_wait_minutes(&self) -> u32 {
        match self {
            PriorityTier::Critical => 10,
            PriorityTier::Emergency => 30,
            PriorityTier::Urgent => 90,
            PriorityTier::Stable => 240,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Critical => "CRITICAL",
            PriorityTier::Emergency => "EMERGENCY",
            PriorityTier::Urgent => "URGENT",
            PriorityTier::Stable => "STABLE",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hospital department a patient is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Icu,
    EdTrauma,
    EdTreatment,
    GeneralFloor,
}

impl Department {
    /// Bed subtype that admits a patient to this department.
    pub fn bed_subtype(&self) -> ResourceSubtype {
        match self {
            Department::Icu => ResourceSubtype::IcuBed,
            Department::EdTrauma => ResourceSubtype::TraumaBay,
            Department::EdTreatment => ResourceSubtype::TreatmentRoom,
            Department::GeneralFloor => ResourceSubtype::GeneralBed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Icu => "icu",
            Department::EdTrauma => "ed_trauma",
            Department::EdTreatment => "ed_treatment",
            Department::GeneralFloor => "general_floor",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = ParseSubtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "icu" => Ok(Department::Icu),
            "ed_trauma" | "trauma" => Ok(Department::EdTrauma),
            "ed_treatment" | "treatment" | "ed" => Ok(Department::EdTreatment),
            "general_floor" | "general" => Ok(Department::GeneralFloor),
            _ => Err(ParseSubtypeError {
                input: s.to_string(),
                suggestion: None,
            }),
        }
    }
}

/// Per-factor contributions to the clinical score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Age adjustment (0-3)
    pub age: u8,
    /// Heart-rate deviation (0-3)
    pub heart_rate: u8,
    /// Systolic blood pressure deviation (0-4)
    pub blood_pressure: u8,
    /// Oxygen saturation deficit (0-5)
    pub oxygen: u8,
    /// Critical symptom severity (bounded so the total stays within 20)
    pub symptoms: u8,
}

impl ScoreBreakdown {
    /// Sum of all sub-scores, clamped to [0, 20].
    pub fn total(&self) -> u8 {
        let sum = self.age as u16
            + self.heart_rate as u16
            + self.blood_pressure as u16
            + self.oxygen as u16
            + self.symptoms as u16;
        sum.min(MAX_CLINICAL_SCORE as u16) as u8
    }

    /// Sum of the vital-sign and age sub-scores.
    pub fn physiological(&self) -> u8 {
        self.age + self.heart_rate + self.blood_pressure + self.oxygen
    }
}

/// Vital sign identifiers, used to flag degraded inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalSign {
    HeartRate,
    SystolicBp,
    OxygenSaturation,
    Gcs,
}

impl VitalSign {
    pub fn as_str(&self) -> &'static str {
        match self {
            VitalSign::HeartRate => "heart_rate",
            VitalSign::SystolicBp => "systolic_bp",
            VitalSign::OxygenSaturation => "oxygen_saturation",
            VitalSign::Gcs => "gcs",
        }
    }
}

/// Structured reason a patient scored higher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RiskFactor {
    AdvancedAge { age: u32 },
    Elderly { age: u32 },
    Infant { age: u32 },
    CriticalHeartRate { bpm: f64 },
    AbnormalHeartRate { bpm: f64 },
    Tachycardia { bpm: f64 },
    Hypotension { mmhg: f64 },
    SevereHypertension { mmhg: f64 },
    Hypertension { mmhg: f64 },
    CriticalHypoxia { percent: f64 },
    Hypoxia { percent: f64 },
    LowOxygen { percent: f64 },
    CriticalSymptom { keyword: String, symptom: String, points: u8 },
    DepressedConsciousness { gcs: u8 },
    ImpairedConsciousness { gcs: u8 },
    UnreliableVital { vital: VitalSign },
}

impl RiskFactor {
    /// Reason code, matching the serialized `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            RiskFactor::AdvancedAge { .. } => "advanced_age",
            RiskFactor::Elderly { .. } => "elderly",
            RiskFactor::Infant { .. } => "infant",
            RiskFactor::CriticalHeartRate { .. } => "critical_heart_rate",
            RiskFactor::AbnormalHeartRate { .. } => "abnormal_heart_rate",
            RiskFactor::Tachycardia { .. } => "tachycardia",
            RiskFactor::Hypotension { .. } => "hypotension",
            RiskFactor::SevereHypertension { .. } => "severe_hypertension",
            RiskFactor::Hypertension { .. } => "hypertension",
            RiskFactor::CriticalHypoxia { .. } => "critical_hypoxia",
            RiskFactor::Hypoxia { .. } => "hypoxia",
            RiskFactor::LowOxygen { .. } => "low_oxygen",
            RiskFactor::CriticalSymptom { .. } => "critical_symptom",
            RiskFactor::DepressedConsciousness { .. } => "depressed_consciousness",
            RiskFactor::ImpairedConsciousness { .. } => "impaired_consciousness",
            RiskFactor::UnreliableVital { .. } => "unreliable_vital",
        }
    }
}

/// Triage result for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalAssessment {
    /// Patient this assessment belongs to
    pub patient_id: PatientId,
    /// Age in years (feeds the age factor during conflict resolution)
    pub age: u32,
    /// Bounded severity score (0-20)
    pub clinical_score: u8,
    /// Sub-score breakdown
    pub breakdown: ScoreBreakdown,
    /// Urgency tier derived from the score
    pub priority_tier: PriorityTier,
    /// Relative survival likelihood (0.0-100.0) absent intervention
    pub survival_probability: f64,
    /// Department the patient should be admitted to
    pub recommended_department: Department,
    /// Consulting specialists required
    pub required_specialists: BTreeSet<ResourceSubtype>,
    /// Equipment required
    pub required_equipment: BTreeSet<ResourceSubtype>,
    /// Diagnostic tests to order
    pub required_tests: BTreeSet<String>,
    /// Longest safe wait in minutes
    pub max_wait_time_minutes: u32,
    /// Factors that raised the score
    pub risk_factors: Vec<RiskFactor>,
    /// True when vitals were missing or out of range and a conservative estimate was used
    pub degraded: bool,
    /// Which vitals were substituted
    pub degraded_inputs: Vec<VitalSign>,
}

impl ClinicalAssessment {
    pub fn is_critical(&self) -> bool {
        self.priority_tier == PriorityTier::Critical
    }
}
