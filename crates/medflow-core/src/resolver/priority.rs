//! Composite allocation priority.
//!
//! Weights (defaults):
//! - Clinical score: 40%
//! - Survival probability: 30%
//! - Wait tolerance (1 / max wait): 20%
//! - Age vulnerability: 10%
//!
//! Every factor is min-max normalized across the contending patients before
//! weighting. When all contenders share a value the factor normalizes to 1.0
//! for everyone, so it cannot separate them.

use serde::{Deserialize, Serialize};

use crate::models::{ClinicalAssessment, Justification, PriorityFactor, PriorityTerms};
use crate::scoring::score_age;

/// Weights for the composite priority. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub clinical: f64,
    pub survival: f64,
    pub wait: f64,
    pub age: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            clinical: 0.4,
            survival: 0.3,
            wait: 0.2,
            age: 0.1,
        }
    }
}

impl PriorityWeights {
    pub fn sum(&self) -> f64 {
        self.clinical + self.survival + self.wait + self.age
    }

    /// Weight per factor, in factor order.
    pub fn by_factor(&self) -> [(PriorityFactor, f64); 4] {
        [
            (PriorityFactor::ClinicalScore, self.clinical),
            (PriorityFactor::SurvivalProbability, self.survival),
            (PriorityFactor::WaitTolerance, self.wait),
            (PriorityFactor::AgeVulnerability, self.age),
        ]
    }

    /// Weighted composite of normalized terms.
    pub fn composite(&self, terms: &PriorityTerms) -> f64 {
        self.clinical * terms.clinical
            + self.survival * terms.survival
            + self.wait * terms.wait
            + self.age * terms.age
    }
}

/// Un-normalized factor values for one patient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFactors {
    pub clinical: f64,
    pub survival: f64,
    /// Reciprocal of the maximum safe wait in minutes
    pub wait: f64,
    /// Age sub-score (0-3)
    pub age: f64,
}

impl RawFactors {
    pub fn of(assessment: &ClinicalAssessment) -> Self {
        Self {
            clinical: assessment.clinical_score as f64,
            survival: assessment.survival_probability,
            wait: 1.0 / assessment.max_wait_time_minutes.max(1) as f64,
            age: score_age(assessment.age).points as f64,
        }
    }

    pub fn value(&self, factor: PriorityFactor) -> f64 {
        match factor {
            PriorityFactor::ClinicalScore => self.clinical,
            PriorityFactor::SurvivalProbability => self.survival,
            PriorityFactor::WaitTolerance => self.wait,
            PriorityFactor::AgeVulnerability => self.age,
        }
    }
}

/// Min-max normalize into [0, 1]; a degenerate range maps to 1.0.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|v| if range > 0.0 { (v - min) / range } else { 1.0 })
        .collect()
}

/// Normalized terms for each contender, in input order.
pub fn normalized_terms(raw: &[RawFactors]) -> Vec<PriorityTerms> {
    let column = |f: fn(&RawFactors) -> f64| normalize(&raw.iter().map(f).collect::<Vec<_>>());
    let clinical = column(|r| r.clinical);
    let survival = column(|r| r.survival);
    let wait = column(|r| r.wait);
    let age = column(|r| r.age);

    (0..raw.len())
        .map(|i| PriorityTerms {
            clinical: clinical[i],
            survival: survival[i],
            wait: wait[i],
            age: age[i],
        })
        .collect()
}

/// The factor with the largest weighted contribution. Ties go to the
/// earlier factor (clinical score first).
pub fn justify(weights: &PriorityWeights, terms: &PriorityTerms, raw: &RawFactors) -> Justification {
    let term = |factor: PriorityFactor| match factor {
        PriorityFactor::ClinicalScore => terms.clinical,
        PriorityFactor::SurvivalProbability => terms.survival,
        PriorityFactor::WaitTolerance => terms.wait,
        PriorityFactor::AgeVulnerability => terms.age,
    };

    let mut dominant = (PriorityFactor::ClinicalScore, f64::NEG_INFINITY);
    for (factor, weight) in weights.by_factor() {
        let contribution = weight * term(factor);
        if contribution > dominant.1 {
            dominant = (factor, contribution);
        }
    }

    Justification {
        dominant_factor: dominant.0,
        dominant_value: raw.value(dominant.0),
        contribution: dominant.1,
    }
}
