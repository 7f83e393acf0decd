//! Clinical scoring for incoming patients.
//!
//! Pipeline: Vitals + Age → Symptom Matching → Consciousness → Tier → Recommendations
//!
//! Scoring is pure: the same case always yields the same assessment and no
//! hospital state is read.

mod recommend;
mod symptoms;
mod vitals;

pub use recommend::{recommend, ClinicalPicture, Recommendations};
pub use symptoms::{CriticalKeyword, SymptomCategory, SymptomMatch, SymptomMatcher};
pub use vitals::{
    assess_gcs, score_age, score_heart_rate, score_oxygen, score_systolic, Consciousness,
    VitalScore,
};

use tracing::{debug, warn};

use crate::models::{
    ClinicalAssessment, PatientCase, PriorityTier, RiskFactor, ScoreBreakdown,
    MAX_CLINICAL_SCORE,
};

/// Survival estimate floor (percent).
const SURVIVAL_FLOOR: f64 = 5.0;
/// Survival estimate for a score of zero (percent).
const SURVIVAL_CEILING: f64 = 95.0;
/// Survival points lost per clinical score point.
const SURVIVAL_SLOPE: f64 = 4.0;

/// Survival likelihood absent intervention. Strictly decreasing in score
/// until it reaches the floor.
pub fn survival_probability(clinical_score: u8) -> f64 {
    (SURVIVAL_CEILING - SURVIVAL_SLOPE * clinical_score as f64).max(SURVIVAL_FLOOR)
}

/// Scores patient cases into clinical assessments.
#[derive(Default)]
pub struct ClinicalScorer {
    matcher: SymptomMatcher,
}

impl ClinicalScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom symptom matcher.
    pub fn with_matcher(matcher: SymptomMatcher) -> Self {
        Self { matcher }
    }

    /// Assess one patient.
    pub fn score(&self, patient: &PatientCase) -> ClinicalAssessment {
        let vitals = &patient.vital_signs;

        // Step 1: Age and vital-sign sub-scores
        let age = score_age(patient.age);
        let heart_rate = score_heart_rate(vitals.heart_rate);
        let blood_pressure = score_systolic(vitals.systolic_bp);
        let oxygen = score_oxygen(vitals.oxygen_saturation);

        // Step 2: Critical symptoms
        let matches = self.matcher.match_symptoms(&patient.symptoms);

        // Step 3: Consciousness adds to the symptom sub-score unless a
        // matched keyword already describes it
        let (consciousness, gcs_degraded) = assess_gcs(vitals.gcs);
        let described = match consciousness {
            Consciousness::Depressed(_) => matches.iter().any(|m| m.keyword == "unresponsive"),
            Consciousness::Impaired(_) => matches
                .iter()
                .any(|m| m.keyword == "unresponsive" || m.keyword == "altered mental"),
            Consciousness::NotAssessed | Consciousness::Alert => true,
        };

        let mut breakdown = ScoreBreakdown {
            age: age.points,
            heart_rate: heart_rate.points,
            blood_pressure: blood_pressure.points,
            oxygen: oxygen.points,
            symptoms: 0,
        };
        let symptom_points: u16 = matches.iter().map(|m| m.points as u16).sum::<u16>()
            + if described { 0 } else { consciousness.points() as u16 };
        let headroom = MAX_CLINICAL_SCORE.saturating_sub(breakdown.physiological());
        breakdown.symptoms = symptom_points.min(headroom as u16) as u8;

        // Step 4: Score and tier
        let clinical_score = breakdown.total();
        let priority_tier = PriorityTier::from_score(clinical_score);

        // Step 5: Risk factors, most severe sources first
        let mut risk_factors: Vec<RiskFactor> = [&age, &heart_rate, &blood_pressure, &oxygen]
            .into_iter()
            .filter_map(|s| s.factor.clone())
            .collect();
        risk_factors.extend(matches.iter().map(|m| RiskFactor::CriticalSymptom {
            keyword: m.keyword.to_string(),
            symptom: m.symptom.clone(),
            points: m.points,
        }));
        if !described {
            risk_factors.extend(consciousness.factor());
        }

        let degraded_inputs: Vec<_> = [&heart_rate, &blood_pressure, &oxygen]
            .into_iter()
            .filter_map(|s| s.degraded)
            .chain(gcs_degraded)
            .collect();
        if !degraded_inputs.is_empty() {
            warn!(
                patient_id = %patient.patient_id,
                inputs = ?degraded_inputs,
                "Scoring with worst-case values for missing or invalid vitals"
            );
        }

        // Step 6: Recommendations
        let recs = recommend(&ClinicalPicture {
            tier: priority_tier,
            vitals,
            matches: &matches,
            consciousness,
        });

        debug!(
            patient_id = %patient.patient_id,
            clinical_score,
            tier = %priority_tier,
            department = %recs.department,
            "Patient scored"
        );

        ClinicalAssessment {
            patient_id: patient.patient_id.clone(),
            age: patient.age,
            clinical_score,
            breakdown,
            priority_tier,
            survival_probability: survival_probability(clinical_score),
            recommended_department: recs.department,
            required_specialists: recs.specialists,
            required_equipment: recs.equipment,
            required_tests: recs.tests,
            max_wait_time_minutes: priority_tier.max_wait_minutes(),
            risk_factors,
            degraded: !degraded_inputs.is_empty(),
            degraded_inputs,
        }
    }

    /// Assess several patients, preserving input order.
    pub fn score_batch(&self, patients: &[PatientCase]) -> Vec<ClinicalAssessment> {
        patients.iter().map(|p| self.score(p)).collect()
    }

    pub fn matcher(&self) -> &SymptomMatcher {
        &self.matcher
    }
}

/// Assess one patient with the default matcher.
pub fn score(patient: &PatientCase) -> ClinicalAssessment {
    ClinicalScorer::new().score(patient)
}
