//! Golden tests for the clinical scorer.
//!
//! These tests pin scores, tiers and routing for known presentations.

use medflow_core::models::{Department, PatientCase, PriorityTier, ResourceSubtype, VitalSigns};
use medflow_core::scoring::ClinicalScorer;

/// Test case from golden file.
struct GoldenCase {
    id: &'static str,
    age: u32,
    vitals: VitalSigns,
    symptoms: &'static [&'static str],
    expected_score: u8,
    expected_tier: PriorityTier,
    expected_department: Department,
    expected_specialists: &'static [ResourceSubtype],
    expected_degraded: bool,
}

fn get_golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "healthy-adult",
            age: 30,
            vitals: VitalSigns::new(80.0, 120.0, 98.0),
            symptoms: &[],
            expected_score: 0,
            expected_tier: PriorityTier::Stable,
            expected_department: Department::GeneralFloor,
            expected_specialists: &[],
            expected_degraded: false,
        },
        GoldenCase {
            id: "elderly-chest-pain",
            age: 78,
            vitals: VitalSigns::new(105.0, 150.0, 94.0),
            symptoms: &["chest pain"],
            expected_score: 9,
            expected_tier: PriorityTier::Urgent,
            expected_department: Department::EdTreatment,
            expected_specialists: &[ResourceSubtype::Cardiologist],
            expected_degraded: false,
        },
        GoldenCase {
            id: "cardiac-arrest-capped",
            age: 70,
            vitals: VitalSigns::new(140.0, 85.0, 86.0),
            symptoms: &["cardiac arrest"],
            expected_score: 18,
            expected_tier: PriorityTier::Critical,
            expected_department: Department::Icu,
            expected_specialists: &[ResourceSubtype::Cardiologist],
            expected_degraded: false,
        },
        GoldenCase {
            id: "stroke-impaired-gcs",
            age: 60,
            vitals: VitalSigns::new(95.0, 190.0, 96.0).with_gcs(10),
            symptoms: &["stroke"],
            expected_score: 8,
            expected_tier: PriorityTier::Urgent,
            expected_department: Department::EdTreatment,
            expected_specialists: &[ResourceSubtype::Neurologist],
            expected_degraded: false,
        },
        GoldenCase {
            id: "no-vitals-recorded",
            age: 40,
            vitals: VitalSigns::default(),
            symptoms: &[],
            expected_score: 12,
            expected_tier: PriorityTier::Emergency,
            expected_department: Department::EdTreatment,
            expected_specialists: &[],
            expected_degraded: true,
        },
        GoldenCase {
            id: "penetrating-trauma",
            age: 25,
            vitals: VitalSigns::new(120.0, 88.0, 93.0),
            symptoms: &["head trauma", "severe bleeding"],
            expected_score: 13,
            expected_tier: PriorityTier::Emergency,
            expected_department: Department::EdTrauma,
            expected_specialists: &[ResourceSubtype::TraumaSurgeon],
            expected_degraded: false,
        },
        GoldenCase {
            id: "infant-fever",
            age: 0,
            vitals: VitalSigns::new(90.0, 100.0, 98.0),
            symptoms: &["fever"],
            expected_score: 2,
            expected_tier: PriorityTier::Stable,
            expected_department: Department::GeneralFloor,
            expected_specialists: &[],
            expected_degraded: false,
        },
    ]
}

#[test]
fn test_golden_cases() {
    let scorer = ClinicalScorer::new();

    for case in get_golden_cases() {
        let patient = PatientCase::new(case.id, case.age)
            .with_vitals(case.vitals.clone())
            .with_symptoms(case.symptoms.iter().copied());

        let assessment = scorer.score(&patient);

        assert_eq!(
            assessment.clinical_score, case.expected_score,
            "Case {}: score mismatch", case.id
        );
        assert_eq!(
            assessment.priority_tier, case.expected_tier,
            "Case {}: tier mismatch", case.id
        );
        assert_eq!(
            assessment.recommended_department, case.expected_department,
            "Case {}: department mismatch", case.id
        );
        assert_eq!(
            assessment.required_specialists.iter().copied().collect::<Vec<_>>(),
            case.expected_specialists,
            "Case {}: specialist mismatch", case.id
        );
        assert_eq!(
            assessment.degraded, case.expected_degraded,
            "Case {}: degraded flag mismatch", case.id
        );
        assert_eq!(
            assessment.max_wait_time_minutes,
            case.expected_tier.max_wait_minutes(),
            "Case {}: wait mismatch", case.id
        );
    }
}

#[test]
fn test_scoring_is_deterministic() {
    let scorer = ClinicalScorer::new();

    for case in get_golden_cases() {
        let patient = PatientCase::new(case.id, case.age)
            .with_vitals(case.vitals)
            .with_symptoms(case.symptoms.iter().copied());

        assert_eq!(scorer.score(&patient), scorer.score(&patient), "Case {}", case.id);
    }
}

#[test]
fn test_survival_falls_as_score_rises() {
    let scorer = ClinicalScorer::new();
    let mut assessments: Vec<_> = get_golden_cases()
        .into_iter()
        .map(|case| {
            scorer.score(
                &PatientCase::new(case.id, case.age)
                    .with_vitals(case.vitals)
                    .with_symptoms(case.symptoms.iter().copied()),
            )
        })
        .collect();
    assessments.sort_by_key(|a| a.clinical_score);

    for pair in assessments.windows(2) {
        if pair[0].clinical_score < pair[1].clinical_score {
            assert!(pair[0].survival_probability > pair[1].survival_probability);
        }
    }
}
