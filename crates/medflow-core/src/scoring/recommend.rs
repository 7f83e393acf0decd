//! Department, specialist, equipment and test recommendations.

use std::collections::BTreeSet;

use crate::models::{Department, PriorityTier, ResourceSubtype, VitalSigns};

use super::symptoms::{SymptomCategory, SymptomMatch};
use super::vitals::Consciousness;

/// Resource and diagnostic needs derived from an assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendations {
    pub department: Department,
    pub specialists: BTreeSet<ResourceSubtype>,
    pub equipment: BTreeSet<ResourceSubtype>,
    pub tests: BTreeSet<String>,
}

/// Inputs the recommendation rules look at.
pub struct ClinicalPicture<'a> {
    pub tier: PriorityTier,
    pub vitals: &'a VitalSigns,
    pub matches: &'a [SymptomMatch],
    pub consciousness: Consciousness,
}

impl ClinicalPicture<'_> {
    fn has(&self, keyword: &str) -> bool {
        self.matches.iter().any(|m| m.keyword == keyword)
    }

    fn has_category(&self, category: SymptomCategory) -> bool {
        self.matches.iter().any(|m| m.category == category)
    }

    fn is_trauma(&self) -> bool {
        self.has_category(SymptomCategory::Trauma)
    }

    fn is_cardiac(&self) -> bool {
        self.has_category(SymptomCategory::Cardiac)
    }

    fn is_neuro(&self) -> bool {
        self.has_category(SymptomCategory::Neurological)
    }

    /// Observed heart rate in the critical band. Missing readings do not count.
    fn critical_heart_rate(&self) -> bool {
        self.vitals
            .heart_rate
            .is_some_and(|hr| hr.is_finite() && (hr > 130.0 || hr < 50.0))
    }

    fn critical_hypoxia(&self) -> bool {
        self.vitals
            .oxygen_saturation
            .is_some_and(|o2| o2.is_finite() && o2 > 0.0 && o2 < 88.0)
    }

    fn impaired_gcs(&self) -> bool {
        matches!(
            self.consciousness,
            Consciousness::Impaired(_) | Consciousness::Depressed(_)
        )
    }
}

pub fn recommend(picture: &ClinicalPicture<'_>) -> Recommendations {
    Recommendations {
        department: department(picture),
        specialists: specialists(picture),
        equipment: equipment(picture),
        tests: tests(picture),
    }
}

fn department(picture: &ClinicalPicture<'_>) -> Department {
    match picture.tier {
        PriorityTier::Critical => Department::Icu,
        PriorityTier::Emergency if picture.is_trauma() => Department::EdTrauma,
        PriorityTier::Emergency | PriorityTier::Urgent => Department::EdTreatment,
        PriorityTier::Stable => Department::GeneralFloor,
    }
}

fn specialists(picture: &ClinicalPicture<'_>) -> BTreeSet<ResourceSubtype> {
    let mut specialists = BTreeSet::new();

    if picture.is_cardiac() {
        specialists.insert(ResourceSubtype::Cardiologist);
    }
    if picture.is_neuro() || picture.impaired_gcs() {
        specialists.insert(ResourceSubtype::Neurologist);
    }
    let major_trauma = picture.has("head trauma") || picture.has("severe bleeding");
    let serious_fracture = picture.has("fracture") && picture.tier >= PriorityTier::Emergency;
    if major_trauma || serious_fracture {
        specialists.insert(ResourceSubtype::TraumaSurgeon);
    }

    specialists
}

fn equipment(picture: &ClinicalPicture<'_>) -> BTreeSet<ResourceSubtype> {
    let mut equipment = BTreeSet::new();

    if picture.critical_hypoxia()
        || picture.consciousness.is_depressed()
        || picture.has("unresponsive")
    {
        equipment.insert(ResourceSubtype::Ventilator);
    }
    if picture.tier >= PriorityTier::Emergency || picture.is_cardiac() {
        equipment.insert(ResourceSubtype::CardiacMonitor);
    }
    if picture.is_cardiac()
        && (picture.tier == PriorityTier::Critical || picture.critical_heart_rate())
    {
        equipment.insert(ResourceSubtype::Defibrillator);
    }

    equipment
}

fn tests(picture: &ClinicalPicture<'_>) -> BTreeSet<String> {
    let mut tests: BTreeSet<&'static str> = BTreeSet::new();

    if picture.is_cardiac() {
        tests.extend(["ecg", "troponin"]);
    }
    if picture.is_neuro() || picture.has("head trauma") || picture.impaired_gcs() {
        tests.insert("ct_head");
    }
    if picture.has("severe bleeding") {
        tests.insert("type_and_crossmatch");
    }
    if picture.has_category(SymptomCategory::Respiratory) || picture.critical_hypoxia() {
        tests.extend(["chest_xray", "arterial_blood_gas"]);
    }
    if picture.has("fracture") {
        tests.insert("x_ray");
    }
    if picture.tier >= PriorityTier::Urgent {
        tests.extend(["cbc", "basic_metabolic_panel"]);
    }

    tests.into_iter().map(str::to_string).collect()
}
