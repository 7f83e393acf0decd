//! Per-patient resource need lists.

use crate::models::{ClinicalAssessment, Need, ResourceSubtype};

/// Staff every admitted patient needs.
const BASELINE_STAFF: [ResourceSubtype; 2] = [ResourceSubtype::EdPhysician, ResourceSubtype::EdNurse];

/// Needs for one patient, most urgent first.
///
/// The bed need carries its alternates; staff, specialists and equipment
/// have none.
pub fn needs_for(assessment: &ClinicalAssessment) -> Vec<Need> {
    let bed = assessment.recommended_department.bed_subtype();

    let mut needs = vec![Need::with_alternates(bed, bed.bed_alternates())];
    needs.extend(BASELINE_STAFF.iter().copied().map(Need::new));
    needs.extend(assessment.required_specialists.iter().copied().map(Need::new));
    needs.extend(assessment.required_equipment.iter().copied().map(Need::new));

    needs.sort_by_key(|n| n.subtype.clinical_urgency());
    needs.dedup_by_key(|n| n.subtype);
    needs
}
