//! Contention detection and processing order.

use std::collections::BTreeMap;

use crate::models::{ClinicalAssessment, ConflictResolution, ConflictType, Need, ResourceSubtype};
use crate::store::HospitalState;

/// A subtype the batch wants more of than the snapshot has free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contention {
    pub conflict_type: ConflictType,
    /// Indices into the batch, in arrival order
    pub contenders: Vec<usize>,
}

/// Subtypes whose primary demand exceeds free supply, in subtype order.
///
/// Alternates are not counted; they are only tried once a primary is gone.
pub fn detect_contention(needs: &[Vec<Need>], state: &HospitalState) -> Vec<Contention> {
    let mut demand: BTreeMap<ResourceSubtype, Vec<usize>> = BTreeMap::new();
    for (index, patient_needs) in needs.iter().enumerate() {
        for need in patient_needs {
            demand.entry(need.subtype).or_default().push(index);
        }
    }

    demand
        .into_iter()
        .filter_map(|(subtype, contenders)| {
            let supply = state.free_supply(subtype);
            let requested = contenders.len() as u32;
            (requested > supply).then(|| Contention {
                conflict_type: ConflictType {
                    subtype,
                    demand: requested,
                    supply,
                },
                contenders,
            })
        })
        .collect()
}

/// Union processing order over the batch, as batch indices.
///
/// Contended patients come first, by their worst rank across all
/// resolutions, then clinical score descending, then patient id. Patients
/// contending for nothing follow in arrival order.
pub fn processing_order(batch: &[ClinicalAssessment], resolutions: &[ConflictResolution]) -> Vec<usize> {
    let worst_rank = |assessment: &ClinicalAssessment| {
        resolutions
            .iter()
            .filter_map(|r| r.rank_of(&assessment.patient_id))
            .max()
    };

    let mut contended: Vec<(u32, usize)> = Vec::new();
    let mut uncontended: Vec<usize> = Vec::new();
    for (index, assessment) in batch.iter().enumerate() {
        match worst_rank(assessment) {
            Some(rank) => contended.push((rank, index)),
            None => uncontended.push(index),
        }
    }

    contended.sort_by(|(rank_a, a), (rank_b, b)| {
        rank_a
            .cmp(rank_b)
            .then_with(|| batch[*b].clinical_score.cmp(&batch[*a].clinical_score))
            .then_with(|| batch[*a].patient_id.cmp(&batch[*b].patient_id))
    });

    contended
        .into_iter()
        .map(|(_, index)| index)
        .chain(uncontended)
        .collect()
}
