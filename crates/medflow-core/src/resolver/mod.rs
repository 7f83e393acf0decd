//! Conflict resolver for contested resources.
//!
//! Pipeline: Raw Factors → Batch Normalization → Weighted Composite → Total Order

mod priority;

pub use priority::*;

use std::cmp::Ordering;

use tracing::info;

use crate::models::{
    ClinicalAssessment, ConflictResolution, ConflictType, RankedPatient, ResolutionStrategy,
};

/// Orders patients competing for one resource subtype.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    weights: PriorityWeights,
}

impl ConflictResolver {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    /// Rank contenders for a contested subtype.
    ///
    /// Order: composite descending, then clinical score descending, then
    /// patient id ascending. The result depends only on the contenders and
    /// the weights, never on input order.
    pub fn resolve<'a>(
        &self,
        contenders: impl IntoIterator<Item = &'a ClinicalAssessment>,
        conflict_type: ConflictType,
    ) -> ConflictResolution {
        let contenders: Vec<&ClinicalAssessment> = contenders.into_iter().collect();

        // Step 1: Raw factors and batch-normalized terms
        let raw: Vec<RawFactors> = contenders.iter().map(|a| RawFactors::of(a)).collect();
        let terms = normalized_terms(&raw);

        // Step 2: Composite and justification per contender
        let mut ranking: Vec<RankedPatient> = contenders
            .iter()
            .zip(raw.iter().zip(terms.iter()))
            .map(|(assessment, (raw, terms))| RankedPatient {
                patient_id: assessment.patient_id.clone(),
                allocation_order: 0,
                composite: self.weights.composite(terms),
                clinical_score: assessment.clinical_score,
                priority_tier: assessment.priority_tier,
                terms: *terms,
                justification: justify(&self.weights, terms, raw),
            })
            .collect();

        // Step 3: Total order
        ranking.sort_by(compare_ranked);
        for (i, ranked) in ranking.iter_mut().enumerate() {
            ranked.allocation_order = i as u32 + 1;
        }

        let strategy = if ranking.len() == 1 {
            ResolutionStrategy::SinglePatient
        } else {
            ResolutionStrategy::CompositePriority
        };

        info!(
            conflict = %conflict_type.code(),
            demand = conflict_type.demand,
            supply = conflict_type.supply,
            contenders = ranking.len(),
            first = ranking.first().map(|r| r.patient_id.as_str()).unwrap_or(""),
            "Conflict resolved"
        );

        ConflictResolution {
            conflict_type,
            ranking,
            strategy,
        }
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }
}

fn compare_ranked(a: &RankedPatient, b: &RankedPatient) -> Ordering {
    b.composite
        .total_cmp(&a.composite)
        .then_with(|| b.clinical_score.cmp(&a.clinical_score))
        .then_with(|| a.patient_id.cmp(&b.patient_id))
}
