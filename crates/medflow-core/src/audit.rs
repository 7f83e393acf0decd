//! Tamper-evident audit trail for allocation batches.
//!
//! Every completed batch is appended as an entry whose hash covers the
//! previous entry's hash, so rewriting any past decision breaks the chain.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::AllocationPlan;

/// Audit errors.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audit chain broken at entry {index}")]
    BrokenChain { index: usize },
}

pub type AuditResult<T> = Result<T, AuditError>;

/// SHA-256 of raw bytes, hex-encoded.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fingerprint a value through its canonical JSON form.
///
/// Struct fields serialize in declaration order and sets/maps are
/// ordered collections, so equal values always produce equal bytes.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> AuditResult<String> {
    let payload = serde_json::to_vec(value)?;
    Ok(hash_data(&payload))
}

/// One recorded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail (0-based)
    pub index: usize,
    pub batch_id: String,
    pub revision_before: u64,
    pub revision_after: u64,
    /// Digest of the plan's decisions
    pub plan_digest: String,
    pub recorded_at: String,
    /// Hash of the preceding entry, None for the first
    pub previous_hash: Option<String>,
    /// Hash over this entry's fields and `previous_hash`
    pub entry_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        previous_hash: Option<&str>,
        batch_id: &str,
        revision_before: u64,
        revision_after: u64,
        plan_digest: &str,
        recorded_at: &str,
    ) -> String {
        let material = format!(
            "{}|{}|{}|{}|{}|{}",
            previous_hash.unwrap_or(""),
            batch_id,
            revision_before,
            revision_after,
            plan_digest,
            recorded_at
        );
        hash_data(material.as_bytes())
    }

    fn recompute(&self) -> String {
        Self::compute_hash(
            self.previous_hash.as_deref(),
            &self.batch_id,
            self.revision_before,
            self.revision_after,
            &self.plan_digest,
            &self.recorded_at,
        )
    }
}

/// Append-only hash chain of allocation batches.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a trail from previously exported entries. Call `verify`
    /// before trusting it.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    /// Append a completed plan.
    pub fn record(&mut self, plan: &AllocationPlan) -> AuditResult<&AuditEntry> {
        let plan_digest = plan.digest()?;
        let previous_hash = self.head().map(str::to_string);
        let recorded_at = chrono::Utc::now().to_rfc3339();

        let entry_hash = AuditEntry::compute_hash(
            previous_hash.as_deref(),
            &plan.batch_id,
            plan.revision_before,
            plan.revision_after,
            &plan_digest,
            &recorded_at,
        );

        self.entries.push(AuditEntry {
            index: self.entries.len(),
            batch_id: plan.batch_id.clone(),
            revision_before: plan.revision_before,
            revision_after: plan.revision_after,
            plan_digest,
            recorded_at,
            previous_hash,
            entry_hash,
        });

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Hash of the latest entry.
    pub fn head(&self) -> Option<&str> {
        self.entries.last().map(|e| e.entry_hash.as_str())
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute every link. Fails at the first entry whose hash or
    /// back-reference does not match.
    pub fn verify(&self) -> AuditResult<()> {
        let mut previous: Option<&str> = None;

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.index != index
                || entry.previous_hash.as_deref() != previous
                || entry.recompute() != entry.entry_hash
            {
                return Err(AuditError::BrokenChain { index });
            }
            previous = Some(&entry.entry_hash);
        }

        Ok(())
    }
}
