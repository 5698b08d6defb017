//! Quorum Engine — pure evaluation over a proof's attestations.
//!
//! Nothing here is cached: every call recomputes the tally from the full set
//! of attestations, so the result cannot drift from the stored records.

use crate::attestation::{Attestation, AttestationStore};
use greenproof_store::{KvStore, WriteBatch};
use greenproof_types::EngineError;

/// Aggregate of one proof's attestations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub approvals: u32,
    pub rejections: u32,
    /// Sum of confidence over approving attestations only.
    pub approval_confidence_sum: u64,
}

pub struct QuorumEngine;

impl QuorumEngine {
    pub fn tally(&self, attestations: &[Attestation]) -> Tally {
        attestations.iter().fold(Tally::default(), |mut t, a| {
            if a.approved {
                t.approvals += 1;
                t.approval_confidence_sum += u64::from(a.confidence);
            } else {
                t.rejections += 1;
            }
            t
        })
    }

    /// Approvals alone decide quorum; rejections never count for or against it.
    pub fn has_quorum(&self, tally: &Tally, threshold: u32) -> bool {
        tally.approvals >= threshold
    }

    /// Mean confidence of approvals, truncated toward zero; 0 with no approvals.
    pub fn score(&self, tally: &Tally) -> u8 {
        if tally.approvals == 0 {
            return 0;
        }
        let mean = tally.approval_confidence_sum / u64::from(tally.approvals);
        debug_assert!(mean <= 100, "score {mean} out of range");
        mean.min(100) as u8
    }

    /// Load and tally the attestations of `proof_id`.
    pub fn evaluate<S: KvStore + ?Sized>(
        &self,
        store: &S,
        batch: &WriteBatch,
        proof_id: u64,
    ) -> Result<Tally, EngineError> {
        let attestations = AttestationStore.for_proof(store, batch, proof_id)?;
        Ok(self.tally(&attestations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenproof_types::{BlockHeight, Identity};

    fn a(verifier: &str, approved: bool, confidence: u8) -> Attestation {
        Attestation {
            proof_id: 1,
            verifier: Identity::new(verifier),
            approved,
            confidence,
            timestamp: BlockHeight::new(0),
        }
    }

    #[test]
    fn score_truncates_instead_of_rounding() {
        let t = QuorumEngine.tally(&[a("v1", true, 90), a("v2", true, 80), a("v3", true, 100)]);
        assert_eq!(QuorumEngine.score(&t), 90);

        // 100 + 99 + 99 = 298 / 3 = 99.33 -> 99
        let t = QuorumEngine.tally(&[a("v1", true, 100), a("v2", true, 99), a("v3", true, 99)]);
        assert_eq!(QuorumEngine.score(&t), 99);

        // 1 + 2 = 3 / 2 = 1.5 -> 1
        let t = QuorumEngine.tally(&[a("v1", true, 1), a("v2", true, 2)]);
        assert_eq!(QuorumEngine.score(&t), 1);
    }

    #[test]
    fn rejections_do_not_affect_quorum_or_score() {
        let t = QuorumEngine.tally(&[
            a("v1", true, 60),
            a("v2", false, 100),
            a("v3", false, 100),
            a("v4", true, 70),
        ]);
        assert_eq!(t.approvals, 2);
        assert_eq!(t.rejections, 2);
        assert!(!QuorumEngine.has_quorum(&t, 3));
        assert!(QuorumEngine.has_quorum(&t, 2));
        assert_eq!(QuorumEngine.score(&t), 65);
    }

    #[test]
    fn no_approvals_scores_zero() {
        let t = QuorumEngine.tally(&[a("v1", false, 100)]);
        assert_eq!(QuorumEngine.score(&t), 0);
        assert_eq!(QuorumEngine.score(&Tally::default()), 0);
    }
}
