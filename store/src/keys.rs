//! Key layout of the engine's keyed maps.
//!
//! Integer components are big-endian so ascending key order matches numeric
//! order under prefix scans.

use greenproof_types::Identity;

pub const PROOF: &[u8] = b"proof/";
pub const ATTESTATION: &[u8] = b"attn/";
pub const ATTESTATION_INDEX: &[u8] = b"attn_index/";
pub const VERIFIER: &[u8] = b"verifier/";
pub const CLAIM: &[u8] = b"claim/";
pub const ELIGIBILITY: &[u8] = b"elig/";
pub const SUBMISSION_COUNT: &[u8] = b"subcount/";
pub const BLOCKED: &[u8] = b"blocked/";
pub const HISTORY: &[u8] = b"history/";
pub const META: &[u8] = b"meta/";

/// Next proof id register.
pub const META_NEXT_PROOF_ID: &str = "next_proof_id";
/// Verification registers snapshot.
pub const META_VERIFICATION_PARAMS: &str = "verification_params";
/// Reward cycle state (treasury, cycle, multipliers).
pub const META_REWARD_CYCLE: &str = "reward_cycle";

fn compose(prefix: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let len = prefix.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.extend_from_slice(prefix);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(b'/');
        }
        key.extend_from_slice(part);
    }
    key
}

pub fn proof(id: u64) -> Vec<u8> {
    compose(PROOF, &[&id.to_be_bytes()])
}

pub fn attestation(proof_id: u64, verifier: &Identity) -> Vec<u8> {
    compose(ATTESTATION, &[&proof_id.to_be_bytes(), verifier.as_bytes()])
}

pub fn attestation_index(proof_id: u64) -> Vec<u8> {
    compose(ATTESTATION_INDEX, &[&proof_id.to_be_bytes()])
}

pub fn verifier(identity: &Identity) -> Vec<u8> {
    compose(VERIFIER, &[identity.as_bytes()])
}

pub fn claim(eligibility_id: u64, claimant: &Identity) -> Vec<u8> {
    compose(CLAIM, &[&eligibility_id.to_be_bytes(), claimant.as_bytes()])
}

pub fn eligibility(id: u64) -> Vec<u8> {
    compose(ELIGIBILITY, &[&id.to_be_bytes()])
}

pub fn submission_count(identity: &Identity) -> Vec<u8> {
    compose(SUBMISSION_COUNT, &[identity.as_bytes()])
}

pub fn blocked(identity: &Identity) -> Vec<u8> {
    compose(BLOCKED, &[identity.as_bytes()])
}

pub fn history(proof_id: u64, seq: u32) -> Vec<u8> {
    compose(HISTORY, &[&proof_id.to_be_bytes(), &seq.to_be_bytes()])
}

pub fn history_prefix(proof_id: u64) -> Vec<u8> {
    let mut key = compose(HISTORY, &[&proof_id.to_be_bytes()]);
    key.push(b'/');
    key
}

pub fn meta(name: &str) -> Vec<u8> {
    compose(META, &[name.as_bytes()])
}
