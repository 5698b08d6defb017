//! JSON command scripts replayed against an in-memory engine.
//!
//! Amounts in scripts are `u64`; results print `u128` amounts as strings.
//!
//! A script is a list of steps, each pinned to a block height:
//!
//! ```json
//! [
//!   { "height": 10, "op": "fund", "identity": "v1", "amount": 5000 },
//!   { "height": 10, "op": "register", "identity": "v1" },
//!   { "height": 12, "op": "submit", "submitter": "farmer",
//!     "category": "organic", "location": "Lima", "evidence": "ab…" }
//! ]
//! ```
//!
//! `submit` takes either `evidence` (the fingerprint as hex) or `document`
//! (raw text, fingerprinted with Blake2b-256 before submission).

use std::str::FromStr;
use std::sync::Arc;

use greenproof_node::Engine;
use greenproof_nullables::{NullClock, NullKvStore, NullTokenLedger};
use greenproof_types::{Category, EngineConfig, EngineError, EvidenceHash, Identity, PayoutMode};
use greenproof_verification::AttestOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Step {
    pub height: u64,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Credit spendable tokens on the in-memory token ledger.
    Fund { identity: Identity, amount: u64 },
    Register { identity: Identity },
    Stake { identity: Identity, amount: u64 },
    Unstake { identity: Identity, amount: u64 },
    Submit {
        submitter: Identity,
        category: String,
        location: String,
        /// 64 hex characters.
        #[serde(default)]
        evidence: Option<String>,
        #[serde(default)]
        document: Option<String>,
    },
    Attest {
        proof_id: u64,
        verifier: Identity,
        approved: bool,
        confidence: u8,
    },
    Reject { proof_id: u64, caller: Identity, reason: String },
    Close { proof_id: u64, caller: Identity },
    Deposit { from: Identity, amount: u64 },
    Claim { id: u64, caller: Identity },
    AdvanceCycle,
    SetBlocked { caller: Identity, identity: Identity, blocked: bool },
    SetQuorumThreshold { caller: Identity, value: u32 },
    SetExpiryWindow { caller: Identity, value: u64 },
    SetBaseReward { caller: Identity, value: u64 },
    SetMultiplier { caller: Identity, category: String, value: u32 },
    RemoveMultiplier { caller: Identity, category: String },
    SetCooldownBlocks { caller: Identity, value: u64 },
    SetPayoutMode { caller: Identity, mode: PayoutMode },
    SetAuthority { caller: Identity, new_authority: Identity },
    GetProof { id: u64 },
    GetVerifier { identity: Identity },
    GetStatusHistory { id: u64 },
    GetEligibility { id: u64 },
    GetCycleState,
}

/// Outcome of one step, printed as one JSON line.
#[derive(Debug, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub height: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn parse(json: &str) -> anyhow::Result<Vec<Step>> {
    Ok(serde_json::from_str(json)?)
}

pub struct Replay {
    token: Arc<NullTokenLedger>,
    clock: Arc<NullClock>,
    engine: Engine<NullKvStore>,
}

impl Replay {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let token = Arc::new(NullTokenLedger::new());
        let clock = Arc::new(NullClock::new(0));
        let engine = Engine::open(
            Arc::new(NullKvStore::new()),
            token.clone(),
            clock.clone(),
            config,
        )?;
        Ok(Self {
            token,
            clock,
            engine,
        })
    }

    pub fn run(&self, steps: &[Step]) -> Vec<StepResult> {
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                self.clock.set(step.height);
                let (ok, error, message) = match self.execute(&step.command) {
                    Ok(value) => (Some(value), None, None),
                    Err(e) => {
                        tracing::debug!(step = i, code = e.code(), error = %e, "step failed");
                        (None, Some(e.code().to_string()), Some(e.to_string()))
                    }
                };
                StepResult {
                    step: i,
                    height: step.height,
                    ok,
                    error,
                    message,
                }
            })
            .collect()
    }

    fn execute(&self, command: &Command) -> Result<Value, EngineError> {
        let e = &self.engine;
        let value = match command {
            Command::Fund { identity, amount } => {
                self.token.credit(identity, u128::from(*amount));
                json!({ "balance": self.token.balance_of(identity).to_string() })
            }
            Command::Register { identity } => to_json(&e.register(identity)?)?,
            Command::Stake { identity, amount } => to_json(&e.stake(identity, u128::from(*amount))?)?,
            Command::Unstake { identity, amount } => to_json(&e.unstake(identity, u128::from(*amount))?)?,
            Command::Submit {
                submitter,
                category,
                location,
                evidence,
                document,
            } => {
                let evidence = evidence_of(evidence.as_deref(), document.as_deref())?;
                let id = e.submit(submitter, category.parse::<Category>()?, location, evidence)?;
                json!({ "id": id })
            }
            Command::Attest {
                proof_id,
                verifier,
                approved,
                confidence,
            } => match e.attest(*proof_id, verifier, *approved, *confidence)? {
                AttestOutcome::Recorded => json!({ "finalized": false }),
                AttestOutcome::Finalized { score } => json!({ "finalized": true, "score": score }),
            },
            Command::Reject {
                proof_id,
                caller,
                reason,
            } => {
                e.reject(*proof_id, caller, reason)?;
                Value::Null
            }
            Command::Close { proof_id, caller } => {
                e.close(*proof_id, caller)?;
                Value::Null
            }
            Command::Deposit { from, amount } => {
                json!({ "treasury": e.deposit_treasury(from, u128::from(*amount))?.to_string() })
            }
            Command::Claim { id, caller } => {
                let receipt = e.claim(*id, caller)?;
                json!({ "amount": receipt.amount.to_string(), "cycle": receipt.cycle })
            }
            Command::AdvanceCycle => json!({ "advanced": e.advance_cycle()? }),
            Command::SetBlocked {
                caller,
                identity,
                blocked,
            } => {
                e.set_blocked(caller, identity, *blocked)?;
                Value::Null
            }
            Command::SetQuorumThreshold { caller, value } => {
                e.set_quorum_threshold(caller, *value)?;
                Value::Null
            }
            Command::SetExpiryWindow { caller, value } => {
                e.set_expiry_window(caller, *value)?;
                Value::Null
            }
            Command::SetBaseReward { caller, value } => {
                e.set_base_reward(caller, u128::from(*value))?;
                Value::Null
            }
            Command::SetMultiplier {
                caller,
                category,
                value,
            } => {
                e.set_multiplier(caller, category.parse::<Category>()?, *value)?;
                Value::Null
            }
            Command::RemoveMultiplier { caller, category } => {
                e.remove_multiplier(caller, category.parse::<Category>()?)?;
                Value::Null
            }
            Command::SetCooldownBlocks { caller, value } => {
                e.set_cooldown_blocks(caller, *value)?;
                Value::Null
            }
            Command::SetPayoutMode { caller, mode } => {
                e.set_payout_mode(caller, *mode)?;
                Value::Null
            }
            Command::SetAuthority {
                caller,
                new_authority,
            } => {
                e.set_authority(caller, new_authority)?;
                Value::Null
            }
            Command::GetProof { id } => to_json(&e.get_proof(*id)?)?,
            Command::GetVerifier { identity } => to_json(&e.get_verifier(identity)?)?,
            Command::GetStatusHistory { id } => to_json(&e.get_status_history(*id)?)?,
            Command::GetEligibility { id } => to_json(&e.get_eligibility(*id)?)?,
            Command::GetCycleState => to_json(&e.get_cycle_state()?)?,
        };
        Ok(value)
    }
}

fn evidence_of(hex: Option<&str>, document: Option<&str>) -> Result<EvidenceHash, EngineError> {
    match (hex, document) {
        (Some(hex), None) => EvidenceHash::from_str(hex)
            .map_err(|err| EngineError::InvalidInput(format!("evidence: {err}"))),
        (None, Some(document)) => Ok(EvidenceHash::digest(document.as_bytes())),
        _ => Err(EngineError::InvalidInput(
            "submit needs exactly one of `evidence` or `document`".into(),
        )),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::InvalidInput(format!("unprintable result: {e}")))
}
