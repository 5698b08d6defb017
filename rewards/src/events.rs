use greenproof_types::Identity;

/// Emitted after a reward-side operation commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewardEvent {
    TreasuryDeposited {
        from: Identity,
        amount: u128,
        balance: u128,
    },
    CycleAdvanced {
        cycle: u64,
        boundary: u64,
    },
    RewardClaimed {
        id: u64,
        claimant: Identity,
        amount: u128,
        cycle: u64,
    },
    ParameterChanged {
        name: &'static str,
        value: String,
    },
}
