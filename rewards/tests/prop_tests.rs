use std::sync::Arc;

use proptest::prelude::*;

use greenproof_nullables::{NullKvStore, NullTokenLedger};
use greenproof_rewards::{RewardCycleState, RewardLedger, RewardService};
use greenproof_store::{KvStore, WriteBatch};
use greenproof_types::{BlockHeight, Category, EngineError, Identity, RewardParams};
use greenproof_verification::{EligibilityRecord, EligibilitySink};

fn service(params: RewardParams, treasury: u128) -> (Arc<NullKvStore>, RewardService<NullKvStore>) {
    let store = Arc::new(NullKvStore::new());
    let token = Arc::new(NullTokenLedger::new());
    let ledger = Arc::new(
        RewardLedger::open(store.clone(), Identity::new("authority"), &params, BlockHeight::new(0))
            .unwrap(),
    );
    let mut svc = RewardService::new(ledger, token.clone());
    if treasury > 0 {
        token.credit(&Identity::new("donor"), treasury);
        svc.deposit_treasury(&Identity::new("donor"), treasury).unwrap();
    }
    (store, svc)
}

fn approve(store: &NullKvStore, svc: &RewardService<NullKvStore>, id: u64, category: Category) {
    let mut batch = WriteBatch::new();
    svc.ledger()
        .register_eligibility(
            &mut batch,
            EligibilityRecord {
                id,
                submitter: Identity::new("farmer"),
                category,
                approved: true,
                approved_at: BlockHeight::new(0),
            },
        )
        .unwrap();
    store.commit(batch).unwrap();
}

fn category() -> impl Strategy<Value = Category> {
    proptest::sample::select(Category::ALL.to_vec())
}

proptest! {
    /// The reward is base * multiplier / 100, truncated toward zero.
    #[test]
    fn reward_formula_truncates(base in 1u128..1_000_000_000, multiplier in 50u32..=300) {
        let mut state = RewardCycleState::new(
            Identity::new("authority"),
            &RewardParams::default(),
            BlockHeight::new(0),
        );
        state.base_reward = base;
        state.multipliers.insert(Category::Organic, multiplier);
        let reward = state.reward_for(Category::Organic).unwrap();
        prop_assert_eq!(reward, base * u128::from(multiplier) / 100);
        prop_assert!(reward * 100 <= base * u128::from(multiplier));
    }

    /// Claims succeed at most once per entry; repeats leave the treasury alone.
    #[test]
    fn claim_at_most_once(cat in category(), attempts in 2usize..6) {
        let (store, mut svc) = service(RewardParams::default(), 1_000_000);
        approve(&store, &svc, 1, cat);

        let farmer = Identity::new("farmer");
        let mut paid = 0;
        for i in 0..attempts {
            let before = svc.get_treasury_balance().unwrap();
            match svc.claim(1, &farmer, BlockHeight::new(144 + i as u64)) {
                Ok(_) => paid += 1,
                Err(e) => {
                    prop_assert_eq!(e, EngineError::AlreadyClaimed { id: 1, claimant: farmer.clone() });
                    prop_assert_eq!(svc.get_treasury_balance().unwrap(), before);
                }
            }
        }
        prop_assert_eq!(paid, 1);
    }

    /// Total paid within one cycle never exceeds the cap, and the treasury
    /// only shrinks by what was paid.
    #[test]
    fn payouts_respect_cap_and_treasury(
        cap in 1_000u128..20_000,
        treasury in 0u128..20_000,
        cats in proptest::collection::vec(category(), 1..12),
    ) {
        let params = RewardParams { per_cycle_cap: cap, cooldown_blocks: 0, ..RewardParams::default() };
        let (store, mut svc) = service(params, treasury);
        for (i, cat) in cats.iter().enumerate() {
            approve(&store, &svc, i as u64 + 1, *cat);
        }

        let farmer = Identity::new("farmer");
        let mut paid = 0u128;
        for i in 0..cats.len() {
            if let Ok(receipt) = svc.claim(i as u64 + 1, &farmer, BlockHeight::new(10)) {
                paid += receipt.amount;
            }
        }
        let state = svc.get_cycle_state().unwrap();
        prop_assert!(paid <= cap);
        prop_assert_eq!(state.distributed_this_cycle, paid);
        prop_assert_eq!(state.treasury_balance, treasury - paid);
    }

    /// Cycle boundaries stay on the grid whatever heights drive them.
    #[test]
    fn cycle_boundary_stays_on_grid(
        duration in 1u64..5_000,
        steps in proptest::collection::vec(0u64..20_000, 1..20),
    ) {
        let mut state = RewardCycleState::new(
            Identity::new("authority"),
            &RewardParams { cycle_duration_blocks: duration, ..RewardParams::default() },
            BlockHeight::new(0),
        );
        let mut now = 0u64;
        for step in steps {
            now += step;
            state.advance(BlockHeight::new(now));
            prop_assert_eq!(state.last_cycle_boundary.get(), state.current_cycle * duration);
            prop_assert!(state.last_cycle_boundary.get() <= now);
            prop_assert!(state.next_boundary().get() > now);
        }
    }
}
