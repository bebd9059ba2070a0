//! Fuzz target for stack purchase
//!
//! Tests invariants:
//! - The selected node always passes the eligibility filter
//! - The prepayment equals units x cap x charge and lands in the fee treasury
//! - Purchases with no eligible node abort without side effects
//!
//! Run with: cargo test --release -p compute-ledger-fuzz stack_purchase

use crate::*;
use compute_ledger::errors::LedgerError;
use compute_ledger::state::{SecurityLevel, Stack};
use proptest::prelude::*;

/// Terms one subscribed node advertises
#[derive(Debug, Clone)]
struct Offer {
    price: u64,
    max_units: u64,
    disabled: bool,
}

fn arb_offer() -> impl Strategy<Value = Offer> {
    (arb_price(), arb_units(), prop::bool::weighted(0.2)).prop_map(|(price, max_units, disabled)| {
        Offer {
            price,
            max_units,
            disabled,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_selected_node_is_eligible(
        offers in prop::collection::vec(arb_offer(), 1..12),
        level in arb_security_level(),
        units in arb_units(),
        price_cap in arb_price(),
        seed in arb_bytes32(),
    ) {
        let mut ledger = seeded_ledger();
        let task = ledger.create_task(actor(1), level, 0).unwrap();
        for (i, offer) in offers.iter().enumerate() {
            let owner = actor(2 + (i as u8 % 4));
            let node = ledger.register_node(owner).unwrap();
            ledger.subscribe(owner, task, node, offer.price, offer.max_units).unwrap();
            if offer.disabled {
                ledger.disable_node(owner, node).unwrap();
            }
        }

        let expected_lamports = ledger.total_lamports();
        let before = ledger.clone();
        let buyer = actor(7);
        let result = ledger.purchase_stack(buyer, task, units, price_cap, seed);

        let any_eligible = offers
            .iter()
            .any(|o| !o.disabled && o.price <= price_cap && o.max_units >= units);
        match result {
            Ok(stack_id) => {
                prop_assert!(any_eligible);
                let stack = &ledger.stacks[&stack_id];
                let ad = ledger.tasks[&task].advertisement_for(stack.node_id).unwrap();
                prop_assert!(ad.price_per_unit <= price_cap);
                prop_assert!(ad.max_units >= units);
                prop_assert!(ledger.nodes[&stack.node_id].is_selectable());

                let charge = ledger.config.charge_permille_for(level);
                let prepaid = Stack::charge_for(units, price_cap, charge).unwrap();
                prop_assert_eq!(stack.prepaid, prepaid);
                prop_assert_eq!(stack.price_per_unit, price_cap);
                prop_assert_eq!(ledger.balance_of(&buyer), ACTOR_FUNDS - prepaid);
                prop_assert_eq!(ledger.fee_treasury.balance, prepaid);
            }
            Err(_) => {
                prop_assert!(!any_eligible);
                prop_assert!(failed_with(&result, LedgerError::NoNodesEligible));
                prop_assert_eq!(ledger.config.next_stack_id, before.config.next_stack_id);
                prop_assert!(ledger.stacks.is_empty());
            }
        }
        prop_assert!(ledger_violations(&ledger, expected_lamports).is_empty());
    }

    #[test]
    fn fuzz_selection_reproducible(seed in arb_bytes32(), nodes in 2usize..8) {
        let mut ledger = seeded_ledger();
        let task = ledger.create_task(actor(1), SecurityLevel::Standard, 0).unwrap();
        for _ in 0..nodes {
            let node = ledger.register_node(actor(2)).unwrap();
            ledger.subscribe(actor(2), task, node, 10, 100).unwrap();
        }
        let mut replay = ledger.clone();
        let a = ledger.purchase_stack(actor(3), task, 50, 10, seed).unwrap();
        let b = replay.purchase_stack(actor(3), task, 50, 10, seed).unwrap();
        prop_assert_eq!(ledger.stacks[&a].node_id, replay.stacks[&b].node_id);
    }

    #[test]
    fn fuzz_reputation_floor_filters_candidates(floor in 95u8..=105u8, seed in arb_bytes32()) {
        let mut ledger = seeded_ledger();
        let task = ledger.create_task(actor(1), SecurityLevel::Standard, 0).unwrap();
        let node = ledger.register_node(actor(2)).unwrap();
        ledger.subscribe(actor(2), task, node, 10, 100).unwrap();
        ledger.tasks.get_mut(&task).unwrap().minimum_reputation = floor;

        let result = ledger.purchase_stack(actor(3), task, 10, 10, seed);
        if ledger.nodes[&node].reputation >= floor {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(failed_with(&result, LedgerError::NoNodesEligible));
        }
    }
}

#[test]
fn test_empty_task_rejects_purchase() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    assert!(failed_with(
        &ledger.purchase_stack(actor(2), task, 10, 10, [0u8; 32]),
        LedgerError::NoNodesSubscribed
    ));
}

#[test]
fn test_zero_units_rejected() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let node = ledger.register_node(actor(2)).unwrap();
    ledger.subscribe(actor(2), task, node, 10, 100).unwrap();
    assert!(failed_with(
        &ledger.purchase_stack(actor(3), task, 0, 10, [0u8; 32]),
        LedgerError::InvalidComputeUnits
    ));
}

#[test]
fn test_destroyed_node_is_skipped() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let gone = ledger.register_node(actor(2)).unwrap();
    let live = ledger.register_node(actor(3)).unwrap();
    ledger.subscribe(actor(2), task, gone, 10, 100).unwrap();
    ledger.subscribe(actor(3), task, live, 10, 100).unwrap();
    ledger.disable_node(actor(2), gone).unwrap();
    ledger.advance_epochs(4);
    ledger.destroy_node(actor(2), gone).unwrap();

    for seed in 0..8u8 {
        let stack = ledger
            .purchase_stack(actor(4), task, 10, 10, [seed; 32])
            .unwrap();
        assert_eq!(ledger.stacks[&stack].node_id, live);
    }
}

#[test]
fn test_consensus_stack_pays_surcharge() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::SamplingConsensus, 0)
        .unwrap();
    let node = ledger.register_node(actor(2)).unwrap();
    ledger.subscribe(actor(2), task, node, 7, 100).unwrap();

    let stack = ledger
        .purchase_stack(actor(3), task, 10, 7, [0u8; 32])
        .unwrap();
    // default charge is 2000 permille
    assert_eq!(ledger.stacks[&stack].prepaid, 140);
    assert_eq!(ledger.stacks[&stack].charge_permille, 2000);
}

#[test]
fn test_whitelist_excludes_earlier_subscribers() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let early = ledger.register_node(actor(2)).unwrap();
    let listed = ledger.register_node(actor(3)).unwrap();
    ledger.subscribe(actor(2), task, early, 10, 100).unwrap();
    ledger.subscribe(actor(3), task, listed, 10, 100).unwrap();
    ledger
        .whitelist_nodes_for_task(actor(1), task, &[listed])
        .unwrap();

    for seed in 0..8u8 {
        let stack = ledger
            .purchase_stack(actor(4), task, 10, 10, [seed; 32])
            .unwrap();
        assert_eq!(ledger.stacks[&stack].node_id, listed);
    }
}
