//! Fuzz target for settlement, attestation and claims
//!
//! Tests invariants:
//! - A stack opens at most one ticket; claimed units never exceed the total
//! - Disputed tickets can never be claimed
//! - Claims conserve the prepayment across node, attesters and buyer
//! - Random operation sequences keep lamports and treasuries consistent
//!
//! Run with: cargo test --release -p compute-ledger-fuzz settlement

use crate::*;
use compute_ledger::errors::LedgerError;
use compute_ledger::state::{AttestationOutcome, SecurityLevel};
use proptest::prelude::*;

/// Ledger with one task of `level` and `nodes` subscribed nodes, each owned
/// by its own actor. Returns (ledger, task id, node ids).
fn market(level: SecurityLevel, nodes: u8, price: u64) -> (SimulatedLedger, u64, Vec<u64>) {
    let mut ledger = seeded_ledger();
    let task = ledger.create_task(actor(0), level, 0).unwrap();
    let ids = (1..=nodes)
        .map(|i| {
            let node = ledger.register_node(actor(i)).unwrap();
            ledger.subscribe(actor(i), task, node, price, 1_000).unwrap();
            node
        })
        .collect();
    (ledger, task, ids)
}

fn owner(ledger: &SimulatedLedger, node_id: u64) -> anchor_lang::prelude::Pubkey {
    ledger.nodes[&node_id].owner
}

/// Sampling always triggers and requests `count` attesters
fn always_sample(ledger: &mut SimulatedLedger, count: u8) {
    let authority = ledger.authority();
    ledger
        .update_settlement_params(authority, 100, 2000, 1000, count)
        .unwrap();
}

const BUYER: u8 = 7;

#[test]
fn test_full_claim_pays_node() {
    let (mut ledger, task, nodes) = market(SecurityLevel::Standard, 1, 10);
    let node = nodes[0];
    let buyer_before = ledger.balance_of(&actor(BUYER));

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [1u8; 32])
        .unwrap();
    assert_eq!(ledger.stacks[&stack].node_id, node);
    ledger
        .try_settle(actor(1), stack, 100, [9u8; 32], [8u8; 32])
        .unwrap();

    ledger.advance_epochs(1);
    assert!(failed_with(
        &ledger.claim_funds(actor(1), node, &[stack]),
        LedgerError::DisputeWindowOpen
    ));

    ledger.advance_epochs(1);
    ledger.claim_funds(actor(1), node, &[stack]).unwrap();
    assert_eq!(ledger.nodes[&node].fees.outstanding().unwrap(), 1_000);
    assert_eq!(ledger.balance_of(&actor(BUYER)), buyer_before - 1_000);
    assert!(ledger.stacks.is_empty());
    assert!(ledger.tickets.is_empty());

    // Locked until the next epoch
    assert_eq!(ledger.withdraw_fees(actor(1), node).unwrap(), 0);
    ledger.advance_epochs(1);
    assert_eq!(ledger.withdraw_fees(actor(1), node).unwrap(), 1_000);
    assert_eq!(ledger.fee_treasury.balance, 0);
}

#[test]
fn test_partial_claim_refunds_buyer() {
    let (mut ledger, task, nodes) = market(SecurityLevel::Standard, 1, 10);
    let node = nodes[0];
    let buyer_before = ledger.balance_of(&actor(BUYER));

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [1u8; 32])
        .unwrap();
    ledger
        .try_settle(actor(1), stack, 60, [9u8; 32], [8u8; 32])
        .unwrap();
    ledger.advance_epochs(2);
    ledger.claim_funds(actor(1), node, &[stack]).unwrap();

    assert_eq!(ledger.nodes[&node].fees.outstanding().unwrap(), 600);
    assert_eq!(ledger.balance_of(&actor(BUYER)), buyer_before - 600);
    assert_eq!(ledger.fee_treasury.balance, 600);
}

#[test]
fn test_mismatched_attestation_blocks_claim() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 4, 10);
    always_sample(&mut ledger, 3);

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [1u8; 32])
        .unwrap();
    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 100)
        .unwrap();
    let attesters = ledger.tickets[&stack].attesters.clone();
    assert_eq!(attesters.len(), 3);

    let accuser = attesters[0];
    let outcome = ledger
        .submit_attestation(owner(&ledger, accuser), accuser, stack, [0xAB; 32], [0u8; 32])
        .unwrap();
    assert!(matches!(outcome, AttestationOutcome::Disputed { .. }));
    assert!(ledger.tickets[&stack].disputed);

    let late = attesters[1];
    assert!(failed_with(
        &ledger.attest_honestly(owner(&ledger, late), late, stack),
        LedgerError::TicketDisputed
    ));

    for _ in 0..10 {
        ledger.advance_epochs(1);
        assert!(failed_with(
            &ledger.claim_funds(owner(&ledger, server), server, &[stack]),
            LedgerError::TicketDisputed
        ));
    }
    assert!(ledger.stacks.contains_key(&stack));
}

#[test]
fn test_single_eligible_node_serves_both() {
    let (mut ledger, task, nodes) = market(SecurityLevel::Standard, 3, 10);
    // Only the first node can take 1000 units at this price
    for node in &nodes[1..] {
        let owner = owner(&ledger, *node);
        ledger.update_subscription(owner, task, *node, 10, 5).unwrap();
    }
    let a = ledger
        .purchase_stack(actor(BUYER), task, 1_000, 10, [1u8; 32])
        .unwrap();
    let b = ledger
        .purchase_stack(actor(6), task, 1_000, 10, [2u8; 32])
        .unwrap();
    assert_ne!(a, b);
    assert_eq!(ledger.stacks[&a].node_id, nodes[0]);
    assert_eq!(ledger.stacks[&b].node_id, nodes[0]);
}

#[test]
fn test_honest_consensus_pays_attesters() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 4, 10);
    always_sample(&mut ledger, 3);
    let expected_lamports = ledger.total_lamports();

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [3u8; 32])
        .unwrap();
    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 100)
        .unwrap();
    let attesters = ledger.tickets[&stack].attesters.clone();

    let mut outcomes = Vec::new();
    for attester in &attesters {
        outcomes.push(
            ledger
                .attest_honestly(owner(&ledger, *attester), *attester, stack)
                .unwrap(),
        );
    }
    assert_eq!(outcomes.last(), Some(&AttestationOutcome::Completed));
    assert!(matches!(
        outcomes[0],
        AttestationOutcome::Recorded { remaining: 2 }
    ));

    ledger.advance_epochs(2);
    ledger
        .claim_funds(owner(&ledger, server), server, &[stack])
        .unwrap();

    // prepaid 2000, base 1000, pool 1000 split three ways
    let share = 333;
    let self_attests = attesters.contains(&server) as u64;
    assert_eq!(
        ledger.nodes[&server].fees.outstanding().unwrap(),
        2_000 - 3 * share + self_attests * share
    );
    for attester in attesters.iter().filter(|id| **id != server) {
        assert_eq!(ledger.nodes[attester].fees.outstanding().unwrap(), share);
    }
    assert!(ledger_violations(&ledger, expected_lamports).is_empty());
}

#[test]
fn test_idle_attester_is_slashed() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 5, 10);
    always_sample(&mut ledger, 2);
    let collateral = ledger.config.registration_collateral;

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [5u8; 32])
        .unwrap();
    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 100)
        .unwrap();
    let attesters = ledger.tickets[&stack].attesters.clone();
    let idle = *attesters.iter().find(|id| **id != server).unwrap();
    let active = *attesters.iter().find(|id| **id != idle).unwrap();
    ledger
        .attest_honestly(owner(&ledger, active), active, stack)
        .unwrap();

    ledger.advance_epochs(3);
    assert!(failed_with(
        &ledger.attest_honestly(owner(&ledger, idle), idle, stack),
        LedgerError::DisputeWindowClosed
    ));
    ledger
        .claim_funds(owner(&ledger, server), server, &[stack])
        .unwrap();

    let penalty = collateral / 10;
    assert_eq!(ledger.nodes[&idle].collateral, collateral - penalty);
    assert_eq!(ledger.nodes[&idle].reputation, 90);
    assert_eq!(ledger.communal_treasury.balance, penalty);
}

#[test]
fn test_early_attester_claim_counts_at_primary_claim() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 4, 10);
    always_sample(&mut ledger, 3);
    let expected_lamports = ledger.total_lamports();

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [7u8; 32])
        .unwrap();
    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 100)
        .unwrap();
    let attesters = ledger.tickets[&stack].attesters.clone();
    for attester in &attesters {
        ledger
            .attest_honestly(owner(&ledger, *attester), *attester, stack)
            .unwrap();
    }

    let early = *attesters.iter().find(|id| **id != server).unwrap();
    assert!(failed_with(
        &ledger.claim_funds_for_attestation(owner(&ledger, early), early, &[stack]),
        LedgerError::DisputeWindowOpen
    ));
    ledger.advance_epochs(2);
    ledger
        .claim_funds_for_attestation(owner(&ledger, early), early, &[stack])
        .unwrap();
    assert_eq!(ledger.nodes[&early].fees.outstanding().unwrap(), 333);
    assert!(ledger_violations(&ledger, expected_lamports).is_empty());

    assert!(failed_with(
        &ledger.claim_funds_for_attestation(owner(&ledger, early), early, &[stack]),
        LedgerError::AttesterAlreadySettled
    ));

    ledger
        .claim_funds(owner(&ledger, server), server, &[stack])
        .unwrap();
    // paid once, not twice
    assert_eq!(ledger.nodes[&early].fees.outstanding().unwrap(), 333);
    assert!(ledger_violations(&ledger, expected_lamports).is_empty());
}

#[test]
fn test_early_slashed_attester_cannot_attest_afterwards() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 4, 10);
    always_sample(&mut ledger, 3);
    let expected_lamports = ledger.total_lamports();
    let collateral = ledger.config.registration_collateral;

    let stack = ledger
        .purchase_stack(actor(BUYER), task, 100, 10, [9u8; 32])
        .unwrap();
    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 100)
        .unwrap();
    let attesters = ledger.tickets[&stack].attesters.clone();
    let idle = *attesters.iter().find(|id| **id != server).unwrap();
    for attester in attesters.iter().filter(|id| **id != idle) {
        ledger
            .attest_honestly(owner(&ledger, *attester), *attester, stack)
            .unwrap();
    }

    // Deadline epoch: both claims and attestations are open
    ledger.advance_epochs(2);
    ledger
        .claim_funds_for_attestation(owner(&ledger, idle), idle, &[stack])
        .unwrap();
    assert_eq!(ledger.nodes[&idle].collateral, collateral - collateral / 10);
    assert!(failed_with(
        &ledger.attest_honestly(owner(&ledger, idle), idle, stack),
        LedgerError::AttesterAlreadySettled
    ));
    assert!(failed_with(
        &ledger.start_dispute(owner(&ledger, idle), idle, stack),
        LedgerError::AttesterAlreadySettled
    ));

    ledger
        .claim_funds(owner(&ledger, server), server, &[stack])
        .unwrap();
    // prepaid 2000, two attesters paid 333 each, the idle share stays with the node
    let self_attests = attesters.contains(&server) as u64;
    assert_eq!(
        ledger.nodes[&server].fees.outstanding().unwrap(),
        2_000 - 2 * 333 + self_attests * 333
    );
    assert_eq!(ledger.nodes[&idle].fees.outstanding().unwrap(), 0);
    assert_eq!(ledger.fee_treasury.balance, 2_000);
    assert!(ledger_violations(&ledger, expected_lamports).is_empty());
}

#[test]
fn test_settle_once_per_stack() {
    let (mut ledger, task, nodes) = market(SecurityLevel::Standard, 1, 10);
    let stack = ledger
        .purchase_stack(actor(BUYER), task, 10, 10, [1u8; 32])
        .unwrap();
    assert!(failed_with(
        &ledger.try_settle(actor(1), stack, 11, [0u8; 32], [0u8; 32]),
        LedgerError::ClaimedUnitsExceedTotal
    ));
    ledger
        .try_settle(actor(1), stack, 10, [0u8; 32], [0u8; 32])
        .unwrap();
    assert!(failed_with(
        &ledger.try_settle(actor(1), stack, 10, [0u8; 32], [0u8; 32]),
        LedgerError::StackAlreadySettling
    ));
    assert!(failed_with(
        &ledger.attest_honestly(actor(1), nodes[0], stack),
        LedgerError::NotSamplingConsensus
    ));
}

#[test]
fn test_removed_task_settles_without_attesters() {
    let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 3, 10);
    always_sample(&mut ledger, 3);
    let stack = ledger
        .purchase_stack(actor(BUYER), task, 10, 10, [1u8; 32])
        .unwrap();
    ledger.deprecate_task(actor(0), task).unwrap();
    ledger.advance_epochs(2);
    ledger.remove_task(actor(0), task).unwrap();

    let server = ledger.stacks[&stack].node_id;
    ledger
        .settle_honestly(owner(&ledger, server), stack, 10)
        .unwrap();
    assert!(ledger.tickets[&stack].attesters.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn fuzz_claim_conserves_prepayment(
        units in 1u64..5_000,
        price in 1u64..1_000,
        claimed_permille in 0u16..=1000,
        attested in prop::collection::vec(any::<bool>(), 3),
        seed in arb_bytes32(),
    ) {
        let (mut ledger, task, _) = market(SecurityLevel::SamplingConsensus, 5, price);
        always_sample(&mut ledger, 3);
        for i in 1..=5u8 {
            let node = ledger.nodes.iter().find(|(_, n)| n.owner == actor(i)).map(|(id, _)| *id).unwrap();
            ledger.update_subscription(actor(i), task, node, price, units).unwrap();
        }
        let expected_lamports = ledger.total_lamports();
        let buyer_before = ledger.balance_of(&actor(BUYER));

        let stack = ledger.purchase_stack(actor(BUYER), task, units, price, seed).unwrap();
        let prepaid = ledger.stacks[&stack].prepaid;
        let server = ledger.stacks[&stack].node_id;
        let claimed = (u128::from(units) * u128::from(claimed_permille) / 1000) as u64;
        ledger.settle_honestly(owner(&ledger, server), stack, claimed).unwrap();
        let attesters = ledger.tickets[&stack].attesters.clone();
        for (attester, attests) in attesters.iter().zip(&attested) {
            if *attests {
                ledger.attest_honestly(owner(&ledger, *attester), *attester, stack).unwrap();
            }
        }
        ledger.advance_epochs(2);
        ledger.claim_funds(owner(&ledger, server), server, &[stack]).unwrap();

        let refund = ledger.balance_of(&actor(BUYER)) - (buyer_before - prepaid);
        let fees: u64 = ledger.nodes.values().map(|n| n.fees.outstanding().unwrap()).sum();
        prop_assert_eq!(refund + fees, prepaid);
        prop_assert!(ledger_violations(&ledger, expected_lamports).is_empty());
    }

    #[test]
    fn fuzz_sampling_respects_count_and_filter(
        count in 0u8..=8,
        nodes in 1u8..7,
        units in 1u64..2_000,
        seed in arb_bytes32(),
    ) {
        let (mut ledger, task, ids) = market(SecurityLevel::SamplingConsensus, nodes, 10);
        always_sample(&mut ledger, count);
        // Half the nodes cannot take the stack's size
        for (i, node) in ids.iter().enumerate() {
            let capacity = if i % 2 == 0 { 2_000 } else { 1 };
            let owner = owner(&ledger, *node);
            ledger.update_subscription(owner, task, *node, 10, capacity).unwrap();
        }

        let stack = ledger.purchase_stack(actor(BUYER), task, units, 10, seed).unwrap();
        let server = ledger.stacks[&stack].node_id;
        ledger.settle_honestly(owner(&ledger, server), stack, units).unwrap();
        let ticket = &ledger.tickets[&stack];

        prop_assert!(ticket.attesters.len() <= usize::from(count));
        for attester in &ticket.attesters {
            let ad = ledger.tasks[&task].advertisement_for(*attester).unwrap();
            prop_assert!(ad.max_units >= units);
            prop_assert!(ledger.nodes[attester].is_selectable());
        }
        prop_assert_eq!(check_tickets(&ledger), TicketInvariantResult::Valid);
        prop_assert!(check_asserter_leaf(ticket, &work_leaf(stack, server)));
    }

    #[test]
    fn fuzz_random_sequences_hold_invariants(actions in arb_action_sequence(60)) {
        let mut ledger = seeded_ledger();
        let expected_lamports = ledger.total_lamports();
        for action in &actions {
            let before = ledger.clone();
            let result = apply_action(&mut ledger, action);
            if result.is_err() {
                prop_assert_eq!(ledger.total_lamports(), before.total_lamports());
                prop_assert_eq!(ledger.config.next_stack_id, before.config.next_stack_id);
            }
            let violations = ledger_violations(&ledger, expected_lamports);
            prop_assert!(violations.is_empty(), "{:?} after {:?}", violations, action);
            prop_assert_eq!(
                check_deprecation_monotonic(&before, &ledger),
                CatalogInvariantResult::Valid
            );
        }
    }
}
