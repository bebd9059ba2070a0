//! Fuzz target for the node registry
//!
//! Tests invariants:
//! - Collateral never goes negative; timeout slashing clamps to what is left
//! - Destroy waits four epochs after disable and returns all collateral
//! - Fees accrued in an epoch stay locked until a later epoch
//!
//! Run with: cargo test --release -p compute-ledger-fuzz node_registry

use crate::*;
use compute_ledger::errors::LedgerError;
use compute_ledger::state::{FeeLedger, Node};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_timeout_slash_clamps(
        collateral in arb_collateral(),
        permille in arb_permille(),
        rounds in 1usize..20,
    ) {
        let mut node = Node::new(1, actor(1), collateral, 0, 0);
        let mut total = 0u64;
        for _ in 0..rounds {
            let before = node.collateral;
            let slashed = node.slash_timeout(permille).unwrap();
            prop_assert!(slashed <= before);
            prop_assert_eq!(node.collateral, before - slashed);
            if before > 0 && permille > 0 {
                prop_assert!(slashed > 0, "ceil rounding must take at least one lamport");
            }
            total += slashed;
        }
        prop_assert_eq!(total + node.collateral, collateral);
    }

    #[test]
    fn fuzz_fee_ledger_locks_current_epoch(
        accruals in prop::collection::vec((1u64..1_000_000, 0u64..3), 1..20),
    ) {
        let mut ledger = FeeLedger::new(0);
        let mut epoch = 0u64;
        let mut total = 0u64;
        for (amount, step) in accruals {
            epoch += step;
            ledger.accrue(amount, epoch).unwrap();
            total += amount;
            prop_assert_eq!(ledger.outstanding().unwrap(), total);
            prop_assert!(ledger.current_epoch_amount >= amount);
            prop_assert_eq!(ledger.last_accrual_epoch, epoch);
        }

        let locked = ledger.current_epoch_amount;
        let same_epoch = ledger.take_withdrawable(epoch).unwrap();
        prop_assert_eq!(same_epoch + locked, total);
        prop_assert_eq!(ledger.current_epoch_amount, locked);

        let next_epoch = ledger.take_withdrawable(epoch + 1).unwrap();
        prop_assert_eq!(next_epoch, locked);
        prop_assert_eq!(ledger.outstanding().unwrap(), 0);
    }

    #[test]
    fn fuzz_destroy_wait(
        disable_at in 0u64..10,
        wait in 0u64..8,
        collateral in arb_collateral(),
    ) {
        let mut ledger = seeded_ledger();
        ledger
            .update_registration_params(ledger.authority(), true, collateral)
            .unwrap();
        let owner = actor(1);
        let before = ledger.balance_of(&owner);
        let node = ledger.register_node(owner).unwrap();

        ledger.advance_epochs(disable_at);
        ledger.disable_node(owner, node).unwrap();
        ledger.advance_epochs(wait);

        let result = ledger.destroy_node(owner, node);
        if wait >= 4 {
            prop_assert_eq!(result.unwrap(), collateral);
            prop_assert!(!ledger.nodes.contains_key(&node));
            prop_assert_eq!(ledger.balance_of(&owner), before);
        } else {
            prop_assert!(failed_with(&result, LedgerError::NodeDestroyWaitNotElapsed));
            prop_assert!(ledger.nodes.contains_key(&node));
        }
    }

    #[test]
    fn fuzz_disable_is_one_way(epochs in prop::collection::vec(0u64..5, 1..5)) {
        let mut ledger = seeded_ledger();
        let node = ledger.register_node(actor(2)).unwrap();
        ledger.disable_node(actor(2), node).unwrap();
        let disabled_at = ledger.nodes[&node].disabled_at;
        for step in epochs {
            ledger.advance_epochs(step);
            let again = ledger.disable_node(actor(2), node);
            prop_assert!(failed_with(&again, LedgerError::NodeAlreadyDisabled));
            prop_assert_eq!(ledger.nodes[&node].disabled_at, disabled_at);
        }
        prop_assert_eq!(ledger.config.active_nodes, 0);
    }

    #[test]
    fn fuzz_only_owner_controls_node(owner in 1u8..ACTORS, other in 1u8..ACTORS) {
        prop_assume!(owner != other);
        let mut ledger = seeded_ledger();
        let node = ledger.register_node(actor(owner)).unwrap();
        prop_assert!(failed_with(
            &ledger.disable_node(actor(other), node),
            LedgerError::UnauthorizedNode
        ));
        prop_assert!(failed_with(
            &ledger.withdraw_fees(actor(other), node),
            LedgerError::UnauthorizedNode
        ));
        prop_assert!(!ledger.nodes[&node].is_disabled());
    }
}

#[test]
fn test_destroy_after_four_epochs() {
    let mut ledger = seeded_ledger();
    let owner = actor(3);
    let collateral = ledger.config.registration_collateral;
    let node = ledger.register_node(owner).unwrap();

    ledger.advance_epochs(5);
    ledger.disable_node(owner, node).unwrap();

    ledger.advance_epochs(3);
    assert!(failed_with(
        &ledger.destroy_node(owner, node),
        LedgerError::NodeDestroyWaitNotElapsed
    ));

    ledger.advance_epochs(1);
    assert_eq!(ledger.destroy_node(owner, node).unwrap(), collateral);
    assert_eq!(ledger.balance_of(&owner), ACTOR_FUNDS);
}

#[test]
fn test_destroy_requires_disable() {
    let mut ledger = seeded_ledger();
    let node = ledger.register_node(actor(1)).unwrap();
    ledger.advance_epochs(10);
    assert!(failed_with(
        &ledger.destroy_node(actor(1), node),
        LedgerError::NodeNotDisabled
    ));
}

#[test]
fn test_authority_slash_empties_collateral() {
    let mut ledger = seeded_ledger();
    let collateral = ledger.config.registration_collateral;
    let node = ledger.register_node(actor(1)).unwrap();

    assert!(failed_with(
        &ledger.slash_node_collateral(actor(1), node),
        LedgerError::UnauthorizedAuthority
    ));
    let authority = ledger.authority();
    assert_eq!(ledger.slash_node_collateral(authority, node).unwrap(), collateral);
    assert_eq!(ledger.nodes[&node].collateral, 0);
    assert_eq!(ledger.communal_treasury.balance, collateral);
    assert!(!ledger.nodes[&node].is_selectable());
}
