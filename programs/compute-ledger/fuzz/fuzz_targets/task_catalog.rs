//! Fuzz target for the task catalog
//!
//! Tests invariants:
//! - A node advertises at most once per task
//! - Deprecation is one-way and blocks new subscriptions and purchases
//! - Resubscribing leaves no trace of earlier terms
//! - A stale unsubscribe index aborts instead of removing another node
//!
//! Run with: cargo test --release -p compute-ledger-fuzz task_catalog

use crate::*;
use compute_ledger::errors::LedgerError;
use compute_ledger::state::{SecurityLevel, Task, MAX_TASK_ADVERTISEMENTS};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum CatalogOp {
    Subscribe(u64, u64, u64),
    Unsubscribe(u64),
    UnsubscribeAt(usize, u64),
    Update(u64, u64, u64),
}

fn arb_catalog_op() -> impl Strategy<Value = CatalogOp> {
    prop_oneof![
        (0u64..30, arb_price(), arb_units()).prop_map(|(n, p, u)| CatalogOp::Subscribe(n, p, u)),
        (0u64..30).prop_map(CatalogOp::Unsubscribe),
        (0usize..30, 0u64..30).prop_map(|(i, n)| CatalogOp::UnsubscribeAt(i, n)),
        (0u64..30, arb_price(), arb_units()).prop_map(|(n, p, u)| CatalogOp::Update(n, p, u)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn fuzz_advertisements_stay_unique(ops in prop::collection::vec(arb_catalog_op(), 1..80)) {
        let mut task = Task::default();
        for op in ops {
            let before = task.advertisements.clone();
            let result = match op {
                CatalogOp::Subscribe(node, price, units) => task.subscribe(node, price, units),
                CatalogOp::Unsubscribe(node) => task.unsubscribe(node).map(|_| ()),
                CatalogOp::UnsubscribeAt(index, node) => {
                    let stale = before.get(index).map(|ad| ad.node_id) != Some(node);
                    let result = task.unsubscribe_at(index, node).map(|_| ());
                    if stale {
                        prop_assert!(failed_with(&result, LedgerError::SubscriptionIndexMismatch));
                    }
                    result
                }
                CatalogOp::Update(node, price, units) => task.update_subscription(node, price, units),
            };
            if result.is_err() {
                prop_assert_eq!(&task.advertisements, &before);
            }

            prop_assert!(task.advertisements.len() <= MAX_TASK_ADVERTISEMENTS);
            let mut ids: Vec<u64> = task.advertisements.iter().map(|ad| ad.node_id).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), task.advertisements.len());
        }
    }

    #[test]
    fn fuzz_resubscribe_replaces_terms(
        first in (arb_price(), arb_units()),
        second in (arb_price(), arb_units()),
    ) {
        let mut ledger = seeded_ledger();
        let owner = actor(1);
        let task = ledger.create_task(actor(2), SecurityLevel::Standard, 0).unwrap();
        let node = ledger.register_node(owner).unwrap();

        ledger.subscribe(owner, task, node, first.0, first.1).unwrap();
        let again = ledger.subscribe(owner, task, node, second.0, second.1);
        prop_assert!(failed_with(&again, LedgerError::AlreadySubscribed));

        ledger.unsubscribe(owner, task, node, None).unwrap();
        ledger.subscribe(owner, task, node, second.0, second.1).unwrap();

        let ads = &ledger.tasks[&task].advertisements;
        prop_assert_eq!(ads.len(), 1);
        prop_assert_eq!(ads[0].price_per_unit, second.0);
        prop_assert_eq!(ads[0].max_units, second.1);
        prop_assert_eq!(check_catalog(&ledger), CatalogInvariantResult::Valid);
    }

    #[test]
    fn fuzz_deprecation_blocks_new_business(
        units in arb_units(),
        price in arb_price(),
        seed in arb_bytes32(),
        wait in 0u64..5,
    ) {
        let mut ledger = seeded_ledger();
        let owner = actor(1);
        let task = ledger.create_task(owner, SecurityLevel::Standard, 0).unwrap();
        let early = ledger.register_node(actor(2)).unwrap();
        ledger.subscribe(actor(2), task, early, price, units).unwrap();

        ledger.deprecate_task(owner, task).unwrap();
        let snapshot = ledger.clone();

        let late = ledger.register_node(actor(3)).unwrap();
        prop_assert!(failed_with(
            &ledger.subscribe(actor(3), task, late, price, units),
            LedgerError::TaskDeprecated
        ));
        prop_assert!(failed_with(
            &ledger.purchase_stack(actor(4), task, units, price, seed),
            LedgerError::TaskDeprecated
        ));
        prop_assert!(failed_with(
            &ledger.deprecate_task(owner, task),
            LedgerError::TaskAlreadyDeprecated
        ));

        ledger.advance_epochs(wait);
        let removed = ledger.remove_task(owner, task);
        if wait >= 2 {
            prop_assert!(removed.is_ok());
            prop_assert!(!ledger.tasks.contains_key(&task));
        } else {
            prop_assert!(failed_with(&removed, LedgerError::TaskRemovalGraceNotElapsed));
            prop_assert_eq!(
                check_deprecation_monotonic(&snapshot, &ledger),
                CatalogInvariantResult::Valid
            );
        }
    }

    #[test]
    fn fuzz_reputation_floor(floor in arb_minimum_reputation()) {
        let mut ledger = seeded_ledger();
        let task = ledger.create_task(actor(1), SecurityLevel::Standard, floor).unwrap();
        let node = ledger.register_node(actor(2)).unwrap();
        let reputation = ledger.nodes[&node].reputation;

        let result = ledger.subscribe(actor(2), task, node, 1, 1);
        if reputation >= floor {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(failed_with(&result, LedgerError::InsufficientReputation));
        }
    }
}

#[test]
fn test_subscriptions_cap_at_capacity() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    for _ in 0..MAX_TASK_ADVERTISEMENTS {
        let node = ledger.register_node(actor(2)).unwrap();
        ledger.subscribe(actor(2), task, node, 5, 5).unwrap();
    }
    let extra = ledger.register_node(actor(2)).unwrap();
    assert!(failed_with(
        &ledger.subscribe(actor(2), task, extra, 5, 5),
        LedgerError::TaskSubscriptionsFull
    ));
}

#[test]
fn test_disabled_node_cannot_subscribe() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let node = ledger.register_node(actor(2)).unwrap();
    ledger.disable_node(actor(2), node).unwrap();
    assert!(failed_with(
        &ledger.subscribe(actor(2), task, node, 5, 5),
        LedgerError::NodeDisabled
    ));
}

#[test]
fn test_swap_remove_invalidates_cached_index() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let nodes: Vec<u64> = (0..3)
        .map(|_| {
            let node = ledger.register_node(actor(2)).unwrap();
            ledger.subscribe(actor(2), task, node, 5, 5).unwrap();
            node
        })
        .collect();

    // Removing index 0 moves the last advertisement into slot 0
    ledger
        .unsubscribe(actor(2), task, nodes[0], Some(0))
        .unwrap();
    assert!(failed_with(
        &ledger.unsubscribe(actor(2), task, nodes[2], Some(2)),
        LedgerError::SubscriptionIndexMismatch
    ));
    ledger
        .unsubscribe(actor(2), task, nodes[2], Some(0))
        .unwrap();
    assert_eq!(ledger.tasks[&task].advertisements.len(), 1);
    assert_eq!(ledger.tasks[&task].advertisements[0].node_id, nodes[1]);
}

#[test]
fn test_release_after_node_destroyed() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let node = ledger.register_node(actor(2)).unwrap();
    ledger.subscribe(actor(2), task, node, 5, 5).unwrap();

    assert!(failed_with(
        &ledger.release_subscription(task, node),
        LedgerError::TaskStillLive
    ));

    ledger.disable_node(actor(2), node).unwrap();
    ledger.advance_epochs(4);
    ledger.destroy_node(actor(2), node).unwrap();
    ledger.release_subscription(task, node).unwrap();
    assert!(ledger.tasks[&task].advertisements.is_empty());
    assert!(ledger.subscriptions.is_empty());
}

#[test]
fn test_whitelist_limits_subscribers() {
    let mut ledger = seeded_ledger();
    let task = ledger
        .create_task(actor(1), SecurityLevel::Standard, 0)
        .unwrap();
    let listed = ledger.register_node(actor(2)).unwrap();
    let outsider = ledger.register_node(actor(3)).unwrap();

    assert!(failed_with(
        &ledger.whitelist_nodes_for_task(actor(2), task, &[listed]),
        LedgerError::UnauthorizedTaskAction
    ));
    ledger
        .whitelist_nodes_for_task(actor(1), task, &[listed])
        .unwrap();

    assert!(failed_with(
        &ledger.subscribe(actor(3), task, outsider, 5, 5),
        LedgerError::NodeNotWhitelisted
    ));
    assert!(ledger.subscriptions.is_empty());
    ledger.subscribe(actor(2), task, listed, 5, 5).unwrap();
    assert_eq!(ledger.tasks[&task].advertisements.len(), 1);
}
