//! Ledger invariant checks for fuzz testing
//!
//! Each check inspects a [`SimulatedLedger`] snapshot and reports the first
//! violation it finds.

use crate::scenarios::SimulatedLedger;
use compute_ledger::instructions::claim_helpers::calculate_claim_split;
use compute_ledger::state::{
    SettlementTicket, Stack, Task, MAX_ATTESTERS, MAX_TASK_ADVERTISEMENTS, PROOF_SIZE,
};
use std::collections::HashSet;

/// Lamport and treasury accounting results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundsInvariantResult {
    Valid,
    /// Lamports appeared or vanished
    ConservationViolation { expected: u128, actual: u128 },
    /// Fee treasury does not match what it owes
    FeeTreasuryMismatch { balance: u64, obligations: u128 },
    /// Treasury balance disagrees with its running totals
    TreasuryTotalsMismatch {
        balance: u64,
        deposited: u64,
        withdrawn: u64,
    },
    /// A stack's prepayment is not what its terms charge
    PrepaymentMismatch { stack_id: u64, prepaid: u64 },
}

/// Settlement ticket results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketInvariantResult {
    Valid,
    TooManyAttesters { stack_id: u64, count: usize },
    DuplicateAttester { stack_id: u64, node_id: u64 },
    LeafBufferSize { stack_id: u64, len: usize },
    /// A mask bit is set for a slot that does not exist
    StrayMaskBit { stack_id: u64, mask: u8 },
    ClaimExceedsTotal { stack_id: u64, claimed: u64, total: u64 },
    /// Ticket without a settling stack, or the reverse
    OrphanTicket { stack_id: u64 },
    StackNotSettling { stack_id: u64 },
}

/// Task catalog results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogInvariantResult {
    Valid,
    DuplicateAdvertisement { task_id: u64, node_id: u64 },
    TooManyAdvertisements { task_id: u64, count: usize },
    /// Advertisement without a subscription marker
    MissingMarker { task_id: u64, node_id: u64 },
    DeprecationReverted { task_id: u64 },
    DuplicateWhitelistEntry { task_id: u64, node_id: u64 },
}

// ============================================================================
// Funds
// ============================================================================

/// Total lamports never change across operations
pub fn check_lamport_conservation(
    ledger: &SimulatedLedger,
    expected: u128,
) -> FundsInvariantResult {
    let actual = ledger.total_lamports();
    if actual != expected {
        FundsInvariantResult::ConservationViolation { expected, actual }
    } else {
        FundsInvariantResult::Valid
    }
}

/// Attester shares already credited through early attester claims on a
/// ticket that is still open
fn early_shares(ticket: &SettlementTicket, stack: &Stack) -> u128 {
    let Ok(split) = calculate_claim_split(stack, ticket.claimed_units, ticket.attesters.len())
    else {
        return 0;
    };
    let paid = (0..ticket.attesters.len())
        .filter(|slot| ticket.is_settled(*slot) && ticket.is_attested(*slot))
        .count();
    u128::from(split.attester_share) * paid as u128
}

/// The fee treasury holds exactly the prepayments of open stacks plus every
/// node's outstanding fees, less shares credited ahead of the primary claim.
pub fn check_fee_treasury_solvency(ledger: &SimulatedLedger) -> FundsInvariantResult {
    let prepaid: u128 = ledger.stacks.values().map(|s| u128::from(s.prepaid)).sum();
    let owed: u128 = ledger
        .nodes
        .values()
        .map(|n| u128::from(n.fees.current_epoch_amount) + u128::from(n.fees.withdrawable))
        .sum();
    let credited: u128 = ledger
        .tickets
        .iter()
        .filter_map(|(stack_id, ticket)| {
            ledger
                .stacks
                .get(stack_id)
                .map(|stack| early_shares(ticket, stack))
        })
        .sum();

    let obligations = (prepaid + owed).saturating_sub(credited);
    let balance = ledger.fee_treasury.balance;
    if u128::from(balance) != obligations {
        return FundsInvariantResult::FeeTreasuryMismatch {
            balance,
            obligations,
        };
    }
    FundsInvariantResult::Valid
}

pub fn check_treasury_totals(ledger: &SimulatedLedger) -> FundsInvariantResult {
    for treasury in [&ledger.fee_treasury, &ledger.communal_treasury] {
        let expected = treasury
            .total_deposited
            .checked_sub(treasury.total_withdrawn);
        if expected != Some(treasury.balance) {
            return FundsInvariantResult::TreasuryTotalsMismatch {
                balance: treasury.balance,
                deposited: treasury.total_deposited,
                withdrawn: treasury.total_withdrawn,
            };
        }
    }
    FundsInvariantResult::Valid
}

pub fn check_stack_prepayments(ledger: &SimulatedLedger) -> FundsInvariantResult {
    for stack in ledger.stacks.values() {
        let expected =
            Stack::charge_for(stack.total_units, stack.price_per_unit, stack.charge_permille);
        if expected.ok() != Some(stack.prepaid) {
            return FundsInvariantResult::PrepaymentMismatch {
                stack_id: stack.id,
                prepaid: stack.prepaid,
            };
        }
    }
    FundsInvariantResult::Valid
}

// ============================================================================
// Settlement tickets
// ============================================================================

fn slot_mask(slots: usize) -> u8 {
    if slots >= 8 {
        u8::MAX
    } else {
        (1u8 << slots) - 1
    }
}

pub fn check_ticket(ticket: &SettlementTicket, stack: Option<&Stack>) -> TicketInvariantResult {
    let stack_id = ticket.stack_id;
    let count = ticket.attesters.len();
    if count > MAX_ATTESTERS {
        return TicketInvariantResult::TooManyAttesters { stack_id, count };
    }
    let mut seen = HashSet::new();
    for node_id in &ticket.attesters {
        if !seen.insert(*node_id) {
            return TicketInvariantResult::DuplicateAttester {
                stack_id,
                node_id: *node_id,
            };
        }
    }
    if ticket.leaf_buffer.len() != count + 1 {
        return TicketInvariantResult::LeafBufferSize {
            stack_id,
            len: ticket.leaf_buffer.len(),
        };
    }
    for mask in [ticket.attested_mask, ticket.settled_mask] {
        if mask & !slot_mask(count) != 0 {
            return TicketInvariantResult::StrayMaskBit { stack_id, mask };
        }
    }
    let Some(stack) = stack else {
        return TicketInvariantResult::OrphanTicket { stack_id };
    };
    if !stack.in_settlement {
        return TicketInvariantResult::StackNotSettling { stack_id };
    }
    if ticket.claimed_units > stack.total_units {
        return TicketInvariantResult::ClaimExceedsTotal {
            stack_id,
            claimed: ticket.claimed_units,
            total: stack.total_units,
        };
    }
    TicketInvariantResult::Valid
}

pub fn check_tickets(ledger: &SimulatedLedger) -> TicketInvariantResult {
    for (stack_id, ticket) in &ledger.tickets {
        let result = check_ticket(ticket, ledger.stacks.get(stack_id));
        if result != TicketInvariantResult::Valid {
            return result;
        }
    }
    for stack in ledger.stacks.values() {
        if stack.in_settlement && !ledger.tickets.contains_key(&stack.id) {
            return TicketInvariantResult::OrphanTicket { stack_id: stack.id };
        }
    }
    TicketInvariantResult::Valid
}

/// Segment 0 still holds the asserting node's leaf
pub fn check_asserter_leaf(ticket: &SettlementTicket, leaf: &[u8; PROOF_SIZE]) -> bool {
    ticket.leaf_buffer.first() == Some(leaf)
}

// ============================================================================
// Task catalog
// ============================================================================

pub fn check_task(task: &Task, ledger: &SimulatedLedger) -> CatalogInvariantResult {
    let task_id = task.id;
    if task.advertisements.len() > MAX_TASK_ADVERTISEMENTS {
        return CatalogInvariantResult::TooManyAdvertisements {
            task_id,
            count: task.advertisements.len(),
        };
    }
    let mut seen = HashSet::new();
    for ad in &task.advertisements {
        if !seen.insert(ad.node_id) {
            return CatalogInvariantResult::DuplicateAdvertisement {
                task_id,
                node_id: ad.node_id,
            };
        }
        if !ledger.subscriptions.contains_key(&(task_id, ad.node_id)) {
            return CatalogInvariantResult::MissingMarker {
                task_id,
                node_id: ad.node_id,
            };
        }
    }
    let mut listed = HashSet::new();
    for node_id in &task.whitelist {
        if !listed.insert(*node_id) {
            return CatalogInvariantResult::DuplicateWhitelistEntry {
                task_id,
                node_id: *node_id,
            };
        }
    }
    CatalogInvariantResult::Valid
}

pub fn check_catalog(ledger: &SimulatedLedger) -> CatalogInvariantResult {
    for task in ledger.tasks.values() {
        let result = check_task(task, ledger);
        if result != CatalogInvariantResult::Valid {
            return result;
        }
    }
    CatalogInvariantResult::Valid
}

/// Deprecation is one-way
pub fn check_deprecation_monotonic(
    before: &SimulatedLedger,
    after: &SimulatedLedger,
) -> CatalogInvariantResult {
    for (task_id, task) in &before.tasks {
        if let (Some(_), Some(now)) = (task.deprecated_at, after.tasks.get(task_id)) {
            if now.deprecated_at != task.deprecated_at {
                return CatalogInvariantResult::DeprecationReverted { task_id: *task_id };
            }
        }
    }
    CatalogInvariantResult::Valid
}

/// Every ledger-wide invariant, as readable violations
pub fn ledger_violations(ledger: &SimulatedLedger, expected_lamports: u128) -> Vec<String> {
    let mut violations = Vec::new();
    for result in [
        check_lamport_conservation(ledger, expected_lamports),
        check_fee_treasury_solvency(ledger),
        check_treasury_totals(ledger),
        check_stack_prepayments(ledger),
    ] {
        if result != FundsInvariantResult::Valid {
            violations.push(format!("{:?}", result));
        }
    }
    let tickets = check_tickets(ledger);
    if tickets != TicketInvariantResult::Valid {
        violations.push(format!("{:?}", tickets));
    }
    let catalog = check_catalog(ledger);
    if catalog != CatalogInvariantResult::Valid {
        violations.push(format!("{:?}", catalog));
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::actor;
    use compute_ledger::state::SecurityLevel;

    #[test]
    fn test_fresh_ledger_is_valid() {
        let ledger = SimulatedLedger::with_defaults();
        assert!(ledger_violations(&ledger, 0).is_empty());
    }

    #[test]
    fn test_conservation_detects_minted_lamports() {
        let mut ledger = SimulatedLedger::with_defaults();
        ledger.fund(actor(1), 10);
        assert_eq!(
            check_lamport_conservation(&ledger, 0),
            FundsInvariantResult::ConservationViolation {
                expected: 0,
                actual: 10
            }
        );
    }

    #[test]
    fn test_solvency_detects_unbacked_fees() {
        let mut ledger = SimulatedLedger::with_defaults();
        ledger.fund(actor(1), 10_000_000_000);
        let node = ledger.register_node(actor(1)).unwrap();
        ledger
            .nodes
            .get_mut(&node)
            .unwrap()
            .fees
            .accrue(5, 0)
            .unwrap();
        assert!(matches!(
            check_fee_treasury_solvency(&ledger),
            FundsInvariantResult::FeeTreasuryMismatch { .. }
        ));
    }

    #[test]
    fn test_catalog_detects_missing_marker() {
        let mut ledger = SimulatedLedger::with_defaults();
        let task = ledger
            .create_task(actor(0), SecurityLevel::Standard, 0)
            .unwrap();
        ledger
            .tasks
            .get_mut(&task)
            .unwrap()
            .subscribe(7, 1, 1)
            .unwrap();
        assert_eq!(
            check_catalog(&ledger),
            CatalogInvariantResult::MissingMarker {
                task_id: task,
                node_id: 7
            }
        );
    }

    #[test]
    fn test_slot_mask() {
        assert_eq!(slot_mask(0), 0);
        assert_eq!(slot_mask(3), 0b111);
        assert_eq!(slot_mask(8), u8::MAX);
    }
}
