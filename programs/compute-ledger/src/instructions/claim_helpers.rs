//! Claim accounting shared by `claim_funds` and
//! `claim_funds_for_attestation`.
//!
//! A stack's prepayment is `total_units * price * charge / 1000`. On claim it
//! splits into three parts that always sum back to the prepayment:
//!
//! * `refund` = prepaid - cost(claimed), returned to the stack owner
//! * one `attester_share` per requested attester that attested, taken from
//!   the surcharge pool `cost(claimed) - claimed * price`
//! * the node reward: everything else, including shares of attesters that
//!   never attested and the rounding remainder of the pool

use crate::errors::LedgerError;
use crate::events::{slash_reason, AttesterSettled, NodeSlashed};
use crate::state::{Node, Stack};
use anchor_lang::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSplit {
    /// Cost of the claimed units at the stack's locked terms
    pub claimed_total: u64,
    /// `claimed * price`, before any surcharge
    pub claimed_base: u64,
    /// Paid to each attester that attested
    pub attester_share: u64,
    /// Returned to the stack owner
    pub refund: u64,
}

impl ClaimSplit {
    /// Node reward once `paid_attesters` shares have been carved out
    pub fn node_reward(&self, paid_attesters: usize) -> Result<u64> {
        let paid = self
            .attester_share
            .checked_mul(paid_attesters as u64)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.claimed_total
            .checked_sub(paid)
            .ok_or(LedgerError::ArithmeticOverflow.into())
    }
}

pub fn calculate_claim_split(
    stack: &Stack,
    claimed_units: u64,
    requested_attesters: usize,
) -> Result<ClaimSplit> {
    require!(
        claimed_units <= stack.total_units,
        LedgerError::ClaimedUnitsExceedTotal
    );
    let claimed_total = stack.cost_of(claimed_units)?;
    let claimed_base = claimed_units
        .checked_mul(stack.price_per_unit)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    let refund = stack
        .prepaid
        .checked_sub(claimed_total)
        .ok_or(LedgerError::ArithmeticOverflow)?;

    let attester_share = if requested_attesters == 0 {
        0
    } else {
        let pool = claimed_total
            .checked_sub(claimed_base)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        pool / requested_attesters as u64
    };

    Ok(ClaimSplit {
        claimed_total,
        claimed_base,
        attester_share,
        refund,
    })
}

/// What happened to one attester at claim time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttesterSettlement {
    Rewarded(u64),
    Slashed(u64),
}

/// Pay an attester that attested, or timeout-slash one that did not.
///
/// Rewards accrue to the attester's fee ledger. Returns the outcome so the
/// caller can move slashed lamports into the communal treasury.
pub fn settle_attester(
    attester: &mut Node,
    attested: bool,
    share: u64,
    timeout_slash_permille: u16,
    epoch: u64,
) -> Result<AttesterSettlement> {
    if attested {
        attester.fees.accrue(share, epoch)?;
        Ok(AttesterSettlement::Rewarded(share))
    } else {
        let slashed = attester.slash_timeout(timeout_slash_permille)?;
        Ok(AttesterSettlement::Slashed(slashed))
    }
}

/// Emit the events describing an attester settlement
pub fn emit_attester_settled(
    ticket_id: u64,
    attester: &Node,
    outcome: AttesterSettlement,
    epoch: u64,
) {
    let (rewarded, slashed) = match outcome {
        AttesterSettlement::Rewarded(amount) => (amount, 0),
        AttesterSettlement::Slashed(amount) => (0, amount),
    };
    if slashed > 0 {
        emit!(NodeSlashed {
            node_id: attester.id,
            amount: slashed,
            remaining_collateral: attester.collateral,
            reputation: attester.reputation,
            reason: slash_reason::ATTESTATION_TIMEOUT,
            epoch,
        });
    }
    emit!(AttesterSettled {
        ticket_id,
        attester_node_id: attester.id,
        rewarded,
        slashed,
        epoch,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SecurityLevel;

    fn stack(units: u64, price: u64, charge: u16) -> Stack {
        Stack {
            total_units: units,
            price_per_unit: price,
            charge_permille: charge,
            security_level: if charge == 1000 {
                SecurityLevel::Standard
            } else {
                SecurityLevel::SamplingConsensus
            },
            prepaid: Stack::charge_for(units, price, charge).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_standard_full_claim() {
        let split = calculate_claim_split(&stack(10, 7, 1000), 10, 0).unwrap();
        assert_eq!(split.claimed_total, 70);
        assert_eq!(split.refund, 0);
        assert_eq!(split.attester_share, 0);
        assert_eq!(split.node_reward(0).unwrap(), 70);
    }

    #[test]
    fn test_standard_partial_claim_refunds_remainder() {
        let split = calculate_claim_split(&stack(10, 7, 1000), 4, 0).unwrap();
        assert_eq!(split.refund, 6 * 7);
        assert_eq!(split.node_reward(0).unwrap(), 28);
    }

    #[test]
    fn test_consensus_pool_divides_among_attesters() {
        // prepaid 140, base 70, pool 70 split three ways
        let split = calculate_claim_split(&stack(10, 7, 2000), 10, 3).unwrap();
        assert_eq!(split.claimed_base, 70);
        assert_eq!(split.attester_share, 23);
        assert_eq!(split.refund, 0);
        // two attested: node keeps base, one unpaid share and the remainder
        assert_eq!(split.node_reward(2).unwrap(), 140 - 46);
    }

    #[test]
    fn test_consensus_without_attesters_pays_node_everything() {
        let split = calculate_claim_split(&stack(10, 7, 2000), 5, 0).unwrap();
        assert_eq!(split.claimed_total, 70);
        assert_eq!(split.refund, 70);
        assert_eq!(split.node_reward(0).unwrap(), 70);
    }

    #[test]
    fn test_split_conserves_prepayment() {
        for claimed in 0..=13u64 {
            for requested in 0..=4usize {
                let s = stack(13, 9, 1750);
                let split = calculate_claim_split(&s, claimed, requested).unwrap();
                for paid in 0..=requested {
                    let total = split.refund
                        + split.node_reward(paid).unwrap()
                        + split.attester_share * paid as u64;
                    assert_eq!(total, s.prepaid);
                }
            }
        }
    }

    #[test]
    fn test_claim_above_total_rejected() {
        assert!(calculate_claim_split(&stack(10, 7, 1000), 11, 0).is_err());
    }

    #[test]
    fn test_settle_attester_reward_and_slash() {
        let mut honest = Node::new(2, Pubkey::new_unique(), 1_000, 0, 0);
        let outcome = settle_attester(&mut honest, true, 23, 100, 5).unwrap();
        assert_eq!(outcome, AttesterSettlement::Rewarded(23));
        assert_eq!(honest.fees.current_epoch_amount, 23);
        assert_eq!(honest.collateral, 1_000);

        let mut idle = Node::new(3, Pubkey::new_unique(), 1_000, 0, 0);
        let outcome = settle_attester(&mut idle, false, 23, 100, 5).unwrap();
        assert_eq!(outcome, AttesterSettlement::Slashed(100));
        assert_eq!(idle.collateral, 900);
        assert_eq!(idle.fees.outstanding().unwrap(), 0);
    }
}
