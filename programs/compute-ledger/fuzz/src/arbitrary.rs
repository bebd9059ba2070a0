//! Arbitrary input generators for fuzz testing
//!
//! Generates random but well-formed inputs for ledger operations. Object
//! references are small indices that the runner resolves against whatever
//! nodes, tasks and stacks exist at that point of the sequence.

use compute_ledger::state::{SecurityLevel, MAX_ATTESTERS};
use proptest::prelude::*;

/// Arbitrary 32-byte value (client seed, proof, leaf)
pub fn arb_bytes32() -> impl Strategy<Value = [u8; 32]> {
    prop::array::uniform32(any::<u8>())
}

/// Price per unit with edge cases
pub fn arb_price() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(1u64),
        Just(1_000u64),
        1u64..100u64,
        100u64..1_000_000u64,
    ]
}

/// Unit counts. Kept small enough that wallets can pay for them.
pub fn arb_units() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), Just(1_000u64), 1u64..500u64, 500u64..50_000u64,]
}

/// Any permille in 0..=1000
pub fn arb_permille() -> impl Strategy<Value = u16> {
    prop_oneof![Just(0u16), Just(1u16), Just(999u16), Just(1000u16), 0u16..=1000u16,]
}

/// Consensus charge multiplier, never below 1000
pub fn arb_charge_permille() -> impl Strategy<Value = u16> {
    prop_oneof![Just(1000u16), Just(2000u16), 1000u16..=5000u16,]
}

pub fn arb_attester_count() -> impl Strategy<Value = u8> {
    0u8..=(MAX_ATTESTERS as u8)
}

pub fn arb_security_level() -> impl Strategy<Value = SecurityLevel> {
    prop_oneof![
        Just(SecurityLevel::Standard),
        Just(SecurityLevel::SamplingConsensus),
    ]
}

/// Reputation floors biased toward the range nodes actually start in
pub fn arb_minimum_reputation() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0u8), Just(100u8), Just(101u8), Just(255u8), 0u8..=120u8,]
}

pub fn arb_collateral() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), Just(1u64), Just(1_000_000_000u64), 1u64..10_000_000u64,]
}

/// Settlement parameters accepted by `update_settlement_params`
#[derive(Debug, Clone, Copy)]
pub struct SettlementParams {
    pub timeout_slash_permille: u16,
    pub sampling_consensus_charge_permille: u16,
    pub attestation_probability_permille: u16,
    pub attestation_node_count: u8,
}

impl Arbitrary for SettlementParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            arb_permille(),
            arb_charge_permille(),
            arb_permille(),
            arb_attester_count(),
        )
            .prop_map(
                |(
                    timeout_slash_permille,
                    sampling_consensus_charge_permille,
                    attestation_probability_permille,
                    attestation_node_count,
                )| SettlementParams {
                    timeout_slash_permille,
                    sampling_consensus_charge_permille,
                    attestation_probability_permille,
                    attestation_node_count,
                },
            )
            .boxed()
    }
}

/// One step of a random operation sequence.
///
/// `u8` fields pick an actor wallet or an existing object by index.
#[derive(Debug, Clone)]
pub enum LedgerAction {
    RegisterNode {
        owner: u8,
    },
    DisableNode {
        node: u8,
    },
    DestroyNode {
        node: u8,
    },
    WithdrawFees {
        node: u8,
    },
    SlashNode {
        node: u8,
    },
    CreateTask {
        owner: u8,
        security_level: SecurityLevel,
        minimum_reputation: u8,
    },
    DeprecateTask {
        task: u8,
    },
    RemoveTask {
        task: u8,
    },
    WhitelistNodes {
        task: u8,
        nodes: Vec<u8>,
    },
    Subscribe {
        task: u8,
        node: u8,
        price_per_unit: u64,
        max_units: u64,
    },
    Unsubscribe {
        task: u8,
        node: u8,
    },
    UpdateSubscription {
        task: u8,
        node: u8,
        price_per_unit: u64,
        max_units: u64,
    },
    PurchaseStack {
        buyer: u8,
        task: u8,
        units: u64,
        price_cap: u64,
        client_seed: [u8; 32],
    },
    TrySettle {
        stack: u8,
        claimed_permille: u16,
        honest: bool,
    },
    SubmitAttestation {
        stack: u8,
        attester: u8,
        honest: bool,
    },
    StartDispute {
        stack: u8,
        attester: u8,
    },
    ClaimFunds {
        stack: u8,
    },
    ClaimForAttestation {
        stack: u8,
        attester: u8,
    },
    AdvanceEpoch {
        epochs: u8,
    },
}

pub fn arb_action() -> impl Strategy<Value = LedgerAction> {
    prop_oneof![
        3 => any::<u8>().prop_map(|owner| LedgerAction::RegisterNode { owner }),
        1 => any::<u8>().prop_map(|node| LedgerAction::DisableNode { node }),
        1 => any::<u8>().prop_map(|node| LedgerAction::DestroyNode { node }),
        1 => any::<u8>().prop_map(|node| LedgerAction::WithdrawFees { node }),
        1 => any::<u8>().prop_map(|node| LedgerAction::SlashNode { node }),
        2 => (any::<u8>(), arb_security_level(), arb_minimum_reputation()).prop_map(
            |(owner, security_level, minimum_reputation)| LedgerAction::CreateTask {
                owner,
                security_level,
                minimum_reputation,
            }
        ),
        1 => any::<u8>().prop_map(|task| LedgerAction::DeprecateTask { task }),
        1 => any::<u8>().prop_map(|task| LedgerAction::RemoveTask { task }),
        1 => (any::<u8>(), prop::collection::vec(any::<u8>(), 1..4))
            .prop_map(|(task, nodes)| LedgerAction::WhitelistNodes { task, nodes }),
        4 => (any::<u8>(), any::<u8>(), arb_price(), arb_units()).prop_map(
            |(task, node, price_per_unit, max_units)| LedgerAction::Subscribe {
                task,
                node,
                price_per_unit,
                max_units,
            }
        ),
        1 => (any::<u8>(), any::<u8>())
            .prop_map(|(task, node)| LedgerAction::Unsubscribe { task, node }),
        1 => (any::<u8>(), any::<u8>(), arb_price(), arb_units()).prop_map(
            |(task, node, price_per_unit, max_units)| LedgerAction::UpdateSubscription {
                task,
                node,
                price_per_unit,
                max_units,
            }
        ),
        4 => (any::<u8>(), any::<u8>(), arb_units(), arb_price(), arb_bytes32()).prop_map(
            |(buyer, task, units, price_cap, client_seed)| LedgerAction::PurchaseStack {
                buyer,
                task,
                units,
                price_cap,
                client_seed,
            }
        ),
        4 => (any::<u8>(), 0u16..=1000u16, any::<bool>()).prop_map(
            |(stack, claimed_permille, honest)| LedgerAction::TrySettle {
                stack,
                claimed_permille,
                honest,
            }
        ),
        3 => (any::<u8>(), any::<u8>(), prop::bool::weighted(0.9)).prop_map(
            |(stack, attester, honest)| LedgerAction::SubmitAttestation {
                stack,
                attester,
                honest,
            }
        ),
        1 => (any::<u8>(), any::<u8>())
            .prop_map(|(stack, attester)| LedgerAction::StartDispute { stack, attester }),
        3 => any::<u8>().prop_map(|stack| LedgerAction::ClaimFunds { stack }),
        2 => (any::<u8>(), any::<u8>())
            .prop_map(|(stack, attester)| LedgerAction::ClaimForAttestation { stack, attester }),
        3 => (1u8..=5u8).prop_map(|epochs| LedgerAction::AdvanceEpoch { epochs }),
    ]
}

pub fn arb_action_sequence(max_len: usize) -> impl Strategy<Value = Vec<LedgerAction>> {
    prop::collection::vec(arb_action(), 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_arb_charge_never_below_base(charge in arb_charge_permille()) {
            prop_assert!(charge >= 1000);
        }

        #[test]
        fn test_arb_permille_within_bounds(permille in arb_permille()) {
            prop_assert!(permille <= 1000);
        }

        #[test]
        fn test_arb_price_nonzero(price in arb_price()) {
            prop_assert!(price > 0);
        }

        #[test]
        fn test_settlement_params_accepted(params in any::<SettlementParams>()) {
            prop_assert!(compute_ledger::state::ProtocolConfig::validate_settlement_params(
                params.timeout_slash_permille,
                params.sampling_consensus_charge_permille,
                params.attestation_probability_permille,
                params.attestation_node_count,
            )
            .is_ok());
        }
    }
}
