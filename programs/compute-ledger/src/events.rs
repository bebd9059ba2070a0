//! Events emitted by the compute ledger
//!
//! Every state transition emits one record for off-chain indexers.

use anchor_lang::prelude::*;

/// Emitted once when the protocol config and treasuries are created
#[event]
pub struct ProtocolInitialized {
    pub authority: Pubkey,
    pub registration_collateral: u64,
    pub timeout_slash_permille: u16,
    pub sampling_consensus_charge_permille: u16,
    pub attestation_probability_permille: u16,
    pub attestation_node_count: u8,
    pub epoch: u64,
}

/// Emitted when the authority changes any protocol parameter
#[event]
pub struct ProtocolParamsUpdated {
    pub registration_enabled: bool,
    pub registration_collateral: u64,
    pub timeout_slash_permille: u16,
    pub sampling_consensus_charge_permille: u16,
    pub attestation_probability_permille: u16,
    pub attestation_node_count: u8,
    pub epoch: u64,
}

#[event]
pub struct ModelAdded {
    pub name: String,
    pub model: Pubkey,
    pub epoch: u64,
}

// ============================================================================
// Node Registry
// ============================================================================

#[event]
pub struct NodeRegistered {
    pub node_id: u64,
    pub owner: Pubkey,
    pub collateral: u64,
    pub epoch: u64,
}

#[event]
pub struct NodeDisabled {
    pub node_id: u64,
    pub epoch: u64,
}

#[event]
pub struct NodeDestroyed {
    pub node_id: u64,
    pub owner: Pubkey,
    pub collateral_returned: u64,
    pub fees_withdrawn: u64,
    pub epoch: u64,
}

#[event]
pub struct NodeFeesWithdrawn {
    pub node_id: u64,
    pub amount: u64,
    pub epoch: u64,
}

/// Emitted whenever collateral moves into the communal treasury
#[event]
pub struct NodeSlashed {
    pub node_id: u64,
    pub amount: u64,
    pub remaining_collateral: u64,
    pub reputation: u8,
    pub reason: u8,
    pub epoch: u64,
}

/// Reason codes carried by [`NodeSlashed`]
pub mod slash_reason {
    /// Requested attester never attested
    pub const ATTESTATION_TIMEOUT: u8 = 0;
    /// Full confiscation ordered by the protocol authority
    pub const AUTHORITY: u8 = 1;
}

// ============================================================================
// Task Catalog
// ============================================================================

#[event]
pub struct TaskCreated {
    pub task_id: u64,
    pub owner: Pubkey,
    pub role: u8,
    pub model: Option<Pubkey>,
    pub security_level: u8,
    pub minimum_reputation: u8,
    pub epoch: u64,
}

#[event]
pub struct TaskDeprecated {
    pub task_id: u64,
    pub epoch: u64,
}

#[event]
pub struct TaskWhitelistUpdated {
    pub task_id: u64,
    pub node_ids: Vec<u64>,
    pub whitelist_len: u8,
    pub epoch: u64,
}

#[event]
pub struct TaskRemoved {
    pub task_id: u64,
    pub epoch: u64,
}

#[event]
pub struct NodeSubscribed {
    pub task_id: u64,
    pub node_id: u64,
    pub price_per_unit: u64,
    pub max_units: u64,
    pub epoch: u64,
}

#[event]
pub struct NodeUnsubscribed {
    pub task_id: u64,
    pub node_id: u64,
    pub epoch: u64,
}

#[event]
pub struct SubscriptionUpdated {
    pub task_id: u64,
    pub node_id: u64,
    pub price_per_unit: u64,
    pub max_units: u64,
    pub epoch: u64,
}

// ============================================================================
// Stacks and Settlement
// ============================================================================

#[event]
pub struct StackPurchased {
    pub stack_id: u64,
    pub task_id: u64,
    pub owner: Pubkey,
    pub node_id: u64,
    pub total_units: u64,
    pub price_per_unit: u64,
    pub prepaid: u64,
    pub eligible_nodes: u8,
    pub epoch: u64,
}

#[event]
pub struct SettlementTicketOpened {
    pub ticket_id: u64,
    pub stack_id: u64,
    pub node_id: u64,
    pub claimed_units: u64,
    pub proof: [u8; 32],
    pub attesters: Vec<u64>,
    pub dispute_deadline: u64,
    pub epoch: u64,
}

#[event]
pub struct AttestationSubmitted {
    pub ticket_id: u64,
    pub attester_node_id: u64,
    pub remaining: u8,
    pub epoch: u64,
}

/// Emitted when every requested attester agreed with the committed proof
#[event]
pub struct SettlementAttested {
    pub ticket_id: u64,
    pub stack_id: u64,
    pub node_id: u64,
    pub epoch: u64,
}

/// Carries both sides of a disagreement for external arbitration
#[event]
pub struct DisputeStarted {
    pub ticket_id: u64,
    pub stack_id: u64,
    pub accuser_node_id: u64,
    pub asserter_node_id: u64,
    pub committed_proof: [u8; 32],
    pub competing_proof: [u8; 32],
    pub epoch: u64,
}

// ============================================================================
// Claims
// ============================================================================

#[event]
pub struct FundsClaimed {
    pub ticket_id: u64,
    pub stack_id: u64,
    pub node_id: u64,
    pub node_reward: u64,
    pub attester_share: u64,
    pub refund: u64,
    pub epoch: u64,
}

#[event]
pub struct AttesterSettled {
    pub ticket_id: u64,
    pub attester_node_id: u64,
    pub rewarded: u64,
    pub slashed: u64,
    pub epoch: u64,
}
