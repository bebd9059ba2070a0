#![allow(unexpected_cfgs)]
//! Compute Ledger
//!
//! A marketplace ledger for decentralized compute. Nodes lock collateral and
//! advertise price and capacity on catalog tasks; clients buy prepaid stacks
//! of compute units bound to a randomly chosen eligible node; nodes settle
//! stacks by committing a proof, optionally checked by randomly sampled
//! attesters, and claim once the dispute window has passed.

use anchor_lang::prelude::*;

declare_id!("Agun2SVPcp5pWpXhF8R3LNKs44pqL9JkJfDN36pCnVaG");

pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;
pub mod utils;

use instructions::*;

#[program]
pub mod compute_ledger {
    use super::*;

    /// Create the protocol config and both treasuries.
    /// The signer becomes the protocol authority.
    ///
    /// # Arguments
    /// * `registration_collateral` - Lamports every node locks at registration
    /// * `timeout_slash_permille` - Collateral fraction slashed from idle attesters
    /// * `sampling_consensus_charge_permille` - Price multiplier for SamplingConsensus stacks (>= 1000)
    /// * `attestation_probability_permille` - Chance a settlement requests attesters
    /// * `attestation_node_count` - Attesters requested when sampling triggers
    pub fn initialize_protocol(
        ctx: Context<InitializeProtocol>,
        registration_collateral: u64,
        timeout_slash_permille: u16,
        sampling_consensus_charge_permille: u16,
        attestation_probability_permille: u16,
        attestation_node_count: u8,
    ) -> Result<()> {
        instructions::initialize_protocol::handler(
            ctx,
            registration_collateral,
            timeout_slash_permille,
            sampling_consensus_charge_permille,
            attestation_probability_permille,
            attestation_node_count,
        )
    }

    pub fn update_registration_params(
        ctx: Context<UpdateRegistrationParams>,
        registration_enabled: bool,
        registration_collateral: u64,
    ) -> Result<()> {
        instructions::update_registration_params::handler(
            ctx,
            registration_enabled,
            registration_collateral,
        )
    }

    pub fn update_settlement_params(
        ctx: Context<UpdateSettlementParams>,
        timeout_slash_permille: u16,
        sampling_consensus_charge_permille: u16,
        attestation_probability_permille: u16,
        attestation_node_count: u8,
    ) -> Result<()> {
        instructions::update_settlement_params::handler(
            ctx,
            timeout_slash_permille,
            sampling_consensus_charge_permille,
            attestation_probability_permille,
            attestation_node_count,
        )
    }

    /// Register a model name that tasks may reference.
    pub fn add_model(ctx: Context<AddModel>, name: String) -> Result<()> {
        instructions::add_model::handler(ctx, name)
    }

    /// Confiscate all of a node's collateral into the communal treasury.
    /// Authority only; used to enforce the outcome of external arbitration.
    pub fn slash_node_collateral(ctx: Context<SlashNodeCollateral>) -> Result<()> {
        instructions::slash_node_collateral::handler(ctx)
    }

    /// Register a node, locking the configured collateral from the signer.
    pub fn register_node(ctx: Context<RegisterNode>) -> Result<()> {
        instructions::register_node::handler(ctx)
    }

    /// Disable a node. Disabled nodes are never selected and cannot be re-enabled.
    pub fn disable_node(ctx: Context<DisableNode>) -> Result<()> {
        instructions::disable_node::handler(ctx)
    }

    /// Close a node disabled at least four epochs ago, returning collateral
    /// and unlocked fees to its owner.
    pub fn destroy_node(ctx: Context<DestroyNode>) -> Result<()> {
        instructions::destroy_node::handler(ctx)
    }

    /// Pay out fees accrued before the current epoch.
    pub fn withdraw_fees(ctx: Context<WithdrawFees>) -> Result<()> {
        instructions::withdraw_fees::handler(ctx)
    }

    /// Create a catalog task.
    ///
    /// # Arguments
    /// * `role` - Role tag (see `state::task_role`)
    /// * `security_level` - 0 = Standard, 1 = SamplingConsensus
    /// * `minimum_reputation` - Reputation a node needs to subscribe or be selected
    pub fn create_task(
        ctx: Context<CreateTask>,
        role: u8,
        security_level: u8,
        minimum_reputation: u8,
    ) -> Result<()> {
        instructions::create_task::handler(ctx, role, security_level, minimum_reputation)
    }

    pub fn deprecate_task(ctx: Context<DeprecateTask>) -> Result<()> {
        instructions::deprecate_task::handler(ctx)
    }

    /// Limit the task to the given nodes. Repeated calls extend the list.
    pub fn whitelist_nodes_for_task(
        ctx: Context<WhitelistNodesForTask>,
        node_ids: Vec<u64>,
    ) -> Result<()> {
        instructions::whitelist_nodes_for_task::handler(ctx, node_ids)
    }

    /// Close a task deprecated at least two epochs ago.
    pub fn remove_task(ctx: Context<RemoveTask>) -> Result<()> {
        instructions::remove_task::handler(ctx)
    }

    /// Advertise a node on a task at the given price and capacity.
    pub fn subscribe_node(
        ctx: Context<SubscribeNode>,
        price_per_unit: u64,
        max_units: u64,
    ) -> Result<()> {
        instructions::subscribe_node::handler(ctx, price_per_unit, max_units)
    }

    /// Remove a node's advertisement from a task.
    pub fn unsubscribe_node(ctx: Context<UnsubscribeNode>) -> Result<()> {
        instructions::unsubscribe_node::handler(ctx, None)
    }

    /// Remove a node's advertisement at a known index.
    /// Aborts with `SubscriptionIndexMismatch` if the index went stale.
    pub fn unsubscribe_node_by_index(ctx: Context<UnsubscribeNode>, index: u32) -> Result<()> {
        instructions::unsubscribe_node::handler(ctx, Some(index))
    }

    pub fn update_subscription(
        ctx: Context<UpdateSubscription>,
        price_per_unit: u64,
        max_units: u64,
    ) -> Result<()> {
        instructions::update_subscription::handler(ctx, price_per_unit, max_units)
    }

    /// Close a subscription marker whose task or node no longer exists.
    pub fn release_subscription(ctx: Context<ReleaseSubscription>) -> Result<()> {
        instructions::release_subscription::handler(ctx)
    }

    /// Buy a stack of compute units. Pass every advertised node account as
    /// remaining accounts, in advertisement order.
    ///
    /// # Arguments
    /// * `num_units` - Compute units to buy
    /// * `price_cap` - Highest acceptable price per unit; becomes the stack price
    /// * `client_seed` - Mixed into the node selection entropy and kept on the
    ///   stack for attester sampling at settlement
    pub fn purchase_stack(
        ctx: Context<PurchaseStack>,
        num_units: u64,
        price_cap: u64,
        client_seed: [u8; 32],
    ) -> Result<()> {
        instructions::purchase_stack::handler(ctx, num_units, price_cap, client_seed)
    }

    /// Open the settlement ticket for a stack served by the signer's node.
    pub fn try_settle(
        ctx: Context<TrySettle>,
        claimed_units: u64,
        proof: [u8; 32],
        leaf: [u8; 32],
    ) -> Result<()> {
        instructions::try_settle::handler(ctx, claimed_units, proof, leaf)
    }

    /// Submit an attester's proof and leaf for a ticket.
    pub fn submit_attestation(
        ctx: Context<SubmitAttestation>,
        proof: [u8; 32],
        leaf: [u8; 32],
    ) -> Result<()> {
        instructions::submit_attestation::handler(ctx, proof, leaf)
    }

    /// Dispute a ticket as one of its requested attesters.
    pub fn start_dispute(ctx: Context<StartDispute>, competing_proof: [u8; 32]) -> Result<()> {
        instructions::start_dispute::handler(ctx, competing_proof)
    }

    /// Settle undisputed tickets whose window has passed: pay attesters,
    /// slash idle ones, refund buyers, and close tickets and stacks.
    pub fn claim_funds<'info>(
        ctx: Context<'_, '_, 'info, 'info, ClaimFunds<'info>>,
        ticket_ids: Vec<u64>,
    ) -> Result<()> {
        instructions::claim_funds::handler(ctx, ticket_ids)
    }

    /// Collect the signer's attester reward (or slash) on settled tickets.
    pub fn claim_funds_for_attestation<'info>(
        ctx: Context<'_, '_, 'info, 'info, ClaimFundsForAttestation<'info>>,
        ticket_ids: Vec<u64>,
    ) -> Result<()> {
        instructions::claim_funds_for_attestation::handler(ctx, ticket_ids)
    }
}
