//! Open the settlement ticket for a stack

use crate::errors::LedgerError;
use crate::events::SettlementTicketOpened;
use crate::instructions::account_helpers::load_account;
use crate::instructions::selection_helpers::{
    eligible_node_ids, load_candidates, sample_attesters, sampling_trial, EligibilityFilter,
};
use crate::state::{
    Node, ProtocolConfig, SecurityLevel, SettlementTicket, Stack, Task, PROOF_SIZE,
};
use crate::utils::entropy::{Entropy, SETTLEMENT_DOMAIN, SLOT_HASHES_ID};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct TrySettle<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        seeds = [b"node", node.id.to_le_bytes().as_ref()],
        bump = node.bump,
        has_one = owner @ LedgerError::UnauthorizedNode
    )]
    pub node: Account<'info, Node>,

    #[account(
        mut,
        seeds = [b"stack", stack.id.to_le_bytes().as_ref()],
        bump = stack.bump
    )]
    pub stack: Account<'info, Stack>,

    /// CHECK: task PDA of the stack, possibly removed since purchase
    #[account(
        seeds = [b"task", stack.task_id.to_le_bytes().as_ref()],
        bump
    )]
    pub task: UncheckedAccount<'info>,

    /// One ticket per stack: a second `try_settle` fails here
    #[account(
        init,
        payer = owner,
        space = SettlementTicket::SIZE,
        seeds = [b"ticket", stack.id.to_le_bytes().as_ref()],
        bump
    )]
    pub ticket: Account<'info, SettlementTicket>,

    #[account(mut)]
    pub owner: Signer<'info>,

    /// CHECK: SlotHashes sysvar, parsed by `Entropy::from_slot_hashes`
    #[account(address = SLOT_HASHES_ID)]
    pub slot_hashes: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
}

/// `remaining_accounts`: for SamplingConsensus stacks whose task still
/// exists, the node account of every advertisement in advertisement order.
/// They are only read when the sampling trial succeeds.
///
/// Sampling entropy mixes the latest slot hash with the ticket id and the
/// seed the buyer committed at purchase. The settling node supplies no
/// entropy of its own, so it can only bias the sample by choosing the slot
/// it lands in.
pub fn handler(
    ctx: Context<TrySettle>,
    claimed_units: u64,
    proof: [u8; PROOF_SIZE],
    leaf: [u8; PROOF_SIZE],
) -> Result<()> {
    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;

    let node = &ctx.accounts.node;
    let stack = &mut ctx.accounts.stack;
    require!(stack.node_id == node.id, LedgerError::NotSelectedNode);
    stack.begin_settlement(claimed_units)?;

    let ticket_id = config.allocate_ticket_id()?;

    let attesters = if stack.security_level == SecurityLevel::SamplingConsensus {
        let mut entropy = Entropy::from_slot_hashes(
            &ctx.accounts.slot_hashes,
            &stack.purchase_seed,
            SETTLEMENT_DOMAIN,
            ticket_id,
        )?;
        if config.attestation_node_count > 0
            && sampling_trial(config.attestation_probability_permille, &mut entropy)
        {
            let pool = attester_pool(&ctx.accounts.task, ctx.remaining_accounts, &**stack)?;
            sample_attesters(
                pool,
                usize::from(config.attestation_node_count),
                &mut entropy,
            )
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    let epoch = Clock::get()?.epoch;
    let ticket = &mut ctx.accounts.ticket;
    ticket.open(
        ticket_id,
        &**stack,
        claimed_units,
        attesters,
        proof,
        leaf,
        epoch,
        ctx.bumps.ticket,
    )?;

    msg!(
        "Ticket {} for stack {}: {} attesters requested",
        ticket_id,
        stack.id,
        ticket.attesters.len()
    );

    emit!(SettlementTicketOpened {
        ticket_id,
        stack_id: stack.id,
        node_id: node.id,
        claimed_units,
        proof,
        attesters: ticket.attesters.clone(),
        dispute_deadline: ticket.dispute_deadline,
        epoch,
    });

    Ok(())
}

/// Nodes eligible to attest: the purchase-time filter applied with the
/// stack's locked price and unit count. A removed task has no pool.
fn attester_pool(
    task_info: &AccountInfo,
    candidates: &[AccountInfo],
    stack: &Stack,
) -> Result<Vec<u64>> {
    if task_info.data_is_empty() {
        return Ok(Vec::new());
    }
    let task: Task = load_account(task_info)?;
    let nodes = load_candidates(&task, candidates)?;
    let filter = EligibilityFilter {
        price_cap: stack.price_per_unit,
        units: stack.total_units,
        minimum_reputation: task.minimum_reputation,
    };
    Ok(eligible_node_ids(&task, &nodes, &filter))
}
