//! Let an attester collect its reward (or take its timeout slash) without
//! waiting for the serving node to claim
//!
//! `remaining_accounts` holds one `[ticket, stack]` pair per entry of
//! `ticket_ids`; the ticket must be writable. The ticket and stack stay
//! open; the serving node's `claim_funds` closes them and skips every
//! attester settled here.

use crate::errors::LedgerError;
use crate::events::NodeFeesWithdrawn;
use crate::instructions::account_helpers::{load_account, store_account, take_accounts};
use crate::instructions::claim_helpers::{
    calculate_claim_split, emit_attester_settled, settle_attester, AttesterSettlement,
};
use crate::instructions::lamport_transfer::{deposit_to_treasury, pay_from_treasury};
use crate::state::{Node, ProtocolConfig, SettlementTicket, Stack, Treasury, TreasuryKind};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct ClaimFundsForAttestation<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        mut,
        seeds = [b"node", node.id.to_le_bytes().as_ref()],
        bump = node.bump,
        has_one = owner @ LedgerError::UnauthorizedNode
    )]
    pub node: Account<'info, Node>,

    #[account(
        mut,
        seeds = [b"treasury", TreasuryKind::Fee.seed()],
        bump = fee_treasury.bump
    )]
    pub fee_treasury: Account<'info, Treasury>,

    #[account(
        mut,
        seeds = [b"treasury", TreasuryKind::Communal.seed()],
        bump = communal_treasury.bump
    )]
    pub communal_treasury: Account<'info, Treasury>,

    #[account(mut)]
    pub owner: Signer<'info>,
}

pub fn handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ClaimFundsForAttestation<'info>>,
    ticket_ids: Vec<u64>,
) -> Result<()> {
    require!(!ticket_ids.is_empty(), LedgerError::InvalidInput);
    let config = &ctx.accounts.protocol_config;
    check_version_compatible(config)?;
    let slash_permille = config.timeout_slash_permille;

    let epoch = Clock::get()?.epoch;
    let node = &mut ctx.accounts.node;
    let mut accounts: &'info [AccountInfo<'info>] = ctx.remaining_accounts;

    for ticket_id in ticket_ids {
        let group = take_accounts(&mut accounts, 2)?;
        let (ticket_info, stack_info) = (&group[0], &group[1]);

        let mut ticket: SettlementTicket = load_account(ticket_info)?;
        require!(ticket.id == ticket_id, LedgerError::TicketIdMismatch);
        ticket.ensure_claimable(epoch)?;
        let slot = ticket
            .attester_slot(node.id)
            .ok_or(LedgerError::NotAnAttester)?;
        ticket.mark_settled(slot)?;

        let stack: Stack = load_account(stack_info)?;
        require!(
            stack.id == ticket.stack_id,
            LedgerError::TicketStackMismatch
        );
        let split = calculate_claim_split(&stack, ticket.claimed_units, ticket.attesters.len())?;

        let outcome = settle_attester(
            node,
            ticket.is_attested(slot),
            split.attester_share,
            slash_permille,
            epoch,
        )?;
        if let AttesterSettlement::Slashed(amount) = outcome {
            deposit_to_treasury(
                &node.to_account_info(),
                &mut ctx.accounts.communal_treasury,
                amount,
            )?;
        }
        store_account(ticket_info, &ticket)?;
        emit_attester_settled(ticket.id, node, outcome, epoch);
    }
    require!(accounts.is_empty(), LedgerError::InvalidInput);

    let unlocked = node.fees.take_withdrawable(epoch)?;
    pay_from_treasury(
        &mut ctx.accounts.fee_treasury,
        &ctx.accounts.owner.to_account_info(),
        unlocked,
    )?;
    if unlocked > 0 {
        emit!(NodeFeesWithdrawn {
            node_id: node.id,
            amount: unlocked,
            epoch,
        });
    }

    Ok(())
}
