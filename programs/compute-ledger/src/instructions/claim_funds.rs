//! Settle one or more tickets for the node that served them
//!
//! `remaining_accounts` holds one group per entry of `ticket_ids`:
//! `[ticket, stack, stack_owner, attester_1, .., attester_K]`, with the
//! attester node accounts in the ticket's attester order. Ticket, stack and
//! every attester account must be writable.

use crate::errors::LedgerError;
use crate::events::{FundsClaimed, NodeFeesWithdrawn};
use crate::instructions::account_helpers::{
    load_account, load_node_or_absent, store_account, take_accounts,
};
use crate::instructions::claim_helpers::{
    calculate_claim_split, emit_attester_settled, settle_attester, AttesterSettlement,
};
use crate::instructions::lamport_transfer::{deposit_to_treasury, pay_from_treasury};
use crate::state::{Node, ProtocolConfig, SettlementTicket, Stack, Treasury, TreasuryKind};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct ClaimFunds<'info> {
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
    ctx: Context<'_, '_, 'info, 'info, ClaimFunds<'info>>,
    ticket_ids: Vec<u64>,
) -> Result<()> {
    require!(!ticket_ids.is_empty(), LedgerError::InvalidInput);
    let config = &ctx.accounts.protocol_config;
    check_version_compatible(config)?;
    let slash_permille = config.timeout_slash_permille;

    let epoch = Clock::get()?.epoch;
    let node = &mut ctx.accounts.node;
    let fee_treasury = &mut ctx.accounts.fee_treasury;
    let communal_treasury = &mut ctx.accounts.communal_treasury;
    let owner_info = ctx.accounts.owner.to_account_info();
    let mut accounts: &'info [AccountInfo<'info>] = ctx.remaining_accounts;

    for ticket_id in ticket_ids {
        let group = take_accounts(&mut accounts, 3)?;
        let (ticket_info, stack_info, stack_owner_info) = (&group[0], &group[1], &group[2]);

        let ticket: SettlementTicket = load_account(ticket_info)?;
        require!(ticket.id == ticket_id, LedgerError::TicketIdMismatch);
        require!(ticket.node_id == node.id, LedgerError::NotSelectedNode);
        ticket.ensure_claimable(epoch)?;

        let stack: Stack = load_account(stack_info)?;
        require!(
            stack.id == ticket.stack_id,
            LedgerError::TicketStackMismatch
        );
        require_keys_eq!(
            stack_owner_info.key(),
            stack.owner,
            LedgerError::StackOwnerMismatch
        );

        let split = calculate_claim_split(&stack, ticket.claimed_units, ticket.attesters.len())?;
        let attester_infos = take_accounts(&mut accounts, ticket.attesters.len())?;

        let mut paid_attesters = 0usize;
        for (slot, (attester_id, info)) in ticket.attesters.iter().zip(attester_infos).enumerate() {
            let attested = ticket.is_attested(slot);
            if ticket.is_settled(slot) {
                // Settled earlier through `claim_funds_for_attestation`
                if attested {
                    paid_attesters += 1;
                }
                continue;
            }

            let outcome = if *attester_id == node.id {
                let outcome =
                    settle_attester(node, attested, split.attester_share, slash_permille, epoch)?;
                if let AttesterSettlement::Slashed(amount) = outcome {
                    deposit_to_treasury(&node.to_account_info(), communal_treasury, amount)?;
                }
                emit_attester_settled(ticket.id, node, outcome, epoch);
                outcome
            } else {
                // A destroyed attester forfeits its share to the node
                let Some(mut attester) = load_node_or_absent(info, *attester_id)? else {
                    continue;
                };
                let outcome = settle_attester(
                    &mut attester,
                    attested,
                    split.attester_share,
                    slash_permille,
                    epoch,
                )?;
                store_account(info, &attester)?;
                if let AttesterSettlement::Slashed(amount) = outcome {
                    deposit_to_treasury(info, communal_treasury, amount)?;
                }
                emit_attester_settled(ticket.id, &attester, outcome, epoch);
                outcome
            };
            if matches!(outcome, AttesterSettlement::Rewarded(_)) {
                paid_attesters += 1;
            }
        }

        let node_reward = split.node_reward(paid_attesters)?;
        node.fees.accrue(node_reward, epoch)?;
        node.reward_claim();
        pay_from_treasury(fee_treasury, stack_owner_info, split.refund)?;

        Account::<SettlementTicket>::try_from(ticket_info)?.close(owner_info.clone())?;
        Account::<Stack>::try_from(stack_info)?.close(stack_owner_info.clone())?;

        emit!(FundsClaimed {
            ticket_id: ticket.id,
            stack_id: stack.id,
            node_id: node.id,
            node_reward,
            attester_share: split.attester_share,
            refund: split.refund,
            epoch,
        });
    }
    require!(accounts.is_empty(), LedgerError::InvalidInput);

    let unlocked = node.fees.take_withdrawable(epoch)?;
    pay_from_treasury(fee_treasury, &owner_info, unlocked)?;
    if unlocked > 0 {
        emit!(NodeFeesWithdrawn {
            node_id: node.id,
            amount: unlocked,
            epoch,
        });
    }

    Ok(())
}
