//! Flag a settlement ticket as disputed
//!
//! Only a requested attester may accuse, and only inside the dispute
//! window. The ledger records the disagreement; arbitration happens
//! elsewhere and may end in `slash_node_collateral`.

use crate::errors::LedgerError;
use crate::events::DisputeStarted;
use crate::state::{Node, ProtocolConfig, SettlementTicket, PROOF_SIZE};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct StartDispute<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        seeds = [b"node", accuser.id.to_le_bytes().as_ref()],
        bump = accuser.bump,
        has_one = owner @ LedgerError::UnauthorizedNode
    )]
    pub accuser: Account<'info, Node>,

    #[account(
        mut,
        seeds = [b"ticket", ticket.stack_id.to_le_bytes().as_ref()],
        bump = ticket.bump
    )]
    pub ticket: Account<'info, SettlementTicket>,

    pub owner: Signer<'info>,
}

pub fn handler(ctx: Context<StartDispute>, competing_proof: [u8; PROOF_SIZE]) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let accuser_id = ctx.accounts.accuser.id;
    let ticket = &mut ctx.accounts.ticket;
    ticket.open_dispute(accuser_id, epoch)?;

    msg!("Ticket {} disputed by attester {}", ticket.id, accuser_id);

    emit!(DisputeStarted {
        ticket_id: ticket.id,
        stack_id: ticket.stack_id,
        accuser_node_id: accuser_id,
        asserter_node_id: ticket.node_id,
        committed_proof: ticket.proof,
        competing_proof,
        epoch,
    });

    Ok(())
}
