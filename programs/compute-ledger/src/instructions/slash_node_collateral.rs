//! Confiscate all of a node's collateral into the communal treasury
//! (authority only). Hook for arbitration that happens outside the ledger.

use crate::errors::LedgerError;
use crate::events::{slash_reason, NodeSlashed};
use crate::instructions::lamport_transfer::deposit_to_treasury;
use crate::state::{Node, ProtocolConfig, Treasury, TreasuryKind};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct SlashNodeCollateral<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump,
        has_one = authority @ LedgerError::UnauthorizedAuthority
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        mut,
        seeds = [b"node", node.id.to_le_bytes().as_ref()],
        bump = node.bump
    )]
    pub node: Account<'info, Node>,

    #[account(
        mut,
        seeds = [b"treasury", TreasuryKind::Communal.seed()],
        bump = communal_treasury.bump
    )]
    pub communal_treasury: Account<'info, Treasury>,

    pub authority: Signer<'info>,
}

pub fn handler(ctx: Context<SlashNodeCollateral>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let node = &mut ctx.accounts.node;
    let amount = node.slash_all();
    deposit_to_treasury(
        &node.to_account_info(),
        &mut ctx.accounts.communal_treasury,
        amount,
    )?;

    msg!("Node {} slashed {} lamports by authority", node.id, amount);

    emit!(NodeSlashed {
        node_id: node.id,
        amount,
        remaining_collateral: node.collateral,
        reputation: node.reputation,
        reason: slash_reason::AUTHORITY,
        epoch: Clock::get()?.epoch,
    });

    Ok(())
}
