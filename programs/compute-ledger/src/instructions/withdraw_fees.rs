//! Withdraw a node's unlocked fees

use crate::errors::LedgerError;
use crate::events::NodeFeesWithdrawn;
use crate::instructions::lamport_transfer::pay_from_treasury;
use crate::state::{Node, ProtocolConfig, Treasury, TreasuryKind};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct WithdrawFees<'info> {
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

    #[account(mut)]
    pub owner: Signer<'info>,
}

pub fn handler(ctx: Context<WithdrawFees>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let node = &mut ctx.accounts.node;
    let amount = node.fees.take_withdrawable(epoch)?;
    pay_from_treasury(
        &mut ctx.accounts.fee_treasury,
        &ctx.accounts.owner.to_account_info(),
        amount,
    )?;

    emit!(NodeFeesWithdrawn {
        node_id: node.id,
        amount,
        epoch,
    });

    Ok(())
}
