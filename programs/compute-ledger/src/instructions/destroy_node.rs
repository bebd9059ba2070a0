//! Destroy a disabled node once its wait has elapsed

use crate::errors::LedgerError;
use crate::events::NodeDestroyed;
use crate::instructions::lamport_transfer::pay_from_treasury;
use crate::state::{Node, ProtocolConfig, Treasury, TreasuryKind};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct DestroyNode<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        mut,
        close = owner,
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

/// Unlocked fees are paid out first. Fees still locked in the current epoch
/// block destruction; the owner retries next epoch.
pub fn handler(ctx: Context<DestroyNode>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let node = &mut ctx.accounts.node;
    node.ensure_destroyable(epoch)?;

    let fees = node.fees.take_withdrawable(epoch)?;
    require!(
        node.fees.current_epoch_amount == 0,
        LedgerError::ResidualFeesLocked
    );
    pay_from_treasury(
        &mut ctx.accounts.fee_treasury,
        &ctx.accounts.owner.to_account_info(),
        fees,
    )?;

    emit!(NodeDestroyed {
        node_id: node.id,
        owner: node.owner,
        collateral_returned: node.collateral,
        fees_withdrawn: fees,
        epoch,
    });

    // Collateral and rent return to the owner via `close = owner`
    Ok(())
}
