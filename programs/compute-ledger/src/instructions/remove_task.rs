//! Remove a deprecated task after its grace period

use crate::errors::LedgerError;
use crate::events::TaskRemoved;
use crate::state::{ProtocolConfig, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct RemoveTask<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        mut,
        close = owner,
        seeds = [b"task", task.id.to_le_bytes().as_ref()],
        bump = task.bump,
        has_one = owner @ LedgerError::UnauthorizedTaskAction
    )]
    pub task: Account<'info, Task>,

    #[account(mut)]
    pub owner: Signer<'info>,
}

/// Subscription markers that outlive the task are closed with
/// `release_subscription`.
pub fn handler(ctx: Context<RemoveTask>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let task = &ctx.accounts.task;
    task.ensure_removable(epoch)?;

    emit!(TaskRemoved {
        task_id: task.id,
        epoch,
    });

    Ok(())
}
