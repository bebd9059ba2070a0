//! Deprecate a task. New subscriptions and purchases are rejected afterwards.

use crate::errors::LedgerError;
use crate::events::TaskDeprecated;
use crate::state::{ProtocolConfig, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct DeprecateTask<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        mut,
        seeds = [b"task", task.id.to_le_bytes().as_ref()],
        bump = task.bump,
        has_one = owner @ LedgerError::UnauthorizedTaskAction
    )]
    pub task: Account<'info, Task>,

    pub owner: Signer<'info>,
}

pub fn handler(ctx: Context<DeprecateTask>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let task = &mut ctx.accounts.task;
    task.deprecate(epoch)?;

    emit!(TaskDeprecated {
        task_id: task.id,
        epoch,
    });

    Ok(())
}
