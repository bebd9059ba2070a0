//! Restrict which nodes may subscribe to and serve a task.

use crate::errors::LedgerError;
use crate::events::TaskWhitelistUpdated;
use crate::state::{ProtocolConfig, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct WhitelistNodesForTask<'info> {
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

/// Nodes already advertising stay listed but are skipped by node selection
/// and attester sampling unless whitelisted.
pub fn handler(ctx: Context<WhitelistNodesForTask>, node_ids: Vec<u64>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let task = &mut ctx.accounts.task;
    let added = task.whitelist_nodes(&node_ids)?;
    msg!(
        "Task {}: {} nodes whitelisted, {} total",
        task.id,
        added,
        task.whitelist.len()
    );

    emit!(TaskWhitelistUpdated {
        task_id: task.id,
        node_ids,
        whitelist_len: task.whitelist.len() as u8,
        epoch,
    });

    Ok(())
}
