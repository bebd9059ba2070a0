//! Withdraw a node's advertisement from a task
//!
//! Removal swaps the last advertisement into the freed slot. The indexed
//! form is cheaper but the index is only a hint: if another removal moved
//! entries in between, it aborts with `SubscriptionIndexMismatch` and the
//! caller retries with a fresh index.

use crate::errors::LedgerError;
use crate::events::NodeUnsubscribed;
use crate::state::{Node, ProtocolConfig, Subscription, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UnsubscribeNode<'info> {
    #[account(
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
        seeds = [b"task", task.id.to_le_bytes().as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    #[account(
        mut,
        close = owner,
        seeds = [
            b"subscription",
            task.id.to_le_bytes().as_ref(),
            node.id.to_le_bytes().as_ref()
        ],
        bump = subscription.bump
    )]
    pub subscription: Account<'info, Subscription>,

    #[account(mut)]
    pub owner: Signer<'info>,
}

pub fn handler(ctx: Context<UnsubscribeNode>, index: Option<u32>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let node_id = ctx.accounts.node.id;
    let task = &mut ctx.accounts.task;
    match index {
        Some(index) => task.unsubscribe_at(index as usize, node_id)?,
        None => task.unsubscribe(node_id)?,
    };

    emit!(NodeUnsubscribed {
        task_id: task.id,
        node_id,
        epoch: Clock::get()?.epoch,
    });

    Ok(())
}
