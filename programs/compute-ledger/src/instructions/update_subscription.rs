//! Change the terms of an existing advertisement

use crate::errors::LedgerError;
use crate::events::SubscriptionUpdated;
use crate::state::{Node, ProtocolConfig, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UpdateSubscription<'info> {
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

    pub owner: Signer<'info>,
}

pub fn handler(
    ctx: Context<UpdateSubscription>,
    price_per_unit: u64,
    max_units: u64,
) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let node_id = ctx.accounts.node.id;
    let task = &mut ctx.accounts.task;
    task.update_subscription(node_id, price_per_unit, max_units)?;

    emit!(SubscriptionUpdated {
        task_id: task.id,
        node_id,
        price_per_unit,
        max_units,
        epoch: Clock::get()?.epoch,
    });

    Ok(())
}
