//! Advertise a node's price and capacity on a task

use crate::errors::LedgerError;
use crate::events::NodeSubscribed;
use crate::state::{Node, ProtocolConfig, Subscription, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct SubscribeNode<'info> {
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

    /// Fails to initialize if the node is already subscribed
    #[account(
        init,
        payer = owner,
        space = Subscription::SIZE,
        seeds = [
            b"subscription",
            task.id.to_le_bytes().as_ref(),
            node.id.to_le_bytes().as_ref()
        ],
        bump
    )]
    pub subscription: Account<'info, Subscription>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<SubscribeNode>, price_per_unit: u64, max_units: u64) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let node = &ctx.accounts.node;
    require!(!node.is_disabled(), LedgerError::NodeDisabled);

    let task = &mut ctx.accounts.task;
    require!(
        node.reputation >= task.minimum_reputation,
        LedgerError::InsufficientReputation
    );
    task.subscribe(node.id, price_per_unit, max_units)?;

    let epoch = Clock::get()?.epoch;
    let subscription = &mut ctx.accounts.subscription;
    subscription.task_id = task.id;
    subscription.node_id = node.id;
    subscription.owner = node.owner;
    subscription.subscribed_at = epoch;
    subscription.bump = ctx.bumps.subscription;

    emit!(NodeSubscribed {
        task_id: task.id,
        node_id: node.id,
        price_per_unit,
        max_units,
        epoch,
    });

    Ok(())
}
