//! Close a subscription marker that outlived its task or its node.
//!
//! Anyone may call this; rent goes back to the node owner recorded in the
//! marker. If only the node is gone, its advertisement is also dropped from
//! the still-live task.

use crate::errors::LedgerError;
use crate::events::NodeUnsubscribed;
use crate::instructions::account_helpers::{load_account, store_account};
use crate::state::{Subscription, Task};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct ReleaseSubscription<'info> {
    #[account(
        mut,
        close = owner,
        seeds = [
            b"subscription",
            subscription.task_id.to_le_bytes().as_ref(),
            subscription.node_id.to_le_bytes().as_ref()
        ],
        bump = subscription.bump,
        has_one = owner @ LedgerError::UnauthorizedNode
    )]
    pub subscription: Account<'info, Subscription>,

    /// CHECK: task PDA, possibly closed; checked by seeds and read manually
    #[account(
        mut,
        seeds = [b"task", subscription.task_id.to_le_bytes().as_ref()],
        bump
    )]
    pub task: UncheckedAccount<'info>,

    /// CHECK: node PDA, possibly closed; only its emptiness is inspected
    #[account(
        seeds = [b"node", subscription.node_id.to_le_bytes().as_ref()],
        bump
    )]
    pub node: UncheckedAccount<'info>,

    /// CHECK: rent recipient, bound to the marker by `has_one`
    #[account(mut)]
    pub owner: UncheckedAccount<'info>,
}

pub fn handler(ctx: Context<ReleaseSubscription>) -> Result<()> {
    let subscription = &ctx.accounts.subscription;
    let task_info = ctx.accounts.task.to_account_info();

    if !task_info.data_is_empty() {
        require!(
            ctx.accounts.node.data_is_empty(),
            LedgerError::TaskStillLive
        );
        let mut task: Task = load_account(&task_info)?;
        task.unsubscribe(subscription.node_id)?;
        store_account(&task_info, &task)?;
    }

    emit!(NodeUnsubscribed {
        task_id: subscription.task_id,
        node_id: subscription.node_id,
        epoch: Clock::get()?.epoch,
    });

    Ok(())
}
