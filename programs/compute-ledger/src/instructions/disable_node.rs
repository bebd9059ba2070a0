//! Permanently disable a node

use crate::errors::LedgerError;
use crate::events::NodeDisabled;
use crate::state::{Node, ProtocolConfig};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct DisableNode<'info> {
    #[account(
        mut,
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

    pub owner: Signer<'info>,
}

pub fn handler(ctx: Context<DisableNode>) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let node = &mut ctx.accounts.node;
    node.disable(epoch)?;

    let config = &mut ctx.accounts.protocol_config;
    config.active_nodes = config.active_nodes.saturating_sub(1);

    emit!(NodeDisabled {
        node_id: node.id,
        epoch,
    });

    Ok(())
}
