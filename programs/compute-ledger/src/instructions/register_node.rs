//! Register a compute node and lock its collateral

use crate::errors::LedgerError;
use crate::events::NodeRegistered;
use crate::state::{Node, ProtocolConfig};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct RegisterNode<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        init,
        payer = owner,
        space = Node::SIZE,
        seeds = [b"node", protocol_config.next_node_id.to_le_bytes().as_ref()],
        bump
    )]
    pub node: Account<'info, Node>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// The node PDA holds rent plus collateral. `Node::collateral` tracks only
/// the collateral part.
pub fn handler(ctx: Context<RegisterNode>) -> Result<()> {
    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;
    require!(
        config.registration_enabled,
        LedgerError::RegistrationDisabled
    );

    let epoch = Clock::get()?.epoch;
    let collateral = config.registration_collateral;
    let node_id = config.allocate_node_id()?;
    config.active_nodes = config
        .active_nodes
        .checked_add(1)
        .ok_or(LedgerError::ArithmeticOverflow)?;

    let owner = ctx.accounts.owner.key();
    ctx.accounts
        .node
        .set_inner(Node::new(node_id, owner, collateral, epoch, ctx.bumps.node));

    if collateral > 0 {
        anchor_lang::system_program::transfer(
            CpiContext::new(
                ctx.accounts.system_program.to_account_info(),
                anchor_lang::system_program::Transfer {
                    from: ctx.accounts.owner.to_account_info(),
                    to: ctx.accounts.node.to_account_info(),
                },
            ),
            collateral,
        )?;
    }

    emit!(NodeRegistered {
        node_id,
        owner,
        collateral,
        epoch,
    });

    Ok(())
}
