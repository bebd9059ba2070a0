//! Create a catalog task

use crate::errors::LedgerError;
use crate::events::TaskCreated;
use crate::state::{task_role, ModelEntry, ProtocolConfig, SecurityLevel, Task};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct CreateTask<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        init,
        payer = owner,
        space = Task::SIZE,
        seeds = [b"task", protocol_config.next_task_id.to_le_bytes().as_ref()],
        bump
    )]
    pub task: Account<'info, Task>,

    /// Registered model the task serves, if any
    pub model: Option<Account<'info, ModelEntry>>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(
    ctx: Context<CreateTask>,
    role: u8,
    security_level: u8,
    minimum_reputation: u8,
) -> Result<()> {
    require!(role <= task_role::MAX, LedgerError::InvalidTaskRole);
    let security_level =
        SecurityLevel::from_u8(security_level).ok_or(LedgerError::InvalidSecurityLevel)?;

    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;
    let task_id = config.allocate_task_id()?;

    let epoch = Clock::get()?.epoch;
    let model = ctx.accounts.model.as_ref().map(|m| m.key());

    let task = &mut ctx.accounts.task;
    task.id = task_id;
    task.owner = ctx.accounts.owner.key();
    task.role = role;
    task.model = model;
    task.security_level = security_level;
    task.minimum_reputation = minimum_reputation;
    task.deprecated_at = None;
    task.advertisements = Vec::new();
    task.whitelist = Vec::new();
    task.created_at = epoch;
    task.bump = ctx.bumps.task;

    emit!(TaskCreated {
        task_id,
        owner: task.owner,
        role,
        model,
        security_level: security_level as u8,
        minimum_reputation,
        epoch,
    });

    Ok(())
}
