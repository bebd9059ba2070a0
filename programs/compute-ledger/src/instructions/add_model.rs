//! Register a model name tasks can reference (authority only)

use crate::errors::LedgerError;
use crate::events::ModelAdded;
use crate::state::{ModelEntry, ProtocolConfig};
use crate::utils::validation::validate_model_name;
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
#[instruction(name: String)]
pub struct AddModel<'info> {
    #[account(
        seeds = [b"protocol"],
        bump = protocol_config.bump,
        has_one = authority @ LedgerError::UnauthorizedAuthority
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        init,
        payer = authority,
        space = ModelEntry::SIZE,
        seeds = [b"model", name.as_bytes()],
        bump
    )]
    pub model: Account<'info, ModelEntry>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<AddModel>, name: String) -> Result<()> {
    require!(validate_model_name(&name), LedgerError::InvalidModelName);
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let model = &mut ctx.accounts.model;
    model.name = name.clone();
    model.registered_by = ctx.accounts.authority.key();
    model.registered_at = epoch;
    model.bump = ctx.bumps.model;

    emit!(ModelAdded {
        name,
        model: model.key(),
        epoch,
    });

    Ok(())
}
