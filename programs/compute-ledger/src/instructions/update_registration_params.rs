//! Toggle registration and change the collateral requirement (authority only)

use crate::errors::LedgerError;
use crate::events::ProtocolParamsUpdated;
use crate::state::ProtocolConfig;
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UpdateRegistrationParams<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump,
        has_one = authority @ LedgerError::UnauthorizedAuthority
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    pub authority: Signer<'info>,
}

pub fn handler(
    ctx: Context<UpdateRegistrationParams>,
    registration_enabled: bool,
    registration_collateral: u64,
) -> Result<()> {
    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;

    config.registration_enabled = registration_enabled;
    config.registration_collateral = registration_collateral;

    emit_params_updated(config)
}

pub(crate) fn emit_params_updated(config: &ProtocolConfig) -> Result<()> {
    emit!(ProtocolParamsUpdated {
        registration_enabled: config.registration_enabled,
        registration_collateral: config.registration_collateral,
        timeout_slash_permille: config.timeout_slash_permille,
        sampling_consensus_charge_permille: config.sampling_consensus_charge_permille,
        attestation_probability_permille: config.attestation_probability_permille,
        attestation_node_count: config.attestation_node_count,
        epoch: Clock::get()?.epoch,
    });
    Ok(())
}
