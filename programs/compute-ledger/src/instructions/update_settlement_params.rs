//! Change slashing, surcharge and attester sampling parameters (authority only)

use crate::errors::LedgerError;
use crate::instructions::update_registration_params::emit_params_updated;
use crate::state::ProtocolConfig;
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct UpdateSettlementParams<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump,
        has_one = authority @ LedgerError::UnauthorizedAuthority
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    pub authority: Signer<'info>,
}

/// Existing stacks keep the price and surcharge they were bought at; every
/// other parameter applies from the next call on.
pub fn handler(
    ctx: Context<UpdateSettlementParams>,
    timeout_slash_permille: u16,
    sampling_consensus_charge_permille: u16,
    attestation_probability_permille: u16,
    attestation_node_count: u8,
) -> Result<()> {
    ProtocolConfig::validate_settlement_params(
        timeout_slash_permille,
        sampling_consensus_charge_permille,
        attestation_probability_permille,
        attestation_node_count,
    )?;

    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;

    config.timeout_slash_permille = timeout_slash_permille;
    config.sampling_consensus_charge_permille = sampling_consensus_charge_permille;
    config.attestation_probability_permille = attestation_probability_permille;
    config.attestation_node_count = attestation_node_count;

    emit_params_updated(config)
}
