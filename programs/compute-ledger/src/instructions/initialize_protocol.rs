//! Initialize protocol configuration and treasuries

use crate::events::ProtocolInitialized;
use crate::state::{
    ProtocolConfig, Treasury, TreasuryKind, CURRENT_PROTOCOL_VERSION, MIN_SUPPORTED_VERSION,
};
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct InitializeProtocol<'info> {
    #[account(
        init,
        payer = authority,
        space = ProtocolConfig::SIZE,
        seeds = [b"protocol"],
        bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        init,
        payer = authority,
        space = Treasury::SIZE,
        seeds = [b"treasury", TreasuryKind::Fee.seed()],
        bump
    )]
    pub fee_treasury: Account<'info, Treasury>,

    #[account(
        init,
        payer = authority,
        space = Treasury::SIZE,
        seeds = [b"treasury", TreasuryKind::Communal.seed()],
        bump
    )]
    pub communal_treasury: Account<'info, Treasury>,

    #[account(mut)]
    pub authority: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(
    ctx: Context<InitializeProtocol>,
    registration_collateral: u64,
    timeout_slash_permille: u16,
    sampling_consensus_charge_permille: u16,
    attestation_probability_permille: u16,
    attestation_node_count: u8,
) -> Result<()> {
    // Validate parameters BEFORE writing any config
    ProtocolConfig::validate_settlement_params(
        timeout_slash_permille,
        sampling_consensus_charge_permille,
        attestation_probability_permille,
        attestation_node_count,
    )?;

    let config = &mut ctx.accounts.protocol_config;
    config.set_inner(ProtocolConfig {
        authority: ctx.accounts.authority.key(),
        registration_collateral,
        timeout_slash_permille,
        sampling_consensus_charge_permille,
        attestation_probability_permille,
        attestation_node_count,
        protocol_version: CURRENT_PROTOCOL_VERSION,
        min_supported_version: MIN_SUPPORTED_VERSION,
        bump: ctx.bumps.protocol_config,
        ..Default::default()
    });

    let fee_treasury = &mut ctx.accounts.fee_treasury;
    fee_treasury.kind = TreasuryKind::Fee;
    fee_treasury.bump = ctx.bumps.fee_treasury;

    let communal_treasury = &mut ctx.accounts.communal_treasury;
    communal_treasury.kind = TreasuryKind::Communal;
    communal_treasury.bump = ctx.bumps.communal_treasury;

    emit!(ProtocolInitialized {
        authority: config.authority,
        registration_collateral,
        timeout_slash_permille,
        sampling_consensus_charge_permille,
        attestation_probability_permille,
        attestation_node_count,
        epoch: Clock::get()?.epoch,
    });

    Ok(())
}
