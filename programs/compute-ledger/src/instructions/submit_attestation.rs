//! Record a sampled attester's verdict on a settlement ticket

use crate::errors::LedgerError;
use crate::events::{AttestationSubmitted, DisputeStarted, SettlementAttested};
use crate::state::{AttestationOutcome, Node, ProtocolConfig, SettlementTicket, PROOF_SIZE};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct SubmitAttestation<'info> {
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
        seeds = [b"ticket", ticket.stack_id.to_le_bytes().as_ref()],
        bump = ticket.bump
    )]
    pub ticket: Account<'info, SettlementTicket>,

    pub owner: Signer<'info>,
}

pub fn handler(
    ctx: Context<SubmitAttestation>,
    proof: [u8; PROOF_SIZE],
    leaf: [u8; PROOF_SIZE],
) -> Result<()> {
    check_version_compatible(&ctx.accounts.protocol_config)?;

    let epoch = Clock::get()?.epoch;
    let attester_id = ctx.accounts.node.id;
    let ticket = &mut ctx.accounts.ticket;

    match ticket.record_attestation(attester_id, proof, leaf, epoch)? {
        AttestationOutcome::Recorded { remaining } => {
            emit!(AttestationSubmitted {
                ticket_id: ticket.id,
                attester_node_id: attester_id,
                remaining,
                epoch,
            });
        }
        AttestationOutcome::Completed => {
            emit!(AttestationSubmitted {
                ticket_id: ticket.id,
                attester_node_id: attester_id,
                remaining: 0,
                epoch,
            });
            emit!(SettlementAttested {
                ticket_id: ticket.id,
                stack_id: ticket.stack_id,
                node_id: ticket.node_id,
                epoch,
            });
        }
        AttestationOutcome::Disputed { competing_proof } => {
            msg!(
                "Ticket {} disputed by attester {}",
                ticket.id,
                attester_id
            );
            emit!(DisputeStarted {
                ticket_id: ticket.id,
                stack_id: ticket.stack_id,
                accuser_node_id: attester_id,
                asserter_node_id: ticket.node_id,
                committed_proof: ticket.proof,
                competing_proof,
                epoch,
            });
        }
    }

    Ok(())
}
