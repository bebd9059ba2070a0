//! Buy a prepaid stack of compute units bound to one randomly chosen node

use crate::errors::LedgerError;
use crate::events::StackPurchased;
use crate::instructions::selection_helpers::{
    eligible_node_ids, load_candidates, select_node, EligibilityFilter,
};
use crate::state::{ProtocolConfig, Stack, Task, Treasury, TreasuryKind};
use crate::utils::entropy::{Entropy, PURCHASE_DOMAIN, SLOT_HASHES_ID};
use crate::utils::version::check_version_compatible;
use anchor_lang::prelude::*;

#[derive(Accounts)]
pub struct PurchaseStack<'info> {
    #[account(
        mut,
        seeds = [b"protocol"],
        bump = protocol_config.bump
    )]
    pub protocol_config: Account<'info, ProtocolConfig>,

    #[account(
        seeds = [b"task", task.id.to_le_bytes().as_ref()],
        bump = task.bump
    )]
    pub task: Account<'info, Task>,

    #[account(
        init,
        payer = buyer,
        space = Stack::SIZE,
        seeds = [b"stack", protocol_config.next_stack_id.to_le_bytes().as_ref()],
        bump
    )]
    pub stack: Account<'info, Stack>,

    #[account(
        mut,
        seeds = [b"treasury", TreasuryKind::Fee.seed()],
        bump = fee_treasury.bump
    )]
    pub fee_treasury: Account<'info, Treasury>,

    #[account(mut)]
    pub buyer: Signer<'info>,

    /// CHECK: SlotHashes sysvar, parsed by `Entropy::from_slot_hashes`
    #[account(address = SLOT_HASHES_ID)]
    pub slot_hashes: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
}

/// `remaining_accounts`: the node account of every advertisement on the
/// task, in advertisement order.
pub fn handler(
    ctx: Context<PurchaseStack>,
    num_units: u64,
    price_cap: u64,
    client_seed: [u8; 32],
) -> Result<()> {
    require!(num_units > 0, LedgerError::InvalidComputeUnits);

    let config = &mut ctx.accounts.protocol_config;
    check_version_compatible(config)?;

    let task = &ctx.accounts.task;
    task.ensure_active()?;
    require!(
        !task.advertisements.is_empty(),
        LedgerError::NoNodesSubscribed
    );

    let candidates = load_candidates(task, ctx.remaining_accounts)?;
    let filter = EligibilityFilter {
        price_cap,
        units: num_units,
        minimum_reputation: task.minimum_reputation,
    };
    let eligible = eligible_node_ids(task, &candidates, &filter);

    let stack_id = config.allocate_stack_id()?;
    let mut entropy = Entropy::from_slot_hashes(
        &ctx.accounts.slot_hashes,
        &client_seed,
        PURCHASE_DOMAIN,
        stack_id,
    )?;
    let node_id = select_node(&eligible, &mut entropy)?;
    msg!(
        "Stack {}: node {} chosen from {} eligible",
        stack_id,
        node_id,
        eligible.len()
    );

    let charge_permille = config.charge_permille_for(task.security_level);
    let prepaid = Stack::charge_for(num_units, price_cap, charge_permille)?;

    let epoch = Clock::get()?.epoch;
    let stack = &mut ctx.accounts.stack;
    stack.id = stack_id;
    stack.owner = ctx.accounts.buyer.key();
    stack.task_id = task.id;
    stack.total_units = num_units;
    stack.price_per_unit = price_cap;
    stack.node_id = node_id;
    stack.security_level = task.security_level;
    stack.charge_permille = charge_permille;
    stack.prepaid = prepaid;
    stack.purchased_at = epoch;
    stack.purchase_seed = client_seed;
    stack.in_settlement = false;
    stack.bump = ctx.bumps.stack;

    anchor_lang::system_program::transfer(
        CpiContext::new(
            ctx.accounts.system_program.to_account_info(),
            anchor_lang::system_program::Transfer {
                from: ctx.accounts.buyer.to_account_info(),
                to: ctx.accounts.fee_treasury.to_account_info(),
            },
        ),
        prepaid,
    )?;
    ctx.accounts.fee_treasury.record_deposit(prepaid)?;

    emit!(StackPurchased {
        stack_id,
        task_id: task.id,
        owner: stack.owner,
        node_id,
        total_units: num_units,
        price_per_unit: price_cap,
        prepaid,
        eligible_nodes: eligible.len() as u8,
        epoch,
    });

    Ok(())
}
