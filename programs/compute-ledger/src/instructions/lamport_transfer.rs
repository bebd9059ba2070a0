//! Lamport movement between program-owned accounts with checked arithmetic.
//!
//! Treasury payouts go through [`pay_from_treasury`] and collateral
//! confiscations through [`deposit_to_treasury`] so the treasury's recorded
//! balance moves in the same step as its lamports.

use crate::errors::LedgerError;
use crate::state::Treasury;
use anchor_lang::prelude::*;

/// Transfer `amount` lamports from one account to another.
///
/// `from` must be owned by this program. No-op when `amount == 0`.
pub fn transfer_lamports<'info>(
    from: &AccountInfo<'info>,
    to: &AccountInfo<'info>,
    amount: u64,
) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    **from.try_borrow_mut_lamports()? = from
        .lamports()
        .checked_sub(amount)
        .ok_or(LedgerError::InsufficientFunds)?;
    **to.try_borrow_mut_lamports()? = to
        .lamports()
        .checked_add(amount)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    Ok(())
}

/// Record a withdrawal on `treasury` and move the lamports to `to`.
pub fn pay_from_treasury<'info>(
    treasury: &mut Account<'info, Treasury>,
    to: &AccountInfo<'info>,
    amount: u64,
) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    treasury.record_withdrawal(amount)?;
    transfer_lamports(&treasury.to_account_info(), to, amount)
}

/// Move lamports from a program-owned account into `treasury` and record
/// the deposit.
pub fn deposit_to_treasury<'info>(
    from: &AccountInfo<'info>,
    treasury: &mut Account<'info, Treasury>,
    amount: u64,
) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    treasury.record_deposit(amount)?;
    transfer_lamports(from, &treasury.to_account_info(), amount)
}
