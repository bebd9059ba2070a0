//! Loading and storing program accounts passed through `remaining_accounts`.
//!
//! Instructions that touch a variable number of nodes or tickets cannot name
//! them in their `Accounts` struct, so they are validated here by owner and
//! discriminator before use.

use crate::errors::LedgerError;
use crate::state::Node;
use anchor_lang::prelude::*;

/// Deserialize a program-owned account of type `T`.
pub fn load_account<T: AccountDeserialize>(info: &AccountInfo) -> Result<T> {
    require!(info.owner == &crate::ID, LedgerError::InvalidAccountOwner);
    let data = info.try_borrow_data()?;
    T::try_deserialize(&mut &data[..])
}

/// Serialize `value` back into a writable program-owned account,
/// discriminator included.
pub fn store_account<T: AccountSerialize>(info: &AccountInfo, value: &T) -> Result<()> {
    require!(info.owner == &crate::ID, LedgerError::InvalidAccountOwner);
    require!(info.is_writable, LedgerError::InvalidInput);
    let mut data = info.try_borrow_mut_data()?;
    let mut writer: &mut [u8] = &mut data[..];
    value.try_serialize(&mut writer)
}

/// Load the node with `node_id`, or `None` when its account has been
/// closed by `destroy_node`. An empty account must still sit at the node's
/// PDA address.
pub fn load_node_or_absent(info: &AccountInfo, node_id: u64) -> Result<Option<Node>> {
    if info.data_is_empty() {
        let (expected, _) =
            Pubkey::find_program_address(&[b"node", &node_id.to_le_bytes()], &crate::ID);
        require_keys_eq!(*info.key, expected, LedgerError::NodeMismatch);
        return Ok(None);
    }
    let node: Node = load_account(info)?;
    require!(node.id == node_id, LedgerError::NodeMismatch);
    Ok(Some(node))
}

/// Split off the next `count` accounts from a cursor over
/// `remaining_accounts`.
pub fn take_accounts<'a, 'info>(
    accounts: &mut &'a [AccountInfo<'info>],
    count: usize,
) -> Result<&'a [AccountInfo<'info>]> {
    require!(accounts.len() >= count, LedgerError::InvalidInput);
    let (head, tail) = accounts.split_at(count);
    *accounts = tail;
    Ok(head)
}
