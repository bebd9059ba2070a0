//! Per-call entropy for node and attester selection.
//!
//! Selection never reads a global generator. Each instruction builds an
//! [`Entropy`] from the most recent slot hash, a caller supplied seed, a
//! domain tag and the id of the object being created, and passes it down as
//! `&mut impl EntropySource`. Tests seed it directly.

use crate::errors::LedgerError;
use crate::utils::digest::sha256_concat;
use anchor_lang::prelude::*;

pub use anchor_lang::solana_program::sysvar::slot_hashes::ID as SLOT_HASHES_ID;

/// Domain tag for stack purchase node selection
pub const PURCHASE_DOMAIN: &[u8] = b"purchase";

/// Domain tag for attester sampling at settlement
pub const SETTLEMENT_DOMAIN: &[u8] = b"settlement";

/// Length prefix plus the first `(slot, hash)` entry
const MOST_RECENT_ENTRY_END: usize = 8 + 8 + 32;

pub trait EntropySource {
    fn next_u64(&mut self) -> u64;

    /// Uniform draw from `0..bound` by rejection sampling. Returns 0 when
    /// `bound` is 0 or 1.
    fn below(&mut self, bound: u64) -> u64 {
        if bound <= 1 {
            return 0;
        }
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let value = self.next_u64();
            if value < zone {
                return value % bound;
            }
        }
    }
}

/// SHA-256 counter-mode stream
#[derive(Debug, Clone)]
pub struct Entropy {
    seed: [u8; 32],
    counter: u64,
}

impl Entropy {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed, counter: 0 }
    }

    pub fn derive(recent: &[u8], client_seed: &[u8; 32], domain: &[u8], object_id: u64) -> Self {
        Self::from_seed(sha256_concat(&[
            recent,
            client_seed,
            domain,
            &object_id.to_le_bytes(),
        ]))
    }

    /// Seed from the newest entry of the SlotHashes sysvar
    pub fn from_slot_hashes(
        slot_hashes: &AccountInfo,
        client_seed: &[u8; 32],
        domain: &[u8],
        object_id: u64,
    ) -> Result<Self> {
        require_keys_eq!(
            *slot_hashes.key,
            SLOT_HASHES_ID,
            LedgerError::InvalidSlotHashes
        );
        let data = slot_hashes.try_borrow_data()?;
        require!(
            data.len() >= MOST_RECENT_ENTRY_END,
            LedgerError::InvalidSlotHashes
        );
        let mut len = [0u8; 8];
        len.copy_from_slice(&data[..8]);
        require!(u64::from_le_bytes(len) > 0, LedgerError::InvalidSlotHashes);

        Ok(Self::derive(
            &data[8..MOST_RECENT_ENTRY_END],
            client_seed,
            domain,
            object_id,
        ))
    }
}

impl EntropySource for Entropy {
    fn next_u64(&mut self) -> u64 {
        let block = sha256_concat(&[&self.seed, &self.counter.to_le_bytes()]);
        self.counter = self.counter.wrapping_add(1);
        let mut word = [0u8; 8];
        word.copy_from_slice(&block[..8]);
        u64::from_le_bytes(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed list of words, then repeats the last one.
    struct Scripted(Vec<u64>);

    impl EntropySource for Scripted {
        fn next_u64(&mut self) -> u64 {
            if self.0.len() > 1 {
                self.0.remove(0)
            } else {
                self.0[0]
            }
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Entropy::from_seed([7u8; 32]);
        let mut b = Entropy::from_seed([7u8; 32]);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_domain_separates_streams() {
        let seed = [1u8; 32];
        let mut a = Entropy::derive(&[0u8; 40], &seed, PURCHASE_DOMAIN, 1);
        let mut b = Entropy::derive(&[0u8; 40], &seed, SETTLEMENT_DOMAIN, 1);
        let mut c = Entropy::derive(&[0u8; 40], &seed, PURCHASE_DOMAIN, 2);
        let first = a.next_u64();
        assert_ne!(first, b.next_u64());
        assert_ne!(first, c.next_u64());
    }

    #[test]
    fn test_below_stays_in_range() {
        let mut e = Entropy::from_seed([3u8; 32]);
        for bound in 1..50u64 {
            for _ in 0..20 {
                assert!(e.below(bound) < bound);
            }
        }
        assert_eq!(e.below(0), 0);
    }

    #[test]
    fn test_below_rejects_biased_tail() {
        // With bound 3 the zone ends at u64::MAX - 0, so u64::MAX is rejected.
        let mut s = Scripted(vec![u64::MAX, 4]);
        assert_eq!(s.below(3), 1);
    }

    #[test]
    fn test_below_covers_every_value() {
        let mut e = Entropy::from_seed([9u8; 32]);
        let mut seen = [false; 5];
        for _ in 0..200 {
            seen[e.below(5) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_slot_hashes_id_matches_sysvar_address() {
        assert_eq!(
            SLOT_HASHES_ID.to_string(),
            "SysvarS1otHashes111111111111111111111111111"
        );
    }
}
