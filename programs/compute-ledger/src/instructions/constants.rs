//! Shared constants for instruction handlers

/// Divisor for permille calculations (100% = 1000)
pub const PERMILLE_BASE: u64 = 1000;

/// Maximum valid permille value for probabilities and slash fractions
pub const MAX_PERMILLE: u16 = 1000;

// ============================================================================
// Epoch Delays
// ============================================================================

/// Epochs a node must stay disabled before it can be destroyed
pub const NODE_DESTROY_WAIT_EPOCHS: u64 = 4;

/// Epochs between opening a settlement ticket and the end of its dispute window
pub const DISPUTE_WINDOW_EPOCHS: u64 = 2;

/// Epochs a deprecated task is kept before it can be removed
pub const TASK_REMOVAL_GRACE_EPOCHS: u64 = 2;

// ============================================================================
// Reputation Constants
// ============================================================================

/// Reputation score assigned at registration
pub const INITIAL_REPUTATION: u8 = 100;

/// Reputation points lost on an attestation timeout slash
pub const REPUTATION_TIMEOUT_PENALTY: u8 = 10;

/// Reputation points gained per successfully claimed settlement
pub const REPUTATION_PER_CLAIM: u8 = 1;

// ============================================================================
// Protocol Defaults
// ============================================================================

/// Default registration collateral (1 SOL)
pub const DEFAULT_REGISTRATION_COLLATERAL: u64 = 1_000_000_000;

/// Default fraction of collateral slashed when an attester times out (10%)
pub const DEFAULT_TIMEOUT_SLASH_PERMILLE: u16 = 100;

/// Default price multiplier for sampling-consensus stacks (2x)
pub const DEFAULT_SAMPLING_CONSENSUS_CHARGE_PERMILLE: u16 = 2000;

/// Default probability that a sampling-consensus settlement requests attesters (10%)
pub const DEFAULT_ATTESTATION_PROBABILITY_PERMILLE: u16 = 100;

/// Default number of attesters sampled per settlement
pub const DEFAULT_ATTESTATION_NODE_COUNT: u8 = 3;
