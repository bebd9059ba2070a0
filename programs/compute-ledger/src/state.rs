//! Account state structures for the compute ledger

use crate::errors::LedgerError;
use crate::instructions::constants::{
    DEFAULT_ATTESTATION_NODE_COUNT, DEFAULT_ATTESTATION_PROBABILITY_PERMILLE,
    DEFAULT_REGISTRATION_COLLATERAL, DEFAULT_SAMPLING_CONSENSUS_CHARGE_PERMILLE,
    DEFAULT_TIMEOUT_SLASH_PERMILLE, DISPUTE_WINDOW_EPOCHS, INITIAL_REPUTATION, MAX_PERMILLE,
    NODE_DESTROY_WAIT_EPOCHS, PERMILLE_BASE, REPUTATION_PER_CLAIM, REPUTATION_TIMEOUT_PENALTY,
    TASK_REMOVAL_GRACE_EPOCHS,
};
use crate::utils::digest::sha256_concat;
use anchor_lang::prelude::*;

// ============================================================================
// Size Constants
// ============================================================================

/// Size of settlement proofs and leaves (opaque 32-byte strings)
pub const PROOF_SIZE: usize = 32;

/// Maximum advertisements a single task can hold
pub const MAX_TASK_ADVERTISEMENTS: usize = 24;

/// Maximum whitelisted node ids per task
pub const MAX_TASK_WHITELIST: usize = 24;

/// Maximum attesters sampled for a single settlement ticket
pub const MAX_ATTESTERS: usize = 8;

/// Maximum length of a registered model name in bytes
pub const MAX_MODEL_NAME_LEN: usize = 32;

/// Task role tags.
///
/// | Value | Constant           | Description                     |
/// |-------|--------------------|---------------------------------|
/// |  0    | `CHAT_COMPLETION`  | Conversational text generation  |
/// |  1    | `EMBEDDINGS`       | Vector embedding generation     |
/// |  2    | `IMAGE_GENERATION` | Image synthesis                 |
/// |  3    | `FINE_TUNING`      | Model fine-tuning jobs          |
pub mod task_role {
    pub const CHAT_COMPLETION: u8 = 0;
    pub const EMBEDDINGS: u8 = 1;
    pub const IMAGE_GENERATION: u8 = 2;
    pub const FINE_TUNING: u8 = 3;

    /// Highest valid role tag
    pub const MAX: u8 = FINE_TUNING;
}

/// Security level required by a task
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default, InitSpace,
)]
#[repr(u8)]
pub enum SecurityLevel {
    /// Settlement is accepted once the dispute window passes
    #[default]
    Standard = 0,
    /// Settlement may be checked by randomly sampled attesters
    SamplingConsensus = 1,
}

impl SecurityLevel {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SecurityLevel::Standard),
            1 => Some(SecurityLevel::SamplingConsensus),
            _ => None,
        }
    }
}

/// Which treasury an account holds
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default, InitSpace,
)]
#[repr(u8)]
pub enum TreasuryKind {
    /// Prepayments and fees owed to nodes
    #[default]
    Fee = 0,
    /// Collateral confiscated by slashing
    Communal = 1,
}

impl TreasuryKind {
    /// Second PDA seed of the treasury account
    pub fn seed(&self) -> &'static [u8] {
        match self {
            TreasuryKind::Fee => b"fee",
            TreasuryKind::Communal => b"communal",
        }
    }
}

/// Current protocol version
pub const CURRENT_PROTOCOL_VERSION: u8 = 1;

/// Minimum supported protocol version for backward compatibility
pub const MIN_SUPPORTED_VERSION: u8 = 1;

// ============================================================================
// Protocol Configuration
// ============================================================================

/// Protocol configuration account
/// PDA seeds: ["protocol"]
#[account]
#[derive(InitSpace)]
pub struct ProtocolConfig {
    /// Protocol authority, fixed at initialization
    pub authority: Pubkey,
    /// Whether new nodes may register
    pub registration_enabled: bool,
    /// Lamports locked as collateral by every new node
    pub registration_collateral: u64,
    /// Fraction of collateral slashed from an attester that never attests
    pub timeout_slash_permille: u16,
    /// Price multiplier for SamplingConsensus stacks (1000 = 1x)
    pub sampling_consensus_charge_permille: u16,
    /// Probability that a SamplingConsensus settlement requests attesters
    pub attestation_probability_permille: u16,
    /// Number of attesters requested when sampling triggers
    pub attestation_node_count: u8,
    /// Next node id to assign
    pub next_node_id: u64,
    /// Next task id to assign
    pub next_task_id: u64,
    /// Next stack id to assign
    pub next_stack_id: u64,
    /// Next settlement ticket id to assign
    pub next_ticket_id: u64,
    /// Registered nodes that are not disabled
    pub active_nodes: u64,
    /// Current protocol version (for upgrades)
    pub protocol_version: u8,
    /// Minimum supported version for backward compatibility
    pub min_supported_version: u8,
    /// Bump seed for PDA
    pub bump: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            authority: Pubkey::default(),
            registration_enabled: true,
            registration_collateral: DEFAULT_REGISTRATION_COLLATERAL,
            timeout_slash_permille: DEFAULT_TIMEOUT_SLASH_PERMILLE,
            sampling_consensus_charge_permille: DEFAULT_SAMPLING_CONSENSUS_CHARGE_PERMILLE,
            attestation_probability_permille: DEFAULT_ATTESTATION_PROBABILITY_PERMILLE,
            attestation_node_count: DEFAULT_ATTESTATION_NODE_COUNT,
            next_node_id: 1,
            next_task_id: 1,
            next_stack_id: 1,
            next_ticket_id: 1,
            active_nodes: 0,
            protocol_version: CURRENT_PROTOCOL_VERSION,
            min_supported_version: MIN_SUPPORTED_VERSION,
            bump: 0,
        }
    }
}

impl ProtocolConfig {
    pub const SIZE: usize = 8 + // discriminator
        32 + // authority
        1 +  // registration_enabled
        8 +  // registration_collateral
        2 +  // timeout_slash_permille
        2 +  // sampling_consensus_charge_permille
        2 +  // attestation_probability_permille
        1 +  // attestation_node_count
        8 +  // next_node_id
        8 +  // next_task_id
        8 +  // next_stack_id
        8 +  // next_ticket_id
        8 +  // active_nodes
        1 +  // protocol_version
        1 +  // min_supported_version
        1; // bump

    /// Validate the settlement parameter set before it is written
    pub fn validate_settlement_params(
        timeout_slash_permille: u16,
        charge_permille: u16,
        probability_permille: u16,
        node_count: u8,
    ) -> Result<()> {
        require!(
            timeout_slash_permille <= MAX_PERMILLE,
            LedgerError::InvalidPermille
        );
        require!(
            probability_permille <= MAX_PERMILLE,
            LedgerError::InvalidPermille
        );
        require!(
            u64::from(charge_permille) >= PERMILLE_BASE,
            LedgerError::InvalidChargePermille
        );
        require!(
            usize::from(node_count) <= MAX_ATTESTERS,
            LedgerError::InvalidAttesterCount
        );
        Ok(())
    }

    /// Charge multiplier applied to stacks of the given security level
    pub fn charge_permille_for(&self, level: SecurityLevel) -> u16 {
        match level {
            SecurityLevel::Standard => PERMILLE_BASE as u16,
            SecurityLevel::SamplingConsensus => self.sampling_consensus_charge_permille,
        }
    }

    pub fn allocate_node_id(&mut self) -> Result<u64> {
        allocate(&mut self.next_node_id)
    }

    pub fn allocate_task_id(&mut self) -> Result<u64> {
        allocate(&mut self.next_task_id)
    }

    pub fn allocate_stack_id(&mut self) -> Result<u64> {
        allocate(&mut self.next_stack_id)
    }

    pub fn allocate_ticket_id(&mut self) -> Result<u64> {
        allocate(&mut self.next_ticket_id)
    }

    /// `MIN_SUPPORTED_VERSION <= min_supported_version <= protocol_version
    /// <= CURRENT_PROTOCOL_VERSION`
    pub fn is_version_compatible(&self) -> bool {
        MIN_SUPPORTED_VERSION <= self.min_supported_version
            && self.min_supported_version <= self.protocol_version
            && self.protocol_version <= CURRENT_PROTOCOL_VERSION
    }
}

fn allocate(counter: &mut u64) -> Result<u64> {
    let id = *counter;
    *counter = id.checked_add(1).ok_or(LedgerError::ArithmeticOverflow)?;
    Ok(id)
}

// ============================================================================
// Treasuries
// ============================================================================

/// Protocol treasury account. Lamports above rent always equal `balance`.
/// PDA seeds: ["treasury", kind.seed()]
#[account]
#[derive(InitSpace, Default)]
pub struct Treasury {
    /// Fee or communal
    pub kind: TreasuryKind,
    /// Lamports currently held for the protocol
    pub balance: u64,
    /// Monotonic sum of every deposit
    pub total_deposited: u64,
    /// Monotonic sum of every withdrawal
    pub total_withdrawn: u64,
    /// Bump seed
    pub bump: u8,
}

impl Treasury {
    pub const SIZE: usize = 8 + // discriminator
        1 +  // kind
        8 +  // balance
        8 +  // total_deposited
        8 +  // total_withdrawn
        1; // bump

    pub fn record_deposit(&mut self, amount: u64) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn record_withdrawal(&mut self, amount: u64) -> Result<()> {
        require!(
            self.balance >= amount,
            LedgerError::InsufficientTreasuryBalance
        );
        self.balance -= amount;
        self.total_withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }
}

// ============================================================================
// Node Registry
// ============================================================================

/// Two-slot rolling fee ledger.
///
/// Fees accrued in epoch `E` sit in `current_epoch_amount` until some call
/// happens in a later epoch, at which point they roll into `withdrawable`.
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default, InitSpace,
)]
pub struct FeeLedger {
    /// Epoch of the most recent accrual tick
    pub last_accrual_epoch: u64,
    /// Fees accrued during `last_accrual_epoch`, still locked
    pub current_epoch_amount: u64,
    /// Fees unlocked for withdrawal
    pub withdrawable: u64,
}

impl FeeLedger {
    pub fn new(epoch: u64) -> Self {
        Self {
            last_accrual_epoch: epoch,
            current_epoch_amount: 0,
            withdrawable: 0,
        }
    }

    /// Add `amount` to the ledger, rolling the previous slot over first when
    /// the epoch has advanced.
    pub fn accrue(&mut self, amount: u64, epoch: u64) -> Result<()> {
        if epoch > self.last_accrual_epoch {
            self.withdrawable = self
                .withdrawable
                .checked_add(self.current_epoch_amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            self.current_epoch_amount = amount;
            self.last_accrual_epoch = epoch;
        } else {
            self.current_epoch_amount = self
                .current_epoch_amount
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow)?;
        }
        Ok(())
    }

    /// Tick the ledger with a zero accrual and drain everything unlocked.
    pub fn take_withdrawable(&mut self, epoch: u64) -> Result<u64> {
        self.accrue(0, epoch)?;
        Ok(std::mem::take(&mut self.withdrawable))
    }

    /// Everything the fee treasury still owes this node
    pub fn outstanding(&self) -> Result<u64> {
        self.current_epoch_amount
            .checked_add(self.withdrawable)
            .ok_or(LedgerError::ArithmeticOverflow.into())
    }
}

/// Registered compute node. Collateral lamports are held in this account.
/// PDA seeds: ["node", id.to_le_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct Node {
    /// Sequential node id
    pub id: u64,
    /// Wallet that registered the node
    pub owner: Pubkey,
    /// Collateral still locked
    pub collateral: u64,
    /// Epoch the node was disabled at, if ever
    pub disabled_at: Option<u64>,
    /// Reputation score (0-255)
    pub reputation: u8,
    /// Fee accrual state
    pub fees: FeeLedger,
    /// Registration epoch
    pub registered_at: u64,
    /// Bump seed
    pub bump: u8,
}

impl Node {
    pub const SIZE: usize = 8 + // discriminator
        8 +  // id
        32 + // owner
        8 +  // collateral
        9 +  // disabled_at (Option<u64>)
        1 +  // reputation
        24 + // fees
        8 +  // registered_at
        1; // bump

    pub fn new(id: u64, owner: Pubkey, collateral: u64, epoch: u64, bump: u8) -> Self {
        Self {
            id,
            owner,
            collateral,
            disabled_at: None,
            reputation: INITIAL_REPUTATION,
            fees: FeeLedger::new(epoch),
            registered_at: epoch,
            bump,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }

    /// Enabled and still collateralized
    pub fn is_selectable(&self) -> bool {
        !self.is_disabled() && self.collateral > 0
    }

    /// Disable the node. There is no way back.
    pub fn disable(&mut self, epoch: u64) -> Result<()> {
        require!(!self.is_disabled(), LedgerError::NodeAlreadyDisabled);
        self.disabled_at = Some(epoch);
        Ok(())
    }

    pub fn ensure_destroyable(&self, epoch: u64) -> Result<()> {
        let disabled_at = self.disabled_at.ok_or(LedgerError::NodeNotDisabled)?;
        let unlock = disabled_at
            .checked_add(NODE_DESTROY_WAIT_EPOCHS)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        require!(epoch >= unlock, LedgerError::NodeDestroyWaitNotElapsed);
        Ok(())
    }

    /// Confiscate `ceil(collateral * permille / 1000)`, clamped to what is left.
    /// Returns the confiscated amount.
    pub fn slash_timeout(&mut self, permille: u16) -> Result<u64> {
        if self.collateral == 0 {
            return Ok(0);
        }
        let scaled = u128::from(self.collateral)
            .checked_mul(u128::from(permille))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let amount = scaled.div_ceil(u128::from(PERMILLE_BASE));
        let amount = u64::try_from(amount)
            .unwrap_or(u64::MAX)
            .min(self.collateral);
        self.collateral -= amount;
        self.reputation = self.reputation.saturating_sub(REPUTATION_TIMEOUT_PENALTY);
        Ok(amount)
    }

    /// Confiscate all remaining collateral
    pub fn slash_all(&mut self) -> u64 {
        std::mem::take(&mut self.collateral)
    }

    pub fn reward_claim(&mut self) {
        self.reputation = self.reputation.saturating_add(REPUTATION_PER_CLAIM);
    }
}

/// Registered model a task may reference
/// PDA seeds: ["model", name.as_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct ModelEntry {
    /// Model name (printable ASCII)
    #[max_len(32)]
    pub name: String,
    /// Authority that registered the model
    pub registered_by: Pubkey,
    /// Registration epoch
    pub registered_at: u64,
    /// Bump seed
    pub bump: u8,
}

impl ModelEntry {
    pub const SIZE: usize = 8 + // discriminator
        (4 + MAX_MODEL_NAME_LEN) + // name
        32 + // registered_by
        8 +  // registered_at
        1; // bump
}

// ============================================================================
// Task Catalog
// ============================================================================

/// Price and capacity a node advertises for a task
#[derive(
    AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, Default, InitSpace,
)]
pub struct Advertisement {
    pub node_id: u64,
    pub price_per_unit: u64,
    pub max_units: u64,
}

/// Catalog entry for a kind of computation
/// PDA seeds: ["task", id.to_le_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct Task {
    /// Sequential task id
    pub id: u64,
    /// Creator, allowed to deprecate and remove
    pub owner: Pubkey,
    /// Role tag (see [`task_role`])
    pub role: u8,
    /// Registered model account, if any
    pub model: Option<Pubkey>,
    /// Required security level
    pub security_level: SecurityLevel,
    /// Minimum node reputation to subscribe or be selected (0 = none)
    pub minimum_reputation: u8,
    /// Epoch the task was deprecated at, if ever
    pub deprecated_at: Option<u64>,
    /// Node advertisements. Removal swaps with the last entry, so indices
    /// held by callers are only hints.
    #[max_len(24)]
    pub advertisements: Vec<Advertisement>,
    /// Nodes allowed to subscribe and serve. Empty means open to all.
    #[max_len(24)]
    pub whitelist: Vec<u64>,
    /// Creation epoch
    pub created_at: u64,
    /// Bump seed
    pub bump: u8,
}

impl Task {
    pub const SIZE: usize = 8 + // discriminator
        8 +  // id
        32 + // owner
        1 +  // role
        33 + // model (Option<Pubkey>)
        1 +  // security_level
        1 +  // minimum_reputation
        9 +  // deprecated_at (Option<u64>)
        (4 + 24 * MAX_TASK_ADVERTISEMENTS) + // advertisements
        (4 + 8 * MAX_TASK_WHITELIST) + // whitelist
        8 +  // created_at
        1; // bump

    pub fn is_deprecated(&self) -> bool {
        self.deprecated_at.is_some()
    }

    pub fn ensure_active(&self) -> Result<()> {
        require!(!self.is_deprecated(), LedgerError::TaskDeprecated);
        Ok(())
    }

    /// Deprecation is one-way
    pub fn deprecate(&mut self, epoch: u64) -> Result<()> {
        require!(!self.is_deprecated(), LedgerError::TaskAlreadyDeprecated);
        self.deprecated_at = Some(epoch);
        Ok(())
    }

    pub fn ensure_removable(&self, epoch: u64) -> Result<()> {
        let deprecated_at = self.deprecated_at.ok_or(LedgerError::TaskNotDeprecated)?;
        let unlock = deprecated_at
            .checked_add(TASK_REMOVAL_GRACE_EPOCHS)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        require!(epoch >= unlock, LedgerError::TaskRemovalGraceNotElapsed);
        Ok(())
    }

    pub fn position_of(&self, node_id: u64) -> Option<usize> {
        self.advertisements
            .iter()
            .position(|ad| ad.node_id == node_id)
    }

    pub fn advertisement_for(&self, node_id: u64) -> Option<&Advertisement> {
        self.position_of(node_id).map(|i| &self.advertisements[i])
    }

    pub fn is_whitelisted(&self, node_id: u64) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(&node_id)
    }

    /// Add `node_ids` to the whitelist. Ids already present are skipped.
    /// Returns how many were added.
    pub fn whitelist_nodes(&mut self, node_ids: &[u64]) -> Result<usize> {
        self.ensure_active()?;
        require!(!node_ids.is_empty(), LedgerError::InvalidInput);
        let before = self.whitelist.len();
        for node_id in node_ids {
            if self.whitelist.contains(node_id) {
                continue;
            }
            require!(
                self.whitelist.len() < MAX_TASK_WHITELIST,
                LedgerError::TaskWhitelistFull
            );
            self.whitelist.push(*node_id);
        }
        Ok(self.whitelist.len() - before)
    }

    pub fn subscribe(&mut self, node_id: u64, price_per_unit: u64, max_units: u64) -> Result<()> {
        self.ensure_active()?;
        require!(
            self.is_whitelisted(node_id),
            LedgerError::NodeNotWhitelisted
        );
        validate_terms(price_per_unit, max_units)?;
        require!(
            self.position_of(node_id).is_none(),
            LedgerError::AlreadySubscribed
        );
        require!(
            self.advertisements.len() < MAX_TASK_ADVERTISEMENTS,
            LedgerError::TaskSubscriptionsFull
        );
        self.advertisements.push(Advertisement {
            node_id,
            price_per_unit,
            max_units,
        });
        Ok(())
    }

    /// Remove the node's advertisement wherever it sits
    pub fn unsubscribe(&mut self, node_id: u64) -> Result<Advertisement> {
        let index = self
            .position_of(node_id)
            .ok_or(LedgerError::NotSubscribed)?;
        Ok(self.advertisements.swap_remove(index))
    }

    /// Remove the advertisement at `index`, which must belong to `node_id`.
    /// A stale index aborts with `SubscriptionIndexMismatch`.
    pub fn unsubscribe_at(&mut self, index: usize, node_id: u64) -> Result<Advertisement> {
        let matches = self
            .advertisements
            .get(index)
            .is_some_and(|ad| ad.node_id == node_id);
        require!(matches, LedgerError::SubscriptionIndexMismatch);
        Ok(self.advertisements.swap_remove(index))
    }

    pub fn update_subscription(
        &mut self,
        node_id: u64,
        price_per_unit: u64,
        max_units: u64,
    ) -> Result<()> {
        validate_terms(price_per_unit, max_units)?;
        let index = self
            .position_of(node_id)
            .ok_or(LedgerError::NotSubscribed)?;
        let ad = &mut self.advertisements[index];
        ad.price_per_unit = price_per_unit;
        ad.max_units = max_units;
        Ok(())
    }
}

fn validate_terms(price_per_unit: u64, max_units: u64) -> Result<()> {
    require!(price_per_unit > 0, LedgerError::InvalidPrice);
    require!(max_units > 0, LedgerError::InvalidMaxUnits);
    Ok(())
}

/// Marks that a node advertises on a task. Existence is the subscription.
/// PDA seeds: ["subscription", task_id.to_le_bytes(), node_id.to_le_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct Subscription {
    pub task_id: u64,
    pub node_id: u64,
    /// Node owner that paid rent for this marker
    pub owner: Pubkey,
    /// Epoch the subscription was created
    pub subscribed_at: u64,
    /// Bump seed
    pub bump: u8,
}

impl Subscription {
    pub const SIZE: usize = 8 + // discriminator
        8 +  // task_id
        8 +  // node_id
        32 + // owner
        8 +  // subscribed_at
        1; // bump
}

// ============================================================================
// Stack Escrow
// ============================================================================

/// Prepaid escrow of compute units bound to one node.
/// PDA seeds: ["stack", id.to_le_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct Stack {
    /// Sequential stack id
    pub id: u64,
    /// Buyer, receives the refund on claim
    pub owner: Pubkey,
    pub task_id: u64,
    /// Compute units purchased
    pub total_units: u64,
    /// Price per unit, locked to the buyer's price cap
    pub price_per_unit: u64,
    /// Node selected at purchase
    pub node_id: u64,
    /// Security level of the task at purchase
    pub security_level: SecurityLevel,
    /// Charge multiplier locked at purchase (1000 for Standard)
    pub charge_permille: u16,
    /// Lamports moved into the fee treasury at purchase
    pub prepaid: u64,
    /// Purchase epoch
    pub purchased_at: u64,
    /// Buyer's seed, reused for attester sampling at settlement
    pub purchase_seed: [u8; 32],
    /// Set once a settlement ticket is opened
    pub in_settlement: bool,
    /// Bump seed
    pub bump: u8,
}

impl Stack {
    pub const SIZE: usize = 8 + // discriminator
        8 +  // id
        32 + // owner
        8 +  // task_id
        8 +  // total_units
        8 +  // price_per_unit
        8 +  // node_id
        1 +  // security_level
        2 +  // charge_permille
        8 +  // prepaid
        8 +  // purchased_at
        32 + // purchase_seed
        1 +  // in_settlement
        1; // bump

    /// `units * price * charge / 1000`, floored
    pub fn charge_for(units: u64, price_per_unit: u64, charge_permille: u16) -> Result<u64> {
        let total = u128::from(units)
            .checked_mul(u128::from(price_per_unit))
            .and_then(|v| v.checked_mul(u128::from(charge_permille)))
            .ok_or(LedgerError::ArithmeticOverflow)?
            / u128::from(PERMILLE_BASE);
        u64::try_from(total).map_err(|_| LedgerError::ArithmeticOverflow.into())
    }

    /// Cost of `units` at this stack's locked terms
    pub fn cost_of(&self, units: u64) -> Result<u64> {
        Self::charge_for(units, self.price_per_unit, self.charge_permille)
    }

    /// Mark the stack as settling; at most once per stack.
    pub fn begin_settlement(&mut self, claimed_units: u64) -> Result<()> {
        require!(!self.in_settlement, LedgerError::StackAlreadySettling);
        require!(
            claimed_units <= self.total_units,
            LedgerError::ClaimedUnitsExceedTotal
        );
        self.in_settlement = true;
        Ok(())
    }
}

// ============================================================================
// Settlement
// ============================================================================

/// Result of recording one attestation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationOutcome {
    /// Leaf stored; more attesters outstanding
    Recorded { remaining: u8 },
    /// Every attester agreed and the aggregate matches the committed proof
    Completed,
    /// The ticket is now disputed
    Disputed { competing_proof: [u8; PROOF_SIZE] },
}

/// Pending settlement for one stack.
/// PDA seeds: ["ticket", stack_id.to_le_bytes()]
#[account]
#[derive(InitSpace, Default)]
pub struct SettlementTicket {
    /// Sequential ticket id
    pub id: u64,
    pub stack_id: u64,
    /// Node that opened the ticket
    pub node_id: u64,
    /// Units the node claims to have processed
    pub claimed_units: u64,
    pub security_level: SecurityLevel,
    /// Sampled attester node ids; slot `i` owns buffer segment `i + 1`
    #[max_len(8)]
    pub attesters: Vec<u64>,
    /// Segment 0 is the asserting node's leaf, then one per attester
    #[max_len(9)]
    pub leaf_buffer: Vec<[u8; PROOF_SIZE]>,
    /// Bit `i` set once attester slot `i` attested
    pub attested_mask: u8,
    /// Bit `i` set once attester slot `i` was paid or slashed
    pub settled_mask: u8,
    /// Last epoch attestations and disputes are accepted; claims open at it
    pub dispute_deadline: u64,
    /// One-way dispute flag
    pub disputed: bool,
    /// Proof committed by the asserting node
    pub proof: [u8; PROOF_SIZE],
    /// Creation epoch
    pub created_at: u64,
    /// Bump seed
    pub bump: u8,
}

impl SettlementTicket {
    pub const SIZE: usize = 8 + // discriminator
        8 +  // id
        8 +  // stack_id
        8 +  // node_id
        8 +  // claimed_units
        1 +  // security_level
        (4 + 8 * MAX_ATTESTERS) + // attesters
        (4 + PROOF_SIZE * (MAX_ATTESTERS + 1)) + // leaf_buffer
        1 +  // attested_mask
        1 +  // settled_mask
        8 +  // dispute_deadline
        1 +  // disputed
        PROOF_SIZE + // proof
        8 +  // created_at
        1; // bump

    /// Fill in a freshly created ticket
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        id: u64,
        stack: &Stack,
        claimed_units: u64,
        attesters: Vec<u64>,
        proof: [u8; PROOF_SIZE],
        leaf: [u8; PROOF_SIZE],
        epoch: u64,
        bump: u8,
    ) -> Result<()> {
        require!(
            attesters.len() <= MAX_ATTESTERS,
            LedgerError::InvalidAttesterCount
        );
        let mut leaf_buffer = vec![[0u8; PROOF_SIZE]; attesters.len() + 1];
        leaf_buffer[0] = leaf;

        self.id = id;
        self.stack_id = stack.id;
        self.node_id = stack.node_id;
        self.claimed_units = claimed_units;
        self.security_level = stack.security_level;
        self.attesters = attesters;
        self.leaf_buffer = leaf_buffer;
        self.attested_mask = 0;
        self.settled_mask = 0;
        self.dispute_deadline = epoch
            .checked_add(DISPUTE_WINDOW_EPOCHS)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.disputed = false;
        self.proof = proof;
        self.created_at = epoch;
        self.bump = bump;
        Ok(())
    }

    pub fn attester_slot(&self, node_id: u64) -> Option<usize> {
        self.attesters.iter().position(|id| *id == node_id)
    }

    pub fn is_attested(&self, slot: usize) -> bool {
        self.attested_mask & (1u8 << slot) != 0
    }

    pub fn is_settled(&self, slot: usize) -> bool {
        self.settled_mask & (1u8 << slot) != 0
    }

    pub fn attested_count(&self) -> u8 {
        self.attested_mask.count_ones() as u8
    }

    pub fn mark_settled(&mut self, slot: usize) -> Result<()> {
        require!(slot < self.attesters.len(), LedgerError::NotAnAttester);
        require!(!self.is_settled(slot), LedgerError::AttesterAlreadySettled);
        self.settled_mask |= 1u8 << slot;
        Ok(())
    }

    fn ensure_window_open(&self, epoch: u64) -> Result<()> {
        require!(!self.disputed, LedgerError::TicketDisputed);
        require!(
            epoch <= self.dispute_deadline,
            LedgerError::DisputeWindowClosed
        );
        Ok(())
    }

    /// Record an attester's proof and leaf.
    ///
    /// A proof different from the committed one disputes the ticket
    /// immediately. When the last attester arrives, the aggregate of the
    /// leaf buffer is checked against the committed proof.
    pub fn record_attestation(
        &mut self,
        node_id: u64,
        proof: [u8; PROOF_SIZE],
        leaf: [u8; PROOF_SIZE],
        epoch: u64,
    ) -> Result<AttestationOutcome> {
        require!(
            self.security_level == SecurityLevel::SamplingConsensus,
            LedgerError::NotSamplingConsensus
        );
        self.ensure_window_open(epoch)?;
        let slot = self
            .attester_slot(node_id)
            .ok_or(LedgerError::NotAnAttester)?;
        require!(!self.is_settled(slot), LedgerError::AttesterAlreadySettled);
        require!(!self.is_attested(slot), LedgerError::AlreadyAttested);

        if proof != self.proof {
            self.disputed = true;
            return Ok(AttestationOutcome::Disputed {
                competing_proof: proof,
            });
        }

        self.leaf_buffer[slot + 1] = leaf;
        self.attested_mask |= 1u8 << slot;

        let requested = self.attesters.len() as u8;
        let attested = self.attested_count();
        if attested < requested {
            return Ok(AttestationOutcome::Recorded {
                remaining: requested - attested,
            });
        }

        let aggregate = self.aggregate_leaves();
        if aggregate != self.proof {
            self.disputed = true;
            return Ok(AttestationOutcome::Disputed {
                competing_proof: aggregate,
            });
        }
        Ok(AttestationOutcome::Completed)
    }

    /// Flag the ticket as disputed on behalf of a requested attester
    pub fn open_dispute(&mut self, accuser_node_id: u64, epoch: u64) -> Result<()> {
        self.ensure_window_open(epoch)?;
        let slot = self
            .attester_slot(accuser_node_id)
            .ok_or(LedgerError::NotAnAttester)?;
        require!(!self.is_settled(slot), LedgerError::AttesterAlreadySettled);
        self.disputed = true;
        Ok(())
    }

    /// Claims need an undisputed ticket whose window has passed
    pub fn ensure_claimable(&self, epoch: u64) -> Result<()> {
        require!(!self.disputed, LedgerError::TicketDisputed);
        require!(
            epoch >= self.dispute_deadline,
            LedgerError::DisputeWindowOpen
        );
        Ok(())
    }

    /// SHA-256 over the concatenated leaf buffer
    pub fn aggregate_leaves(&self) -> [u8; PROOF_SIZE] {
        let parts: Vec<&[u8]> = self.leaf_buffer.iter().map(|seg| seg.as_slice()).collect();
        sha256_concat(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SIZE should equal INIT_SPACE (borsh serialized) + 8-byte discriminator.
    macro_rules! test_size_constant {
        ($struct:ty) => {
            assert_eq!(
                <$struct>::SIZE,
                <$struct as anchor_lang::Space>::INIT_SPACE + 8,
                concat!(stringify!($struct), "::SIZE mismatch with INIT_SPACE")
            );
        };
    }

    #[test]
    fn test_account_sizes() {
        test_size_constant!(ProtocolConfig);
        test_size_constant!(Treasury);
        test_size_constant!(Node);
        test_size_constant!(ModelEntry);
        test_size_constant!(Task);
        test_size_constant!(Subscription);
        test_size_constant!(Stack);
        test_size_constant!(SettlementTicket);
    }

    #[test]
    fn test_accounts_fit_in_single_allocation() {
        assert!(Task::SIZE <= 10_240);
        assert!(SettlementTicket::SIZE <= 10_240);
    }

    fn assert_err<T: std::fmt::Debug>(result: Result<T>, expected: LedgerError) {
        match result {
            Err(anchor_lang::error::Error::AnchorError(e)) => assert_eq!(
                e.error_code_number,
                expected as u32 + anchor_lang::error::ERROR_CODE_OFFSET
            ),
            other => panic!("expected {:?}, got {:?}", expected, other),
        }
    }

    mod protocol_config {
        use super::*;

        #[test]
        fn test_ids_start_at_one_and_increase() {
            let mut config = ProtocolConfig::default();
            assert_eq!(config.allocate_node_id().unwrap(), 1);
            assert_eq!(config.allocate_node_id().unwrap(), 2);
            assert_eq!(config.allocate_task_id().unwrap(), 1);
            assert_eq!(config.allocate_stack_id().unwrap(), 1);
            assert_eq!(config.allocate_ticket_id().unwrap(), 1);
            assert_eq!(config.next_node_id, 3);
        }

        #[test]
        fn test_allocator_overflow() {
            let mut config = ProtocolConfig {
                next_stack_id: u64::MAX,
                ..Default::default()
            };
            assert_err(config.allocate_stack_id(), LedgerError::ArithmeticOverflow);
        }

        #[test]
        fn test_settlement_param_validation() {
            assert!(ProtocolConfig::validate_settlement_params(100, 2000, 100, 3).is_ok());
            assert!(ProtocolConfig::validate_settlement_params(1000, 1000, 0, 0).is_ok());
            assert_err(
                ProtocolConfig::validate_settlement_params(1001, 2000, 100, 3),
                LedgerError::InvalidPermille,
            );
            assert_err(
                ProtocolConfig::validate_settlement_params(100, 2000, 1001, 3),
                LedgerError::InvalidPermille,
            );
            assert_err(
                ProtocolConfig::validate_settlement_params(100, 999, 100, 3),
                LedgerError::InvalidChargePermille,
            );
            assert_err(
                ProtocolConfig::validate_settlement_params(100, 2000, 100, 9),
                LedgerError::InvalidAttesterCount,
            );
        }

        #[test]
        fn test_charge_permille_for_level() {
            let config = ProtocolConfig::default();
            assert_eq!(config.charge_permille_for(SecurityLevel::Standard), 1000);
            assert_eq!(
                config.charge_permille_for(SecurityLevel::SamplingConsensus),
                DEFAULT_SAMPLING_CONSENSUS_CHARGE_PERMILLE
            );
        }

        #[test]
        fn test_default_is_version_compatible() {
            assert!(ProtocolConfig::default().is_version_compatible());
        }
    }

    mod treasury {
        use super::*;

        #[test]
        fn test_deposit_and_withdraw_track_totals() {
            let mut treasury = Treasury::default();
            treasury.record_deposit(500).unwrap();
            treasury.record_withdrawal(200).unwrap();
            treasury.record_deposit(50).unwrap();
            assert_eq!(treasury.balance, 350);
            assert_eq!(treasury.total_deposited, 550);
            assert_eq!(treasury.total_withdrawn, 200);
        }

        #[test]
        fn test_overdraw_rejected() {
            let mut treasury = Treasury::default();
            treasury.record_deposit(10).unwrap();
            assert_err(
                treasury.record_withdrawal(11),
                LedgerError::InsufficientTreasuryBalance,
            );
            assert_eq!(treasury.balance, 10);
        }

        #[test]
        fn test_seeds() {
            assert_eq!(TreasuryKind::Fee.seed(), b"fee");
            assert_eq!(TreasuryKind::Communal.seed(), b"communal");
        }
    }

    mod fee_ledger {
        use super::*;

        #[test]
        fn test_same_epoch_accrual_stays_locked() {
            let mut fees = FeeLedger::new(5);
            fees.accrue(100, 5).unwrap();
            fees.accrue(50, 5).unwrap();
            assert_eq!(fees.current_epoch_amount, 150);
            assert_eq!(fees.withdrawable, 0);
            assert_eq!(fees.take_withdrawable(5).unwrap(), 0);
        }

        #[test]
        fn test_rollover_on_next_epoch() {
            let mut fees = FeeLedger::new(5);
            fees.accrue(100, 5).unwrap();
            fees.accrue(30, 6).unwrap();
            assert_eq!(fees.withdrawable, 100);
            assert_eq!(fees.current_epoch_amount, 30);
            assert_eq!(fees.last_accrual_epoch, 6);
        }

        #[test]
        fn test_take_withdrawable_ticks_first() {
            let mut fees = FeeLedger::new(1);
            fees.accrue(70, 1).unwrap();
            assert_eq!(fees.take_withdrawable(3).unwrap(), 70);
            assert_eq!(fees.outstanding().unwrap(), 0);
            assert_eq!(fees.take_withdrawable(4).unwrap(), 0);
        }

        #[test]
        fn test_skipped_epochs_roll_once() {
            let mut fees = FeeLedger::new(1);
            fees.accrue(10, 1).unwrap();
            fees.accrue(20, 9).unwrap();
            assert_eq!(fees.withdrawable, 10);
            assert_eq!(fees.current_epoch_amount, 20);
        }
    }

    mod node {
        use super::*;

        fn node(collateral: u64) -> Node {
            Node::new(1, Pubkey::new_unique(), collateral, 10, 255)
        }

        #[test]
        fn test_new_node_defaults() {
            let n = node(1_000);
            assert_eq!(n.reputation, INITIAL_REPUTATION);
            assert_eq!(n.fees, FeeLedger::new(10));
            assert!(n.is_selectable());
        }

        #[test]
        fn test_disable_is_one_way() {
            let mut n = node(1_000);
            n.disable(10).unwrap();
            assert_err(n.disable(11), LedgerError::NodeAlreadyDisabled);
            assert_eq!(n.disabled_at, Some(10));
            assert!(!n.is_selectable());
        }

        #[test]
        fn test_destroy_wait() {
            let mut n = node(1_000);
            assert_err(n.ensure_destroyable(50), LedgerError::NodeNotDisabled);
            n.disable(10).unwrap();
            assert_err(
                n.ensure_destroyable(13),
                LedgerError::NodeDestroyWaitNotElapsed,
            );
            assert!(n.ensure_destroyable(14).is_ok());
        }

        #[test]
        fn test_timeout_slash_rounds_up() {
            let mut n = node(1_001);
            let taken = n.slash_timeout(100).unwrap();
            assert_eq!(taken, 101);
            assert_eq!(n.collateral, 900);
            assert_eq!(n.reputation, INITIAL_REPUTATION - REPUTATION_TIMEOUT_PENALTY);
        }

        #[test]
        fn test_timeout_slash_clamps_to_collateral() {
            let mut n = node(1);
            assert_eq!(n.slash_timeout(1).unwrap(), 1);
            assert_eq!(n.collateral, 0);
        }

        #[test]
        fn test_timeout_slash_noop_on_empty_collateral() {
            let mut n = node(0);
            assert_eq!(n.slash_timeout(500).unwrap(), 0);
            assert_eq!(n.reputation, INITIAL_REPUTATION);
        }

        #[test]
        fn test_slash_all() {
            let mut n = node(777);
            assert_eq!(n.slash_all(), 777);
            assert_eq!(n.collateral, 0);
            assert!(!n.is_selectable());
        }

        #[test]
        fn test_reputation_saturates() {
            let mut n = node(1);
            n.reputation = 255;
            n.reward_claim();
            assert_eq!(n.reputation, 255);
            n.reputation = 3;
            n.slash_timeout(1).unwrap();
            assert_eq!(n.reputation, 0);
        }
    }

    mod task {
        use super::*;

        fn task() -> Task {
            Task {
                id: 1,
                ..Default::default()
            }
        }

        #[test]
        fn test_subscribe_rejects_duplicates_and_zero_terms() {
            let mut t = task();
            t.subscribe(1, 10, 100).unwrap();
            assert_err(t.subscribe(1, 20, 200), LedgerError::AlreadySubscribed);
            assert_err(t.subscribe(2, 0, 100), LedgerError::InvalidPrice);
            assert_err(t.subscribe(2, 10, 0), LedgerError::InvalidMaxUnits);
            assert_eq!(t.advertisements.len(), 1);
        }

        #[test]
        fn test_subscribe_respects_capacity() {
            let mut t = task();
            for id in 0..MAX_TASK_ADVERTISEMENTS as u64 {
                t.subscribe(id, 1, 1).unwrap();
            }
            assert_err(t.subscribe(999, 1, 1), LedgerError::TaskSubscriptionsFull);
        }

        #[test]
        fn test_deprecated_task_rejects_subscriptions() {
            let mut t = task();
            t.deprecate(4).unwrap();
            assert_err(t.deprecate(5), LedgerError::TaskAlreadyDeprecated);
            assert_err(t.subscribe(1, 1, 1), LedgerError::TaskDeprecated);
        }

        #[test]
        fn test_whitelist_gates_subscriptions() {
            let mut t = task();
            assert!(t.is_whitelisted(9));
            t.subscribe(9, 1, 1).unwrap();

            assert_eq!(t.whitelist_nodes(&[1, 2, 1]).unwrap(), 2);
            assert_eq!(t.whitelist_nodes(&[2]).unwrap(), 0);
            assert!(t.is_whitelisted(1));
            assert!(!t.is_whitelisted(9));
            assert_err(t.subscribe(3, 1, 1), LedgerError::NodeNotWhitelisted);
            t.subscribe(2, 1, 1).unwrap();
            // earlier advertisements stay listed
            assert_eq!(t.position_of(9), Some(0));
        }

        #[test]
        fn test_whitelist_bounds() {
            let mut t = task();
            assert_err(t.whitelist_nodes(&[]), LedgerError::InvalidInput);
            let ids: Vec<u64> = (0..MAX_TASK_WHITELIST as u64).collect();
            assert_eq!(t.whitelist_nodes(&ids).unwrap(), MAX_TASK_WHITELIST);
            assert_err(t.whitelist_nodes(&[999]), LedgerError::TaskWhitelistFull);
            assert_eq!(t.whitelist.len(), MAX_TASK_WHITELIST);

            t.deprecate(1).unwrap();
            assert_err(t.whitelist_nodes(&[0]), LedgerError::TaskDeprecated);
        }

        #[test]
        fn test_removal_grace() {
            let mut t = task();
            assert_err(t.ensure_removable(100), LedgerError::TaskNotDeprecated);
            t.deprecate(4).unwrap();
            assert_err(t.ensure_removable(5), LedgerError::TaskRemovalGraceNotElapsed);
            assert!(t.ensure_removable(6).is_ok());
        }

        #[test]
        fn test_unsubscribe_swaps_last_into_place() {
            let mut t = task();
            t.subscribe(1, 10, 10).unwrap();
            t.subscribe(2, 20, 20).unwrap();
            t.subscribe(3, 30, 30).unwrap();
            let removed = t.unsubscribe(1).unwrap();
            assert_eq!(removed.node_id, 1);
            assert_eq!(t.position_of(3), Some(0));
            assert_eq!(t.position_of(2), Some(1));
            assert_err(t.unsubscribe(1), LedgerError::NotSubscribed);
        }

        #[test]
        fn test_unsubscribe_at_detects_stale_index() {
            let mut t = task();
            t.subscribe(1, 10, 10).unwrap();
            t.subscribe(2, 20, 20).unwrap();
            t.subscribe(3, 30, 30).unwrap();
            // Node 3 cached index 2, then node 1 left and node 3 moved to 0.
            t.unsubscribe_at(0, 1).unwrap();
            assert_err(t.unsubscribe_at(2, 3), LedgerError::SubscriptionIndexMismatch);
            assert_err(t.unsubscribe_at(1, 3), LedgerError::SubscriptionIndexMismatch);
            let fresh = t.position_of(3).unwrap();
            assert_eq!(t.unsubscribe_at(fresh, 3).unwrap().price_per_unit, 30);
        }

        #[test]
        fn test_resubscribe_leaves_no_residue() {
            let mut t = task();
            t.subscribe(1, 10, 10).unwrap();
            t.unsubscribe(1).unwrap();
            t.subscribe(1, 99, 5).unwrap();
            assert_eq!(
                t.advertisement_for(1),
                Some(&Advertisement {
                    node_id: 1,
                    price_per_unit: 99,
                    max_units: 5
                })
            );
            assert_eq!(t.advertisements.len(), 1);
        }

        #[test]
        fn test_update_subscription() {
            let mut t = task();
            assert_err(t.update_subscription(1, 5, 5), LedgerError::NotSubscribed);
            t.subscribe(1, 10, 10).unwrap();
            assert_err(t.update_subscription(1, 0, 5), LedgerError::InvalidPrice);
            t.update_subscription(1, 5, 50).unwrap();
            assert_eq!(t.advertisement_for(1).unwrap().max_units, 50);
        }
    }

    mod stack {
        use super::*;

        #[test]
        fn test_charge_for_standard_and_consensus() {
            assert_eq!(Stack::charge_for(10, 7, 1000).unwrap(), 70);
            assert_eq!(Stack::charge_for(10, 7, 2000).unwrap(), 140);
            assert_eq!(Stack::charge_for(3, 1, 1500).unwrap(), 4);
        }

        #[test]
        fn test_charge_for_overflow() {
            assert_err(
                Stack::charge_for(u64::MAX, u64::MAX, 1000),
                LedgerError::ArithmeticOverflow,
            );
        }

        #[test]
        fn test_begin_settlement_once() {
            let mut stack = Stack {
                total_units: 10,
                ..Default::default()
            };
            assert_err(
                stack.begin_settlement(11),
                LedgerError::ClaimedUnitsExceedTotal,
            );
            stack.begin_settlement(10).unwrap();
            assert_err(stack.begin_settlement(1), LedgerError::StackAlreadySettling);
        }
    }

    mod settlement_ticket {
        use super::*;

        const LEAF: [u8; 32] = [1u8; 32];
        const ATTESTER_LEAF: [u8; 32] = [2u8; 32];

        fn consensus_stack() -> Stack {
            Stack {
                id: 7,
                node_id: 1,
                total_units: 10,
                price_per_unit: 5,
                security_level: SecurityLevel::SamplingConsensus,
                charge_permille: 2000,
                ..Default::default()
            }
        }

        fn expected_proof(attesters: usize) -> [u8; 32] {
            let mut parts: Vec<&[u8]> = vec![&LEAF];
            for _ in 0..attesters {
                parts.push(&ATTESTER_LEAF);
            }
            sha256_concat(&parts)
        }

        fn ticket(attesters: Vec<u64>) -> SettlementTicket {
            let proof = expected_proof(attesters.len());
            let mut t = SettlementTicket::default();
            t.open(1, &consensus_stack(), 10, attesters, proof, LEAF, 20, 0)
                .unwrap();
            t
        }

        #[test]
        fn test_open_layout() {
            let t = ticket(vec![4, 5, 6]);
            assert_eq!(t.leaf_buffer.len(), 4);
            assert_eq!(t.leaf_buffer[0], LEAF);
            assert_eq!(t.leaf_buffer[3], [0u8; 32]);
            assert_eq!(t.dispute_deadline, 20 + DISPUTE_WINDOW_EPOCHS);
            assert_eq!(t.node_id, 1);
            assert_eq!(t.stack_id, 7);
        }

        #[test]
        fn test_full_agreement_completes() {
            let mut t = ticket(vec![4, 5]);
            let proof = t.proof;
            assert_eq!(
                t.record_attestation(5, proof, ATTESTER_LEAF, 21).unwrap(),
                AttestationOutcome::Recorded { remaining: 1 }
            );
            assert_eq!(
                t.record_attestation(4, proof, ATTESTER_LEAF, 22).unwrap(),
                AttestationOutcome::Completed
            );
            assert!(!t.disputed);
            assert_eq!(t.attested_count(), 2);
        }

        #[test]
        fn test_proof_mismatch_disputes_immediately() {
            let mut t = ticket(vec![4, 5, 6]);
            let outcome = t.record_attestation(5, [9u8; 32], ATTESTER_LEAF, 21).unwrap();
            assert_eq!(
                outcome,
                AttestationOutcome::Disputed {
                    competing_proof: [9u8; 32]
                }
            );
            assert!(t.disputed);
            assert_eq!(t.attested_count(), 0);
            assert_err(
                t.record_attestation(4, t.proof, ATTESTER_LEAF, 21),
                LedgerError::TicketDisputed,
            );
        }

        #[test]
        fn test_aggregate_mismatch_disputes() {
            let mut t = ticket(vec![4]);
            let proof = t.proof;
            let outcome = t.record_attestation(4, proof, [3u8; 32], 21).unwrap();
            assert!(matches!(outcome, AttestationOutcome::Disputed { .. }));
            assert!(t.disputed);
        }

        #[test]
        fn test_attestation_guards() {
            let mut t = ticket(vec![4, 5]);
            let proof = t.proof;
            assert_err(
                t.record_attestation(9, proof, ATTESTER_LEAF, 21),
                LedgerError::NotAnAttester,
            );
            assert_err(
                t.record_attestation(4, proof, ATTESTER_LEAF, 23),
                LedgerError::DisputeWindowClosed,
            );
            t.record_attestation(4, proof, ATTESTER_LEAF, 22).unwrap();
            assert_err(
                t.record_attestation(4, proof, ATTESTER_LEAF, 22),
                LedgerError::AlreadyAttested,
            );
        }

        #[test]
        fn test_standard_ticket_rejects_attestation() {
            let stack = Stack {
                security_level: SecurityLevel::Standard,
                ..consensus_stack()
            };
            let mut t = SettlementTicket::default();
            t.open(1, &stack, 1, vec![], [0u8; 32], LEAF, 0, 0).unwrap();
            assert_err(
                t.record_attestation(1, [0u8; 32], LEAF, 0),
                LedgerError::NotSamplingConsensus,
            );
        }

        #[test]
        fn test_dispute_and_claim_window() {
            let mut t = ticket(vec![4]);
            assert_err(t.ensure_claimable(21), LedgerError::DisputeWindowOpen);
            assert!(t.ensure_claimable(22).is_ok());
            assert_err(t.open_dispute(8, 21), LedgerError::NotAnAttester);
            t.open_dispute(4, 22).unwrap();
            assert_err(t.ensure_claimable(100), LedgerError::TicketDisputed);
            assert_err(t.open_dispute(4, 22), LedgerError::TicketDisputed);
        }

        #[test]
        fn test_settled_mask() {
            let mut t = ticket(vec![4, 5]);
            t.mark_settled(1).unwrap();
            assert!(t.is_settled(1));
            assert!(!t.is_settled(0));
            assert_err(t.mark_settled(1), LedgerError::AttesterAlreadySettled);
            assert_err(t.mark_settled(2), LedgerError::NotAnAttester);
        }

        #[test]
        fn test_settled_attester_cannot_attest_or_dispute() {
            let mut t = ticket(vec![4, 5]);
            let proof = t.proof;
            // attester 5 claimed its idle slash in the deadline epoch
            t.mark_settled(1).unwrap();
            assert_err(
                t.record_attestation(5, proof, ATTESTER_LEAF, 22),
                LedgerError::AttesterAlreadySettled,
            );
            assert_err(t.open_dispute(5, 22), LedgerError::AttesterAlreadySettled);
            assert_eq!(t.attested_count(), 0);
            assert!(!t.disputed);

            t.record_attestation(4, proof, ATTESTER_LEAF, 22).unwrap();
            assert!(t.is_attested(0));
        }

        #[test]
        fn test_too_many_attesters_rejected() {
            let mut t = SettlementTicket::default();
            let attesters: Vec<u64> = (0..=MAX_ATTESTERS as u64).collect();
            assert_err(
                t.open(1, &consensus_stack(), 1, attesters, [0u8; 32], LEAF, 0, 0),
                LedgerError::InvalidAttesterCount,
            );
        }
    }
}
