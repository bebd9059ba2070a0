//! Simulated ledger for fuzz testing
//!
//! Replays instruction semantics without the Solana runtime. Accounts live in
//! ordered maps keyed by id and wallet lamports are tracked per pubkey, so
//! conservation can be checked after any operation. Every operation goes
//! through the program's own state methods and helpers, and runs against a
//! scratch copy that is committed only on success.

use crate::arbitrary::LedgerAction;
use anchor_lang::error::ErrorCode;
use anchor_lang::prelude::*;
use compute_ledger::errors::LedgerError;
use compute_ledger::instructions::claim_helpers::{
    calculate_claim_split, settle_attester, AttesterSettlement,
};
use compute_ledger::instructions::selection_helpers::{
    eligible_node_ids, sample_attesters, sampling_trial, select_node, EligibilityFilter,
};
use compute_ledger::state::{
    task_role, AttestationOutcome, Node, ProtocolConfig, SecurityLevel, SettlementTicket, Stack,
    Task, Treasury, TreasuryKind, PROOF_SIZE,
};
use compute_ledger::utils::digest::sha256_concat;
use compute_ledger::utils::entropy::{Entropy, PURCHASE_DOMAIN, SETTLEMENT_DOMAIN};
use std::collections::BTreeMap;

/// Deterministic wallet key for actor `index`
pub fn actor(index: u8) -> Pubkey {
    Pubkey::new_from_array(sha256_concat(&[b"actor", &[index]]))
}

/// Leaf an honest participant reports for its share of a stack's work
pub fn work_leaf(stack_id: u64, node_id: u64) -> [u8; PROOF_SIZE] {
    sha256_concat(&[b"leaf", &stack_id.to_le_bytes(), &node_id.to_le_bytes()])
}

/// Proof that matches the aggregate of honest leaves for `attesters`
pub fn honest_proof(stack_id: u64, node_id: u64, attesters: &[u64]) -> [u8; PROOF_SIZE] {
    let leaves: Vec<[u8; PROOF_SIZE]> = std::iter::once(node_id)
        .chain(attesters.iter().copied())
        .map(|id| work_leaf(stack_id, id))
        .collect();
    let parts: Vec<&[u8]> = leaves.iter().map(|leaf| leaf.as_slice()).collect();
    sha256_concat(&parts)
}

/// Error code number of an Anchor error, if it carries one
pub fn error_code_of(err: &anchor_lang::error::Error) -> Option<u32> {
    match err {
        anchor_lang::error::Error::AnchorError(e) => Some(e.error_code_number),
        anchor_lang::error::Error::ProgramError(_) => None,
    }
}

/// True if `result` failed with `expected`
pub fn failed_with<T>(result: &Result<T>, expected: LedgerError) -> bool {
    match result {
        Err(err) => {
            error_code_of(err) == Some(expected as u32 + anchor_lang::error::ERROR_CODE_OFFSET)
        }
        Ok(_) => false,
    }
}

fn missing() -> anchor_lang::error::Error {
    ErrorCode::AccountNotInitialized.into()
}

#[derive(Clone)]
pub struct SimulatedLedger {
    pub epoch: u64,
    pub config: ProtocolConfig,
    pub fee_treasury: Treasury,
    pub communal_treasury: Treasury,
    pub nodes: BTreeMap<u64, Node>,
    pub tasks: BTreeMap<u64, Task>,
    /// Subscription markers keyed by (task id, node id), valued by owner
    pub subscriptions: BTreeMap<(u64, u64), Pubkey>,
    pub stacks: BTreeMap<u64, Stack>,
    /// Open tickets keyed by stack id
    pub tickets: BTreeMap<u64, SettlementTicket>,
    pub wallets: BTreeMap<Pubkey, u64>,
    /// Stand-in for the newest SlotHashes entry
    pub recent_hash: [u8; 32],
}

impl SimulatedLedger {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            epoch: 0,
            config,
            fee_treasury: Treasury {
                kind: TreasuryKind::Fee,
                ..Default::default()
            },
            communal_treasury: Treasury {
                kind: TreasuryKind::Communal,
                ..Default::default()
            },
            nodes: BTreeMap::new(),
            tasks: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
            stacks: BTreeMap::new(),
            tickets: BTreeMap::new(),
            wallets: BTreeMap::new(),
            recent_hash: sha256_concat(&[b"genesis"]),
        }
    }

    /// Default parameters with `actor(0)` as authority
    pub fn with_defaults() -> Self {
        Self::new(ProtocolConfig {
            authority: actor(0),
            ..Default::default()
        })
    }

    pub fn authority(&self) -> Pubkey {
        self.config.authority
    }

    pub fn fund(&mut self, who: Pubkey, lamports: u64) {
        let balance = self.wallets.entry(who).or_default();
        *balance = balance.saturating_add(lamports);
    }

    pub fn balance_of(&self, who: &Pubkey) -> u64 {
        self.wallets.get(who).copied().unwrap_or(0)
    }

    pub fn advance_epochs(&mut self, epochs: u64) {
        self.epoch = self.epoch.saturating_add(epochs);
        self.recent_hash = sha256_concat(&[&self.recent_hash, &self.epoch.to_le_bytes()]);
    }

    /// Every lamport the ledger tracks: wallets, collateral and treasuries
    pub fn total_lamports(&self) -> u128 {
        let wallets: u128 = self.wallets.values().map(|v| u128::from(*v)).sum();
        let collateral: u128 = self.nodes.values().map(|n| u128::from(n.collateral)).sum();
        wallets
            + collateral
            + u128::from(self.fee_treasury.balance)
            + u128::from(self.communal_treasury.balance)
    }

    /// Run `op` against a scratch copy and keep the result only if it
    /// succeeds.
    pub fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut scratch = self.clone();
        let out = op(&mut scratch)?;
        *self = scratch;
        Ok(out)
    }

    fn debit(&mut self, who: Pubkey, amount: u64) -> Result<()> {
        let balance = self.wallets.entry(who).or_default();
        require!(*balance >= amount, LedgerError::InsufficientFunds);
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, who: Pubkey, amount: u64) -> Result<()> {
        let balance = self.wallets.entry(who).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    fn pay_from_fee_treasury(&mut self, to: Pubkey, amount: u64) -> Result<()> {
        self.fee_treasury.record_withdrawal(amount)?;
        self.credit(to, amount)
    }

    /// Remove a node for mutation after checking its owner. The caller
    /// reinserts it; a failed operation discards the scratch copy anyway.
    fn take_owned_node(&mut self, owner: Pubkey, node_id: u64) -> Result<Node> {
        let node = self.nodes.remove(&node_id).ok_or_else(missing)?;
        require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
        Ok(node)
    }

    fn owned_task_mut(&mut self, owner: Pubkey, task_id: u64) -> Result<&mut Task> {
        let task = self.tasks.get_mut(&task_id).ok_or_else(missing)?;
        require_keys_eq!(task.owner, owner, LedgerError::UnauthorizedTaskAction);
        Ok(task)
    }

    fn node_ids_of(&self, task: &Task) -> Vec<Option<Node>> {
        task.advertisements
            .iter()
            .map(|ad| self.nodes.get(&ad.node_id).cloned())
            .collect()
    }

    // ------------------------------------------------------------------
    // Protocol administration
    // ------------------------------------------------------------------

    pub fn update_registration_params(
        &mut self,
        caller: Pubkey,
        registration_enabled: bool,
        registration_collateral: u64,
    ) -> Result<()> {
        self.transact(|l| {
            require_keys_eq!(
                caller,
                l.config.authority,
                LedgerError::UnauthorizedAuthority
            );
            l.config.registration_enabled = registration_enabled;
            l.config.registration_collateral = registration_collateral;
            Ok(())
        })
    }

    pub fn update_settlement_params(
        &mut self,
        caller: Pubkey,
        timeout_slash_permille: u16,
        sampling_consensus_charge_permille: u16,
        attestation_probability_permille: u16,
        attestation_node_count: u8,
    ) -> Result<()> {
        self.transact(|l| {
            require_keys_eq!(
                caller,
                l.config.authority,
                LedgerError::UnauthorizedAuthority
            );
            ProtocolConfig::validate_settlement_params(
                timeout_slash_permille,
                sampling_consensus_charge_permille,
                attestation_probability_permille,
                attestation_node_count,
            )?;
            l.config.timeout_slash_permille = timeout_slash_permille;
            l.config.sampling_consensus_charge_permille = sampling_consensus_charge_permille;
            l.config.attestation_probability_permille = attestation_probability_permille;
            l.config.attestation_node_count = attestation_node_count;
            Ok(())
        })
    }

    pub fn slash_node_collateral(&mut self, caller: Pubkey, node_id: u64) -> Result<u64> {
        self.transact(|l| {
            require_keys_eq!(
                caller,
                l.config.authority,
                LedgerError::UnauthorizedAuthority
            );
            let node = l.nodes.get_mut(&node_id).ok_or_else(missing)?;
            let amount = node.slash_all();
            l.communal_treasury.record_deposit(amount)?;
            Ok(amount)
        })
    }

    // ------------------------------------------------------------------
    // Node registry
    // ------------------------------------------------------------------

    pub fn register_node(&mut self, owner: Pubkey) -> Result<u64> {
        self.transact(|l| {
            require!(
                l.config.registration_enabled,
                LedgerError::RegistrationDisabled
            );
            let collateral = l.config.registration_collateral;
            let node_id = l.config.allocate_node_id()?;
            l.config.active_nodes = l
                .config
                .active_nodes
                .checked_add(1)
                .ok_or(LedgerError::ArithmeticOverflow)?;
            l.debit(owner, collateral)?;
            l.nodes
                .insert(node_id, Node::new(node_id, owner, collateral, l.epoch, 0));
            Ok(node_id)
        })
    }

    pub fn disable_node(&mut self, owner: Pubkey, node_id: u64) -> Result<()> {
        self.transact(|l| {
            let mut node = l.take_owned_node(owner, node_id)?;
            node.disable(l.epoch)?;
            l.config.active_nodes = l.config.active_nodes.saturating_sub(1);
            l.nodes.insert(node_id, node);
            Ok(())
        })
    }

    /// Returns the lamports paid back to the owner
    pub fn destroy_node(&mut self, owner: Pubkey, node_id: u64) -> Result<u64> {
        self.transact(|l| {
            let mut node = l.take_owned_node(owner, node_id)?;
            node.ensure_destroyable(l.epoch)?;
            let fees = node.fees.take_withdrawable(l.epoch)?;
            require!(
                node.fees.current_epoch_amount == 0,
                LedgerError::ResidualFeesLocked
            );
            l.pay_from_fee_treasury(owner, fees)?;
            l.credit(owner, node.collateral)?;
            fees.checked_add(node.collateral)
                .ok_or(LedgerError::ArithmeticOverflow.into())
        })
    }

    pub fn withdraw_fees(&mut self, owner: Pubkey, node_id: u64) -> Result<u64> {
        self.transact(|l| {
            let mut node = l.take_owned_node(owner, node_id)?;
            let amount = node.fees.take_withdrawable(l.epoch)?;
            l.pay_from_fee_treasury(owner, amount)?;
            l.nodes.insert(node_id, node);
            Ok(amount)
        })
    }

    // ------------------------------------------------------------------
    // Task catalog
    // ------------------------------------------------------------------

    pub fn create_task(
        &mut self,
        owner: Pubkey,
        security_level: SecurityLevel,
        minimum_reputation: u8,
    ) -> Result<u64> {
        self.transact(|l| {
            let task_id = l.config.allocate_task_id()?;
            l.tasks.insert(
                task_id,
                Task {
                    id: task_id,
                    owner,
                    role: task_role::CHAT_COMPLETION,
                    security_level,
                    minimum_reputation,
                    created_at: l.epoch,
                    ..Default::default()
                },
            );
            Ok(task_id)
        })
    }

    pub fn deprecate_task(&mut self, owner: Pubkey, task_id: u64) -> Result<()> {
        self.transact(|l| {
            let epoch = l.epoch;
            l.owned_task_mut(owner, task_id)?.deprecate(epoch)
        })
    }

    pub fn whitelist_nodes_for_task(
        &mut self,
        owner: Pubkey,
        task_id: u64,
        node_ids: &[u64],
    ) -> Result<usize> {
        self.transact(|l| l.owned_task_mut(owner, task_id)?.whitelist_nodes(node_ids))
    }

    pub fn remove_task(&mut self, owner: Pubkey, task_id: u64) -> Result<()> {
        self.transact(|l| {
            let epoch = l.epoch;
            l.owned_task_mut(owner, task_id)?.ensure_removable(epoch)?;
            l.tasks.remove(&task_id);
            Ok(())
        })
    }

    pub fn subscribe(
        &mut self,
        owner: Pubkey,
        task_id: u64,
        node_id: u64,
        price_per_unit: u64,
        max_units: u64,
    ) -> Result<()> {
        self.transact(|l| {
            let node = l.nodes.get(&node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            require!(!node.is_disabled(), LedgerError::NodeDisabled);
            let reputation = node.reputation;

            require!(
                !l.subscriptions.contains_key(&(task_id, node_id)),
                LedgerError::AlreadySubscribed
            );
            let task = l.tasks.get_mut(&task_id).ok_or_else(missing)?;
            require!(
                reputation >= task.minimum_reputation,
                LedgerError::InsufficientReputation
            );
            task.subscribe(node_id, price_per_unit, max_units)?;
            l.subscriptions.insert((task_id, node_id), owner);
            Ok(())
        })
    }

    /// `index` mirrors `unsubscribe_node_by_index`
    pub fn unsubscribe(
        &mut self,
        owner: Pubkey,
        task_id: u64,
        node_id: u64,
        index: Option<usize>,
    ) -> Result<()> {
        self.transact(|l| {
            let node = l.nodes.get(&node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            l.subscriptions
                .remove(&(task_id, node_id))
                .ok_or(LedgerError::NotSubscribed)?;
            let task = l.tasks.get_mut(&task_id).ok_or_else(missing)?;
            match index {
                Some(index) => task.unsubscribe_at(index, node_id)?,
                None => task.unsubscribe(node_id)?,
            };
            Ok(())
        })
    }

    pub fn update_subscription(
        &mut self,
        owner: Pubkey,
        task_id: u64,
        node_id: u64,
        price_per_unit: u64,
        max_units: u64,
    ) -> Result<()> {
        self.transact(|l| {
            let node = l.nodes.get(&node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            let task = l.tasks.get_mut(&task_id).ok_or_else(missing)?;
            task.update_subscription(node_id, price_per_unit, max_units)
        })
    }

    /// Close a subscription marker whose task or node is gone
    pub fn release_subscription(&mut self, task_id: u64, node_id: u64) -> Result<()> {
        self.transact(|l| {
            l.subscriptions
                .remove(&(task_id, node_id))
                .ok_or(LedgerError::NotSubscribed)?;
            if let Some(task) = l.tasks.get_mut(&task_id) {
                require!(
                    !l.nodes.contains_key(&node_id),
                    LedgerError::TaskStillLive
                );
                task.unsubscribe(node_id)?;
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Stacks and settlement
    // ------------------------------------------------------------------

    pub fn purchase_stack(
        &mut self,
        buyer: Pubkey,
        task_id: u64,
        num_units: u64,
        price_cap: u64,
        client_seed: [u8; 32],
    ) -> Result<u64> {
        self.transact(|l| {
            require!(num_units > 0, LedgerError::InvalidComputeUnits);
            let task = l.tasks.get(&task_id).ok_or_else(missing)?.clone();
            task.ensure_active()?;
            require!(
                !task.advertisements.is_empty(),
                LedgerError::NoNodesSubscribed
            );

            let candidates = l.node_ids_of(&task);
            let filter = EligibilityFilter {
                price_cap,
                units: num_units,
                minimum_reputation: task.minimum_reputation,
            };
            let eligible = eligible_node_ids(&task, &candidates, &filter);

            let stack_id = l.config.allocate_stack_id()?;
            let mut entropy =
                Entropy::derive(&l.recent_hash, &client_seed, PURCHASE_DOMAIN, stack_id);
            let node_id = select_node(&eligible, &mut entropy)?;

            let charge_permille = l.config.charge_permille_for(task.security_level);
            let prepaid = Stack::charge_for(num_units, price_cap, charge_permille)?;
            l.debit(buyer, prepaid)?;
            l.fee_treasury.record_deposit(prepaid)?;

            l.stacks.insert(
                stack_id,
                Stack {
                    id: stack_id,
                    owner: buyer,
                    task_id,
                    total_units: num_units,
                    price_per_unit: price_cap,
                    node_id,
                    security_level: task.security_level,
                    charge_permille,
                    prepaid,
                    purchased_at: l.epoch,
                    purchase_seed: client_seed,
                    in_settlement: false,
                    bump: 0,
                },
            );
            Ok(stack_id)
        })
    }

    pub fn try_settle(
        &mut self,
        owner: Pubkey,
        stack_id: u64,
        claimed_units: u64,
        proof: [u8; PROOF_SIZE],
        leaf: [u8; PROOF_SIZE],
    ) -> Result<u64> {
        self.transact(|l| {
            let mut stack = l.stacks.remove(&stack_id).ok_or_else(missing)?;
            let node = l.nodes.get(&stack.node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            stack.begin_settlement(claimed_units)?;

            let ticket_id = l.config.allocate_ticket_id()?;
            let attesters = if stack.security_level == SecurityLevel::SamplingConsensus {
                let mut entropy = Entropy::derive(
                    &l.recent_hash,
                    &stack.purchase_seed,
                    SETTLEMENT_DOMAIN,
                    ticket_id,
                );
                if l.config.attestation_node_count > 0
                    && sampling_trial(l.config.attestation_probability_permille, &mut entropy)
                {
                    let pool = match l.tasks.get(&stack.task_id) {
                        Some(task) => {
                            let filter = EligibilityFilter {
                                price_cap: stack.price_per_unit,
                                units: stack.total_units,
                                minimum_reputation: task.minimum_reputation,
                            };
                            eligible_node_ids(task, &l.node_ids_of(task), &filter)
                        }
                        None => Vec::new(),
                    };
                    sample_attesters(
                        pool,
                        usize::from(l.config.attestation_node_count),
                        &mut entropy,
                    )
                } else {
                    Vec::new()
                }
            } else {
                Vec::new()
            };

            let mut ticket = SettlementTicket::default();
            ticket.open(
                ticket_id,
                &stack,
                claimed_units,
                attesters,
                proof,
                leaf,
                l.epoch,
                0,
            )?;
            l.tickets.insert(stack_id, ticket);
            l.stacks.insert(stack_id, stack);
            Ok(ticket_id)
        })
    }

    /// Attesters `try_settle` would sample, without committing anything
    pub fn preview_attesters(
        &self,
        owner: Pubkey,
        stack_id: u64,
        claimed_units: u64,
    ) -> Result<Vec<u64>> {
        let mut scratch = self.clone();
        scratch.try_settle(
            owner,
            stack_id,
            claimed_units,
            [0u8; PROOF_SIZE],
            [0u8; PROOF_SIZE],
        )?;
        scratch
            .tickets
            .get(&stack_id)
            .map(|t| t.attesters.clone())
            .ok_or_else(missing)
    }

    /// Open a ticket whose proof matches the honest leaves of whichever
    /// attesters get sampled
    pub fn settle_honestly(
        &mut self,
        owner: Pubkey,
        stack_id: u64,
        claimed_units: u64,
    ) -> Result<u64> {
        let attesters = self.preview_attesters(owner, stack_id, claimed_units)?;
        let node_id = self.stacks.get(&stack_id).ok_or_else(missing)?.node_id;
        let proof = honest_proof(stack_id, node_id, &attesters);
        self.try_settle(
            owner,
            stack_id,
            claimed_units,
            proof,
            work_leaf(stack_id, node_id),
        )
    }

    pub fn submit_attestation(
        &mut self,
        owner: Pubkey,
        attester_node_id: u64,
        stack_id: u64,
        proof: [u8; PROOF_SIZE],
        leaf: [u8; PROOF_SIZE],
    ) -> Result<AttestationOutcome> {
        self.transact(|l| {
            let node = l.nodes.get(&attester_node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            let epoch = l.epoch;
            let ticket = l.tickets.get_mut(&stack_id).ok_or_else(missing)?;
            ticket.record_attestation(attester_node_id, proof, leaf, epoch)
        })
    }

    /// Attest with the ticket's committed proof and the honest leaf
    pub fn attest_honestly(
        &mut self,
        owner: Pubkey,
        attester_node_id: u64,
        stack_id: u64,
    ) -> Result<AttestationOutcome> {
        let proof = self.tickets.get(&stack_id).ok_or_else(missing)?.proof;
        self.submit_attestation(
            owner,
            attester_node_id,
            stack_id,
            proof,
            work_leaf(stack_id, attester_node_id),
        )
    }

    pub fn start_dispute(
        &mut self,
        owner: Pubkey,
        accuser_node_id: u64,
        stack_id: u64,
    ) -> Result<()> {
        self.transact(|l| {
            let node = l.nodes.get(&accuser_node_id).ok_or_else(missing)?;
            require_keys_eq!(node.owner, owner, LedgerError::UnauthorizedNode);
            let epoch = l.epoch;
            let ticket = l.tickets.get_mut(&stack_id).ok_or_else(missing)?;
            ticket.open_dispute(accuser_node_id, epoch)
        })
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Settle the tickets of `stack_ids` for the serving node. Returns the
    /// unlocked fees paid out at the end.
    pub fn claim_funds(&mut self, owner: Pubkey, node_id: u64, stack_ids: &[u64]) -> Result<u64> {
        self.transact(|l| {
            require!(!stack_ids.is_empty(), LedgerError::InvalidInput);
            let epoch = l.epoch;
            let slash_permille = l.config.timeout_slash_permille;
            let mut node = l.take_owned_node(owner, node_id)?;

            for stack_id in stack_ids {
                let ticket = l.tickets.remove(stack_id).ok_or_else(missing)?;
                require!(ticket.node_id == node.id, LedgerError::NotSelectedNode);
                ticket.ensure_claimable(epoch)?;
                let stack = l.stacks.remove(stack_id).ok_or_else(missing)?;
                let split =
                    calculate_claim_split(&stack, ticket.claimed_units, ticket.attesters.len())?;

                let mut paid_attesters = 0usize;
                for (slot, attester_id) in ticket.attesters.iter().enumerate() {
                    let attested = ticket.is_attested(slot);
                    if ticket.is_settled(slot) {
                        if attested {
                            paid_attesters += 1;
                        }
                        continue;
                    }
                    let outcome = if *attester_id == node.id {
                        settle_attester(
                            &mut node,
                            attested,
                            split.attester_share,
                            slash_permille,
                            epoch,
                        )?
                    } else {
                        let Some(attester) = l.nodes.get_mut(attester_id) else {
                            continue;
                        };
                        settle_attester(
                            attester,
                            attested,
                            split.attester_share,
                            slash_permille,
                            epoch,
                        )?
                    };
                    match outcome {
                        AttesterSettlement::Rewarded(_) => paid_attesters += 1,
                        AttesterSettlement::Slashed(amount) => {
                            l.communal_treasury.record_deposit(amount)?
                        }
                    }
                }

                let node_reward = split.node_reward(paid_attesters)?;
                node.fees.accrue(node_reward, epoch)?;
                node.reward_claim();
                l.pay_from_fee_treasury(stack.owner, split.refund)?;
            }

            let unlocked = node.fees.take_withdrawable(epoch)?;
            l.pay_from_fee_treasury(owner, unlocked)?;
            l.nodes.insert(node_id, node);
            Ok(unlocked)
        })
    }

    /// Settle the attester slot of `node_id` on each ticket early
    pub fn claim_funds_for_attestation(
        &mut self,
        owner: Pubkey,
        node_id: u64,
        stack_ids: &[u64],
    ) -> Result<u64> {
        self.transact(|l| {
            require!(!stack_ids.is_empty(), LedgerError::InvalidInput);
            let epoch = l.epoch;
            let slash_permille = l.config.timeout_slash_permille;
            let mut node = l.take_owned_node(owner, node_id)?;

            for stack_id in stack_ids {
                let stack = l.stacks.get(stack_id).ok_or_else(missing)?.clone();
                let ticket = l.tickets.get_mut(stack_id).ok_or_else(missing)?;
                ticket.ensure_claimable(epoch)?;
                let slot = ticket
                    .attester_slot(node.id)
                    .ok_or(LedgerError::NotAnAttester)?;
                ticket.mark_settled(slot)?;
                let attested = ticket.is_attested(slot);
                let split =
                    calculate_claim_split(&stack, ticket.claimed_units, ticket.attesters.len())?;

                let outcome = settle_attester(
                    &mut node,
                    attested,
                    split.attester_share,
                    slash_permille,
                    epoch,
                )?;
                if let AttesterSettlement::Slashed(amount) = outcome {
                    l.communal_treasury.record_deposit(amount)?;
                }
            }

            let unlocked = node.fees.take_withdrawable(epoch)?;
            l.pay_from_fee_treasury(owner, unlocked)?;
            l.nodes.insert(node_id, node);
            Ok(unlocked)
        })
    }
}

// ============================================================================
// Random sequences
// ============================================================================

/// Wallets funded by [`seeded_ledger`]
pub const ACTORS: u8 = 8;

/// Lamports each actor starts with
pub const ACTOR_FUNDS: u64 = 1_000_000_000_000_000;

/// Default ledger with every actor funded
pub fn seeded_ledger() -> SimulatedLedger {
    let mut ledger = SimulatedLedger::with_defaults();
    for i in 0..ACTORS {
        ledger.fund(actor(i), ACTOR_FUNDS);
    }
    ledger
}

fn pick<K: Copy>(keys: impl ExactSizeIterator<Item = K>, index: u8) -> Result<K> {
    let len = keys.len();
    require!(len > 0, LedgerError::InvalidInput);
    let mut keys = keys;
    keys.nth(usize::from(index) % len).ok_or_else(missing)
}

fn owner_of(ledger: &SimulatedLedger, node_id: u64) -> Result<Pubkey> {
    ledger
        .nodes
        .get(&node_id)
        .map(|n| n.owner)
        .ok_or_else(missing)
}

/// Resolve `action` against the current ledger and apply it
pub fn apply_action(ledger: &mut SimulatedLedger, action: &LedgerAction) -> Result<()> {
    match *action {
        LedgerAction::RegisterNode { owner } => {
            ledger.register_node(actor(owner % ACTORS))?;
        }
        LedgerAction::DisableNode { node } => {
            let node_id = pick(ledger.nodes.keys().copied(), node)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.disable_node(owner, node_id)?;
        }
        LedgerAction::DestroyNode { node } => {
            let node_id = pick(ledger.nodes.keys().copied(), node)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.destroy_node(owner, node_id)?;
        }
        LedgerAction::WithdrawFees { node } => {
            let node_id = pick(ledger.nodes.keys().copied(), node)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.withdraw_fees(owner, node_id)?;
        }
        LedgerAction::SlashNode { node } => {
            let node_id = pick(ledger.nodes.keys().copied(), node)?;
            let authority = ledger.authority();
            ledger.slash_node_collateral(authority, node_id)?;
        }
        LedgerAction::CreateTask {
            owner,
            security_level,
            minimum_reputation,
        } => {
            ledger.create_task(actor(owner % ACTORS), security_level, minimum_reputation)?;
        }
        LedgerAction::DeprecateTask { task } => {
            let task_id = pick(ledger.tasks.keys().copied(), task)?;
            let owner = ledger.tasks[&task_id].owner;
            ledger.deprecate_task(owner, task_id)?;
        }
        LedgerAction::RemoveTask { task } => {
            let task_id = pick(ledger.tasks.keys().copied(), task)?;
            let owner = ledger.tasks[&task_id].owner;
            ledger.remove_task(owner, task_id)?;
        }
        LedgerAction::WhitelistNodes { task, ref nodes } => {
            let task_id = pick(ledger.tasks.keys().copied(), task)?;
            let owner = ledger.tasks[&task_id].owner;
            let node_ids = nodes
                .iter()
                .map(|n| pick(ledger.nodes.keys().copied(), *n))
                .collect::<Result<Vec<_>>>()?;
            ledger.whitelist_nodes_for_task(owner, task_id, &node_ids)?;
        }
        LedgerAction::Subscribe {
            task,
            node,
            price_per_unit,
            max_units,
        } => {
            let task_id = pick(ledger.tasks.keys().copied(), task)?;
            let node_id = pick(ledger.nodes.keys().copied(), node)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.subscribe(owner, task_id, node_id, price_per_unit, max_units)?;
        }
        LedgerAction::Unsubscribe { task, node } => {
            let (task_id, node_id) = pick(ledger.subscriptions.keys().copied(), task ^ node)?;
            let live_owner = ledger.nodes.get(&node_id).map(|n| n.owner);
            match live_owner {
                Some(owner) if ledger.tasks.contains_key(&task_id) => {
                    ledger.unsubscribe(owner, task_id, node_id, None)?
                }
                _ => ledger.release_subscription(task_id, node_id)?,
            }
        }
        LedgerAction::UpdateSubscription {
            task,
            node,
            price_per_unit,
            max_units,
        } => {
            let (task_id, node_id) = pick(ledger.subscriptions.keys().copied(), task ^ node)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.update_subscription(owner, task_id, node_id, price_per_unit, max_units)?;
        }
        LedgerAction::PurchaseStack {
            buyer,
            task,
            units,
            price_cap,
            client_seed,
        } => {
            let task_id = pick(ledger.tasks.keys().copied(), task)?;
            ledger.purchase_stack(
                actor(buyer % ACTORS),
                task_id,
                units,
                price_cap,
                client_seed,
            )?;
        }
        LedgerAction::TrySettle {
            stack,
            claimed_permille,
            honest,
        } => {
            let stack_id = pick(ledger.stacks.keys().copied(), stack)?;
            let (node_id, total) = {
                let s = &ledger.stacks[&stack_id];
                (s.node_id, s.total_units)
            };
            let owner = owner_of(ledger, node_id)?;
            let claimed = (u128::from(total) * u128::from(claimed_permille) / 1000) as u64;
            if honest {
                ledger.settle_honestly(owner, stack_id, claimed)?;
            } else {
                let bogus = sha256_concat(&[b"bogus", &stack_id.to_le_bytes()]);
                ledger.try_settle(owner, stack_id, claimed, bogus, bogus)?;
            }
        }
        LedgerAction::SubmitAttestation {
            stack,
            attester,
            honest,
        } => {
            let stack_id = pick(ledger.tickets.keys().copied(), stack)?;
            let attesters = ledger.tickets[&stack_id].attesters.clone();
            let node_id = pick(attesters.into_iter(), attester)?;
            let owner = owner_of(ledger, node_id)?;
            if honest {
                ledger.attest_honestly(owner, node_id, stack_id)?;
            } else {
                let bogus = sha256_concat(&[b"bogus", &node_id.to_le_bytes()]);
                ledger.submit_attestation(owner, node_id, stack_id, bogus, bogus)?;
            }
        }
        LedgerAction::StartDispute { stack, attester } => {
            let stack_id = pick(ledger.tickets.keys().copied(), stack)?;
            let attesters = ledger.tickets[&stack_id].attesters.clone();
            let node_id = pick(attesters.into_iter(), attester)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.start_dispute(owner, node_id, stack_id)?;
        }
        LedgerAction::ClaimFunds { stack } => {
            let stack_id = pick(ledger.tickets.keys().copied(), stack)?;
            let node_id = ledger.tickets[&stack_id].node_id;
            let owner = owner_of(ledger, node_id)?;
            ledger.claim_funds(owner, node_id, &[stack_id])?;
        }
        LedgerAction::ClaimForAttestation { stack, attester } => {
            let stack_id = pick(ledger.tickets.keys().copied(), stack)?;
            let attesters = ledger.tickets[&stack_id].attesters.clone();
            let node_id = pick(attesters.into_iter(), attester)?;
            let owner = owner_of(ledger, node_id)?;
            ledger.claim_funds_for_attestation(owner, node_id, &[stack_id])?;
        }
        LedgerAction::AdvanceEpoch { epochs } => ledger.advance_epochs(u64::from(epochs)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNDS: u64 = 1_000_000_000_000;

    fn ledger_with_actors(count: u8) -> SimulatedLedger {
        let mut ledger = SimulatedLedger::with_defaults();
        for i in 0..count {
            ledger.fund(actor(i), FUNDS);
        }
        ledger
    }

    #[test]
    fn test_failed_operation_leaves_no_trace() {
        let mut ledger = ledger_with_actors(2);
        let before = ledger.total_lamports();
        let result = ledger.purchase_stack(actor(1), 99, 10, 10, [0u8; 32]);
        assert!(result.is_err());
        assert_eq!(ledger.config.next_stack_id, 1);
        assert_eq!(ledger.total_lamports(), before);
    }

    #[test]
    fn test_register_moves_collateral_out_of_wallet() {
        let mut ledger = ledger_with_actors(2);
        let collateral = ledger.config.registration_collateral;
        let id = ledger.register_node(actor(1)).unwrap();
        assert_eq!(id, 1);
        assert_eq!(ledger.balance_of(&actor(1)), FUNDS - collateral);
        assert_eq!(ledger.nodes[&id].collateral, collateral);
        assert_eq!(ledger.config.active_nodes, 1);
    }

    #[test]
    fn test_register_without_funds_fails() {
        let mut ledger = SimulatedLedger::with_defaults();
        let result = ledger.register_node(actor(5));
        assert!(failed_with(&result, LedgerError::InsufficientFunds));
        assert!(ledger.nodes.is_empty());
    }

    #[test]
    fn test_preview_matches_settlement() {
        let mut ledger = ledger_with_actors(6);
        ledger
            .update_settlement_params(actor(0), 100, 2000, 1000, 3)
            .unwrap();
        let task = ledger
            .create_task(actor(0), SecurityLevel::SamplingConsensus, 0)
            .unwrap();
        for i in 1..=5 {
            let node = ledger.register_node(actor(i)).unwrap();
            ledger.subscribe(actor(i), task, node, 10, 1_000).unwrap();
        }
        let stack = ledger
            .purchase_stack(actor(0), task, 100, 10, [1u8; 32])
            .unwrap();
        let server = ledger.nodes[&ledger.stacks[&stack].node_id].owner;

        let preview = ledger.preview_attesters(server, stack, 100).unwrap();
        assert!(ledger.tickets.is_empty());
        ledger.settle_honestly(server, stack, 100).unwrap();
        assert_eq!(ledger.tickets[&stack].attesters, preview);
        assert_eq!(preview.len(), 3);
    }

    #[test]
    fn test_settler_inputs_do_not_move_the_sample() {
        let mut ledger = ledger_with_actors(8);
        // Sampling fires nine times in ten and asks for one attester
        ledger
            .update_settlement_params(actor(0), 100, 2000, 900, 1)
            .unwrap();
        let task = ledger
            .create_task(actor(0), SecurityLevel::SamplingConsensus, 0)
            .unwrap();
        for i in 1..=7 {
            let node = ledger.register_node(actor(i)).unwrap();
            ledger.subscribe(actor(i), task, node, 10, 1_000).unwrap();
        }
        let stack = ledger
            .purchase_stack(actor(0), task, 100, 10, [3u8; 32])
            .unwrap();
        let server = ledger.nodes[&ledger.stacks[&stack].node_id].owner;

        // Every proof, leaf and claim the settler could grind over lands on
        // the same sample
        let baseline = ledger.preview_attesters(server, stack, 100).unwrap();
        for attempt in 0u8..64 {
            let mut scratch = ledger.clone();
            scratch
                .try_settle(
                    server,
                    stack,
                    u64::from(attempt),
                    [attempt; 32],
                    [attempt.wrapping_mul(7); 32],
                )
                .unwrap();
            assert_eq!(scratch.tickets[&stack].attesters, baseline);
        }
    }

    #[test]
    fn test_non_authority_cannot_change_params() {
        let mut ledger = ledger_with_actors(2);
        let result = ledger.update_registration_params(actor(1), false, 0);
        assert!(failed_with(&result, LedgerError::UnauthorizedAuthority));
        assert!(ledger.config.registration_enabled);
    }
}
