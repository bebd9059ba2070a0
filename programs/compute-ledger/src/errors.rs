//! Error codes for the compute ledger program

use anchor_lang::prelude::*;

#[error_code]
pub enum LedgerError {
    // Node registry errors
    #[msg("Node registration is currently disabled")]
    RegistrationDisabled,

    #[msg("Only the node owner can perform this action")]
    UnauthorizedNode,

    #[msg("Node is already disabled")]
    NodeAlreadyDisabled,

    #[msg("Node is disabled")]
    NodeDisabled,

    #[msg("Node is not disabled")]
    NodeNotDisabled,

    #[msg("Node destroy wait period has not elapsed")]
    NodeDestroyWaitNotElapsed,

    #[msg("Node still has fees locked in the current epoch")]
    ResidualFeesLocked,

    #[msg("Node account does not match the expected node id")]
    NodeMismatch,

    // Task catalog errors
    #[msg("Invalid task role")]
    InvalidTaskRole,

    #[msg("Invalid security level")]
    InvalidSecurityLevel,

    #[msg("Only the task owner can perform this action")]
    UnauthorizedTaskAction,

    #[msg("Task is deprecated")]
    TaskDeprecated,

    #[msg("Task is already deprecated")]
    TaskAlreadyDeprecated,

    #[msg("Task is not deprecated")]
    TaskNotDeprecated,

    #[msg("Task removal grace period has not elapsed")]
    TaskRemovalGraceNotElapsed,

    #[msg("Task and node accounts are both still live")]
    TaskStillLive,

    #[msg("Task account does not match the stack")]
    TaskMismatch,

    #[msg("Node is already subscribed to this task")]
    AlreadySubscribed,

    #[msg("Node is not subscribed to this task")]
    NotSubscribed,

    #[msg("Task advertisement list is full")]
    TaskSubscriptionsFull,

    #[msg("Subscription index does not point at this node; retry with a fresh index")]
    SubscriptionIndexMismatch,

    #[msg("Price per compute unit must be greater than zero")]
    InvalidPrice,

    #[msg("Max compute units must be greater than zero")]
    InvalidMaxUnits,

    #[msg("Node reputation is below the task minimum")]
    InsufficientReputation,

    #[msg("Node is not on the task whitelist")]
    NodeNotWhitelisted,

    #[msg("Task whitelist is full")]
    TaskWhitelistFull,

    #[msg("Invalid model name")]
    InvalidModelName,

    // Stack escrow errors
    #[msg("No nodes are subscribed to this task")]
    NoNodesSubscribed,

    #[msg("No subscribed node is eligible for this purchase")]
    NoNodesEligible,

    #[msg("Number of compute units must be greater than zero")]
    InvalidComputeUnits,

    #[msg("Candidate node accounts do not match the task advertisements")]
    CandidateAccountsMismatch,

    #[msg("Only the selected node can act on this stack")]
    NotSelectedNode,

    #[msg("Refund account does not match the stack owner")]
    StackOwnerMismatch,

    // Settlement errors
    #[msg("Claimed compute units exceed the stack total")]
    ClaimedUnitsExceedTotal,

    #[msg("Stack already has an open settlement ticket")]
    StackAlreadySettling,

    #[msg("Settlement ticket does not belong to this stack")]
    TicketStackMismatch,

    #[msg("Task does not require sampling consensus")]
    NotSamplingConsensus,

    #[msg("Node was not sampled as an attester for this ticket")]
    NotAnAttester,

    #[msg("Attester has already attested this ticket")]
    AlreadyAttested,

    #[msg("Dispute window has closed")]
    DisputeWindowClosed,

    #[msg("Dispute window is still open")]
    DisputeWindowOpen,

    #[msg("Settlement ticket is disputed")]
    TicketDisputed,

    #[msg("Attester has already been settled for this ticket")]
    AttesterAlreadySettled,

    #[msg("Settlement ticket ids do not match the provided accounts")]
    TicketIdMismatch,

    // Protocol errors
    #[msg("Invalid permille value")]
    InvalidPermille,

    #[msg("Sampling consensus charge must be at least 1000 permille")]
    InvalidChargePermille,

    #[msg("Attestation node count exceeds the maximum")]
    InvalidAttesterCount,

    #[msg("Only the protocol authority can perform this action")]
    UnauthorizedAuthority,

    // General errors
    #[msg("Invalid input parameter")]
    InvalidInput,

    #[msg("Invalid account owner")]
    InvalidAccountOwner,

    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,

    #[msg("Insufficient funds")]
    InsufficientFunds,

    #[msg("Treasury balance is insufficient")]
    InsufficientTreasuryBalance,

    #[msg("Slot hashes sysvar data is malformed")]
    InvalidSlotHashes,

    // Version errors
    #[msg("Protocol version mismatch: account version incompatible with current program")]
    VersionMismatchProtocol,
}
