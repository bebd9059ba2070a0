//! Instruction handlers for the compute ledger

pub mod account_helpers;
pub mod claim_helpers;
pub mod constants;
pub mod lamport_transfer;
pub mod selection_helpers;

pub mod add_model;
pub mod claim_funds;
pub mod claim_funds_for_attestation;
pub mod create_task;
pub mod deprecate_task;
pub mod destroy_node;
pub mod disable_node;
pub mod initialize_protocol;
pub mod purchase_stack;
pub mod register_node;
pub mod release_subscription;
pub mod remove_task;
pub mod slash_node_collateral;
pub mod start_dispute;
pub mod submit_attestation;
pub mod subscribe_node;
pub mod try_settle;
pub mod unsubscribe_node;
pub mod update_registration_params;
pub mod update_settlement_params;
pub mod update_subscription;
pub mod whitelist_nodes_for_task;
pub mod withdraw_fees;

#[allow(ambiguous_glob_reexports)]
pub use add_model::*;
#[allow(ambiguous_glob_reexports)]
pub use claim_funds::*;
#[allow(ambiguous_glob_reexports)]
pub use claim_funds_for_attestation::*;
#[allow(ambiguous_glob_reexports)]
pub use create_task::*;
#[allow(ambiguous_glob_reexports)]
pub use deprecate_task::*;
#[allow(ambiguous_glob_reexports)]
pub use destroy_node::*;
#[allow(ambiguous_glob_reexports)]
pub use disable_node::*;
#[allow(ambiguous_glob_reexports)]
pub use initialize_protocol::*;
#[allow(ambiguous_glob_reexports)]
pub use purchase_stack::*;
#[allow(ambiguous_glob_reexports)]
pub use register_node::*;
#[allow(ambiguous_glob_reexports)]
pub use release_subscription::*;
#[allow(ambiguous_glob_reexports)]
pub use remove_task::*;
#[allow(ambiguous_glob_reexports)]
pub use slash_node_collateral::*;
#[allow(ambiguous_glob_reexports)]
pub use start_dispute::*;
#[allow(ambiguous_glob_reexports)]
pub use submit_attestation::*;
#[allow(ambiguous_glob_reexports)]
pub use subscribe_node::*;
#[allow(ambiguous_glob_reexports)]
pub use try_settle::*;
#[allow(ambiguous_glob_reexports)]
pub use unsubscribe_node::*;
#[allow(ambiguous_glob_reexports)]
pub use update_registration_params::*;
#[allow(ambiguous_glob_reexports)]
pub use update_settlement_params::*;
#[allow(ambiguous_glob_reexports)]
pub use update_subscription::*;
#[allow(ambiguous_glob_reexports)]
pub use whitelist_nodes_for_task::*;
#[allow(ambiguous_glob_reexports)]
pub use withdraw_fees::*;
