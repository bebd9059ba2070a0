//! Property-based fuzz testing for the compute ledger program
//!
//! The crate drives an in-memory [`SimulatedLedger`] through the same state
//! methods and helpers the on-chain handlers use, then checks lamport
//! conservation, treasury solvency and catalog consistency after every step.
//!
//! # Usage
//!
//! ```bash
//! # Run all property-based tests
//! cargo test --release -p compute-ledger-fuzz
//!
//! # Run the random sequence runner
//! cargo run --release -p compute-ledger-fuzz --bin fuzz_all
//!
//! # Run with more iterations
//! PROPTEST_CASES=10000 cargo test --release -p compute-ledger-fuzz
//! ```

pub mod arbitrary;
pub mod invariants;
pub mod scenarios;

pub use arbitrary::*;
pub use invariants::*;
pub use scenarios::*;

#[cfg(test)]
#[path = "../fuzz_targets/node_registry.rs"]
mod node_registry_tests;

#[cfg(test)]
#[path = "../fuzz_targets/task_catalog.rs"]
mod task_catalog_tests;

#[cfg(test)]
#[path = "../fuzz_targets/stack_purchase.rs"]
mod stack_purchase_tests;

#[cfg(test)]
#[path = "../fuzz_targets/settlement.rs"]
mod settlement_tests;
