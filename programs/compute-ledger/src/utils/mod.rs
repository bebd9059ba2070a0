//! Utility modules for the compute ledger

pub mod digest;
pub mod entropy;
pub mod validation;
pub mod version;
