//! Quarter Settle
//!
//! This crate implements the quarterly settlement engine of a multi-project
//! construction ledger: closing a quarter's cost line items, carrying the
//! closing balances forward as the next quarter's opening balances, and
//! running either operation across many projects with per-project failure
//! isolation. Persistence is abstracted behind a pluggable period store.

pub mod core;
pub mod stores;
