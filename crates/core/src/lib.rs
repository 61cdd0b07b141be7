//! Rubuy Core - Shared domain types.
//!
//! This crate provides the types used across all Rubuy components:
//! - `market` - Ledger, settlement and shipment engine plus its HTTP surface
//! - `cli` - Command-line tools for migrations and operator tasks
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, currencies and balances, statuses, tracking codes and
//!   the catalog listing shape

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
