//! Rubuy market engine.
//!
//! Dual-currency wallets, inventory reservation, order settlement and
//! shipment consolidation for a proxy-purchasing marketplace, with a thin
//! JSON API over them.
//!
//! # Modules
//!
//! - [`ledger`] - Wallet operations, request lifecycles and history replay
//! - [`inventory`] - Stock reservation into carts
//! - [`settlement`] - Checkout and order administration
//! - [`shipment`] - Consolidation and freight pricing
//! - [`codec`] - Stored identifier sets, with repair of malformed values
//! - [`rates`] - Exchange rate gateway
//! - [`db`] - The `Store` seam with Postgres and in-memory implementations
//! - [`routes`] - HTTP handlers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod followup;
pub mod inventory;
pub mod janitor;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod rates;
pub mod routes;
pub mod settlement;
pub mod shipment;
pub mod state;
pub mod tracking;
