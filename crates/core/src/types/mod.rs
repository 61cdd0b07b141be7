//! Core types for Rubuy.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod catalog;
pub mod id;
pub mod money;
pub mod status;
pub mod tracking;

pub use catalog::{ModelListing, ProductListing};
pub use id::*;
pub use money::{Balances, Currency};
pub use status::*;
pub use tracking::{TRACKING_NUMBER_MAX, TRACKING_NUMBER_MIN, TrackingCode, TrackingNamespace};
