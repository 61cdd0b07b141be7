//! HTTP middleware for the market API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, one transaction per request)
//! 2. `TraceLayer` (method, URI, status and latency)
//! 3. `CurrentUser` extractor on every authenticated handler

pub mod identity;

pub use identity::{CurrentUser, IdentityRejection, USER_ID_HEADER};
