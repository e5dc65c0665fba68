//! HTTP bridge for chat panels running outside this process.
//!
//! Axum router at `/v1/` relaying message envelopes to the routers, with
//! CORS and request tracing.

pub mod handlers;
pub mod router;
