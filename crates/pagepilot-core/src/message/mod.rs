//! Host-mediated messaging between the content, background and UI contexts.
//!
//! - `registry`: kind-keyed handler registry with duplicate rejection
//! - `host`: the asynchronous channel that stands in for the host boundary
//! - `router`: validation, dispatch, forwarding and the listener loop

pub mod host;
pub mod registry;
pub mod router;
