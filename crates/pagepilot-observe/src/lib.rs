//! Observability setup for PagePilot binaries.

pub mod tracing_setup;
