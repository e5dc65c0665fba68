//! Key-value storage namespaces for PagePilot.

/// Namespace holding chat sessions, keyed by tab id.
pub const SESSIONS_NAMESPACE: &str = "sessions";

/// Namespace holding untruncated page snapshots, keyed by tab id.
pub const SNAPSHOTS_NAMESPACE: &str = "page-snapshots";
