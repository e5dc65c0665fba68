//! Cycle detection for repeated tool calls within one turn.
//!
//! `CycleDetector` hashes each `(tool name, arguments)` signature and flags
//! a call once the same signature has been requested more than the
//! threshold allows. Arguments are hashed in their serialized form, and
//! `serde_json` objects serialize with sorted keys, so key order does not
//! matter.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// Result of checking a tool call against the cycle detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheckResult {
    /// The call is new or within the repetition threshold.
    Ok,
    /// The same call has been requested too many times.
    CycleDetected { tool: String, count: usize },
}

/// Detects identical tool calls repeated within one agent run.
///
/// Cloning produces a shared view (backed by `Arc<Mutex<...>>`).
#[derive(Debug, Clone)]
pub struct CycleDetector {
    seen_signatures: Arc<Mutex<HashMap<u64, usize>>>,
    max_repeats: usize,
}

impl CycleDetector {
    /// Create a detector allowing each call 3 times.
    pub fn new() -> Self {
        Self::with_threshold(3)
    }

    pub fn with_threshold(max: usize) -> Self {
        Self {
            seen_signatures: Arc::new(Mutex::new(HashMap::new())),
            max_repeats: max,
        }
    }

    /// Register a call and report whether it exceeded the threshold.
    pub fn check_and_register(&self, tool: &str, arguments: &Value) -> CycleCheckResult {
        let hash = {
            let mut hasher = DefaultHasher::new();
            tool.hash(&mut hasher);
            arguments.to_string().hash(&mut hasher);
            hasher.finish()
        };

        let mut map = self
            .seen_signatures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let count = map.entry(hash).or_insert(0);
        *count += 1;

        if *count > self.max_repeats {
            CycleCheckResult::CycleDetected {
                tool: tool.to_string(),
                count: *count,
            }
        } else {
            CycleCheckResult::Ok
        }
    }
}

impl Default for CycleDetector {
    fn default() -> Self {
        Self::new()
    }
}
