use serde::{Deserialize, Serialize};

/// Class of work a gateway call performs; the Tier Router maps this (plus
/// tier) to a concrete model id. Defined once on the shared data model
/// since it crosses the gateway/tier-router boundary.
pub use crate::models::TaskClass;

/// Per-call budget, threaded down from the job's `RunConfig`.
#[derive(Debug, Clone, Copy)]
pub struct CallBudget {
    pub max_tokens: u32,
    pub max_wall_ms: u64,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            max_tokens: 2_000,
            max_wall_ms: 30_000,
        }
    }
}

/// Accounting emitted alongside every successful gateway call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd_millis: u64,
}

impl CallUsage {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}
