//! Lifecycle engine configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Allow `Ended`/`Cancelled` assignments to be set back to `Active`.
    #[serde(default = "default_allow_reactivation")]
    pub allow_reactivation: bool,
}

fn default_allow_reactivation() -> bool {
    true
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allow_reactivation: default_allow_reactivation(),
        }
    }
}
