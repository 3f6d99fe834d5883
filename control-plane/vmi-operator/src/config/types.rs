use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Restrict the import controller to one namespace; watch all when unset.
    /// Env: VMI_OPERATOR_WATCH_NAMESPACE
    #[envconfig(from = "VMI_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Delay before a reconcile is retried, either after an error or while
    /// waiting for the target VM to show up.
    /// Env: VMI_OPERATOR_REQUEUE_SECS
    #[envconfig(from = "VMI_OPERATOR_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,

    #[envconfig(nested)]
    pub cleanup: CleanupConfig,
}

/// Polling window used when verifying that a cancelled import was fully
/// torn down.
#[derive(Envconfig, Clone, Debug)]
pub struct CleanupConfig {
    #[envconfig(from = "VMI_OPERATOR_CLEANUP_POLL_MILLIS", default = "1000")]
    pub poll_millis: u64,
    #[envconfig(from = "VMI_OPERATOR_CLEANUP_TIMEOUT_SECS", default = "120")]
    pub timeout_secs: u64,
}

impl OperatorConfig {
    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}

impl CleanupConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_millis)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            poll_millis: 1000,
            timeout_secs: 120,
        }
    }
}
