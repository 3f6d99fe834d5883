//! Cancellation of an import and verification that everything it produced
//! went away with it.

use std::fmt;
use std::time::Duration;

use kube::Client;
use kube::api::{Api, DeleteParams};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::CleanupConfig;
use crate::crd::kubevirt::{DataVolume, VirtualMachine};
use crate::crd::virtual_machine_import::VirtualMachineImport;
use crate::errors::{Result, VmiError};
use crate::tracker::TemporaryResourceTracker;

/// Resources expected to disappear once an import is deleted.
#[derive(Clone, Debug)]
pub struct CleanupTarget {
    pub namespace: String,
    pub import_name: String,
    pub vm_name: String,
    pub data_volume_names: Vec<String>,
}

impl CleanupTarget {
    /// Target built from an import and the VM it produced.
    pub fn from_import(vmi: &VirtualMachineImport, vm: Option<&VirtualMachine>) -> Self {
        let namespace = kube::ResourceExt::namespace(vmi).unwrap_or_else(|| "default".into());
        Self {
            namespace,
            import_name: kube::ResourceExt::name_any(vmi),
            vm_name: vmi.target_vm_name(),
            data_volume_names: vm.map(VirtualMachine::data_volume_names).unwrap_or_default(),
        }
    }
}

/// A resource still present when last checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Leftover {
    Import(String),
    ConfigMap(String),
    Secret(String),
    DataVolume(String),
    VirtualMachine(String),
}

impl fmt::Display for Leftover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leftover::Import(n) => write!(f, "VirtualMachineImport/{n}"),
            Leftover::ConfigMap(n) => write!(f, "ConfigMap/{n}"),
            Leftover::Secret(n) => write!(f, "Secret/{n}"),
            Leftover::DataVolume(n) => write!(f, "DataVolume/{n}"),
            Leftover::VirtualMachine(n) => write!(f, "VirtualMachine/{n}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CleanupOutcome {
    Completed { elapsed: Duration },
    /// `remaining` is what the last successful check reported. `last_error`
    /// is set when the final check failed, in which case `remaining` may be
    /// stale or, if no check ever succeeded, empty.
    TimedOut {
        remaining: Vec<Leftover>,
        last_error: Option<String>,
    },
}

impl CleanupOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CleanupOutcome::Completed { .. })
    }
}

pub struct CleanupVerifier {
    client: Client,
    tracker: TemporaryResourceTracker,
    poll_interval: Duration,
    timeout: Duration,
}

impl CleanupVerifier {
    pub fn new(client: Client, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            tracker: TemporaryResourceTracker::new(client.clone()),
            client,
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(client: Client, cfg: &CleanupConfig) -> Self {
        Self::new(client, cfg.poll_interval(), cfg.timeout())
    }

    /// Delete the import with foreground propagation. An import that is
    /// already gone is not an error.
    #[instrument(level = "debug", skip(self), fields(ns = %namespace, import = %name))]
    pub async fn delete_import(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<VirtualMachineImport> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => {
                info!(%namespace, %name, "import deletion requested");
                Ok(())
            }
            Err(e) => {
                let err = VmiError::from(e);
                if err.is_not_found() {
                    debug!(%namespace, %name, "import already deleted");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Everything from `target` that still exists right now.
    pub async fn remaining(&self, target: &CleanupTarget) -> Result<Vec<Leftover>> {
        let ns = target.namespace.as_str();
        let mut left = Vec::new();

        let vmi_api: Api<VirtualMachineImport> = Api::namespaced(self.client.clone(), ns);
        if vmi_api.get_opt(&target.import_name).await?.is_some() {
            left.push(Leftover::Import(target.import_name.clone()));
        }

        let temporary = self.tracker.find_by_import(ns, &target.import_name).await?;
        if let Some(cm) = temporary.config_map {
            left.push(Leftover::ConfigMap(kube::ResourceExt::name_any(&cm)));
        }
        if let Some(secret) = temporary.secret {
            left.push(Leftover::Secret(kube::ResourceExt::name_any(&secret)));
        }

        let dv_api: Api<DataVolume> = Api::namespaced(self.client.clone(), ns);
        for dv in &target.data_volume_names {
            if dv_api.get_opt(dv).await?.is_some() {
                left.push(Leftover::DataVolume(dv.clone()));
            }
        }

        let vm_api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), ns);
        if vm_api.get_opt(&target.vm_name).await?.is_some() {
            left.push(Leftover::VirtualMachine(target.vm_name.clone()));
        }

        Ok(left)
    }

    /// Poll until nothing from `target` is left or the timeout passes. Errors
    /// while polling are logged and polled again.
    #[instrument(level = "debug", skip(self), fields(ns = %target.namespace, import = %target.import_name))]
    pub async fn wait_for_cleanup(&self, target: &CleanupTarget) -> CleanupOutcome {
        let start = Instant::now();
        let mut last = Vec::new();
        let mut last_error = None;
        loop {
            match self.remaining(target).await {
                Ok(left) if left.is_empty() => {
                    let elapsed = start.elapsed();
                    info!(?elapsed, "import cleanup completed");
                    return CleanupOutcome::Completed { elapsed };
                }
                Ok(left) => {
                    debug!(remaining = left.len(), "cleanup still in progress");
                    last = left;
                    last_error = None;
                }
                Err(e) => {
                    warn!(error = %e, "cleanup check failed; retrying");
                    last_error = Some(e.to_string());
                }
            }
            if start.elapsed() + self.poll_interval > self.timeout {
                warn!(
                    remaining = ?last.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    last_error = ?last_error,
                    "import cleanup timed out"
                );
                return CleanupOutcome::TimedOut {
                    remaining: last,
                    last_error,
                };
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Delete the import and wait for the cascade to finish.
    pub async fn cancel_import(&self, target: &CleanupTarget) -> Result<CleanupOutcome> {
        self.delete_import(&target.namespace, &target.import_name).await?;
        Ok(self.wait_for_cleanup(target).await)
    }
}
