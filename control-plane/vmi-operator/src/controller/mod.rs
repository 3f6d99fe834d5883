mod reconcile;

pub use reconcile::{FINALIZER, reconcile};

use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    Client, ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, reflector::ObjectRef, watcher::Config},
};
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::kubevirt::VirtualMachine;
use crate::crd::virtual_machine_import::VirtualMachineImport;
use crate::errors::VmiError;
use crate::tracker::TemporaryResourceTracker;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Vmi(#[from] VmiError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<kube::Error> for ReconcileErr {
    fn from(e: kube::Error) -> Self {
        ReconcileErr::Vmi(e.into())
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub tracker: TemporaryResourceTracker,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: OperatorConfig) -> Self {
        Self {
            tracker: TemporaryResourceTracker::new(client.clone()),
            client,
            cfg,
        }
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let (api, vm_api): (Api<VirtualMachineImport>, Api<VirtualMachine>) =
        match cfg.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };
    let ctx = Arc::new(ControllerContext::new(client, cfg));

    let controller = Controller::new(api, Config::default());
    let imports = controller.store();
    controller
        .watches(vm_api, Config::default(), move |vm| {
            imports_for_vm(&imports.state(), &vm)
        })
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(import = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

/// Imports whose target is `vm`, so a VM showing up gets adopted without
/// waiting for the next requeue.
pub fn imports_for_vm(
    imports: &[Arc<VirtualMachineImport>],
    vm: &VirtualMachine,
) -> Vec<ObjectRef<VirtualMachineImport>> {
    let vm_name = vm.name_any();
    imports
        .iter()
        .filter(|vmi| vmi.namespace() == vm.namespace() && vmi.target_vm_name() == vm_name)
        .map(|vmi| ObjectRef::from_obj(vmi.as_ref()))
        .collect()
}

fn error_policy(
    obj: Arc<VirtualMachineImport>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(
        import = %obj.name_any(),
        error = %err,
        "reconcile failed; requeueing"
    );
    Action::requeue(ctx.cfg.requeue())
}
