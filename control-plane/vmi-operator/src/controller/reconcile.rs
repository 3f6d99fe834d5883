use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument, trace};

use super::{ControllerContext, ReconcileErr};
use crate::crd::kubevirt::{DataVolume, VirtualMachine};
use crate::crd::virtual_machine_import::{
    Condition, ConditionStatus, ConditionType, PHASE_PROCESSING,
    VirtualMachineImport, VirtualMachineImportStatus,
};
use crate::errors::VmiError;
use crate::ownership::{
    owner_reference, provider_ca_cert, temporary_config_map, temporary_secret,
    with_owner,
};

/// Held on every import until its target VM and DataVolumes are deleted.
pub const FINALIZER: &str = "vmimport.v2v.kubevirt.io/cleanup";

fn has_finalizer(obj: &VirtualMachineImport) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false)
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<VirtualMachineImport>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    let vmi_api: Api<VirtualMachineImport> = Api::namespaced(ctx.client.clone(), &ns);

    // Handle delete: remove the target VM and its DataVolumes, then release
    // the finalizer so the cascade can finish.
    if obj.meta().deletion_timestamp.is_some() {
        if has_finalizer(&obj) {
            info!(%ns, %name, "reconcile: deletion timestamp detected; deleting target VM");
            delete_downstream(&ctx, &ns, &obj).await?;
            info!(%ns, %name, "reconcile: removing finalizer");
            let finals = obj
                .meta()
                .finalizers
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f != FINALIZER)
                .collect::<Vec<_>>();
            let patch = json!({"metadata": {"finalizers": finals}});
            vmi_api
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&obj) {
        info!(%ns, %name, "reconcile: adding finalizer");
        let mut finals = obj.meta().finalizers.clone().unwrap_or_default();
        finals.push(FINALIZER.to_string());
        let patch = json!({"metadata": {"finalizers": finals}});
        vmi_api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
    }

    let owner = owner_reference(obj.as_ref(), true).ok_or_else(|| {
        ReconcileErr::Internal(format!("import {ns}/{name} has no uid"))
    })?;
    // The VM may already have a controller of its own.
    let vm_owner = OwnerReference {
        controller: Some(false),
        ..owner.clone()
    };

    ensure_temporary_resources(&ctx, &ns, &obj, &owner).await?;

    let vm_name = obj.target_vm_name();
    let data_volumes = adopt_downstream(&ctx, &ns, &vm_name, &vm_owner).await?;

    update_status(&ctx, &ns, &obj, &vm_name, data_volumes).await?;

    Ok(Action::requeue(ctx.cfg.requeue()))
}

/// Create the temporary ConfigMap and Secret unless the tracker already finds
/// them.
async fn ensure_temporary_resources(
    ctx: &ControllerContext,
    ns: &str,
    obj: &VirtualMachineImport,
    owner: &OwnerReference,
) -> Result<(), ReconcileErr> {
    let name = obj.name_any();
    let found = ctx.tracker.find_by_import(ns, &name).await?;
    if found.config_map.is_some() && found.secret.is_some() {
        trace!(%ns, %name, "temporary resources present");
        return Ok(());
    }

    let creds_ref = &obj.spec.provider_credentials_secret;
    let creds_ns = creds_ref.namespace.as_deref().unwrap_or(ns);
    let creds_api: Api<Secret> = Api::namespaced(ctx.client.clone(), creds_ns);
    let creds = creds_api.get_opt(&creds_ref.name).await?.ok_or_else(|| {
        VmiError::NotFound(format!(
            "provider credentials secret {}/{}",
            creds_ns, creds_ref.name
        ))
    })?;

    let pp = PostParams::default();
    if found.secret.is_none() {
        let secret = temporary_secret(ns, &name, owner, creds.data.clone());
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), ns);
        let created = api.create(&pp, &secret).await?;
        info!(%ns, %name, secret = %created.name_any(), "created temporary secret");
    }
    if found.config_map.is_none() {
        let cm = temporary_config_map(ns, &name, owner, provider_ca_cert(&creds));
        let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), ns);
        let created = api.create(&pp, &cm).await?;
        info!(%ns, %name, config_map = %created.name_any(), "created temporary config map");
    }
    Ok(())
}

/// Make the import own its target VM and the VM own its DataVolumes, so the
/// cascade reaches them even though they carry no import label. Returns the
/// DataVolume names referenced by the VM, empty while the VM does not exist.
async fn adopt_downstream(
    ctx: &ControllerContext,
    ns: &str,
    vm_name: &str,
    owner: &OwnerReference,
) -> Result<Vec<String>, ReconcileErr> {
    let vm_api: Api<VirtualMachine> = Api::namespaced(ctx.client.clone(), ns);
    let Some(vm) = vm_api.get_opt(vm_name).await? else {
        debug!(%ns, vm = %vm_name, "target VM not created yet");
        return Ok(Vec::new());
    };

    if let Some(refs) = with_owner(vm.metadata.owner_references.as_ref(), owner) {
        patch_owner_references(&vm_api, vm_name, refs).await?;
        info!(%ns, vm = %vm_name, "adopted target VM");
    }

    let data_volumes = vm.data_volume_names();
    let Some(vm_owner) = owner_reference(&vm, false) else {
        return Ok(data_volumes);
    };
    let dv_api: Api<DataVolume> = Api::namespaced(ctx.client.clone(), ns);
    for dv_name in &data_volumes {
        let Some(dv) = dv_api.get_opt(dv_name).await? else {
            continue;
        };
        if let Some(refs) = with_owner(dv.metadata.owner_references.as_ref(), &vm_owner) {
            patch_owner_references(&dv_api, dv_name, refs).await?;
            info!(%ns, data_volume = %dv_name, vm = %vm_name, "linked data volume to VM");
        }
    }
    Ok(data_volumes)
}

/// Delete the target VM and every DataVolume known for it, whether or not
/// they were adopted yet.
async fn delete_downstream(
    ctx: &ControllerContext,
    ns: &str,
    obj: &VirtualMachineImport,
) -> Result<(), ReconcileErr> {
    let vm_name = obj.target_vm_name();
    let vm_api: Api<VirtualMachine> = Api::namespaced(ctx.client.clone(), ns);
    let mut data_volumes = obj
        .status
        .as_ref()
        .and_then(|s| s.data_volumes.clone())
        .unwrap_or_default();
    if let Some(vm) = vm_api.get_opt(&vm_name).await? {
        for dv in vm.data_volume_names() {
            if !data_volumes.contains(&dv) {
                data_volumes.push(dv);
            }
        }
        delete_if_present(&vm_api, &vm_name).await?;
        info!(%ns, vm = %vm_name, "deleted target VM");
    }

    let dv_api: Api<DataVolume> = Api::namespaced(ctx.client.clone(), ns);
    for dv_name in &data_volumes {
        delete_if_present(&dv_api, dv_name).await?;
        debug!(%ns, data_volume = %dv_name, "deleted data volume");
    }
    Ok(())
}

async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<(), ReconcileErr>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::foreground()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn patch_owner_references<K>(
    api: &Api<K>,
    name: &str,
    refs: Vec<OwnerReference>,
) -> Result<(), ReconcileErr>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    let patch = json!({"metadata": {"ownerReferences": refs}});
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn update_status(
    ctx: &ControllerContext,
    ns: &str,
    obj: &VirtualMachineImport,
    vm_name: &str,
    data_volumes: Vec<String>,
) -> Result<(), ReconcileErr> {
    let current = obj.status.clone().unwrap_or_default();
    if current.phase.as_deref() == Some(PHASE_PROCESSING)
        && current.target_vm_name.as_deref() == Some(vm_name)
        && current.data_volumes.as_deref().unwrap_or_default() == data_volumes.as_slice()
    {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    let status = VirtualMachineImportStatus {
        phase: Some(PHASE_PROCESSING.to_string()),
        target_vm_name: Some(vm_name.to_string()),
        data_volumes: Some(data_volumes),
        conditions: Some(vec![Condition {
            type_: ConditionType::Processing,
            status: ConditionStatus::True,
            reason: Some("TemporaryResourcesReady".into()),
            message: Some("Temporary resources created".into()),
            last_transition_time: Some(now),
        }]),
    };
    let api: Api<VirtualMachineImport> = Api::namespaced(ctx.client.clone(), ns);
    api.patch_status(
        &obj.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    debug!(%ns, name = %obj.name_any(), "status updated");
    Ok(())
}
