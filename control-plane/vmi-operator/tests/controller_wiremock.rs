use std::sync::Arc;

use serde_json::json;
use vmi_operator::config::{CleanupConfig, OperatorConfig};
use vmi_operator::controller::{ControllerContext, FINALIZER, ReconcileErr, reconcile};
use vmi_operator::crd::virtual_machine_import::VirtualMachineImport;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

mod common;
use common::{
    data_volume_object, import_object, labeled_object, list_response,
    mock_client, not_found, status_response, vm_object,
};

const CONFIG_MAPS: &str = "/api/v1/namespaces/ns/configmaps";
const SECRETS: &str = "/api/v1/namespaces/ns/secrets";
const IMPORT: &str =
    "/apis/v2v.kubevirt.io/v1beta1/namespaces/ns/virtualmachineimports/basic-vm";
const IMPORT_STATUS: &str =
    "/apis/v2v.kubevirt.io/v1beta1/namespaces/ns/virtualmachineimports/basic-vm/status";
const VM: &str = "/apis/kubevirt.io/v1/namespaces/ns/virtualmachines/basic-vm";
const DATA_VOLUME: &str =
    "/apis/cdi.kubevirt.io/v1beta1/namespaces/ns/datavolumes/basic-vm-disk-1";

fn config() -> OperatorConfig {
    OperatorConfig {
        watch_namespace: None,
        requeue_secs: 30,
        cleanup: CleanupConfig::default(),
    }
}

fn import() -> Arc<VirtualMachineImport> {
    Arc::new(serde_json::from_value(import_object("basic-vm", "import-uid")).unwrap())
}

fn context(server: &MockServer) -> Arc<ControllerContext> {
    Arc::new(ControllerContext::new(mock_client(server), config()))
}

async fn mount_status_patch(server: &MockServer, data_volumes: serde_json::Value) {
    Mock::given(method("PATCH"))
        .and(path(IMPORT_STATUS))
        .and(body_partial_json(json!({
            "status": {
                "phase": "Processing",
                "targetVmName": "basic-vm",
                "dataVolumes": data_volumes,
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(import_object("basic-vm", "import-uid")),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn creates_missing_temporary_resources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_MAPS))
        .respond_with(list_response("v1", "ConfigMapList", vec![]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SECRETS))
        .respond_with(list_response("v1", "SecretList", vec![]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/secrets/ovirt-creds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "ovirt-creds", "namespace": "ns"},
            // "admin" / "PEM"
            "data": {"username": "YWRtaW4=", "caCert": "UEVN"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let owned_and_labeled = json!({
        "metadata": {
            "generateName": "vmimport.v2v.kubevirt.io",
            "labels": {"vmimport.v2v.kubevirt.io/vmi-name": "basic-vm"},
            "ownerReferences": [{
                "kind": "VirtualMachineImport",
                "name": "basic-vm",
                "uid": "import-uid",
                "blockOwnerDeletion": true,
            }],
        }
    });
    Mock::given(method("POST"))
        .and(path(SECRETS))
        .and(body_partial_json(owned_and_labeled.clone()))
        .and(body_partial_json(json!({"data": {"username": "YWRtaW4="}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(labeled_object(
            "v1",
            "Secret",
            "vmimport.v2v.kubevirt.ioabcde",
            "basic-vm",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CONFIG_MAPS))
        .and(body_partial_json(owned_and_labeled))
        .and(body_partial_json(json!({"data": {"ca.pem": "PEM"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(labeled_object(
            "v1",
            "ConfigMap",
            "vmimport.v2v.kubevirt.iofghij",
            "basic-vm",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(not_found("virtualmachines", "basic-vm"))
        .mount(&server)
        .await;
    mount_status_patch(&server, json!([])).await;

    reconcile(import(), context(&server)).await.unwrap();
}

#[tokio::test]
async fn adopts_vm_and_links_data_volumes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_MAPS))
        .respond_with(list_response(
            "v1",
            "ConfigMapList",
            vec![labeled_object("v1", "ConfigMap", "vmimport.v2v.kubevirt.iofghij", "basic-vm")],
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SECRETS))
        .respond_with(list_response(
            "v1",
            "SecretList",
            vec![labeled_object("v1", "Secret", "vmimport.v2v.kubevirt.ioabcde", "basic-vm")],
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vm_object("basic-vm", "vm-uid", &["basic-vm-disk-1"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(VM))
        .and(body_partial_json(json!({
            "metadata": {"ownerReferences": [{
                "kind": "VirtualMachineImport",
                "uid": "import-uid",
                "controller": false,
                "blockOwnerDeletion": true,
            }]}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vm_object("basic-vm", "vm-uid", &["basic-vm-disk-1"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DATA_VOLUME))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data_volume_object("basic-vm-disk-1", "dv-uid")),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DATA_VOLUME))
        .and(body_partial_json(json!({
            "metadata": {"ownerReferences": [{
                "kind": "VirtualMachine",
                "name": "basic-vm",
                "uid": "vm-uid",
                "controller": false,
            }]}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data_volume_object("basic-vm-disk-1", "dv-uid")),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_status_patch(&server, json!(["basic-vm-disk-1"])).await;

    reconcile(import(), context(&server)).await.unwrap();
}

#[tokio::test]
async fn missing_provider_secret_fails_reconcile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONFIG_MAPS))
        .respond_with(list_response("v1", "ConfigMapList", vec![]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SECRETS))
        .respond_with(list_response("v1", "SecretList", vec![]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/secrets/ovirt-creds"))
        .respond_with(not_found("secrets", "ovirt-creds"))
        .mount(&server)
        .await;

    let err = reconcile(import(), context(&server)).await.unwrap_err();
    match err {
        ReconcileErr::Vmi(e) => assert!(e.is_not_found(), "{e}"),
        other => panic!("unexpected error: {other}"),
    }
}

async fn mount_temporary_resources_present(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CONFIG_MAPS))
        .respond_with(list_response(
            "v1",
            "ConfigMapList",
            vec![labeled_object("v1", "ConfigMap", "vmimport.v2v.kubevirt.iofghij", "basic-vm")],
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(SECRETS))
        .respond_with(list_response(
            "v1",
            "SecretList",
            vec![labeled_object("v1", "Secret", "vmimport.v2v.kubevirt.ioabcde", "basic-vm")],
        ))
        .mount(server)
        .await;
}

fn deleted_import(finalizers: serde_json::Value) -> Arc<VirtualMachineImport> {
    let mut obj = import_object("basic-vm", "import-uid");
    obj["metadata"]["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
    obj["metadata"]["finalizers"] = finalizers;
    Arc::new(serde_json::from_value(obj).unwrap())
}

#[tokio::test]
async fn adds_finalizer_to_new_import() {
    let server = MockServer::start().await;
    let mut obj = import_object("basic-vm", "import-uid");
    obj["metadata"]["finalizers"] = json!(["example.com/keep"]);
    let vmi: VirtualMachineImport = serde_json::from_value(obj.clone()).unwrap();

    Mock::given(method("PATCH"))
        .and(path(IMPORT))
        .and(body_partial_json(json!({
            "metadata": {"finalizers": ["example.com/keep", FINALIZER]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(obj))
        .expect(1)
        .mount(&server)
        .await;
    mount_temporary_resources_present(&server).await;
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(not_found("virtualmachines", "basic-vm"))
        .mount(&server)
        .await;
    mount_status_patch(&server, json!([])).await;

    reconcile(Arc::new(vmi), context(&server)).await.unwrap();
}

#[tokio::test]
async fn adoption_keeps_existing_controller_of_vm() {
    let server = MockServer::start().await;
    mount_temporary_resources_present(&server).await;
    let mut vm = vm_object("basic-vm", "vm-uid", &[]);
    vm["metadata"]["ownerReferences"] = json!([{
        "apiVersion": "example.com/v1",
        "kind": "VmPool",
        "name": "pool",
        "uid": "pool-uid",
        "controller": true,
    }]);
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(ResponseTemplate::new(200).set_body_json(vm.clone()))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(VM))
        .and(body_partial_json(json!({
            "metadata": {"ownerReferences": [
                {"uid": "pool-uid", "controller": true},
                {"uid": "import-uid", "controller": false},
            ]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vm))
        .expect(1)
        .mount(&server)
        .await;
    mount_status_patch(&server, json!([])).await;

    reconcile(import(), context(&server)).await.unwrap();
}

#[tokio::test]
async fn deleting_import_before_adoption_removes_vm_and_data_volumes() {
    let server = MockServer::start().await;
    // the VM was created but never adopted
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vm_object("basic-vm", "vm-uid", &["basic-vm-disk-1"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(VM))
        .and(body_partial_json(json!({"propagationPolicy": "Foreground"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vm_object("basic-vm", "vm-uid", &["basic-vm-disk-1"])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(DATA_VOLUME))
        .and(body_partial_json(json!({"propagationPolicy": "Foreground"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data_volume_object("basic-vm-disk-1", "dv-uid")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(IMPORT))
        .and(body_partial_json(json!({
            "metadata": {"finalizers": ["foregroundDeletion"]}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(import_object("basic-vm", "import-uid")),
        )
        .expect(1)
        .mount(&server)
        .await;

    reconcile(
        deleted_import(json!(["foregroundDeletion", FINALIZER])),
        context(&server),
    )
    .await
    .unwrap();

    // the finalizer is only released once both deletions went through
    let received = server.received_requests().await.unwrap_or_default();
    let last = received.last().expect("requests were sent");
    assert_eq!(last.method.as_str(), "PATCH");
    assert_eq!(last.url.path(), IMPORT);
}

#[tokio::test]
async fn deleting_import_releases_finalizer_when_vm_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(not_found("virtualmachines", "basic-vm"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(IMPORT))
        .and(body_partial_json(json!({"metadata": {"finalizers": []}})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(import_object("basic-vm", "import-uid")),
        )
        .expect(1)
        .mount(&server)
        .await;

    reconcile(deleted_import(json!([FINALIZER])), context(&server))
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_vm_deletion_keeps_finalizer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VM))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vm_object("basic-vm", "vm-uid", &[])),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(VM))
        .respond_with(status_response(500, "InternalError", "etcdserver: request timed out"))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(IMPORT))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(import_object("basic-vm", "import-uid")),
        )
        .expect(0)
        .mount(&server)
        .await;

    let result = reconcile(deleted_import(json!([FINALIZER])), context(&server)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn deleted_import_without_finalizer_is_left_alone() {
    let server = MockServer::start().await;

    reconcile(deleted_import(json!(["foregroundDeletion"])), context(&server))
        .await
        .unwrap();
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "unexpected requests: {}", received.len());
}
