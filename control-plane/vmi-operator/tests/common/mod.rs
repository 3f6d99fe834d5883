#![allow(dead_code)]

use std::time::Duration;

use kube::Client;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use wiremock::{MockServer, ResponseTemplate};

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

fn install_crypto_provider() {
    let _ = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    );
}

/// Kube client talking to a wiremock server standing in for the API server.
pub fn mock_client(server: &MockServer) -> Client {
    install_crypto_provider();
    let uri: http::Uri = server.uri().parse().expect("mock server uri");
    let config = kube::Config::new(uri);
    Client::try_from(config).expect("kube client")
}

/// Kube client for a real cluster, or None when no kubeconfig is around.
pub async fn cluster_client() -> Option<Client> {
    install_crypto_provider();
    let config = kube::Config::infer().await.ok()?;
    Client::try_from(config).ok()
}

pub fn list_body(api_version: &str, kind: &str, items: Vec<Value>) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"resourceVersion": "1"},
        "items": items,
    })
}

pub fn list_response(api_version: &str, kind: &str, items: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(list_body(api_version, kind, items))
}

pub fn status_response(code: u16, reason: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    }))
}

pub fn not_found(kind: &str, name: &str) -> ResponseTemplate {
    status_response(404, "NotFound", &format!("{kind} \"{name}\" not found"))
}

pub fn labeled_object(api_version: &str, kind: &str, name: &str, label_value: &str) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {
            "name": name,
            "namespace": "ns",
            "labels": {"vmimport.v2v.kubevirt.io/vmi-name": label_value},
        },
    })
}

pub fn import_object(name: &str, uid: &str) -> Value {
    json!({
        "apiVersion": "v2v.kubevirt.io/v1beta1",
        "kind": "VirtualMachineImport",
        "metadata": {
            "name": name,
            "namespace": "ns",
            "uid": uid,
            "finalizers": ["vmimport.v2v.kubevirt.io/cleanup"],
        },
        "spec": {
            "providerCredentialsSecret": {"name": "ovirt-creds"},
            "source": {"vm": {"id": "123"}},
            "targetVmName": name,
            "startVm": false,
        },
    })
}

pub fn vm_object(name: &str, uid: &str, data_volumes: &[&str]) -> Value {
    let volumes: Vec<Value> = data_volumes
        .iter()
        .enumerate()
        .map(|(i, dv)| json!({"name": format!("dv-{i}"), "dataVolume": {"name": dv}}))
        .collect();
    json!({
        "apiVersion": "kubevirt.io/v1",
        "kind": "VirtualMachine",
        "metadata": {"name": name, "namespace": "ns", "uid": uid},
        "spec": {"running": false, "template": {"spec": {"volumes": volumes}}},
    })
}

pub fn data_volume_object(name: &str, uid: &str) -> Value {
    json!({
        "apiVersion": "cdi.kubevirt.io/v1beta1",
        "kind": "DataVolume",
        "metadata": {"name": name, "namespace": "ns", "uid": uid},
        "spec": {"source": {"blank": {}}},
    })
}

// RAII guard aborting a spawned controller
pub struct ControllerGuard {
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(ctrl: JoinHandle<()>) -> Self {
        Self { ctrl: Some(ctrl) }
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
    }
}

pub async fn wait_until<F, Fut>(attempts: usize, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}
