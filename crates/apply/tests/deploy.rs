use std::sync::Arc;

use kube::core::{DynamicObject, ObjectMeta};
use mast_apply::Deployer;
use mast_core::{IdSource, MastError, Release};
use mast_fetch::{ConfigFetcher, StaticHttp};
use mast_generate::ApplicationGenerator;
use mast_kubehub::{MemoryCluster, FIAAS_APPLICATION};
use serde_json::json;

const CONFIG_URL: &str = "http://config.example.com/app/config.yml";

fn deployer(body: &str, cluster: Arc<MemoryCluster>) -> Deployer {
    let http = Arc::new(StaticHttp::new().with(CONFIG_URL, 200, body));
    let ids: IdSource = Arc::new(|| "deployment-2".to_string());
    Deployer::new(ApplicationGenerator::new(ConfigFetcher::new(http), cluster, ids))
}

fn release() -> Release {
    Release::new("registry/app:2", CONFIG_URL, "test_app")
}

#[tokio::test]
async fn creates_when_absent() {
    let cluster = Arc::new(MemoryCluster::new().serving(&[FIAAS_APPLICATION]));
    let d = deployer("version: 3\n", cluster.clone());
    let out = d.deploy("target", &release()).await.unwrap();

    assert_eq!(out.namespace, "target");
    assert_eq!(out.application_name, "test-app");
    assert_eq!(out.deployment_id, "deployment-2");
    let stored = cluster.objects(&FIAAS_APPLICATION, "target");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data["spec"]["image"], "registry/app:2");
    assert_eq!(stored[0].metadata.labels.as_ref().unwrap()["fiaas/deployment_id"], "deployment-2");
}

#[tokio::test]
async fn replaces_existing_spec_wholesale() {
    let cluster = Arc::new(MemoryCluster::new().serving(&[FIAAS_APPLICATION]));
    cluster.insert(
        &FIAAS_APPLICATION,
        "target",
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("test-app".into()),
                uid: Some("uid-1".into()),
                resource_version: Some("7".into()),
                labels: Some([("stale".to_string(), "yes".to_string())].into()),
                ..Default::default()
            },
            data: json!({"spec": {"image": "old", "config": {"version": 3, "ingress": [{"host": "old.example.com"}, {"host": "other"}]}}}),
        },
    );
    let d = deployer("version: 3\ningress:\n  - host: new.example.com\n", cluster.clone());
    d.deploy("target", &release()).await.unwrap();

    let stored = cluster.objects(&FIAAS_APPLICATION, "target");
    assert_eq!(stored.len(), 1);
    let obj = &stored[0];
    assert_eq!(obj.metadata.uid.as_deref(), Some("uid-1"));
    assert_eq!(obj.data["spec"]["image"], "registry/app:2");
    assert_eq!(obj.data["spec"]["config"]["ingress"], json!([{"host": "new.example.com"}]));
    let labels = obj.metadata.labels.as_ref().unwrap();
    assert!(!labels.contains_key("stale"));
    assert_eq!(labels["app"], "test-app");
}

#[tokio::test]
async fn legacy_config_deploys_into_its_namespace() {
    let cluster = Arc::new(MemoryCluster::new().serving(&[FIAAS_APPLICATION]));
    let d = deployer("version: 2\nnamespace: custom-namespace\n", cluster.clone());
    let out = d.deploy("target", &release()).await.unwrap();
    assert_eq!(out.namespace, "custom-namespace");
    assert_eq!(cluster.objects(&FIAAS_APPLICATION, "custom-namespace").len(), 1);
}

#[tokio::test]
async fn save_failures_propagate() {
    let cluster = Arc::new(MemoryCluster::new().serving(&[FIAAS_APPLICATION]).rejecting_writes("etcd down"));
    let d = deployer("version: 3\n", cluster.clone());
    let err = d.deploy("target", &release()).await.unwrap_err();
    assert!(matches!(err, MastError::Cluster(_)));
    assert_eq!(err.status_code(), 500);
    assert!(cluster.objects(&FIAAS_APPLICATION, "target").is_empty());
}
