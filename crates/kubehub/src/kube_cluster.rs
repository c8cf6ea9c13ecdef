//! [`ClusterClient`] over a live API server.

use std::collections::BTreeMap;
use std::time::Instant;

use kube::api::{Api, ListParams, PostParams};
use kube::core::DynamicObject;
use kube::Client;
use tracing::debug;

use crate::{label_selector, ClusterClient, ClusterError, ClusterResult, ResourceKind};

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// In-cluster service account, falling back to the local kubeconfig.
    pub async fn try_default() -> ClusterResult<Self> {
        let client = Client::try_default().await.map_err(ClusterError::from)?;
        Ok(Self::new(client))
    }

    fn namespaced(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

fn object_name(obj: &DynamicObject) -> ClusterResult<&str> {
    obj.metadata
        .name
        .as_deref()
        .ok_or_else(|| ClusterError::Serialization("object missing metadata.name".into()))
}

#[async_trait::async_trait]
impl ClusterClient for KubeCluster {
    async fn probe(&self, kind: &ResourceKind) -> ClusterResult<()> {
        let t0 = Instant::now();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &kind.api_resource());
        api.list(&ListParams::default().limit(1)).await?;
        debug!(kind = %kind, took_ms = %t0.elapsed().as_millis(), "kube: probe ok");
        Ok(())
    }

    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ClusterResult<DynamicObject> {
        Ok(self.namespaced(kind, namespace).get(name).await?)
    }

    async fn find(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        let lp = ListParams::default().labels(&label_selector(labels));
        let list = self.namespaced(kind, namespace).list(&lp).await?;
        Ok(list.items)
    }

    async fn create(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject> {
        Ok(self.namespaced(kind, namespace).create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject> {
        let name = object_name(obj)?;
        Ok(self.namespaced(kind, namespace).replace(name, &PostParams::default(), obj).await?)
    }
}
