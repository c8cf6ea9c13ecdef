//! Mast kubehub: custom resource kinds, cluster access and model selection.

#![forbid(unsafe_code)]

mod kube_cluster;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use mast_core::{MastError, MastResult};
use tracing::{debug, info};

pub use kube_cluster::KubeCluster;
pub use memory::MemoryCluster;

/// A namespaced custom resource kind addressed by group/version/plural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl ResourceKind {
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group, self.version, self.kind);
        ApiResource::from_gvk_with_plural(&gvk, self.plural)
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.group, self.version, self.plural)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

pub const FIAAS_APPLICATION: ResourceKind =
    ResourceKind { group: "fiaas.schibsted.io", version: "v1", kind: "Application", plural: "applications" };
pub const PAASBETA_APPLICATION: ResourceKind =
    ResourceKind { group: "schibsted.io", version: "v1beta", kind: "PaasbetaApplication", plural: "paasbetaapplications" };
pub const FIAAS_APPLICATION_STATUS: ResourceKind = ResourceKind {
    group: "fiaas.schibsted.io",
    version: "v1",
    kind: "ApplicationStatus",
    plural: "application-statuses",
};
pub const FIAAS_STATUS: ResourceKind =
    ResourceKind { group: "fiaas.schibsted.io", version: "v1", kind: "Status", plural: "statuses" };
pub const PAASBETA_STATUS: ResourceKind =
    ResourceKind { group: "schibsted.io", version: "v1beta", kind: "PaasbetaStatus", plural: "paasbetastatuses" };

/// Application resource shapes the service can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationModel {
    Fiaas,
    Paasbeta,
}

impl ApplicationModel {
    /// Probe order, newest first.
    pub const PRIORITY: [ApplicationModel; 2] = [ApplicationModel::Fiaas, ApplicationModel::Paasbeta];

    pub fn resource(&self) -> ResourceKind {
        match self {
            ApplicationModel::Fiaas => FIAAS_APPLICATION,
            ApplicationModel::Paasbeta => PAASBETA_APPLICATION,
        }
    }
}

impl fmt::Display for ApplicationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource().kind)
    }
}

/// Status resources, newest first.
pub const STATUS_PRIORITY: [ResourceKind; 3] = [FIAAS_APPLICATION_STATUS, FIAAS_STATUS, PAASBETA_STATUS];

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("not found")]
    NotFound,
    #[error("api: {0}")]
    Api(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound)
    }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound,
            kube::Error::SerdeError(se) => ClusterError::Serialization(se.to_string()),
            other => ClusterError::Api(other.to_string()),
        }
    }
}

impl From<ClusterError> for MastError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Serialization(m) => MastError::Internal(m),
            other => MastError::Cluster(other.to_string()),
        }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Namespaced CRUD over dynamic custom resources.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Cluster-wide list with limit 1; `NotFound` when the kind is not served.
    async fn probe(&self, kind: &ResourceKind) -> ClusterResult<()>;

    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ClusterResult<DynamicObject>;

    async fn find(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<DynamicObject>>;

    async fn create(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject>;

    async fn replace(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject>;
}

/// `k=v,k2=v2` selector string.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
}

/// First application kind the cluster serves, in [`ApplicationModel::PRIORITY`] order.
pub async fn select_model(cluster: &dyn ClusterClient) -> MastResult<ApplicationModel> {
    for model in ApplicationModel::PRIORITY {
        let kind = model.resource();
        match cluster.probe(&kind).await {
            Ok(()) => {
                info!(model = %model, "kubehub: model selected");
                metrics::counter!("model_selected_total", "model" => kind.kind).increment(1);
                return Ok(model);
            }
            Err(ClusterError::NotFound) => debug!(kind = %kind, "kubehub: kind not served"),
            Err(e) => return Err(e.into()),
        }
    }
    Err(MastError::PlatformUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_resource_uses_plural() {
        let ar = FIAAS_APPLICATION_STATUS.api_resource();
        assert_eq!(ar.plural, "application-statuses");
        assert_eq!(ar.api_version, "fiaas.schibsted.io/v1");
        assert_eq!(ar.kind, "ApplicationStatus");
    }

    #[test]
    fn selector_is_sorted_and_joined() {
        let mut labels = BTreeMap::new();
        labels.insert("fiaas/deployment_id".to_string(), "abc".to_string());
        labels.insert("app".to_string(), "foo".to_string());
        assert_eq!(label_selector(&labels), "app=foo,fiaas/deployment_id=abc");
    }

    #[test]
    fn priorities_are_newest_first() {
        assert_eq!(ApplicationModel::PRIORITY[0].resource(), FIAAS_APPLICATION);
        assert_eq!(STATUS_PRIORITY[0], FIAAS_APPLICATION_STATUS);
        assert_eq!(STATUS_PRIORITY[2], PAASBETA_STATUS);
    }

    #[tokio::test]
    async fn selects_first_served_kind() {
        let cluster = MemoryCluster::new().serving(&[FIAAS_APPLICATION, PAASBETA_APPLICATION]);
        assert_eq!(select_model(&cluster).await.unwrap(), ApplicationModel::Fiaas);

        let legacy = MemoryCluster::new().serving(&[PAASBETA_APPLICATION]);
        assert_eq!(select_model(&legacy).await.unwrap(), ApplicationModel::Paasbeta);
    }

    #[tokio::test]
    async fn no_served_kind_is_platform_unsupported() {
        let cluster = MemoryCluster::new();
        let err = select_model(&cluster).await.unwrap_err();
        assert!(matches!(err, MastError::PlatformUnsupported));
        assert_eq!(
            err.to_string(),
            "Unable to find support for either PaasbetaApplication or FiaasApplication in the cluster"
        );
    }

    #[tokio::test]
    async fn other_probe_errors_propagate() {
        let cluster = MemoryCluster::new().serving(&[PAASBETA_APPLICATION]).failing(FIAAS_APPLICATION, "forbidden");
        let err = select_model(&cluster).await.unwrap_err();
        assert!(matches!(err, MastError::Cluster(_)));
    }

    #[tokio::test]
    async fn selection_is_not_cached() {
        let cluster = MemoryCluster::new().serving(&[FIAAS_APPLICATION]);
        select_model(&cluster).await.unwrap();
        select_model(&cluster).await.unwrap();
        assert_eq!(cluster.probes(), 2);
    }
}
