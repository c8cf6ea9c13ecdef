//! Mast status: report a deployment's progress from whichever status kind has it.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::core::DynamicObject;
use mast_core::{DeployStatus, StatusResult, APP_LABEL, DEPLOYMENT_ID_LABEL};
use mast_kubehub::{ClusterClient, ClusterError, ResourceKind, STATUS_PRIORITY};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct StatusAggregator {
    cluster: Arc<dyn ClusterClient>,
    kinds: Vec<ResourceKind>,
}

impl StatusAggregator {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster, kinds: STATUS_PRIORITY.to_vec() }
    }

    /// Never fails: anything short of a status object yields `UNKNOWN`.
    pub async fn status(&self, namespace: &str, application: &str, deployment_id: &str) -> StatusResult {
        let mut labels = BTreeMap::new();
        labels.insert(APP_LABEL.to_string(), application.to_string());
        labels.insert(DEPLOYMENT_ID_LABEL.to_string(), deployment_id.to_string());

        for kind in &self.kinds {
            let found = match self.cluster.find(kind, namespace, &labels).await {
                Ok(found) => found,
                Err(ClusterError::NotFound) => {
                    debug!(kind = %kind, "status: kind not served");
                    continue;
                }
                Err(e) => {
                    warn!(kind = %kind, ns = %namespace, app = %application, error = %e, "status: lookup failed");
                    continue;
                }
            };
            if found.len() > 1 {
                warn!(count = found.len(), deployment_id = %deployment_id, kind = %kind, "status: multiple status objects");
            }
            if let Some(obj) = found.last() {
                metrics::counter!("status_lookups_total", "kind" => kind.kind).increment(1);
                return project(obj, application);
            }
        }
        metrics::counter!("status_lookups_total", "kind" => "none").increment(1);
        StatusResult::unknown(deployment_id)
    }
}

fn project(obj: &DynamicObject, application: &str) -> StatusResult {
    let result = obj.data.get("result").and_then(Value::as_str).unwrap_or("UNKNOWN");
    let logs = obj
        .data
        .get("logs")
        .and_then(Value::as_array)
        .map(|l| l.iter().map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())).collect())
        .unwrap_or_default();
    StatusResult {
        status: DeployStatus::from_result(result),
        info: format!("Deployment of {} is {}", application, result.to_lowercase()),
        logs,
    }
}
