//! Mast API facade (in-process).
//!
//! The HTTP layer depends only on [`MastApi`]; [`InProcApi`] wires the real
//! collaborators and [`MockApi`] serves canned answers in tests.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use k8s_openapi::api::core::v1::ConfigMap;
use mast_apply::Deployer;
use mast_core::{ApplicationConfiguration, IdSource, MastError, MastResult, Release, StatusResult};
use mast_fetch::ConfigFetcher;
use mast_generate::{ApplicationGenerator, ApplicationManifest, ConfigMapGenerator};
use mast_kubehub::ClusterClient;
use mast_status::StatusAggregator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub use mast_apply::Deployed;

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub name: String,
    pub description: Value,
}

const GENERIC_500: &str =
    "The server encountered an internal error and was unable to complete your request. Either the server is overloaded or there is an error in the application.";

pub fn status_name(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}

impl ErrorBody {
    pub fn new(code: u16, description: impl Into<Value>) -> Self {
        Self { code, name: status_name(code).to_string(), description: description.into() }
    }

    /// Internal details stay out of the body unless they are actionable.
    pub fn from_error(e: &MastError) -> Self {
        let code = e.status_code();
        let description = match e {
            e if e.is_client_error() => e.to_string(),
            MastError::UpstreamFetch { .. } | MastError::PlatformUnsupported => e.to_string(),
            _ => GENERIC_500.to_string(),
        };
        Self::new(code, description)
    }
}

/// Operations exposed to the HTTP layer.
#[async_trait::async_trait]
pub trait MastApi: Send + Sync {
    async fn generate_application(
        &self,
        target_namespace: &str,
        release: Release,
    ) -> MastResult<(String, ApplicationManifest)>;

    async fn deploy(&self, target_namespace: &str, release: Release) -> MastResult<Deployed>;

    async fn generate_configmap(
        &self,
        target_namespace: &str,
        request: ApplicationConfiguration,
    ) -> MastResult<(String, ConfigMap)>;

    async fn status(&self, namespace: &str, application: &str, deployment_id: &str) -> StatusResult;
}

// ----------------- In-process implementation -----------------

pub struct InProcApi {
    generator: ApplicationGenerator,
    deployer: Deployer,
    configmaps: ConfigMapGenerator,
    statuses: StatusAggregator,
}

impl InProcApi {
    pub fn new(fetcher: ConfigFetcher, cluster: Arc<dyn ClusterClient>, ids: IdSource) -> Self {
        let generator = ApplicationGenerator::new(fetcher.clone(), cluster.clone(), ids.clone());
        Self {
            deployer: Deployer::new(generator.clone()),
            configmaps: ConfigMapGenerator::new(fetcher, ids),
            statuses: StatusAggregator::new(cluster),
            generator,
        }
    }
}

#[async_trait::async_trait]
impl MastApi for InProcApi {
    async fn generate_application(
        &self,
        target_namespace: &str,
        release: Release,
    ) -> MastResult<(String, ApplicationManifest)> {
        let t0 = Instant::now();
        let out = self.generator.generate(target_namespace, &release).await?;
        info!(app = %release.application_name(), took_ms = %t0.elapsed().as_millis(), "api: generate_application ok");
        Ok((out.deployment_id, out.manifest))
    }

    async fn deploy(&self, target_namespace: &str, release: Release) -> MastResult<Deployed> {
        self.deployer.deploy(target_namespace, &release).await
    }

    async fn generate_configmap(
        &self,
        target_namespace: &str,
        request: ApplicationConfiguration,
    ) -> MastResult<(String, ConfigMap)> {
        self.configmaps.generate(target_namespace, &request).await
    }

    async fn status(&self, namespace: &str, application: &str, deployment_id: &str) -> StatusResult {
        let t0 = Instant::now();
        let s = self.statuses.status(namespace, application, deployment_id).await;
        info!(ns = %namespace, app = %application, status = %s.status, took_ms = %t0.elapsed().as_millis(), "api: status ok");
        s
    }
}

// ----------------- Mock implementation -----------------

/// Canned answers for router tests. `error`, when set, fails every fallible call.
pub struct MockApi {
    pub deployment_id: String,
    pub manifest: Option<ApplicationManifest>,
    pub configmap: ConfigMap,
    pub status: StatusResult,
    pub error: Option<MastError>,
    releases: Mutex<Vec<(String, Release)>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            deployment_id: "mock-deployment-id".to_string(),
            manifest: None,
            configmap: ConfigMap::default(),
            status: StatusResult::unknown("mock-deployment-id"),
            error: None,
            releases: Mutex::new(Vec::new()),
        }
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: MastError) -> Self {
        Self { error: Some(error), ..Default::default() }
    }

    /// `(target_namespace, release)` pairs seen by generate and deploy.
    pub fn releases(&self) -> Vec<(String, Release)> {
        self.releases.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, ns: &str, release: &Release) -> MastResult<()> {
        if let Ok(mut r) = self.releases.lock() {
            r.push((ns.to_string(), release.clone()));
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl MastApi for MockApi {
    async fn generate_application(
        &self,
        target_namespace: &str,
        release: Release,
    ) -> MastResult<(String, ApplicationManifest)> {
        self.record(target_namespace, &release)?;
        let manifest = self.manifest.clone().ok_or_else(|| MastError::Internal("no manifest configured".into()))?;
        Ok((self.deployment_id.clone(), manifest))
    }

    async fn deploy(&self, target_namespace: &str, release: Release) -> MastResult<Deployed> {
        self.record(target_namespace, &release)?;
        Ok(Deployed {
            namespace: target_namespace.to_string(),
            application_name: release.application_name().to_string(),
            deployment_id: self.deployment_id.clone(),
        })
    }

    async fn generate_configmap(
        &self,
        _target_namespace: &str,
        _request: ApplicationConfiguration,
    ) -> MastResult<(String, ConfigMap)> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok((self.deployment_id.clone(), self.configmap.clone())),
        }
    }

    async fn status(&self, _namespace: &str, _application: &str, _deployment_id: &str) -> StatusResult {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let b = ErrorBody::from_error(&MastError::InvalidConfigUrl("nope".into()));
        assert_eq!(b.code, 422);
        assert_eq!(b.name, "Unprocessable Entity");
        assert_eq!(b.description, "Invalid config_url: nope");
    }

    #[test]
    fn internal_errors_are_generic() {
        let b = ErrorBody::from_error(&MastError::Cluster("etcd at 10.0.0.3 down".into()));
        assert_eq!(b.code, 500);
        assert_eq!(b.name, "Internal Server Error");
        assert!(!b.description.as_str().unwrap().contains("10.0.0.3"));
    }

    #[test]
    fn upstream_and_platform_errors_are_descriptive() {
        let up = ErrorBody::from_error(&MastError::UpstreamFetch { status: 404, url: "http://x/c.yml".into() });
        assert_eq!(up.code, 502);
        assert!(up.description.as_str().unwrap().contains("404"));
        let p = ErrorBody::from_error(&MastError::PlatformUnsupported);
        assert_eq!(p.code, 500);
        assert!(p.description.as_str().unwrap().starts_with("Unable to find support"));
    }
}
