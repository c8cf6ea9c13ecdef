//! Application custom resource generation.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use mast_core::{deep_merge, IdSource, MastError, MastResult, Release, Tags};
use mast_fetch::ConfigFetcher;
use mast_kubehub::{select_model, ApplicationModel, ClusterClient};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::metadata::{fold_annotations, fold_labels, merge_labels, merge_tags, object_meta, per_kind};
use crate::namespace::{is_legacy, resolve_namespace};

/// Per-object annotations or labels carried by the Fiaas application spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalMetadata {
    #[serde(default)]
    pub global: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub deployment: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub horizontal_pod_autoscaler: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub ingress: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub service: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub pod: Tags,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub status: Tags,
}

impl AdditionalMetadata {
    pub fn global(global: Tags) -> Self {
        Self { global, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub application: String,
    pub image: String,
    pub config: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_annotations: Option<AdditionalMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_labels: Option<AdditionalMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ApplicationSpec,
}

impl ApplicationManifest {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn to_dynamic(&self) -> MastResult<DynamicObject> {
        let v = serde_json::to_value(self).map_err(|e| MastError::Internal(e.to_string()))?;
        serde_json::from_value(v).map_err(|e| MastError::Internal(e.to_string()))
    }

    /// `spec` as a JSON value, for wholesale assignment onto a live object.
    pub fn spec_value(&self) -> MastResult<Value> {
        serde_json::to_value(&self.spec).map_err(|e| MastError::Internal(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedApplication {
    pub deployment_id: String,
    pub model: ApplicationModel,
    pub manifest: ApplicationManifest,
}

#[derive(Clone)]
pub struct ApplicationGenerator {
    fetcher: ConfigFetcher,
    cluster: Arc<dyn ClusterClient>,
    ids: IdSource,
}

impl ApplicationGenerator {
    pub fn new(fetcher: ConfigFetcher, cluster: Arc<dyn ClusterClient>, ids: IdSource) -> Self {
        Self { fetcher, cluster, ids }
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterClient> {
        &self.cluster
    }

    pub async fn generate(&self, target_namespace: &str, release: &Release) -> MastResult<GeneratedApplication> {
        let out = self.build(target_namespace, release).await;
        let outcome = if out.is_ok() { "ok" } else { "error" };
        metrics::counter!("generate_total", "kind" => "application", "outcome" => outcome).increment(1);
        out
    }

    async fn build(&self, target_namespace: &str, release: &Release) -> MastResult<GeneratedApplication> {
        let t0 = Instant::now();
        // The config must be usable before the cluster is touched.
        let config = self
            .fetcher
            .download(&release.config_url)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MastError::InvalidConfig(release.config_url.clone()))?;
        let model = select_model(self.cluster.as_ref()).await?;

        let tags = merge_tags(&release.metadata);
        let labels = merge_labels(&release.metadata);
        let (spec, flat) = build_spec(model, release, config, tags, labels);

        let deployment_id = (self.ids)();
        let namespace = resolve_namespace(&spec.config, target_namespace);
        let mut metadata = object_meta(&release.metadata, &namespace, &deployment_id);
        if let Some((tags, labels)) = flat {
            fold_annotations(&mut metadata, &tags);
            fold_labels(&mut metadata, &labels);
        }

        let kind = model.resource();
        let manifest = ApplicationManifest {
            api_version: kind.api_version(),
            kind: kind.kind.to_string(),
            metadata,
            spec,
        };
        info!(
            app = %release.application_name(),
            ns = %namespace,
            model = %model,
            deployment_id = %deployment_id,
            took_ms = %t0.elapsed().as_millis(),
            "generate: application ok"
        );
        Ok(GeneratedApplication { deployment_id, model, manifest })
    }
}

type FlatMetadata = Option<(Tags, Tags)>;

/// Shape the spec for `model`. Tags that belong on the object metadata come back separately.
fn build_spec(
    model: ApplicationModel,
    release: &Release,
    mut config: Tags,
    tags: Tags,
    labels: Tags,
) -> (ApplicationSpec, FlatMetadata) {
    let mut spec = ApplicationSpec {
        application: release.application_name().to_string(),
        image: release.image.clone(),
        config: Tags::new(),
        additional_annotations: None,
        additional_labels: None,
    };
    let mut flat = None;
    match model {
        ApplicationModel::Fiaas => {
            spec.additional_annotations = Some(AdditionalMetadata::global(tags));
            spec.additional_labels = Some(AdditionalMetadata::global(labels));
        }
        ApplicationModel::Paasbeta if is_legacy(&config) => {
            fold_into_config(&mut config, "annotations", &tags);
            fold_into_config(&mut config, "labels", &labels);
        }
        ApplicationModel::Paasbeta => {
            if !tags.is_empty() || !labels.is_empty() {
                flat = Some((tags, labels));
            }
        }
    }
    spec.config = config;
    (spec, flat)
}

fn fold_into_config(config: &mut Tags, key: &str, set: &Tags) {
    if set.is_empty() {
        return;
    }
    let mut overlay = Tags::new();
    overlay.insert(key.to_string(), Value::Object(per_kind(set)));
    deep_merge(config, &overlay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(v: Value) -> Tags {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn legacy_paasbeta_folds_into_per_kind_buckets() {
        let release = Release::new("img", "http://x/c.yml", "app");
        let config = tags(json!({"version": 2, "annotations": {"ingress": {"keep": "me"}}}));
        let (spec, flat) = build_spec(
            ApplicationModel::Paasbeta,
            &release,
            config,
            tags(json!({"t": "1"})),
            tags(json!({"l": "2"})),
        );
        assert!(flat.is_none());
        assert_eq!(spec.config["annotations"]["ingress"], json!({"keep": "me", "t": "1"}));
        assert_eq!(spec.config["annotations"]["pod"], json!({"t": "1"}));
        assert_eq!(spec.config["labels"]["horizontal_pod_autoscaler"], json!({"l": "2"}));
        assert!(spec.additional_annotations.is_none());
    }

    #[test]
    fn current_paasbeta_returns_flat_metadata() {
        let release = Release::new("img", "http://x/c.yml", "app");
        let (spec, flat) =
            build_spec(ApplicationModel::Paasbeta, &release, tags(json!({"version": 3})), tags(json!({"t": "1"})), Tags::new());
        assert_eq!(Value::Object(spec.config), json!({"version": 3}));
        let (t, l) = flat.unwrap();
        assert_eq!(t["t"], "1");
        assert!(l.is_empty());
    }

    #[test]
    fn fiaas_spec_serializes_global_buckets() {
        let release = Release::new("img", "http://x/c.yml", "app");
        let (spec, _) =
            build_spec(ApplicationModel::Fiaas, &release, tags(json!({"version": 3})), tags(json!({"t": "1"})), Tags::new());
        let v = serde_json::to_value(&spec).unwrap();
        assert_eq!(v["additional_annotations"], json!({"global": {"t": "1"}}));
        assert_eq!(v["additional_labels"], json!({"global": {}}));
        assert_eq!(v["config"], json!({"version": 3}));
    }
}
