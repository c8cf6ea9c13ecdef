//! ConfigMap generation from a plain data document.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use mast_core::{to_annotation_string, ApplicationConfiguration, IdSource, MastResult};
use mast_fetch::ConfigFetcher;
use tracing::info;

use crate::metadata::{fold_annotations, fold_labels, merge_labels, merge_tags, object_meta};

#[derive(Clone)]
pub struct ConfigMapGenerator {
    fetcher: ConfigFetcher,
    ids: IdSource,
}

impl ConfigMapGenerator {
    pub fn new(fetcher: ConfigFetcher, ids: IdSource) -> Self {
        Self { fetcher, ids }
    }

    /// Never consults the cluster.
    pub async fn generate(
        &self,
        target_namespace: &str,
        request: &ApplicationConfiguration,
    ) -> MastResult<(String, ConfigMap)> {
        let out = self.build(target_namespace, request).await;
        let outcome = if out.is_ok() { "ok" } else { "error" };
        metrics::counter!("generate_total", "kind" => "configmap", "outcome" => outcome).increment(1);
        out
    }

    async fn build(&self, target_namespace: &str, request: &ApplicationConfiguration) -> MastResult<(String, ConfigMap)> {
        let data = self.fetcher.download(&request.application_data_url).await?.unwrap_or_default();
        let deployment_id = (self.ids)();

        let mut metadata = object_meta(&request.metadata, target_namespace, &deployment_id);
        let tags = merge_tags(&request.metadata);
        if !tags.is_empty() {
            fold_annotations(&mut metadata, &tags);
        }
        fold_labels(&mut metadata, &merge_labels(&request.metadata));

        let data: BTreeMap<String, String> = data.iter().map(|(k, v)| (k.clone(), to_annotation_string(v))).collect();
        info!(
            app = %request.metadata.application_name,
            ns = %target_namespace,
            keys = data.len(),
            deployment_id = %deployment_id,
            "generate: configmap ok"
        );
        let cm = ConfigMap { metadata, data: Some(data), ..Default::default() };
        Ok((deployment_id, cm))
    }
}
