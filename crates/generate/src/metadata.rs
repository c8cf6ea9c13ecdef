//! Tag, label and object metadata merging.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use mast_core::{deep_merge, to_annotation_string, ReleaseMetadata, Tags, APP_LABEL, DEPLOYMENT_ID_LABEL};
use serde_json::{json, Value};

pub const PIPELINE_PREFIX: &str = "pipeline.schibsted.io/";

/// Resource kinds that receive their own copy of the merged tags.
pub const ANNOTATED_KINDS: [&str; 5] = ["deployment", "pod", "service", "ingress", "horizontal_pod_autoscaler"];

fn prefixed(source: &Tags, prefix: &str) -> Tags {
    source
        .iter()
        .map(|(k, v)| (format!("{}{}", prefix, k), Value::String(to_annotation_string(v))))
        .collect()
}

/// Spinnaker tags, then raw tags, then the rename marker.
pub fn merge_tags(source: &ReleaseMetadata) -> Tags {
    let mut tags = Tags::new();
    if !source.spinnaker_tags.is_empty() {
        deep_merge(&mut tags, &prefixed(&source.spinnaker_tags, PIPELINE_PREFIX));
    }
    if !source.raw_tags.is_empty() {
        deep_merge(&mut tags, &prefixed(&source.raw_tags, ""));
    }
    if source.name_was_sanitized() {
        tags.insert("mast".into(), json!({ "originalApplicationName": source.original_application_name }));
    }
    tags
}

pub fn merge_labels(source: &ReleaseMetadata) -> Tags {
    let mut labels = Tags::new();
    if !source.raw_labels.is_empty() {
        deep_merge(&mut labels, &prefixed(&source.raw_labels, ""));
    }
    labels
}

/// The same set copied under every entry of [`ANNOTATED_KINDS`].
pub fn per_kind(set: &Tags) -> Tags {
    ANNOTATED_KINDS.iter().map(|k| (k.to_string(), Value::Object(set.clone()))).collect()
}

pub fn object_meta(source: &ReleaseMetadata, namespace: &str, deployment_id: &str) -> ObjectMeta {
    let mut labels = BTreeMap::new();
    labels.insert(DEPLOYMENT_ID_LABEL.to_string(), deployment_id.to_string());
    labels.insert(APP_LABEL.to_string(), source.application_name.clone());
    let annotations = source
        .metadata_annotations
        .iter()
        .map(|(k, v)| (k.clone(), to_annotation_string(v)))
        .collect::<BTreeMap<_, _>>();
    ObjectMeta {
        name: Some(source.application_name.clone()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        annotations: Some(annotations),
        ..Default::default()
    }
}

/// Fold a tag tree into string annotations already on `meta`.
pub(crate) fn fold_annotations(meta: &mut ObjectMeta, tags: &Tags) {
    let mut merged: Tags = meta
        .annotations
        .take()
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    deep_merge(&mut merged, tags);
    meta.annotations = Some(mast_core::string_map(&merged));
}

/// Fold labels in; the reserved `app` and deployment id labels keep their values.
pub(crate) fn fold_labels(meta: &mut ObjectMeta, labels: &Tags) {
    let current = meta.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in mast_core::string_map(labels) {
        if k == APP_LABEL || k == DEPLOYMENT_ID_LABEL {
            continue;
        }
        current.insert(k, v);
    }
}
