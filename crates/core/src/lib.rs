//! Mast core types: release descriptors, status projection and merge helpers.

#![forbid(unsafe_code)]

pub mod error;
pub mod merge;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use error::{MastError, MastResult};
pub use merge::{deep_merge, string_map, to_annotation_string};

/// Ordered string-keyed tree used for tags, labels and fetched configs.
pub type Tags = Map<String, Value>;

/// Label carrying the per-call deployment id.
pub const DEPLOYMENT_ID_LABEL: &str = "fiaas/deployment_id";
/// Label carrying the sanitized application name.
pub const APP_LABEL: &str = "app";

/// Source of deployment ids; swapped for a fixed value in tests.
pub type IdSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Fresh random deployment id (UUIDv4, hyphenated).
pub fn random_deployment_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn random_ids() -> IdSource {
    Arc::new(random_deployment_id)
}

/// Replace characters Kubernetes rejects in object names.
pub fn make_safe_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Naming and tag sources shared by every request descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub application_name: String,
    pub original_application_name: String,
    #[serde(default)]
    pub spinnaker_tags: Tags,
    #[serde(default)]
    pub raw_tags: Tags,
    #[serde(default)]
    pub raw_labels: Tags,
    #[serde(default)]
    pub metadata_annotations: Tags,
}

impl ReleaseMetadata {
    /// `application_name` is always derived from the caller-supplied name.
    pub fn new(original_application_name: &str) -> Self {
        Self {
            application_name: make_safe_name(original_application_name),
            original_application_name: original_application_name.to_string(),
            ..Default::default()
        }
    }

    pub fn name_was_sanitized(&self) -> bool {
        self.application_name != self.original_application_name
    }
}

/// One deployment/generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub image: String,
    pub config_url: String,
    #[serde(flatten)]
    pub metadata: ReleaseMetadata,
}

impl Release {
    pub fn new(image: &str, config_url: &str, application_name: &str) -> Self {
        Self {
            image: image.to_string(),
            config_url: config_url.to_string(),
            metadata: ReleaseMetadata::new(application_name),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.metadata.application_name
    }

    pub fn with_spinnaker_tags(mut self, tags: Tags) -> Self {
        self.metadata.spinnaker_tags = tags;
        self
    }

    pub fn with_raw_tags(mut self, tags: Tags) -> Self {
        self.metadata.raw_tags = tags;
        self
    }

    pub fn with_raw_labels(mut self, labels: Tags) -> Self {
        self.metadata.raw_labels = labels;
        self
    }

    pub fn with_metadata_annotations(mut self, annotations: Tags) -> Self {
        self.metadata.metadata_annotations = annotations;
        self
    }
}

/// ConfigMap generation request: like [`Release`] but pointing at a plain data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfiguration {
    pub application_data_url: String,
    #[serde(flatten)]
    pub metadata: ReleaseMetadata,
}

impl ApplicationConfiguration {
    pub fn new(application_data_url: &str, application_name: &str) -> Self {
        Self {
            application_data_url: application_data_url.to_string(),
            metadata: ReleaseMetadata::new(application_name),
        }
    }

    pub fn with_metadata_annotations(mut self, annotations: Tags) -> Self {
        self.metadata.metadata_annotations = annotations;
        self
    }
}

// ---- status projection ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeployStatus {
    Unknown,
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    /// Map a status resource `result` field; unrecognised values are `Unknown`.
    pub fn from_result(result: &str) -> Self {
        match result.to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: DeployStatus,
    pub info: String,
    pub logs: Vec<String>,
}

impl StatusResult {
    pub fn unknown(deployment_id: &str) -> Self {
        Self {
            status: DeployStatus::Unknown,
            info: format!("no status found for {}", deployment_id),
            logs: Vec::new(),
        }
    }
}
