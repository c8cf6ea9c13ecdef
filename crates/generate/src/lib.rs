//! Mast generate: turn a release plus its fetched config into manifests.

#![forbid(unsafe_code)]

mod application;
mod configmap;
pub mod metadata;
mod namespace;

pub use application::{AdditionalMetadata, ApplicationGenerator, ApplicationManifest, ApplicationSpec, GeneratedApplication};
pub use configmap::ConfigMapGenerator;
pub use metadata::{merge_labels, merge_tags, object_meta, per_kind};
pub use namespace::resolve_namespace;
