//! Namespace policy for fetched configs.

use mast_core::Tags;

/// Configs older than schema version 3 may pick their own namespace.
pub fn resolve_namespace(config: &Tags, target: &str) -> String {
    let legacy = is_legacy(config);
    match config.get("namespace").and_then(|n| n.as_str()) {
        Some(ns) if legacy => ns.to_string(),
        _ => target.to_string(),
    }
}

/// Absent or non-numeric versions count as current. `2.0` is as legacy as `2`.
pub(crate) fn is_legacy(config: &Tags) -> bool {
    config.get("version").and_then(|v| v.as_f64()).is_some_and(|v| v < 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn cfg(v: Value) -> Tags {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn legacy_config_namespace_wins() {
        let c = cfg(json!({"version": 2, "namespace": "custom-namespace"}));
        assert_eq!(resolve_namespace(&c, "any-namespace"), "custom-namespace");
    }

    #[test]
    fn current_config_namespace_is_ignored() {
        let c = cfg(json!({"version": 3, "namespace": "custom-namespace"}));
        assert_eq!(resolve_namespace(&c, "target-namespace"), "target-namespace");
    }

    #[test]
    fn missing_version_or_namespace_uses_target() {
        assert_eq!(resolve_namespace(&cfg(json!({"namespace": "x"})), "t"), "t");
        assert_eq!(resolve_namespace(&cfg(json!({"version": 1})), "t"), "t");
        assert_eq!(resolve_namespace(&cfg(json!({"version": "2", "namespace": "x"})), "t"), "t");
    }

    #[test]
    fn legacy_detection() {
        assert!(is_legacy(&cfg(json!({"version": 2}))));
        assert!(!is_legacy(&cfg(json!({"version": 3}))));
        assert!(!is_legacy(&cfg(json!({}))));
    }

    #[test]
    fn float_versions_compare_numerically() {
        assert!(is_legacy(&cfg(json!({"version": 2.0}))));
        assert!(is_legacy(&cfg(json!({"version": 2.5}))));
        assert!(!is_legacy(&cfg(json!({"version": 3.0}))));
        let c = cfg(json!({"version": 2.0, "namespace": "custom-namespace"}));
        assert_eq!(resolve_namespace(&c, "target"), "custom-namespace");
    }
}
