//! Error taxonomy shared by every Mast crate.

use thiserror::Error;

/// Errors surfaced to the caller boundary.
///
/// Client faults map to 422, upstream fetch failures to 502 and everything
/// else to 500. Absence of a cluster resource never reaches this type; it is
/// consumed where candidates are probed.
#[derive(Debug, Clone, Error)]
pub enum MastError {
    #[error("Invalid config_url: {0}")]
    InvalidConfigUrl(String),
    #[error("Invalid config YAML: {0}")]
    InvalidConfigYaml(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("fetching {url} failed with status {status}")]
    UpstreamFetch { status: u16, url: String },
    #[error("Unable to find support for either PaasbetaApplication or FiaasApplication in the cluster")]
    PlatformUnsupported,
    #[error("transport: {0}")]
    Transport(String),
    #[error("cluster: {0}")]
    Cluster(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type MastResult<T> = Result<T, MastError>;

impl MastError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfigUrl(_) | Self::InvalidConfigYaml(_) | Self::InvalidConfig(_) | Self::InvalidRequest(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            e if e.is_client_error() => 422,
            Self::UpstreamFetch { .. } => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_422() {
        let e = MastError::InvalidConfigUrl("missing_schema".into());
        assert!(e.is_client_error());
        assert_eq!(e.status_code(), 422);
        assert_eq!(e.to_string(), "Invalid config_url: missing_schema");
    }

    #[test]
    fn platform_and_upstream_codes() {
        assert_eq!(MastError::PlatformUnsupported.status_code(), 500);
        let up = MastError::UpstreamFetch { status: 404, url: "http://x".into() };
        assert_eq!(up.status_code(), 502);
        assert!(!up.is_client_error());
    }
}
