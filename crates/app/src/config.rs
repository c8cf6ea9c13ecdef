//! Process configuration from flags and environment.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "mast", version, about = "Generate and deploy fiaas application manifests")]
pub struct Config {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// Default log level to debug when MAST_LOG is unset
    #[arg(long, env = "DEBUG")]
    pub debug: bool,
    #[arg(long, env = "ARTIFACTORY_USER")]
    pub artifactory_user: String,
    #[arg(long, env = "ARTIFACTORY_PWD", hide_env_values = true)]
    pub artifactory_pwd: String,
    /// Only URLs on this origin get the credentials above
    #[arg(long, env = "ARTIFACTORY_ORIGIN")]
    pub artifactory_origin: String,
    /// Scheme used for Location headers and status links
    #[arg(long, env = "URL_SCHEME", default_value = "https")]
    pub url_scheme: String,
    #[arg(long, env = "MAST_FETCH_RETRIES", default_value_t = 3)]
    pub fetch_retries: u32,
    #[arg(long, env = "MAST_FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
