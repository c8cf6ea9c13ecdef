//! Mast apply: create or replace the generated application resource.

#![forbid(unsafe_code)]

use std::time::Instant;

use mast_core::{MastResult, Release};
use mast_generate::ApplicationGenerator;
use mast_kubehub::ClusterError;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployed {
    pub namespace: String,
    pub application_name: String,
    pub deployment_id: String,
}

#[derive(Clone)]
pub struct Deployer {
    generator: ApplicationGenerator,
}

impl Deployer {
    pub fn new(generator: ApplicationGenerator) -> Self {
        Self { generator }
    }

    /// Generate, then get-or-create and save. An existing object's metadata and
    /// spec are replaced wholesale; only its `uid` and `resourceVersion` survive.
    pub async fn deploy(&self, target_namespace: &str, release: &Release) -> MastResult<Deployed> {
        let t0 = Instant::now();
        let generated = self.generator.generate(target_namespace, release).await?;
        let kind = generated.model.resource();
        let manifest = &generated.manifest;
        let namespace = manifest.namespace().to_string();
        let name = manifest.name().to_string();
        let mut desired = manifest.to_dynamic()?;
        let cluster = self.generator.cluster();

        let outcome = match cluster.get(&kind, &namespace, &name).await {
            Ok(live) => {
                desired.metadata.resource_version = live.metadata.resource_version;
                desired.metadata.uid = live.metadata.uid;
                cluster.replace(&kind, &namespace, &desired).await.map(|_| "updated")
            }
            Err(ClusterError::NotFound) => cluster.create(&kind, &namespace, &desired).await.map(|_| "created"),
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                counter!("deploy_total", "outcome" => "error").increment(1);
                warn!(app = %name, ns = %namespace, kind = %kind, error = %e, "deploy: save failed");
                return Err(e.into());
            }
        };

        histogram!("deploy_latency_ms").record(t0.elapsed().as_secs_f64() * 1000.0);
        counter!("deploy_total", "outcome" => outcome).increment(1);
        info!(
            app = %name,
            ns = %namespace,
            kind = %kind,
            deployment_id = %generated.deployment_id,
            outcome,
            took_ms = %t0.elapsed().as_millis(),
            "deploy: ok"
        );
        Ok(Deployed { namespace, application_name: name, deployment_id: generated.deployment_id })
    }
}
