//! In-memory [`ClusterClient`] for tests and local runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use kube::core::DynamicObject;

use crate::{ClusterClient, ClusterError, ClusterResult, ResourceKind};

struct Stored {
    kind: String,
    namespace: String,
    obj: DynamicObject,
}

/// Objects are kept in insertion order so `find` is deterministic.
#[derive(Default)]
pub struct MemoryCluster {
    served: HashSet<String>,
    failures: HashMap<String, String>,
    write_failure: Option<String>,
    objects: Mutex<Vec<Stored>>,
    probes: AtomicUsize,
    calls: AtomicUsize,
    next_rv: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(mut self, kinds: &[ResourceKind]) -> Self {
        self.served.extend(kinds.iter().map(|k| k.key()));
        self
    }

    /// Every call on `kind` fails with a non-404 API error.
    pub fn failing(mut self, kind: ResourceKind, message: &str) -> Self {
        self.failures.insert(kind.key(), message.to_string());
        self
    }

    /// Reads succeed but every create and replace fails.
    pub fn rejecting_writes(mut self, message: &str) -> Self {
        self.write_failure = Some(message.to_string());
        self
    }

    /// Seed an object directly, bypassing the call counters.
    pub fn insert(&self, kind: &ResourceKind, namespace: &str, obj: DynamicObject) {
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects.push(Stored { kind: kind.key(), namespace: namespace.to_string(), obj });
    }

    pub fn objects(&self, kind: &ResourceKind, namespace: &str) -> Vec<DynamicObject> {
        let key = kind.key();
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects.iter().filter(|s| s.kind == key && s.namespace == namespace).map(|s| s.obj.clone()).collect()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Calls other than probes.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn check(&self, kind: &ResourceKind) -> ClusterResult<()> {
        let key = kind.key();
        if let Some(msg) = self.failures.get(&key) {
            return Err(ClusterError::Api(msg.clone()));
        }
        if !self.served.contains(&key) {
            return Err(ClusterError::NotFound);
        }
        Ok(())
    }

    fn check_write(&self, kind: &ResourceKind) -> ClusterResult<()> {
        self.check(kind)?;
        match &self.write_failure {
            Some(msg) => Err(ClusterError::Api(msg.clone())),
            None => Ok(()),
        }
    }

    fn bump_rv(&self) -> String {
        (self.next_rv.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

fn name_of(obj: &DynamicObject) -> ClusterResult<String> {
    obj.metadata.name.clone().ok_or_else(|| ClusterError::Serialization("object missing metadata.name".into()))
}

#[async_trait::async_trait]
impl ClusterClient for MemoryCluster {
    async fn probe(&self, kind: &ResourceKind) -> ClusterResult<()> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.check(kind)
    }

    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> ClusterResult<DynamicObject> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check(kind)?;
        let key = kind.key();
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        objects
            .iter()
            .find(|s| s.kind == key && s.namespace == namespace && s.obj.metadata.name.as_deref() == Some(name))
            .map(|s| s.obj.clone())
            .ok_or(ClusterError::NotFound)
    }

    async fn find(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check(kind)?;
        let key = kind.key();
        let objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        Ok(objects
            .iter()
            .filter(|s| s.kind == key && s.namespace == namespace)
            .filter(|s| {
                let have = s.obj.metadata.labels.as_ref();
                labels.iter().all(|(k, v)| have.and_then(|l| l.get(k)) == Some(v))
            })
            .map(|s| s.obj.clone())
            .collect())
    }

    async fn create(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check_write(kind)?;
        let name = name_of(obj)?;
        let key = kind.key();
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        if objects.iter().any(|s| s.kind == key && s.namespace == namespace && s.obj.metadata.name.as_deref() == Some(name.as_str())) {
            return Err(ClusterError::Api(format!("{} \"{}\" already exists", kind.kind, name)));
        }
        let mut stored = obj.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        stored.metadata.resource_version = Some(self.bump_rv());
        objects.push(Stored { kind: key, namespace: namespace.to_string(), obj: stored.clone() });
        Ok(stored)
    }

    async fn replace(&self, kind: &ResourceKind, namespace: &str, obj: &DynamicObject) -> ClusterResult<DynamicObject> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.check_write(kind)?;
        let name = name_of(obj)?;
        let key = kind.key();
        let rv = self.bump_rv();
        let mut objects = self.objects.lock().unwrap_or_else(|p| p.into_inner());
        let slot = objects
            .iter_mut()
            .find(|s| s.kind == key && s.namespace == namespace && s.obj.metadata.name.as_deref() == Some(name.as_str()))
            .ok_or(ClusterError::NotFound)?;
        if obj.metadata.resource_version.is_some() && obj.metadata.resource_version != slot.obj.metadata.resource_version {
            return Err(ClusterError::Api(format!("conflict on {} \"{}\"", kind.kind, name)));
        }
        let mut stored = obj.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = slot.obj.metadata.uid.clone();
        stored.metadata.resource_version = Some(rv);
        slot.obj = stored.clone();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FIAAS_APPLICATION;
    use kube::core::ObjectMeta;
    use serde_json::json;

    fn obj(name: &str, app: &str) -> DynamicObject {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), app.to_string());
        DynamicObject {
            types: None,
            metadata: ObjectMeta { name: Some(name.into()), labels: Some(labels), ..Default::default() },
            data: json!({"spec": {}}),
        }
    }

    #[tokio::test]
    async fn create_get_replace() {
        let c = MemoryCluster::new().serving(&[FIAAS_APPLICATION]);
        let created = c.create(&FIAAS_APPLICATION, "ns", &obj("a", "a")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(c.create(&FIAAS_APPLICATION, "ns", &obj("a", "a")).await.is_err());

        let mut next = obj("a", "a");
        next.metadata.resource_version = created.metadata.resource_version.clone();
        next.data = json!({"spec": {"image": "v2"}});
        let replaced = c.replace(&FIAAS_APPLICATION, "ns", &next).await.unwrap();
        assert_eq!(replaced.metadata.uid, created.metadata.uid);
        assert_ne!(replaced.metadata.resource_version, created.metadata.resource_version);

        let got = c.get(&FIAAS_APPLICATION, "ns", "a").await.unwrap();
        assert_eq!(got.data["spec"]["image"], "v2");
        assert!(c.get(&FIAAS_APPLICATION, "other", "a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn find_filters_by_labels_in_order() {
        let c = MemoryCluster::new().serving(&[FIAAS_APPLICATION]);
        c.insert(&FIAAS_APPLICATION, "ns", obj("first", "x"));
        c.insert(&FIAAS_APPLICATION, "ns", obj("other", "y"));
        c.insert(&FIAAS_APPLICATION, "ns", obj("second", "x"));
        let mut sel = BTreeMap::new();
        sel.insert("app".to_string(), "x".to_string());
        let found = c.find(&FIAAS_APPLICATION, "ns", &sel).await.unwrap();
        let names: Vec<_> = found.iter().filter_map(|o| o.metadata.name.clone()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn unserved_kind_is_not_found() {
        let c = MemoryCluster::new();
        assert!(c.probe(&FIAAS_APPLICATION).await.unwrap_err().is_not_found());
    }
}
