//! Cluster transport: one narrow surface over the orchestrator API.
//!
//! `KubeCluster` talks to a live API server through `kube`; `MemoryCluster`
//! is an in-process stand-in that stores documents, records every call and
//! supports failure injection, used by tests further up the stack.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use berth_core::{ClusterError, Kind, StatusClass};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Narrow orchestrator surface the gateways are written against.
///
/// Documents cross this boundary as raw JSON; projection into domain types
/// happens one layer up.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> ClusterResult<Vec<Value>>;
    async fn read(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<Value>;
    async fn create(&self, kind: Kind, namespace: Option<&str>, doc: Value) -> ClusterResult<Value>;
    async fn delete(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<()>;
    /// RFC 7386 merge patch against the live object.
    async fn patch_merge(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
        patch: Value,
    ) -> ClusterResult<Value>;
}

// ----------------- Kube-backed transport -----------------

use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::Client;

/// Transport over a live API server. Constructed once and shared; everything
/// holding one gets it injected rather than building its own client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the ambient kubeconfig or in-cluster environment.
    pub async fn connect() -> ClusterResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::internal(format!("connecting to cluster: {e}")))?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for(&self, kind: Kind, namespace: Option<&str>) -> ClusterResult<Api<DynamicObject>> {
        let ar = api_resource(kind);
        if !kind.namespaced() {
            return Ok(Api::all_with(self.client.clone(), &ar));
        }
        match namespace {
            Some(ns) => Ok(Api::namespaced_with(self.client.clone(), ns, &ar)),
            None => Err(ClusterError {
                class: StatusClass::BadRequest,
                code: 400,
                message: format!("namespace required for {kind}"),
            }),
        }
    }
}

fn api_resource(kind: Kind) -> ApiResource {
    use k8s_openapi::api::{apps::v1 as apps, core::v1 as corev1};
    match kind {
        Kind::Namespace => ApiResource::erase::<corev1::Namespace>(&()),
        Kind::Pod => ApiResource::erase::<corev1::Pod>(&()),
        Kind::Deployment => ApiResource::erase::<apps::Deployment>(&()),
        Kind::StatefulSet => ApiResource::erase::<apps::StatefulSet>(&()),
        Kind::Service => ApiResource::erase::<corev1::Service>(&()),
        Kind::Secret => ApiResource::erase::<corev1::Secret>(&()),
        Kind::ConfigMap => ApiResource::erase::<corev1::ConfigMap>(&()),
        Kind::PersistentVolume => ApiResource::erase::<corev1::PersistentVolume>(&()),
        Kind::PersistentVolumeClaim => ApiResource::erase::<corev1::PersistentVolumeClaim>(&()),
    }
}

fn map_kube_err(e: kube::Error) -> ClusterError {
    match e {
        kube::Error::Api(resp) => ClusterError::from_status(resp.code, resp.message),
        other => ClusterError::internal(other.to_string()),
    }
}

fn to_json(obj: &DynamicObject) -> ClusterResult<Value> {
    serde_json::to_value(obj).map_err(|e| ClusterError::internal(e.to_string()))
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> ClusterResult<Vec<Value>> {
        let api = self.api_for(kind, namespace)?;
        let items = api
            .list(&ListParams::default())
            .await
            .map_err(map_kube_err)?;
        items.items.iter().map(to_json).collect()
    }

    async fn read(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<Value> {
        let api = self.api_for(kind, namespace)?;
        let obj = api.get(name).await.map_err(map_kube_err)?;
        to_json(&obj)
    }

    async fn create(&self, kind: Kind, namespace: Option<&str>, doc: Value) -> ClusterResult<Value> {
        let api = self.api_for(kind, namespace)?;
        let obj: DynamicObject =
            serde_json::from_value(doc).map_err(|e| ClusterError::internal(e.to_string()))?;
        let created = api
            .create(&PostParams::default(), &obj)
            .await
            .map_err(map_kube_err)?;
        to_json(&created)
    }

    async fn delete(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<()> {
        let api = self.api_for(kind, namespace)?;
        let _ = api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(map_kube_err)?;
        Ok(())
    }

    async fn patch_merge(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
        patch: Value,
    ) -> ClusterResult<Value> {
        let api = self.api_for(kind, namespace)?;
        let patched = api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(map_kube_err)?;
        to_json(&patched)
    }
}

// ----------------- In-memory transport -----------------

/// Transport verbs, recorded per call for test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    List,
    Read,
    Create,
    Delete,
    Patch,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub verb: Verb,
    pub kind: Kind,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MemoryState {
    docs: HashMap<(Kind, Option<String>, String), Value>,
    calls: Vec<CallRecord>,
    failures: HashMap<(Verb, Kind), VecDeque<ClusterError>>,
    serial: u64,
}

/// In-memory stand-in for the orchestrator. Assigns server-side identity on
/// create and applies merge-patch semantics, but simulates nothing else.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<MemoryState>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next call matching the verb and kind.
    pub fn fail_next(&self, verb: Verb, kind: Kind, err: ClusterError) {
        let mut st = self.state.lock().unwrap();
        st.failures.entry((verb, kind)).or_default().push_back(err);
    }

    /// Everything the fake has seen, in call order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, verb: Verb, kind: Kind) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.verb == verb && c.kind == kind)
            .count()
    }

    /// Insert an object without recording a call, as if it predated the test.
    pub fn seed(&self, kind: Kind, namespace: Option<&str>, doc: Value) -> ClusterResult<Value> {
        let mut st = self.state.lock().unwrap();
        Self::insert_new(&mut st, kind, namespace, doc)
    }

    fn record(&self, rec: CallRecord) -> ClusterResult<()> {
        let mut st = self.state.lock().unwrap();
        let key = (rec.verb, rec.kind);
        st.calls.push(rec);
        if let Some(queue) = st.failures.get_mut(&key) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn scope(kind: Kind, namespace: Option<&str>) -> Option<String> {
        if kind.namespaced() {
            namespace.map(str::to_string)
        } else {
            None
        }
    }

    fn insert_new(
        st: &mut MemoryState,
        kind: Kind,
        namespace: Option<&str>,
        mut doc: Value,
    ) -> ClusterResult<Value> {
        let name = doc
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ClusterError {
                class: StatusClass::BadRequest,
                code: 400,
                message: "metadata.name required".into(),
            })?;
        let ns = Self::scope(kind, namespace);
        let key = (kind, ns.clone(), name.clone());
        if st.docs.contains_key(&key) {
            return Err(ClusterError::conflict(kind, &name));
        }
        st.serial += 1;
        let serial = st.serial;
        doc["apiVersion"] = Value::String(kind.api_version().to_string());
        doc["kind"] = Value::String(kind.kind_name().to_string());
        if let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            if let Some(ns) = &ns {
                meta.insert("namespace".into(), Value::String(ns.clone()));
            }
            meta.insert(
                "uid".into(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
            meta.insert("resourceVersion".into(), Value::String(serial.to_string()));
            meta.insert(
                "creationTimestamp".into(),
                Value::String("2024-01-01T00:00:00Z".into()),
            );
        }
        st.docs.insert(key, doc.clone());
        Ok(doc)
    }
}

/// RFC 7386: objects merge member-wise, `null` removes, anything else replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    match patch.as_object() {
        Some(entries) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Some(obj) = target.as_object_mut() {
                for (k, v) in entries {
                    if v.is_null() {
                        obj.remove(k);
                    } else {
                        merge_patch(obj.entry(k.clone()).or_insert(Value::Null), v);
                    }
                }
            }
        }
        None => *target = patch.clone(),
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn list(&self, kind: Kind, namespace: Option<&str>) -> ClusterResult<Vec<Value>> {
        self.record(CallRecord {
            verb: Verb::List,
            kind,
            namespace: namespace.map(str::to_string),
            name: None,
            body: None,
        })?;
        let st = self.state.lock().unwrap();
        let mut items: Vec<(String, Value)> = st
            .docs
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|((_, _, name), doc)| (name.clone(), doc.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn read(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<Value> {
        self.record(CallRecord {
            verb: Verb::Read,
            kind,
            namespace: namespace.map(str::to_string),
            name: Some(name.to_string()),
            body: None,
        })?;
        let st = self.state.lock().unwrap();
        let key = (kind, Self::scope(kind, namespace), name.to_string());
        st.docs
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found(kind, name))
    }

    async fn create(&self, kind: Kind, namespace: Option<&str>, doc: Value) -> ClusterResult<Value> {
        self.record(CallRecord {
            verb: Verb::Create,
            kind,
            namespace: namespace.map(str::to_string),
            name: doc
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            body: Some(doc.clone()),
        })?;
        let mut st = self.state.lock().unwrap();
        Self::insert_new(&mut st, kind, namespace, doc)
    }

    async fn delete(&self, kind: Kind, namespace: Option<&str>, name: &str) -> ClusterResult<()> {
        self.record(CallRecord {
            verb: Verb::Delete,
            kind,
            namespace: namespace.map(str::to_string),
            name: Some(name.to_string()),
            body: None,
        })?;
        let mut st = self.state.lock().unwrap();
        let key = (kind, Self::scope(kind, namespace), name.to_string());
        match st.docs.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ClusterError::not_found(kind, name)),
        }
    }

    async fn patch_merge(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
        patch: Value,
    ) -> ClusterResult<Value> {
        self.record(CallRecord {
            verb: Verb::Patch,
            kind,
            namespace: namespace.map(str::to_string),
            name: Some(name.to_string()),
            body: Some(patch.clone()),
        })?;
        let mut st = self.state.lock().unwrap();
        st.serial += 1;
        let serial = st.serial;
        let key = (kind, Self::scope(kind, namespace), name.to_string());
        match st.docs.get_mut(&key) {
            Some(doc) => {
                merge_patch(doc, &patch);
                if let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                    meta.insert("resourceVersion".into(), Value::String(serial.to_string()));
                }
                Ok(doc.clone())
            }
            None => Err(ClusterError::not_found(kind, name)),
        }
    }
}
