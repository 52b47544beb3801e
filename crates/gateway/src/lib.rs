//! Resource gateways: typed views over the cluster transport.
//!
//! One generic [`Gateway`] carries the verb protocols (list metas, read,
//! create-then-read, read-then-delete, scale); per-kind [`ObjectMapper`]
//! strategies in [`kinds`] translate between raw documents and the projected
//! model. Nothing here caches; every call goes to the transport.

#![forbid(unsafe_code)]

pub mod kinds;

use berth_cluster::{ClusterApi, ClusterResult};
use berth_core::{BerthError, BerthResult, Kind, Metadata, Service, ServiceType, Workload};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

// ----------------- Object mapping -----------------

/// Read-only fields the server owns. Stripping them leaves a manifest that
/// can be re-submitted.
pub fn strip_read_only(mut doc: Value) -> Value {
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("status");
    }
    if let Some(meta) = doc.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("creationTimestamp");
        meta.remove("deletionGracePeriodSeconds");
        meta.remove("deletionTimestamp");
        meta.remove("generation");
        meta.remove("resourceVersion");
        meta.remove("selfLink");
        meta.remove("uid");
        meta.remove("managedFields");
    }
    doc
}

/// Portable YAML projection of a document, read-only fields removed.
pub fn render_yaml(kind: Kind, doc: &Value) -> BerthResult<String> {
    let clean = strip_read_only(doc.clone());
    serde_yaml::to_string(&clean).map_err(|_| BerthError::malformed(kind, "yaml"))
}

/// Identity slice of any document. Absent fields project as empty, the way
/// list endpoints tolerate partial objects.
pub fn object_meta(doc: &Value) -> Metadata {
    Metadata {
        name: doc
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        uid: doc
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .map(str::to_string),
        namespace: doc
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn field_of(ptr: &str) -> String {
    ptr.trim_start_matches('/').replace('/', ".")
}

pub(crate) fn require_str(kind: Kind, doc: &Value, ptr: &str) -> BerthResult<String> {
    doc.pointer(ptr)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BerthError::malformed(kind, field_of(ptr)))
}

pub(crate) fn require_u32(kind: Kind, doc: &Value, ptr: &str) -> BerthResult<u32> {
    doc.pointer(ptr)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| BerthError::malformed(kind, field_of(ptr)))
}

pub(crate) fn opt_str(doc: &Value, ptr: &str) -> Option<String> {
    doc.pointer(ptr).and_then(Value::as_str).map(str::to_string)
}

/// Translates one kind between raw documents and its projection.
pub trait ObjectMapper: Send + Sync + 'static {
    const KIND: Kind;
    type Domain: Send;

    fn to_domain(doc: &Value) -> BerthResult<Self::Domain>;

    /// Manifest carried by the projection, for kinds that keep one.
    fn manifest_of(_domain: &Self::Domain) -> Option<&str> {
        None
    }
}

/// Mapping for kinds that can be created through the facade.
pub trait InputMapper: ObjectMapper {
    type Input: Send + Sync;

    /// Name the input declares; create protocols probe it before submitting.
    fn name_of(input: &Self::Input) -> &str;

    fn to_native(namespace: Option<&str>, input: &Self::Input) -> BerthResult<Value>;
}

// ----------------- Generic gateway -----------------

/// Verb protocols for one kind, parameterized by its mapping strategy.
pub struct Gateway<M: ObjectMapper> {
    cluster: Arc<dyn ClusterApi>,
    _strategy: PhantomData<M>,
}

impl<M: ObjectMapper> Clone for Gateway<M> {
    fn clone(&self) -> Self {
        Self { cluster: self.cluster.clone(), _strategy: PhantomData }
    }
}

impl<M: ObjectMapper> Gateway<M> {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster, _strategy: PhantomData }
    }

    /// Cheap identity listing; the detail projections stay unfetched.
    pub async fn list_metas(&self, namespace: Option<&str>) -> BerthResult<Vec<Metadata>> {
        let docs = self.cluster.list(M::KIND, namespace).await?;
        Ok(docs.iter().map(object_meta).collect())
    }

    pub async fn get_info(&self, namespace: Option<&str>, name: &str) -> BerthResult<M::Domain> {
        let doc = self.cluster.read(M::KIND, namespace, name).await?;
        M::to_domain(&doc)
    }

    /// Read first so the caller gets a last look at what was removed.
    pub async fn delete(&self, namespace: Option<&str>, name: &str) -> BerthResult<M::Domain> {
        let snapshot = self.get_info(namespace, name).await?;
        self.cluster.delete(M::KIND, namespace, name).await?;
        Ok(snapshot)
    }
}

impl<M: InputMapper> Gateway<M> {
    /// Submit, then read back so server-assigned identity lands in the
    /// projection the caller sees.
    pub async fn create(&self, namespace: Option<&str>, input: &M::Input) -> BerthResult<M::Domain> {
        let doc = M::to_native(namespace, input)?;
        self.cluster.create(M::KIND, namespace, doc).await?;
        self.get_info(namespace, M::name_of(input)).await
    }
}

impl<M> Gateway<M>
where
    M: ObjectMapper<Domain = Workload>,
{
    /// Merge-patch `spec.replicas`. Kept raw so callers can wrap failures
    /// with their own context.
    pub async fn scale(&self, namespace: &str, name: &str, replicas: u32) -> ClusterResult<()> {
        let patch = serde_json::json!({"spec": {"replicas": replicas}});
        self.cluster
            .patch_merge(M::KIND, Some(namespace), name, patch)
            .await?;
        Ok(())
    }
}

impl Gateway<kinds::ServiceMapper> {
    /// Fetch every service in the namespace concurrently, then pick the
    /// first of the wanted type.
    pub async fn find_by_type(
        &self,
        namespace: &str,
        service_type: ServiceType,
    ) -> BerthResult<Option<Service>> {
        let metas = self.list_metas(Some(namespace)).await?;
        let fetches = metas.iter().map(|m| self.get_info(Some(namespace), &m.name));
        let services = futures::future::try_join_all(fetches).await?;
        Ok(services.into_iter().find(|s| s.service_type == service_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_cluster::{MemoryCluster, Verb};
    use berth_core::{ConfigMapInput, MapValue, StatusClass};
    use serde_json::json;

    fn sample_doc() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cfg",
                "namespace": "demo",
                "uid": "11111111-2222-3333-4444-555555555555",
                "resourceVersion": "42",
                "generation": 3,
                "creationTimestamp": "2023-05-01T00:00:00Z",
                "deletionGracePeriodSeconds": 30,
                "deletionTimestamp": "2023-06-01T00:00:00Z",
                "selfLink": "/api/v1/namespaces/demo/configmaps/cfg",
                "managedFields": [{"manager": "kubectl"}]
            },
            "status": {"phase": "Active"},
            "data": {"k": "v"}
        })
    }

    #[test]
    fn strip_removes_exactly_the_server_fields() {
        let stripped = strip_read_only(sample_doc());
        assert!(stripped.get("status").is_none());
        let meta = stripped["metadata"].as_object().unwrap();
        for gone in [
            "creationTimestamp",
            "deletionGracePeriodSeconds",
            "deletionTimestamp",
            "generation",
            "resourceVersion",
            "selfLink",
            "uid",
            "managedFields",
        ] {
            assert!(!meta.contains_key(gone), "{gone} should be stripped");
        }
        assert_eq!(meta["name"], "cfg");
        assert_eq!(meta["namespace"], "demo");
        assert_eq!(stripped["data"]["k"], "v");
    }

    #[test]
    fn strip_is_idempotent() {
        let once = strip_read_only(sample_doc());
        let twice = strip_read_only(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn rendered_yaml_carries_no_read_only_fields() {
        let yaml = render_yaml(Kind::ConfigMap, &sample_doc()).unwrap();
        assert!(yaml.contains("name: cfg"));
        assert!(!yaml.contains("resourceVersion"));
        assert!(!yaml.contains("uid"));
        assert!(!yaml.contains("status"));
    }

    #[test]
    fn object_meta_tolerates_partial_documents() {
        let m = object_meta(&json!({"metadata": {"name": "pv0"}}));
        assert_eq!(m.name, "pv0");
        assert_eq!(m.uid, None);
        assert_eq!(m.namespace, None);
    }

    #[tokio::test]
    async fn create_reads_back_server_identity() {
        let mem = Arc::new(MemoryCluster::new());
        let gw: Gateway<kinds::ConfigMapMapper> = Gateway::new(mem.clone());
        let input = ConfigMapInput {
            name: "cfg".into(),
            data: vec![MapValue { key: "k".into(), value: "v".into() }],
        };
        let cm = gw.create(Some("demo"), &input).await.unwrap();
        assert_eq!(cm.meta.name, "cfg");
        assert!(cm.meta.uid.is_some());
        assert!(!cm.yaml.contains("resourceVersion"));
        assert_eq!(mem.count(Verb::Create, Kind::ConfigMap), 1);
        assert_eq!(mem.count(Verb::Read, Kind::ConfigMap), 1);
    }

    #[tokio::test]
    async fn delete_returns_the_pre_deletion_snapshot() {
        let mem = Arc::new(MemoryCluster::new());
        mem.seed(
            Kind::ConfigMap,
            Some("demo"),
            json!({"metadata": {"name": "cfg"}, "data": {"k": "v"}}),
        )
        .unwrap();
        let gw: Gateway<kinds::ConfigMapMapper> = Gateway::new(mem.clone());
        let cm = gw.delete(Some("demo"), "cfg").await.unwrap();
        assert_eq!(cm.data[0].value, "v");
        let err = gw.get_info(Some("demo"), "cfg").await.unwrap_err();
        match err {
            BerthError::Cluster(e) => assert_eq!(e.class, StatusClass::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn delete_of_missing_object_never_issues_a_delete() {
        let mem = Arc::new(MemoryCluster::new());
        let gw: Gateway<kinds::ConfigMapMapper> = Gateway::new(mem.clone());
        let _ = gw.delete(Some("demo"), "ghost").await.unwrap_err();
        assert_eq!(mem.count(Verb::Delete, Kind::ConfigMap), 0);
    }

    #[tokio::test]
    async fn scale_sends_a_replica_merge_patch() {
        let mem = Arc::new(MemoryCluster::new());
        mem.seed(
            Kind::Deployment,
            Some("demo"),
            json!({"metadata": {"name": "web"}, "spec": {"replicas": 0}}),
        )
        .unwrap();
        let gw: Gateway<kinds::DeploymentMapper> = Gateway::new(mem.clone());
        gw.scale("demo", "web", 1).await.unwrap();
        let calls = mem.calls();
        let patch = calls
            .iter()
            .find(|c| c.verb == Verb::Patch)
            .and_then(|c| c.body.clone())
            .unwrap();
        assert_eq!(patch, json!({"spec": {"replicas": 1}}));
    }

    #[tokio::test]
    async fn find_by_type_fetches_all_then_selects() {
        let mem = Arc::new(MemoryCluster::new());
        mem.seed(
            Kind::Service,
            Some("demo"),
            json!({"metadata": {"name": "internal"}, "spec": {"type": "ClusterIP", "selector": {"app": "web"}, "ports": []}}),
        )
        .unwrap();
        mem.seed(
            Kind::Service,
            Some("demo"),
            json!({"metadata": {"name": "public"}, "spec": {"type": "NodePort", "selector": {"app": "web"}, "ports": [{"protocol": "TCP", "port": 80, "nodePort": 30080}]}}),
        )
        .unwrap();
        let gw: Gateway<kinds::ServiceMapper> = Gateway::new(mem.clone());
        let svc = gw
            .find_by_type("demo", ServiceType::NodePort)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(svc.meta.name, "public");
        assert_eq!(svc.ports[0].node_port, Some(30080));
        let none = gw
            .find_by_type("demo", ServiceType::LoadBalancer)
            .await
            .unwrap();
        assert!(none.is_none());
        // One detail read per listed service.
        assert_eq!(mem.count(Verb::Read, Kind::Service), 4);
    }
}
