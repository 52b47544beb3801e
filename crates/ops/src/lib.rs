//! Mutation protocols: create with a uniqueness probe, read-back deletes,
//! namespace registration, and the temporary-exposure workflow with its
//! revert timers.

#![forbid(unsafe_code)]

use berth_cluster::ClusterApi;
use berth_core::{BerthError, BerthResult, Kind, Namespace, Service, ServiceType, WorkloadKind};
use berth_gateway::kinds::{
    namespace_doc, DeploymentMapper, NamespaceMapper, ServiceMapper, StatefulSetMapper,
};
use berth_gateway::{Gateway, InputMapper, ObjectMapper};
use berth_persist::Directory;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_EXPOSE_SECS: u64 = 300;

// ----------------- Revert timers -----------------

struct ArmedRevert {
    generation: u64,
    task: JoinHandle<()>,
}

/// Pending revert tasks keyed by `(namespace, workload)`. Re-arming a key
/// aborts the previous task; a fired task removes its own entry, but only
/// while the entry is still its own generation.
#[derive(Default)]
struct TimerRegistry {
    serial: u64,
    armed: HashMap<(String, String), ArmedRevert>,
}

// ----------------- Provisioner -----------------

/// Mutation protocols against the cluster plus the directory bookkeeping
/// that goes with them. One instance serves the whole process.
pub struct Provisioner {
    cluster: Arc<dyn ClusterApi>,
    directory: Arc<dyn Directory>,
    timers: Arc<Mutex<TimerRegistry>>,
    expose_window: Duration,
}

impl Provisioner {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        directory: Arc<dyn Directory>,
        expose_window: Duration,
    ) -> Self {
        Self {
            cluster,
            directory,
            timers: Arc::new(Mutex::new(TimerRegistry::default())),
            expose_window,
        }
    }

    /// Exposure window from `BERTH_EXPOSE_SECS`, default five minutes.
    pub fn from_env(cluster: Arc<dyn ClusterApi>, directory: Arc<dyn Directory>) -> Self {
        let secs = std::env::var("BERTH_EXPOSE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EXPOSE_SECS);
        Self::new(cluster, directory, Duration::from_secs(secs))
    }

    fn gateway<M: ObjectMapper>(&self) -> Gateway<M> {
        Gateway::new(self.cluster.clone())
    }

    /// Create protocol: uniqueness probe, submit, read back, audit row.
    ///
    /// The probe is a fast-fail courtesy, not a guarantee; two racing
    /// creates can both pass it and the loser then gets the orchestrator's
    /// conflict. Nothing is submitted when the probe hits.
    pub async fn create<M: InputMapper>(
        &self,
        namespace: Option<&str>,
        input: &M::Input,
    ) -> BerthResult<M::Domain> {
        let started = Instant::now();
        let name = M::name_of(input);
        let gw = self.gateway::<M>();
        let metas = gw.list_metas(namespace).await?;
        if metas.iter().any(|m| m.name == name) {
            return Err(BerthError::AlreadyExists { kind: M::KIND, name: name.to_string() });
        }
        let created = gw.create(namespace, input).await?;
        if let (Some(ns), Some(yaml)) = (namespace, M::manifest_of(&created)) {
            self.record_audit(ns, name, yaml).await?;
        }
        histogram!("ops_create_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("ops_create_total", 1u64);
        info!(kind = %M::KIND, name = %name, "ops: created");
        Ok(created)
    }

    /// Audit rows carry the yaml re-serialized as JSON text, under the
    /// `<name>-dpl.yaml` convention.
    async fn record_audit(&self, namespace: &str, name: &str, yaml: &str) -> BerthResult<()> {
        let parsed: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| BerthError::Store(format!("audit yaml for {namespace}/{name}: {e}")))?;
        let content = serde_json::to_string(&parsed)
            .map_err(|e| BerthError::Store(format!("audit row for {namespace}/{name}: {e}")))?;
        self.directory
            .record_manifest(namespace, &format!("{name}-dpl.yaml"), &content)
            .await?;
        Ok(())
    }

    /// Read-back-then-delete; the snapshot is the caller's last view.
    pub async fn delete<M: ObjectMapper>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> BerthResult<M::Domain> {
        let snapshot = self.gateway::<M>().delete(namespace, name).await?;
        info!(kind = %M::KIND, name = %name, "ops: deleted");
        Ok(snapshot)
    }

    /// Namespace creation runs in registry order: cluster uniqueness probe,
    /// directory row, then the cluster create. A cluster failure after the
    /// row is written leaves the row behind; nothing rolls back.
    pub async fn create_namespace(
        &self,
        principal_id: i64,
        name: &str,
        project: Option<&str>,
    ) -> BerthResult<Namespace> {
        let gw = self.gateway::<NamespaceMapper>();
        let metas = gw.list_metas(None).await?;
        if metas.iter().any(|m| m.name == name) {
            return Err(BerthError::AlreadyExists {
                kind: Kind::Namespace,
                name: name.to_string(),
            });
        }
        self.directory.register_namespace(principal_id, name, project).await?;
        self.cluster.create(Kind::Namespace, None, namespace_doc(name)).await?;
        info!(namespace = %name, "ops: namespace created");
        Ok(Namespace { name: name.to_string() })
    }

    /// Deletes the cluster namespace, then drops the directory row
    /// best-effort; a row without a namespace only wastes a line.
    pub async fn delete_namespace(&self, name: &str) -> BerthResult<Namespace> {
        let snapshot = self.gateway::<NamespaceMapper>().delete(None, name).await?;
        if let Err(e) = self.directory.remove_namespace(name).await {
            warn!(namespace = %name, error = %e, "ops: directory row removal failed");
        }
        info!(namespace = %name, "ops: namespace deleted");
        Ok(snapshot)
    }

    pub async fn scale_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> BerthResult<()> {
        let started = Instant::now();
        let result = match kind {
            WorkloadKind::Deployment => {
                self.gateway::<DeploymentMapper>().scale(namespace, name, replicas).await
            }
            WorkloadKind::StatefulSet => {
                self.gateway::<StatefulSetMapper>().scale(namespace, name, replicas).await
            }
        };
        result.map_err(|source| BerthError::ScaleFailed {
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        })?;
        histogram!("ops_scale_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Brings a workload up for a bounded window: scale to one replica,
    /// arm the revert, then resolve the `NodePort` service fronting the
    /// namespace. The revert is armed before the service lookup; a lookup
    /// failure surfaces with the timer already pending. The scale-down
    /// happens after the window even when nobody stays around.
    pub async fn start_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Option<Service>> {
        let started = Instant::now();
        let kind = self.resolve_workload(namespace, name).await?;
        self.scale_workload(kind, namespace, name, 1).await?;
        self.arm_revert(kind, namespace, name);
        let service = self
            .gateway::<ServiceMapper>()
            .find_by_type(namespace, ServiceType::NodePort)
            .await?;
        histogram!("ops_start_ms", started.elapsed().as_secs_f64() * 1000.0);
        info!(
            namespace = %namespace,
            workload = %name,
            window_secs = self.expose_window.as_secs(),
            "ops: workload started"
        );
        Ok(service)
    }

    /// Scales down right now, then drops the armed revert. Failure here is
    /// synchronous and surfaced, unlike the timer's; a failed scale leaves
    /// the armed revert pending.
    pub async fn stop_workload(&self, namespace: &str, name: &str) -> BerthResult<bool> {
        let started = Instant::now();
        let kind = self.resolve_workload(namespace, name).await?;
        self.scale_workload(kind, namespace, name, 0).await?;
        self.disarm(namespace, name);
        histogram!("ops_stop_ms", started.elapsed().as_secs_f64() * 1000.0);
        info!(namespace = %namespace, workload = %name, "ops: workload stopped");
        Ok(true)
    }

    /// Number of armed revert timers, for callers that surface it.
    pub fn pending_reverts(&self) -> usize {
        self.timers.lock().unwrap().armed.len()
    }

    /// A name can be either workload kind; deployments are probed first.
    async fn resolve_workload(&self, namespace: &str, name: &str) -> BerthResult<WorkloadKind> {
        let deployments = self
            .gateway::<DeploymentMapper>()
            .list_metas(Some(namespace))
            .await?;
        if deployments.iter().any(|m| m.name == name) {
            return Ok(WorkloadKind::Deployment);
        }
        let sets = self
            .gateway::<StatefulSetMapper>()
            .list_metas(Some(namespace))
            .await?;
        if sets.iter().any(|m| m.name == name) {
            return Ok(WorkloadKind::StatefulSet);
        }
        Err(BerthError::NotFound(format!("workload {namespace}/{name}")))
    }

    fn arm_revert(&self, kind: WorkloadKind, namespace: &str, name: &str) {
        let key = (namespace.to_string(), name.to_string());
        let mut timers = self.timers.lock().unwrap();
        timers.serial += 1;
        let generation = timers.serial;

        let cluster = self.cluster.clone();
        let registry = self.timers.clone();
        let window = self.expose_window;
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let (ns, wl) = (task_key.0.as_str(), task_key.1.as_str());
            let result = match kind {
                WorkloadKind::Deployment => {
                    Gateway::<DeploymentMapper>::new(cluster).scale(ns, wl, 0).await
                }
                WorkloadKind::StatefulSet => {
                    Gateway::<StatefulSetMapper>::new(cluster).scale(ns, wl, 0).await
                }
            };
            match result {
                Ok(()) => info!(namespace = %ns, workload = %wl, "ops: exposure window closed"),
                Err(e) => {
                    // Fire-and-forget: the original caller is long gone.
                    warn!(namespace = %ns, workload = %wl, error = %e, "ops: scheduled revert failed")
                }
            }
            let mut timers = registry.lock().unwrap();
            if timers.armed.get(&task_key).is_some_and(|a| a.generation == generation) {
                timers.armed.remove(&task_key);
            }
        });

        if let Some(previous) = timers.armed.insert(key, ArmedRevert { generation, task }) {
            previous.task.abort();
        }
    }

    fn disarm(&self, namespace: &str, name: &str) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(armed) = timers.armed.remove(&(namespace.to_string(), name.to_string())) {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_cluster::{MemoryCluster, Verb};
    use berth_core::{ClusterError, Container, DeploymentInput, PodTemplate, Role, StatusClass};
    use berth_persist::MemoryDirectory;
    use serde_json::json;

    fn web_input(replicas: u32) -> DeploymentInput {
        DeploymentInput {
            name: "web".into(),
            replicas,
            template: PodTemplate {
                containers: vec![Container {
                    name: "app".into(),
                    image: "nginx".into(),
                    resources: None,
                    ports: None,
                    env: None,
                }],
            },
        }
    }

    fn seed_deployment(cluster: &MemoryCluster, ns: &str, name: &str, replicas: u32) {
        cluster
            .seed(
                Kind::Deployment,
                Some(ns),
                json!({"metadata": {"name": name}, "spec": {"replicas": replicas}}),
            )
            .unwrap();
    }

    fn seed_node_port(cluster: &MemoryCluster, ns: &str, name: &str) {
        cluster
            .seed(
                Kind::Service,
                Some(ns),
                json!({
                    "metadata": {"name": name},
                    "spec": {
                        "type": "NodePort",
                        "selector": {"app": "web"},
                        "ports": [{"protocol": "TCP", "port": 80, "nodePort": 30080}]
                    }
                }),
            )
            .unwrap();
    }

    async fn registered_directory(ns: &str) -> Arc<MemoryDirectory> {
        let directory = Arc::new(MemoryDirectory::new());
        let owner = directory.upsert_principal("alice", Role::Member).await.unwrap();
        directory.register_namespace(owner.id, ns, None).await.unwrap();
        directory
    }

    fn replica_patches(cluster: &MemoryCluster, replicas: u64) -> usize {
        cluster
            .calls()
            .iter()
            .filter(|c| {
                c.verb == Verb::Patch
                    && c.body
                        .as_ref()
                        .and_then(|b| b.pointer("/spec/replicas"))
                        .and_then(|v| v.as_u64())
                        == Some(replicas)
            })
            .count()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn duplicate_create_fails_before_any_submission() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = registered_directory("demo").await;
        seed_deployment(&cluster, "demo", "web", 0);
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let err = ops.create::<DeploymentMapper>(Some("demo"), &web_input(0)).await.unwrap_err();
        match err {
            BerthError::AlreadyExists { kind, name } => {
                assert_eq!(kind, Kind::Deployment);
                assert_eq!(name, "web");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cluster.count(Verb::Create, Kind::Deployment), 0);
    }

    #[tokio::test]
    async fn create_reads_back_and_records_the_audit_row() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = registered_directory("demo").await;
        let ops = Provisioner::new(cluster.clone(), directory.clone(), Duration::from_secs(300));

        let created = ops.create::<DeploymentMapper>(Some("demo"), &web_input(0)).await.unwrap();
        assert_eq!(created.meta.name, "web");
        assert!(created.meta.uid.is_some());

        let rows = directory.manifests("demo").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "web-dpl.yaml");
        let content: serde_json::Value = serde_json::from_str(&rows[0].content).unwrap();
        assert_eq!(content["kind"], "Deployment");
        assert!(content["metadata"].get("uid").is_none());
    }

    #[tokio::test]
    async fn audit_failure_surfaces_but_the_object_stays_created() {
        let cluster = Arc::new(MemoryCluster::new());
        // No directory row for the namespace.
        let directory = Arc::new(MemoryDirectory::new());
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let err = ops.create::<DeploymentMapper>(Some("demo"), &web_input(0)).await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)), "err={err}");
        assert_eq!(cluster.count(Verb::Create, Kind::Deployment), 1);
    }

    #[tokio::test]
    async fn namespace_create_probes_then_registers_then_submits() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        let ops = Provisioner::new(cluster.clone(), directory.clone(), Duration::from_secs(300));

        let ns = ops.create_namespace(1, "demo", Some("web")).await.unwrap();
        assert_eq!(ns.name, "demo");
        let owner = directory.namespace_owner("demo").await.unwrap().unwrap();
        assert_eq!(owner.principal_id, 1);
        assert_eq!(owner.project.as_deref(), Some("web"));
        assert_eq!(cluster.count(Verb::Create, Kind::Namespace), 1);

        let err = ops.create_namespace(1, "demo", None).await.unwrap_err();
        assert!(matches!(err, BerthError::AlreadyExists { .. }));
        assert_eq!(cluster.count(Verb::Create, Kind::Namespace), 1);
    }

    #[tokio::test]
    async fn failed_cluster_create_leaves_the_registry_row_behind() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        cluster.fail_next(Verb::Create, Kind::Namespace, ClusterError::internal("boom"));
        let ops = Provisioner::new(cluster.clone(), directory.clone(), Duration::from_secs(300));

        let err = ops.create_namespace(1, "demo", None).await.unwrap_err();
        assert!(matches!(err, BerthError::Cluster(_)));
        // Registry order means the row was written first and stays.
        assert!(directory.namespace_owner("demo").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_namespace_drops_the_registry_row() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        let ops = Provisioner::new(cluster.clone(), directory.clone(), Duration::from_secs(300));
        ops.create_namespace(1, "demo", None).await.unwrap();

        let ns = ops.delete_namespace("demo").await.unwrap();
        assert_eq!(ns.name, "demo");
        assert_eq!(cluster.count(Verb::Delete, Kind::Namespace), 1);
        assert!(directory.namespace_owner("demo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scale_failure_carries_the_workload_context() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        let ops = Provisioner::new(cluster, directory, Duration::from_secs(300));

        let err = ops
            .scale_workload(WorkloadKind::Deployment, "demo", "ghost", 3)
            .await
            .unwrap_err();
        match err {
            BerthError::ScaleFailed { namespace, name, source } => {
                assert_eq!(namespace, "demo");
                assert_eq!(name, "ghost");
                assert_eq!(source.class, StatusClass::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_scales_up_once_and_reverts_once_after_the_window() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        seed_node_port(&cluster, "demo", "web-svc");
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let svc = ops.start_workload("demo", "web").await.unwrap().unwrap();
        assert_eq!(svc.meta.name, "web-svc");
        assert_eq!(svc.service_type, ServiceType::NodePort);
        assert_eq!(replica_patches(&cluster, 1), 1);
        assert_eq!(ops.pending_reverts(), 1);

        tokio::time::advance(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 1);
        assert_eq!(ops.pending_reverts(), 0);

        // Nothing else fires later.
        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 1);
        assert_eq!(replica_patches(&cluster, 1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_a_node_port_service_still_arms_the_revert() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        cluster
            .seed(
                Kind::StatefulSet,
                Some("demo"),
                json!({"metadata": {"name": "db"}, "spec": {"replicas": 0, "serviceName": "db-headless"}}),
            )
            .unwrap();
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let svc = ops.start_workload("demo", "db").await.unwrap();
        assert!(svc.is_none());
        assert_eq!(replica_patches(&cluster, 1), 1);
        assert_eq!(cluster.count(Verb::Patch, Kind::StatefulSet), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(cluster.count(Verb::Patch, Kind::StatefulSet), 2);
        assert_eq!(replica_patches(&cluster, 0), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_service_lookup_still_arms_the_revert() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        seed_node_port(&cluster, "demo", "web-svc");
        cluster.fail_next(Verb::List, Kind::Service, ClusterError::internal("boom"));
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let err = ops.start_workload("demo", "web").await.unwrap_err();
        assert!(matches!(err, BerthError::Cluster(_)), "err={err}");
        // The replica came up before the lookup, so the timer must be live.
        assert_eq!(replica_patches(&cluster, 1), 1);
        assert_eq!(ops.pending_reverts(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 1);
        assert_eq!(ops.pending_reverts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_pending_revert() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        ops.start_workload("demo", "web").await.unwrap();
        assert_eq!(ops.pending_reverts(), 1);

        assert!(ops.stop_workload("demo", "web").await.unwrap());
        assert_eq!(ops.pending_reverts(), 0);
        assert_eq!(replica_patches(&cluster, 0), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;
        // The stop's patch stays the only scale-down.
        assert_eq!(replica_patches(&cluster, 0), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stop_keeps_the_revert_armed() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        ops.start_workload("demo", "web").await.unwrap();
        cluster.fail_next(Verb::Patch, Kind::Deployment, ClusterError::internal("boom"));

        let err = ops.stop_workload("demo", "web").await.unwrap_err();
        assert!(matches!(err, BerthError::ScaleFailed { .. }), "err={err}");
        // The failed patch was attempted but the timer stays as the backstop.
        assert_eq!(replica_patches(&cluster, 0), 1);
        assert_eq!(ops.pending_reverts(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 2);
        assert_eq!(ops.pending_reverts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_timer() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        ops.start_workload("demo", "web").await.unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;
        ops.start_workload("demo", "web").await.unwrap();
        assert_eq!(ops.pending_reverts(), 1);

        // The first timer's deadline passes without a revert.
        tokio::time::advance(Duration::from_secs(250)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 0);

        // The second timer's deadline fires exactly once.
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(replica_patches(&cluster, 0), 1);
        assert_eq!(ops.pending_reverts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn revert_failure_is_swallowed_and_the_timer_clears() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        ops.start_workload("demo", "web").await.unwrap();
        cluster.fail_next(Verb::Patch, Kind::Deployment, ClusterError::internal("boom"));

        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(ops.pending_reverts(), 0);
        // The failed patch was attempted and nothing blew up.
        assert_eq!(cluster.count(Verb::Patch, Kind::Deployment), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scale_up_surfaces_and_arms_nothing() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        seed_deployment(&cluster, "demo", "web", 0);
        cluster.fail_next(Verb::Patch, Kind::Deployment, ClusterError::internal("boom"));
        let ops = Provisioner::new(cluster.clone(), directory, Duration::from_secs(300));

        let err = ops.start_workload("demo", "web").await.unwrap_err();
        assert!(matches!(err, BerthError::ScaleFailed { .. }));
        assert_eq!(ops.pending_reverts(), 0);
    }

    #[tokio::test]
    async fn unknown_workload_is_not_found() {
        let cluster = Arc::new(MemoryCluster::new());
        let directory = Arc::new(MemoryDirectory::new());
        let ops = Provisioner::new(cluster, directory, Duration::from_secs(300));

        let err = ops.start_workload("demo", "ghost").await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)));
        let err = ops.stop_workload("demo", "ghost").await.unwrap_err();
        assert!(matches!(err, BerthError::NotFound(_)));
    }
}
