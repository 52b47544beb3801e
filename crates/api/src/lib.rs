//! Berth public API façade (in-process).
//!
//! [`BerthApi`] is the surface the transport layer (GraphQL, CLI) consumes:
//! one method per exposed operation. [`InProcApi`] implements it by calling
//! the lower crates directly; a remote transport would implement the same
//! trait against RPC later.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use berth_cluster::ClusterApi;
use berth_core::{
    BerthResult, Capability, ClaimInput, ConfigMap, ConfigMapInput, DeploymentInput, Metadata,
    Namespace, PersistentVolume, PersistentVolumeClaim, Pod, Principal, Secret, SecretInput,
    Service, ServiceInput, StatefulSetInput, VolumeInput, Workload, WorkloadKind,
};
use berth_gateway::kinds::{
    ClaimMapper, ConfigMapMapper, DeploymentMapper, NamespaceMapper, PodMapper, SecretMapper,
    ServiceMapper, StatefulSetMapper, VolumeMapper,
};
use berth_gateway::{Gateway, ObjectMapper};
use berth_guard::OwnershipGuard;
use berth_ops::Provisioner;
use berth_persist::Directory;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Operations served to callers, one method per exposed call.
///
/// Reads take no principal and are not guarded. Every mutation authorizes
/// the acting principal first; an unauthorized call fails before anything
/// reaches the cluster.
#[async_trait]
pub trait BerthApi: Send + Sync {
    // ---- enumeration ----

    async fn namespaces(&self) -> BerthResult<Vec<Namespace>>;
    async fn pods(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn deployments(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn stateful_sets(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn services(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn secrets(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn config_maps(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;
    async fn volumes(&self) -> BerthResult<Vec<Metadata>>;
    async fn claims(&self, namespace: &str) -> BerthResult<Vec<Metadata>>;

    // ---- single-object projections ----

    async fn pod(&self, namespace: &str, name: &str) -> BerthResult<Pod>;
    async fn deployment(&self, namespace: &str, name: &str) -> BerthResult<Workload>;
    async fn stateful_set(&self, namespace: &str, name: &str) -> BerthResult<Workload>;
    async fn service(&self, namespace: &str, name: &str) -> BerthResult<Service>;
    async fn secret(&self, namespace: &str, name: &str) -> BerthResult<Secret>;
    async fn config_map(&self, namespace: &str, name: &str) -> BerthResult<ConfigMap>;
    async fn volume(&self, name: &str) -> BerthResult<PersistentVolume>;
    async fn claim(&self, namespace: &str, name: &str) -> BerthResult<PersistentVolumeClaim>;

    // ---- namespace lifecycle (cluster administration) ----

    /// Creates the namespace and registers it in the directory under the
    /// acting principal; ownership moves later via the directory.
    async fn create_namespace(
        &self,
        principal: &Principal,
        name: &str,
        project: Option<&str>,
    ) -> BerthResult<Namespace>;
    async fn delete_namespace(&self, principal: &Principal, name: &str)
        -> BerthResult<Namespace>;

    // ---- workloads ----

    async fn create_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        input: DeploymentInput,
    ) -> BerthResult<Workload>;
    async fn delete_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Workload>;
    async fn scale_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> BerthResult<bool>;
    async fn create_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        input: StatefulSetInput,
    ) -> BerthResult<Workload>;
    async fn delete_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Workload>;
    async fn scale_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> BerthResult<bool>;

    // ---- services and configuration ----

    async fn create_service(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ServiceInput,
    ) -> BerthResult<Service>;
    async fn delete_service(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Service>;
    async fn create_secret(
        &self,
        principal: &Principal,
        namespace: &str,
        input: SecretInput,
    ) -> BerthResult<Secret>;
    async fn delete_secret(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Secret>;
    async fn create_config_map(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ConfigMapInput,
    ) -> BerthResult<ConfigMap>;
    async fn delete_config_map(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<ConfigMap>;

    // ---- storage ----

    async fn create_volume(
        &self,
        principal: &Principal,
        input: VolumeInput,
    ) -> BerthResult<PersistentVolume>;
    async fn delete_volume(
        &self,
        principal: &Principal,
        name: &str,
    ) -> BerthResult<PersistentVolume>;
    async fn create_claim(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ClaimInput,
    ) -> BerthResult<PersistentVolumeClaim>;
    async fn delete_claim(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<PersistentVolumeClaim>;

    // ---- temporary exposure ----

    /// Scales the workload up for the configured window and returns the
    /// namespace's `NodePort` service when one exists.
    async fn start_workload(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Option<Service>>;
    /// Scales the workload down now and cancels any pending revert.
    async fn stop_workload(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<bool>;
}

// ----------------- In-process implementation -----------------

/// In-process implementation that calls the internal crates directly.
pub struct InProcApi {
    cluster: Arc<dyn ClusterApi>,
    guard: OwnershipGuard,
    ops: Provisioner,
}

impl InProcApi {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        directory: Arc<dyn Directory>,
        expose_window: Duration,
    ) -> Self {
        Self {
            guard: OwnershipGuard::new(directory.clone()),
            ops: Provisioner::new(cluster.clone(), directory, expose_window),
            cluster,
        }
    }

    /// Exposure window from `BERTH_EXPOSE_SECS`.
    pub fn from_env(cluster: Arc<dyn ClusterApi>, directory: Arc<dyn Directory>) -> Self {
        Self {
            guard: OwnershipGuard::new(directory.clone()),
            ops: Provisioner::from_env(cluster.clone(), directory),
            cluster,
        }
    }

    fn gw<M: ObjectMapper>(&self) -> Gateway<M> {
        Gateway::new(self.cluster.clone())
    }

    async fn write_in(&self, principal: &Principal, namespace: &str) -> BerthResult<()> {
        self.guard
            .authorize(principal, Some(namespace), Capability::NamespaceWrite)
            .await
    }

    async fn admin_only(&self, principal: &Principal) -> BerthResult<()> {
        self.guard
            .authorize(principal, None, Capability::ClusterAdmin)
            .await
    }
}

#[async_trait]
impl BerthApi for InProcApi {
    async fn namespaces(&self) -> BerthResult<Vec<Namespace>> {
        let metas = self.gw::<NamespaceMapper>().list_metas(None).await?;
        Ok(metas.into_iter().map(|m| Namespace { name: m.name }).collect())
    }

    async fn pods(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<PodMapper>().list_metas(Some(namespace)).await
    }

    async fn deployments(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<DeploymentMapper>().list_metas(Some(namespace)).await
    }

    async fn stateful_sets(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<StatefulSetMapper>().list_metas(Some(namespace)).await
    }

    async fn services(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<ServiceMapper>().list_metas(Some(namespace)).await
    }

    async fn secrets(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<SecretMapper>().list_metas(Some(namespace)).await
    }

    async fn config_maps(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<ConfigMapMapper>().list_metas(Some(namespace)).await
    }

    async fn volumes(&self) -> BerthResult<Vec<Metadata>> {
        self.gw::<VolumeMapper>().list_metas(None).await
    }

    async fn claims(&self, namespace: &str) -> BerthResult<Vec<Metadata>> {
        self.gw::<ClaimMapper>().list_metas(Some(namespace)).await
    }

    async fn pod(&self, namespace: &str, name: &str) -> BerthResult<Pod> {
        self.gw::<PodMapper>().get_info(Some(namespace), name).await
    }

    async fn deployment(&self, namespace: &str, name: &str) -> BerthResult<Workload> {
        self.gw::<DeploymentMapper>().get_info(Some(namespace), name).await
    }

    async fn stateful_set(&self, namespace: &str, name: &str) -> BerthResult<Workload> {
        self.gw::<StatefulSetMapper>().get_info(Some(namespace), name).await
    }

    async fn service(&self, namespace: &str, name: &str) -> BerthResult<Service> {
        self.gw::<ServiceMapper>().get_info(Some(namespace), name).await
    }

    async fn secret(&self, namespace: &str, name: &str) -> BerthResult<Secret> {
        self.gw::<SecretMapper>().get_info(Some(namespace), name).await
    }

    async fn config_map(&self, namespace: &str, name: &str) -> BerthResult<ConfigMap> {
        self.gw::<ConfigMapMapper>().get_info(Some(namespace), name).await
    }

    async fn volume(&self, name: &str) -> BerthResult<PersistentVolume> {
        self.gw::<VolumeMapper>().get_info(None, name).await
    }

    async fn claim(&self, namespace: &str, name: &str) -> BerthResult<PersistentVolumeClaim> {
        self.gw::<ClaimMapper>().get_info(Some(namespace), name).await
    }

    async fn create_namespace(
        &self,
        principal: &Principal,
        name: &str,
        project: Option<&str>,
    ) -> BerthResult<Namespace> {
        let t0 = Instant::now();
        info!(name = %name, "api: create_namespace start");
        self.admin_only(principal).await?;
        let ns = self.ops.create_namespace(principal.id, name, project).await?;
        info!(name = %name, took_ms = %t0.elapsed().as_millis(), "api: create_namespace ok");
        Ok(ns)
    }

    async fn delete_namespace(
        &self,
        principal: &Principal,
        name: &str,
    ) -> BerthResult<Namespace> {
        let t0 = Instant::now();
        info!(name = %name, "api: delete_namespace start");
        self.admin_only(principal).await?;
        let ns = self.ops.delete_namespace(name).await?;
        info!(name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_namespace ok");
        Ok(ns)
    }

    async fn create_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        input: DeploymentInput,
    ) -> BerthResult<Workload> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_deployment start");
        self.write_in(principal, namespace).await?;
        let dpl = self.ops.create::<DeploymentMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %dpl.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_deployment ok");
        Ok(dpl)
    }

    async fn delete_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Workload> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_deployment start");
        self.write_in(principal, namespace).await?;
        let dpl = self.ops.delete::<DeploymentMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_deployment ok");
        Ok(dpl)
    }

    async fn scale_deployment(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> BerthResult<bool> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, replicas, "api: scale_deployment start");
        self.write_in(principal, namespace).await?;
        self.ops
            .scale_workload(WorkloadKind::Deployment, namespace, name, replicas)
            .await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: scale_deployment ok");
        Ok(true)
    }

    async fn create_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        input: StatefulSetInput,
    ) -> BerthResult<Workload> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_stateful_set start");
        self.write_in(principal, namespace).await?;
        let sts = self.ops.create::<StatefulSetMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %sts.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_stateful_set ok");
        Ok(sts)
    }

    async fn delete_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Workload> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_stateful_set start");
        self.write_in(principal, namespace).await?;
        let sts = self.ops.delete::<StatefulSetMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_stateful_set ok");
        Ok(sts)
    }

    async fn scale_stateful_set(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> BerthResult<bool> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, replicas, "api: scale_stateful_set start");
        self.write_in(principal, namespace).await?;
        self.ops
            .scale_workload(WorkloadKind::StatefulSet, namespace, name, replicas)
            .await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: scale_stateful_set ok");
        Ok(true)
    }

    async fn create_service(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ServiceInput,
    ) -> BerthResult<Service> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_service start");
        self.write_in(principal, namespace).await?;
        let svc = self.ops.create::<ServiceMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %svc.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_service ok");
        Ok(svc)
    }

    async fn delete_service(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Service> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_service start");
        self.write_in(principal, namespace).await?;
        let svc = self.ops.delete::<ServiceMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_service ok");
        Ok(svc)
    }

    async fn create_secret(
        &self,
        principal: &Principal,
        namespace: &str,
        input: SecretInput,
    ) -> BerthResult<Secret> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_secret start");
        self.write_in(principal, namespace).await?;
        let secret = self.ops.create::<SecretMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %secret.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_secret ok");
        Ok(secret)
    }

    async fn delete_secret(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Secret> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_secret start");
        self.write_in(principal, namespace).await?;
        let secret = self.ops.delete::<SecretMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_secret ok");
        Ok(secret)
    }

    async fn create_config_map(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ConfigMapInput,
    ) -> BerthResult<ConfigMap> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_config_map start");
        self.write_in(principal, namespace).await?;
        let cm = self.ops.create::<ConfigMapMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %cm.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_config_map ok");
        Ok(cm)
    }

    async fn delete_config_map(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<ConfigMap> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_config_map start");
        self.write_in(principal, namespace).await?;
        let cm = self.ops.delete::<ConfigMapMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_config_map ok");
        Ok(cm)
    }

    async fn create_volume(
        &self,
        principal: &Principal,
        input: VolumeInput,
    ) -> BerthResult<PersistentVolume> {
        let t0 = Instant::now();
        info!(name = %input.name, "api: create_volume start");
        self.admin_only(principal).await?;
        let pv = self.ops.create::<VolumeMapper>(None, &input).await?;
        info!(name = %pv.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_volume ok");
        Ok(pv)
    }

    async fn delete_volume(
        &self,
        principal: &Principal,
        name: &str,
    ) -> BerthResult<PersistentVolume> {
        let t0 = Instant::now();
        info!(name = %name, "api: delete_volume start");
        self.admin_only(principal).await?;
        let pv = self.ops.delete::<VolumeMapper>(None, name).await?;
        info!(name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_volume ok");
        Ok(pv)
    }

    async fn create_claim(
        &self,
        principal: &Principal,
        namespace: &str,
        input: ClaimInput,
    ) -> BerthResult<PersistentVolumeClaim> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %input.name, "api: create_claim start");
        self.write_in(principal, namespace).await?;
        let pvc = self.ops.create::<ClaimMapper>(Some(namespace), &input).await?;
        info!(ns = %namespace, name = %pvc.meta.name, took_ms = %t0.elapsed().as_millis(), "api: create_claim ok");
        Ok(pvc)
    }

    async fn delete_claim(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<PersistentVolumeClaim> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete_claim start");
        self.write_in(principal, namespace).await?;
        let pvc = self.ops.delete::<ClaimMapper>(Some(namespace), name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete_claim ok");
        Ok(pvc)
    }

    async fn start_workload(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<Option<Service>> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: start_workload start");
        self.write_in(principal, namespace).await?;
        let service = self.ops.start_workload(namespace, name).await?;
        info!(
            ns = %namespace,
            name = %name,
            exposed = service.is_some(),
            took_ms = %t0.elapsed().as_millis(),
            "api: start_workload ok"
        );
        Ok(service)
    }

    async fn stop_workload(
        &self,
        principal: &Principal,
        namespace: &str,
        name: &str,
    ) -> BerthResult<bool> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: stop_workload start");
        self.write_in(principal, namespace).await?;
        let stopped = self.ops.stop_workload(namespace, name).await?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: stop_workload ok");
        Ok(stopped)
    }
}
