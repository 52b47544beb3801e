//! Berth core types: resource kinds, the projected domain model, and the
//! error taxonomy shared by every crate in the workspace.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;

// ---- Resource kinds ----

/// Resource kinds served by the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Namespace,
    Pod,
    Deployment,
    StatefulSet,
    Service,
    Secret,
    ConfigMap,
    PersistentVolume,
    PersistentVolumeClaim,
}

impl Kind {
    pub fn api_version(self) -> &'static str {
        match self {
            Kind::Deployment | Kind::StatefulSet => "apps/v1",
            _ => "v1",
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            Kind::Namespace => "Namespace",
            Kind::Pod => "Pod",
            Kind::Deployment => "Deployment",
            Kind::StatefulSet => "StatefulSet",
            Kind::Service => "Service",
            Kind::Secret => "Secret",
            Kind::ConfigMap => "ConfigMap",
            Kind::PersistentVolume => "PersistentVolume",
            Kind::PersistentVolumeClaim => "PersistentVolumeClaim",
        }
    }

    /// Namespaces and persistent volumes are cluster-scoped; everything else
    /// lives inside a namespace.
    pub fn namespaced(self) -> bool {
        !matches!(self, Kind::Namespace | Kind::PersistentVolume)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// The two workload flavors sharing one projected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub fn kind(self) -> Kind {
        match self {
            WorkloadKind::Deployment => Kind::Deployment,
            WorkloadKind::StatefulSet => Kind::StatefulSet,
        }
    }
}

// ---- Projected model ----

/// Identity slice common to every projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Metadata {
    pub name: String,
    pub uid: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub meta: Metadata,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub status: Option<String>,
}

/// Deployment or StatefulSet, projected into one shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub meta: Metadata,
    pub kind: WorkloadKind,
    pub replicas: u32,
    /// Governing service; stateful sets only.
    pub service_name: Option<String>,
    pub template: PodTemplate,
    /// Portable manifest with read-only fields removed.
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PodTemplate {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub resources: Option<ResourceRequirements>,
    pub ports: Option<Vec<ContainerPort>>,
    pub env: Option<Vec<EnvVar>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceRequirements {
    pub limits: Option<ResourceAmounts>,
    pub requests: Option<ResourceAmounts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceAmounts {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: Option<String>,
    pub protocol: Option<PortProtocol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
    pub value_from: Option<EnvVarSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EnvVarSource {
    pub config_map_key_ref: Option<KeyRef>,
    pub secret_key_ref: Option<KeyRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub meta: Metadata,
    /// Workload selected via the `app` label; empty when the selector is absent.
    pub dpl_name: String,
    pub service_type: ServiceType,
    pub ports: Vec<ServicePort>,
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: Option<String>,
    pub protocol: PortProtocol,
    pub port: i32,
    /// Numeric targets only; named target ports project as None.
    pub target_port: Option<i32>,
    pub node_port: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortProtocol {
    Tcp,
    Udp,
    Sctp,
}

impl PortProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            PortProtocol::Tcp => "TCP",
            PortProtocol::Udp => "UDP",
            PortProtocol::Sctp => "SCTP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TCP" => Some(PortProtocol::Tcp),
            "UDP" => Some(PortProtocol::Udp),
            "SCTP" => Some(PortProtocol::Sctp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ExternalName,
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::ExternalName => "ExternalName",
            ServiceType::ClusterIp => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ExternalName" => Some(ServiceType::ExternalName),
            "ClusterIP" => Some(ServiceType::ClusterIp),
            "NodePort" => Some(ServiceType::NodePort),
            "LoadBalancer" => Some(ServiceType::LoadBalancer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub meta: Metadata,
    /// Kubernetes secret type, e.g. `Opaque`.
    pub secret_type: String,
    /// Decoded values; base64 stays on the wire.
    pub data: Vec<MapValue>,
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub meta: Metadata,
    pub data: Vec<MapValue>,
    pub yaml: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
    ReadWriteOncePod,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
            AccessMode::ReadWriteMany => "ReadWriteMany",
            AccessMode::ReadWriteOncePod => "ReadWriteOncePod",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ReadWriteOnce" => Some(AccessMode::ReadWriteOnce),
            "ReadOnlyMany" => Some(AccessMode::ReadOnlyMany),
            "ReadWriteMany" => Some(AccessMode::ReadWriteMany),
            "ReadWriteOncePod" => Some(AccessMode::ReadWriteOncePod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    Retain,
    Delete,
}

impl ReclaimPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Delete => "Delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Retain" => Some(ReclaimPolicy::Retain),
            "Delete" => Some(ReclaimPolicy::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentVolume {
    pub meta: Metadata,
    pub capacity: String,
    pub access_modes: Vec<AccessMode>,
    pub volume_mode: String,
    /// None when the cluster reports a policy outside the projected set.
    pub reclaim_policy: Option<ReclaimPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    pub meta: Metadata,
    /// Absent until the claim binds.
    pub volume_name: Option<String>,
    pub volume_mode: String,
    pub access_modes: Vec<AccessMode>,
    pub resources: Option<ResourceRequirements>,
}

// ---- Inputs ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInput {
    pub name: String,
    pub replicas: u32,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSetInput {
    pub name: String,
    pub replicas: u32,
    pub service_name: String,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    /// Workload the selector should target. Not validated against live
    /// workloads; the label convention is the only binding.
    pub dpl_name: String,
    pub service_type: ServiceType,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInput {
    pub name: String,
    pub secret_type: String,
    /// Plain values; encoding happens at the wire boundary.
    pub data: Vec<MapValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapInput {
    pub name: String,
    pub data: Vec<MapValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInput {
    pub name: String,
    pub capacity: String,
    pub access_modes: Vec<AccessMode>,
    pub volume_mode: String,
    pub reclaim_policy: ReclaimPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimInput {
    pub name: String,
    pub access_modes: Vec<AccessMode>,
    pub volume_name: Option<String>,
    pub volume_mode: String,
    pub resources: Option<ResourceRequirements>,
}

// ---- Principals ----

/// Caller identity attached to mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// What a mutation touches; the ownership guard checks one per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Writes scoped to a tenant namespace.
    NamespaceWrite,
    /// Cluster-scoped administration: namespaces and persistent volumes.
    ClusterAdmin,
}

// ---- Status classification ----

/// Coarse classes for orchestrator status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusClass {
    Success,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Unprocessable,
    ServerError,
}

impl StatusClass {
    /// Classify a status code. Codes outside the recognized error set count
    /// as success.
    pub fn of(code: u16) -> Self {
        match code {
            400 => StatusClass::BadRequest,
            401 => StatusClass::Unauthorized,
            403 => StatusClass::Forbidden,
            404 => StatusClass::NotFound,
            409 => StatusClass::Conflict,
            422 => StatusClass::Unprocessable,
            500 => StatusClass::ServerError,
            _ => StatusClass::Success,
        }
    }

    pub fn is_error(self) -> bool {
        self != StatusClass::Success
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusClass::Success => "success",
            StatusClass::BadRequest => "bad request",
            StatusClass::Unauthorized => "unauthorized",
            StatusClass::Forbidden => "forbidden",
            StatusClass::NotFound => "not found",
            StatusClass::Conflict => "conflict",
            StatusClass::Unprocessable => "unprocessable",
            StatusClass::ServerError => "server error",
        };
        f.write_str(s)
    }
}

// ---- Errors ----

/// Failure reported by the orchestrator API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class} ({code}): {message}")]
pub struct ClusterError {
    pub class: StatusClass,
    pub code: u16,
    pub message: String,
}

impl ClusterError {
    /// Build from a status code seen on a failed request. An unlisted code
    /// still arrived on an error path, so it reports as a server error.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let mut class = StatusClass::of(code);
        if class == StatusClass::Success {
            class = StatusClass::ServerError;
        }
        Self { class, code, message: message.into() }
    }

    pub fn not_found(kind: Kind, name: &str) -> Self {
        Self {
            class: StatusClass::NotFound,
            code: 404,
            message: format!("{kind} {name} not found"),
        }
    }

    pub fn conflict(kind: Kind, name: &str) -> Self {
        Self {
            class: StatusClass::Conflict,
            code: 409,
            message: format!("{kind} {name} already exists"),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { class: StatusClass::ServerError, code: 500, message: message.into() }
    }
}

/// Facade error taxonomy carried across every crate boundary.
#[derive(Debug, thiserror::Error)]
pub enum BerthError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: Kind, name: String },
    #[error("cluster: {0}")]
    Cluster(#[from] ClusterError),
    #[error("malformed {kind}: bad or missing {field}")]
    MalformedResource { kind: Kind, field: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("scale {namespace}/{name} failed: {source}")]
    ScaleFailed {
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },
    #[error("store: {0}")]
    Store(String),
}

impl BerthError {
    pub fn malformed(kind: Kind, field: impl Into<String>) -> Self {
        BerthError::MalformedResource { kind, field: field.into() }
    }
}

pub type BerthResult<T> = Result<T, BerthError>;
