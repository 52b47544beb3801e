//! Per-kind mapping strategies.
//!
//! Reads are tolerant: optional fields project as absent and unknown fields
//! are ignored. Required fields fail as `MalformedResource`. Submissions
//! never carry an optional collection the caller left out.

use crate::{
    object_meta, opt_str, render_yaml, require_str, require_u32, InputMapper, ObjectMapper,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use berth_core::{
    AccessMode, BerthError, BerthResult, ClaimInput, ConfigMap, ConfigMapInput, Container,
    ContainerPort, DeploymentInput, EnvVar, EnvVarSource, KeyRef, Kind, MapValue, Namespace,
    PersistentVolume, PersistentVolumeClaim, Pod, PodTemplate, PortProtocol, ReclaimPolicy,
    ResourceAmounts, ResourceRequirements, Secret, SecretInput, Service, ServiceInput,
    ServicePort, ServiceType, StatefulSetInput, VolumeInput, Workload, WorkloadKind,
};
use serde_json::{json, Map, Value};

fn metadata_doc(name: &str, namespace: Option<&str>) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), json!(name));
    if let Some(ns) = namespace {
        m.insert("namespace".into(), json!(ns));
    }
    Value::Object(m)
}

// ----------------- Namespace -----------------

pub struct NamespaceMapper;

impl ObjectMapper for NamespaceMapper {
    const KIND: Kind = Kind::Namespace;
    type Domain = Namespace;

    fn to_domain(doc: &Value) -> BerthResult<Namespace> {
        Ok(Namespace { name: require_str(Self::KIND, doc, "/metadata/name")? })
    }
}

/// Minimal namespace manifest; creation ordering lives in the provisioner.
pub fn namespace_doc(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name}
    })
}

// ----------------- Pod -----------------

/// Pods are read-only through the facade.
pub struct PodMapper;

impl ObjectMapper for PodMapper {
    const KIND: Kind = Kind::Pod;
    type Domain = Pod;

    fn to_domain(doc: &Value) -> BerthResult<Pod> {
        Ok(Pod {
            meta: object_meta(doc),
            host_ip: opt_str(doc, "/status/hostIP"),
            pod_ip: opt_str(doc, "/status/podIP"),
            status: opt_str(doc, "/status/phase"),
        })
    }
}

// ----------------- Workloads -----------------

pub struct DeploymentMapper;

impl ObjectMapper for DeploymentMapper {
    const KIND: Kind = Kind::Deployment;
    type Domain = Workload;

    fn to_domain(doc: &Value) -> BerthResult<Workload> {
        workload_domain(WorkloadKind::Deployment, doc)
    }

    fn manifest_of(domain: &Workload) -> Option<&str> {
        Some(&domain.yaml)
    }
}

impl InputMapper for DeploymentMapper {
    type Input = DeploymentInput;

    fn name_of(input: &DeploymentInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &DeploymentInput) -> BerthResult<Value> {
        Ok(workload_doc(
            WorkloadKind::Deployment,
            namespace,
            &input.name,
            input.replicas,
            None,
            &input.template,
        ))
    }
}

pub struct StatefulSetMapper;

impl ObjectMapper for StatefulSetMapper {
    const KIND: Kind = Kind::StatefulSet;
    type Domain = Workload;

    fn to_domain(doc: &Value) -> BerthResult<Workload> {
        workload_domain(WorkloadKind::StatefulSet, doc)
    }

    fn manifest_of(domain: &Workload) -> Option<&str> {
        Some(&domain.yaml)
    }
}

impl InputMapper for StatefulSetMapper {
    type Input = StatefulSetInput;

    fn name_of(input: &StatefulSetInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &StatefulSetInput) -> BerthResult<Value> {
        if input.service_name.is_empty() {
            return Err(BerthError::malformed(Kind::StatefulSet, "serviceName"));
        }
        Ok(workload_doc(
            WorkloadKind::StatefulSet,
            namespace,
            &input.name,
            input.replicas,
            Some(&input.service_name),
            &input.template,
        ))
    }
}

fn workload_domain(kind: WorkloadKind, doc: &Value) -> BerthResult<Workload> {
    let k = kind.kind();
    let service_name = match kind {
        WorkloadKind::StatefulSet => Some(require_str(k, doc, "/spec/serviceName")?),
        WorkloadKind::Deployment => None,
    };
    Ok(Workload {
        meta: object_meta(doc),
        kind,
        replicas: require_u32(k, doc, "/spec/replicas")?,
        service_name,
        template: template_domain(doc),
        yaml: render_yaml(k, doc)?,
    })
}

fn template_domain(doc: &Value) -> PodTemplate {
    let containers = doc
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(container_domain).collect())
        .unwrap_or_default();
    PodTemplate { containers }
}

fn container_domain(v: &Value) -> Option<Container> {
    Some(Container {
        name: v.get("name")?.as_str()?.to_string(),
        image: v.get("image")?.as_str()?.to_string(),
        resources: v.get("resources").map(resources_domain),
        ports: v
            .get("ports")
            .and_then(Value::as_array)
            .map(|ps| ps.iter().filter_map(port_domain).collect()),
        env: v
            .get("env")
            .and_then(Value::as_array)
            .map(|es| es.iter().filter_map(env_domain).collect()),
    })
}

fn resources_domain(v: &Value) -> ResourceRequirements {
    ResourceRequirements {
        limits: v.get("limits").map(amounts_domain),
        requests: v.get("requests").map(amounts_domain),
    }
}

fn amounts_domain(v: &Value) -> ResourceAmounts {
    ResourceAmounts {
        cpu: v.get("cpu").and_then(Value::as_str).map(str::to_string),
        memory: v.get("memory").and_then(Value::as_str).map(str::to_string),
    }
}

fn port_domain(v: &Value) -> Option<ContainerPort> {
    Some(ContainerPort {
        container_port: v
            .get("containerPort")
            .and_then(Value::as_i64)
            .and_then(|p| i32::try_from(p).ok())?,
        name: v.get("name").and_then(Value::as_str).map(str::to_string),
        protocol: v
            .get("protocol")
            .and_then(Value::as_str)
            .and_then(PortProtocol::parse),
    })
}

fn env_domain(v: &Value) -> Option<EnvVar> {
    Some(EnvVar {
        name: v.get("name")?.as_str()?.to_string(),
        value: v.get("value").and_then(Value::as_str).map(str::to_string),
        value_from: v.get("valueFrom").map(|src| EnvVarSource {
            config_map_key_ref: src.get("configMapKeyRef").and_then(key_ref_domain),
            secret_key_ref: src.get("secretKeyRef").and_then(key_ref_domain),
        }),
    })
}

fn key_ref_domain(v: &Value) -> Option<KeyRef> {
    Some(KeyRef {
        name: v.get("name")?.as_str()?.to_string(),
        key: v.get("key")?.as_str()?.to_string(),
    })
}

fn workload_doc(
    kind: WorkloadKind,
    namespace: Option<&str>,
    name: &str,
    replicas: u32,
    service_name: Option<&str>,
    template: &PodTemplate,
) -> Value {
    let mut spec = Map::new();
    spec.insert("replicas".into(), json!(replicas));
    // The workload name doubles as the selector label; services targeting it
    // rely on the same convention.
    spec.insert("selector".into(), json!({"matchLabels": {"app": name}}));
    if let Some(svc) = service_name {
        spec.insert("serviceName".into(), json!(svc));
    }
    let containers: Vec<Value> = template.containers.iter().map(container_native).collect();
    spec.insert(
        "template".into(),
        json!({
            "metadata": {"labels": {"app": name}},
            "spec": {"containers": containers}
        }),
    );
    let k = kind.kind();
    json!({
        "apiVersion": k.api_version(),
        "kind": k.kind_name(),
        "metadata": metadata_doc(name, namespace),
        "spec": Value::Object(spec),
    })
}

fn container_native(c: &Container) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(c.name));
    obj.insert("image".into(), json!(c.image));
    if let Some(ports) = &c.ports {
        let ports: Vec<Value> = ports.iter().map(port_native).collect();
        obj.insert("ports".into(), Value::Array(ports));
    }
    if let Some(env) = &c.env {
        let env: Vec<Value> = env.iter().map(env_native).collect();
        obj.insert("env".into(), Value::Array(env));
    }
    if let Some(res) = &c.resources {
        let r = resources_native(res);
        if !r.is_empty() {
            obj.insert("resources".into(), Value::Object(r));
        }
    }
    Value::Object(obj)
}

fn port_native(p: &ContainerPort) -> Value {
    // Submissions carry only the port number and protocol.
    let mut obj = Map::new();
    obj.insert("containerPort".into(), json!(p.container_port));
    if let Some(proto) = p.protocol {
        obj.insert("protocol".into(), json!(proto.as_str()));
    }
    Value::Object(obj)
}

fn env_native(e: &EnvVar) -> Value {
    let mut obj = Map::new();
    obj.insert("name".into(), json!(e.name));
    if let Some(v) = &e.value {
        obj.insert("value".into(), json!(v));
    }
    if let Some(src) = &e.value_from {
        let mut s = Map::new();
        if let Some(r) = &src.config_map_key_ref {
            s.insert("configMapKeyRef".into(), json!({"name": r.name, "key": r.key}));
        }
        if let Some(r) = &src.secret_key_ref {
            s.insert("secretKeyRef".into(), json!({"name": r.name, "key": r.key}));
        }
        if !s.is_empty() {
            obj.insert("valueFrom".into(), Value::Object(s));
        }
    }
    Value::Object(obj)
}

fn resources_native(r: &ResourceRequirements) -> Map<String, Value> {
    let mut obj = Map::new();
    if let Some(l) = &r.limits {
        let a = amounts_native(l);
        if !a.is_empty() {
            obj.insert("limits".into(), Value::Object(a));
        }
    }
    if let Some(rq) = &r.requests {
        let a = amounts_native(rq);
        if !a.is_empty() {
            obj.insert("requests".into(), Value::Object(a));
        }
    }
    obj
}

fn amounts_native(a: &ResourceAmounts) -> Map<String, Value> {
    let mut obj = Map::new();
    if let Some(c) = &a.cpu {
        obj.insert("cpu".into(), json!(c));
    }
    if let Some(m) = &a.memory {
        obj.insert("memory".into(), json!(m));
    }
    obj
}

// ----------------- Service -----------------

pub struct ServiceMapper;

impl ObjectMapper for ServiceMapper {
    const KIND: Kind = Kind::Service;
    type Domain = Service;

    fn to_domain(doc: &Value) -> BerthResult<Service> {
        let type_str = require_str(Self::KIND, doc, "/spec/type")?;
        let service_type = ServiceType::parse(&type_str)
            .ok_or_else(|| BerthError::malformed(Self::KIND, "spec.type"))?;
        let ports = match doc.pointer("/spec/ports").and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .map(service_port_domain)
                .collect::<BerthResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Service {
            meta: object_meta(doc),
            dpl_name: opt_str(doc, "/spec/selector/app").unwrap_or_default(),
            service_type,
            ports,
            yaml: render_yaml(Self::KIND, doc)?,
        })
    }

    fn manifest_of(domain: &Service) -> Option<&str> {
        Some(&domain.yaml)
    }
}

impl InputMapper for ServiceMapper {
    type Input = ServiceInput;

    fn name_of(input: &ServiceInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &ServiceInput) -> BerthResult<Value> {
        let ports: Vec<Value> = input.ports.iter().map(service_port_native).collect();
        Ok(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": metadata_doc(&input.name, namespace),
            "spec": {
                "selector": {"app": input.dpl_name},
                "ports": ports,
                "type": input.service_type.as_str(),
            }
        }))
    }
}

fn service_port_domain(v: &Value) -> BerthResult<ServicePort> {
    let protocol = v
        .get("protocol")
        .and_then(Value::as_str)
        .and_then(PortProtocol::parse)
        .ok_or_else(|| BerthError::malformed(Kind::Service, "spec.ports.protocol"))?;
    let port = v
        .get("port")
        .and_then(Value::as_i64)
        .and_then(|p| i32::try_from(p).ok())
        .ok_or_else(|| BerthError::malformed(Kind::Service, "spec.ports.port"))?;
    Ok(ServicePort {
        name: v.get("name").and_then(Value::as_str).map(str::to_string),
        protocol,
        port,
        target_port: target_port_domain(v.get("targetPort")),
        node_port: v
            .get("nodePort")
            .and_then(Value::as_i64)
            .and_then(|p| i32::try_from(p).ok()),
    })
}

/// Numeric targets survive the projection; named ports do not.
fn target_port_domain(v: Option<&Value>) -> Option<i32> {
    match v {
        Some(Value::Number(n)) => n.as_i64().and_then(|p| i32::try_from(p).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn service_port_native(p: &ServicePort) -> Value {
    let mut obj = Map::new();
    if let Some(name) = &p.name {
        obj.insert("name".into(), json!(name));
    }
    obj.insert("protocol".into(), json!(p.protocol.as_str()));
    obj.insert("port".into(), json!(p.port));
    if let Some(tp) = p.target_port {
        obj.insert("targetPort".into(), json!(tp));
    }
    if let Some(np) = p.node_port {
        obj.insert("nodePort".into(), json!(np));
    }
    Value::Object(obj)
}

// ----------------- Secret -----------------

pub struct SecretMapper;

impl ObjectMapper for SecretMapper {
    const KIND: Kind = Kind::Secret;
    type Domain = Secret;

    fn to_domain(doc: &Value) -> BerthResult<Secret> {
        let mut data = Vec::new();
        if let Some(entries) = doc.get("data").and_then(Value::as_object) {
            for (key, value) in entries {
                let encoded = value
                    .as_str()
                    .ok_or_else(|| BerthError::malformed(Self::KIND, format!("data.{key}")))?;
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|_| BerthError::malformed(Self::KIND, format!("data.{key}")))?;
                data.push(MapValue {
                    key: key.clone(),
                    value: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
        }
        Ok(Secret {
            meta: object_meta(doc),
            secret_type: require_str(Self::KIND, doc, "/type")?,
            data,
            yaml: render_yaml(Self::KIND, doc)?,
        })
    }

    fn manifest_of(domain: &Secret) -> Option<&str> {
        Some(&domain.yaml)
    }
}

impl InputMapper for SecretMapper {
    type Input = SecretInput;

    fn name_of(input: &SecretInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &SecretInput) -> BerthResult<Value> {
        let mut data = Map::new();
        for mv in &input.data {
            data.insert(mv.key.clone(), json!(BASE64.encode(mv.value.as_bytes())));
        }
        Ok(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": metadata_doc(&input.name, namespace),
            "type": input.secret_type,
            "data": Value::Object(data),
        }))
    }
}

// ----------------- ConfigMap -----------------

pub struct ConfigMapMapper;

impl ObjectMapper for ConfigMapMapper {
    const KIND: Kind = Kind::ConfigMap;
    type Domain = ConfigMap;

    fn to_domain(doc: &Value) -> BerthResult<ConfigMap> {
        let mut data = Vec::new();
        if let Some(entries) = doc.get("data").and_then(Value::as_object) {
            for (key, value) in entries {
                let value = value
                    .as_str()
                    .ok_or_else(|| BerthError::malformed(Self::KIND, format!("data.{key}")))?;
                data.push(MapValue { key: key.clone(), value: value.to_string() });
            }
        }
        Ok(ConfigMap {
            meta: object_meta(doc),
            data,
            yaml: render_yaml(Self::KIND, doc)?,
        })
    }

    fn manifest_of(domain: &ConfigMap) -> Option<&str> {
        Some(&domain.yaml)
    }
}

impl InputMapper for ConfigMapMapper {
    type Input = ConfigMapInput;

    fn name_of(input: &ConfigMapInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &ConfigMapInput) -> BerthResult<Value> {
        let mut data = Map::new();
        for mv in &input.data {
            data.insert(mv.key.clone(), json!(mv.value));
        }
        Ok(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": metadata_doc(&input.name, namespace),
            "data": Value::Object(data),
        }))
    }
}

// ----------------- Volumes -----------------

/// Host path root for provisioned volumes.
fn pv_local_root() -> String {
    std::env::var("BERTH_PV_ROOT").unwrap_or_else(|_| "/mnt/data/k8s-volumes".to_string())
}

pub struct VolumeMapper;

impl ObjectMapper for VolumeMapper {
    const KIND: Kind = Kind::PersistentVolume;
    type Domain = PersistentVolume;

    fn to_domain(doc: &Value) -> BerthResult<PersistentVolume> {
        Ok(PersistentVolume {
            meta: object_meta(doc),
            capacity: require_str(Self::KIND, doc, "/spec/capacity/storage")?,
            access_modes: access_modes_domain(doc),
            volume_mode: require_str(Self::KIND, doc, "/spec/volumeMode")?,
            reclaim_policy: opt_str(doc, "/spec/persistentVolumeReclaimPolicy")
                .as_deref()
                .and_then(ReclaimPolicy::parse),
        })
    }
}

impl InputMapper for VolumeMapper {
    type Input = VolumeInput;

    fn name_of(input: &VolumeInput) -> &str {
        &input.name
    }

    fn to_native(_namespace: Option<&str>, input: &VolumeInput) -> BerthResult<Value> {
        let modes: Vec<&str> = input.access_modes.iter().map(|m| m.as_str()).collect();
        Ok(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {"name": input.name},
            "spec": {
                "capacity": {"storage": input.capacity},
                "accessModes": modes,
                "volumeMode": input.volume_mode,
                "persistentVolumeReclaimPolicy": input.reclaim_policy.as_str(),
                "local": {"path": format!("{}/{}", pv_local_root(), input.name)},
            }
        }))
    }
}

pub struct ClaimMapper;

impl ObjectMapper for ClaimMapper {
    const KIND: Kind = Kind::PersistentVolumeClaim;
    type Domain = PersistentVolumeClaim;

    fn to_domain(doc: &Value) -> BerthResult<PersistentVolumeClaim> {
        Ok(PersistentVolumeClaim {
            meta: object_meta(doc),
            volume_name: opt_str(doc, "/spec/volumeName"),
            volume_mode: require_str(Self::KIND, doc, "/spec/volumeMode")?,
            access_modes: access_modes_domain(doc),
            resources: doc.pointer("/spec/resources").map(resources_domain),
        })
    }
}

impl InputMapper for ClaimMapper {
    type Input = ClaimInput;

    fn name_of(input: &ClaimInput) -> &str {
        &input.name
    }

    fn to_native(namespace: Option<&str>, input: &ClaimInput) -> BerthResult<Value> {
        let mut spec = Map::new();
        let modes: Vec<&str> = input.access_modes.iter().map(|m| m.as_str()).collect();
        spec.insert("accessModes".into(), json!(modes));
        if let Some(volume) = &input.volume_name {
            spec.insert("volumeName".into(), json!(volume));
        }
        spec.insert("volumeMode".into(), json!(input.volume_mode));
        if let Some(res) = &input.resources {
            let r = resources_native(res);
            if !r.is_empty() {
                spec.insert("resources".into(), Value::Object(r));
            }
        }
        Ok(json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": metadata_doc(&input.name, namespace),
            "spec": Value::Object(spec),
        }))
    }
}

fn access_modes_domain(doc: &Value) -> Vec<AccessMode> {
    doc.pointer("/spec/accessModes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().and_then(AccessMode::parse))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx_template() -> PodTemplate {
        PodTemplate {
            containers: vec![Container {
                name: "nginx".into(),
                image: "nginx:1.25".into(),
                resources: Some(ResourceRequirements {
                    limits: Some(ResourceAmounts {
                        cpu: Some("500m".into()),
                        memory: Some("128Mi".into()),
                    }),
                    requests: None,
                }),
                ports: Some(vec![ContainerPort {
                    container_port: 80,
                    name: Some("http".into()),
                    protocol: Some(PortProtocol::Tcp),
                }]),
                env: Some(vec![EnvVar {
                    name: "MODE".into(),
                    value: Some("demo".into()),
                    value_from: None,
                }]),
            }],
        }
    }

    #[test]
    fn deployment_doc_uses_the_name_as_selector_label() {
        let input = DeploymentInput { name: "web".into(), replicas: 0, template: nginx_template() };
        let doc = DeploymentMapper::to_native(Some("demo"), &input).unwrap();
        assert_eq!(doc["apiVersion"], "apps/v1");
        assert_eq!(doc["kind"], "Deployment");
        assert_eq!(doc["metadata"]["namespace"], "demo");
        assert_eq!(doc["spec"]["replicas"], 0);
        assert_eq!(doc["spec"]["selector"]["matchLabels"]["app"], "web");
        assert_eq!(doc["spec"]["template"]["metadata"]["labels"]["app"], "web");
        assert!(doc["spec"].get("serviceName").is_none());
        let container = &doc["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["ports"][0]["containerPort"], 80);
        // Port names are not part of the submission shape.
        assert!(container["ports"][0].get("name").is_none());
        assert_eq!(container["env"][0]["value"], "demo");
        assert!(container["resources"].get("requests").is_none());
    }

    #[test]
    fn bare_container_omits_optional_collections() {
        let input = DeploymentInput {
            name: "web".into(),
            replicas: 1,
            template: PodTemplate {
                containers: vec![Container {
                    name: "app".into(),
                    image: "app:1".into(),
                    resources: None,
                    ports: None,
                    env: None,
                }],
            },
        };
        let doc = DeploymentMapper::to_native(None, &input).unwrap();
        let container = &doc["spec"]["template"]["spec"]["containers"][0];
        assert!(container.get("ports").is_none());
        assert!(container.get("env").is_none());
        assert!(container.get("resources").is_none());
    }

    #[test]
    fn workload_read_back_recovers_declared_fields() {
        let input = DeploymentInput { name: "web".into(), replicas: 2, template: nginx_template() };
        let mut doc = DeploymentMapper::to_native(Some("demo"), &input).unwrap();
        doc["metadata"]["uid"] = serde_json::json!("abc-123");
        doc["metadata"]["resourceVersion"] = serde_json::json!("7");
        doc["status"] = serde_json::json!({"readyReplicas": 2});
        let w = DeploymentMapper::to_domain(&doc).unwrap();
        assert_eq!(w.kind, WorkloadKind::Deployment);
        assert_eq!(w.replicas, 2);
        assert_eq!(w.meta.uid.as_deref(), Some("abc-123"));
        assert_eq!(w.service_name, None);
        assert_eq!(w.template.containers[0].image, "nginx:1.25");
        assert_eq!(
            w.template.containers[0].ports.as_ref().unwrap()[0].protocol,
            Some(PortProtocol::Tcp)
        );
        assert!(!w.yaml.contains("resourceVersion"));
        assert!(!w.yaml.contains("status"));
    }

    #[test]
    fn workload_without_replicas_is_malformed() {
        let doc = serde_json::json!({
            "metadata": {"name": "web", "namespace": "demo"},
            "spec": {"selector": {"matchLabels": {"app": "web"}}}
        });
        let err = DeploymentMapper::to_domain(&doc).unwrap_err();
        match err {
            BerthError::MalformedResource { kind, field } => {
                assert_eq!(kind, Kind::Deployment);
                assert_eq!(field, "spec.replicas");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn statefulset_requires_a_service_name_both_ways() {
        let input = StatefulSetInput {
            name: "db".into(),
            replicas: 1,
            service_name: String::new(),
            template: nginx_template(),
        };
        assert!(StatefulSetMapper::to_native(Some("demo"), &input).is_err());

        let input = StatefulSetInput { service_name: "db-headless".into(), ..input };
        let doc = StatefulSetMapper::to_native(Some("demo"), &input).unwrap();
        assert_eq!(doc["spec"]["serviceName"], "db-headless");
        let w = StatefulSetMapper::to_domain(&doc).unwrap();
        assert_eq!(w.service_name.as_deref(), Some("db-headless"));
        assert_eq!(w.kind, WorkloadKind::StatefulSet);
    }

    #[test]
    fn service_round_trip_and_selector_fallback() {
        let input = ServiceInput {
            name: "web-svc".into(),
            dpl_name: "web".into(),
            service_type: ServiceType::NodePort,
            ports: vec![ServicePort {
                name: Some("http".into()),
                protocol: PortProtocol::Tcp,
                port: 80,
                target_port: Some(8080),
                node_port: Some(30080),
            }],
        };
        let doc = ServiceMapper::to_native(Some("demo"), &input).unwrap();
        assert_eq!(doc["spec"]["selector"]["app"], "web");
        assert_eq!(doc["spec"]["type"], "NodePort");
        let svc = ServiceMapper::to_domain(&doc).unwrap();
        assert_eq!(svc.dpl_name, "web");
        assert_eq!(svc.service_type, ServiceType::NodePort);
        assert_eq!(svc.ports[0].target_port, Some(8080));

        // No selector on the wire projects as an empty dplName.
        let doc = serde_json::json!({
            "metadata": {"name": "lonely"},
            "spec": {"type": "ClusterIP", "ports": []}
        });
        let svc = ServiceMapper::to_domain(&doc).unwrap();
        assert_eq!(svc.dpl_name, "");
        assert!(svc.ports.is_empty());
    }

    #[test]
    fn named_target_ports_project_as_absent() {
        let doc = serde_json::json!({
            "metadata": {"name": "svc"},
            "spec": {
                "type": "ClusterIP",
                "ports": [
                    {"protocol": "TCP", "port": 80, "targetPort": "http"},
                    {"protocol": "TCP", "port": 81, "targetPort": "8081"},
                    {"protocol": "TCP", "port": 82, "targetPort": 8082}
                ]
            }
        });
        let svc = ServiceMapper::to_domain(&doc).unwrap();
        assert_eq!(svc.ports[0].target_port, None);
        assert_eq!(svc.ports[1].target_port, Some(8081));
        assert_eq!(svc.ports[2].target_port, Some(8082));
    }

    #[test]
    fn unknown_service_type_is_malformed() {
        let doc = serde_json::json!({
            "metadata": {"name": "svc"},
            "spec": {"type": "Headless", "ports": []}
        });
        assert!(ServiceMapper::to_domain(&doc).is_err());
    }

    #[test]
    fn secret_values_are_encoded_on_the_wire_and_plain_in_the_model() {
        let input = SecretInput {
            name: "creds".into(),
            secret_type: "Opaque".into(),
            data: vec![MapValue { key: "password".into(), value: "hunter2".into() }],
        };
        let doc = SecretMapper::to_native(Some("demo"), &input).unwrap();
        assert_eq!(doc["data"]["password"], "aHVudGVyMg==");
        let secret = SecretMapper::to_domain(&doc).unwrap();
        assert_eq!(secret.secret_type, "Opaque");
        assert_eq!(secret.data[0].value, "hunter2");
    }

    #[test]
    fn secret_with_broken_encoding_is_malformed() {
        let doc = serde_json::json!({
            "metadata": {"name": "creds"},
            "type": "Opaque",
            "data": {"password": "%%% not base64 %%%"}
        });
        let err = SecretMapper::to_domain(&doc).unwrap_err();
        assert!(err.to_string().contains("data.password"), "err={err}");
    }

    #[test]
    fn config_map_data_round_trips_untouched() {
        let input = ConfigMapInput {
            name: "settings".into(),
            data: vec![MapValue { key: "mode".into(), value: "fast".into() }],
        };
        let doc = ConfigMapMapper::to_native(Some("demo"), &input).unwrap();
        assert_eq!(doc["data"]["mode"], "fast");
        let cm = ConfigMapMapper::to_domain(&doc).unwrap();
        assert_eq!(cm.data[0].key, "mode");
        assert_eq!(cm.data[0].value, "fast");
    }

    #[test]
    fn volume_doc_pins_a_local_path_under_the_root() {
        let input = VolumeInput {
            name: "pv0".into(),
            capacity: "5Gi".into(),
            access_modes: vec![AccessMode::ReadWriteOnce],
            volume_mode: "Filesystem".into(),
            reclaim_policy: ReclaimPolicy::Retain,
        };
        let doc = VolumeMapper::to_native(None, &input).unwrap();
        let path = doc["spec"]["local"]["path"].as_str().unwrap();
        assert!(path.ends_with("/pv0"), "path={path}");
        assert_eq!(doc["spec"]["capacity"]["storage"], "5Gi");
        let pv = VolumeMapper::to_domain(&doc).unwrap();
        assert_eq!(pv.capacity, "5Gi");
        assert_eq!(pv.reclaim_policy, Some(ReclaimPolicy::Retain));
    }

    #[test]
    fn volume_with_foreign_reclaim_policy_projects_none() {
        let doc = serde_json::json!({
            "metadata": {"name": "pv1"},
            "spec": {
                "capacity": {"storage": "1Gi"},
                "accessModes": ["ReadWriteOnce", "SomethingNew"],
                "volumeMode": "Filesystem",
                "persistentVolumeReclaimPolicy": "Recycle"
            }
        });
        let pv = VolumeMapper::to_domain(&doc).unwrap();
        assert_eq!(pv.reclaim_policy, None);
        assert_eq!(pv.access_modes, vec![AccessMode::ReadWriteOnce]);
    }

    #[test]
    fn claim_doc_omits_the_binding_hint_when_absent() {
        let input = ClaimInput {
            name: "data".into(),
            access_modes: vec![AccessMode::ReadWriteOnce],
            volume_name: None,
            volume_mode: "Filesystem".into(),
            resources: Some(ResourceRequirements { limits: None, requests: None }),
        };
        let doc = ClaimMapper::to_native(Some("demo"), &input).unwrap();
        assert!(doc["spec"].get("volumeName").is_none());
        // Requirements with nothing in them stay off the wire.
        assert!(doc["spec"].get("resources").is_none());

        let bound = ClaimInput { volume_name: Some("pv0".into()), ..input };
        let doc = ClaimMapper::to_native(Some("demo"), &bound).unwrap();
        assert_eq!(doc["spec"]["volumeName"], "pv0");
    }

    #[test]
    fn unbound_claim_reads_without_a_volume_name() {
        let doc = serde_json::json!({
            "metadata": {"name": "data", "namespace": "demo"},
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "volumeMode": "Filesystem",
                "resources": {"requests": {"storage": "1Gi"}}
            }
        });
        let pvc = ClaimMapper::to_domain(&doc).unwrap();
        assert_eq!(pvc.volume_name, None);
        assert_eq!(pvc.volume_mode, "Filesystem");
    }

    #[test]
    fn pod_projection_tolerates_missing_status() {
        let doc = serde_json::json!({"metadata": {"name": "web-0", "namespace": "demo"}});
        let pod = PodMapper::to_domain(&doc).unwrap();
        assert_eq!(pod.meta.name, "web-0");
        assert_eq!(pod.status, None);

        let doc = serde_json::json!({
            "metadata": {"name": "web-0", "namespace": "demo"},
            "status": {"hostIP": "10.0.0.5", "podIP": "172.16.0.9", "phase": "Running"}
        });
        let pod = PodMapper::to_domain(&doc).unwrap();
        assert_eq!(pod.host_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(pod.status.as_deref(), Some("Running"));
    }

    #[test]
    fn namespace_doc_is_minimal() {
        let doc = namespace_doc("demo");
        assert_eq!(doc["kind"], "Namespace");
        assert_eq!(doc["metadata"]["name"], "demo");
        assert!(doc["metadata"].get("namespace").is_none());
        let ns = NamespaceMapper::to_domain(&doc).unwrap();
        assert_eq!(ns.name, "demo");
    }
}
