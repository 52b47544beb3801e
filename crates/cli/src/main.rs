use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use berth_api::{BerthApi, InProcApi};
use berth_cluster::KubeCluster;
use berth_core::{
    BerthError, ClaimInput, ConfigMapInput, DeploymentInput, Metadata, Principal, Role,
    SecretInput, ServiceInput, StatefulSetInput, VolumeInput,
};
use berth_persist::{Directory, SqliteDirectory};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "berthctl", version, about = "Berth CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Acting principal id (required for mutations)
    #[arg(long = "principal", global = true)]
    principal: Option<i64>,

    /// Namespace for namespace-scoped commands
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Namespaces
    #[command(subcommand)]
    Ns(NsCmd),
    /// Pods (read-only)
    #[command(subcommand)]
    Pod(PodCmd),
    /// Deployments
    #[command(subcommand)]
    Deploy(WorkloadCmd),
    /// Stateful sets
    #[command(subcommand)]
    Sts(WorkloadCmd),
    /// Services
    #[command(subcommand)]
    Svc(ResourceCmd),
    /// Secrets
    #[command(subcommand)]
    Secret(ResourceCmd),
    /// Config maps
    #[command(subcommand)]
    Cm(ResourceCmd),
    /// Persistent volumes
    #[command(subcommand)]
    Pv(ResourceCmd),
    /// Persistent volume claims
    #[command(subcommand)]
    Pvc(ResourceCmd),
    /// Temporary exposure of a workload
    #[command(subcommand)]
    Workload(ExposeCmd),
    /// Directory maintenance (principals, ownership)
    #[command(subcommand)]
    Grant(GrantCmd),
}

#[derive(Subcommand, Debug)]
enum NsCmd {
    /// List namespaces
    List,
    /// Create a namespace registered to the acting principal
    Create {
        name: String,
        /// Project label for the registry row
        #[arg(long = "project")]
        project: Option<String>,
    },
    /// Delete a namespace and its registry row
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum PodCmd {
    /// List pod names in the namespace
    List,
    /// Show one pod
    Get { name: String },
}

#[derive(Subcommand, Debug)]
enum WorkloadCmd {
    /// List names in the namespace
    List,
    /// Print the portable manifest of one object
    Get { name: String },
    /// Create from a JSON input file
    Create { file: PathBuf },
    /// Delete and report the last snapshot
    Delete { name: String },
    /// Set the replica count
    Scale { name: String, replicas: u32 },
}

#[derive(Subcommand, Debug)]
enum ResourceCmd {
    /// List names
    List,
    /// Show one object
    Get { name: String },
    /// Create from a JSON input file
    Create { file: PathBuf },
    /// Delete and report the last snapshot
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum ExposeCmd {
    /// Scale a workload up for the exposure window
    Start { name: String },
    /// Scale a workload down now and cancel the pending revert
    Stop { name: String },
}

#[derive(Subcommand, Debug)]
enum GrantCmd {
    /// Create or update a principal
    Principal {
        name: String,
        /// admin or member
        #[arg(long = "role", default_value = "member")]
        role: String,
    },
    /// Move ownership of a registered namespace
    Assign {
        #[arg(value_name = "NAMESPACE")]
        ns_name: String,
        #[arg(value_name = "PRINCIPAL")]
        principal_id: i64,
    },
}

fn init_tracing() {
    let env = std::env::var("BERTH_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("BERTH_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid BERTH_METRICS_ADDR; expected host:port");
        }
    }
}

struct Ctx<'a> {
    api: &'a dyn BerthApi,
    directory: &'a dyn Directory,
    output: Output,
    principal: Option<i64>,
    namespace: Option<String>,
}

impl Ctx<'_> {
    fn ns(&self) -> Result<&str> {
        self.namespace.as_deref().context("--ns <namespace> is required for this command")
    }

    async fn acting_principal(&self) -> Result<Principal> {
        let id = self.principal.context("--principal <id> is required for this command")?;
        let principal = self
            .directory
            .principal(id)
            .await?
            .ok_or_else(|| BerthError::NotFound(format!("principal {id}")))?;
        Ok(principal)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let Cli { output, principal, namespace, command } = Cli::parse();

    let directory = Arc::new(SqliteDirectory::open_default()?);

    // Directory maintenance needs no cluster connection; it is also the
    // bootstrap path for the very first principal.
    let command = match command {
        Commands::Grant(cmd) => return run_grant(cmd, directory.as_ref(), output).await,
        other => other,
    };

    let cluster = Arc::new(
        KubeCluster::connect().await.context("connecting to the orchestrator")?,
    );
    let api = InProcApi::from_env(cluster, directory.clone());
    let ctx = Ctx { api: &api, directory: directory.as_ref(), output, principal, namespace };

    match command {
        Commands::Ns(cmd) => run_ns(&ctx, cmd).await,
        Commands::Pod(cmd) => run_pod(&ctx, cmd).await,
        Commands::Deploy(cmd) => run_deploy(&ctx, cmd).await,
        Commands::Sts(cmd) => run_sts(&ctx, cmd).await,
        Commands::Svc(cmd) => run_svc(&ctx, cmd).await,
        Commands::Secret(cmd) => run_secret(&ctx, cmd).await,
        Commands::Cm(cmd) => run_cm(&ctx, cmd).await,
        Commands::Pv(cmd) => run_pv(&ctx, cmd).await,
        Commands::Pvc(cmd) => run_pvc(&ctx, cmd).await,
        Commands::Workload(cmd) => run_workload(&ctx, cmd).await,
        Commands::Grant(_) => unreachable!("handled before connecting"),
    }
}

async fn run_ns(ctx: &Ctx<'_>, cmd: NsCmd) -> Result<()> {
    match cmd {
        NsCmd::List => {
            let namespaces = ctx.api.namespaces().await?;
            match ctx.output {
                Output::Human => {
                    for ns in &namespaces {
                        println!("{}", ns.name);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&namespaces)?),
            }
            Ok(())
        }
        NsCmd::Create { name, project } => {
            let principal = ctx.acting_principal().await?;
            let ns = ctx.api.create_namespace(&principal, &name, project.as_deref()).await?;
            print_outcome(ctx.output, "created", "namespace", &ns.name, &ns)
        }
        NsCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let ns = ctx.api.delete_namespace(&principal, &name).await?;
            print_outcome(ctx.output, "deleted", "namespace", &ns.name, &ns)
        }
    }
}

async fn run_pod(ctx: &Ctx<'_>, cmd: PodCmd) -> Result<()> {
    match cmd {
        PodCmd::List => print_metas(ctx.output, &ctx.api.pods(ctx.ns()?).await?),
        PodCmd::Get { name } => {
            let pod = ctx.api.pod(ctx.ns()?, &name).await?;
            match ctx.output {
                Output::Human => {
                    println!("name:    {}", pod.meta.name);
                    println!("status:  {}", pod.status.as_deref().unwrap_or("-"));
                    println!("host ip: {}", pod.host_ip.as_deref().unwrap_or("-"));
                    println!("pod ip:  {}", pod.pod_ip.as_deref().unwrap_or("-"));
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&pod)?),
            }
            Ok(())
        }
    }
}

async fn run_deploy(ctx: &Ctx<'_>, cmd: WorkloadCmd) -> Result<()> {
    match cmd {
        WorkloadCmd::List => print_metas(ctx.output, &ctx.api.deployments(ctx.ns()?).await?),
        WorkloadCmd::Get { name } => {
            let dpl = ctx.api.deployment(ctx.ns()?, &name).await?;
            print_manifest(ctx.output, &dpl, &dpl.yaml)
        }
        WorkloadCmd::Create { file } => {
            let input: DeploymentInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let dpl = ctx.api.create_deployment(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "deployment", &dpl.meta.name, &dpl)
        }
        WorkloadCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let dpl = ctx.api.delete_deployment(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "deployment", &name, &dpl)
        }
        WorkloadCmd::Scale { name, replicas } => {
            let principal = ctx.acting_principal().await?;
            let scaled = ctx.api.scale_deployment(&principal, ctx.ns()?, &name, replicas).await?;
            print_scaled(ctx.output, &name, replicas, scaled)
        }
    }
}

async fn run_sts(ctx: &Ctx<'_>, cmd: WorkloadCmd) -> Result<()> {
    match cmd {
        WorkloadCmd::List => print_metas(ctx.output, &ctx.api.stateful_sets(ctx.ns()?).await?),
        WorkloadCmd::Get { name } => {
            let sts = ctx.api.stateful_set(ctx.ns()?, &name).await?;
            print_manifest(ctx.output, &sts, &sts.yaml)
        }
        WorkloadCmd::Create { file } => {
            let input: StatefulSetInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let sts = ctx.api.create_stateful_set(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "stateful set", &sts.meta.name, &sts)
        }
        WorkloadCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let sts = ctx.api.delete_stateful_set(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "stateful set", &name, &sts)
        }
        WorkloadCmd::Scale { name, replicas } => {
            let principal = ctx.acting_principal().await?;
            let scaled = ctx.api.scale_stateful_set(&principal, ctx.ns()?, &name, replicas).await?;
            print_scaled(ctx.output, &name, replicas, scaled)
        }
    }
}

async fn run_svc(ctx: &Ctx<'_>, cmd: ResourceCmd) -> Result<()> {
    match cmd {
        ResourceCmd::List => print_metas(ctx.output, &ctx.api.services(ctx.ns()?).await?),
        ResourceCmd::Get { name } => {
            let svc = ctx.api.service(ctx.ns()?, &name).await?;
            print_manifest(ctx.output, &svc, &svc.yaml)
        }
        ResourceCmd::Create { file } => {
            let input: ServiceInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let svc = ctx.api.create_service(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "service", &svc.meta.name, &svc)
        }
        ResourceCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let svc = ctx.api.delete_service(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "service", &name, &svc)
        }
    }
}

async fn run_secret(ctx: &Ctx<'_>, cmd: ResourceCmd) -> Result<()> {
    match cmd {
        ResourceCmd::List => print_metas(ctx.output, &ctx.api.secrets(ctx.ns()?).await?),
        ResourceCmd::Get { name } => {
            let secret = ctx.api.secret(ctx.ns()?, &name).await?;
            print_manifest(ctx.output, &secret, &secret.yaml)
        }
        ResourceCmd::Create { file } => {
            let input: SecretInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let secret = ctx.api.create_secret(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "secret", &secret.meta.name, &secret)
        }
        ResourceCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let secret = ctx.api.delete_secret(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "secret", &name, &secret)
        }
    }
}

async fn run_cm(ctx: &Ctx<'_>, cmd: ResourceCmd) -> Result<()> {
    match cmd {
        ResourceCmd::List => print_metas(ctx.output, &ctx.api.config_maps(ctx.ns()?).await?),
        ResourceCmd::Get { name } => {
            let cm = ctx.api.config_map(ctx.ns()?, &name).await?;
            print_manifest(ctx.output, &cm, &cm.yaml)
        }
        ResourceCmd::Create { file } => {
            let input: ConfigMapInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let cm = ctx.api.create_config_map(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "config map", &cm.meta.name, &cm)
        }
        ResourceCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let cm = ctx.api.delete_config_map(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "config map", &name, &cm)
        }
    }
}

async fn run_pv(ctx: &Ctx<'_>, cmd: ResourceCmd) -> Result<()> {
    match cmd {
        ResourceCmd::List => print_metas(ctx.output, &ctx.api.volumes().await?),
        ResourceCmd::Get { name } => {
            let pv = ctx.api.volume(&name).await?;
            match ctx.output {
                Output::Human => {
                    println!("name:     {}", pv.meta.name);
                    println!("capacity: {}", pv.capacity);
                    let modes: Vec<&str> = pv.access_modes.iter().map(|m| m.as_str()).collect();
                    println!("modes:    {}", modes.join(", "));
                    println!("reclaim:  {}", pv.reclaim_policy.map(|p| p.as_str()).unwrap_or("-"));
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&pv)?),
            }
            Ok(())
        }
        ResourceCmd::Create { file } => {
            let input: VolumeInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let pv = ctx.api.create_volume(&principal, input).await?;
            print_outcome(ctx.output, "created", "volume", &pv.meta.name, &pv)
        }
        ResourceCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let pv = ctx.api.delete_volume(&principal, &name).await?;
            print_outcome(ctx.output, "deleted", "volume", &name, &pv)
        }
    }
}

async fn run_pvc(ctx: &Ctx<'_>, cmd: ResourceCmd) -> Result<()> {
    match cmd {
        ResourceCmd::List => print_metas(ctx.output, &ctx.api.claims(ctx.ns()?).await?),
        ResourceCmd::Get { name } => {
            let pvc = ctx.api.claim(ctx.ns()?, &name).await?;
            match ctx.output {
                Output::Human => {
                    println!("name:   {}", pvc.meta.name);
                    println!("volume: {}", pvc.volume_name.as_deref().unwrap_or("-"));
                    let modes: Vec<&str> = pvc.access_modes.iter().map(|m| m.as_str()).collect();
                    println!("modes:  {}", modes.join(", "));
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&pvc)?),
            }
            Ok(())
        }
        ResourceCmd::Create { file } => {
            let input: ClaimInput = read_input(&file)?;
            let principal = ctx.acting_principal().await?;
            let pvc = ctx.api.create_claim(&principal, ctx.ns()?, input).await?;
            print_outcome(ctx.output, "created", "claim", &pvc.meta.name, &pvc)
        }
        ResourceCmd::Delete { name } => {
            let principal = ctx.acting_principal().await?;
            let pvc = ctx.api.delete_claim(&principal, ctx.ns()?, &name).await?;
            print_outcome(ctx.output, "deleted", "claim", &name, &pvc)
        }
    }
}

async fn run_workload(ctx: &Ctx<'_>, cmd: ExposeCmd) -> Result<()> {
    match cmd {
        ExposeCmd::Start { name } => {
            let principal = ctx.acting_principal().await?;
            let service = ctx.api.start_workload(&principal, ctx.ns()?, &name).await?;
            match ctx.output {
                Output::Human => match &service {
                    Some(svc) => {
                        let ports: Vec<String> = svc
                            .ports
                            .iter()
                            .map(|p| match p.node_port {
                                Some(node) => format!("{}:{}/{}", p.port, node, p.protocol.as_str()),
                                None => format!("{}/{}", p.port, p.protocol.as_str()),
                            })
                            .collect();
                        println!(
                            "started {name}; reachable via {} ({})",
                            svc.meta.name,
                            ports.join(", ")
                        );
                    }
                    None => println!("started {name}; no NodePort service in the namespace"),
                },
                Output::Json => println!("{}", serde_json::to_string_pretty(&service)?),
            }
            Ok(())
        }
        ExposeCmd::Stop { name } => {
            let principal = ctx.acting_principal().await?;
            let stopped = ctx.api.stop_workload(&principal, ctx.ns()?, &name).await?;
            match ctx.output {
                Output::Human => println!("stopped {name}"),
                Output::Json => println!("{}", serde_json::to_string_pretty(&stopped)?),
            }
            Ok(())
        }
    }
}

async fn run_grant(cmd: GrantCmd, directory: &dyn Directory, output: Output) -> Result<()> {
    match cmd {
        GrantCmd::Principal { name, role } => {
            let role = Role::parse(&role)
                .with_context(|| format!("unknown role {role}; expected admin or member"))?;
            let principal = directory.upsert_principal(&name, role).await?;
            match output {
                Output::Human => println!(
                    "principal {} ({}, {})",
                    principal.id,
                    principal.name,
                    principal.role.as_str()
                ),
                Output::Json => println!("{}", serde_json::to_string_pretty(&principal)?),
            }
        }
        GrantCmd::Assign { ns_name, principal_id } => {
            directory.assign_namespace(&ns_name, principal_id).await?;
            match output {
                Output::Human => {
                    println!("namespace {ns_name} assigned to principal {principal_id}")
                }
                Output::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(
                        &serde_json::json!({"namespace": ns_name, "principal": principal_id})
                    )?
                ),
            }
        }
    }
    Ok(())
}

fn read_input<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_metas(output: Output, metas: &[Metadata]) -> Result<()> {
    match output {
        Output::Human => {
            println!("{:<15} {:<30}", "NAMESPACE", "NAME");
            for m in metas {
                let ns = m.namespace.as_deref().unwrap_or("-");
                println!("{:<15} {:<30}", ns, m.name);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(metas)?),
    }
    Ok(())
}

fn print_manifest<T: Serialize>(output: Output, value: &T, yaml: &str) -> Result<()> {
    match output {
        Output::Human => print!("{yaml}"),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn print_outcome<T: Serialize>(
    output: Output,
    verbed: &str,
    kind: &str,
    name: &str,
    value: &T,
) -> Result<()> {
    match output {
        Output::Human => println!("{verbed} {kind} {name}"),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn print_scaled(output: Output, name: &str, replicas: u32, scaled: bool) -> Result<()> {
    match output {
        Output::Human => println!("scaled {name} to {replicas}"),
        Output::Json => println!("{}", serde_json::to_string_pretty(&scaled)?),
    }
    Ok(())
}
