//! One-shot subcommands and the provisioning flow shared with `run`.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use tracing::{debug, info};

use webtier_autoscale::{FleetReconciler, LocalCompute, ReconcileReport};
use webtier_core::{StackConfig, StackSpec};
use webtier_routing::{Router, TargetSync};
use webtier_stack::{ALB_DNS_OUTPUT, ApplyReport, OutputPublisher};
use webtier_state::{StackOutput, StateStore};

/// Where the stack definition and the state live.
pub struct Context {
    pub config: PathBuf,
    pub data_dir: PathBuf,
}

impl Context {
    pub fn load_spec(&self) -> anyhow::Result<StackSpec> {
        StackConfig::load(&self.config)
            .with_context(|| format!("loading stack definition {}", self.config.display()))
    }

    pub fn open_state(&self) -> anyhow::Result<StateStore> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join("webtier.redb");
        let state = StateStore::open(&path)?;
        debug!(path = ?path, "state store opened");
        Ok(state)
    }
}

/// Result of provisioning a stack.
pub struct Provisioned {
    pub report: ApplyReport,
    /// Reconciler that brought the fleet to its initial capacity.
    pub reconciler: FleetReconciler,
    pub initial: ReconcileReport,
    pub entry_point: StackOutput,
}

/// Apply every resource, bring the fleet to its desired capacity and
/// publish the load balancer address.
pub async fn provision(spec: &StackSpec, state: &StateStore) -> anyhow::Result<Provisioned> {
    let report = webtier_stack::apply(spec, state)?;

    let mut reconciler = fleet_reconciler(spec, state)?;
    let initial = reconciler.reconcile(&[]).await?;
    info!(
        fleet = %spec.fleet.name,
        desired = initial.desired,
        current = initial.current,
        launched = initial.launched.len(),
        "initial capacity reconciled"
    );

    let publisher = OutputPublisher::new(Arc::new(state.clone()), state.clone());
    let entry_point = publisher.publish_entry_point(&report.load_balancer).await?;

    Ok(Provisioned {
        report,
        reconciler,
        initial,
        entry_point,
    })
}

/// A reconciler on local compute that already knows the fleet's
/// registered instances.
fn fleet_reconciler(spec: &StackSpec, state: &StateStore) -> anyhow::Result<FleetReconciler> {
    let fleet = &spec.fleet;
    let compute = LocalCompute::for_fleet(&spec.network, fleet)?;
    for member in state.list_members_for_group(&fleet.target_group)? {
        if member.fleet != fleet.name {
            continue;
        }
        if let Some(ip) = member
            .address
            .rsplit_once(':')
            .and_then(|(ip, _)| ip.parse::<Ipv4Addr>().ok())
        {
            compute.adopt(&member.id, ip);
        }
    }

    let port = spec
        .target_group(&fleet.target_group)
        .map(|tg| tg.port)
        .with_context(|| format!("fleet {} has no target group {}", fleet.name, fleet.target_group))?;

    Ok(FleetReconciler::new(
        fleet.clone(),
        port,
        state.clone(),
        Arc::new(compute),
    ))
}

pub fn init(ctx: &Context, name: &str, force: bool) -> anyhow::Result<()> {
    if ctx.config.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", ctx.config.display());
    }
    let body = StackConfig::scaffold(name).to_toml_string()?;
    std::fs::write(&ctx.config, body)?;
    info!(path = %ctx.config.display(), stack = name, "stack definition written");
    println!("wrote {}", ctx.config.display());
    Ok(())
}

pub fn validate(ctx: &Context) -> anyhow::Result<()> {
    let spec = ctx.load_spec()?;
    let planned = webtier_stack::plan(&spec)?;

    println!("stack {} is valid ({} resources)", spec.name, planned.len());
    for resource in &planned {
        println!("  {:<15} {}", resource.kind.as_str(), resource.name);
    }
    Ok(())
}

pub async fn apply(ctx: &Context) -> anyhow::Result<Provisioned> {
    let spec = ctx.load_spec()?;
    let state = ctx.open_state()?;
    let provisioned = provision(&spec, &state).await?;

    for (_, handle) in &provisioned.report.resources {
        println!("converged {handle}");
    }
    println!(
        "fleet {}: desired {}, current {}",
        spec.fleet.name, provisioned.initial.desired, provisioned.initial.current
    );
    println!("{ALB_DNS_OUTPUT} = {}", provisioned.entry_point.value);
    Ok(provisioned)
}

pub fn route(ctx: &Context, path: &str) -> anyhow::Result<()> {
    let spec = ctx.load_spec()?;
    let state = ctx.open_state()?;

    let sync = TargetSync::new(Router::new(&spec.listener)?);
    sync.sync(&state)?;

    let decision = sync
        .router()
        .route(path)
        .with_context(|| format!("routing {path}"))?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

pub fn outputs(ctx: &Context) -> anyhow::Result<()> {
    let state = ctx.open_state()?;
    let outputs = state.list_outputs()?;
    if outputs.is_empty() {
        println!("no outputs published");
    }
    for output in outputs {
        println!("{} = {}", output.key, output.value);
    }
    Ok(())
}
