//! Fleet provisioning commands

use crate::cli::display::TableRenderer;
use crate::domain::cluster::{ClusterOrchestrator, ProvisionState, RunOutputs, TopologyValidator};
use crate::domain::config::{apply_to_run_config, parse_dynamic_configs, RunConfig, Topology};
use crate::infrastructure::command::ShellRunner;
use crate::infrastructure::kubernetes::{ClusterStatusClient, FleetKubeClient};
use crate::infrastructure::provider::SimulatedProvider;
use anyhow::Context;
use clap::{Args, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Options shared by every command that reads the run configuration
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the run configuration (TOML)
    #[arg(long, short = 'c', default_value = "fleet.toml", value_name = "PATH")]
    pub config: PathBuf,

    /// Topology document, overrides `topology_file` from the run configuration
    #[arg(long, short = 't', value_name = "PATH")]
    pub topology: Option<PathBuf>,

    /// Dynamic configuration properties to override any settings (-D key=value)
    ///
    /// Flavors: fleet.worker-flavor, fleet.master-flavor, fleet.bastion-flavor
    /// Placement: fleet.image, fleet.datacenter, fleet.network-zone, fleet.lb-type
    /// Access: fleet.ssh-user
    /// Paths: fleet.topology-file, fleet.work-dir, fleet.state-dir, fleet.playbook-dir
    /// Handoff: fleet.playbook-command, fleet.settle-delay (seconds)
    ///
    /// Example: -Dfleet.worker-flavor=cx31 -Dfleet.settle-delay=30
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl ConfigArgs {
    /// Run configuration with `-D` overrides applied. Not validated.
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = RunConfig::from(&self.config).with_context(|| {
            format!("Failed to load run configuration {}", self.config.display())
        })?;

        if !self.properties.is_empty() {
            let overrides = parse_dynamic_configs(&self.properties)
                .context("Failed to parse dynamic configs")?;
            apply_to_run_config(&overrides, &mut config)
                .context("Failed to apply dynamic configs")?;
        }
        Ok(config)
    }

    /// Validated run configuration plus the topology it points at.
    pub fn load(&self) -> anyhow::Result<(RunConfig, Topology)> {
        let config = self.run_config()?;
        config.validate().context("Invalid run configuration")?;

        let path = match &self.topology {
            Some(path) => path.clone(),
            None => {
                let config_dir = self.config.parent().filter(|p| !p.as_os_str().is_empty());
                config.topology_path(config_dir)
            }
        };
        let topology = Topology::load(&path)
            .with_context(|| format!("Failed to load topology {}", path.display()))?;
        info!(
            clusters = topology.clusters.len(),
            topology = %path.display(),
            "topology loaded"
        );
        Ok((config, topology))
    }
}

#[derive(Parser, Debug)]
pub struct UpCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Mean resolution latency of the simulated provider, in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,

    /// Random extra latency per resource, in milliseconds
    #[arg(long, default_value = "0")]
    pub jitter_ms: u64,
}

#[derive(Parser, Debug)]
pub struct PlanCommand {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Parser, Debug)]
pub struct DestroyCommand {
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Parser, Debug)]
pub struct StatusCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only show this cluster
    #[arg(long)]
    pub cluster: Option<String>,

    /// Attempts per cluster before giving up on transient API errors
    #[arg(long, default_value = "3")]
    pub attempts: usize,
}

impl UpCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let (config, topology) = self.config.load()?;
        prepare_dirs(&config)?;

        let provider = SimulatedProvider::new().with_latency(
            Duration::from_millis(self.latency_ms),
            Duration::from_millis(self.jitter_ms),
        );
        let orchestrator =
            ClusterOrchestrator::new(Arc::new(provider), Arc::new(ShellRunner), config, topology)?;

        let report = orchestrator.run().await.map_err(|e| {
            anyhow::anyhow!(
                "Provisioning failed: {}\n  Created resources were recorded, run `kube-fleet destroy` to remove them",
                e
            )
        })?;

        println!("{}", TableRenderer::new().render_run_report(&report));

        let failures = report.failures();
        if !failures.is_empty() {
            let names: Vec<&str> = failures.iter().map(|(name, _)| *name).collect();
            anyhow::bail!("❌ {} cluster(s) failed: {}", names.len(), names.join(", "));
        }
        println!("Fleet is up!");
        Ok(())
    }
}

impl PlanCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let (config, topology) = self.config.load()?;
        TopologyValidator::new()?
            .validate(&topology)
            .context("Invalid topology")?;

        let skipped: Vec<&String> = topology
            .clusters
            .iter()
            .filter(|(_, spec)| spec.total_nodes() == 0)
            .map(|(name, _)| name)
            .collect();
        for name in &skipped {
            warn!(cluster = %name, "no nodes declared, will be skipped");
        }

        let plans = ClusterOrchestrator::plan(&topology, &config);
        println!("{}", TableRenderer::new().render_plan(&plans));
        Ok(())
    }
}

impl DestroyCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.config.run_config()?;
        let path = config.state_path();
        if !path.exists() {
            println!("Nothing to destroy, no state at {}", path.display());
            return Ok(());
        }

        let mut state = ProvisionState::load(&path)
            .with_context(|| format!("Failed to read state {}", path.display()))?;
        if state.is_empty() {
            println!("Nothing to destroy");
            return Ok(());
        }

        let provider = SimulatedProvider::new();
        let result = state.teardown(&provider).await;
        // keep whatever is left so the next destroy can resume
        state
            .save(&path)
            .with_context(|| format!("Failed to write state {}", path.display()))?;

        let destroyed = result.context("Teardown stopped")?;
        remove_outputs(&config.outputs_path())?;
        println!("Destroyed {} resource(s)", destroyed);
        Ok(())
    }
}

impl StatusCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.config.run_config()?;
        let outputs = RunOutputs::load(&config.outputs_path())
            .context("Failed to read run outputs, has `kube-fleet up` completed?")?;

        let renderer = TableRenderer::new();
        let mut shown = 0;
        for (name, secret) in &outputs.clusters {
            if self.cluster.as_ref().is_some_and(|wanted| wanted != name) {
                continue;
            }
            shown += 1;

            let client = FleetKubeClient::from_kubeconfig_yaml(name, &secret.kubeconfig).await;
            let nodes = match client {
                Ok(client) => client.with_max_attempts(self.attempts).list_nodes().await,
                Err(e) => Err(e),
            };
            match nodes {
                Ok(nodes) => {
                    println!("{}", renderer.render_node_status(name, &secret.endpoints, &nodes))
                }
                Err(e) => println!("✗ Cluster {}: {}", name, e),
            }
        }

        if shown == 0 {
            match &self.cluster {
                Some(name) => anyhow::bail!("Cluster '{}' not found in run outputs", name),
                None => println!("No provisioned clusters found"),
            }
        }
        Ok(())
    }
}

fn prepare_dirs(config: &RunConfig) -> anyhow::Result<()> {
    for dir in [&config.work_dir, &config.state_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

fn remove_outputs(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

