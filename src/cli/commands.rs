// CLI command definitions

use super::fleet::{DestroyCommand, PlanCommand, StatusCommand, UpCommand};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "kube-fleet",
    version,
    about = "Multi-cluster Kubernetes provisioning tool",
    long_about = "A standalone CLI tool that provisions the infrastructure for several Kubernetes clusters from one topology file and hands each cluster off to Ansible"
)]
pub struct CliArgs {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Provision every cluster, render inventories and run the installer
    Up(UpCommand),

    /// Print the resources each cluster would get (no side effects)
    Plan(PlanCommand),

    /// Tear down everything recorded in the state file
    Destroy(DestroyCommand),

    /// Show node readiness of provisioned clusters
    Status(StatusCommand),
}
