//! Build automation for kube-fleet
//!
//! Usage: cargo run -p xtask -- <command>
//!
//! Available commands:
//! - build: Build the kube-fleet binary
//! - test: Run unit and integration tests
//! - scenarios: Run the end-to-end provisioning scenarios
//! - plan: Print the resource plan for a run configuration
//! - ci: Format check, clippy, tests

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BINARY: &str = "kube-fleet";
const SCENARIO_SUITE: &str = "fleet_test";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for kube-fleet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the kube-fleet binary
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Only the tests/ suites
        #[arg(long)]
        integration: bool,
    },
    /// Run the end-to-end provisioning scenarios against the simulated provider
    Scenarios,
    /// Print the resource plan for a run configuration
    Plan {
        /// Run configuration (TOML)
        #[arg(long, default_value = "fleet.toml")]
        config: String,
    },
    /// Format check, clippy and the full test suite
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(project_root());

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { integration } => test(&sh, integration),
        Commands::Scenarios => scenarios(&sh),
        Commands::Plan { config } => plan(&sh, &config),
        Commands::Ci => ci(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    let profile = if release { "release" } else { "debug" };
    println!("🔨 Building {} ({})...", BINARY, profile);
    if release {
        cmd!(sh, "cargo build --release --bin {BINARY}").run()?;
    } else {
        cmd!(sh, "cargo build --bin {BINARY}").run()?;
    }
    println!("✅ target/{}/{}", profile, BINARY);
    Ok(())
}

fn test(sh: &Shell, integration: bool) -> Result<()> {
    println!("🧪 Running tests...");
    if integration {
        cmd!(sh, "cargo test --test '*'").run()?;
    } else {
        cmd!(sh, "cargo test --workspace").run()?;
    }
    println!("✅ All tests passed");
    Ok(())
}

fn scenarios(sh: &Shell) -> Result<()> {
    println!("🌐 Running provisioning scenarios...");
    cmd!(sh, "cargo test --test {SCENARIO_SUITE} -- --nocapture")
        .env("RUST_LOG", "kube_fleet=debug")
        .run()?;
    println!("✅ Scenarios passed");
    Ok(())
}

fn plan(sh: &Shell, config: &str) -> Result<()> {
    cmd!(sh, "cargo run --quiet --bin {BINARY} -- plan --config {config}")
        .run()
        .context("Failed to print plan")?;
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔍 Running CI checks...");
    cmd!(sh, "cargo fmt --all -- --check")
        .run()
        .context("Formatting check failed, run `cargo fmt --all`")?;
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    test(sh, false)?;
    println!("✅ All CI checks passed");
    Ok(())
}

fn project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .to_path_buf()
}
