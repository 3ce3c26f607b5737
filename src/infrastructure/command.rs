// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::config::RunConfig;
use crate::infrastructure::constants::{
    inventory_file_name, kubeconfig_file_name, variables_file_name, BASTION_PLAYBOOK,
    HOST_KEY_CHECKING_ENV, INSTALL_PLAYBOOK,
};
use crate::shared::{FleetError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

pub const BASTION_STEP: &str = "bastion";
pub const INSTALL_STEP: &str = "install";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub step: String,
    pub cluster: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as local child processes.
pub struct ShellRunner;

#[async_trait::async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(step = %spec.step, program = %spec.program, args = ?spec.args, "spawning");
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&spec.work_dir)
            .output()
            .await
            .map_err(|e| {
                FleetError::command(
                    &spec.step,
                    -1,
                    format!("cannot start '{}': {}", spec.program, e),
                )
            })?;

        Ok(CommandOutput {
            // killed by a signal
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Two-step handoff to configuration management: prepare the bastion, then
/// install Kubernetes. The install step only runs after the bastion step
/// exited successfully.
pub struct ConfigManagement {
    runner: Arc<dyn CommandRunner>,
    program: String,
    base_args: Vec<String>,
    playbook_dir: PathBuf,
    work_dir: PathBuf,
    settle_delay: Duration,
}

impl ConfigManagement {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &RunConfig) -> Result<Self> {
        let mut parts = config.playbook_command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| FleetError::missing("playbook_command"))?;
        Ok(Self {
            runner,
            program,
            base_args: parts.collect(),
            playbook_dir: config.playbook_dir.clone(),
            work_dir: config.work_dir.clone(),
            settle_delay: config.settle_delay(),
        })
    }

    pub fn bastion_step(&self, cluster: &str) -> CommandSpec {
        let mut args = self.base_args.clone();
        args.extend([
            "-i".to_string(),
            format!("./{}", inventory_file_name(cluster)),
            self.playbook_dir.join(BASTION_PLAYBOOK).display().to_string(),
        ]);
        self.spec(BASTION_STEP, cluster, args)
    }

    pub fn install_step(&self, cluster: &str) -> CommandSpec {
        let mut args = self.base_args.clone();
        args.extend([
            "-i".to_string(),
            format!("./{}", inventory_file_name(cluster)),
            "-e".to_string(),
            format!("@{}", variables_file_name(cluster)),
            self.playbook_dir.join(INSTALL_PLAYBOOK).display().to_string(),
        ]);
        self.spec(INSTALL_STEP, cluster, args)
    }

    fn spec(&self, step: &str, cluster: &str, args: Vec<String>) -> CommandSpec {
        CommandSpec {
            step: step.to_string(),
            cluster: cluster.to_string(),
            program: self.program.clone(),
            args,
            env: vec![(HOST_KEY_CHECKING_ENV.to_string(), "False".to_string())],
            work_dir: self.work_dir.clone(),
        }
    }

    /// Run both steps and return where the install step left the kubeconfig.
    pub async fn hand_off(&self, cluster: &str) -> Result<PathBuf> {
        if !self.settle_delay.is_zero() {
            info!(cluster, delay = ?self.settle_delay, "waiting for SSH on the bastion to settle");
            tokio::time::sleep(self.settle_delay).await;
        }
        self.run_step(self.bastion_step(cluster)).await?;
        self.run_step(self.install_step(cluster)).await?;

        let kubeconfig = self.work_dir.join(kubeconfig_file_name(cluster));
        if !kubeconfig.exists() {
            return Err(FleetError::command(
                INSTALL_STEP,
                0,
                format!("{} was not produced", kubeconfig.display()),
            ));
        }
        Ok(kubeconfig)
    }

    async fn run_step(&self, spec: CommandSpec) -> Result<()> {
        info!(cluster = %spec.cluster, step = %spec.step, "running configuration management");
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            error!(
                cluster = %spec.cluster,
                step = %spec.step,
                status = output.status,
                "configuration management failed"
            );
            return Err(FleetError::command(
                format!("{}-{}", spec.step, spec.cluster),
                output.status,
                output.stderr.trim().to_string(),
            ));
        }
        debug!(cluster = %spec.cluster, step = %spec.step, "step finished");
        Ok(())
    }
}
