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

//! Drives a whole run: shared infrastructure, every cluster, the barrier,
//! materialization, the configuration-management handoff and the exports.

use super::builder::ClusterBuilder;
use super::core::{CoreInfrastructure, CoreInfrastructureBuilder};
use super::inventory::{FinalizedInventory, SharedInventory};
use super::outputs::{rewrite_server_endpoint, ClusterSecret, Endpoints, RunOutputs};
use super::ownership::{ProvisionState, ResourceTree};
use super::plan::ClusterPlan;
use super::validator::TopologyValidator;
use crate::domain::config::{RunConfig, Topology};
use crate::infrastructure::command::{CommandRunner, ConfigManagement, INSTALL_STEP};
use crate::infrastructure::constants::{kubeconfig_file_name, RSA_KEY_BITS};
use crate::infrastructure::materialize::{InventoryMaterializer, MaterializedFiles};
use crate::infrastructure::provider::Provider;
use crate::infrastructure::resolve::Barrier;
use crate::shared::{FleetError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Ready,
    Failed { stage: String, error: String },
    Skipped { reason: String },
}

impl ClusterOutcome {
    fn failed(stage: &str, error: &FleetError) -> Self {
        ClusterOutcome::Failed {
            stage: stage.to_string(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outputs: RunOutputs,
    pub state: ProvisionState,
    pub outcomes: BTreeMap<String, ClusterOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| !matches!(o, ClusterOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> Vec<(&str, &ClusterOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, ClusterOutcome::Failed { .. }))
            .map(|(name, o)| (name.as_str(), o))
            .collect()
    }
}

struct Materialized {
    inventory: FinalizedInventory,
    files: MaterializedFiles,
}

pub struct ClusterOrchestrator {
    provider: Arc<dyn Provider>,
    runner: Arc<dyn CommandRunner>,
    config: RunConfig,
    topology: Topology,
    materializer: InventoryMaterializer,
    key_bits: u32,
}

impl ClusterOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        runner: Arc<dyn CommandRunner>,
        config: RunConfig,
        topology: Topology,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            runner,
            config,
            topology,
            materializer: InventoryMaterializer::new()?,
            key_bits: RSA_KEY_BITS,
        })
    }

    pub fn with_materializer(mut self, materializer: InventoryMaterializer) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    /// Per-cluster plan without touching the provider.
    pub fn plan(topology: &Topology, config: &RunConfig) -> Vec<ClusterPlan> {
        topology
            .clusters
            .iter()
            .filter(|(_, spec)| spec.total_nodes() > 0)
            .map(|(name, spec)| ClusterPlan::new(name, spec, config))
            .collect()
    }

    /// Provision everything and export the results. Whatever got created is
    /// written to the state file even when the run fails, so `destroy` can
    /// clean it up.
    pub async fn run(&self) -> Result<RunReport> {
        TopologyValidator::new()?.validate(&self.topology)?;

        let barrier = Barrier::new();
        let tree = ResourceTree::new();
        let result = self.provision(&barrier, &tree).await;

        let state = tree.resolve().await;
        state.save(&self.config.state_path())?;
        info!(
            resources = state.resources.len(),
            path = %self.config.state_path().display(),
            "state saved"
        );

        let (outputs, outcomes) = result?;
        outputs.save(&self.config.outputs_path())?;
        info!(
            clusters = outputs.clusters.len(),
            path = %self.config.outputs_path().display(),
            "outputs exported"
        );

        Ok(RunReport {
            outputs,
            state,
            outcomes,
        })
    }

    async fn provision(
        &self,
        barrier: &Barrier,
        tree: &ResourceTree,
    ) -> Result<(RunOutputs, BTreeMap<String, ClusterOutcome>)> {
        let core =
            CoreInfrastructureBuilder::new(self.provider.clone(), &self.config, barrier, tree)
                .with_key_bits(self.key_bits)
                .build()
                .await?;

        let mut outcomes = BTreeMap::new();
        let mut inventories: Vec<SharedInventory> = Vec::new();
        for (name, spec) in &self.topology.clusters {
            if spec.total_nodes() == 0 {
                warn!(cluster = %name, "no nodes declared, skipping");
                outcomes.insert(
                    name.clone(),
                    ClusterOutcome::Skipped {
                        reason: "no nodes declared".to_string(),
                    },
                );
                continue;
            }
            let inventory = ClusterBuilder::new(
                name,
                spec,
                self.provider.clone(),
                &core,
                &self.config,
                barrier,
                tree,
            )
            .build()?;
            inventories.push(inventory);
        }

        info!(
            clusters = inventories.len(),
            pending = barrier.registered(),
            "all resources declared, waiting for the barrier"
        );
        let bastion = core.bastion.clone();
        let materialized = barrier
            .gate(|released| async move {
                let bastion = bastion.await?;
                let key_file = self.config.private_key_path();
                let mut results = Vec::with_capacity(inventories.len());
                for inventory in &inventories {
                    let finalized = inventory.finalize(&released, bastion)?;
                    let name = finalized.cluster_name.clone();
                    match self
                        .materializer
                        .materialize(&finalized, &self.config.work_dir, &key_file)
                    {
                        Ok(files) => {
                            let artifact = format!("inventory-{}", name);
                            tree.track_artifact(&artifact, &name, files.paths());
                            results.push((
                                name,
                                Ok(Materialized {
                                    inventory: finalized,
                                    files,
                                }),
                            ));
                        }
                        Err(e) => results.push((name, Err(e))),
                    }
                }
                Ok::<_, FleetError>(results)
            })
            .await?;

        let outputs = self
            .hand_off(&core, tree, materialized, &mut outcomes)
            .await?;
        Ok((outputs, outcomes))
    }

    async fn hand_off(
        &self,
        core: &CoreInfrastructure,
        tree: &ResourceTree,
        materialized: Vec<(String, Result<Materialized>)>,
        outcomes: &mut BTreeMap<String, ClusterOutcome>,
    ) -> Result<RunOutputs> {
        let bastion = core.bastion.clone().await?;
        let bastion_address = bastion
            .public_ip
            .ok_or_else(|| FleetError::validation("bastion has no public address"))?;
        let mut outputs = RunOutputs::new(core.keypair.private_key_pem(), bastion_address);
        let config_management = ConfigManagement::new(self.runner.clone(), &self.config)?;

        let mut halted: Option<String> = None;
        for (name, result) in materialized {
            if let Some(blocker) = &halted {
                outcomes.insert(
                    name,
                    ClusterOutcome::Skipped {
                        reason: format!("run halted after cluster '{}' failed", blocker),
                    },
                );
                continue;
            }

            let materialized = match result {
                Ok(m) => m,
                Err(e) => {
                    error!(
                        cluster = %name,
                        error = %e,
                        "inventory not materialized, cluster not installed"
                    );
                    outcomes.insert(name, ClusterOutcome::failed("materialize", &e));
                    continue;
                }
            };

            tree.track_artifact(
                &format!("install-{}", name),
                &name,
                vec![self.config.work_dir.join(kubeconfig_file_name(&name))],
            );
            match self
                .install(&config_management, &name, &materialized)
                .await
            {
                Ok(secret) => {
                    outputs.clusters.insert(name.clone(), secret);
                    outcomes.insert(name, ClusterOutcome::Ready);
                }
                Err(e) => {
                    error!(cluster = %name, error = %e, "configuration management failed, halting");
                    outcomes.insert(name.clone(), ClusterOutcome::failed("install", &e));
                    halted = Some(name);
                }
            }
        }
        Ok(outputs)
    }

    async fn install(
        &self,
        config_management: &ConfigManagement,
        cluster: &str,
        materialized: &Materialized,
    ) -> Result<ClusterSecret> {
        info!(
            cluster,
            inventory = %materialized.files.inventory.display(),
            "handing off to configuration management"
        );
        let kubeconfig_path = config_management.hand_off(cluster).await?;

        let endpoints = Endpoints::for_inventory(&materialized.inventory)?;
        let kubeconfig = promote_kubeconfig(&kubeconfig_path, &endpoints)?;
        info!(
            cluster,
            endpoint = %endpoints.cluster_api,
            kind = %endpoints.endpoint_type,
            "kubeconfig rewritten"
        );
        Ok(ClusterSecret {
            endpoints,
            kubeconfig,
        })
    }
}

/// Rewrite the kubeconfig in place so it targets the public API endpoint.
fn promote_kubeconfig(path: &Path, endpoints: &Endpoints) -> Result<String> {
    let original = std::fs::read_to_string(path).map_err(|e| {
        FleetError::command(
            INSTALL_STEP,
            0,
            format!("cannot read {}: {}", path.display(), e),
        )
    })?;
    let rewritten = rewrite_server_endpoint(&original, endpoints.cluster_api)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(rewritten.as_bytes())?;
    staged.persist(path).map_err(|e| FleetError::Io(e.error))?;
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn endpoints() -> Endpoints {
        Endpoints {
            app: Ipv4Addr::new(203, 0, 113, 10),
            cluster_api: Ipv4Addr::new(203, 0, 113, 10),
            endpoint_type: "LoadBalancer".to_string(),
        }
    }

    #[test]
    fn test_promote_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster-prod.kubeconfig");
        std::fs::write(&path, "clusters:\n- cluster:\n    server: https://OLD:6443\n").unwrap();

        let rewritten = promote_kubeconfig(&path, &endpoints()).unwrap();
        assert!(rewritten.contains("server: https://203.0.113.10:6443"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), rewritten);
    }

    #[test]
    fn test_unreadable_kubeconfig_is_an_install_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster-prod.kubeconfig");

        let err = promote_kubeconfig(&path, &endpoints()).unwrap_err();
        match err {
            FleetError::Command { step, stderr, .. } => {
                assert_eq!(step, INSTALL_STEP);
                assert!(stderr.contains("cluster-prod.kubeconfig"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
