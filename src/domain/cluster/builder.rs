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

use super::core::{track_node, CoreInfrastructure};
use super::inventory::SharedInventory;
use super::node::Node;
use super::ownership::ResourceTree;
use super::plan::{ClusterPlan, LoadBalancerPlan, NodePlan, NodeRole};
use crate::domain::config::{ClusterSpec, RunConfig};
use crate::infrastructure::provider::{
    LoadBalancerServiceSpec, LoadBalancerSpec, LoadBalancerTargetSpec, Protocol, Provider,
    ResourceId, ResourceKind, ServerSpec,
};
use crate::infrastructure::resolve::{Barrier, Output, ProducerGuard};
use crate::shared::{FleetError, ProviderFailure, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Declares the resources of one cluster. Nothing here blocks: every call
/// hands its attribute futures to the barrier and returns.
pub struct ClusterBuilder {
    provider: Arc<dyn Provider>,
    core: CoreInfrastructure,
    plan: ClusterPlan,
    config: RunConfig,
    inventory: SharedInventory,
    barrier: Barrier,
    tree: ResourceTree,
    servers: Vec<(String, Output<ResourceId>)>,
    _producer: ProducerGuard,
}

impl ClusterBuilder {
    pub fn new(
        name: &str,
        spec: &ClusterSpec,
        provider: Arc<dyn Provider>,
        core: &CoreInfrastructure,
        config: &RunConfig,
        barrier: &Barrier,
        tree: &ResourceTree,
    ) -> Self {
        Self {
            provider,
            core: core.clone(),
            plan: ClusterPlan::new(name, spec, config),
            config: config.clone(),
            inventory: SharedInventory::new(name, spec, &config.ssh_user),
            barrier: barrier.clone(),
            tree: tree.clone(),
            servers: Vec::new(),
            _producer: barrier.producer(name),
        }
    }

    /// Declare every node and, for multi-node clusters, the load balancer.
    /// Consumes the builder, which releases its hold on the barrier.
    pub fn build(mut self) -> Result<SharedInventory> {
        let solo = self.plan.is_solo();
        for index in 0..self.plan.control_plane.len() as u32 {
            self.create_control_plane_node(index, solo)?;
        }
        for index in 0..self.plan.workers.len() as u32 {
            self.create_worker_node(index)?;
        }
        if let Some(lb) = self.plan.load_balancer.clone() {
            self.create_load_balancer(&lb)?;
        }
        info!(
            cluster = %self.plan.cluster,
            control_plane = self.plan.control_plane.len(),
            workers = self.plan.workers.len(),
            load_balancer = self.plan.load_balancer.is_some(),
            "cluster declared"
        );
        Ok(self.inventory.clone())
    }

    pub fn create_control_plane_node(&mut self, index: u32, solo: bool) -> Result<()> {
        let node = self.node_plan(NodeRole::ControlPlane, index)?;
        if node.public_ipv4 != solo {
            return Err(FleetError::validation(format!(
                "control-plane node {} of cluster '{}' is {} but the cluster is {}",
                index,
                self.plan.cluster,
                if node.public_ipv4 { "public" } else { "private" },
                if solo { "solo" } else { "multi-node" }
            )));
        }
        let firewall = self.core.network.firewalls.control_plane.clone();
        let resolved = self.declare_server(&node, firewall);

        let inventory = self.inventory.clone();
        let recorded = resolved.and_then(move |entry| async move {
            inventory
                .record_control_plane(index, entry)
                .map_err(|e| ProviderFailure::new(inventory.cluster_name(), e.to_string()))
        });
        self.barrier.register(&recorded);
        Ok(())
    }

    pub fn create_worker_node(&mut self, index: u32) -> Result<()> {
        let node = self.node_plan(NodeRole::Worker, index)?;
        let firewall = self.core.network.firewalls.worker.clone();
        let resolved = self.declare_server(&node, firewall);

        let inventory = self.inventory.clone();
        let recorded = resolved.and_then(move |entry| async move {
            inventory
                .record_worker(index, entry)
                .map_err(|e| ProviderFailure::new(inventory.cluster_name(), e.to_string()))
        });
        self.barrier.register(&recorded);
        Ok(())
    }

    /// Forward the API port plus every declared mapping to all nodes over
    /// the private network.
    pub fn create_load_balancer(&mut self, lb: &LoadBalancerPlan) -> Result<()> {
        let expected = self.plan.total_nodes();
        if lb.targets.len() != expected || self.servers.len() != expected {
            return Err(FleetError::validation(format!(
                "load balancer of cluster '{}' needs {} declared nodes, found {}",
                self.plan.cluster,
                expected,
                self.servers.len()
            )));
        }
        let scope = self.plan.cluster.clone();

        let handle = self.provider.create_load_balancer(LoadBalancerSpec {
            name: lb.name.clone(),
            load_balancer_type: lb.load_balancer_type.clone(),
            network_zone: self.config.network_zone.clone(),
        });
        self.tree
            .track(ResourceKind::LoadBalancer, &lb.name, &scope, &handle.id);

        let attachment = self.provider.attach_load_balancer_network(
            &lb.network_attachment,
            handle.id.clone(),
            self.core.network.subnet_id.clone(),
        );
        self.tree.track(
            ResourceKind::LoadBalancerNetwork,
            &lb.network_attachment,
            &scope,
            &attachment.id,
        );

        for service in &lb.services {
            let id = self
                .provider
                .create_load_balancer_service(LoadBalancerServiceSpec {
                    name: service.name.clone(),
                    load_balancer_id: handle.id.clone(),
                    protocol: Protocol::Tcp,
                    listen_port: service.listen_port,
                    destination_port: service.destination_port,
                });
            self.tree
                .track(ResourceKind::LoadBalancerService, &service.name, &scope, &id);
            self.barrier.register(&id);
        }

        for target in &lb.targets {
            let server_id = self
                .servers
                .iter()
                .find(|(name, _)| *name == target.node)
                .map(|(_, id)| id.clone())
                .ok_or_else(|| {
                    FleetError::validation(format!(
                        "load balancer target '{}' refers to undeclared node '{}'",
                        target.name, target.node
                    ))
                })?;
            let id = self
                .provider
                .create_load_balancer_target(LoadBalancerTargetSpec {
                    name: target.name.clone(),
                    load_balancer_id: handle.id.clone(),
                    server_id,
                    use_private_ip: true,
                });
            self.tree
                .track(ResourceKind::LoadBalancerTarget, &target.name, &scope, &id);
            self.barrier.register(&id);
        }

        let inventory = self.inventory.clone();
        let recorded = attachment
            .private_ip
            .join(&handle.public_ip)
            .and_then(move |(private_ip, public_ip)| async move {
                inventory
                    .record_load_balancer(Node::public(private_ip, public_ip))
                    .map_err(|e| ProviderFailure::new(inventory.cluster_name(), e.to_string()))
            });
        self.barrier.register(&recorded);

        debug!(
            cluster = %scope,
            services = lb.services.len(),
            targets = lb.targets.len(),
            "load balancer declared"
        );
        Ok(())
    }

    fn node_plan(&self, role: NodeRole, index: u32) -> Result<NodePlan> {
        let nodes = match role {
            NodeRole::ControlPlane => &self.plan.control_plane,
            NodeRole::Worker => &self.plan.workers,
        };
        nodes.get(index as usize).cloned().ok_or_else(|| {
            FleetError::validation(format!(
                "cluster '{}' has no {} node {}",
                self.plan.cluster, role, index
            ))
        })
    }

    fn declare_server(&mut self, node: &NodePlan, firewall: Output<ResourceId>) -> Output<Node> {
        let server = self.provider.create_server(ServerSpec {
            name: node.name.clone(),
            image: self.config.image.clone(),
            datacenter: self.config.datacenter.clone(),
            server_type: node.server_type.clone(),
            ssh_key_ids: vec![self.core.ssh_key_id.clone()],
            network_id: self.core.network.attach_network_id.clone(),
            firewall_ids: vec![firewall],
            public_ipv4: node.public_ipv4,
        });
        self.tree
            .track(ResourceKind::Server, &node.name, &self.plan.cluster, &server.id);
        self.servers.push((node.name.clone(), server.id.clone()));
        debug!(
            node = %node.name,
            role = %node.role,
            flavor = %node.server_type,
            public = node.public_ipv4,
            "node declared"
        );
        track_node(&node.name, node.public_ipv4, &server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::core::CoreInfrastructureBuilder;
    use crate::domain::config::Topology;
    use crate::infrastructure::provider::{SimDetail, SimulatedProvider};
    use std::time::Duration;

    const TOPOLOGY: &str = r#"
clusters:
  prod:
    control_plane:
      node_count: 3
    worker:
      node_count: 2
    kubernetes_version: 1.23.17-00
    load_balancer:
      create: true
      port_mappings:
        http:
          source: 80
          target: 30080
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
  solo:
    control_plane:
      node_count: 1
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
"#;

    fn config(dir: &std::path::Path) -> RunConfig {
        RunConfig {
            worker_flavor: "cx21".to_string(),
            master_flavor: "cx31".to_string(),
            bastion_flavor: "cx11".to_string(),
            image: "ubuntu-22.04".to_string(),
            datacenter: "fsn1-dc14".to_string(),
            network_zone: "eu-central".to_string(),
            lb_type: "lb11".to_string(),
            ssh_user: "root".to_string(),
            state_dir: dir.join("state"),
            ..RunConfig::default()
        }
    }

    async fn build(cluster: &str, sim: &SimulatedProvider) -> (Barrier, SharedInventory, Node) {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let topology = Topology::parse(TOPOLOGY).unwrap();
        let barrier = Barrier::new();
        let tree = ResourceTree::new();
        let provider: Arc<dyn Provider> = Arc::new(sim.clone());

        let core = CoreInfrastructureBuilder::new(provider.clone(), &config, &barrier, &tree)
            .with_key_bits(2048)
            .build()
            .await
            .unwrap();
        let inventory = ClusterBuilder::new(
            cluster,
            &topology.clusters[cluster],
            provider,
            &core,
            &config,
            &barrier,
            &tree,
        )
        .build()
        .unwrap();

        barrier.wait().await.unwrap();
        let bastion = core.bastion.await.unwrap();
        (barrier, inventory, bastion)
    }

    #[tokio::test]
    async fn test_multi_node_cluster_resources() {
        let sim = SimulatedProvider::new()
            .with_latency(Duration::from_millis(1), Duration::from_millis(5));
        let (barrier, inventory, bastion) = build("prod", &sim).await;

        let released = barrier.wait().await.unwrap();
        let finalized = inventory.finalize(&released, bastion).unwrap();
        assert_eq!(finalized.control_plane.len(), 3);
        assert_eq!(finalized.workers.len(), 2);
        assert!(finalized
            .control_plane
            .iter()
            .chain(finalized.workers.iter())
            .all(|n| n.public_ip.is_none()));
        assert!(finalized.load_balancer.is_some());

        let mut ports: Vec<_> = sim
            .records_of(ResourceKind::LoadBalancerService)
            .into_iter()
            .map(|r| match r.detail {
                SimDetail::LoadBalancerService {
                    listen_port,
                    destination_port,
                    ..
                } => (listen_port, destination_port),
                other => panic!("unexpected detail {:?}", other),
            })
            .collect();
        ports.sort();
        assert_eq!(ports, vec![(80, 30080), (6443, 6443)]);

        let targets = sim.records_of(ResourceKind::LoadBalancerTarget);
        assert_eq!(targets.len(), 5);
        assert!(targets.iter().all(|r| matches!(
            r.detail,
            SimDetail::LoadBalancerTarget {
                use_private_ip: true,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_solo_cluster_is_exposed_directly() {
        let sim = SimulatedProvider::new();
        let (barrier, inventory, bastion) = build("solo", &sim).await;

        let released = barrier.wait().await.unwrap();
        let finalized = inventory.finalize(&released, bastion).unwrap();
        assert_eq!(finalized.control_plane.len(), 1);
        assert!(finalized.control_plane[0].public_ip.is_some());
        assert!(finalized.load_balancer.is_none());
        assert!(sim.records_of(ResourceKind::LoadBalancer).is_empty());

        match sim.record_named("control-plane-solo-0").unwrap().detail {
            SimDetail::Server { server_type, .. } => assert_eq!(server_type, "cx21"),
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_node_fails_the_barrier() {
        let sim = SimulatedProvider::new().fail_on("worker-prod-1");
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let topology = Topology::parse(TOPOLOGY).unwrap();
        let barrier = Barrier::new();
        let tree = ResourceTree::new();
        let provider: Arc<dyn Provider> = Arc::new(sim);

        let core = CoreInfrastructureBuilder::new(provider.clone(), &config, &barrier, &tree)
            .with_key_bits(2048)
            .build()
            .await
            .unwrap();
        let spec = &topology.clusters["prod"];
        ClusterBuilder::new("prod", spec, provider, &core, &config, &barrier, &tree)
            .build()
            .unwrap();

        let err = barrier.wait().await.unwrap_err();
        assert!(err.to_string().contains("worker-prod-1"));
    }
}
