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

//! Per-cluster inventory filled in while attributes resolve.
//!
//! Entries are keyed by node index, so concurrent resolutions land in their
//! own slot and the finalized lists come out in declaration order no matter
//! which server the provider finished first.

use super::node::Node;
use crate::domain::config::{ClusterSpec, NtpConfig};
use crate::infrastructure::resolve::Released;
use crate::shared::{FleetError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct ClusterInventory {
    cluster_name: String,
    admin_user: String,
    spec: ClusterSpec,
    expects_load_balancer: bool,
    load_balancer: Option<Node>,
    control_plane: BTreeMap<u32, Node>,
    workers: BTreeMap<u32, Node>,
}

/// Handle shared by every builder task of one cluster.
#[derive(Debug, Clone)]
pub struct SharedInventory {
    inner: Arc<Mutex<ClusterInventory>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMappingEntry {
    pub name: String,
    pub source: u16,
    pub target: u16,
}

/// The complete inventory. Only obtainable after the barrier released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedInventory {
    pub cluster_name: String,
    pub admin_user: String,
    pub cni: String,
    pub cri: String,
    pub kubernetes_version: String,
    pub private_registry: Option<String>,
    pub insecure_registries: Vec<String>,
    pub ntp: NtpConfig,
    pub port_mappings: Vec<PortMappingEntry>,
    pub bastion: Node,
    pub load_balancer: Option<Node>,
    pub control_plane: Vec<Node>,
    pub workers: Vec<Node>,
}

impl SharedInventory {
    pub fn new(cluster_name: &str, spec: &ClusterSpec, admin_user: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClusterInventory {
                cluster_name: cluster_name.to_string(),
                admin_user: admin_user.to_string(),
                spec: spec.clone(),
                expects_load_balancer: spec.total_nodes() > 1,
                load_balancer: None,
                control_plane: BTreeMap::new(),
                workers: BTreeMap::new(),
            })),
        }
    }

    pub fn cluster_name(&self) -> String {
        self.inner.lock().cluster_name.clone()
    }

    pub fn record_control_plane(&self, index: u32, node: Node) -> Result<()> {
        let mut inventory = self.inner.lock();
        let cluster = inventory.cluster_name.clone();
        insert_once(&mut inventory.control_plane, &cluster, "control-plane", index, node)
    }

    pub fn record_worker(&self, index: u32, node: Node) -> Result<()> {
        let mut inventory = self.inner.lock();
        let cluster = inventory.cluster_name.clone();
        insert_once(&mut inventory.workers, &cluster, "worker", index, node)
    }

    pub fn record_load_balancer(&self, node: Node) -> Result<()> {
        let mut inventory = self.inner.lock();
        if inventory.load_balancer.is_some() {
            return Err(FleetError::validation(format!(
                "load balancer of cluster '{}' recorded twice",
                inventory.cluster_name
            )));
        }
        debug!(cluster = %inventory.cluster_name, ip = %node.private_ip, "load balancer recorded");
        inventory.load_balancer = Some(node);
        Ok(())
    }

    /// Freeze the inventory and attach the shared bastion. Fails when a
    /// declared node never made it in.
    pub fn finalize(&self, _released: &Released, bastion: Node) -> Result<FinalizedInventory> {
        let inventory = self.inner.lock();
        let spec = &inventory.spec;

        let declared = (spec.control_plane.node_count as usize, spec.worker.node_count as usize);
        let resolved = (inventory.control_plane.len(), inventory.workers.len());
        if declared != resolved {
            return Err(FleetError::barrier(format!(
                "cluster '{}' resolved {}/{} control-plane and {}/{} worker nodes",
                inventory.cluster_name, resolved.0, declared.0, resolved.1, declared.1
            )));
        }
        if inventory.expects_load_balancer != inventory.load_balancer.is_some() {
            return Err(FleetError::barrier(format!(
                "cluster '{}' load balancer is missing from the inventory",
                inventory.cluster_name
            )));
        }

        Ok(FinalizedInventory {
            cluster_name: inventory.cluster_name.clone(),
            admin_user: inventory.admin_user.clone(),
            cni: spec.cni.clone(),
            cri: spec.cri.clone(),
            kubernetes_version: spec.kubernetes_version.clone(),
            private_registry: spec.private_registry.clone(),
            insecure_registries: spec.insecure_registries.clone(),
            ntp: spec.ntp.clone(),
            port_mappings: spec
                .load_balancer
                .port_mappings
                .iter()
                .map(|(name, ports)| PortMappingEntry {
                    name: name.clone(),
                    source: ports.source,
                    target: ports.target,
                })
                .collect(),
            bastion,
            load_balancer: inventory.load_balancer,
            control_plane: inventory.control_plane.values().copied().collect(),
            workers: inventory.workers.values().copied().collect(),
        })
    }
}

fn insert_once(
    slots: &mut BTreeMap<u32, Node>,
    cluster: &str,
    role: &str,
    index: u32,
    node: Node,
) -> Result<()> {
    if slots.contains_key(&index) {
        return Err(FleetError::validation(format!(
            "{} node {} of cluster '{}' recorded twice",
            role, index, cluster
        )));
    }
    debug!(cluster, role, index, ip = %node.private_ip, "node recorded");
    slots.insert(index, node);
    Ok(())
}

impl FinalizedInventory {
    /// Address the nodes use to reach the API server from inside the subnet.
    pub fn control_plane_endpoint(&self) -> Option<Ipv4Addr> {
        match &self.load_balancer {
            Some(lb) => Some(lb.private_ip),
            None => self.control_plane.first().map(|node| node.private_ip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{NodePool, Topology};
    use crate::infrastructure::resolve::Barrier;

    fn spec(control_plane: u32, worker: u32) -> ClusterSpec {
        let mut topology = Topology::parse(
            r#"
clusters:
  prod:
    control_plane:
      node_count: 1
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
"#,
        )
        .unwrap();
        let mut spec = topology.clusters.remove("prod").unwrap();
        spec.control_plane = NodePool {
            node_count: control_plane,
        };
        spec.worker = NodePool { node_count: worker };
        spec
    }

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 1, last)
    }

    #[tokio::test]
    async fn test_finalize_orders_by_index() {
        let inventory = SharedInventory::new("prod", &spec(2, 1), "root");
        inventory.record_control_plane(1, Node::private(ip(4))).unwrap();
        inventory.record_worker(0, Node::private(ip(5))).unwrap();
        inventory.record_control_plane(0, Node::private(ip(3))).unwrap();
        inventory
            .record_load_balancer(Node::public(ip(6), Ipv4Addr::new(203, 0, 113, 11)))
            .unwrap();

        let released = Barrier::new().wait().await.unwrap();
        let bastion = Node::public(ip(2), Ipv4Addr::new(203, 0, 113, 10));
        let finalized = inventory.finalize(&released, bastion).unwrap();

        assert_eq!(finalized.control_plane, vec![Node::private(ip(3)), Node::private(ip(4))]);
        assert_eq!(finalized.workers.len(), 1);
        assert_eq!(finalized.bastion, bastion);
        assert_eq!(finalized.control_plane_endpoint(), Some(ip(6)));
    }

    #[tokio::test]
    async fn test_finalize_rejects_incomplete_inventory() {
        let inventory = SharedInventory::new("prod", &spec(3, 0), "root");
        inventory.record_control_plane(0, Node::private(ip(3))).unwrap();
        let released = Barrier::new().wait().await.unwrap();
        let err = inventory
            .finalize(&released, Node::private(ip(2)))
            .unwrap_err();
        assert!(matches!(err, FleetError::Barrier(_)));
    }

    #[test]
    fn test_slots_are_written_once() {
        let inventory = SharedInventory::new("prod", &spec(1, 0), "root");
        inventory.record_control_plane(0, Node::private(ip(3))).unwrap();
        assert!(inventory
            .record_control_plane(0, Node::private(ip(4)))
            .is_err());
        inventory.record_load_balancer(Node::private(ip(9))).unwrap();
        assert!(inventory.record_load_balancer(Node::private(ip(9))).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_recording() {
        let inventory = SharedInventory::new("prod", &spec(16, 16), "root");
        let mut tasks = Vec::new();
        for i in 0..16u32 {
            let inventory = inventory.clone();
            tasks.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                inventory.record_worker(i, Node::private(ip(100 + i as u8))).unwrap();
                inventory.record_control_plane(i, Node::private(ip(10 + i as u8))).unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        inventory
            .record_load_balancer(Node::private(ip(200)))
            .unwrap();
        let released = Barrier::new().wait().await.unwrap();
        let finalized = inventory.finalize(&released, Node::private(ip(2))).unwrap();
        assert_eq!(finalized.control_plane.len(), 16);
        assert_eq!(finalized.workers.len(), 16);
        assert_eq!(finalized.workers[0].private_ip, ip(100));
    }
}
