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

//! What a cluster turns into, computed before anything is declared.
//!
//! The builder and the `plan` command both read from here, so the printed
//! plan and the provisioned resources cannot drift apart.

use crate::domain::config::{ClusterSpec, RunConfig};
use crate::infrastructure::constants::KUBE_API_PORT;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::ControlPlane => write!(f, "control-plane"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    pub name: String,
    pub role: NodeRole,
    pub index: u32,
    pub server_type: String,
    pub public_ipv4: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePlan {
    pub name: String,
    pub listen_port: u16,
    pub destination_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    pub name: String,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerPlan {
    pub name: String,
    pub network_attachment: String,
    pub load_balancer_type: String,
    pub services: Vec<ServicePlan>,
    pub targets: Vec<TargetPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlan {
    pub cluster: String,
    pub control_plane: Vec<NodePlan>,
    pub workers: Vec<NodePlan>,
    pub load_balancer: Option<LoadBalancerPlan>,
}

impl ClusterPlan {
    pub fn new(cluster: &str, spec: &ClusterSpec, config: &RunConfig) -> Self {
        let solo = spec.total_nodes() <= 1;

        let control_plane: Vec<NodePlan> = (0..spec.control_plane.node_count)
            .map(|index| NodePlan {
                name: control_plane_node_name(cluster, index),
                role: NodeRole::ControlPlane,
                index,
                // the single node runs workloads too, so it gets the worker size
                server_type: if solo {
                    config.worker_flavor.clone()
                } else {
                    config.master_flavor.clone()
                },
                public_ipv4: solo,
            })
            .collect();

        let workers: Vec<NodePlan> = (0..spec.worker.node_count)
            .map(|index| NodePlan {
                name: worker_node_name(cluster, index),
                role: NodeRole::Worker,
                index,
                server_type: config.worker_flavor.clone(),
                public_ipv4: false,
            })
            .collect();

        let load_balancer = (!solo).then(|| {
            let mut services = vec![ServicePlan {
                name: format!("lb-service-{}-kube-api-{}", cluster, KUBE_API_PORT),
                listen_port: KUBE_API_PORT,
                destination_port: KUBE_API_PORT,
            }];
            services.extend(spec.load_balancer.port_mappings.iter().map(|(name, ports)| {
                ServicePlan {
                    name: format!("lb-service-{}-{}-{}", cluster, name, ports.source),
                    listen_port: ports.source,
                    destination_port: ports.target,
                }
            }));

            let targets = control_plane
                .iter()
                .map(|node| TargetPlan {
                    name: format!("lb-target-{}-cp-{}", cluster, node.index),
                    node: node.name.clone(),
                })
                .chain(workers.iter().map(|node| TargetPlan {
                    name: format!("lb-target-{}-wrk-{}", cluster, node.index),
                    node: node.name.clone(),
                }))
                .collect();

            LoadBalancerPlan {
                name: format!("load-balancer-{}", cluster),
                network_attachment: format!("lb-network-{}", cluster),
                load_balancer_type: config.lb_type.clone(),
                services,
                targets,
            }
        });

        Self {
            cluster: cluster.to_string(),
            control_plane,
            workers,
            load_balancer,
        }
    }

    pub fn is_solo(&self) -> bool {
        self.total_nodes() <= 1
    }

    pub fn total_nodes(&self) -> usize {
        self.control_plane.len() + self.workers.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodePlan> {
        self.control_plane.iter().chain(self.workers.iter())
    }
}

pub fn control_plane_node_name(cluster: &str, index: u32) -> String {
    format!("control-plane-{}-{}", cluster, index)
}

pub fn worker_node_name(cluster: &str, index: u32) -> String {
    format!("worker-{}-{}", cluster, index)
}
