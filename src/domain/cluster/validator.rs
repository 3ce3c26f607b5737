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

use crate::domain::config::{ClusterSpec, Topology};
use crate::infrastructure::constants::{KUBE_API_PORT, SUBNET_HOST_CAPACITY};
use crate::shared::{FleetError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

const MAX_LABEL_LEN: usize = 63;

/// Subnet addresses left for cluster nodes and load balancers once the
/// bastion has its own.
const CLUSTER_ADDRESS_BUDGET: u64 = SUBNET_HOST_CAPACITY - 1;

/// Private addresses a cluster takes from the shared subnet.
fn address_footprint(spec: &ClusterSpec) -> u64 {
    let nodes = spec.total_nodes();
    if nodes > 1 {
        nodes + 1
    } else {
        nodes
    }
}

pub struct TopologyValidator {
    label: Regex,
}

impl TopologyValidator {
    pub fn new() -> Result<Self> {
        let label = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$")
            .map_err(|e| FleetError::validation(format!("invalid label pattern: {}", e)))?;
        Ok(Self { label })
    }

    /// Check every cluster before anything is declared.
    pub fn validate(&self, topology: &Topology) -> Result<()> {
        for (name, spec) in &topology.clusters {
            self.validate_cluster(name, spec)?;
        }

        let used: u64 = topology.clusters.values().map(address_footprint).sum();
        if used > CLUSTER_ADDRESS_BUDGET {
            return Err(FleetError::validation(format!(
                "topology needs {} private addresses but the subnet has {} left after the bastion",
                used, CLUSTER_ADDRESS_BUDGET
            )));
        }
        Ok(())
    }

    pub fn validate_cluster(&self, name: &str, spec: &ClusterSpec) -> Result<()> {
        self.validate_name(name)?;

        if spec.total_nodes() == 0 {
            warn!(cluster = %name, "cluster declares no nodes and will be skipped");
            return Ok(());
        }

        let footprint = address_footprint(spec);
        if footprint > CLUSTER_ADDRESS_BUDGET {
            return Err(FleetError::validation(format!(
                "cluster '{}' needs {} private addresses but the subnet has {}",
                name, footprint, CLUSTER_ADDRESS_BUDGET
            )));
        }

        if spec.worker.node_count > 0 && spec.control_plane.node_count == 0 {
            return Err(FleetError::validation(format!(
                "cluster '{}' declares {} worker(s) but no control-plane node",
                name, spec.worker.node_count
            )));
        }

        if spec.kubernetes_version.trim().is_empty() {
            return Err(FleetError::validation(format!(
                "cluster '{}': kubernetes_version must not be empty",
                name
            )));
        }

        if spec.ntp.primary.trim().is_empty() || spec.ntp.secondary.trim().is_empty() {
            return Err(FleetError::validation(format!(
                "cluster '{}': both ntp.primary and ntp.secondary are required",
                name
            )));
        }

        self.validate_port_mappings(name, spec)?;

        if spec.total_nodes() > 1 && !spec.load_balancer.create {
            warn!(
                cluster = %name,
                "load_balancer.create is false but the cluster has more than one node; a load balancer is created anyway"
            );
        }

        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.len() > MAX_LABEL_LEN || !self.label.is_match(name) {
            return Err(FleetError::validation(format!(
                "cluster name '{}' is not a valid DNS label (lowercase alphanumerics and '-', at most {} characters)",
                name, MAX_LABEL_LEN
            )));
        }
        Ok(())
    }

    fn validate_port_mappings(&self, name: &str, spec: &ClusterSpec) -> Result<()> {
        let mut sources = BTreeSet::new();
        for (mapping, ports) in &spec.load_balancer.port_mappings {
            if ports.source == 0 || ports.target == 0 {
                return Err(FleetError::validation(format!(
                    "cluster '{}': port mapping '{}' uses port 0",
                    name, mapping
                )));
            }
            if ports.source == KUBE_API_PORT {
                return Err(FleetError::validation(format!(
                    "cluster '{}': port mapping '{}' cannot listen on {}, it is reserved for the API server",
                    name, mapping, KUBE_API_PORT
                )));
            }
            if !sources.insert(ports.source) {
                return Err(FleetError::validation(format!(
                    "cluster '{}': source port {} is mapped more than once",
                    name, ports.source
                )));
            }
        }
        Ok(())
    }
}
