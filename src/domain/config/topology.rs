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

//! Declarative cluster topology

use crate::infrastructure::constants::{DEFAULT_CNI, DEFAULT_CRI};
use crate::shared::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Every cluster to provision, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    pub clusters: BTreeMap<String, ClusterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    pub control_plane: NodePool,
    #[serde(default)]
    pub worker: NodePool,
    #[serde(default = "default_cni")]
    pub cni: String,
    #[serde(default = "default_cri")]
    pub cri: String,
    pub kubernetes_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_registry: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insecure_registries: Vec<String>,
    #[serde(default)]
    pub load_balancer: LoadBalancerDef,
    pub ntp: NtpConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodePool {
    pub node_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancerDef {
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub port_mappings: BTreeMap<String, PortMapping>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    pub source: u16,
    pub target: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NtpConfig {
    pub primary: String,
    pub secondary: String,
}

fn default_cni() -> String {
    DEFAULT_CNI.to_string()
}

fn default_cri() -> String {
    DEFAULT_CRI.to_string()
}

impl ClusterSpec {
    pub fn total_nodes(&self) -> u64 {
        u64::from(self.control_plane.node_count) + u64::from(self.worker.node_count)
    }
}

impl Topology {
    /// Read and parse a topology document. Nothing is applied unless the
    /// whole document parses.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| FleetError::not_found(&display, e))?;
        Self::parse(&content).map_err(|e| FleetError::invalid(&display, e))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
