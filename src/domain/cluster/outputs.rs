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

use super::inventory::FinalizedInventory;
use crate::infrastructure::constants::{
    ENDPOINT_TYPE_LOAD_BALANCER, ENDPOINT_TYPE_NODE_PORT, KUBE_API_PORT,
};
use crate::infrastructure::keys::write_secret;
use crate::shared::{FleetError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub app: Ipv4Addr,
    #[serde(rename = "cluster-api")]
    pub cluster_api: Ipv4Addr,
    #[serde(rename = "type")]
    pub endpoint_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSecret {
    pub endpoints: Endpoints,
    pub kubeconfig: String,
}

/// Everything a run exports. Contains key material, so it is written
/// owner-readable only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutputs {
    pub clusters: BTreeMap<String, ClusterSecret>,
    pub ssh_private_key: String,
    pub bastion_address: Ipv4Addr,
    pub provisioned_at: DateTime<Utc>,
}

impl Endpoints {
    /// Where clients reach the cluster: the load balancer when there is one,
    /// otherwise the nodes' own public addresses.
    pub fn for_inventory(inventory: &FinalizedInventory) -> Result<Self> {
        if let Some(lb) = &inventory.load_balancer {
            let public = lb.public_ip.ok_or_else(|| {
                FleetError::validation(format!(
                    "load balancer of cluster '{}' has no public address",
                    inventory.cluster_name
                ))
            })?;
            return Ok(Self {
                app: public,
                cluster_api: public,
                endpoint_type: ENDPOINT_TYPE_LOAD_BALANCER.to_string(),
            });
        }

        let cluster_api = inventory
            .control_plane
            .first()
            .and_then(|node| node.public_ip)
            .ok_or_else(|| {
                FleetError::validation(format!(
                    "cluster '{}' has neither a load balancer nor a public control-plane node",
                    inventory.cluster_name
                ))
            })?;
        let app = inventory
            .workers
            .first()
            .and_then(|node| node.public_ip)
            .unwrap_or(cluster_api);

        Ok(Self {
            app,
            cluster_api,
            endpoint_type: ENDPOINT_TYPE_NODE_PORT.to_string(),
        })
    }
}

/// Point every `server:` line of a kubeconfig at `address`.
pub fn rewrite_server_endpoint(kubeconfig: &str, address: Ipv4Addr) -> Result<String> {
    let server = Regex::new(r"server:.*")
        .map_err(|e| FleetError::validation(format!("invalid server pattern: {}", e)))?;
    if !server.is_match(kubeconfig) {
        return Err(FleetError::validation(
            "kubeconfig has no server entry to rewrite",
        ));
    }
    let replacement = format!("server: https://{}:{}", address, KUBE_API_PORT);
    Ok(server
        .replace_all(kubeconfig, regex::NoExpand(&replacement))
        .into_owned())
}

impl RunOutputs {
    pub fn new(ssh_private_key: &str, bastion_address: Ipv4Addr) -> Self {
        Self {
            clusters: BTreeMap::new(),
            ssh_private_key: ssh_private_key.to_string(),
            bastion_address,
            provisioned_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| FleetError::not_found(&display, e))?;
        serde_json::from_str(&content).map_err(|e| FleetError::invalid(&display, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_secret(path, json.as_bytes())
    }
}
