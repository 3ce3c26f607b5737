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

use crate::shared::{FleetError, Result};
use backon::{ExponentialBuilder, Retryable};
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, warn};

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// What `status` reports for one Kubernetes node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub name: String,
    pub ready: bool,
    pub roles: Vec<String>,
    pub kubelet_version: String,
    pub internal_ip: Option<String>,
}

#[async_trait::async_trait]
pub trait ClusterStatusClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeStatus>>;
}

pub struct FleetKubeClient {
    client: Client,
    cluster: String,
    max_attempts: usize,
}

impl FleetKubeClient {
    /// Build a client from kubeconfig text, as exported in `outputs.json`.
    pub async fn from_kubeconfig_yaml(cluster: &str, yaml: &str) -> Result<Self> {
        let kubeconfig = Kubeconfig::from_yaml(yaml).map_err(|e| {
            FleetError::Kube(format!("Failed to parse kubeconfig of '{}': {}", cluster, e))
        })?;
        Self::from_kubeconfig(cluster, kubeconfig).await
    }

    async fn from_kubeconfig(cluster: &str, kubeconfig: Kubeconfig) -> Result<Self> {
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| FleetError::Kube(format!("Failed to create Kubernetes config: {}", e)))?;
        let client = Client::try_from(config)
            .map_err(|e| FleetError::Kube(format!("Failed to create Kubernetes client: {}", e)))?;

        Ok(Self {
            client,
            cluster: cluster.to_string(),
            max_attempts: 3,
        })
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    async fn list_once(&self) -> std::result::Result<Vec<Node>, kube::Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.list(&ListParams::default()).await.map(|list| list.items)
    }
}

#[async_trait::async_trait]
impl ClusterStatusClient for FleetKubeClient {
    async fn list_nodes(&self) -> Result<Vec<NodeStatus>> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_times(self.max_attempts);

        let nodes = (|| self.list_once())
            .retry(&backoff)
            .when(is_transient)
            .notify(|err, delay| {
                warn!(
                    cluster = %self.cluster,
                    error = %err,
                    ?delay,
                    "listing nodes failed, retrying"
                );
            })
            .await?;

        debug!(cluster = %self.cluster, nodes = nodes.len(), "nodes listed");
        let mut statuses: Vec<NodeStatus> = nodes.iter().map(node_status).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }
}

/// API errors are final except for throttling and server-side failures.
fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => response.code == 429 || response.code >= 500,
        _ => true,
    }
}

pub fn node_status(node: &Node) -> NodeStatus {
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let mut roles: Vec<String> = node
        .metadata
        .labels
        .as_ref()
        .map(|labels| {
            labels
                .keys()
                .filter_map(|key| key.strip_prefix(ROLE_LABEL_PREFIX))
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if roles.is_empty() {
        roles.push("worker".to_string());
    }

    let kubelet_version = status
        .and_then(|s| s.node_info.as_ref())
        .map(|info| info.kubelet_version.clone())
        .unwrap_or_default();

    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addresses| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone());

    NodeStatus {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready,
        roles,
        kubelet_version,
        internal_ip,
    }
}

/// `(ready, total)` over a node listing.
pub fn readiness(nodes: &[NodeStatus]) -> (usize, usize) {
    (nodes.iter().filter(|n| n.ready).count(), nodes.len())
}
