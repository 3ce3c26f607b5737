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

//! Provisioning substrate abstraction.
//!
//! Every declaration returns immediately; the attributes it hands back are
//! [`Output`] futures the substrate resolves later, in its own order, while
//! honouring the dependency edges expressed by the `Output` inputs.
//! Cross-resource references are always numeric [`ResourceId`]s.

mod simulated;

pub use self::simulated::{SimDetail, SimRecord, SimulatedProvider};

use crate::infrastructure::resolve::Output;
use crate::shared::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SshKey,
    Network,
    Subnet,
    Firewall,
    Server,
    Route,
    LoadBalancer,
    LoadBalancerNetwork,
    LoadBalancerService,
    LoadBalancerTarget,
    /// Files produced locally (inventory, credentials); never sent to the provider.
    LocalArtifact,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::SshKey => "ssh_key",
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Firewall => "firewall",
            ResourceKind::Server => "server",
            ResourceKind::Route => "route",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::LoadBalancerNetwork => "load_balancer_network",
            ResourceKind::LoadBalancerService => "load_balancer_service",
            ResourceKind::LoadBalancerTarget => "load_balancer_target",
            ResourceKind::LocalArtifact => "local_artifact",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, ResourceKind::LocalArtifact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub description: Option<String>,
    pub protocol: Protocol,
    /// Single port or an inclusive `low-high` range.
    pub port: String,
    pub source_ips: Vec<String>,
}

pub struct SubnetSpec {
    pub name: String,
    pub network_id: Output<ResourceId>,
    pub network_zone: String,
    pub ip_range: String,
}

pub struct SubnetHandle {
    pub id: Output<ResourceId>,
    pub network_id: Output<ResourceId>,
}

pub struct ServerSpec {
    pub name: String,
    pub image: String,
    pub datacenter: String,
    pub server_type: String,
    pub ssh_key_ids: Vec<Output<ResourceId>>,
    pub network_id: Output<ResourceId>,
    pub firewall_ids: Vec<Output<ResourceId>>,
    pub public_ipv4: bool,
}

/// Attributes of a declared server, resolved in stages: the id first, then
/// the private address once it joined the network, then the public address
/// when one was requested.
#[derive(Clone)]
pub struct ServerHandle {
    pub id: Output<ResourceId>,
    pub private_ip: Output<Ipv4Addr>,
    pub public_ip: Output<Option<Ipv4Addr>>,
}

pub struct RouteSpec {
    pub name: String,
    pub network_id: Output<ResourceId>,
    pub destination: String,
    pub gateway: Output<Ipv4Addr>,
}

pub struct LoadBalancerSpec {
    pub name: String,
    pub load_balancer_type: String,
    pub network_zone: String,
}

#[derive(Clone)]
pub struct LoadBalancerHandle {
    pub id: Output<ResourceId>,
    pub public_ip: Output<Ipv4Addr>,
}

#[derive(Clone)]
pub struct AttachmentHandle {
    pub id: Output<ResourceId>,
    pub private_ip: Output<Ipv4Addr>,
}

pub struct LoadBalancerServiceSpec {
    pub name: String,
    pub load_balancer_id: Output<ResourceId>,
    pub protocol: Protocol,
    pub listen_port: u16,
    pub destination_port: u16,
}

pub struct LoadBalancerTargetSpec {
    pub name: String,
    pub load_balancer_id: Output<ResourceId>,
    pub server_id: Output<ResourceId>,
    pub use_private_ip: bool,
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn create_ssh_key(&self, name: &str, public_key: &str) -> Output<ResourceId>;

    fn create_network(&self, name: &str, ip_range: &str) -> Output<ResourceId>;

    fn create_subnet(&self, spec: SubnetSpec) -> SubnetHandle;

    fn create_firewall(&self, name: &str, rules: Vec<FirewallRule>) -> Output<ResourceId>;

    fn create_server(&self, spec: ServerSpec) -> ServerHandle;

    fn create_route(&self, spec: RouteSpec) -> Output<ResourceId>;

    fn create_load_balancer(&self, spec: LoadBalancerSpec) -> LoadBalancerHandle;

    fn attach_load_balancer_network(
        &self,
        name: &str,
        load_balancer_id: Output<ResourceId>,
        subnet_id: Output<ResourceId>,
    ) -> AttachmentHandle;

    fn create_load_balancer_service(&self, spec: LoadBalancerServiceSpec) -> Output<ResourceId>;

    fn create_load_balancer_target(&self, spec: LoadBalancerTargetSpec) -> Output<ResourceId>;

    /// Remove a resource. Unknown ids are treated as already gone.
    async fn destroy(&self, kind: ResourceKind, id: ResourceId) -> Result<()>;
}
