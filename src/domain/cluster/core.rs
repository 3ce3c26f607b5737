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

//! Infrastructure shared by every cluster: keypair, network, firewalls and
//! the bastion that doubles as NAT gateway.

use super::node::{Node, NodeLifecycle};
use super::ownership::ResourceTree;
use crate::domain::config::RunConfig;
use crate::infrastructure::constants::{
    FirewallRole, BASTION_NAME, CORE_SCOPE, DEFAULT_ROUTE, KEYPAIR_NAME, NAT_ROUTE_NAME,
    NETWORK_IP_RANGE, NETWORK_NAME, RSA_KEY_BITS, SUBNET_IP_RANGE, SUBNET_NAME,
};
use crate::infrastructure::keys::SshKeypair;
use crate::infrastructure::provider::{
    FirewallRule, Protocol, Provider, ResourceId, ResourceKind, RouteSpec, ServerHandle,
    ServerSpec, SubnetSpec,
};
use crate::infrastructure::resolve::{Barrier, Output};
use crate::shared::{FleetError, ProviderFailure, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Firewalls {
    pub bastion: Output<ResourceId>,
    pub control_plane: Output<ResourceId>,
    pub worker: Output<ResourceId>,
}

#[derive(Debug, Clone)]
pub struct NetworkHandles {
    pub network_id: Output<ResourceId>,
    pub subnet_id: Output<ResourceId>,
    /// Network id that only resolves once the subnet exists. Servers join
    /// through this, so they never race the subnet.
    pub attach_network_id: Output<ResourceId>,
    pub firewalls: Firewalls,
}

#[derive(Debug, Clone)]
pub struct CoreInfrastructure {
    pub keypair: SshKeypair,
    pub ssh_key_id: Output<ResourceId>,
    pub network: NetworkHandles,
    pub bastion: Output<Node>,
    pub nat_route_id: Output<ResourceId>,
}

pub struct CoreInfrastructureBuilder {
    provider: Arc<dyn Provider>,
    config: RunConfig,
    barrier: Barrier,
    tree: ResourceTree,
    key_bits: u32,
}

impl CoreInfrastructureBuilder {
    pub fn new(
        provider: Arc<dyn Provider>,
        config: &RunConfig,
        barrier: &Barrier,
        tree: &ResourceTree,
    ) -> Self {
        Self {
            provider,
            config: config.clone(),
            barrier: barrier.clone(),
            tree: tree.clone(),
            key_bits: RSA_KEY_BITS,
        }
    }

    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub async fn build(self) -> Result<CoreInfrastructure> {
        let _producer = self.barrier.producer(CORE_SCOPE);

        let (keypair, ssh_key_id) = self.generate_keypair().await?;
        let network = self.setup_network();
        let (bastion, nat_route_id) = self.setup_bastion(&ssh_key_id, &network);

        Ok(CoreInfrastructure {
            keypair,
            ssh_key_id,
            network,
            bastion,
            nat_route_id,
        })
    }

    /// Generate the run keypair, keep the private half on disk and register
    /// the public half with the provider.
    pub async fn generate_keypair(&self) -> Result<(SshKeypair, Output<ResourceId>)> {
        let bits = self.key_bits;
        let keypair = tokio::task::spawn_blocking(move || SshKeypair::generate_rsa(bits))
            .await
            .map_err(|e| FleetError::validation(format!("key generation task failed: {}", e)))??;

        let key_path = self.config.private_key_path();
        keypair.persist_private_key(&key_path)?;
        info!(path = %key_path.display(), "private key written");

        let ssh_key_id = self
            .provider
            .create_ssh_key(KEYPAIR_NAME, keypair.public_key_openssh());
        self.tree.track_with_files(
            ResourceKind::SshKey,
            KEYPAIR_NAME,
            CORE_SCOPE,
            &ssh_key_id,
            vec![key_path],
        );
        // a rejected key takes the whole run down at the barrier
        self.barrier.register(&ssh_key_id);

        Ok((keypair, ssh_key_id))
    }

    pub fn setup_network(&self) -> NetworkHandles {
        let network_id = self.provider.create_network(NETWORK_NAME, NETWORK_IP_RANGE);
        self.tree
            .track(ResourceKind::Network, NETWORK_NAME, CORE_SCOPE, &network_id);

        let subnet = self.provider.create_subnet(SubnetSpec {
            name: SUBNET_NAME.to_string(),
            network_id: network_id.clone(),
            network_zone: self.config.network_zone.clone(),
            ip_range: SUBNET_IP_RANGE.to_string(),
        });
        self.tree
            .track(ResourceKind::Subnet, SUBNET_NAME, CORE_SCOPE, &subnet.id);
        let attach_network_id = subnet.id.join(&subnet.network_id).map(|(_, network)| network);

        let firewalls = Firewalls {
            bastion: self.create_firewall(FirewallRole::Bastion),
            control_plane: self.create_firewall(FirewallRole::ControlPlane),
            worker: self.create_firewall(FirewallRole::Worker),
        };

        info!(
            network = NETWORK_NAME,
            subnet = SUBNET_NAME,
            zone = %self.config.network_zone,
            "network declared"
        );

        NetworkHandles {
            network_id,
            subnet_id: subnet.id,
            attach_network_id,
            firewalls,
        }
    }

    fn create_firewall(&self, role: FirewallRole) -> Output<ResourceId> {
        let name = role.resource_name();
        let id = self.provider.create_firewall(name, firewall_rules(role));
        self.tree.track(ResourceKind::Firewall, name, CORE_SCOPE, &id);
        id
    }

    /// Declare the bastion and route all outbound subnet traffic through it.
    pub fn setup_bastion(
        &self,
        ssh_key_id: &Output<ResourceId>,
        network: &NetworkHandles,
    ) -> (Output<Node>, Output<ResourceId>) {
        let server = self.provider.create_server(ServerSpec {
            name: BASTION_NAME.to_string(),
            image: self.config.image.clone(),
            datacenter: self.config.datacenter.clone(),
            server_type: self.config.bastion_flavor.clone(),
            ssh_key_ids: vec![ssh_key_id.clone()],
            network_id: network.attach_network_id.clone(),
            firewall_ids: vec![network.firewalls.bastion.clone()],
            public_ipv4: true,
        });
        self.tree
            .track(ResourceKind::Server, BASTION_NAME, CORE_SCOPE, &server.id);

        let nat_route_id = self.provider.create_route(RouteSpec {
            name: NAT_ROUTE_NAME.to_string(),
            network_id: network.network_id.clone(),
            destination: DEFAULT_ROUTE.to_string(),
            gateway: server.private_ip.clone(),
        });
        self.tree
            .track(ResourceKind::Route, NAT_ROUTE_NAME, CORE_SCOPE, &nat_route_id);

        let bastion = track_node(BASTION_NAME, true, &server);
        self.barrier.register(&bastion);
        self.barrier.register(&nat_route_id);
        info!(bastion = BASTION_NAME, flavor = %self.config.bastion_flavor, "bastion declared");

        (bastion, nat_route_id)
    }
}

/// Walk a server through its lifecycle as its attributes resolve.
pub(crate) fn track_node(name: &str, exposed: bool, server: &ServerHandle) -> Output<Node> {
    let name = name.to_string();
    let server = server.clone();
    Output::spawn(async move {
        let reject =
            |e: FleetError| ProviderFailure::new(format!("server/{}", name), e.to_string());
        let mut lifecycle = NodeLifecycle::new(name.clone(), exposed);

        lifecycle.provisioned(server.id.await?).map_err(reject)?;
        lifecycle
            .network_attached(server.private_ip.await?)
            .map_err(reject)?;
        match server.public_ip.await? {
            Some(ip) => lifecycle.publicly_exposed(ip).map_err(reject)?,
            None if exposed => {
                return Err(ProviderFailure::new(
                    format!("server/{}", name),
                    "public address requested but never assigned",
                ))
            }
            None => {}
        }
        lifecycle.ready().map_err(reject)
    })
}

pub fn firewall_rules(role: FirewallRole) -> Vec<FirewallRule> {
    role.rows()
        .iter()
        .map(|(proto, port, source, description)| FirewallRule {
            description: description.map(str::to_string),
            protocol: Protocol::parse(proto).unwrap_or(Protocol::Tcp),
            port: port.to_string(),
            source_ips: vec![source.to_string()],
        })
        .collect()
}
