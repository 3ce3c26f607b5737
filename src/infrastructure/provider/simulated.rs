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

//! In-process provisioning substrate.
//!
//! Allocates numeric ids, private addresses out of the subnet and public
//! addresses out of 203.0.113.0/24 (TEST-NET-3). Each resolution sleeps for the
//! configured latency plus a random jitter so independent resources resolve in
//! an unpredictable order, the same way a real cloud API behaves.

use super::{
    AttachmentHandle, FirewallRule, LoadBalancerHandle, LoadBalancerServiceSpec, LoadBalancerSpec,
    LoadBalancerTargetSpec, Protocol, Provider, ResourceId, ResourceKind, RouteSpec, ServerHandle,
    ServerSpec, SubnetHandle, SubnetSpec,
};
use crate::infrastructure::resolve::{Output, Resolution};
use crate::shared::{FleetError, ProviderFailure, Result};
use futures::future::try_join_all;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const FIRST_PRIVATE_HOST: u8 = 2;
const FIRST_PUBLIC_HOST: u8 = 10;
const LAST_HOST: u8 = 254;

#[derive(Debug, Clone, PartialEq)]
pub enum SimDetail {
    SshKey {
        public_key: String,
    },
    Network {
        ip_range: String,
    },
    Subnet {
        network_id: ResourceId,
        network_zone: String,
        ip_range: String,
    },
    Firewall {
        rules: Vec<FirewallRule>,
    },
    Server {
        server_type: String,
        image: String,
        datacenter: String,
        network_id: ResourceId,
        ssh_key_ids: Vec<ResourceId>,
        firewall_ids: Vec<ResourceId>,
        private_ip: Ipv4Addr,
        public_ip: Option<Ipv4Addr>,
    },
    Route {
        network_id: ResourceId,
        destination: String,
        gateway: Ipv4Addr,
    },
    LoadBalancer {
        load_balancer_type: String,
        network_zone: String,
        public_ip: Ipv4Addr,
    },
    LoadBalancerNetwork {
        load_balancer_id: ResourceId,
        subnet_id: ResourceId,
        private_ip: Ipv4Addr,
    },
    LoadBalancerService {
        load_balancer_id: ResourceId,
        protocol: Protocol,
        listen_port: u16,
        destination_port: u16,
    },
    LoadBalancerTarget {
        load_balancer_id: ResourceId,
        server_id: ResourceId,
        use_private_ip: bool,
    },
}

impl SimDetail {
    /// Ids this resource depends on; those cannot be destroyed first.
    fn references(&self) -> Vec<ResourceId> {
        match self {
            SimDetail::SshKey { .. } | SimDetail::Network { .. } | SimDetail::Firewall { .. } => {
                Vec::new()
            }
            SimDetail::LoadBalancer { .. } => Vec::new(),
            SimDetail::Subnet { network_id, .. } | SimDetail::Route { network_id, .. } => {
                vec![*network_id]
            }
            SimDetail::Server {
                network_id,
                ssh_key_ids,
                firewall_ids,
                ..
            } => {
                let mut refs = vec![*network_id];
                refs.extend(ssh_key_ids);
                refs.extend(firewall_ids);
                refs
            }
            SimDetail::LoadBalancerNetwork {
                load_balancer_id,
                subnet_id,
                ..
            } => vec![*load_balancer_id, *subnet_id],
            SimDetail::LoadBalancerService {
                load_balancer_id, ..
            } => vec![*load_balancer_id],
            SimDetail::LoadBalancerTarget {
                load_balancer_id,
                server_id,
                ..
            } => vec![*load_balancer_id, *server_id],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimRecord {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    pub detail: SimDetail,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    next_private_host: u8,
    next_public_host: u8,
    records: BTreeMap<ResourceId, SimRecord>,
}

struct SimInner {
    state: Mutex<SimState>,
    latency: Duration,
    jitter: Duration,
    failures: Vec<String>,
}

#[derive(Clone)]
pub struct SimulatedProvider {
    inner: Arc<SimInner>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::build(Duration::ZERO, Duration::ZERO, Vec::new())
    }

    pub fn with_latency(self, latency: Duration, jitter: Duration) -> Self {
        Self::build(latency, jitter, self.inner.failures.clone())
    }

    /// Reject every resource whose name starts with `prefix`.
    pub fn fail_on(self, prefix: impl Into<String>) -> Self {
        let mut failures = self.inner.failures.clone();
        failures.push(prefix.into());
        Self::build(self.inner.latency, self.inner.jitter, failures)
    }

    fn build(latency: Duration, jitter: Duration, failures: Vec<String>) -> Self {
        Self {
            inner: Arc::new(SimInner {
                state: Mutex::new(SimState {
                    next_id: 1000,
                    next_private_host: FIRST_PRIVATE_HOST,
                    next_public_host: FIRST_PUBLIC_HOST,
                    records: BTreeMap::new(),
                }),
                latency,
                jitter,
                failures,
            }),
        }
    }

    pub fn records(&self) -> Vec<SimRecord> {
        self.inner.state.lock().records.values().cloned().collect()
    }

    pub fn records_of(&self, kind: ResourceKind) -> Vec<SimRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect()
    }

    pub fn record_named(&self, name: &str) -> Option<SimRecord> {
        self.records().into_iter().find(|r| r.name == name)
    }

    async fn delay(&self) {
        let jitter_ms = self.inner.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        let total = self.inner.latency + Duration::from_millis(extra);
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }

    async fn settle(&self, kind: ResourceKind, name: &str) -> Resolution<()> {
        self.delay().await;
        if self.inner.failures.iter().any(|p| name.starts_with(p)) {
            return Err(ProviderFailure::new(
                format!("{}/{}", kind.as_str(), name),
                "rejected by provider",
            ));
        }
        Ok(())
    }

    fn require(&self, id: ResourceId, kind: ResourceKind, referrer: &str) -> Resolution<()> {
        let state = self.inner.state.lock();
        match state.records.get(&id) {
            Some(record) if record.kind == kind => Ok(()),
            _ => Err(ProviderFailure::new(
                referrer.to_string(),
                format!("unknown {} id {}", kind.as_str(), id),
            )),
        }
    }

    fn insert<F>(&self, kind: ResourceKind, name: &str, detail: F) -> Resolution<ResourceId>
    where
        F: FnOnce(&mut SimState) -> Resolution<SimDetail>,
    {
        let mut state = self.inner.state.lock();
        let detail = detail(&mut state)?;
        state.next_id += 1;
        let id = ResourceId(state.next_id);
        state.records.insert(
            id,
            SimRecord {
                id,
                kind,
                name: name.to_string(),
                detail,
            },
        );
        debug!(kind = kind.as_str(), name, %id, "resource resolved");
        Ok(id)
    }

    fn create<F>(&self, kind: ResourceKind, name: &str, detail: F) -> Output<ResourceId>
    where
        F: FnOnce(&mut SimState) -> Resolution<SimDetail> + Send + 'static,
    {
        let sim = self.clone();
        let name = name.to_string();
        Output::spawn(async move {
            sim.settle(kind, &name).await?;
            sim.insert(kind, &name, detail)
        })
    }
}

fn allocate_private(state: &mut SimState, owner: &str) -> Resolution<Ipv4Addr> {
    if state.next_private_host > LAST_HOST {
        return Err(ProviderFailure::new(owner.to_string(), "subnet exhausted"));
    }
    let ip = Ipv4Addr::new(10, 0, 1, state.next_private_host);
    state.next_private_host += 1;
    Ok(ip)
}

fn allocate_public(state: &mut SimState, owner: &str) -> Resolution<Ipv4Addr> {
    if state.next_public_host > LAST_HOST {
        return Err(ProviderFailure::new(
            owner.to_string(),
            "no public addresses left",
        ));
    }
    let ip = Ipv4Addr::new(203, 0, 113, state.next_public_host);
    state.next_public_host += 1;
    Ok(ip)
}

#[async_trait::async_trait]
impl Provider for SimulatedProvider {
    fn create_ssh_key(&self, name: &str, public_key: &str) -> Output<ResourceId> {
        let public_key = public_key.to_string();
        let owner = name.to_string();
        self.create(ResourceKind::SshKey, name, move |_| {
            if !public_key.starts_with("ssh-") {
                return Err(ProviderFailure::new(owner, "malformed public key"));
            }
            Ok(SimDetail::SshKey { public_key })
        })
    }

    fn create_network(&self, name: &str, ip_range: &str) -> Output<ResourceId> {
        let ip_range = ip_range.to_string();
        self.create(ResourceKind::Network, name, move |_| {
            Ok(SimDetail::Network { ip_range })
        })
    }

    fn create_subnet(&self, spec: SubnetSpec) -> SubnetHandle {
        let sim = self.clone();
        let network = spec.network_id.clone();
        let id = Output::spawn(async move {
            let network_id = spec.network_id.await?;
            sim.require(network_id, ResourceKind::Network, &spec.name)?;
            sim.settle(ResourceKind::Subnet, &spec.name).await?;
            sim.insert(ResourceKind::Subnet, &spec.name, move |_| {
                Ok(SimDetail::Subnet {
                    network_id,
                    network_zone: spec.network_zone,
                    ip_range: spec.ip_range,
                })
            })
        });
        SubnetHandle {
            id,
            network_id: network,
        }
    }

    fn create_firewall(&self, name: &str, rules: Vec<FirewallRule>) -> Output<ResourceId> {
        self.create(ResourceKind::Firewall, name, move |_| {
            Ok(SimDetail::Firewall { rules })
        })
    }

    fn create_server(&self, spec: ServerSpec) -> ServerHandle {
        let sim = self.clone();
        let created: Output<(ResourceId, Ipv4Addr, Option<Ipv4Addr>)> = Output::spawn(async move {
            let ssh_key_ids = try_join_all(spec.ssh_key_ids).await?;
            let network_id = spec.network_id.await?;
            let firewall_ids = try_join_all(spec.firewall_ids).await?;
            sim.require(network_id, ResourceKind::Network, &spec.name)?;
            for key in &ssh_key_ids {
                sim.require(*key, ResourceKind::SshKey, &spec.name)?;
            }
            for firewall in &firewall_ids {
                sim.require(*firewall, ResourceKind::Firewall, &spec.name)?;
            }
            sim.settle(ResourceKind::Server, &spec.name).await?;

            let owner = spec.name.clone();
            let mut addresses = (Ipv4Addr::UNSPECIFIED, None);
            let id = sim.insert(ResourceKind::Server, &spec.name, |state| {
                let private_ip = allocate_private(state, &owner)?;
                let public_ip = if spec.public_ipv4 {
                    Some(allocate_public(state, &owner)?)
                } else {
                    None
                };
                addresses = (private_ip, public_ip);
                Ok(SimDetail::Server {
                    server_type: spec.server_type,
                    image: spec.image,
                    datacenter: spec.datacenter,
                    network_id,
                    ssh_key_ids,
                    firewall_ids,
                    private_ip,
                    public_ip,
                })
            })?;
            Ok((id, addresses.0, addresses.1))
        });

        let id = created.map(|(id, _, _)| id);
        let attach = self.clone();
        let private_ip = created.and_then(move |(_, ip, _)| async move {
            attach.delay().await;
            Ok(ip)
        });
        let expose = self.clone();
        let public_ip = private_ip
            .join(&created)
            .and_then(move |(_, (_, _, public))| async move {
                if public.is_some() {
                    expose.delay().await;
                }
                Ok(public)
            });

        ServerHandle {
            id,
            private_ip,
            public_ip,
        }
    }

    fn create_route(&self, spec: RouteSpec) -> Output<ResourceId> {
        let sim = self.clone();
        Output::spawn(async move {
            let network_id = spec.network_id.await?;
            let gateway = spec.gateway.await?;
            sim.require(network_id, ResourceKind::Network, &spec.name)?;
            sim.settle(ResourceKind::Route, &spec.name).await?;
            sim.insert(ResourceKind::Route, &spec.name, move |_| {
                Ok(SimDetail::Route {
                    network_id,
                    destination: spec.destination,
                    gateway,
                })
            })
        })
    }

    fn create_load_balancer(&self, spec: LoadBalancerSpec) -> LoadBalancerHandle {
        let sim = self.clone();
        let created: Output<(ResourceId, Ipv4Addr)> = Output::spawn(async move {
            sim.settle(ResourceKind::LoadBalancer, &spec.name).await?;
            let owner = spec.name.clone();
            let mut public = Ipv4Addr::UNSPECIFIED;
            let id = sim.insert(ResourceKind::LoadBalancer, &spec.name, |state| {
                public = allocate_public(state, &owner)?;
                Ok(SimDetail::LoadBalancer {
                    load_balancer_type: spec.load_balancer_type,
                    network_zone: spec.network_zone,
                    public_ip: public,
                })
            })?;
            Ok((id, public))
        });
        LoadBalancerHandle {
            id: created.map(|(id, _)| id),
            public_ip: created.map(|(_, ip)| ip),
        }
    }

    fn attach_load_balancer_network(
        &self,
        name: &str,
        load_balancer_id: Output<ResourceId>,
        subnet_id: Output<ResourceId>,
    ) -> AttachmentHandle {
        let sim = self.clone();
        let name = name.to_string();
        let created: Output<(ResourceId, Ipv4Addr)> = Output::spawn(async move {
            let (load_balancer_id, subnet_id) =
                futures::future::try_join(load_balancer_id, subnet_id).await?;
            sim.require(load_balancer_id, ResourceKind::LoadBalancer, &name)?;
            sim.require(subnet_id, ResourceKind::Subnet, &name)?;
            sim.settle(ResourceKind::LoadBalancerNetwork, &name).await?;
            let owner = name.clone();
            let mut private = Ipv4Addr::UNSPECIFIED;
            let id = sim.insert(ResourceKind::LoadBalancerNetwork, &name, |state| {
                private = allocate_private(state, &owner)?;
                Ok(SimDetail::LoadBalancerNetwork {
                    load_balancer_id,
                    subnet_id,
                    private_ip: private,
                })
            })?;
            Ok((id, private))
        });
        AttachmentHandle {
            id: created.map(|(id, _)| id),
            private_ip: created.map(|(_, ip)| ip),
        }
    }

    fn create_load_balancer_service(&self, spec: LoadBalancerServiceSpec) -> Output<ResourceId> {
        let sim = self.clone();
        Output::spawn(async move {
            let load_balancer_id = spec.load_balancer_id.await?;
            sim.require(load_balancer_id, ResourceKind::LoadBalancer, &spec.name)?;
            sim.settle(ResourceKind::LoadBalancerService, &spec.name)
                .await?;
            sim.insert(ResourceKind::LoadBalancerService, &spec.name, move |_| {
                Ok(SimDetail::LoadBalancerService {
                    load_balancer_id,
                    protocol: spec.protocol,
                    listen_port: spec.listen_port,
                    destination_port: spec.destination_port,
                })
            })
        })
    }

    fn create_load_balancer_target(&self, spec: LoadBalancerTargetSpec) -> Output<ResourceId> {
        let sim = self.clone();
        Output::spawn(async move {
            let (load_balancer_id, server_id) =
                futures::future::try_join(spec.load_balancer_id, spec.server_id).await?;
            sim.require(load_balancer_id, ResourceKind::LoadBalancer, &spec.name)?;
            sim.require(server_id, ResourceKind::Server, &spec.name)?;
            sim.settle(ResourceKind::LoadBalancerTarget, &spec.name)
                .await?;
            sim.insert(ResourceKind::LoadBalancerTarget, &spec.name, move |_| {
                Ok(SimDetail::LoadBalancerTarget {
                    load_balancer_id,
                    server_id,
                    use_private_ip: spec.use_private_ip,
                })
            })
        })
    }

    async fn destroy(&self, kind: ResourceKind, id: ResourceId) -> Result<()> {
        self.delay().await;
        let mut state = self.inner.state.lock();
        let Some(record) = state.records.get(&id) else {
            debug!(kind = kind.as_str(), %id, "resource already gone");
            return Ok(());
        };
        let name = record.name.clone();
        if let Some(user) = state
            .records
            .values()
            .find(|other| other.detail.references().contains(&id))
        {
            return Err(FleetError::provider(
                format!("{}/{}", kind.as_str(), name),
                format!("still referenced by {}", user.name),
            ));
        }
        state.records.remove(&id);
        debug!(kind = kind.as_str(), name = %name, %id, "resource destroyed");
        Ok(())
    }
}
