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

use crate::infrastructure::provider::ResourceId;
use crate::shared::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::debug;

/// Addresses of a provisioned host as the inventory sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub private_ip: Ipv4Addr,
    pub public_ip: Option<Ipv4Addr>,
}

impl Node {
    pub fn private(private_ip: Ipv4Addr) -> Self {
        Self {
            private_ip,
            public_ip: None,
        }
    }

    pub fn public(private_ip: Ipv4Addr, public_ip: Ipv4Addr) -> Self {
        Self {
            private_ip,
            public_ip: Some(public_ip),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Requested,
    Provisioned,
    NetworkAttached,
    PubliclyExposed,
    Ready,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Requested => "Requested",
            NodeState::Provisioned => "Provisioned",
            NodeState::NetworkAttached => "NetworkAttached",
            NodeState::PubliclyExposed => "PubliclyExposed",
            NodeState::Ready => "Ready",
        };
        write!(f, "{}", s)
    }
}

/// Tracks one server from declaration until the inventory may use it.
///
/// `PubliclyExposed` is only reachable, and then mandatory, for nodes that
/// asked for a public interface.
#[derive(Debug)]
pub struct NodeLifecycle {
    name: String,
    exposed: bool,
    state: NodeState,
    id: Option<ResourceId>,
    private_ip: Option<Ipv4Addr>,
    public_ip: Option<Ipv4Addr>,
}

impl NodeLifecycle {
    pub fn new(name: impl Into<String>, exposed: bool) -> Self {
        Self {
            name: name.into(),
            exposed,
            state: NodeState::Requested,
            id: None,
            private_ip: None,
            public_ip: None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn provisioned(&mut self, id: ResourceId) -> Result<()> {
        self.advance(NodeState::Provisioned)?;
        self.id = Some(id);
        Ok(())
    }

    pub fn network_attached(&mut self, private_ip: Ipv4Addr) -> Result<()> {
        self.advance(NodeState::NetworkAttached)?;
        self.private_ip = Some(private_ip);
        Ok(())
    }

    pub fn publicly_exposed(&mut self, public_ip: Ipv4Addr) -> Result<()> {
        if !self.exposed {
            return Err(FleetError::validation(format!(
                "node '{}' received public address {} without asking for one",
                self.name, public_ip
            )));
        }
        self.advance(NodeState::PubliclyExposed)?;
        self.public_ip = Some(public_ip);
        Ok(())
    }

    /// Finish the lifecycle and hand out the inventory entry.
    pub fn ready(&mut self) -> Result<Node> {
        self.advance(NodeState::Ready)?;
        let private_ip = self.private_ip.ok_or_else(|| {
            FleetError::validation(format!("node '{}' has no private address", self.name))
        })?;
        Ok(Node {
            private_ip,
            public_ip: self.public_ip,
        })
    }

    fn advance(&mut self, next: NodeState) -> Result<()> {
        let allowed = matches!(
            (self.state, next, self.exposed),
            (NodeState::Requested, NodeState::Provisioned, _)
                | (NodeState::Provisioned, NodeState::NetworkAttached, _)
                | (NodeState::NetworkAttached, NodeState::PubliclyExposed, true)
                | (NodeState::NetworkAttached, NodeState::Ready, false)
                | (NodeState::PubliclyExposed, NodeState::Ready, true)
        );
        if !allowed {
            return Err(FleetError::validation(format!(
                "node '{}' cannot move from {} to {}",
                self.name, self.state, next
            )));
        }
        debug!(
            node = %self.name,
            id = ?self.id,
            from = %self.state,
            to = %next,
            "node state changed"
        );
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_node_lifecycle() {
        let mut node = NodeLifecycle::new("worker-prod-0", false);
        node.provisioned(ResourceId(1010)).unwrap();
        node.network_attached(Ipv4Addr::new(10, 0, 1, 5)).unwrap();
        let ready = node.ready().unwrap();
        assert_eq!(node.state(), NodeState::Ready);
        assert_eq!(ready, Node::private(Ipv4Addr::new(10, 0, 1, 5)));
    }

    #[test]
    fn test_exposed_node_must_get_its_public_address() {
        let mut node = NodeLifecycle::new("control-plane-solo-0", true);
        node.provisioned(ResourceId(1010)).unwrap();
        node.network_attached(Ipv4Addr::new(10, 0, 1, 3)).unwrap();
        assert!(node.ready().is_err());

        node.publicly_exposed(Ipv4Addr::new(203, 0, 113, 11)).unwrap();
        let ready = node.ready().unwrap();
        assert_eq!(ready.public_ip, Some(Ipv4Addr::new(203, 0, 113, 11)));
    }

    #[test]
    fn test_illegal_transitions() {
        let mut node = NodeLifecycle::new("worker-prod-1", false);
        assert!(node.network_attached(Ipv4Addr::new(10, 0, 1, 4)).is_err());
        node.provisioned(ResourceId(1011)).unwrap();
        assert!(node.provisioned(ResourceId(1011)).is_err());
        node.network_attached(Ipv4Addr::new(10, 0, 1, 4)).unwrap();
        assert!(node
            .publicly_exposed(Ipv4Addr::new(203, 0, 113, 12))
            .is_err());
        node.ready().unwrap();
        assert!(node.ready().is_err());
    }
}
