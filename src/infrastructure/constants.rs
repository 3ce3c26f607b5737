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

/// Address plan
pub const NETWORK_IP_RANGE: &str = "10.0.0.0/16";
pub const SUBNET_IP_RANGE: &str = "10.0.1.0/24";
pub const SUBNET_TYPE: &str = "cloud";
/// Private addresses the subnet hands out, .2 through .254
pub const SUBNET_HOST_CAPACITY: u64 = 253;
pub const ANYWHERE: &str = "0.0.0.0/0";
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Kubernetes API
pub const KUBE_API_PORT: u16 = 6443;

/// Resource names shared by every cluster
pub const KEYPAIR_NAME: &str = "kube-fleet";
pub const NETWORK_NAME: &str = "kube-fleet-network";
pub const SUBNET_NAME: &str = "kube-fleet-network-subnet";
pub const BASTION_NAME: &str = "jump-server";
pub const BASTION_FIREWALL_NAME: &str = "jump-server-firewall";
pub const WORKER_FIREWALL_NAME: &str = "worker-firewall";
pub const CONTROL_PLANE_FIREWALL_NAME: &str = "control-plane-firewall";
pub const NAT_ROUTE_NAME: &str = "nat-route";

/// Scopes in the ownership tree
pub const CORE_SCOPE: &str = "core";

/// Load balancer
pub const LB_TARGET_TYPE_SERVER: &str = "server";

/// Defaults applied to topology entries
pub const DEFAULT_CNI: &str = "flannel";
pub const DEFAULT_CRI: &str = "containerd";

/// Local state
pub const DEFAULT_STATE_DIR: &str = ".kube-fleet";
pub const PRIVATE_KEY_FILE: &str = "id_rsa";
pub const STATE_FILE: &str = "state.json";
pub const OUTPUTS_FILE: &str = "outputs.json";
pub const STAGING_DIR: &str = ".staging";
pub const SECRET_FILE_MODE: u32 = 0o600;
pub const RSA_KEY_BITS: u32 = 4096;

/// Configuration management handoff
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 60;
pub const DEFAULT_PLAYBOOK_COMMAND: &str = "ansible-playbook";
pub const BASTION_PLAYBOOK: &str = "bastion.yaml";
pub const INSTALL_PLAYBOOK: &str = "install.yaml";
pub const HOST_KEY_CHECKING_ENV: &str = "ANSIBLE_HOST_KEY_CHECKING";

/// Endpoint types exported per cluster
pub const ENDPOINT_TYPE_LOAD_BALANCER: &str = "LoadBalancer";
pub const ENDPOINT_TYPE_NODE_PORT: &str = "NodePort";

pub fn inventory_file_name(cluster: &str) -> String {
    format!("inventory-{}.ini", cluster)
}

pub fn variables_file_name(cluster: &str) -> String {
    format!("variables-{}.yaml", cluster)
}

pub fn kubeconfig_file_name(cluster: &str) -> String {
    format!("cluster-{}.kubeconfig", cluster)
}

/// Firewall role, one rule set each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallRole {
    Bastion,
    Worker,
    ControlPlane,
}

/// One row of the fixed firewall table: protocol, port (or range), source, description.
pub type FirewallRow = (&'static str, &'static str, &'static str, Option<&'static str>);

pub const BASTION_RULES: &[FirewallRow] = &[("tcp", "22", ANYWHERE, None)];

// workers are reachable only from inside the subnet (bastion and load balancer)
pub const WORKER_RULES: &[FirewallRow] = &[
    ("tcp", "10250", SUBNET_IP_RANGE, Some("Kubelet API")),
    ("tcp", "30000-32767", SUBNET_IP_RANGE, Some("worker NodePorts")),
    ("tcp", "22", SUBNET_IP_RANGE, None),
];

pub const CONTROL_PLANE_RULES: &[FirewallRow] = &[
    ("tcp", "22", SUBNET_IP_RANGE, None),
    ("tcp", "30000-32767", SUBNET_IP_RANGE, Some("control-plane NodePorts")),
    ("tcp", "6443", ANYWHERE, Some("Kubernetes API server")),
    ("tcp", "2379-2380", SUBNET_IP_RANGE, Some("etcd server client API")),
    ("tcp", "10250", SUBNET_IP_RANGE, Some("Kubelet API")),
    ("tcp", "10259", SUBNET_IP_RANGE, Some("kube-scheduler")),
    ("tcp", "10257", SUBNET_IP_RANGE, Some("kube-controller-manager")),
    ("udp", "8285", SUBNET_IP_RANGE, Some("flannel")),
];

impl FirewallRole {
    pub fn resource_name(&self) -> &'static str {
        match self {
            FirewallRole::Bastion => BASTION_FIREWALL_NAME,
            FirewallRole::Worker => WORKER_FIREWALL_NAME,
            FirewallRole::ControlPlane => CONTROL_PLANE_FIREWALL_NAME,
        }
    }

    pub fn rows(&self) -> &'static [FirewallRow] {
        match self {
            FirewallRole::Bastion => BASTION_RULES,
            FirewallRole::Worker => WORKER_RULES,
            FirewallRole::ControlPlane => CONTROL_PLANE_RULES,
        }
    }
}
