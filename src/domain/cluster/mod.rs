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

pub mod builder;
pub mod core;
pub mod inventory;
pub mod node;
pub mod orchestrator;
pub mod outputs;
pub mod ownership;
pub mod plan;
pub mod validator;

pub use self::builder::ClusterBuilder;
pub use self::core::{CoreInfrastructure, CoreInfrastructureBuilder};
pub use self::inventory::{FinalizedInventory, PortMappingEntry, SharedInventory};
pub use self::node::{Node, NodeLifecycle, NodeState};
pub use self::orchestrator::{ClusterOrchestrator, ClusterOutcome, RunReport};
pub use self::outputs::{rewrite_server_endpoint, ClusterSecret, Endpoints, RunOutputs};
pub use self::ownership::{ProvisionState, ResourceRecord, ResourceTree};
pub use self::plan::{ClusterPlan, LoadBalancerPlan, NodePlan, NodeRole};
pub use self::validator::TopologyValidator;
