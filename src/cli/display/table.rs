//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::cluster::{ClusterOutcome, ClusterPlan, Endpoints, RunReport};
use crate::infrastructure::kubernetes::{readiness, NodeStatus};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, ContentArrangement, Table};

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    /// Create a new table renderer with default theme
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    /// Render the per-cluster resource plan
    pub fn render_plan(&self, plans: &[ClusterPlan]) -> String {
        if plans.is_empty() {
            return "No clusters with nodes declared".to_string();
        }

        let mut output = String::new();
        for plan in plans {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("RESOURCE").set_alignment(CellAlignment::Left),
                    Cell::new("ROLE").set_alignment(CellAlignment::Left),
                    Cell::new("TYPE").set_alignment(CellAlignment::Left),
                    Cell::new("PUBLIC IP").set_alignment(CellAlignment::Center),
                ]);

            for node in plan.nodes() {
                table.add_row(vec![
                    Cell::new(&node.name),
                    Cell::new(node.role.to_string()),
                    Cell::new(&node.server_type),
                    Cell::new(if node.public_ipv4 { "yes" } else { "no" })
                        .fg(self.theme.get_flag_color(node.public_ipv4))
                        .set_alignment(CellAlignment::Center),
                ]);
            }

            if let Some(lb) = &plan.load_balancer {
                table.add_row(vec![
                    Cell::new(&lb.name),
                    Cell::new("load-balancer"),
                    Cell::new(&lb.load_balancer_type),
                    Cell::new("yes")
                        .fg(self.theme.info)
                        .set_alignment(CellAlignment::Center),
                ]);
                for service in &lb.services {
                    table.add_row(vec![
                        Cell::new(&service.name),
                        Cell::new("lb-service"),
                        Cell::new(format!(
                            "tcp {} -> {}",
                            service.listen_port, service.destination_port
                        )),
                        Cell::new(""),
                    ]);
                }
                for target in &lb.targets {
                    table.add_row(vec![
                        Cell::new(&target.name),
                        Cell::new("lb-target"),
                        Cell::new(&target.node).fg(self.theme.muted),
                        Cell::new(""),
                    ]);
                }
            }

            let mode = if plan.is_solo() {
                "solo".to_string()
            } else {
                format!("{} targets", plan.total_nodes())
            };
            output.push_str(&format!(
                "╭─ Cluster {} {} ─╮\n",
                plan.cluster.bold(),
                format!("[{}]", mode).bright_black()
            ));
            output.push_str(&table.to_string());
            output.push('\n');
        }
        output
    }

    /// Render how each cluster of a run ended up
    pub fn render_run_report(&self, report: &RunReport) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("CLUSTER").set_alignment(CellAlignment::Left),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("TYPE").set_alignment(CellAlignment::Left),
                Cell::new("CLUSTER API").set_alignment(CellAlignment::Left),
                Cell::new("APP").set_alignment(CellAlignment::Left),
            ]);

        for (name, outcome) in &report.outcomes {
            let icon = StatusIcon::get_outcome_icon(outcome);
            let (status, color) = match outcome {
                ClusterOutcome::Ready => ("Ready".to_string(), self.theme.success),
                ClusterOutcome::Failed { stage, error } => {
                    (format!("Failed ({}): {}", stage, error), self.theme.error)
                }
                ClusterOutcome::Skipped { reason } => {
                    (format!("Skipped: {}", reason), self.theme.muted)
                }
            };
            let endpoints = report.outputs.clusters.get(name).map(|secret| &secret.endpoints);

            table.add_row(vec![
                Cell::new(name),
                Cell::new(format!("{} {}", icon, status)).fg(color),
                Cell::new(endpoints.map(|e| e.endpoint_type.clone()).unwrap_or_default()),
                Cell::new(
                    endpoints
                        .map(|e| e.cluster_api.to_string())
                        .unwrap_or_default(),
                ),
                Cell::new(endpoints.map(|e| e.app.to_string()).unwrap_or_default()),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Fleet {} ─╮\n",
            format!("[{} clusters]", report.outcomes.len()).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Bastion: {}  Resources tracked: {}\n",
            report.outputs.bastion_address.to_string().cyan(),
            report.state.resources.len()
        ));
        output
    }

    /// Render the node listing of one cluster
    pub fn render_node_status(
        &self,
        cluster: &str,
        endpoints: &Endpoints,
        nodes: &[NodeStatus],
    ) -> String {
        let (ready, total) = readiness(nodes);
        let overall_color = self.theme.get_ready_color(ready, total);

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("NODE").set_alignment(CellAlignment::Left),
                Cell::new("ROLES").set_alignment(CellAlignment::Left),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("VERSION").set_alignment(CellAlignment::Left),
                Cell::new("INTERNAL IP").set_alignment(CellAlignment::Left),
            ]);

        for node in nodes {
            let (icon, text, color) = if node.ready {
                (StatusIcon::SUCCESS, "Ready", Color::Green)
            } else {
                (StatusIcon::ERROR, "NotReady", Color::Red)
            };
            table.add_row(vec![
                Cell::new(&node.name),
                Cell::new(node.roles.join(",")),
                Cell::new(format!("{} {}", icon, text)).fg(color),
                Cell::new(&node.kubelet_version),
                Cell::new(node.internal_ip.as_deref().unwrap_or("-")),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Cluster {} {} ─╮\n",
            cluster.bold(),
            format!("[{} via {}]", endpoints.endpoint_type, endpoints.cluster_api).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        let summary = format!(
            "{} {} {}/{}",
            StatusIcon::get_ready_icon(ready, total),
            StatusIcon::get_status_text(ready, total),
            ready,
            total
        );
        output.push_str(&match overall_color {
            Color::Green => summary.green().to_string(),
            Color::Yellow => summary.yellow().to_string(),
            Color::Red => summary.red().to_string(),
            _ => summary.bright_black().to_string(),
        });
        output.push('\n');
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{ProvisionState, RunOutputs};
    use crate::domain::config::{ClusterSpec, NodePool, NtpConfig, PortMapping, RunConfig};
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;

    fn spec(control_plane: u32, workers: u32) -> ClusterSpec {
        let mut port_mappings = BTreeMap::new();
        port_mappings.insert("http".to_string(), PortMapping { source: 80, target: 30080 });
        ClusterSpec {
            control_plane: NodePool { node_count: control_plane },
            worker: NodePool { node_count: workers },
            cni: "flannel".to_string(),
            cri: "containerd".to_string(),
            kubernetes_version: "1.23.17-00".to_string(),
            private_registry: None,
            insecure_registries: Vec::new(),
            load_balancer: crate::domain::config::LoadBalancerDef {
                create: true,
                port_mappings,
            },
            ntp: NtpConfig {
                primary: "0.pool.ntp.org".to_string(),
                secondary: "1.pool.ntp.org".to_string(),
            },
        }
    }

    #[test]
    fn test_render_empty_plan() {
        let renderer = TableRenderer::new();
        assert!(renderer.render_plan(&[]).contains("No clusters"));
    }

    #[test]
    fn test_render_plan_lists_every_resource() {
        let renderer = TableRenderer::new();
        let config = RunConfig {
            master_flavor: "cx31".to_string(),
            worker_flavor: "cx21".to_string(),
            lb_type: "lb11".to_string(),
            ..RunConfig::default()
        };
        let plan = ClusterPlan::new("prod", &spec(3, 2), &config);
        let output = renderer.render_plan(&[plan]);

        assert!(output.contains("control-plane-prod-2"));
        assert!(output.contains("worker-prod-1"));
        assert!(output.contains("load-balancer-prod"));
        assert!(output.contains("tcp 80 -> 30080"));
        assert!(output.contains("lb-target-prod-wrk-1"));
    }

    #[test]
    fn test_render_node_status() {
        let renderer = TableRenderer::new();
        let endpoints = Endpoints {
            app: Ipv4Addr::new(203, 0, 113, 11),
            cluster_api: Ipv4Addr::new(203, 0, 113, 11),
            endpoint_type: "NodePort".to_string(),
        };
        let nodes = vec![NodeStatus {
            name: "control-plane-solo-0".to_string(),
            ready: true,
            roles: vec!["control-plane".to_string()],
            kubelet_version: "v1.23.17".to_string(),
            internal_ip: Some("10.0.1.3".to_string()),
        }];

        let output = renderer.render_node_status("solo", &endpoints, &nodes);
        assert!(output.contains("control-plane-solo-0"));
        assert!(output.contains("1/1"));
        assert!(output.contains("203.0.113.11"));
    }

    #[test]
    fn test_render_run_report() {
        let renderer = TableRenderer::new();
        let mut outcomes = BTreeMap::new();
        outcomes.insert("prod".to_string(), ClusterOutcome::Ready);
        outcomes.insert(
            "empty".to_string(),
            ClusterOutcome::Skipped {
                reason: "no nodes declared".to_string(),
            },
        );
        let report = RunReport {
            outputs: RunOutputs::new("key", Ipv4Addr::new(203, 0, 113, 10)),
            state: ProvisionState::default(),
            outcomes,
        };

        let output = renderer.render_run_report(&report);
        assert!(output.contains("prod"));
        assert!(output.contains("Skipped: no nodes declared"));
        assert!(output.contains("203.0.113.10"));
    }
}
