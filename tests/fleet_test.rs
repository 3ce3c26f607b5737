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

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use kube_fleet::domain::cluster::{ClusterOutcome, ProvisionState};
    use kube_fleet::infrastructure::command::{CommandOutput, CommandSpec, INSTALL_STEP};
    use kube_fleet::infrastructure::materialize::DEFAULT_VARIABLES_TEMPLATE;
    use kube_fleet::infrastructure::provider::{ResourceKind, SimDetail};
    use kube_fleet::*;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    const PROD: &str = r#"
clusters:
  prod:
    control_plane:
      node_count: 3
    worker:
      node_count: 2
    cni: calico
    kubernetes_version: 1.23.17-00
    insecure_registries:
      - registry.internal:5000
    load_balancer:
      create: true
      port_mappings:
        http:
          source: 80
          target: 30080
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
"#;

    const SOLO: &str = r#"
clusters:
  solo:
    control_plane:
      node_count: 1
    worker:
      node_count: 0
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
"#;

    const MIXED: &str = r#"
clusters:
  alpha:
    control_plane:
      node_count: 1
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
  beta:
    control_plane:
      node_count: 1
    worker:
      node_count: 1
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
  empty:
    control_plane:
      node_count: 0
    kubernetes_version: 1.23.17-00
    ntp:
      primary: 0.pool.ntp.org
      secondary: 1.pool.ntp.org
"#;

    /// Stands in for ansible: records every invocation, fails the clusters
    /// it is told to, and leaves a kubeconfig behind after a good install.
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        failing: Vec<String>,
    }

    impl RecordingRunner {
        fn failing(cluster: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: vec![cluster.to_string()],
            }
        }

        fn steps(&self) -> Vec<(String, String)> {
            self.calls
                .lock()
                .iter()
                .map(|c| (c.cluster.clone(), c.step.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().push(spec.clone());
            if self.failing.contains(&spec.cluster) {
                return Ok(CommandOutput {
                    status: 2,
                    stdout: String::new(),
                    stderr: "UNREACHABLE! => ssh: connect to host".to_string(),
                });
            }
            if spec.step == INSTALL_STEP {
                std::fs::write(
                    spec.work_dir.join(format!("cluster-{}.kubeconfig", spec.cluster)),
                    "apiVersion: v1\nclusters:\n- cluster:\n    server: https://OLD:6443\n  name: kubernetes\n",
                )?;
            }
            Ok(CommandOutput {
                status: 0,
                stdout: "ok".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn run_config(root: &Path) -> RunConfig {
        RunConfig {
            worker_flavor: "cx21".to_string(),
            master_flavor: "cx31".to_string(),
            bastion_flavor: "cx11".to_string(),
            image: "ubuntu-22.04".to_string(),
            datacenter: "fsn1-dc14".to_string(),
            network_zone: "eu-central".to_string(),
            lb_type: "lb11".to_string(),
            ssh_user: "root".to_string(),
            topology_file: "topology.yaml".to_string(),
            work_dir: root.join("work"),
            state_dir: root.join("state"),
            settle_delay_secs: 0,
            playbook_dir: PathBuf::from("playbooks"),
            ..RunConfig::default()
        }
    }

    fn orchestrator(
        sim: &SimulatedProvider,
        runner: Arc<RecordingRunner>,
        config: &RunConfig,
        topology: &str,
    ) -> ClusterOrchestrator {
        ClusterOrchestrator::new(
            Arc::new(sim.clone()),
            runner,
            config.clone(),
            Topology::parse(topology).unwrap(),
        )
        .unwrap()
        .with_key_bits(2048)
    }

    fn group<'a>(ini: &'a str, name: &str) -> Vec<&'a str> {
        let header = format!("[{}]", name);
        ini.lines()
            .skip_while(|line| *line != header)
            .skip(1)
            .take_while(|line| !line.starts_with('['))
            .filter(|line| !line.trim().is_empty())
            .collect()
    }

    fn public_ip_of(sim: &SimulatedProvider, name: &str) -> Ipv4Addr {
        match sim.record_named(name).unwrap().detail {
            SimDetail::LoadBalancer { public_ip, .. } => public_ip,
            SimDetail::Server {
                public_ip: Some(ip),
                ..
            } => ip,
            other => panic!("{} has no public address: {:?}", name, other),
        }
    }

    #[tokio::test]
    async fn test_multi_node_cluster_behind_load_balancer() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new()
            .with_latency(Duration::from_millis(1), Duration::from_millis(4));
        let runner = Arc::new(RecordingRunner::default());

        let report = orchestrator(&sim, runner.clone(), &config, PROD)
            .run()
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes["prod"], ClusterOutcome::Ready);

        // nodes: 3 control-plane and 2 workers, none public
        let servers: Vec<_> = sim
            .records_of(ResourceKind::Server)
            .into_iter()
            .filter(|r| r.name.contains("-prod-"))
            .collect();
        assert_eq!(servers.len(), 5);
        for server in &servers {
            match &server.detail {
                SimDetail::Server {
                    public_ip,
                    server_type,
                    ..
                } => {
                    assert!(public_ip.is_none(), "{} is public", server.name);
                    let expected = if server.name.starts_with("control-plane") {
                        "cx31"
                    } else {
                        "cx21"
                    };
                    assert_eq!(server_type, expected);
                }
                other => panic!("unexpected detail {:?}", other),
            }
        }

        let mut services: Vec<_> = sim
            .records_of(ResourceKind::LoadBalancerService)
            .into_iter()
            .map(|r| match r.detail {
                SimDetail::LoadBalancerService {
                    listen_port,
                    destination_port,
                    ..
                } => (listen_port, destination_port),
                other => panic!("unexpected detail {:?}", other),
            })
            .collect();
        services.sort();
        assert_eq!(services, vec![(80, 30080), (6443, 6443)]);
        assert_eq!(sim.records_of(ResourceKind::LoadBalancerTarget).len(), 5);

        // inventory groups 3/2/1
        let hosts = std::fs::read_to_string(config.work_dir.join("inventory-prod.ini")).unwrap();
        assert_eq!(group(&hosts, "control_plane").len(), 3);
        assert_eq!(group(&hosts, "worker").len(), 2);
        assert_eq!(group(&hosts, "bastion").len(), 1);

        let vars: serde_yaml::Value = serde_yaml::from_str(
            &std::fs::read_to_string(config.work_dir.join("variables-prod.yaml")).unwrap(),
        )
        .unwrap();
        assert_eq!(vars["cni"], "calico");
        assert_eq!(vars["insecure_registries"][0], "registry.internal:5000");

        // endpoints and credential point at the load balancer
        let lb_ip = public_ip_of(&sim, "load-balancer-prod");
        let secret = &report.outputs.clusters["prod"];
        assert_eq!(secret.endpoints.endpoint_type, "LoadBalancer");
        assert_eq!(secret.endpoints.cluster_api, lb_ip);
        assert_eq!(secret.endpoints.app, lb_ip);
        let expected_server = format!("server: https://{}:6443", lb_ip);
        assert!(secret.kubeconfig.contains(&expected_server));
        let on_disk =
            std::fs::read_to_string(config.work_dir.join("cluster-prod.kubeconfig")).unwrap();
        assert_eq!(on_disk, secret.kubeconfig);

        assert_eq!(report.outputs.bastion_address, public_ip_of(&sim, "jump-server"));
        assert!(report.outputs.ssh_private_key.contains("PRIVATE KEY"));
        assert!(config.outputs_path().exists());
        assert!(config.state_path().exists());

        // bastion step strictly before install, with the generated inventory
        assert_eq!(
            runner.steps(),
            vec![
                ("prod".to_string(), "bastion".to_string()),
                ("prod".to_string(), "install".to_string())
            ]
        );
        let install = runner.calls.lock()[1].clone();
        assert!(install.args.contains(&"./inventory-prod.ini".to_string()));
        assert!(install.args.contains(&"@variables-prod.yaml".to_string()));
        assert_eq!(install.work_dir, config.work_dir);
    }

    #[tokio::test]
    async fn test_solo_node_is_its_own_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new();
        let runner = Arc::new(RecordingRunner::default());

        let report = orchestrator(&sim, runner, &config, SOLO).run().await.unwrap();
        assert!(report.is_success());
        assert!(sim.records_of(ResourceKind::LoadBalancer).is_empty());

        let node_ip = public_ip_of(&sim, "control-plane-solo-0");
        let secret = &report.outputs.clusters["solo"];
        assert_eq!(secret.endpoints.endpoint_type, "NodePort");
        assert_eq!(secret.endpoints.cluster_api, node_ip);
        assert!(secret
            .kubeconfig
            .contains(&format!("server: https://{}:6443", node_ip)));
        assert!(!secret.kubeconfig.contains("OLD"));

        let hosts = std::fs::read_to_string(config.work_dir.join("inventory-solo.ini")).unwrap();
        let control_plane = group(&hosts, "control_plane");
        assert_eq!(control_plane.len(), 1);
        assert!(control_plane[0].contains(&format!("public_ip={}", node_ip)));
        assert!(group(&hosts, "worker").is_empty());
    }

    #[tokio::test]
    async fn test_failed_install_is_not_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new();
        let runner = Arc::new(RecordingRunner::failing("alpha"));

        let report = orchestrator(&sim, runner.clone(), &config, MIXED)
            .run()
            .await
            .unwrap();

        assert!(!report.is_success());
        match &report.outcomes["alpha"] {
            ClusterOutcome::Failed { stage, error } => {
                assert_eq!(stage, "install");
                assert!(error.contains("bastion-alpha"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(report.outcomes["beta"], ClusterOutcome::Skipped { .. }));
        assert!(matches!(report.outcomes["empty"], ClusterOutcome::Skipped { .. }));

        // the chain stopped at the failed bastion step
        assert_eq!(
            runner.steps(),
            vec![("alpha".to_string(), "bastion".to_string())]
        );
        assert!(report.outputs.clusters.is_empty());
        assert!(!config.work_dir.join("cluster-alpha.kubeconfig").exists());

        // both inventories were still materialized
        assert!(config.work_dir.join("inventory-alpha.ini").exists());
        assert!(config.work_dir.join("inventory-beta.ini").exists());
        assert!(!config.work_dir.join("inventory-empty.ini").exists());
    }

    #[tokio::test]
    async fn test_template_failure_fails_only_that_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new();
        let runner = Arc::new(RecordingRunner::default());
        let topology = format!("{}{}", PROD, SOLO.replace("clusters:\n", ""));

        // solo has no load balancer, so strict rendering fails for it alone
        let materializer = InventoryMaterializer::with_templates(
            "{{cluster_name}} {{load_balancer.public_ip}}\n",
            DEFAULT_VARIABLES_TEMPLATE,
        )
        .unwrap();
        let report = orchestrator(&sim, runner.clone(), &config, &topology)
            .with_materializer(materializer)
            .run()
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.outcomes["prod"], ClusterOutcome::Ready);
        match &report.outcomes["solo"] {
            ClusterOutcome::Failed { stage, .. } => assert_eq!(stage, "materialize"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.failures().len(), 1);

        // solo never reached configuration management
        assert!(runner.steps().iter().all(|(cluster, _)| cluster == "prod"));
        assert_eq!(runner.steps().len(), 2);
        assert!(!config.work_dir.join("inventory-solo.ini").exists());
        assert!(report.outputs.clusters.contains_key("prod"));
        assert!(!report.outputs.clusters.contains_key("solo"));
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_but_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new().fail_on("worker-prod-1");
        let runner = Arc::new(RecordingRunner::default());

        let err = orchestrator(&sim, runner.clone(), &config, PROD)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Provider { .. } | FleetError::Barrier(_)));

        // nothing was rendered or handed off
        assert!(runner.steps().is_empty());
        assert!(!config.work_dir.join("inventory-prod.ini").exists());
        assert!(!config.outputs_path().exists());

        let state = ProvisionState::load(&config.state_path()).unwrap();
        assert!(!state.is_empty());
        assert!(state.resources.iter().all(|r| r.name != "worker-prod-1"));
        assert!(state.resources.iter().any(|r| r.name == "worker-prod-0"));
    }

    #[tokio::test]
    async fn test_destroy_removes_resources_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new();
        let runner = Arc::new(RecordingRunner::default());

        let report = orchestrator(&sim, runner, &config, PROD).run().await.unwrap();
        assert!(report.is_success());
        assert!(!sim.records().is_empty());

        let mut state = ProvisionState::load(&config.state_path()).unwrap();
        assert_eq!(state, report.state);
        let destroyed = state.teardown(&sim).await.unwrap();

        assert_eq!(destroyed, report.state.resources.len());
        assert!(state.is_empty());
        assert!(sim.records().is_empty());
        for file in [
            "inventory-prod.ini",
            "variables-prod.yaml",
            "cluster-prod.kubeconfig",
        ] {
            assert!(!config.work_dir.join(file).exists(), "{} left behind", file);
        }
        assert!(!config.private_key_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_topology_is_rejected_before_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let sim = SimulatedProvider::new();
        let runner = Arc::new(RecordingRunner::default());
        let topology = PROD.replace("  prod:", "  Prod_Cluster:");

        let err = orchestrator(&sim, runner, &config, &topology)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
        assert!(sim.records().is_empty());
    }
}
