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

use crate::infrastructure::constants::{
    DEFAULT_PLAYBOOK_COMMAND, DEFAULT_SETTLE_DELAY_SECS, DEFAULT_STATE_DIR, OUTPUTS_FILE,
    PRIVATE_KEY_FILE, STATE_FILE,
};
use crate::shared::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Flat run configuration shared by every cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub worker_flavor: String,
    pub master_flavor: String,
    pub bastion_flavor: String,
    pub image: String,
    pub datacenter: String,
    pub network_zone: String,
    pub lb_type: String,
    pub ssh_user: String,
    pub topology_file: String,
    pub work_dir: PathBuf,
    pub state_dir: PathBuf,
    pub settle_delay_secs: u64,
    pub playbook_dir: PathBuf,
    pub playbook_command: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_flavor: String::new(),
            master_flavor: String::new(),
            bastion_flavor: String::new(),
            image: String::new(),
            datacenter: String::new(),
            network_zone: String::new(),
            lb_type: String::new(),
            ssh_user: String::new(),
            topology_file: String::new(),
            work_dir: PathBuf::from("."),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            settle_delay_secs: DEFAULT_SETTLE_DELAY_SECS,
            playbook_dir: PathBuf::from("."),
            playbook_command: DEFAULT_PLAYBOOK_COMMAND.to_string(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file
    pub fn from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| FleetError::not_found(&display, e))?;
        toml::from_str(&content).map_err(|e| FleetError::invalid(&display, e))
    }

    /// Every setting without a usable default must be present.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("worker_flavor", &self.worker_flavor),
            ("master_flavor", &self.master_flavor),
            ("bastion_flavor", &self.bastion_flavor),
            ("image", &self.image),
            ("datacenter", &self.datacenter),
            ("network_zone", &self.network_zone),
            ("lb_type", &self.lb_type),
            ("ssh_user", &self.ssh_user),
            ("topology_file", &self.topology_file),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(FleetError::missing(key));
            }
        }
        if self.playbook_command.trim().is_empty() {
            return Err(FleetError::missing("playbook_command"));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.state_dir.join(PRIVATE_KEY_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn outputs_path(&self) -> PathBuf {
        self.state_dir.join(OUTPUTS_FILE)
    }

    /// The topology path, relative paths resolved against the config file's directory.
    pub fn topology_path(&self, config_dir: Option<&Path>) -> PathBuf {
        let path = PathBuf::from(&self.topology_file);
        match config_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ConfigError;

    fn sample() -> RunConfig {
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
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.settle_delay(), Duration::from_secs(60));
        assert_eq!(config.playbook_command, "ansible-playbook");
        assert_eq!(
            config.private_key_path(),
            PathBuf::from(".kube-fleet/id_rsa")
        );
    }

    #[test]
    fn test_validate_reports_first_missing_key() {
        assert!(sample().validate().is_ok());

        let mut config = sample();
        config.lb_type = " ".to_string();
        match config.validate() {
            Err(FleetError::Config(ConfigError::Missing(key))) => assert_eq!(key, "lb_type"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(
            &path,
            r#"
worker_flavor = "cx21"
master_flavor = "cx31"
bastion_flavor = "cx11"
image = "ubuntu-22.04"
datacenter = "fsn1-dc14"
network_zone = "eu-central"
lb_type = "lb11"
ssh_user = "root"
topology_file = "topology.yaml"
settle_delay_secs = 5
"#,
        )
        .unwrap();

        let config = RunConfig::from(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.settle_delay_secs, 5);
        assert_eq!(
            config.topology_path(Some(dir.path())),
            dir.path().join("topology.yaml")
        );
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "settle_delay_secs = \"soon\"").unwrap();
        assert!(matches!(
            RunConfig::from(&path),
            Err(FleetError::Config(ConfigError::Invalid { .. }))
        ));
    }
}
