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

use crate::domain::config::RunConfig;
use crate::shared::{FleetError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Parse `-D key=value` properties.
pub fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();

    for config in configs {
        let Some((key, value)) = config.split_once('=') else {
            return Err(FleetError::invalid(
                "-D",
                format!("'{}' is not in 'key=value' form", config),
            ));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(FleetError::invalid("-D", format!("empty key in '{}'", config)));
        }

        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

pub fn apply_to_run_config(
    configs: &HashMap<String, String>,
    run_config: &mut RunConfig,
) -> Result<()> {
    for (key, value) in configs {
        match key.as_str() {
            "fleet.worker-flavor" => run_config.worker_flavor = value.clone(),
            "fleet.master-flavor" => run_config.master_flavor = value.clone(),
            "fleet.bastion-flavor" => run_config.bastion_flavor = value.clone(),
            "fleet.image" => run_config.image = value.clone(),
            "fleet.datacenter" => run_config.datacenter = value.clone(),
            "fleet.network-zone" => run_config.network_zone = value.clone(),
            "fleet.lb-type" => run_config.lb_type = value.clone(),
            "fleet.ssh-user" => run_config.ssh_user = value.clone(),
            "fleet.topology-file" => run_config.topology_file = value.clone(),
            "fleet.work-dir" => run_config.work_dir = PathBuf::from(value),
            "fleet.state-dir" => run_config.state_dir = PathBuf::from(value),
            "fleet.playbook-dir" => run_config.playbook_dir = PathBuf::from(value),
            "fleet.playbook-command" => run_config.playbook_command = value.clone(),
            "fleet.settle-delay" => {
                run_config.settle_delay_secs = value.parse().map_err(|_| {
                    FleetError::invalid(key, format!("'{}' is not a number of seconds", value))
                })?
            }
            _ => {
                return Err(FleetError::invalid(
                    key,
                    "unknown property; expected a fleet.* run setting",
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dynamic_configs() {
        let configs = vec![
            "fleet.image=ubuntu-24.04".to_string(),
            " fleet.settle-delay = 0 ".to_string(),
            "fleet.ssh-user=admin=1".to_string(),
        ];
        let map = parse_dynamic_configs(&configs).unwrap();
        assert_eq!(map["fleet.image"], "ubuntu-24.04");
        assert_eq!(map["fleet.settle-delay"], "0");
        assert_eq!(map["fleet.ssh-user"], "admin=1");
    }

    #[test]
    fn test_parse_rejects_malformed_entries() {
        assert!(parse_dynamic_configs(&["fleet.image".to_string()]).is_err());
        assert!(parse_dynamic_configs(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = RunConfig::default();
        let map = parse_dynamic_configs(&[
            "fleet.lb-type=lb21".to_string(),
            "fleet.settle-delay=0".to_string(),
            "fleet.work-dir=/srv/fleet".to_string(),
        ])
        .unwrap();
        apply_to_run_config(&map, &mut config).unwrap();
        assert_eq!(config.lb_type, "lb21");
        assert_eq!(config.settle_delay_secs, 0);
        assert_eq!(config.work_dir, PathBuf::from("/srv/fleet"));
    }

    #[test]
    fn test_apply_rejects_unknown_and_bad_values() {
        let mut config = RunConfig::default();
        let unknown = parse_dynamic_configs(&["kubernetes.master.cpu=2".to_string()]).unwrap();
        assert!(apply_to_run_config(&unknown, &mut config).is_err());

        let bad = parse_dynamic_configs(&["fleet.settle-delay=soon".to_string()]).unwrap();
        assert!(apply_to_run_config(&bad, &mut config).is_err());
    }
}
