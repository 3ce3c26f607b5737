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

//! Renders the host inventory and the cluster variables consumed by
//! configuration management.
//!
//! Files are written under `<work_dir>/.staging` and renamed into place, so
//! a reader of `inventory-<cluster>.ini` never sees a half-written file.

use crate::domain::cluster::FinalizedInventory;
use crate::infrastructure::constants::{
    inventory_file_name, variables_file_name, BASTION_NAME, STAGING_DIR,
};
use crate::shared::{FleetError, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const HOSTS_TEMPLATE: &str = "hosts";
const VARIABLES_TEMPLATE: &str = "variables";

pub const DEFAULT_HOSTS_TEMPLATE: &str = include_str!("templates/inventory.ini.hbs");
pub const DEFAULT_VARIABLES_TEMPLATE: &str = include_str!("templates/variables.yaml.hbs");

#[derive(Serialize)]
struct RenderContext<'a> {
    #[serde(flatten)]
    inventory: &'a FinalizedInventory,
    bastion_name: &'static str,
    key_file: String,
    control_plane_endpoint: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifacts {
    pub hosts: String,
    pub variables: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedFiles {
    pub inventory: PathBuf,
    pub variables: PathBuf,
}

impl MaterializedFiles {
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![self.inventory.clone(), self.variables.clone()]
    }
}

pub struct InventoryMaterializer {
    handlebars: Handlebars<'static>,
}

impl InventoryMaterializer {
    pub fn new() -> Result<Self> {
        Self::with_templates(DEFAULT_HOSTS_TEMPLATE, DEFAULT_VARIABLES_TEMPLATE)
    }

    pub fn with_templates(hosts: &str, variables: &str) -> Result<Self> {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(true);
        hb.register_escape_fn(handlebars::no_escape);
        for (name, source) in [(HOSTS_TEMPLATE, hosts), (VARIABLES_TEMPLATE, variables)] {
            hb.register_template_string(name, source).map_err(|e| {
                error!(template = name, error = %e, "template does not parse");
                FleetError::template("*", format!("template '{}': {}", name, e))
            })?;
        }
        Ok(Self { handlebars: hb })
    }

    /// Render both artifacts. Identical inventories give identical bytes.
    pub fn render(
        &self,
        inventory: &FinalizedInventory,
        key_file: &Path,
    ) -> Result<RenderedArtifacts> {
        let context = RenderContext {
            inventory,
            bastion_name: BASTION_NAME,
            key_file: key_file.display().to_string(),
            control_plane_endpoint: inventory.control_plane_endpoint(),
        };
        let render = |template: &str| {
            self.handlebars.render(template, &context).map_err(|e| {
                error!(
                    cluster = %inventory.cluster_name,
                    template,
                    error = %e,
                    "failed to render inventory template"
                );
                FleetError::template(&inventory.cluster_name, e.to_string())
            })
        };
        Ok(RenderedArtifacts {
            hosts: render(HOSTS_TEMPLATE)?,
            variables: render(VARIABLES_TEMPLATE)?,
        })
    }

    /// Render and move both files into `work_dir`.
    pub fn materialize(
        &self,
        inventory: &FinalizedInventory,
        work_dir: &Path,
        key_file: &Path,
    ) -> Result<MaterializedFiles> {
        let rendered = self.render(inventory, key_file)?;
        let staging = work_dir.join(STAGING_DIR);
        std::fs::create_dir_all(&staging)?;

        let files = MaterializedFiles {
            inventory: work_dir.join(inventory_file_name(&inventory.cluster_name)),
            variables: work_dir.join(variables_file_name(&inventory.cluster_name)),
        };
        publish(&staging, &files.inventory, &rendered.hosts)?;
        publish(&staging, &files.variables, &rendered.variables)?;

        info!(
            cluster = %inventory.cluster_name,
            inventory = %files.inventory.display(),
            variables = %files.variables.display(),
            "inventory materialized"
        );
        Ok(files)
    }
}

fn publish(staging: &Path, target: &Path, contents: &str) -> Result<()> {
    let mut staged = tempfile::NamedTempFile::new_in(staging)?;
    staged.write_all(contents.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(target).map_err(|e| FleetError::Io(e.error))?;
    debug!(path = %target.display(), bytes = contents.len(), "artifact published");
    Ok(())
}
