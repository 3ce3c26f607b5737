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

//! Ownership tree of everything a run declared.
//!
//! Resources are appended in declaration order, which is also dependency
//! order, so tearing down walks the list backwards. The tree is only used for
//! teardown and reporting.

use crate::infrastructure::provider::{Provider, ResourceId, ResourceKind};
use crate::infrastructure::resolve::Output;
use crate::shared::{FleetError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct TrackedResource {
    kind: ResourceKind,
    name: String,
    scope: String,
    id: Option<Output<ResourceId>>,
    files: Vec<PathBuf>,
}

#[derive(Clone, Default)]
pub struct ResourceTree {
    entries: Arc<Mutex<Vec<TrackedResource>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

/// Persisted form of the tree, written after `up` and consumed by `destroy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionState {
    pub resources: Vec<ResourceRecord>,
}

impl ResourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, kind: ResourceKind, name: &str, scope: &str, id: &Output<ResourceId>) {
        self.push(kind, name, scope, Some(id.clone()), Vec::new());
    }

    /// Track a provider resource whose existence owns local files.
    pub fn track_with_files(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: &str,
        id: &Output<ResourceId>,
        files: Vec<PathBuf>,
    ) {
        self.push(kind, name, scope, Some(id.clone()), files);
    }

    pub fn track_artifact(&self, name: &str, scope: &str, files: Vec<PathBuf>) {
        self.push(ResourceKind::LocalArtifact, name, scope, None, files);
    }

    fn push(
        &self,
        kind: ResourceKind,
        name: &str,
        scope: &str,
        id: Option<Output<ResourceId>>,
        files: Vec<PathBuf>,
    ) {
        debug!(kind = kind.as_str(), name, scope, "resource declared");
        self.entries.lock().push(TrackedResource {
            kind,
            name: name.to_string(),
            scope: scope.to_string(),
            id,
            files,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every declared id. Resources the provider rejected never
    /// existed and are left out.
    pub async fn resolve(&self) -> ProvisionState {
        let pending: Vec<(ResourceKind, String, String, Option<Output<ResourceId>>, Vec<PathBuf>)> =
            self.entries
                .lock()
                .iter()
                .map(|e| {
                    (
                        e.kind,
                        e.name.clone(),
                        e.scope.clone(),
                        e.id.clone(),
                        e.files.clone(),
                    )
                })
                .collect();

        let mut resources = Vec::with_capacity(pending.len());
        for (kind, name, scope, id, files) in pending {
            let id = match id {
                Some(output) => match output.await {
                    Ok(id) => Some(id),
                    Err(failure) => {
                        debug!(resource = %name, %failure, "not recorded, creation failed");
                        continue;
                    }
                },
                None => None,
            };
            resources.push(ResourceRecord {
                kind,
                name,
                scope,
                id,
                files,
            });
        }
        ProvisionState { resources }
    }
}

impl ProvisionState {
    pub fn load(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let content =
            std::fs::read_to_string(path).map_err(|e| FleetError::not_found(&display, e))?;
        serde_json::from_str(&content).map_err(|e| FleetError::invalid(&display, e))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        staged
            .persist(path)
            .map_err(|e| FleetError::Io(e.error))?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Destroy in reverse declaration order. Each record is dropped from the
    /// state as soon as it is gone, so a failed teardown can be resumed from
    /// whatever remains.
    pub async fn teardown(&mut self, provider: &dyn Provider) -> Result<usize> {
        let mut destroyed = 0;
        while let Some(record) = self.resources.last() {
            if let (true, Some(id)) = (record.kind.is_remote(), record.id) {
                provider.destroy(record.kind, id).await?;
            }
            for file in &record.files {
                remove_tied_file(file)?;
            }
            info!(
                kind = record.kind.as_str(),
                name = %record.name,
                scope = %record.scope,
                "resource destroyed"
            );
            self.resources.pop();
            destroyed += 1;
        }
        Ok(destroyed)
    }
}

fn remove_tied_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed tied file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "tied file already absent");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
