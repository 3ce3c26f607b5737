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

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider rejected {resource}: {message}")]
    Provider { resource: String, message: String },

    #[error("Template error for cluster '{cluster}': {message}")]
    Template { cluster: String, message: String },

    #[error("Command '{step}' failed with status {status}: {stderr}")]
    Command {
        step: String,
        status: i32,
        stderr: String,
    },

    #[error("Barrier error: {0}")]
    Barrier(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Kubernetes API error: {0}")]
    Kube(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Failures while loading the topology document or the run configuration.
/// Always fatal, raised before any resource is declared.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read '{path}': {reason}")]
    NotFound { path: String, reason: String },

    #[error("cannot parse '{path}': {reason}")]
    Invalid { path: String, reason: String },

    #[error("required setting '{0}' is missing")]
    Missing(String),
}

impl From<kube::Error> for FleetError {
    fn from(err: kube::Error) -> Self {
        FleetError::Kube(err.to_string())
    }
}

impl FleetError {
    pub fn provider(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn template(cluster: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            cluster: cluster.into(),
            message: message.into(),
        }
    }

    pub fn command(step: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Self::Command {
            step: step.into(),
            status,
            stderr: stderr.into(),
        }
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Self::Validation(context.into())
    }

    pub fn barrier(context: impl Into<String>) -> Self {
        Self::Barrier(context.into())
    }

    pub fn not_found(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Config(ConfigError::NotFound {
            path: path.into(),
            reason: reason.to_string(),
        })
    }

    pub fn invalid(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Config(ConfigError::Invalid {
            path: path.into(),
            reason: reason.to_string(),
        })
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Self::Config(ConfigError::Missing(key.into()))
    }
}

/// A provider-side failure carried through shared attribute futures.
///
/// `FleetError` wraps non-cloneable sources (io, parse errors), so resolution
/// results use this instead and convert at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub resource: String,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

impl From<ProviderFailure> for FleetError {
    fn from(failure: ProviderFailure) -> Self {
        FleetError::Provider {
            resource: failure.resource,
            message: failure.message,
        }
    }
}
