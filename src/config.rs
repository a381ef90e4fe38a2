// Copyright (c) 2026 MCU-Debug Authors.
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

//! JSON description of one capture run.
//!
//! ```json
//! {
//!   "link": { "tcp": { "addr": "127.0.0.1:9257" } },
//!   "bridge": { "xsdb": { "program": "xsdb", "target": 2 } },
//!   "regions": [ { "label": "ddr_window", "base_address": "0x43C00000", "size": "0x1000" } ],
//!   "data_ready": { "mode": "fixed_delay", "seconds": 5 }
//! }
//! ```

use crate::error::ConfigError;
use crate::host::capture::MemoryRegion;
use crate::host::data_ready::DataReadyPolicy;
use crate::host::dispatcher::RetryPolicy;
use crate::host::pipeline::CapturePlan;
use crate::protocol::ParameterSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
    Tcp {
        addr: String,
    },
}

fn default_baud() -> u32 {
    115_200
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeConfig {
    Xsdb {
        #[serde(default = "default_xsdb_program")]
        program: String,
        #[serde(default = "default_xsdb_target")]
        target: u32,
        #[serde(default = "default_xsdb_timeout_ms")]
        timeout_ms: u64,
    },
    #[default]
    None,
}

fn default_xsdb_program() -> String {
    "xsdb".to_string()
}

fn default_xsdb_target() -> u32 {
    1
}

fn default_xsdb_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub link: LinkConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub dispatcher: RetryPolicy,
    #[serde(default)]
    pub parameters: ParameterSet,
    pub regions: Vec<MemoryRegion>,
    #[serde(default)]
    pub data_ready: DataReadyPolicy,
    /// Wait this long for the target's READY banner before the first command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ready_ms: Option<u64>,
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let mut labels = HashSet::new();
        for region in &self.regions {
            if region.label.trim().is_empty() {
                return invalid("region label must not be empty".to_string());
            }
            if !labels.insert(region.label.as_str()) {
                return invalid(format!("duplicate region label `{}`", region.label));
            }
            if region.size == 0 || region.size % 4 != 0 {
                return invalid(format!(
                    "region `{}` size {} must be a non-zero multiple of 4",
                    region.label, region.size
                ));
            }
            if region.end() > u32::MAX as u64 + 1 {
                return invalid(format!(
                    "region `{}` runs past the end of the 32-bit address space",
                    region.label
                ));
            }
        }

        if let DataReadyPolicy::Polling {
            addresses,
            max_polls,
            ..
        } = &self.data_ready
        {
            if addresses.is_empty() {
                return invalid("polling needs at least one address".to_string());
            }
            if *max_polls == 0 {
                return invalid("polling max_polls must be at least 1".to_string());
            }
        }
        Ok(())
    }

    pub fn plan(&self) -> CapturePlan {
        CapturePlan {
            parameters: self.parameters,
            regions: self.regions.clone(),
            data_ready: self.data_ready.clone(),
            wait_ready: self.wait_ready_ms.map(Duration::from_millis),
        }
    }
}

pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    RunConfig::from_json(&text)
}
