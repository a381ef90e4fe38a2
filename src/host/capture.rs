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

//! Memory snapshots of the configured regions.

use crate::common::hex::format_hex_u32;
use crate::error::PartialCaptureError;
use crate::host::bridge::MemoryReader;
use crate::protocol::ParameterSet;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::Write;

/// Address range to capture. `size` is in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub label: String,
    #[serde(with = "crate::common::hex::word")]
    pub base_address: u32,
    #[serde(with = "crate::common::hex::word")]
    pub size: u32,
}

impl MemoryRegion {
    pub fn new(label: impl Into<String>, base_address: u32, size: u32) -> Self {
        Self {
            label: label.into(),
            base_address,
            size,
        }
    }

    /// One past the last byte. Kept as u64 so a region ending at 4 GiB is representable.
    pub fn end(&self) -> u64 {
        self.base_address as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base_address && (addr as u64) < self.end()
    }
}

/// What came back for one region. A failed read keeps the region with no bytes and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCapture {
    #[serde(flatten)]
    pub region: MemoryRegion,
    #[serde(serialize_with = "bytes_as_hex")]
    pub bytes: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegionCapture {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn bytes_as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    serializer.serialize_str(&out)
}

/// Everything needed to reproduce one capture: when, with which parameters, and what bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSession {
    pub timestamp: DateTime<Utc>,
    pub parameters: ParameterSet,
    pub regions: Vec<RegionCapture>,
}

impl CaptureSession {
    pub fn new(parameters: ParameterSet) -> Self {
        Self {
            timestamp: Utc::now(),
            parameters,
            regions: Vec::new(),
        }
    }

    pub fn bytes(&self, label: &str) -> Option<&[u8]> {
        self.regions
            .iter()
            .find(|r| r.region.label == label)
            .map(|r| r.bytes.as_slice())
    }

    pub fn partial_failure(&self) -> Option<PartialCaptureError> {
        let failed: Vec<String> = self
            .regions
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.region.label.clone())
            .collect();
        (!failed.is_empty()).then_some(PartialCaptureError { failed })
    }
}

/// Read every region in order. A failed or short read marks that region and moves on.
pub fn capture(
    memory: &mut dyn MemoryReader,
    regions: &[MemoryRegion],
    parameters: ParameterSet,
) -> CaptureSession {
    let mut session = CaptureSession::new(parameters);
    for region in regions {
        info!(
            "Capturing {} ({} bytes at {})",
            region.label,
            region.size,
            format_hex_u32(region.base_address)
        );
        let result = match memory.read_memory(region.base_address, region.size) {
            Ok(bytes) if bytes.len() == region.size as usize => Ok(bytes),
            Ok(bytes) => Err(format!(
                "short read: got {} of {} bytes",
                bytes.len(),
                region.size
            )),
            Err(e) => Err(e.to_string()),
        };
        let entry = match result {
            Ok(bytes) => RegionCapture {
                region: region.clone(),
                bytes,
                error: None,
            },
            Err(reason) => {
                warn!("Capture of {} failed: {}", region.label, reason);
                RegionCapture {
                    region: region.clone(),
                    bytes: Vec::new(),
                    error: Some(reason),
                }
            }
        };
        session.regions.push(entry);
    }
    session
}
