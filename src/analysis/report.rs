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

use crate::analysis::analyzer::{DiscoveredVariable, VariableKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub scalar: usize,
    pub array_run: usize,
    pub string: usize,
    #[serde(rename = "struct")]
    pub structs: usize,
}

/// Findings handed to whatever writes reports. Variables keep analyzer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindingsReport {
    pub total: usize,
    pub by_kind: KindCounts,
    pub variables: Vec<DiscoveredVariable>,
}

impl FindingsReport {
    pub fn new(variables: Vec<DiscoveredVariable>) -> Self {
        let mut by_kind = KindCounts::default();
        for v in &variables {
            match v.kind {
                VariableKind::Scalar => by_kind.scalar += 1,
                VariableKind::ArrayRun => by_kind.array_run += 1,
                VariableKind::String => by_kind.string += 1,
                VariableKind::Struct => by_kind.structs += 1,
            }
        }
        Self {
            total: variables.len(),
            by_kind,
            variables,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
