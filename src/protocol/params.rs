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

//! The three application parameters the target runs with.

use crate::common::hex::{format_hex_u32, HexWord};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PARAM1: u32 = 0x0000_0001;
pub const DEFAULT_PARAM2: u32 = 0x43C0_0000;
pub const DEFAULT_PARAM3: u32 = 0x0000_1000;

/// param1 selects the workload height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HexWord", into = "HexWord")]
pub enum Height {
    Short = 0x1,
    Medium = 0x2,
    Tall = 0x3,
}

impl Height {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Height {
    type Error = ParamError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(Height::Short),
            0x2 => Ok(Height::Medium),
            0x3 => Ok(Height::Tall),
            other => Err(ParamError::InvalidHeight(other)),
        }
    }
}

impl TryFrom<HexWord> for Height {
    type Error = ParamError;

    fn try_from(value: HexWord) -> Result<Self, Self::Error> {
        Height::try_from(value.0)
    }
}

impl From<Height> for HexWord {
    fn from(h: Height) -> Self {
        HexWord(h.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    Param1,
    Param2,
    Param3,
}

impl ParamName {
    pub const ALL: [ParamName; 3] = [ParamName::Param1, ParamName::Param2, ParamName::Param3];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamName::Param1 => "param1",
            ParamName::Param2 => "param2",
            ParamName::Param3 => "param3",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "param1" => Some(ParamName::Param1),
            "param2" => Some(ParamName::Param2),
            "param3" => Some(ParamName::Param3),
            _ => None,
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("param1 must be 0x1 (short), 0x2 (medium) or 0x3 (tall), got {0:#010X}")]
    InvalidHeight(u32),
}

/// param2 is the base address of the window the application works on, param3 its size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default = "default_height")]
    pub param1: Height,
    #[serde(with = "crate::common::hex::word", default = "default_param2")]
    pub param2: u32,
    #[serde(with = "crate::common::hex::word", default = "default_param3")]
    pub param3: u32,
}

fn default_height() -> Height {
    Height::Short
}

fn default_param2() -> u32 {
    DEFAULT_PARAM2
}

fn default_param3() -> u32 {
    DEFAULT_PARAM3
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            param1: Height::Short,
            param2: DEFAULT_PARAM2,
            param3: DEFAULT_PARAM3,
        }
    }
}

impl ParameterSet {
    pub fn get(&self, name: ParamName) -> u32 {
        match name {
            ParamName::Param1 => self.param1.code(),
            ParamName::Param2 => self.param2,
            ParamName::Param3 => self.param3,
        }
    }

    /// Only param1 is range-checked; addresses and sizes take any 32-bit value.
    pub fn set(&mut self, name: ParamName, value: u32) -> Result<(), ParamError> {
        match name {
            ParamName::Param1 => self.param1 = Height::try_from(value)?,
            ParamName::Param2 => self.param2 = value,
            ParamName::Param3 => self.param3 = value,
        }
        Ok(())
    }

    /// Last byte of the parameter window, clamped to the 32-bit address space.
    pub fn window_end(&self) -> u32 {
        self.param2.saturating_add(self.param3.saturating_sub(1))
    }

    /// "P1: 0x00000001, P2: 0x43C00000, P3: 0x00001000"
    pub fn status_fields(&self) -> String {
        format!(
            "P1: {}, P2: {}, P3: {}",
            format_hex_u32(self.param1.code()),
            format_hex_u32(self.param2),
            format_hex_u32(self.param3)
        )
    }
}
