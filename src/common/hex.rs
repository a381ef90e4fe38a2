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

// 32-bit addresses, sizes and parameter values travel as hex strings in every JSON document we
// read or write ("0x43C00000"), so that configs and reports stay readable next to the target's
// own "0x%08X" output. Numbers are still accepted on input.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Parse hex from string (supports "0x1234", "0X1234" or "1234" format)
pub fn parse_hex_u32(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    let hex_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_str.is_empty() {
        return None;
    }
    u32::from_str_radix(hex_str, 16).ok()
}

/// Format as exactly 8 upper-case hex digits, the way the target prints words.
pub fn format_hex_u32(value: u32) -> String {
    format!("0x{:08X}", value)
}

/// A `u32` that serializes as `"0x%08X"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexWord(pub u32);

impl fmt::Display for HexWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl Serialize for HexWord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hex_u32(self.0))
    }
}

struct HexWordVisitor;

impl<'de> Visitor<'de> for HexWordVisitor {
    type Value = HexWord;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a 32-bit value as a hex string (\"0x1000\") or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<HexWord, E> {
        parse_hex_u32(v)
            .map(HexWord)
            .ok_or_else(|| E::custom(format!("invalid 32-bit hex value `{}`", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<HexWord, E> {
        u32::try_from(v)
            .map(HexWord)
            .map_err(|_| E::custom(format!("value {} does not fit in 32 bits", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<HexWord, E> {
        u32::try_from(v)
            .map(HexWord)
            .map_err(|_| E::custom(format!("value {} does not fit in 32 bits", v)))
    }
}

impl<'de> Deserialize<'de> for HexWord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(HexWordVisitor)
    }
}

/// `#[serde(with = "crate::common::hex::word")]` for plain `u32` fields.
pub mod word {
    use super::HexWord;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        HexWord(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        HexWord::deserialize(deserializer).map(|w| w.0)
    }
}

/// `#[serde(with = "crate::common::hex::words")]` for `Vec<u32>` fields.
pub mod words {
    use super::HexWord;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[u32], serializer: S) -> Result<S::Ok, S::Error> {
        let words: Vec<HexWord> = values.iter().copied().map(HexWord).collect();
        words.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
        let words = Vec::<HexWord>::deserialize(deserializer)?;
        Ok(words.into_iter().map(|w| w.0).collect())
    }
}
