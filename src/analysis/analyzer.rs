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

//! Heuristic variable discovery over captured memory.
//!
//! Three passes over each region, all pure functions of the bytes:
//!
//! 1. Words (little-endian, 4-byte aligned). Anything other than `0x00000000`/`0xFFFFFFFF` is a
//!    scalar hit; four or more hits in a row become one array run instead.
//! 2. Printable ASCII runs of at least [`MIN_STRING_LEN`] bytes.
//! 3. Repeating records: 2 to 4 words wide, at least [`MIN_STRUCT_RECORDS`] in a row, each with
//!    the same mix of live and sentinel fields.
//!
//! Passes 2 and 3 only add findings; they never change what pass 1 reports.

use crate::host::capture::CaptureSession;
use serde::Serialize;

pub const MIN_ARRAY_WORDS: usize = 4;
pub const MIN_STRING_LEN: usize = 6;
pub const MIN_STRUCT_RECORDS: usize = 3;
pub const STRUCT_STRIDES: std::ops::RangeInclusive<usize> = 2..=4;
/// Longest preview kept per finding.
pub const PREVIEW_WORDS: usize = 8;
pub const PREVIEW_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Scalar,
    ArrayRun,
    String,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preview {
    Words(#[serde(with = "crate::common::hex::words")] Vec<u32>),
    Text(String),
    Summary(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredVariable {
    pub region: String,
    pub kind: VariableKind,
    #[serde(with = "crate::common::hex::word")]
    pub address: u32,
    /// Bytes.
    pub length: u32,
    pub preview: Preview,
}

fn is_sentinel(word: u32) -> bool {
    word == 0x0000_0000 || word == 0xFFFF_FFFF
}

fn is_printable(b: u8) -> bool {
    (0x20..=0x7E).contains(&b)
}

/// Every finding in the session, region by region in capture order.
pub fn analyze(session: &CaptureSession) -> Vec<DiscoveredVariable> {
    session
        .regions
        .iter()
        .filter(|r| r.is_ok())
        .flat_map(|r| analyze_region(&r.region.label, r.region.base_address, &r.bytes))
        .collect()
}

/// Findings for one block of bytes captured at `base`, sorted by address.
pub fn analyze_region(label: &str, base: u32, bytes: &[u8]) -> Vec<DiscoveredVariable> {
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut found = Vec::new();
    scan_words(label, base, &words, &mut found);
    scan_strings(label, base, bytes, &mut found);
    scan_structs(label, base, &words, &mut found);
    found.sort_by_key(|v| (v.address, v.kind, v.length));
    found
}

fn word_address(base: u32, index: usize) -> u32 {
    base.wrapping_add((index * 4) as u32)
}

fn scan_words(label: &str, base: u32, words: &[u32], out: &mut Vec<DiscoveredVariable>) {
    let mut i = 0;
    while i < words.len() {
        if is_sentinel(words[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < words.len() && !is_sentinel(words[i]) {
            i += 1;
        }
        let run = &words[start..i];
        if run.len() >= MIN_ARRAY_WORDS {
            out.push(DiscoveredVariable {
                region: label.to_string(),
                kind: VariableKind::ArrayRun,
                address: word_address(base, start),
                length: (run.len() * 4) as u32,
                preview: Preview::Words(run.iter().take(PREVIEW_WORDS).copied().collect()),
            });
        } else {
            out.extend(run.iter().enumerate().map(|(k, &w)| DiscoveredVariable {
                region: label.to_string(),
                kind: VariableKind::Scalar,
                address: word_address(base, start + k),
                length: 4,
                preview: Preview::Words(vec![w]),
            }));
        }
    }
}

fn scan_strings(label: &str, base: u32, bytes: &[u8], out: &mut Vec<DiscoveredVariable>) {
    let mut i = 0;
    while i < bytes.len() {
        if !is_printable(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && is_printable(bytes[i]) {
            i += 1;
        }
        if i - start >= MIN_STRING_LEN {
            // Printable bytes are ASCII, one char each.
            let text: String = bytes[start..i]
                .iter()
                .take(PREVIEW_CHARS)
                .map(|&b| b as char)
                .collect();
            out.push(DiscoveredVariable {
                region: label.to_string(),
                kind: VariableKind::String,
                address: base.wrapping_add(start as u32),
                length: (i - start) as u32,
                preview: Preview::Text(text),
            });
        }
    }
}

fn scan_structs(label: &str, base: u32, words: &[u32], out: &mut Vec<DiscoveredVariable>) {
    let live: Vec<bool> = words.iter().map(|&w| !is_sentinel(w)).collect();
    let mut claimed = vec![false; words.len()];

    for stride in STRUCT_STRIDES {
        let mut i = 0;
        while i + stride <= words.len() {
            let mask = &live[i..i + stride];
            let mixed = mask.iter().any(|&l| l) && !mask.iter().all(|&l| l);
            if !mixed || claimed[i..i + stride].iter().any(|&c| c) {
                i += 1;
                continue;
            }
            let mut records = 1;
            loop {
                let next = i + records * stride;
                if next + stride > words.len()
                    || live[next..next + stride] != *mask
                    || claimed[next..next + stride].iter().any(|&c| c)
                {
                    break;
                }
                records += 1;
            }
            if records < MIN_STRUCT_RECORDS {
                i += 1;
                continue;
            }
            let span = records * stride;
            claimed[i..i + span].iter_mut().for_each(|c| *c = true);
            let mask_bits: String = mask.iter().map(|&l| if l { '1' } else { '0' }).collect();
            out.push(DiscoveredVariable {
                region: label.to_string(),
                kind: VariableKind::Struct,
                address: word_address(base, i),
                length: (span * 4) as u32,
                preview: Preview::Summary(format!(
                    "{} records of {} words, field mask {}",
                    records, stride, mask_bits
                )),
            });
            i += span;
        }
    }
}
