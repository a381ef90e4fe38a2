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

//! Entry point for the `analyze` subcommand: offline analysis of a raw memory dump.

use crate::analysis::{analyze_region, FindingsReport};
use crate::common::hex::parse_hex_u32;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Raw binary dump, as read from the target
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address of the first byte of the dump
    #[arg(short = 'b', long = "base", value_parser = parse_base, default_value = "0x0")]
    pub base: u32,

    /// Region label used in the findings
    #[arg(long = "label", default_value = "dump")]
    pub label: String,
}

fn parse_base(s: &str) -> Result<u32, String> {
    parse_hex_u32(s).ok_or_else(|| format!("`{}` is not a 32-bit hex address", s))
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    log::info!(
        "Analyzing {} bytes from {} at 0x{:08X}",
        bytes.len(),
        args.input.display(),
        args.base
    );
    if bytes.len() % 4 != 0 {
        log::warn!("Dump length is not a multiple of 4; trailing bytes are only string-scanned");
    }
    let report = FindingsReport::new(analyze_region(&args.label, args.base, &bytes));
    if report.is_empty() {
        log::info!("No variables found in {}", args.input.display());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
