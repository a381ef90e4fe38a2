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

//! Command state machine that runs on the target.
//!
//! ```text
//!            init              run_app
//!   Idle ──────────> Initialized ───────> Running ──> Completed
//!    │   <── init (from any state)           run_app ──┘  │
//!    └──────────── exit (from any state) ──> Exiting <────┘
//! ```
//!
//! Every line gets exactly one final response, even if it is `ERROR: ...`.

use crate::common::clock::Sleeper;
use crate::common::hex::{format_hex_u32, parse_hex_u32};
use crate::protocol::codec::{decode_command, Command, CommandName, Incoming};
use crate::protocol::params::{ParamName, ParameterSet};
use crate::protocol::{Response, ResponseStatus};
use log::{debug, info};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const HELP_TEXT: &str = "Available commands: init, run_app, set_param, get_status, \
capture_ram, output_data, device_dna, exit, help";

// Simulated 96-bit device DNA, high word first.
const DEVICE_DNA: [u32; 3] = [0x1357_9BDF, 0x9ABC_DEF0, 0x1234_5678];

const OUTPUT_DATA_WORDS: u32 = 8;
const OUTPUT_DATA_SEED: u32 = 0x1234_5678;
const OUTPUT_DATA_STEP: u32 = 0x1111_1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetStatus {
    Idle,
    Initialized,
    Running,
    Completed,
    Exiting,
}

impl TargetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetStatus::Idle => "IDLE",
            TargetStatus::Initialized => "INITIALIZED",
            TargetStatus::Running => "RUNNING",
            TargetStatus::Completed => "COMPLETED",
            TargetStatus::Exiting => "EXITING",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the target mutates. Owned by [`TargetMachine`] alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState {
    pub status: TargetStatus,
    pub params: ParameterSet,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            status: TargetStatus::Idle,
            params: ParameterSet::default(),
        }
    }
}

/// How long the simulated work of each command takes.
#[derive(Debug, Clone, Copy)]
pub struct TargetTiming {
    pub run_app: Duration,
    pub capture_ram: Duration,
}

impl Default for TargetTiming {
    fn default() -> Self {
        Self {
            run_app: Duration::from_secs(1),
            capture_ram: Duration::from_millis(500),
        }
    }
}

/// Lines to put on the wire for one command: informational echo first, final response last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chatter: Vec<String>,
    pub response: Response,
}

impl Reply {
    fn new(response: Response) -> Self {
        Self {
            chatter: Vec::new(),
            response,
        }
    }

    fn with_chatter(chatter: Vec<String>, response: Response) -> Self {
        Self { chatter, response }
    }
}

pub struct TargetMachine {
    state: TargetState,
    timing: TargetTiming,
    sleeper: Arc<dyn Sleeper>,
}

fn set_param_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)\s+(0[xX][0-9A-Fa-f]{1,8})$").ok())
        .as_ref()
}

impl TargetMachine {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self::with_timing(sleeper, TargetTiming::default())
    }

    pub fn with_timing(sleeper: Arc<dyn Sleeper>, timing: TargetTiming) -> Self {
        Self {
            state: TargetState::default(),
            timing,
            sleeper,
        }
    }

    pub fn state(&self) -> &TargetState {
        &self.state
    }

    pub fn is_exiting(&self) -> bool {
        self.state.status == TargetStatus::Exiting
    }

    /// Sent once when the serve loop starts.
    pub fn banner() -> Response {
        Response::bare(ResponseStatus::Ready)
    }

    pub fn handle_line(&mut self, line: &str) -> Reply {
        self.handle(decode_command(line))
    }

    pub fn handle(&mut self, incoming: Incoming) -> Reply {
        let command = match incoming {
            Incoming::Command(command) => command,
            Incoming::Unknown(line) => {
                debug!("Unknown command: {:?}", line);
                return Reply::new(Response::error("Unknown command"));
            }
        };
        info!("Handling {} command", command.name().as_str().to_uppercase());
        match command.name() {
            CommandName::Init => self.handle_init(),
            CommandName::RunApp => self.handle_run_app(),
            CommandName::SetParam => self.handle_set_param(&command),
            CommandName::GetStatus => self.handle_get_status(),
            CommandName::CaptureRam => self.handle_capture_ram(),
            CommandName::OutputData => self.handle_output_data(),
            CommandName::DeviceDna => self.handle_device_dna(),
            CommandName::Help => Reply::new(Response::new(ResponseStatus::Help, HELP_TEXT)),
            CommandName::Exit => self.handle_exit(),
        }
    }

    fn handle_init(&mut self) -> Reply {
        self.state.params = ParameterSet::default();
        self.state.status = TargetStatus::Initialized;
        Reply::new(Response::bare(ResponseStatus::InitOk))
    }

    fn handle_run_app(&mut self) -> Reply {
        if !matches!(
            self.state.status,
            TargetStatus::Initialized | TargetStatus::Completed
        ) {
            return Reply::new(Response::error(format!(
                "Cannot run application while {}",
                self.state.status
            )));
        }
        let p = self.state.params;
        let echo = format!(
            "Parameters: P1={}, P2={}, P3={}",
            format_hex_u32(p.param1.code()),
            format_hex_u32(p.param2),
            format_hex_u32(p.param3)
        );
        info!("{}", echo);

        self.state.status = TargetStatus::Running;
        self.sleeper.sleep(self.timing.run_app);
        self.state.status = TargetStatus::Completed;

        Reply::with_chatter(
            vec![echo, "Running application with parameters...".to_string()],
            Response::bare(ResponseStatus::RunOk),
        )
    }

    fn handle_set_param(&mut self, command: &Command) -> Reply {
        let Some(args) = command.args() else {
            return Reply::new(Response::error("Missing parameter arguments"));
        };
        let Some(caps) = set_param_regex().and_then(|re| re.captures(args)) else {
            return Reply::new(Response::error("Invalid parameter format"));
        };
        let Some(name) = ParamName::parse(&caps[1]) else {
            return Reply::new(Response::error("Unknown parameter name"));
        };
        let Some(value) = parse_hex_u32(&caps[2]) else {
            return Reply::new(Response::error("Invalid parameter format"));
        };
        if let Err(e) = self.state.params.set(name, value) {
            return Reply::new(Response::error(e.to_string()));
        }
        info!("Set {} to {}", name, format_hex_u32(value));
        Reply::new(Response::bare(ResponseStatus::ParamSetOk))
    }

    fn handle_get_status(&self) -> Reply {
        Reply::new(Response::new(
            ResponseStatus::Status,
            format!(
                "{}, {}",
                self.state.status,
                self.state.params.status_fields()
            ),
        ))
    }

    fn handle_capture_ram(&self) -> Reply {
        let p = self.state.params;
        let chatter = vec![
            "Capturing RAM data...".to_string(),
            format!("Base Address: {}", format_hex_u32(p.param2)),
            format!("Size: {} bytes", format_hex_u32(p.param3)),
        ];
        self.sleeper.sleep(self.timing.capture_ram);
        Reply::with_chatter(chatter, Response::bare(ResponseStatus::RamCaptureOk))
    }

    fn handle_output_data(&self) -> Reply {
        let p = self.state.params;
        let mut chatter = vec![
            "=== Application Data Output ===".to_string(),
            format!("Param1 (Height): {}", format_hex_u32(p.param1.code())),
            format!("Param2 (Base):   {}", format_hex_u32(p.param2)),
            format!("Param3 (Size):   {}", format_hex_u32(p.param3)),
            format!("Application Status: {}", self.state.status),
            format!(
                "Memory Region: {} - {}",
                format_hex_u32(p.param2),
                format_hex_u32(p.window_end())
            ),
            format!("Data Size: {} bytes", p.param3),
        ];
        let shown = OUTPUT_DATA_WORDS.min(p.param3 / 4);
        for i in 0..shown {
            let addr = p.param2.wrapping_add(i * 4);
            let value = OUTPUT_DATA_SEED.wrapping_add(i.wrapping_mul(OUTPUT_DATA_STEP));
            chatter.push(format!("{}: {}", format_hex_u32(addr), format_hex_u32(value)));
        }
        if p.param3 > OUTPUT_DATA_WORDS * 4 {
            chatter.push(format!("... (showing first {} values)", OUTPUT_DATA_WORDS));
        }
        Reply::with_chatter(chatter, Response::bare(ResponseStatus::Ok))
    }

    fn handle_device_dna(&self) -> Reply {
        let [high, mid, low] = DEVICE_DNA;
        Reply::new(Response::new(
            ResponseStatus::DeviceDna,
            format!("0x{:08X}{:08X}{:08X}", high, mid, low),
        ))
    }

    fn handle_exit(&mut self) -> Reply {
        self.state.status = TargetStatus::Exiting;
        Reply::new(Response::bare(ResponseStatus::ExitOk))
    }
}
