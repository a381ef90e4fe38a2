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

//! Line codec for the host <-> target command channel.
//!
//! A command is one ASCII line, `name[ args]\r\n`. A response is one ASCII line that starts with
//! a status token, optionally followed by free text:
//!
//! ```text
//! host   -> set_param param2 0x40000000
//! target <- PARAM_SET_OK
//! host   -> get_status
//! target <- STATUS: IDLE, P1: 0x00000001, P2: 0x40000000, P3: 0x00001000
//! host   -> frobnicate
//! target <- ERROR: Unknown command
//! ```
//!
//! There is no request id on the wire, so exactly one command may be outstanding at a time.

use crate::common::hex::format_hex_u32;
use crate::error::{FramingError, ProtocolError};
use crate::protocol::params::ParamName;
use serde::Serialize;
use std::fmt;

/// Receive buffer size for commands on the target, NUL included.
pub const MAX_COMMAND_LEN: usize = 256;
/// Buffer size for one formatted response, NUL included.
pub const MAX_RESPONSE_LEN: usize = 512;

pub const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Init,
    RunApp,
    SetParam,
    GetStatus,
    CaptureRam,
    OutputData,
    DeviceDna,
    Help,
    Exit,
}

impl CommandName {
    pub const ALL: [CommandName; 9] = [
        CommandName::Init,
        CommandName::RunApp,
        CommandName::SetParam,
        CommandName::GetStatus,
        CommandName::CaptureRam,
        CommandName::OutputData,
        CommandName::DeviceDna,
        CommandName::Exit,
        CommandName::Help,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::Init => "init",
            CommandName::RunApp => "run_app",
            CommandName::SetParam => "set_param",
            CommandName::GetStatus => "get_status",
            CommandName::CaptureRam => "capture_ram",
            CommandName::OutputData => "output_data",
            CommandName::DeviceDna => "device_dna",
            CommandName::Help => "help",
            CommandName::Exit => "exit",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        CommandName::ALL.into_iter().find(|c| c.as_str() == token)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the target. Built per call and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: CommandName,
    args: Option<String>,
}

impl Command {
    pub fn new(name: CommandName) -> Self {
        Self { name, args: None }
    }

    /// Blank argument strings are dropped so `encode` never emits a trailing space.
    pub fn with_args(name: CommandName, args: impl Into<String>) -> Self {
        let args = args.into();
        let args = args.trim();
        Self {
            name,
            args: (!args.is_empty()).then(|| args.to_string()),
        }
    }

    pub fn init() -> Self {
        Self::new(CommandName::Init)
    }

    pub fn run_app() -> Self {
        Self::new(CommandName::RunApp)
    }

    pub fn set_param(name: ParamName, value: u32) -> Self {
        Self::with_args(
            CommandName::SetParam,
            format!("{} {}", name, format_hex_u32(value)),
        )
    }

    pub fn get_status() -> Self {
        Self::new(CommandName::GetStatus)
    }

    pub fn capture_ram() -> Self {
        Self::new(CommandName::CaptureRam)
    }

    pub fn help() -> Self {
        Self::new(CommandName::Help)
    }

    pub fn exit() -> Self {
        Self::new(CommandName::Exit)
    }

    pub fn name(&self) -> CommandName {
        self.name
    }

    pub fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    /// Wire form including the CRLF terminator.
    pub fn encode(&self) -> String {
        format!("{}{}", self, LINE_TERMINATOR)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{} {}", self.name, args),
            None => f.write_str(self.name.as_str()),
        }
    }
}

/// What the target made of one received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Command(Command),
    Unknown(String),
}

/// Target-side decode. Splits on the first space; the name must match exactly.
pub fn decode_command(line: &str) -> Incoming {
    let line = line.trim_end_matches(['\r', '\n']);
    let (token, args) = match line.split_once(' ') {
        Some((token, args)) => (token, Some(args)),
        None => (line, None),
    };
    match CommandName::from_token(token) {
        Some(name) => Incoming::Command(match args {
            Some(args) => Command::with_args(name, args),
            None => Command::new(name),
        }),
        None => Incoming::Unknown(line.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Ok,
    Error,
    Ready,
    Done,
    InitOk,
    RunOk,
    ParamSetOk,
    RamCaptureOk,
    ExitOk,
    Status,
    Help,
    DeviceDna,
    /// Token not recognised; the whole line is kept as payload.
    Unknown,
}

impl ResponseStatus {
    const KNOWN: [ResponseStatus; 12] = [
        ResponseStatus::Ok,
        ResponseStatus::Error,
        ResponseStatus::Ready,
        ResponseStatus::Done,
        ResponseStatus::InitOk,
        ResponseStatus::RunOk,
        ResponseStatus::ParamSetOk,
        ResponseStatus::RamCaptureOk,
        ResponseStatus::ExitOk,
        ResponseStatus::Status,
        ResponseStatus::Help,
        ResponseStatus::DeviceDna,
    ];

    pub fn token(self) -> Option<&'static str> {
        Some(match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::Error => "ERROR",
            ResponseStatus::Ready => "READY",
            ResponseStatus::Done => "DONE",
            ResponseStatus::InitOk => "INIT_OK",
            ResponseStatus::RunOk => "RUN_OK",
            ResponseStatus::ParamSetOk => "PARAM_SET_OK",
            ResponseStatus::RamCaptureOk => "RAM_CAPTURE_OK",
            ResponseStatus::ExitOk => "EXIT_OK",
            ResponseStatus::Status => "STATUS",
            ResponseStatus::Help => "HELP",
            ResponseStatus::DeviceDna => "DEVICE_DNA",
            ResponseStatus::Unknown => return None,
        })
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|s| s.token() == Some(token))
    }

    // These carry a description after the token, written "TOKEN: text".
    fn takes_colon(self) -> bool {
        matches!(
            self,
            ResponseStatus::Error
                | ResponseStatus::Status
                | ResponseStatus::Help
                | ResponseStatus::DeviceDna
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub payload: String,
}

impl Response {
    pub fn new(status: ResponseStatus, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    pub fn bare(status: ResponseStatus) -> Self {
        Self::new(status, String::new())
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Error, reason)
    }

    /// Host-side decode of one response line, terminator optional.
    pub fn decode(line: &str) -> Result<Response, FramingError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() >= MAX_RESPONSE_LEN {
            return Err(FramingError::Overlong {
                limit: MAX_RESPONSE_LEN - 1,
            });
        }
        if !line.is_ascii() {
            return Err(FramingError::NonAscii);
        }
        let (token, rest) = line.split_once(' ').unwrap_or((line, ""));
        match ResponseStatus::from_token(token.trim_end_matches(':')) {
            Some(status) => Ok(Response::new(status, rest.trim())),
            None => Ok(Response::new(ResponseStatus::Unknown, line)),
        }
    }

    /// Wire form without terminator.
    pub fn to_line(&self) -> String {
        match self.status.token() {
            None => self.payload.clone(),
            Some(token) if self.payload.is_empty() => token.to_string(),
            Some(token) if self.status.takes_colon() => format!("{}: {}", token, self.payload),
            Some(token) => format!("{} {}", token, self.payload),
        }
    }

    /// Wire form including the CRLF terminator.
    pub fn encode(&self) -> String {
        format!("{}{}", self.to_line(), LINE_TERMINATOR)
    }

    /// Accept only `expected`. `ERROR` becomes [`ProtocolError::Rejected`], anything else
    /// [`ProtocolError::Unexpected`].
    pub fn expect_status(
        self,
        command: &Command,
        expected: ResponseStatus,
    ) -> Result<Response, ProtocolError> {
        if self.status == expected {
            return Ok(self);
        }
        if self.status == ResponseStatus::Error {
            return Err(ProtocolError::Rejected {
                command: command.to_string(),
                reason: self.payload,
            });
        }
        Err(ProtocolError::Unexpected {
            command: command.to_string(),
            line: self.to_line(),
        })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}
