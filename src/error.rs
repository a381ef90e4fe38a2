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

//! Error taxonomy for the command channel and the capture pipeline.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A line could not be framed. Local to one exchange, never fatal to a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("line exceeds {limit} bytes")]
    Overlong { limit: usize },
    #[error("no line terminator within read window ({pending} bytes pending)")]
    Unterminated { pending: usize },
    #[error("line contains non-ASCII bytes")]
    NonAscii,
}

/// Transport-level failure on the text channel or the debug bridge.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("link closed by peer")]
    Closed,
    #[error("debug bridge error: {0}")]
    Bridge(String),
}

impl LinkError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout(_))
    }
}

/// All attempts for one command (or raw read) were used up.
#[derive(Debug, Error)]
#[error("`{command}` failed after {attempts} attempt(s): {last_error}")]
pub struct CommandFailed {
    pub command: String,
    pub attempts: u32,
    #[source]
    pub last_error: LinkError,
}

/// The target answered, but not with what the caller needed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("target rejected `{command}`: {reason}")]
    Rejected { command: String, reason: String },
    #[error("unexpected reply to `{command}`: {line}")]
    Unexpected { command: String, line: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataNotReadyError {
    #[error("data not ready after {attempts} poll(s)")]
    Exhausted { attempts: u32 },
    #[error("wait for data was cancelled")]
    Cancelled,
}

/// Some regions of a capture came back empty. The session is still returned.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{count} region(s) failed to capture: {list}", count = .failed.len(), list = .failed.join(", "))]
pub struct PartialCaptureError {
    pub failed: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Anything that stops the host pipeline before a capture session exists.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target never reported READY: {0}")]
    NotReady(#[source] LinkError),
    #[error(transparent)]
    Command(#[from] CommandFailed),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    DataNotReady(#[from] DataNotReadyError),
}
