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

//! Host-side command dispatcher.
//!
//! Sends one command at a time and waits for its response with a per-attempt timeout. Failed
//! attempts (timeout, framing or transport error) are retried after a fixed backoff; when all
//! attempts are used up the caller gets [`CommandFailed`] carrying the last error seen.
//!
//! The wire has no request ids, so the dispatcher owns the transport outright and never lets a
//! second command go out before the first is answered or abandoned.

use crate::common::clock::Sleeper;
use crate::error::{CommandFailed, LinkError, PipelineError};
use crate::host::bridge::MemoryReader;
use crate::protocol::{Command, Response, ResponseStatus};
use crate::transport::Transport;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Per-attempt response window.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    #[serde(rename = "backoff_ms", with = "millis")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
            max_retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub struct HostDispatcher<T: Transport, M: MemoryReader> {
    transport: T,
    memory: M,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: Transport, M: MemoryReader> HostDispatcher<T, M> {
    pub fn new(transport: T, memory: M, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            memory,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The debug bridge without the retry wrapper.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_parts(self) -> (T, M) {
        (self.transport, self.memory)
    }

    /// Send with the configured timeout and retry count.
    pub fn send(&mut self, command: &Command) -> Result<Response, CommandFailed> {
        self.send_with(command, self.policy.timeout, self.policy.max_retries)
    }

    /// Send `command`, making at most `1 + max_retries` attempts.
    pub fn send_with(
        &mut self,
        command: &Command,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Response, CommandFailed> {
        let label = command.to_string();
        self.with_retries(&label, max_retries, |this| this.attempt(command, timeout))
    }

    /// Send and require `expected` back. An `ERROR:` reply is returned as-is for the caller to
    /// turn into a protocol error.
    pub fn request(
        &mut self,
        command: &Command,
        expected: ResponseStatus,
    ) -> Result<Response, PipelineError> {
        let response = self.send(command)?;
        Ok(response.expect_status(command, expected)?)
    }

    /// Consume input until the target's `READY` banner shows up.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<(), LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout(timeout));
            }
            let line = self.transport.read_line(remaining)?;
            match Response::decode(&line) {
                Ok(r) if r.status == ResponseStatus::Ready => {
                    info!("Target is ready");
                    return Ok(());
                }
                Ok(r) => debug!("Ignoring {:?} while waiting for READY", r.to_line()),
                Err(e) => debug!("Ignoring malformed line while waiting for READY: {}", e),
            }
        }
    }

    /// Raw read through the debug bridge with the same retry discipline as commands.
    pub fn read_memory_retrying(
        &mut self,
        address: u32,
        length: u32,
    ) -> Result<Vec<u8>, CommandFailed> {
        let label = format!("read 0x{:08X} +{}", address, length);
        self.with_retries(&label, self.policy.max_retries, |this| {
            this.memory.read_memory(address, length)
        })
    }

    fn with_retries<R>(
        &mut self,
        label: &str,
        max_retries: u32,
        mut op: impl FnMut(&mut Self) -> Result<R, LinkError>,
    ) -> Result<R, CommandFailed> {
        let attempts = max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match op(self) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    warn!("`{}` failed on final attempt {}: {}", label, attempt, e);
                    return Err(CommandFailed {
                        command: label.to_string(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    warn!("`{}` attempt {}/{} failed: {}", label, attempt, attempts, e);
                    self.sleeper.sleep(self.policy.backoff);
                    attempt += 1;
                }
            }
        }
    }

    fn attempt(&mut self, command: &Command, timeout: Duration) -> Result<Response, LinkError> {
        self.transport.discard_pending()?;
        debug!("Sending `{}`", command);
        self.transport.write_line(&command.encode())?;

        let deadline = Instant::now() + timeout;
        // Echo lines the target prints before its final response.
        let mut last_unknown: Option<Response> = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = if remaining.is_zero() {
                Err(LinkError::Timeout(timeout))
            } else {
                self.transport.read_line(remaining)
            };
            let line = match line {
                Ok(line) => line,
                Err(LinkError::Timeout(_)) => {
                    return last_unknown.ok_or(LinkError::Timeout(timeout));
                }
                Err(e) => return Err(e),
            };
            let response = Response::decode(&line)?;
            match response.status {
                ResponseStatus::Unknown => {
                    debug!("target: {}", response.payload);
                    last_unknown = Some(response);
                }
                ResponseStatus::Ready => debug!("Skipping late READY banner"),
                _ => {
                    debug!("`{}` -> {}", command, response);
                    return Ok(response);
                }
            }
        }
    }
}

impl<T: Transport, M: MemoryReader> MemoryReader for HostDispatcher<T, M> {
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, LinkError> {
        self.read_memory_retrying(address, length)
            .map_err(|failed| failed.last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::RecordingSleeper;
    use crate::host::bridge::NoBridge;
    use std::collections::VecDeque;

    /// Replays a fixed list of read results and counts writes.
    #[derive(Default)]
    struct Scripted {
        reads: VecDeque<Result<String, LinkError>>,
        writes: Vec<String>,
        discards: u32,
    }

    impl Transport for Scripted {
        fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
            self.writes.push(line.to_string());
            Ok(())
        }

        fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
            self.reads
                .pop_front()
                .unwrap_or(Err(LinkError::Timeout(timeout)))
        }

        fn discard_pending(&mut self) -> Result<(), LinkError> {
            self.discards += 1;
            Ok(())
        }
    }

    fn dispatcher(
        reads: Vec<Result<String, LinkError>>,
        max_retries: u32,
    ) -> (HostDispatcher<Scripted, NoBridge>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let transport = Scripted {
            reads: reads.into(),
            ..Default::default()
        };
        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(100),
        };
        (
            HostDispatcher::new(transport, NoBridge, policy, sleeper.clone()),
            sleeper,
        )
    }

    #[test]
    fn always_timing_out_uses_exactly_three_attempts() {
        let (mut d, sleeper) = dispatcher(vec![], 2);
        let err = d.send(&Command::init()).unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.last_error.is_timeout());
        let (transport, _) = d.into_parts();
        assert_eq!(transport.writes, vec!["init\r\n"; 3]);
        assert_eq!(transport.discards, 3);
        // Backoff only between attempts.
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(100); 2]);
    }

    #[test]
    fn chatter_is_skipped() {
        let (mut d, _) = dispatcher(
            vec![
                Ok("Capturing RAM data...".to_string()),
                Ok("Base Address: 0x43C00000".to_string()),
                Ok("READY".to_string()),
                Ok("RAM_CAPTURE_OK".to_string()),
            ],
            0,
        );
        let r = d.send(&Command::capture_ram()).unwrap();
        assert_eq!(r, Response::bare(ResponseStatus::RamCaptureOk));
    }

    #[test]
    fn unknown_line_surfaces_on_timeout() {
        let (mut d, _) = dispatcher(vec![Ok("garbled reply".to_string())], 0);
        let r = d.send(&Command::get_status()).unwrap();
        assert_eq!(r.status, ResponseStatus::Unknown);
        assert_eq!(r.payload, "garbled reply");
    }

    #[test]
    fn retry_recovers_after_framing_error() {
        let (mut d, sleeper) = dispatcher(
            vec![
                Err(LinkError::Framing(crate::error::FramingError::NonAscii)),
                Ok("INIT_OK".to_string()),
            ],
            2,
        );
        assert_eq!(d.send(&Command::init()).unwrap().status, ResponseStatus::InitOk);
        assert_eq!(sleeper.sleeps().len(), 1);
    }

    #[test]
    fn error_reply_becomes_protocol_error() {
        let (mut d, _) = dispatcher(
            vec![Ok("ERROR: Cannot run application while IDLE".to_string())],
            0,
        );
        let err = d
            .request(&Command::run_app(), ResponseStatus::RunOk)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Protocol(crate::error::ProtocolError::Rejected { .. })
        ));
    }

    #[test]
    fn wait_ready_skips_noise() {
        let (mut d, _) = dispatcher(
            vec![Ok("boot log".to_string()), Ok("READY".to_string())],
            0,
        );
        d.wait_ready(Duration::from_millis(50)).unwrap();
        let (mut d, _) = dispatcher(vec![], 0);
        assert!(d.wait_ready(Duration::from_millis(50)).unwrap_err().is_timeout());
    }

    #[test]
    fn memory_reads_are_retried() {
        let (mut d, sleeper) = dispatcher(vec![], 1);
        let err = d.read_memory_retrying(0x1000, 4).unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_error, LinkError::Bridge(_)));
        assert_eq!(sleeper.sleeps().len(), 1);
    }

    #[test]
    fn retry_policy_json_uses_milliseconds() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"timeout_ms": 500}"#).unwrap();
        assert_eq!(policy.timeout, Duration::from_millis(500));
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff, Duration::from_millis(100));
    }
}
