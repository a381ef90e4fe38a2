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

//! Deciding when the application's output is ready to capture.

use crate::common::clock::{sleep_cancellable, CancelToken, Sleeper, CANCEL_CHECK_SLICE};
use crate::common::hex::format_hex_u32;
use crate::error::DataNotReadyError;
use crate::host::bridge::MemoryReader;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DataReadyPolicy {
    /// Wait for the operator to confirm. Only cancellation ends the wait otherwise.
    #[default]
    Manual,
    /// Wait a fixed time without looking at the target.
    FixedDelay { seconds: u64 },
    /// Read each address every `interval_ms` until one holds `expected_value`.
    Polling {
        #[serde(with = "crate::common::hex::words")]
        addresses: Vec<u32>,
        max_polls: u32,
        interval_ms: u64,
        #[serde(with = "crate::common::hex::word")]
        expected_value: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    Confirmed,
    Elapsed,
    Matched { address: u32, poll: u32 },
}

/// Everything a policy may need while waiting.
pub struct ReadyContext<'a> {
    pub memory: &'a mut dyn MemoryReader,
    pub sleeper: &'a dyn Sleeper,
    /// Operator confirmation for [`DataReadyPolicy::Manual`].
    pub confirm: Option<&'a Receiver<()>>,
    pub cancel: &'a CancelToken,
}

impl DataReadyPolicy {
    pub fn wait(&self, ctx: &mut ReadyContext<'_>) -> Result<Ready, DataNotReadyError> {
        match self {
            DataReadyPolicy::Manual => wait_manual(ctx.confirm, ctx.cancel),
            DataReadyPolicy::FixedDelay { seconds } => {
                info!("Waiting {} s for application data", seconds);
                if sleep_cancellable(ctx.sleeper, Duration::from_secs(*seconds), ctx.cancel) {
                    Ok(Ready::Elapsed)
                } else {
                    Err(DataNotReadyError::Cancelled)
                }
            }
            DataReadyPolicy::Polling {
                addresses,
                max_polls,
                interval_ms,
                expected_value,
            } => poll(
                ctx,
                addresses,
                *max_polls,
                Duration::from_millis(*interval_ms),
                *expected_value,
            ),
        }
    }
}

fn wait_manual(
    confirm: Option<&Receiver<()>>,
    cancel: &CancelToken,
) -> Result<Ready, DataNotReadyError> {
    let Some(confirm) = confirm else {
        warn!("Manual data-ready selected but no confirmation source was given");
        return Err(DataNotReadyError::Cancelled);
    };
    info!("Waiting for operator confirmation that data is ready");
    loop {
        if cancel.is_cancelled() {
            return Err(DataNotReadyError::Cancelled);
        }
        match confirm.recv_timeout(CANCEL_CHECK_SLICE) {
            Ok(()) => return Ok(Ready::Confirmed),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Confirmation source went away");
                return Err(DataNotReadyError::Cancelled);
            }
        }
    }
}

fn poll(
    ctx: &mut ReadyContext<'_>,
    addresses: &[u32],
    max_polls: u32,
    interval: Duration,
    expected: u32,
) -> Result<Ready, DataNotReadyError> {
    info!(
        "Polling {} address(es) for {} up to {} times",
        addresses.len(),
        format_hex_u32(expected),
        max_polls
    );
    for poll in 1..=max_polls {
        for &address in addresses {
            if ctx.cancel.is_cancelled() {
                return Err(DataNotReadyError::Cancelled);
            }
            match read_word(&mut *ctx.memory, address) {
                Some(value) if value == expected => {
                    info!(
                        "{} = {} on poll {}",
                        format_hex_u32(address),
                        format_hex_u32(value),
                        poll
                    );
                    return Ok(Ready::Matched { address, poll });
                }
                Some(value) => debug!(
                    "Poll {}: {} = {}",
                    poll,
                    format_hex_u32(address),
                    format_hex_u32(value)
                ),
                None => {}
            }
        }
        if poll < max_polls && !sleep_cancellable(ctx.sleeper, interval, ctx.cancel) {
            return Err(DataNotReadyError::Cancelled);
        }
    }
    Err(DataNotReadyError::Exhausted {
        attempts: max_polls,
    })
}

// A failed or short read counts as an observation that did not match.
fn read_word(memory: &mut dyn MemoryReader, address: u32) -> Option<u32> {
    match memory.read_memory(address, 4) {
        Ok(bytes) => match <[u8; 4]>::try_from(bytes.get(..4)?) {
            Ok(word) => Some(u32::from_le_bytes(word)),
            Err(_) => None,
        },
        Err(e) => {
            warn!("Poll read of {} failed: {}", format_hex_u32(address), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::RecordingSleeper;
    use crate::error::LinkError;
    use std::sync::mpsc;

    /// Returns `value` for every read and counts them; optionally cancels after `cancel_after`.
    struct Counter {
        value: u32,
        reads: u32,
        cancel_after: Option<(u32, CancelToken)>,
    }

    impl MemoryReader for Counter {
        fn read_memory(&mut self, _address: u32, _length: u32) -> Result<Vec<u8>, LinkError> {
            self.reads += 1;
            if let Some((n, token)) = &self.cancel_after {
                if self.reads >= *n {
                    token.cancel();
                }
            }
            Ok(self.value.to_le_bytes().to_vec())
        }
    }

    fn polling(max_polls: u32) -> DataReadyPolicy {
        DataReadyPolicy::Polling {
            addresses: vec![0x43C0_0FFC],
            max_polls,
            interval_ms: 250,
            expected_value: 1,
        }
    }

    #[test]
    fn polling_exhausts_after_exactly_n_reads() {
        let mut memory = Counter {
            value: 0,
            reads: 0,
            cancel_after: None,
        };
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        let mut ctx = ReadyContext {
            memory: &mut memory,
            sleeper: &sleeper,
            confirm: None,
            cancel: &cancel,
        };
        assert_eq!(
            polling(5).wait(&mut ctx),
            Err(DataNotReadyError::Exhausted { attempts: 5 })
        );
        assert_eq!(memory.reads, 5);
        // Four intervals of 250 ms, sliced into 100 ms pieces.
        assert_eq!(sleeper.total(), Duration::from_millis(1000));
    }

    #[test]
    fn polling_matches_immediately() {
        let mut memory = Counter {
            value: 1,
            reads: 0,
            cancel_after: None,
        };
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        let mut ctx = ReadyContext {
            memory: &mut memory,
            sleeper: &sleeper,
            confirm: None,
            cancel: &cancel,
        };
        assert_eq!(
            polling(5).wait(&mut ctx),
            Ok(Ready::Matched {
                address: 0x43C0_0FFC,
                poll: 1
            })
        );
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn polling_is_cancelled_between_iterations() {
        let cancel = CancelToken::new();
        let mut memory = Counter {
            value: 0,
            reads: 0,
            cancel_after: Some((2, cancel.clone())),
        };
        let sleeper = RecordingSleeper::new();
        let mut ctx = ReadyContext {
            memory: &mut memory,
            sleeper: &sleeper,
            confirm: None,
            cancel: &cancel,
        };
        assert_eq!(polling(10).wait(&mut ctx), Err(DataNotReadyError::Cancelled));
        assert_eq!(memory.reads, 2);
    }

    #[test]
    fn fixed_delay_sleeps_configured_time() {
        let mut memory = crate::host::bridge::NoBridge;
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        let mut ctx = ReadyContext {
            memory: &mut memory,
            sleeper: &sleeper,
            confirm: None,
            cancel: &cancel,
        };
        let policy = DataReadyPolicy::FixedDelay { seconds: 2 };
        assert_eq!(policy.wait(&mut ctx), Ok(Ready::Elapsed));
        assert_eq!(sleeper.total(), Duration::from_secs(2));
    }

    #[test]
    fn manual_waits_for_confirmation_or_cancel() {
        let mut memory = crate::host::bridge::NoBridge;
        let sleeper = RecordingSleeper::new();
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();
        let mut ctx = ReadyContext {
            memory: &mut memory,
            sleeper: &sleeper,
            confirm: Some(&rx),
            cancel: &cancel,
        };
        assert_eq!(DataReadyPolicy::Manual.wait(&mut ctx), Ok(Ready::Confirmed));

        cancel.cancel();
        assert_eq!(
            DataReadyPolicy::Manual.wait(&mut ctx),
            Err(DataNotReadyError::Cancelled)
        );
    }

    #[test]
    fn policy_json_forms() {
        let p: DataReadyPolicy = serde_json::from_str(
            r#"{"mode": "polling", "addresses": ["0x43C00FFC"], "max_polls": 10,
                "interval_ms": 500, "expected_value": "0x00000001"}"#,
        )
        .unwrap();
        assert_eq!(
            p,
            DataReadyPolicy::Polling {
                addresses: vec![0x43C0_0FFC],
                max_polls: 10,
                interval_ms: 500,
                expected_value: 1
            }
        );
        let p: DataReadyPolicy =
            serde_json::from_str(r#"{"mode": "fixed_delay", "seconds": 5}"#).unwrap();
        assert_eq!(p, DataReadyPolicy::FixedDelay { seconds: 5 });
        assert_eq!(
            serde_json::to_string(&DataReadyPolicy::Manual).unwrap(),
            r#"{"mode":"manual"}"#
        );
    }
}
