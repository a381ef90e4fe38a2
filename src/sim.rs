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

//! In-process stand-ins for the board: a transport wired straight into a [`TargetMachine`] and a
//! memory image behind the [`MemoryReader`] trait. Used by tests and demos.

use crate::error::{FramingError, LinkError};
use crate::host::bridge::MemoryReader;
use crate::protocol::codec::MAX_COMMAND_LEN;
use crate::protocol::{LineFramer, Response};
use crate::target::TargetMachine;
use crate::transport::Transport;
use log::debug;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

/// Host-side [`Transport`] whose peer is a [`TargetMachine`] in the same process. Every written
/// command is handled immediately and its reply lines are queued for reading.
pub struct LoopbackTarget {
    machine: TargetMachine,
    framer: LineFramer,
    outbound: VecDeque<String>,
    drop_replies: u32,
    commands_seen: u32,
}

impl LoopbackTarget {
    /// The READY banner is queued right away, as a freshly started target would send it.
    pub fn new(machine: TargetMachine) -> Self {
        let mut outbound = VecDeque::new();
        outbound.push_back(TargetMachine::banner().to_line());
        Self {
            machine,
            framer: LineFramer::new(MAX_COMMAND_LEN - 1),
            outbound,
            drop_replies: 0,
            commands_seen: 0,
        }
    }

    /// Swallow the replies to the next `count` commands, as if they were lost on the wire.
    pub fn drop_next_replies(&mut self, count: u32) {
        self.drop_replies = count;
    }

    pub fn machine(&self) -> &TargetMachine {
        &self.machine
    }

    /// Complete command lines received so far, malformed ones included.
    pub fn commands_seen(&self) -> u32 {
        self.commands_seen
    }

    fn queue(&mut self, lines: Vec<String>) {
        if self.drop_replies > 0 {
            self.drop_replies -= 1;
            debug!("Dropping {} reply line(s)", lines.len());
            return;
        }
        self.outbound.extend(lines);
    }
}

impl Transport for LoopbackTarget {
    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        if self.machine.is_exiting() {
            return Err(LinkError::Closed);
        }
        self.framer.push(line.as_bytes());
        while let Some(next) = self.framer.next_line() {
            self.commands_seen += 1;
            let lines = match next {
                Ok(command) => {
                    let reply = self.machine.handle_line(&command);
                    let mut lines = reply.chatter;
                    lines.push(reply.response.to_line());
                    lines
                }
                Err(e) => {
                    let reason = match e {
                        FramingError::Overlong { .. } => "Command too long",
                        _ => "Command is not ASCII",
                    };
                    vec![Response::error(reason).to_line()]
                }
            };
            self.queue(lines);
            if self.machine.is_exiting() {
                break;
            }
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        match self.outbound.pop_front() {
            Some(line) => Ok(line),
            None if self.machine.is_exiting() => Err(LinkError::Closed),
            None => Err(LinkError::Timeout(timeout)),
        }
    }

    fn discard_pending(&mut self) -> Result<(), LinkError> {
        self.outbound.clear();
        Ok(())
    }
}

/// Sparse little-endian memory with scripted failures and delayed writes.
#[derive(Debug, Default)]
pub struct MemoryImage {
    chunks: BTreeMap<u32, Vec<u8>>,
    failing: HashSet<u32>,
    fail_next: u32,
    scheduled: Vec<(u32, u32, u32)>,
    reads: u32,
}

impl MemoryImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `address`. Later loads win where they overlap.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> &mut Self {
        for (i, &b) in bytes.iter().enumerate() {
            self.poke(address.wrapping_add(i as u32), b);
        }
        self
    }

    pub fn load_words(&mut self, address: u32, words: &[u32]) -> &mut Self {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.load(address, &bytes)
    }

    /// Reads starting exactly at `address` fail.
    pub fn fail_at(&mut self, address: u32) -> &mut Self {
        self.failing.insert(address);
        self
    }

    /// The next `count` reads fail whatever their address.
    pub fn fail_next(&mut self, count: u32) -> &mut Self {
        self.fail_next = count;
        self
    }

    /// Store `value` at `address` once `after_reads` reads have been made.
    pub fn schedule_word(&mut self, address: u32, value: u32, after_reads: u32) -> &mut Self {
        self.scheduled.push((address, value, after_reads));
        self
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    fn poke(&mut self, address: u32, value: u8) {
        if let Some((&start, chunk)) = self.chunks.range_mut(..=address).next_back() {
            let offset = (address - start) as usize;
            if offset < chunk.len() {
                chunk[offset] = value;
                return;
            }
            if offset == chunk.len() {
                chunk.push(value);
                return;
            }
        }
        self.chunks.insert(address, vec![value]);
    }

    fn peek(&self, address: u32) -> Option<u8> {
        let (&start, chunk) = self.chunks.range(..=address).next_back()?;
        chunk.get((address - start) as usize).copied()
    }

    fn apply_scheduled(&mut self) {
        let due: Vec<(u32, u32)> = self
            .scheduled
            .iter()
            .filter(|(_, _, after)| *after <= self.reads)
            .map(|&(address, value, _)| (address, value))
            .collect();
        self.scheduled.retain(|(_, _, after)| *after > self.reads);
        for (address, value) in due {
            self.load_words(address, &[value]);
        }
    }
}

impl MemoryReader for MemoryImage {
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, LinkError> {
        self.apply_scheduled();
        self.reads += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(LinkError::Bridge("injected read failure".to_string()));
        }
        if self.failing.contains(&address) {
            return Err(LinkError::Bridge(format!(
                "Memory read error at 0x{:08X}",
                address
            )));
        }
        let mut bytes = Vec::with_capacity(length as usize);
        for i in 0..length {
            match self.peek(address.wrapping_add(i)) {
                Some(b) => bytes.push(b),
                None => break,
            }
        }
        if bytes.is_empty() && length > 0 {
            return Err(LinkError::Bridge(format!(
                "address 0x{:08X} is not mapped",
                address
            )));
        }
        Ok(bytes)
    }
}
