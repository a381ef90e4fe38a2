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

//! Raw memory reads through the debug bridge.
//!
//! The command channel only carries control traffic. Memory contents are pulled out-of-band by
//! the JTAG debugger, here `xsdb` driven as a long-lived child process:
//!
//! ```text
//! targets 2
//! mrd -force 0x43C00000 4
//! puts __jtag_uart_link_7__
//!
//! 43C00000:   12345678
//! 43C00004:   00000000
//! ...
//! __jtag_uart_link_7__
//! ```

use crate::error::LinkError;
use log::{debug, trace, warn};
use regex::Regex;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

const MARKER_PREFIX: &str = "__jtag_uart_link_";

/// The raw read primitive used by polling and capture.
pub trait MemoryReader {
    /// Read `length` bytes starting at `address`. Fewer bytes than asked for means the bridge
    /// only got part of the range.
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, LinkError>;
}

impl<M: MemoryReader + ?Sized> MemoryReader for Box<M> {
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, LinkError> {
        (**self).read_memory(address, length)
    }
}

/// Used when no bridge is configured. Every read fails, which is fine for policies that never
/// read memory, and makes a capture report every region as failed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBridge;

impl MemoryReader for NoBridge {
    fn read_memory(&mut self, address: u32, _length: u32) -> Result<Vec<u8>, LinkError> {
        Err(LinkError::Bridge(format!(
            "no debug bridge configured, cannot read 0x{:08X}",
            address
        )))
    }
}

#[derive(Debug, Clone)]
pub struct XsdbOptions {
    pub program: String,
    /// Index passed to `targets <n>` before the first read.
    pub target: u32,
    pub timeout: Duration,
}

pub struct XsdbBridge {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    options: XsdbOptions,
    target_selected: bool,
    exchanges: u32,
}

fn mrd_line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([0-9A-Fa-f]{1,8}):\s+([0-9A-Fa-f]{1,8})\s*$").ok())
        .as_ref()
}

impl XsdbBridge {
    pub fn spawn(options: XsdbOptions) -> Result<Self, LinkError> {
        debug!("Starting {}", options.program);
        let mut child = Command::new(&options.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LinkError::Bridge("failed to capture xsdb stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LinkError::Bridge("failed to capture xsdb stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("xsdb-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            child,
            stdin,
            lines: rx,
            options,
            target_selected: false,
            exchanges: 0,
        })
    }

    /// Run one xsdb command and collect its output lines up to the end marker.
    fn exchange(&mut self, command: &str) -> Result<Vec<String>, LinkError> {
        self.exchanges += 1;
        let marker = format!("{}{}__", MARKER_PREFIX, self.exchanges);
        trace!("xsdb -> {}", command);
        write!(self.stdin, "{}\nputs {}\n", command, marker)?;
        self.stdin.flush()?;

        let deadline = Instant::now() + self.options.timeout;
        let mut output = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    trace!("xsdb <- {}", line);
                    let trimmed = line.trim();
                    if trimmed == marker {
                        return Ok(output);
                    }
                    if trimmed.starts_with(MARKER_PREFIX) {
                        // Tail of an exchange that timed out earlier.
                        debug!("Dropping {} stale xsdb line(s)", output.len());
                        output.clear();
                        continue;
                    }
                    output.push(line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(LinkError::Timeout(self.options.timeout))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Closed),
            }
        }
    }

    fn select_target(&mut self) -> Result<(), LinkError> {
        if self.target_selected {
            return Ok(());
        }
        let output = self.exchange(&format!("targets {}", self.options.target))?;
        if let Some(line) = output.iter().find(|l| is_error_line(l)) {
            return Err(LinkError::Bridge(line.trim().to_string()));
        }
        self.target_selected = true;
        Ok(())
    }
}

impl MemoryReader for XsdbBridge {
    fn read_memory(&mut self, address: u32, length: u32) -> Result<Vec<u8>, LinkError> {
        self.select_target()?;
        let words = length.div_ceil(4);
        let output = self.exchange(&format!("mrd -force 0x{:08X} {}", address, words))?;
        let values = parse_mrd_output(&output, address, words)?;
        let mut bytes = words_to_bytes(&values);
        bytes.truncate(length as usize);
        Ok(bytes)
    }
}

impl Drop for XsdbBridge {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "exit");
        let _ = self.stdin.flush();
        if let Err(e) = self.child.kill() {
            debug!("xsdb already gone: {}", e);
        }
        let _ = self.child.wait();
    }
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("no targets")
}

/// Pull the word values out of `mrd` output. Lines before the first one at `address` are
/// skipped; after it addresses must be consecutive and parsing stops at the first gap. An error line before any data is
/// reported as a bridge failure.
pub fn parse_mrd_output<S: AsRef<str>>(
    lines: &[S],
    address: u32,
    words: u32,
) -> Result<Vec<u32>, LinkError> {
    let re = mrd_line_regex()
        .ok_or_else(|| LinkError::Bridge("mrd output pattern failed to compile".to_string()))?;
    let mut values = Vec::with_capacity(words as usize);
    for line in lines {
        let line = line.as_ref();
        let Some(caps) = re.captures(line) else {
            if is_error_line(line) {
                if values.is_empty() {
                    return Err(LinkError::Bridge(line.trim().to_string()));
                }
                warn!("xsdb read stopped early: {}", line.trim());
                break;
            }
            continue;
        };
        let (Ok(at), Ok(value)) = (
            u32::from_str_radix(&caps[1], 16),
            u32::from_str_radix(&caps[2], 16),
        ) else {
            continue;
        };
        let expected = address.wrapping_add(4 * values.len() as u32);
        if values.is_empty() && at != expected {
            continue;
        }
        if at != expected {
            warn!("xsdb returned 0x{:08X}, expected 0x{:08X}", at, expected);
            break;
        }
        values.push(value);
        if values.len() as u32 == words {
            break;
        }
    }
    Ok(values)
}

/// Zynq PS memory is little-endian.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_consecutive_words() {
        let out = [
            "43C00000:   12345678",
            "43C00004:   DEADBEEF",
            "",
            "43C00008:   00000000",
        ];
        let values = parse_mrd_output(&out, 0x43C0_0000, 3).unwrap();
        assert_eq!(values, vec![0x1234_5678, 0xDEAD_BEEF, 0]);
    }

    #[test]
    fn stops_at_address_gap() {
        let out = ["1000:   00000001", "1008:   00000002"];
        assert_eq!(parse_mrd_output(&out, 0x1000, 2).unwrap(), vec![1]);
    }

    #[test]
    fn mrd_pattern_compiles() {
        assert!(mrd_line_regex().is_some());
    }

    #[test]
    fn skips_lines_before_requested_address() {
        let out = ["1FFC:   0000000A", "2000:   00000001", "2004:   00000002"];
        assert_eq!(parse_mrd_output(&out, 0x2000, 2).unwrap(), vec![1, 2]);
    }

    // Stand-in for xsdb: echoes `puts` markers and answers every `mrd` with one word. The
    // first `mrd` answers late.
    #[cfg(unix)]
    const SLOW_XSDB: &str = r#"#!/bin/sh
n=0
while IFS= read -r line; do
  case "$line" in
    mrd*) n=$((n+1)); if [ "$n" = 1 ]; then sleep 0.5; fi; echo "00002000:   12345678";;
    puts*) echo "${line#puts }";;
    exit) exit 0;;
  esac
done
"#;

    #[cfg(unix)]
    #[test]
    fn late_output_does_not_leak_into_next_read() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("xsdb");
        std::fs::write(&script, SLOW_XSDB).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut bridge = XsdbBridge::spawn(XsdbOptions {
            program: script.to_string_lossy().into_owned(),
            target: 1,
            timeout: Duration::from_millis(200),
        })
        .unwrap();
        assert!(matches!(
            bridge.read_memory(0x2000, 4),
            Err(LinkError::Timeout(_))
        ));
        // Let the late reply and its marker land in the queue.
        thread::sleep(Duration::from_millis(500));
        assert_eq!(
            bridge.read_memory(0x2000, 4).unwrap(),
            vec![0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn error_before_data_is_bridge_failure() {
        let out = ["Memory read error at 0x43C00000. Blocked address 0x43C00000"];
        assert!(matches!(
            parse_mrd_output(&out, 0x43C0_0000, 1),
            Err(LinkError::Bridge(_))
        ));
    }

    #[test]
    fn little_endian_bytes() {
        assert_eq!(words_to_bytes(&[0x4433_2211]), vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn no_bridge_always_fails() {
        assert!(NoBridge.read_memory(0x1000, 4).is_err());
    }
}
