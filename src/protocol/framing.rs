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

//! Splits a raw byte stream into text lines.
//!
//! Either CR or LF ends a line, so CRLF, bare LF and bare CR all work and the empty segment
//! between CR and LF is skipped. A line longer than `limit` is reported once as
//! [`FramingError::Overlong`] and the rest of it, up to the next terminator, is dropped. This
//! mirrors the fixed receive buffer on the target, which can never hold more than that.

use crate::error::FramingError;

pub struct LineFramer {
    buf: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl LineFramer {
    /// `limit` is the longest line content accepted, terminator excluded.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit + 2),
            limit,
            discarding: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet part of a complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<Result<String, FramingError>> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\r' || b == b'\n') else {
                if self.discarding {
                    self.buf.clear();
                } else if self.buf.len() > self.limit {
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Err(FramingError::Overlong { limit: self.limit }));
                }
                return None;
            };

            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            // CRLF is one terminator, not a line plus an empty one.
            if line.pop() == Some(b'\r') && self.buf.first() == Some(&b'\n') {
                self.buf.remove(0);
            }

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.is_empty() {
                continue;
            }
            if line.len() > self.limit {
                return Some(Err(FramingError::Overlong { limit: self.limit }));
            }
            if !line.is_ascii() {
                return Some(Err(FramingError::NonAscii));
            }
            // ASCII was checked above, so this cannot fail.
            return Some(String::from_utf8(line).map_err(|_| FramingError::NonAscii));
        }
    }

    /// Called when a read window closes with no complete line. Reports a partial line but
    /// keeps its bytes, so a slow sender can still finish it in the next window.
    pub fn check_unterminated(&self) -> Option<FramingError> {
        // A CR whose LF has not arrived yet leaves only terminators behind.
        if self.discarding || self.buf.iter().all(|&b| b == b'\r' || b == b'\n') {
            return None;
        }
        Some(FramingError::Unterminated {
            pending: self.buf.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<Result<String, FramingError>> {
        std::iter::from_fn(|| framer.next_line()).collect()
    }

    #[test]
    fn splits_on_any_terminator() {
        let mut f = LineFramer::new(64);
        f.push(b"INIT_OK\r\nRUN_OK\nEXIT_OK\r");
        assert_eq!(
            drain(&mut f),
            vec![
                Ok("INIT_OK".to_string()),
                Ok("RUN_OK".to_string()),
                Ok("EXIT_OK".to_string())
            ]
        );
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn partial_line_waits_for_more_bytes() {
        let mut f = LineFramer::new(64);
        f.push(b"PARAM_SE");
        assert!(f.next_line().is_none());
        f.push(b"T_OK\r\n");
        assert_eq!(f.next_line(), Some(Ok("PARAM_SET_OK".to_string())));
    }

    #[test]
    fn overlong_line_is_reported_once_and_skipped() {
        let mut f = LineFramer::new(8);
        f.push(b"0123456789");
        assert_eq!(f.next_line(), Some(Err(FramingError::Overlong { limit: 8 })));
        f.push(b"abcdef\r\nOK\r\n");
        assert_eq!(f.next_line(), Some(Ok("OK".to_string())));
        assert!(f.next_line().is_none());
    }

    #[test]
    fn overlong_complete_line_in_one_chunk() {
        let mut f = LineFramer::new(4);
        f.push(b"TOOLONG\r\nOK\r\n");
        assert_eq!(f.next_line(), Some(Err(FramingError::Overlong { limit: 4 })));
        assert_eq!(f.next_line(), Some(Ok("OK".to_string())));
    }

    #[test]
    fn unterminated_tail_is_reported_but_kept() {
        let mut f = LineFramer::new(64);
        f.push(b"STATUS: IDLE");
        assert!(f.next_line().is_none());
        assert_eq!(
            f.check_unterminated(),
            Some(FramingError::Unterminated { pending: 12 })
        );
        f.push(b", P1: 0x00000001\r\n");
        assert_eq!(
            f.next_line(),
            Some(Ok("STATUS: IDLE, P1: 0x00000001".to_string()))
        );
        assert_eq!(f.check_unterminated(), None);
    }

    #[test]
    fn crlf_leaves_nothing_pending() {
        let mut f = LineFramer::new(64);
        f.push(b"INIT_OK\r\n");
        assert_eq!(f.next_line(), Some(Ok("INIT_OK".to_string())));
        assert_eq!(f.pending(), 0);
        assert_eq!(f.check_unterminated(), None);

        // LF of a CRLF pair arriving in the next chunk.
        f.push(b"RUN_OK\r");
        assert_eq!(f.next_line(), Some(Ok("RUN_OK".to_string())));
        f.push(b"\n");
        assert_eq!(f.check_unterminated(), None);
        assert!(f.next_line().is_none());
        assert_eq!(f.pending(), 0);
    }

    #[test]
    fn non_ascii_rejected() {
        let mut f = LineFramer::new(64);
        f.push(&[b'O', 0xC3, 0xA9, b'\n']);
        assert_eq!(f.next_line(), Some(Err(FramingError::NonAscii)));
    }
}
