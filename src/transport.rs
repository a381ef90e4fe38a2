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

use crate::error::LinkError;
use crate::protocol::LineFramer;
use log::trace;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

/// Upper bound on one blocking read, so a read window is re-checked at least this often.
const READ_SLICE: Duration = Duration::from_millis(50);

/// A line-oriented, half-duplex text channel. Both ends of the link (host dispatcher and
/// target state machine) talk through this.
pub trait Transport {
    /// Write one already-encoded line. `line` must carry its own terminator.
    fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Block until one complete line arrives (returned without terminator) or `timeout`
    /// elapses. A partial line still pending when the window closes is reported as a framing
    /// error; its bytes stay buffered until [`Transport::discard_pending`].
    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError>;

    /// Drop everything received so far that has not been read as a line.
    fn discard_pending(&mut self) -> Result<(), LinkError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        (**self).write_line(line)
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        (**self).read_line(timeout)
    }

    fn discard_pending(&mut self) -> Result<(), LinkError> {
        (**self).discard_pending()
    }
}

/// Byte stream with an adjustable blocking-read timeout.
pub trait LineStream: Read + Write {
    fn set_read_window(&mut self, timeout: Duration) -> io::Result<()>;

    fn discard_input(&mut self) -> io::Result<()> {
        let mut scratch = [0u8; 256];
        self.set_read_window(Duration::from_millis(1))?;
        loop {
            match self.read(&mut scratch) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if is_idle(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

impl LineStream for TcpStream {
    fn set_read_window(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero timeout means "block forever" for sockets.
        self.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
    }
}

impl LineStream for Box<dyn SerialPort> {
    fn set_read_window(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// [`Transport`] over any [`LineStream`], framing with a [`LineFramer`].
pub struct StreamTransport<S: LineStream> {
    stream: S,
    framer: LineFramer,
    scratch: [u8; 256],
}

pub type TcpTransport = StreamTransport<TcpStream>;
pub type SerialTransport = StreamTransport<Box<dyn SerialPort>>;

impl<S: LineStream> StreamTransport<S> {
    /// `line_limit` is the longest line accepted from the peer.
    pub fn new(stream: S, line_limit: usize) -> Self {
        Self {
            stream,
            framer: LineFramer::new(line_limit),
            scratch: [0u8; 256],
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl TcpTransport {
    /// Connects to a server at `addr` (eg "127.0.0.1:9257")
    pub fn connect(addr: &str, line_limit: usize) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, line_limit))
    }

    /// Bind to `addr`, accept a single connection and return a transport.
    pub fn listen_and_accept(addr: &str, line_limit: usize) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)?;
        let (stream, peer) = listener.accept()?;
        log::info!("Accepted connection from {}", peer);
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, line_limit))
    }
}

impl SerialTransport {
    pub fn open_serial(port: &str, baud: u32, line_limit: usize) -> Result<Self, LinkError> {
        let port = serialport::new(port, baud).timeout(READ_SLICE).open()?;
        Ok(Self::new(port, line_limit))
    }
}

impl<S: LineStream> Transport for StreamTransport<S> {
    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        trace!("-> {:?}", line);
        self.stream.write_all(line.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.framer.next_line() {
                let line = line?;
                trace!("<- {:?}", line);
                return Ok(line);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(match self.framer.check_unterminated() {
                    Some(framing) => LinkError::Framing(framing),
                    None => LinkError::Timeout(timeout),
                });
            }
            self.stream.set_read_window((deadline - now).min(READ_SLICE))?;
            match self.stream.read(&mut self.scratch) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => self.framer.push(&self.scratch[..n]),
                Err(e) if is_idle(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn discard_pending(&mut self) -> Result<(), LinkError> {
        self.framer.clear();
        self.stream.discard_input()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory stream: reads from a fixed script, records writes.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.input.read(buf)?;
            if n == 0 {
                return Err(io::Error::new(ErrorKind::TimedOut, "idle"));
            }
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LineStream for ScriptedStream {
        fn set_read_window(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    fn scripted(input: &[u8]) -> StreamTransport<ScriptedStream> {
        StreamTransport::new(
            ScriptedStream {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            },
            64,
        )
    }

    #[test]
    fn reads_lines_and_records_writes() {
        let mut t = scripted(b"READY\r\nINIT_OK\r\n");
        t.write_line("init\r\n").unwrap();
        assert_eq!(t.read_line(Duration::from_millis(5)).unwrap(), "READY");
        assert_eq!(t.read_line(Duration::from_millis(5)).unwrap(), "INIT_OK");
        assert!(t
            .read_line(Duration::from_millis(5))
            .unwrap_err()
            .is_timeout());
        assert_eq!(t.into_inner().output, b"init\r\n");
    }

    #[test]
    fn partial_line_at_deadline_is_framing_error() {
        let mut t = scripted(b"RUN_");
        match t.read_line(Duration::from_millis(5)) {
            Err(LinkError::Framing(crate::error::FramingError::Unterminated { pending })) => {
                assert_eq!(pending, 4)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn discard_drops_buffered_lines() {
        let mut t = scripted(b"READY\r\nstale\r\n");
        t.discard_pending().unwrap();
        assert!(t
            .read_line(Duration::from_millis(5))
            .unwrap_err()
            .is_timeout());
    }
}
