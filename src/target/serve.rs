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

//! Receive loop for the target side: one command in, its reply out, repeat until `exit`.

use crate::common::clock::CancelToken;
use crate::error::{FramingError, LinkError};
use crate::protocol::Response;
use crate::target::machine::{Reply, TargetMachine};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::time::Duration;

/// How long one blocking receive waits before the loop re-checks for cancellation.
pub const RECEIVE_WINDOW: Duration = Duration::from_millis(250);

/// Serve commands until the machine reaches `Exiting`, the peer closes the link, or `cancel`
/// fires. A malformed line is answered with `ERROR: ...` and the loop keeps going.
pub fn serve<T: Transport + ?Sized>(
    transport: &mut T,
    machine: &mut TargetMachine,
    cancel: &CancelToken,
) -> Result<(), LinkError> {
    transport.write_line(&TargetMachine::banner().encode())?;
    info!("JTAG UART handler started, waiting for commands");

    while !machine.is_exiting() {
        if cancel.is_cancelled() {
            info!("Serve loop cancelled");
            break;
        }
        let line = match transport.read_line(RECEIVE_WINDOW) {
            Ok(line) => line,
            Err(LinkError::Timeout(_)) => continue,
            // A command still arriving; its bytes stay buffered.
            Err(LinkError::Framing(FramingError::Unterminated { .. })) => continue,
            Err(LinkError::Framing(e)) => {
                warn!("Dropping malformed command: {}", e);
                transport.write_line(&Response::error(framing_reason(&e)).encode())?;
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!("Received command line {:?}", line);
        let reply = machine.handle_line(&line);
        send_reply(transport, &reply)?;
    }

    info!("JTAG UART handler stopped");
    Ok(())
}

pub fn send_reply<T: Transport + ?Sized>(transport: &mut T, reply: &Reply) -> Result<(), LinkError> {
    for line in &reply.chatter {
        transport.write_line(&format!("{}\r\n", line))?;
    }
    transport.write_line(&reply.response.encode())
}

fn framing_reason(e: &FramingError) -> &'static str {
    match e {
        FramingError::Overlong { .. } => "Command too long",
        FramingError::NonAscii => "Command is not ASCII",
        FramingError::Unterminated { .. } => "Command not terminated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::RecordingSleeper;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Feeds scripted reads and records every written line.
    struct Scripted {
        incoming: VecDeque<Result<String, LinkError>>,
        written: Vec<String>,
    }

    impl Transport for Scripted {
        fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
            self.written.push(line.to_string());
            Ok(())
        }

        fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
            self.incoming
                .pop_front()
                .unwrap_or(Err(LinkError::Closed))
                .map_err(|e| match e {
                    LinkError::Timeout(_) => LinkError::Timeout(timeout),
                    other => other,
                })
        }

        fn discard_pending(&mut self) -> Result<(), LinkError> {
            Ok(())
        }
    }

    #[test]
    fn serves_until_exit() {
        let mut transport = Scripted {
            incoming: VecDeque::from(vec![
                Ok("init".to_string()),
                Err(LinkError::Timeout(Duration::ZERO)),
                Err(LinkError::Framing(FramingError::Overlong { limit: 255 })),
                Ok("bogus".to_string()),
                Ok("exit".to_string()),
                Ok("get_status".to_string()),
            ]),
            written: Vec::new(),
        };
        let mut machine = TargetMachine::new(Arc::new(RecordingSleeper::new()));
        serve(&mut transport, &mut machine, &CancelToken::new()).unwrap();

        assert_eq!(
            transport.written,
            vec![
                "READY\r\n",
                "INIT_OK\r\n",
                "ERROR: Command too long\r\n",
                "ERROR: Unknown command\r\n",
                "EXIT_OK\r\n",
            ]
        );
        // get_status after exit is never read.
        assert_eq!(transport.incoming.len(), 1);
    }

    #[test]
    fn closed_link_is_an_error() {
        let mut transport = Scripted {
            incoming: VecDeque::new(),
            written: Vec::new(),
        };
        let mut machine = TargetMachine::new(Arc::new(RecordingSleeper::new()));
        assert!(matches!(
            serve(&mut transport, &mut machine, &CancelToken::new()),
            Err(LinkError::Closed)
        ));
    }

    #[test]
    fn chatter_precedes_response() {
        let mut transport = Scripted {
            incoming: VecDeque::new(),
            written: Vec::new(),
        };
        let mut machine = TargetMachine::new(Arc::new(RecordingSleeper::new()));
        let reply = machine.handle_line("capture_ram");
        send_reply(&mut transport, &reply).unwrap();
        assert_eq!(transport.written.last().unwrap(), "RAM_CAPTURE_OK\r\n");
        assert_eq!(transport.written[0], "Capturing RAM data...\r\n");
    }
}
