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

//! Entry point for the `serve` subcommand: runs the target state machine as an emulator so the
//! host side can be exercised without hardware.

use crate::common::clock::{CancelToken, ThreadSleeper};
use crate::protocol::codec::MAX_COMMAND_LEN;
use crate::target::{serve, TargetMachine, TargetTiming};
use crate::transport::{SerialTransport, TcpTransport};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Accept one TCP connection on this address (eg 127.0.0.1:9257)
    #[arg(short = 'l', long = "listen", conflicts_with = "serial")]
    pub listen: Option<String>,

    /// Serve on a serial port instead (eg /dev/ttyUSB1)
    #[arg(short = 's', long = "serial")]
    pub serial: Option<String>,

    /// Baud rate for --serial
    #[arg(short = 'b', long = "baud", default_value_t = 115_200)]
    pub baud: u32,

    /// Skip the simulated run_app/capture_ram delays
    #[arg(long = "fast", default_value_t = false)]
    pub fast: bool,
}

pub fn run(args: ServeArgs) -> Result<()> {
    let timing = if args.fast {
        TargetTiming {
            run_app: Duration::ZERO,
            capture_ram: Duration::ZERO,
        }
    } else {
        TargetTiming::default()
    };
    let mut machine = TargetMachine::with_timing(Arc::new(ThreadSleeper), timing);
    let cancel = CancelToken::new();
    // The target's receive buffer holds MAX_COMMAND_LEN bytes including the NUL.
    let line_limit = MAX_COMMAND_LEN - 1;

    match (&args.listen, &args.serial) {
        (_, Some(port)) => {
            let mut transport = SerialTransport::open_serial(port, args.baud, line_limit)
                .with_context(|| format!("Failed to open serial port {}", port))?;
            log::info!("Serving on {} at {} baud", port, args.baud);
            serve(&mut transport, &mut machine, &cancel)?;
        }
        (listen, None) => {
            let addr = listen.as_deref().unwrap_or("127.0.0.1:9257");
            log::info!("Waiting for a host connection on {}", addr);
            let mut transport = TcpTransport::listen_and_accept(addr, line_limit)
                .with_context(|| format!("Failed to accept on {}", addr))?;
            serve(&mut transport, &mut machine, &cancel)?;
        }
    }
    Ok(())
}
