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

//! Entry points for the host-side subcommands, `send` and `capture`.

use crate::common::clock::{CancelToken, ThreadSleeper};
use crate::config::{load_config, BridgeConfig, LinkConfig};
use crate::error::LinkError;
use crate::host::bridge::{MemoryReader, NoBridge, XsdbBridge, XsdbOptions};
use crate::host::data_ready::DataReadyPolicy;
use crate::host::dispatcher::{HostDispatcher, RetryPolicy};
use crate::host::pipeline::run_pipeline;
use crate::protocol::codec::MAX_RESPONSE_LEN;
use crate::protocol::{decode_command, Incoming};
use crate::transport::{SerialTransport, TcpTransport, Transport};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Open the command channel described by `link`.
pub fn connect_link(link: &LinkConfig) -> Result<Box<dyn Transport>, LinkError> {
    // Lines from the target are bounded by its response buffer.
    let limit = MAX_RESPONSE_LEN - 1;
    Ok(match link {
        LinkConfig::Serial { port, baud } => {
            Box::new(SerialTransport::open_serial(port, *baud, limit)?)
        }
        LinkConfig::Tcp { addr } => Box::new(TcpTransport::connect(addr, limit)?),
    })
}

pub fn open_bridge(bridge: &BridgeConfig) -> Result<Box<dyn MemoryReader>, LinkError> {
    Ok(match bridge {
        BridgeConfig::Xsdb {
            program,
            target,
            timeout_ms,
        } => Box::new(XsdbBridge::spawn(XsdbOptions {
            program: program.clone(),
            target: *target,
            timeout: Duration::from_millis(*timeout_ms),
        })?),
        BridgeConfig::None => Box::new(NoBridge),
    })
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Target address for a TCP link (eg 127.0.0.1:9257)
    #[arg(short = 'c', long = "connect", conflicts_with = "serial")]
    pub connect: Option<String>,

    /// Serial port of the JTAG UART tunnel
    #[arg(short = 's', long = "serial")]
    pub serial: Option<String>,

    #[arg(short = 'b', long = "baud", default_value_t = 115_200)]
    pub baud: u32,

    /// Per-attempt response timeout in milliseconds
    #[arg(short = 't', long = "timeout-ms", default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Attempts after the first one
    #[arg(short = 'r', long = "retries", default_value_t = 2)]
    pub retries: u32,

    /// Command line to send, eg `set_param param2 0x40000000`
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

pub fn run_send(args: SendArgs) -> Result<()> {
    let line = args.command.join(" ");
    let command = match decode_command(&line) {
        Incoming::Command(command) => command,
        Incoming::Unknown(_) => bail!("`{}` is not a known command", line),
    };
    let link = match (args.connect, args.serial) {
        (_, Some(port)) => LinkConfig::Serial {
            port,
            baud: args.baud,
        },
        (Some(addr), None) => LinkConfig::Tcp { addr },
        (None, None) => bail!("Give either --connect or --serial"),
    };
    let transport = connect_link(&link).context("Failed to open the command channel")?;
    let policy = RetryPolicy {
        timeout: Duration::from_millis(args.timeout_ms),
        max_retries: args.retries,
        ..RetryPolicy::default()
    };
    let mut dispatcher = HostDispatcher::new(transport, NoBridge, policy, Arc::new(ThreadSleeper));
    let response = dispatcher.send(&command)?;
    println!("{}", response);
    Ok(())
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// JSON run configuration
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,
}

pub fn run_capture(args: CaptureArgs) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let transport = connect_link(&config.link).context("Failed to open the command channel")?;
    let memory = open_bridge(&config.bridge).context("Failed to start the debug bridge")?;
    let mut dispatcher = HostDispatcher::new(
        transport,
        memory,
        config.dispatcher,
        Arc::new(ThreadSleeper),
    );

    let (confirm_tx, confirm_rx) = mpsc::channel();
    if config.data_ready == DataReadyPolicy::Manual {
        std::thread::spawn(move || {
            eprintln!("Press Enter once the application data is ready...");
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_ok() {
                let _ = confirm_tx.send(());
            }
        });
    }

    let cancel = CancelToken::new();
    let report = run_pipeline(&mut dispatcher, &config.plan(), Some(&confirm_rx), &cancel)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
