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

//! One capture run from start to finish:
//!
//! ```text
//! [READY] -> init -> set_param x3 -> run_app -> data ready? -> capture_ram
//!         -> read regions -> analyze -> CaptureReport
//! ```

use crate::analysis::{analyze, FindingsReport};
use crate::common::clock::CancelToken;
use crate::error::{PartialCaptureError, PipelineError};
use crate::host::bridge::MemoryReader;
use crate::host::capture::{capture, CaptureSession, MemoryRegion};
use crate::host::data_ready::{DataReadyPolicy, ReadyContext};
use crate::host::dispatcher::HostDispatcher;
use crate::protocol::{Command, ParamName, ParameterSet, ResponseStatus};
use crate::transport::Transport;
use log::{info, warn};
use serde::Serialize;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// What to capture and how to know when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub parameters: ParameterSet,
    pub regions: Vec<MemoryRegion>,
    pub data_ready: DataReadyPolicy,
    /// Wait for the READY banner first, if set.
    pub wait_ready: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    pub session: CaptureSession,
    pub findings: FindingsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialCaptureError>,
}

pub fn run_pipeline<T: Transport, M: MemoryReader>(
    dispatcher: &mut HostDispatcher<T, M>,
    plan: &CapturePlan,
    confirm: Option<&Receiver<()>>,
    cancel: &CancelToken,
) -> Result<CaptureReport, PipelineError> {
    if let Some(timeout) = plan.wait_ready {
        dispatcher
            .wait_ready(timeout)
            .map_err(PipelineError::NotReady)?;
    }

    dispatcher.request(&Command::init(), ResponseStatus::InitOk)?;
    for name in ParamName::ALL {
        let value = plan.parameters.get(name);
        dispatcher.request(&Command::set_param(name, value), ResponseStatus::ParamSetOk)?;
    }
    dispatcher.request(&Command::run_app(), ResponseStatus::RunOk)?;

    // Each poll is one observation, so polling reads skip the dispatcher's retries.
    let sleeper = dispatcher.sleeper();
    let ready = plan.data_ready.wait(&mut ReadyContext {
        memory: dispatcher.memory_mut(),
        sleeper: sleeper.as_ref(),
        confirm,
        cancel,
    })?;
    info!("Data ready: {:?}", ready);

    dispatcher.request(&Command::capture_ram(), ResponseStatus::RamCaptureOk)?;
    let session = capture(&mut *dispatcher, &plan.regions, plan.parameters);
    let partial = session.partial_failure();
    if let Some(partial) = &partial {
        warn!("{}", partial);
    }

    let findings = FindingsReport::new(analyze(&session));
    info!(
        "Captured {} region(s), {} finding(s)",
        session.regions.len(),
        findings.total
    );
    Ok(CaptureReport {
        session,
        findings,
        partial,
    })
}
