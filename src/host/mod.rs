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

//! Host side of the link: dispatching commands, waiting for data and capturing memory.

pub mod bridge;
pub mod capture;
pub mod data_ready;
pub mod dispatcher;
pub mod pipeline;
pub mod run;

pub use bridge::{MemoryReader, NoBridge, XsdbBridge, XsdbOptions};
pub use capture::{capture, CaptureSession, MemoryRegion, RegionCapture};
pub use data_ready::{DataReadyPolicy, Ready, ReadyContext};
pub use dispatcher::{HostDispatcher, RetryPolicy};
pub use pipeline::{run_pipeline, CapturePlan, CaptureReport};
