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

//! Target side of the link: the command state machine and the loop that serves it.

pub mod machine;
pub mod run;
pub mod serve;

pub use machine::{Reply, TargetMachine, TargetState, TargetStatus, TargetTiming, HELP_TEXT};
pub use serve::serve;
