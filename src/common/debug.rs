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

//! Process-wide logging setup.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Start the global logger. Everything goes to stderr so stdout stays free for
/// JSON output.
///
/// `spec` takes precedence over `debug`; without either the level is `info`.
/// The returned handle must be kept alive for the lifetime of the process.
pub fn init_logging(debug: bool, spec: Option<&str>) -> Result<LoggerHandle, FlexiLoggerError> {
    let default_spec = if debug { "debug" } else { "info" };
    Logger::try_with_str(spec.unwrap_or(default_spec))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
}
