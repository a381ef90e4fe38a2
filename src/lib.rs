// Crate root: declare modules and control visibility
pub mod analysis;
pub mod common;
pub mod config;
pub mod error;
pub mod host;
pub mod protocol;
pub mod sim;
pub mod target;
pub mod transport;

// Re-export commonly used API from the library for binaries/tests
pub use analysis::{analyze, FindingsReport};
pub use config::{load_config, RunConfig};
pub use host::{run_pipeline, CapturePlan, CaptureReport, HostDispatcher, RetryPolicy};
pub use target::TargetMachine;
