//! Gatehouse CI
//!
//! Runs a pipeline of independent jobs against a checked-out ref and reduces
//! their outcomes to a single pass/fail verdict:
//! - Trigger matching turns accepted events into pipeline runs
//! - Every job gets its own execution context and runs concurrently
//! - Steps inside a job run in order and stop at the first failure
//! - Toolchains are provisioned per context through rustup

pub mod checkout;
pub mod context;
pub mod fakes;
pub mod gate;
pub mod job;
pub mod pipeline;
pub mod process;
pub mod provisioner;
pub mod scheduler;
pub mod sink;
pub mod trigger;

// Re-export key types
pub use checkout::{GitCheckout, WorkingCopyCheckout};
pub use context::LocalContextProvider;
pub use gate::{GateAggregator, INCOMPLETE_REASON};
pub use job::JobRunner;
pub use pipeline::PipelineRunner;
pub use process::ProcessCommandRunner;
pub use provisioner::{RustupInstaller, ToolchainProvisioner};
pub use scheduler::JobScheduler;
pub use sink::TracingLogSink;
pub use trigger::TriggerListener;
