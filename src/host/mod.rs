//! External test host orchestration.
//!
//! A [`TestHostRunner`] owns one test project. It launches the host through a
//! [`ProcessHandle`], reads the binary artifact the host's data collector
//! writes, and keeps re-running whatever is still pending until every
//! requested test has a result, even when individual tests take the host down.

pub mod args;
pub mod codec;
pub mod config;
pub mod process;
pub mod progress;
pub mod results;
pub mod runner;
pub mod state;

pub use args::HostArgs;
pub use codec::{BincodeCodec, CodecError, ResultCodec};
pub use config::{ConfigError, HostConfig};
pub use process::{ProcessError, ProcessHandle, ProcessOutput};
pub use progress::{FnProgress, LogProgress, ProgressSink};
pub use results::{CoverageEntry, MutationCoverageMap, TestOutcome, TestResult, TestResultsBatch};
pub use runner::{Phase, RunError, TestHostRunner};
pub use state::PendingTestSet;
