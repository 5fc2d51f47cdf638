//! Load-generation engine: a pool of workers issuing requests against one
//! target through a pluggable transport, optionally paced to an aggregate
//! rate, with lock-light latency and throughput aggregation.

pub mod body;
pub mod client;
pub mod drain;
pub mod error;
pub mod limiter;
pub mod outcome;
pub mod recorder;
pub mod result;
pub mod runner;
pub mod spec;

pub use crate::client::ClientKind;
pub use crate::error::{ErrorKind, FatalError, RequestError};
pub use crate::outcome::RequestOutcome;
pub use crate::recorder::{Progress, Recorder, Snapshot};
pub use crate::result::{RunResult, StopCause};
pub use crate::runner::Runner;
pub use crate::spec::{BodySource, ClientIdentity, RequestTemplate, RunSpec, TlsOptions};

/// Runs one load test to completion on a fresh multi-threaded runtime.
///
/// Must not be called from inside a Tokio runtime; use [`Runner::run`] there.
pub fn run(spec: RunSpec) -> Result<RunResult, FatalError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(FatalError::Runtime)?;
    let _guard = rt.enter();
    rt.block_on(async move { Runner::new(spec)?.run().await })
}
