//! Convoy Worker — bounded asynchronous conversion worker.
//!
//! The worker is built from:
//!
//! 1. **Thread pool** (`pool`): fixed set of OS threads draining one FIFO queue
//! 2. **Admission** (`worker`): synchronous accept/reject by state and queue occupancy
//! 3. **Completion handles** (`completion`): single-assignment results, blocking or awaitable
//! 4. **Remote transform** (`remote`): blocking HTTP call to the conversion service
//! 5. **Ambient** (`config`, `telemetry`): sizing, grace periods, tracing setup

pub mod completion;
pub mod config;
pub mod error;
mod pool;
pub mod remote;
pub mod state;
pub mod telemetry;
pub mod worker;

pub use completion::{Completion, Outcome};
pub use config::{ConfigError, WorkerConfig};
pub use error::{LifecycleError, ShutdownIncomplete, SubmitError, WorkError};
pub use remote::{HttpTransform, HttpTransformConfig};
pub use state::WorkerState;
pub use telemetry::{init_tracing, LogConfig};
pub use worker::{BoundedWorker, ShutdownOutcome, StopReport, Worker, WorkerStats};
