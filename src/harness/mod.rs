//! # Allocation Churn Harness
//!
//! Parallel workers that repeatedly grow a buffer of sequential integers,
//! pause, then abandon it, generating allocator pressure for external
//! observation.
//!
//! ## Components
//!
//! - **Orchestrator**: spawns workers `1..threads` and runs worker 0 itself
//! - **ChurnWorker**: the per-worker allocate / pause / abandon loop
//! - **ChurnBuffer**: the buffer a worker owns for a single cycle
//! - **EventSink**: where `[id] START`, `[id] <cycle>` and `[id] DONE` lines go
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use alloc_churn::config::ChurnConfig;
//! use alloc_churn::harness::{Orchestrator, StdoutSink};
//!
//! # async fn run() -> Result<(), alloc_churn::harness::HarnessError> {
//! let cfg = ChurnConfig { threads: 4, count: 1_000_000, loops: 2, pause_ms: 1000 };
//! Orchestrator::new(cfg, Arc::new(StdoutSink)).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod events;
pub mod orchestrator;
pub mod worker;

pub use buffer::{ChurnBuffer, GrowthError};
pub use events::{format_line, EventSink, MemorySink, StdoutSink, WorkerEvent};
pub use orchestrator::{Orchestrator, RunSummary};
pub use worker::{ChurnWorker, WorkerPhase};

use std::fmt;
use thiserror::Error;

/// Worker identity. The initiating worker is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl WorkerId {
    pub const ORCHESTRATOR: WorkerId = WorkerId(0);
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("worker {worker} exhausted memory in cycle {cycle} after {reached} elements")]
    Exhausted {
        worker: WorkerId,
        cycle: u64,
        reached: usize,
    },
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: WorkerId },
    #[error("failed to create worker pool: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("{faulted} of {total} workers ended abnormally")]
    Faulted { faulted: usize, total: usize },
}
