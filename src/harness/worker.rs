use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace};

use super::{ChurnBuffer, EventSink, HarnessError, WorkerEvent, WorkerId};
use crate::config::ChurnConfig;

/// Lifecycle of a churn worker.
///
/// `Starting -> (Allocating -> Paused) x loops -> Done`, with `Faulted` reachable
/// from `Allocating` when the buffer cannot grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Starting,
    Allocating { cycle: u64 },
    Paused { cycle: u64 },
    Done,
    Faulted,
}

impl WorkerPhase {
    pub fn can_transition_to(&self, next: WorkerPhase) -> bool {
        use WorkerPhase::*;
        match (*self, next) {
            (Starting, Allocating { cycle }) => cycle == 0,
            (Starting, Done) => true,
            (Allocating { cycle: a }, Paused { cycle: p }) => a == p,
            (Allocating { .. }, Faulted) => true,
            (Paused { cycle: p }, Allocating { cycle: a }) => a == p + 1,
            (Paused { .. }, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerPhase::Done | WorkerPhase::Faulted)
    }
}

pub struct ChurnWorker {
    id: WorkerId,
    cfg: ChurnConfig,
    sink: Arc<dyn EventSink>,
    phase: WorkerPhase,
    buffer_cap: Option<usize>,
}

impl ChurnWorker {
    pub fn new(id: WorkerId, cfg: ChurnConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            id,
            cfg,
            sink,
            phase: WorkerPhase::Starting,
            buffer_cap: None,
        }
    }

    /// Caps this worker's buffer at `cap` elements; filling past it faults the
    /// worker exactly as allocator exhaustion would.
    pub fn with_buffer_cap(mut self, cap: usize) -> Self {
        self.buffer_cap = Some(cap);
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    fn transition(&mut self, next: WorkerPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal worker transition {:?} -> {:?}",
            self.phase,
            next
        );
        trace!(worker = self.id.0, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    fn fresh_buffer(&self) -> ChurnBuffer {
        match self.buffer_cap {
            Some(cap) => ChurnBuffer::with_cap(cap),
            None => ChurnBuffer::new(),
        }
    }

    /// Logs the cycle index, then grows `buffer` to the configured count.
    fn allocate(&mut self, cycle: u64, buffer: &mut ChurnBuffer) -> Result<(), HarnessError> {
        let target = self.cfg.target_len();
        self.sink.emit(self.id, WorkerEvent::Cycle(cycle));
        self.transition(WorkerPhase::Allocating { cycle });

        let cycle_started = Instant::now();
        if let Err(e) = buffer.fill(target) {
            let reached = buffer.len();
            self.transition(WorkerPhase::Faulted);
            self.sink.emit(self.id, WorkerEvent::Fault);
            error!(
                worker = self.id.0,
                cycle,
                reached,
                target,
                error = %e,
                "buffer growth failed"
            );
            return Err(HarnessError::Exhausted {
                worker: self.id,
                cycle,
                reached,
            });
        }
        debug!(
            worker = self.id.0,
            cycle,
            len = buffer.len(),
            elapsed_ms = cycle_started.elapsed().as_millis() as u64,
            "allocation complete"
        );
        Ok(())
    }

    /// Sleeps out the pause, then swaps the filled buffer for an empty one.
    async fn pause(&mut self, cycle: u64, buffer: ChurnBuffer) -> ChurnBuffer {
        self.transition(WorkerPhase::Paused { cycle });
        sleep(self.cfg.pause()).await;
        buffer.abandon()
    }

    /// Runs every cycle to completion. Only the pause suspends.
    pub async fn run(mut self) -> Result<(), HarnessError> {
        let started = Instant::now();
        self.sink.emit(self.id, WorkerEvent::Start);

        let mut buffer = self.fresh_buffer();
        for cycle in 0..self.cfg.loops {
            self.allocate(cycle, &mut buffer)?;
            buffer = self.pause(cycle, buffer).await;
        }

        self.transition(WorkerPhase::Done);
        self.sink.emit(self.id, WorkerEvent::Done);
        info!(
            worker = self.id.0,
            cycles = self.cfg.loops,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "worker done"
        );
        Ok(())
    }
}
