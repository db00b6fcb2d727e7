use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info};

use super::{ChurnWorker, EventSink, HarnessError, WorkerEvent, WorkerId};
use crate::config::ChurnConfig;

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub workers: usize,
    pub faulted: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.faulted == 0
    }
}

/// Spawns workers `1..threads` and runs worker 0 on the calling task.
pub struct Orchestrator {
    cfg: ChurnConfig,
    sink: Arc<dyn EventSink>,
    buffer_caps: HashMap<WorkerId, usize>,
}

impl Orchestrator {
    pub fn new(cfg: ChurnConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            cfg,
            sink,
            buffer_caps: HashMap::new(),
        }
    }

    /// Makes `worker` fault once its buffer holds `cap` elements.
    pub fn with_buffer_cap(mut self, worker: WorkerId, cap: usize) -> Self {
        self.buffer_caps.insert(worker, cap);
        self
    }

    fn worker(&self, id: WorkerId) -> ChurnWorker {
        let worker = ChurnWorker::new(id, self.cfg, self.sink.clone());
        match self.buffer_caps.get(&id) {
            Some(&cap) => worker.with_buffer_cap(cap),
            None => worker,
        }
    }

    /// Must be called from within a tokio runtime.
    ///
    /// Spawned workers are independent of each other and of worker 0; the join
    /// set only keeps this future alive until the last of them finishes.
    pub async fn run(&self) -> Result<RunSummary, HarnessError> {
        let total = self.cfg.threads.max(1);
        info!(
            threads = total,
            count = self.cfg.count,
            loops = self.cfg.loops,
            pause_ms = self.cfg.pause_ms,
            "starting churn"
        );

        let mut workers = JoinSet::new();
        let mut identities: HashMap<Id, WorkerId> = HashMap::with_capacity(total - 1);
        for i in 1..total {
            let worker = self.worker(WorkerId(i));
            let id = worker.id();
            let handle = workers.spawn(worker.run());
            identities.insert(handle.id(), id);
            debug!(worker = id.0, "worker spawned");
        }

        let mut faulted = 0;
        if self.worker(WorkerId::ORCHESTRATOR).run().await.is_err() {
            faulted += 1;
        }

        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((_, Err(_))) => faulted += 1,
                Err(e) => {
                    faulted += 1;
                    if let Some(&worker) = identities.get(&e.id()) {
                        // The task is gone, so report on its behalf.
                        self.sink.emit(worker, WorkerEvent::Fault);
                        error!(
                            error = %HarnessError::WorkerPanicked { worker },
                            cause = %e,
                            "worker task ended abnormally"
                        );
                    } else {
                        error!(error = %e, "worker task ended abnormally");
                    }
                }
            }
        }

        let summary = RunSummary {
            workers: total,
            faulted,
        };
        info!(workers = summary.workers, faulted = summary.faulted, "churn finished");
        Ok(summary)
    }

    /// Like [`Orchestrator::run`], but a run with any faulted worker is an error.
    pub async fn run_to_completion(&self) -> Result<RunSummary, HarnessError> {
        let summary = self.run().await?;
        if summary.is_clean() {
            Ok(summary)
        } else {
            Err(HarnessError::Faulted {
                faulted: summary.faulted,
                total: summary.workers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::MemorySink;
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn cfg(threads: usize, count: u64, loops: u64) -> ChurnConfig {
        ChurnConfig {
            threads,
            count,
            loops,
            pause_ms: 1000,
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[tokio::test(start_paused = true)]
    async fn test_each_identity_runs_exactly_once(#[case] threads: usize) {
        let sink = Arc::new(MemorySink::new());
        let summary = Orchestrator::new(cfg(threads, 4, 1), sink.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { workers: threads, faulted: 0 });

        let starts: Vec<WorkerId> = sink
            .events()
            .into_iter()
            .filter(|(_, e)| *e == WorkerEvent::Start)
            .map(|(id, _)| id)
            .collect();
        let unique: BTreeSet<WorkerId> = starts.iter().copied().collect();
        assert_eq!(starts.len(), threads);
        assert_eq!(unique, (0..threads).map(WorkerId).collect::<BTreeSet<_>>());

        for id in 0..threads {
            let events = sink.events_for(WorkerId(id));
            assert_eq!(events.first(), Some(&WorkerEvent::Start));
            assert_eq!(events.last(), Some(&WorkerEvent::Done));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_threads_runs_orchestrator_only() {
        let sink = Arc::new(MemorySink::new());
        let summary = Orchestrator::new(cfg(0, 2, 1), sink.clone())
            .run_to_completion()
            .await
            .unwrap();

        assert_eq!(summary.workers, 1);
        assert_eq!(sink.lines(), vec!["[0] START", "[0] 0", "[0] DONE"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_pause_concurrently() {
        let sink = Arc::new(MemorySink::new());
        let started = tokio::time::Instant::now();

        Orchestrator::new(cfg(4, 8, 2), sink.clone())
            .run_to_completion()
            .await
            .unwrap();

        // Four workers, two one-second pauses each, overlapping.
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_worker_does_not_stop_others() {
        let sink = Arc::new(MemorySink::new());
        let err = Orchestrator::new(cfg(3, 16, 2), sink.clone())
            .with_buffer_cap(WorkerId(1), 8)
            .run_to_completion()
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Faulted { faulted: 1, total: 3 }));
        assert_eq!(
            sink.events_for(WorkerId(1)),
            vec![WorkerEvent::Start, WorkerEvent::Cycle(0), WorkerEvent::Fault]
        );
        for id in [0, 2] {
            assert_eq!(
                sink.events_for(WorkerId(id)),
                vec![
                    WorkerEvent::Start,
                    WorkerEvent::Cycle(0),
                    WorkerEvent::Cycle(1),
                    WorkerEvent::Done
                ]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_orchestrator_worker_still_joins_others() {
        let sink = Arc::new(MemorySink::new());
        let summary = Orchestrator::new(cfg(2, 4, 1), sink.clone())
            .with_buffer_cap(WorkerId::ORCHESTRATOR, 0)
            .run()
            .await
            .unwrap();

        assert_eq!(summary, RunSummary { workers: 2, faulted: 1 });
        assert_eq!(sink.events_for(WorkerId(0)).last(), Some(&WorkerEvent::Fault));
        assert_eq!(sink.events_for(WorkerId(1)).last(), Some(&WorkerEvent::Done));
    }

    /// Panics when worker 1 reaches its first cycle.
    struct FaultingSink(MemorySink);

    impl EventSink for FaultingSink {
        fn emit(&self, worker: WorkerId, event: WorkerEvent) {
            if worker == WorkerId(1) && event == WorkerEvent::Cycle(0) {
                panic!("injected fault");
            }
            self.0.emit(worker, event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_faulted_worker_does_not_stop_others() {
        let sink = Arc::new(FaultingSink(MemorySink::new()));
        let err = Orchestrator::new(cfg(3, 4, 2), sink.clone())
            .run_to_completion()
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Faulted { faulted: 1, total: 3 }));
        assert_eq!(
            sink.0.events_for(WorkerId(1)),
            vec![WorkerEvent::Start, WorkerEvent::Fault]
        );
        for id in [0, 2] {
            assert_eq!(
                sink.0.events_for(WorkerId(id)).last(),
                Some(&WorkerEvent::Done)
            );
        }
    }

    #[test]
    fn test_summary_cleanliness() {
        assert!(RunSummary { workers: 3, faulted: 0 }.is_clean());
        assert!(!RunSummary { workers: 3, faulted: 1 }.is_clean());
    }
}
