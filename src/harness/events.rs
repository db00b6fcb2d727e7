use parking_lot::Mutex;
use std::fmt;
use std::io::Write;

use super::WorkerId;

/// Line-level milestones a worker reports while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Start,
    /// Emitted before the cycle's allocation begins.
    Cycle(u64),
    Done,
    Fault,
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::Start => f.write_str("START"),
            WorkerEvent::Cycle(cycle) => write!(f, "{}", cycle),
            WorkerEvent::Done => f.write_str("DONE"),
            WorkerEvent::Fault => f.write_str("FAULT"),
        }
    }
}

/// Renders one protocol line, e.g. `[2] START`.
pub fn format_line(worker: WorkerId, event: WorkerEvent) -> String {
    format!("[{}] {}", worker, event)
}

/// Destination for worker events. Shared by every worker.
pub trait EventSink: Send + Sync {
    fn emit(&self, worker: WorkerId, event: WorkerEvent);
}

/// Writes each event as a single line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, worker: WorkerId, event: WorkerEvent) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not take the worker down with it.
        let _ = writeln!(out, "{}", format_line(worker, event));
    }
}

/// Keeps events in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(WorkerId, WorkerEvent)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(WorkerId, WorkerEvent)> {
        self.events.lock().clone()
    }

    /// Events of one worker, in the order it emitted them.
    pub fn events_for(&self, worker: WorkerId) -> Vec<WorkerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == worker)
            .map(|(_, event)| *event)
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|(id, event)| format_line(*id, *event))
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, worker: WorkerId, event: WorkerEvent) {
        self.events.lock().push((worker, event));
    }
}
