//! Events and the per-invocation emitter capability.

use serde::{Deserialize, Serialize};

use crate::types::{Record, Value};

/// A timestamped, prioritised notification driving the event executor.
///
/// Ordering in the queue is by `(time, priority, insertion sequence)` only;
/// `name`, `data`, and `source_task` never influence it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    pub name: String,
    pub priority: i64,
    pub data: Record,
    pub source_task: Option<String>,
}

impl Event {
    pub fn new(time: f64, name: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
            priority: 0,
            data: Record::new(),
            source_task: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = data;
        self
    }

    pub fn with_source_task(mut self, source_task: impl Into<String>) -> Self {
        self.source_task = Some(source_task.into());
        self
    }
}

/// An event requested by a task, not yet scheduled. The executor stamps the
/// absolute time (`current_time + delay`) and the emitting task at the join
/// barrier.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    pub name: String,
    pub data: Record,
    pub delay: f64,
    pub priority: i64,
}

/// Scratch buffer accumulating events during a single task run.
///
/// Handed to the action as a capability, so tasks never hold a reference
/// back to the scheduler.
#[derive(Debug, Default)]
pub struct EventEmitter {
    pending: Vec<PendingEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event request. A provided value is wrapped as
    /// `{"value": v}`; no value means an empty data record.
    pub fn emit(&mut self, name: impl Into<String>, data: Option<Value>, delay: f64, priority: i64) {
        let data = match data {
            Some(v) => [("value".to_string(), v)].into_iter().collect(),
            None => Record::new(),
        };
        self.pending.push(PendingEvent {
            name: name.into(),
            data,
            delay,
            priority,
        });
    }

    /// Drain everything accumulated so far.
    pub fn take_pending(&mut self) -> Vec<PendingEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
