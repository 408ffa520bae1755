//! Tasks: one named unit of logic with a compiled action, optional
//! dependencies, trigger, and guard condition.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::event::EventEmitter;
use crate::lang::{self, Expr, Program};
use crate::trigger::Trigger;
use crate::types::Record;

/// Execution context handed to a task action: `inputs` (read), `outputs`
/// and `state` (read/write), plus event-driven extras when present.
///
/// The context records which keys the action wrote, so the event-driven
/// executor can merge true per-task deltas at the join barrier.
pub struct TaskContext<'a> {
    pub inputs: &'a Record,
    pub outputs: &'a mut Record,
    pub state: &'a mut Record,
    event: Option<EventScope<'a>>,
    pub(crate) written_outputs: BTreeSet<String>,
    pub(crate) written_state: BTreeSet<String>,
}

/// Per-invocation extras for event-driven runs: the clock, the triggering
/// event's data, and the emitter capability. Tasks never hold a reference
/// back to the scheduler.
struct EventScope<'a> {
    current_time: f64,
    event_data: &'a Record,
    emitter: &'a mut EventEmitter,
}

impl<'a> TaskContext<'a> {
    /// Context for a synchronous round: no clock, no event, no emitter.
    pub fn for_round(
        inputs: &'a Record,
        outputs: &'a mut Record,
        state: &'a mut Record,
    ) -> Self {
        Self {
            inputs,
            outputs,
            state,
            event: None,
            written_outputs: BTreeSet::new(),
            written_state: BTreeSet::new(),
        }
    }

    /// Context for one event-driven invocation.
    pub fn for_event(
        inputs: &'a Record,
        outputs: &'a mut Record,
        state: &'a mut Record,
        event_data: &'a Record,
        current_time: f64,
        emitter: &'a mut EventEmitter,
    ) -> Self {
        Self {
            inputs,
            outputs,
            state,
            event: Some(EventScope {
                current_time,
                event_data,
                emitter,
            }),
            written_outputs: BTreeSet::new(),
            written_state: BTreeSet::new(),
        }
    }

    pub(crate) fn current_time(&self) -> Option<f64> {
        self.event.as_ref().map(|e| e.current_time)
    }

    pub(crate) fn event_data(&self) -> Option<&Record> {
        self.event.as_ref().map(|e| e.event_data)
    }

    pub(crate) fn emitter_mut(&mut self) -> Option<&mut EventEmitter> {
        self.event.as_mut().map(|e| &mut *e.emitter)
    }

    /// Keys the action wrote, in (outputs, state) order.
    pub(crate) fn write_sets(&self) -> (&BTreeSet<String>, &BTreeSet<String>) {
        (&self.written_outputs, &self.written_state)
    }

    /// Consume the context, releasing its borrows, and return the write sets.
    pub(crate) fn into_write_sets(self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.written_outputs, self.written_state)
    }
}

/// One unit of domain logic within a component.
#[derive(Debug, Clone)]
pub struct Task {
    name: String,
    action: Program,
    depends_on: Vec<String>,
    pub(crate) trigger: Option<Trigger>,
    condition: Option<Expr>,
}

impl Task {
    /// Compile `code` and build the task. A malformed action is a task error.
    pub fn new(name: impl Into<String>, code: &str) -> Result<Self> {
        let name = name.into();
        let action = lang::parse_program(code).map_err(|e| Error::Task {
            task: name.clone(),
            message: format!("syntax error: {e}"),
        })?;
        Ok(Self {
            name,
            action,
            depends_on: Vec::new(),
            trigger: None,
            condition: None,
        })
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Attach a guard condition, compiled now so malformed guards fail at
    /// load rather than mid-run.
    pub fn with_condition(mut self, code: &str) -> Result<Self> {
        let expr = lang::parse_expression(code).map_err(|e| Error::Task {
            task: self.name.clone(),
            message: format!("syntax error in condition: {e}"),
        })?;
        self.condition = Some(expr);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    /// Run the action once against the given context. Mutations to
    /// `outputs`/`state` are visible to the caller; isolation is the
    /// executor's concern.
    pub fn execute(&self, ctx: &mut TaskContext<'_>) -> Result<()> {
        lang::eval::run_program(&self.action, ctx).map_err(|e| e.into_task_error(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn execute_updates_outputs_and_state() {
        let task = Task::new(
            "accumulate",
            "count = state.count + inputs.inc\noutputs.count = count\nstate.count = count",
        )
        .unwrap();

        let inputs = record(&[("inc", Value::Int(5))]);
        let mut outputs = record(&[("count", Value::Null)]);
        let mut state = record(&[("count", Value::Int(1))]);

        let mut ctx = TaskContext::for_round(&inputs, &mut outputs, &mut state);
        task.execute(&mut ctx).unwrap();

        assert_eq!(state["count"], Value::Int(6));
        assert_eq!(outputs["count"], Value::Int(6));
    }

    #[test]
    fn malformed_action_fails_at_construction() {
        let err = Task::new("broken", "state.x ===").unwrap_err();
        assert!(matches!(err, Error::Task { task, .. } if task == "broken"));
    }

    #[test]
    fn runtime_failure_names_the_task() {
        let task = Task::new("divide", "state.r = state.a / state.b").unwrap();
        let inputs = Record::new();
        let mut outputs = Record::new();
        let mut state = record(&[("a", Value::Int(1)), ("b", Value::Int(0))]);

        let mut ctx = TaskContext::for_round(&inputs, &mut outputs, &mut state);
        let err = task.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, Error::Task { task, .. } if task == "divide"));
    }

    #[test]
    fn write_sets_track_assigned_keys_only() {
        let task = Task::new("writer", "scratch = 1\nstate.a = scratch\noutputs.b = 2").unwrap();
        let inputs = Record::new();
        let mut outputs = record(&[("b", Value::Null), ("c", Value::Null)]);
        let mut state = record(&[("a", Value::Int(0)), ("z", Value::Int(9))]);

        let mut ctx = TaskContext::for_round(&inputs, &mut outputs, &mut state);
        task.execute(&mut ctx).unwrap();

        let (written_outputs, written_state) = ctx.write_sets();
        assert_eq!(
            written_outputs.iter().collect::<Vec<_>>(),
            vec![&"b".to_string()]
        );
        assert_eq!(
            written_state.iter().collect::<Vec<_>>(),
            vec![&"a".to_string()]
        );
    }
}
