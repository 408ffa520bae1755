//! Discrete-event driver for asynchronous components — the scheduler core.
//!
//! Single-threaded for dispatch and logging; parallel only across the tasks
//! co-activated by one event. Each task runs against a private snapshot and
//! returns a delta; deltas are merged on the scheduler thread after the join
//! barrier, so a failing task never leaks partial updates (and a failing
//! step merges nothing at all).

use rayon::prelude::*;
use serde::Serialize;

use crate::component::{Component, ComponentKind};
use crate::error::{Error, Result};
use crate::event::{Event, EventEmitter, PendingEvent};
use crate::input::InputGenerator;
use crate::lang::eval::{eval_condition, CondScope};
use crate::log::{ExecutionLog, RoundRecord};
use crate::queue::EventQueue;
use crate::task::{Task, TaskContext};
use crate::termination::{TerminationCondition, TerminationContext};
use crate::time::SimulationTime;
use crate::types::{Record, Value};

/// Internal event that drives periodic input generation.
pub const GENERATE_INPUT_EVENT: &str = "_generate_input";
/// Wake-up event seeded when nothing else is scheduled at start.
pub const START_EVENT: &str = "start";
/// Default name for events carrying freshly generated inputs.
pub const DEFAULT_INPUT_EVENT: &str = "input_ready";

/// Point-in-time snapshot of the run, exposed at any point.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatistics {
    pub total_events: u64,
    pub simulation_time: f64,
    pub final_state: Record,
    pub final_outputs: Record,
    pub input_rounds: u64,
}

/// What one isolated task run produced: the keys it wrote and the events it
/// asked for.
struct TaskOutcome {
    outputs: Record,
    state: Record,
    pending: Vec<PendingEvent>,
}

/// Event-driven executor: schedule initial events, then pop, advance the
/// clock, select activated tasks, run them, absorb emitted events, log.
pub struct EventDrivenExecutor {
    component: Component,
    input_generator: Option<Box<dyn InputGenerator>>,
    termination: TerminationCondition,
    input_event_name: String,
    input_interval: Option<f64>,
    initial_inputs: Record,
    pool: Option<rayon::ThreadPool>,
    event_queue: EventQueue,
    sim_time: SimulationTime,
    log: ExecutionLog,
    event_count: u64,
    input_round: u64,
}

impl EventDrivenExecutor {
    /// Build an executor over an asynchronous component. Termination
    /// defaults to the empty-queue condition.
    pub fn new(component: Component) -> Result<Self> {
        if component.kind() != ComponentKind::Asynchronous {
            return Err(Error::Component(format!(
                "event-driven execution requires an asynchronous component, '{}' is {}",
                component.name(),
                component.kind()
            )));
        }
        Ok(Self {
            component,
            input_generator: None,
            termination: TerminationCondition::empty_queue(),
            input_event_name: DEFAULT_INPUT_EVENT.to_string(),
            input_interval: None,
            initial_inputs: Record::new(),
            pool: None,
            event_queue: EventQueue::new(),
            sim_time: SimulationTime::default(),
            log: ExecutionLog::new(),
            event_count: 0,
            input_round: 0,
        })
    }

    pub fn with_input_generator(mut self, generator: Box<dyn InputGenerator>) -> Self {
        self.input_generator = Some(generator);
        self
    }

    pub fn with_termination(mut self, termination: TerminationCondition) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_input_event_name(mut self, name: impl Into<String>) -> Self {
        self.input_event_name = name.into();
        self
    }

    pub fn with_input_interval(mut self, interval: f64) -> Self {
        self.input_interval = Some(interval);
        self
    }

    pub fn with_initial_inputs(mut self, inputs: Record) -> Self {
        self.initial_inputs = inputs;
        self
    }

    /// Bound the worker pool used for co-activated tasks. Without this the
    /// global rayon pool is used.
    pub fn with_max_workers(mut self, max_workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .build()
            .map_err(|e| Error::Component(format!("failed to build worker pool: {e}")))?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn simulation_time(&self) -> f64 {
        self.sim_time.current_time()
    }

    /// Seed an event before (or between) runs — e.g. an external stimulus.
    pub fn schedule_event(&mut self, event: Event) {
        self.event_queue.push(event);
    }

    pub fn statistics(&self) -> SimulationStatistics {
        SimulationStatistics {
            total_events: self.event_count,
            simulation_time: self.sim_time.current_time(),
            final_state: self.component.state().clone(),
            final_outputs: self.component.current_outputs().clone(),
            input_rounds: self.input_round,
        }
    }

    pub fn run(&mut self) -> Result<&ExecutionLog> {
        self.schedule_periodic_tasks();
        self.schedule_input_generation();
        if self.event_queue.is_empty() {
            self.event_queue.push(Event::new(0.0, START_EVENT));
        }

        loop {
            if self.should_terminate()? {
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };

            // A MaxTime bound caps the clock: stop *at* the bound instead of
            // jumping to a later event, and never dispatch past it.
            if let Some(horizon) = self.termination.time_horizon() {
                if event.time >= horizon {
                    if horizon > self.sim_time.current_time() {
                        self.sim_time.advance_to(horizon)?;
                    }
                    tracing::debug!(
                        event = %event.name,
                        horizon,
                        "time horizon reached, stopping before dispatch"
                    );
                    break;
                }
            }

            self.sim_time.advance_to(event.time)?;
            self.event_count += 1;

            if event.name == GENERATE_INPUT_EVENT {
                self.generate_and_emit_input()?;
                continue;
            }

            let activated = self.select_tasks(&event);
            tracing::trace!(
                event = %event.name,
                time = event.time,
                activated = activated.len(),
                "dispatching event"
            );
            self.run_tasks(&activated, &event)?;

            let mut inputs = Record::new();
            inputs.insert("event".to_string(), Value::Str(event.name.clone()));
            inputs.insert("time".to_string(), Value::Float(event.time));
            for (key, value) in &self.initial_inputs {
                inputs.insert(key.clone(), value.clone());
            }

            let task_order = (!activated.is_empty()).then(|| {
                activated
                    .iter()
                    .map(|&i| self.component.tasks()[i].name().to_string())
                    .collect()
            });

            self.log.add_round(RoundRecord {
                round_number: self.event_count,
                inputs,
                outputs: self.component.current_outputs().clone(),
                state: self.component.state().clone(),
                task_order,
            });
        }

        tracing::info!(
            events = self.event_count,
            simulation_time = self.sim_time.current_time(),
            "event-driven run complete"
        );
        Ok(&self.log)
    }

    fn should_terminate(&self) -> Result<bool> {
        self.termination.should_terminate(&TerminationContext {
            round_number: self.event_count,
            state: self.component.state(),
            log: &self.log,
            current_time: self.sim_time.current_time(),
            event_count: self.event_count,
            event_queue: Some(&self.event_queue),
        })
    }

    /// Seed one `periodic_<task>` event at t=0 per periodic task.
    fn schedule_periodic_tasks(&mut self) {
        let seeds: Vec<String> = self
            .component
            .tasks()
            .iter()
            .filter(|t| t.trigger().is_some_and(|tr| tr.is_periodic()))
            .map(|t| t.name().to_string())
            .collect();
        for name in seeds {
            self.event_queue
                .push(periodic_event(0.0, &name));
        }
    }

    fn schedule_input_generation(&mut self) {
        if self.input_generator.is_some() && self.input_interval.is_some() {
            let data = [("round".to_string(), Value::Int(1))].into_iter().collect();
            self.event_queue
                .push(Event::new(0.0, GENERATE_INPUT_EVENT).with_data(data));
        }
    }

    /// Pull a fresh input record, merge it into the standing inputs, and
    /// re-emit it as an event (plus the next `_generate_input` when periodic).
    fn generate_and_emit_input(&mut self) -> Result<()> {
        let Some(generator) = self.input_generator.as_mut() else {
            return Ok(());
        };
        self.input_round += 1;
        let new_inputs = generator
            .generate(
                self.component.inputs(),
                self.input_round,
                self.component.state(),
            )
            .map_err(|e| Error::Component(format!("Error generating inputs: {e}")))?;

        for (key, value) in &new_inputs {
            self.initial_inputs.insert(key.clone(), value.clone());
        }

        let now = self.sim_time.current_time();
        self.event_queue
            .push(Event::new(now, self.input_event_name.clone()).with_data(new_inputs));

        if let Some(interval) = self.input_interval {
            let data = [(
                "round".to_string(),
                Value::Int(self.input_round as i64 + 1),
            )]
            .into_iter()
            .collect();
            self.event_queue
                .push(Event::new(now + interval, GENERATE_INPUT_EVENT).with_data(data));
        }
        Ok(())
    }

    /// Ask every task's trigger, re-arm periodic triggers immediately (their
    /// next fire time is fixed even if this firing later fails), then gate
    /// through guard conditions. Guard failures are false, never fatal.
    fn select_tasks(&mut self, event: &Event) -> Vec<usize> {
        let now = self.sim_time.current_time();
        let mut activated = Vec::new();
        let mut rearm = Vec::new();

        {
            let Component { state, tasks, .. } = &mut self.component;
            for (index, task) in tasks.iter_mut().enumerate() {
                let fired = match task.trigger.as_mut() {
                    Some(trigger) => {
                        trigger.should_activate(Some(event.name.as_str()), state, now)
                    }
                    None => false,
                };
                if !fired {
                    continue;
                }

                if let Some(next_time) =
                    task.trigger.as_ref().and_then(|t| t.next_fire_time())
                {
                    rearm.push((task.name().to_string(), next_time));
                }

                if let Some(condition) = task.condition() {
                    let scope = CondScope {
                        state,
                        current_time: Some(now),
                    };
                    let passes = match eval_condition(condition, &scope) {
                        Ok(value) => value.is_truthy(),
                        Err(e) => {
                            tracing::debug!(
                                task = task.name(),
                                error = %e,
                                "guard evaluation failed, task not activated"
                            );
                            false
                        }
                    };
                    if !passes {
                        continue;
                    }
                }

                activated.push(index);
            }
        }

        for (task_name, next_time) in rearm {
            self.event_queue.push(periodic_event(next_time, &task_name));
        }

        activated
    }

    /// Run the activated set: inline for one task, across the worker pool
    /// for more. Deltas and emitted events are absorbed only after every
    /// task of the step succeeded.
    fn run_tasks(&mut self, activated: &[usize], event: &Event) -> Result<()> {
        if activated.is_empty() {
            return Ok(());
        }
        let now = self.sim_time.current_time();

        let results: Vec<(String, Result<TaskOutcome>)> = {
            let inputs = &self.initial_inputs;
            let outputs = &self.component.current_outputs;
            let state = &self.component.state;
            let tasks: Vec<&Task> = activated.iter().map(|&i| &self.component.tasks[i]).collect();

            if tasks.len() == 1 {
                let task = tasks[0];
                vec![(
                    task.name().to_string(),
                    execute_isolated(task, inputs, outputs, state, event, now),
                )]
            } else {
                let job = |task: &&Task| {
                    (
                        task.name().to_string(),
                        execute_isolated(task, inputs, outputs, state, event, now),
                    )
                };
                match &self.pool {
                    Some(pool) => pool.install(|| tasks.par_iter().map(job).collect()),
                    None => tasks.par_iter().map(job).collect(),
                }
            }
        };

        let mut outcomes = Vec::with_capacity(results.len());
        for (task_name, result) in results {
            match result {
                Ok(outcome) => outcomes.push((task_name, outcome)),
                // First failure aborts the run; nothing from this step is
                // merged, including deltas of tasks that succeeded.
                Err(e) => return Err(e),
            }
        }

        for (task_name, outcome) in outcomes {
            for (key, value) in outcome.state {
                self.component.state.insert(key, value);
            }
            for (key, value) in outcome.outputs {
                self.component.current_outputs.insert(key, value);
            }
            for pending in outcome.pending {
                self.event_queue.push(Event {
                    time: now + pending.delay,
                    name: pending.name,
                    priority: pending.priority,
                    data: pending.data,
                    source_task: Some(task_name.clone()),
                });
            }
        }
        Ok(())
    }
}

fn periodic_event(time: f64, task_name: &str) -> Event {
    let data = [("task".to_string(), Value::Str(task_name.to_string()))]
        .into_iter()
        .collect();
    Event::new(time, format!("periodic_{task_name}")).with_data(data)
}

/// Run one task against private copies of the shared records, returning the
/// delta it wrote and the events it emitted.
fn execute_isolated(
    task: &Task,
    inputs: &Record,
    outputs: &Record,
    state: &Record,
    event: &Event,
    now: f64,
) -> Result<TaskOutcome> {
    let mut outputs_copy = outputs.clone();
    let mut state_copy = state.clone();
    let mut emitter = EventEmitter::new();

    let mut ctx = TaskContext::for_event(
        inputs,
        &mut outputs_copy,
        &mut state_copy,
        &event.data,
        now,
        &mut emitter,
    );
    task.execute(&mut ctx)?;
    let (written_outputs, written_state) = ctx.into_write_sets();

    let outputs_delta = written_outputs
        .into_iter()
        .filter_map(|key| outputs_copy.get(&key).cloned().map(|v| (key, v)))
        .collect();
    let state_delta = written_state
        .into_iter()
        .filter_map(|key| state_copy.get(&key).cloned().map(|v| (key, v)))
        .collect();

    Ok(TaskOutcome {
        outputs: outputs_delta,
        state: state_delta,
        pending: emitter.take_pending(),
    })
}
