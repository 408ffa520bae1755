//! Round-based driver for synchronous components.

use crate::component::Component;
use crate::error::{Error, Result};
use crate::input::InputGenerator;
use crate::log::{ExecutionLog, RoundRecord};
use crate::termination::{TerminationCondition, TerminationContext};

/// Single-threaded round loop: query termination, pull inputs, run every
/// task in dependency order, snapshot, log. Never suspends.
pub struct SynchronousExecutor {
    component: Component,
    input_generator: Box<dyn InputGenerator>,
    termination: TerminationCondition,
    track_task_order: bool,
    log: ExecutionLog,
    current_round: u64,
}

impl SynchronousExecutor {
    pub fn new(
        component: Component,
        input_generator: Box<dyn InputGenerator>,
        termination: TerminationCondition,
    ) -> Self {
        Self {
            component,
            input_generator,
            termination,
            track_task_order: false,
            log: ExecutionLog::new(),
            current_round: 0,
        }
    }

    /// Record the task execution order in every round's log entry.
    pub fn with_track_task_order(mut self, track: bool) -> Self {
        self.track_task_order = track;
        self
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn run(&mut self) -> Result<&ExecutionLog> {
        self.current_round = 0;
        self.log = ExecutionLog::new();

        loop {
            let ctx = TerminationContext {
                round_number: self.current_round,
                state: self.component.state(),
                log: &self.log,
                current_time: 0.0,
                event_count: self.current_round,
                event_queue: None,
            };
            if self.termination.should_terminate(&ctx)? {
                break;
            }

            self.current_round += 1;
            tracing::debug!(round = self.current_round, "starting round");

            let inputs = self.input_generator.generate(
                self.component.inputs(),
                self.current_round,
                self.component.state(),
            )?;

            let task_order = self
                .track_task_order
                .then(|| self.component.execution_order_names());

            let outputs = self.component.execute_round(&inputs).map_err(|e| {
                Error::Component(format!("Error in round {}: {e}", self.current_round))
            })?;

            self.log.add_round(RoundRecord {
                round_number: self.current_round,
                inputs,
                outputs,
                state: self.component.state().clone(),
                task_order,
            });
        }

        tracing::info!(rounds = self.log.len(), "synchronous run complete");
        Ok(&self.log)
    }
}
