//! Termination conditions: when does the simulation stop?

use crate::error::{Error, Result};
use crate::lang::eval::{eval_condition, CondScope};
use crate::lang::{self, Expr};
use crate::log::ExecutionLog;
use crate::queue::EventQueue;
use crate::types::Record;

/// Context bag handed to `should_terminate`. Executors fill in what they
/// have; variants read what they need.
pub struct TerminationContext<'a> {
    pub round_number: u64,
    pub state: &'a Record,
    pub log: &'a ExecutionLog,
    pub current_time: f64,
    pub event_count: u64,
    pub event_queue: Option<&'a EventQueue>,
}

/// A composite-friendly termination predicate.
#[derive(Debug, Clone)]
pub enum TerminationCondition {
    MaxRounds { max_rounds: u64 },
    MaxTime { max_time: f64 },
    MaxEvents { max_events: u64 },
    /// Truthy state expression ends the run; always false at round 0.
    State { source: String, expr: Expr },
    /// True when the event queue is empty (or absent).
    EmptyQueue,
    /// Logical OR over children, short-circuiting on the first true.
    Composite { conditions: Vec<TerminationCondition> },
}

impl TerminationCondition {
    pub fn max_rounds(max_rounds: u64) -> Result<Self> {
        if max_rounds == 0 {
            return Err(Error::Termination("max_rounds must be positive".into()));
        }
        Ok(TerminationCondition::MaxRounds { max_rounds })
    }

    pub fn max_time(max_time: f64) -> Result<Self> {
        if max_time <= 0.0 {
            return Err(Error::Termination("max_time must be positive".into()));
        }
        Ok(TerminationCondition::MaxTime { max_time })
    }

    pub fn max_events(max_events: u64) -> Result<Self> {
        if max_events == 0 {
            return Err(Error::Termination("max_events must be positive".into()));
        }
        Ok(TerminationCondition::MaxEvents { max_events })
    }

    pub fn state_condition(source: &str) -> Result<Self> {
        let expr = lang::parse_expression(source)
            .map_err(|e| Error::Termination(format!("invalid state condition: {e}")))?;
        Ok(TerminationCondition::State {
            source: source.to_string(),
            expr,
        })
    }

    pub fn empty_queue() -> Self {
        TerminationCondition::EmptyQueue
    }

    pub fn composite(conditions: Vec<TerminationCondition>) -> Result<Self> {
        if conditions.is_empty() {
            return Err(Error::Termination(
                "composite requires at least one condition".into(),
            ));
        }
        Ok(TerminationCondition::Composite { conditions })
    }

    /// Evaluate the predicate. State-expression failures are errors, never
    /// silently false.
    pub fn should_terminate(&self, ctx: &TerminationContext<'_>) -> Result<bool> {
        match self {
            TerminationCondition::MaxRounds { max_rounds } => Ok(ctx.round_number >= *max_rounds),
            TerminationCondition::MaxTime { max_time } => Ok(ctx.current_time >= *max_time),
            TerminationCondition::MaxEvents { max_events } => Ok(ctx.event_count >= *max_events),

            TerminationCondition::State { source, expr } => {
                if ctx.round_number == 0 {
                    return Ok(false);
                }
                let scope = CondScope {
                    state: ctx.state,
                    current_time: Some(ctx.current_time),
                };
                let value = eval_condition(expr, &scope).map_err(|e| {
                    Error::Termination(format!(
                        "error evaluating termination condition '{source}': {e}"
                    ))
                })?;
                Ok(value.is_truthy())
            }

            TerminationCondition::EmptyQueue => {
                Ok(ctx.event_queue.map_or(true, |queue| queue.is_empty()))
            }

            TerminationCondition::Composite { conditions } => {
                for condition in conditions {
                    if condition.should_terminate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Smallest `MaxTime` bound anywhere in this condition tree. The event
    /// executor stops the clock there instead of jumping past it to a later
    /// event.
    pub fn time_horizon(&self) -> Option<f64> {
        match self {
            TerminationCondition::MaxTime { max_time } => Some(*max_time),
            TerminationCondition::Composite { conditions } => conditions
                .iter()
                .filter_map(|c| c.time_horizon())
                .min_by(f64::total_cmp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn ctx<'a>(
        round_number: u64,
        state: &'a Record,
        log: &'a ExecutionLog,
        current_time: f64,
        event_count: u64,
        event_queue: Option<&'a EventQueue>,
    ) -> TerminationContext<'a> {
        TerminationContext {
            round_number,
            state,
            log,
            current_time,
            event_count,
            event_queue,
        }
    }

    #[test]
    fn constructors_reject_non_positive_bounds() {
        assert!(TerminationCondition::max_rounds(0).is_err());
        assert!(TerminationCondition::max_time(0.0).is_err());
        assert!(TerminationCondition::max_events(0).is_err());
        assert!(TerminationCondition::composite(vec![]).is_err());
    }

    #[test]
    fn max_rounds_counts_completed_rounds() {
        let cond = TerminationCondition::max_rounds(3).unwrap();
        let state = Record::new();
        let log = ExecutionLog::new();
        assert!(!cond.should_terminate(&ctx(2, &state, &log, 0.0, 0, None)).unwrap());
        assert!(cond.should_terminate(&ctx(3, &state, &log, 0.0, 0, None)).unwrap());
    }

    #[test]
    fn state_condition_is_false_at_round_zero() {
        let cond = TerminationCondition::state_condition("state.done").unwrap();
        let mut state = Record::new();
        state.insert("done".into(), Value::Bool(true));
        let log = ExecutionLog::new();

        assert!(!cond.should_terminate(&ctx(0, &state, &log, 0.0, 0, None)).unwrap());
        assert!(cond.should_terminate(&ctx(1, &state, &log, 0.0, 0, None)).unwrap());
    }

    #[test]
    fn state_condition_failure_is_an_error() {
        let cond = TerminationCondition::state_condition("state.absent").unwrap();
        let state = Record::new();
        let log = ExecutionLog::new();
        assert!(cond.should_terminate(&ctx(1, &state, &log, 0.0, 0, None)).is_err());
    }

    #[test]
    fn empty_queue_is_true_without_a_queue() {
        let cond = TerminationCondition::empty_queue();
        let state = Record::new();
        let log = ExecutionLog::new();
        assert!(cond.should_terminate(&ctx(0, &state, &log, 0.0, 0, None)).unwrap());

        let queue = EventQueue::new();
        assert!(cond
            .should_terminate(&ctx(0, &state, &log, 0.0, 0, Some(&queue)))
            .unwrap());
    }

    #[test]
    fn composite_or_folds_and_short_circuits() {
        let cond = TerminationCondition::composite(vec![
            TerminationCondition::max_events(10).unwrap(),
            TerminationCondition::max_time(5.0).unwrap(),
        ])
        .unwrap();
        let state = Record::new();
        let log = ExecutionLog::new();

        assert!(!cond.should_terminate(&ctx(1, &state, &log, 4.9, 3, None)).unwrap());
        assert!(cond.should_terminate(&ctx(1, &state, &log, 5.0, 3, None)).unwrap());
        assert!(cond.should_terminate(&ctx(1, &state, &log, 0.0, 10, None)).unwrap());
    }

    #[test]
    fn time_horizon_finds_smallest_max_time() {
        let cond = TerminationCondition::composite(vec![
            TerminationCondition::max_events(10).unwrap(),
            TerminationCondition::max_time(5.0).unwrap(),
            TerminationCondition::max_time(2.5).unwrap(),
        ])
        .unwrap();
        assert_eq!(cond.time_horizon(), Some(2.5));
        assert_eq!(TerminationCondition::empty_queue().time_horizon(), None);
    }
}
