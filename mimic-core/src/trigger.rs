//! Trigger state machines deciding when a task fires.

use crate::error::{Error, Result};
use crate::lang::eval::{eval_condition, CondScope};
use crate::lang::{self, Expr};
use crate::types::Record;

/// A small state machine answering "should this task fire right now?".
/// Each variant carries its own latch.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fires whenever `current_time - last_fired >= interval`; the latch is
    /// the last firing time, initially `-inf`.
    Periodic { interval: f64, last_fired: f64 },
    /// Fires iff the current event's name matches.
    Event { event: String },
    /// Fires on the rising edge of the expression (true now, false before).
    Condition {
        source: String,
        expr: Expr,
        was_true: bool,
    },
    /// Fires exactly once over a component's lifetime.
    Immediate { has_run: bool },
}

impl Trigger {
    pub fn periodic(interval: f64) -> Self {
        Trigger::Periodic {
            interval,
            last_fired: f64::NEG_INFINITY,
        }
    }

    pub fn event(event: impl Into<String>) -> Self {
        Trigger::Event {
            event: event.into(),
        }
    }

    /// Compile the condition expression now; malformed source is an error.
    pub fn condition(source: &str) -> Result<Self> {
        let expr = lang::parse_expression(source)
            .map_err(|e| Error::Validation(format!("invalid trigger condition: {e}")))?;
        Ok(Trigger::Condition {
            source: source.to_string(),
            expr,
            was_true: false,
        })
    }

    pub fn immediate() -> Self {
        Trigger::Immediate { has_run: false }
    }

    /// Decide whether the owning task fires for this event. Latches update
    /// only on a firing decision, except the Condition latch which tracks
    /// every successful evaluation to preserve edge detection. A failed
    /// condition evaluation reports false and leaves the latch untouched.
    pub fn should_activate(
        &mut self,
        event_name: Option<&str>,
        state: &Record,
        current_time: f64,
    ) -> bool {
        match self {
            Trigger::Periodic {
                interval,
                last_fired,
            } => {
                if current_time - *last_fired >= *interval {
                    *last_fired = current_time;
                    true
                } else {
                    false
                }
            }

            Trigger::Event { event } => event_name == Some(event.as_str()),

            Trigger::Condition {
                source,
                expr,
                was_true,
            } => {
                let scope = CondScope {
                    state,
                    current_time: Some(current_time),
                };
                match eval_condition(expr, &scope) {
                    Ok(value) => {
                        let is_true = value.is_truthy();
                        let rising = is_true && !*was_true;
                        *was_true = is_true;
                        rising
                    }
                    Err(e) => {
                        tracing::debug!(condition = %source, error = %e, "condition trigger evaluation failed");
                        false
                    }
                }
            }

            Trigger::Immediate { has_run } => {
                if *has_run {
                    false
                } else {
                    *has_run = true;
                    true
                }
            }
        }
    }

    /// Next firing time for periodic triggers: `last_fired + interval`.
    pub fn next_fire_time(&self) -> Option<f64> {
        match self {
            Trigger::Periodic {
                interval,
                last_fired,
            } => Some(*last_fired + *interval),
            _ => None,
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Trigger::Periodic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn periodic_fires_on_interval_and_rearms() {
        let mut trigger = Trigger::periodic(2.0);
        let state = Record::new();

        assert!(trigger.should_activate(None, &state, 0.0));
        assert_eq!(trigger.next_fire_time(), Some(2.0));
        assert!(!trigger.should_activate(None, &state, 1.0));
        assert!(trigger.should_activate(None, &state, 2.0));
        assert_eq!(trigger.next_fire_time(), Some(4.0));
    }

    #[test]
    fn event_trigger_matches_by_name() {
        let mut trigger = Trigger::event("ping");
        let state = Record::new();
        assert!(trigger.should_activate(Some("ping"), &state, 0.0));
        assert!(!trigger.should_activate(Some("pong"), &state, 0.0));
        assert!(!trigger.should_activate(None, &state, 0.0));
    }

    #[test]
    fn condition_trigger_fires_on_rising_edge_only() {
        let mut trigger = Trigger::condition("state.x > 10").unwrap();
        let mut state = Record::new();

        state.insert("x".into(), Value::Int(5));
        assert!(!trigger.should_activate(None, &state, 0.0));

        state.insert("x".into(), Value::Int(11));
        assert!(trigger.should_activate(None, &state, 1.0));
        // Still true: no new edge.
        state.insert("x".into(), Value::Int(12));
        assert!(!trigger.should_activate(None, &state, 2.0));

        // Falls, then rises again.
        state.insert("x".into(), Value::Int(0));
        assert!(!trigger.should_activate(None, &state, 3.0));
        state.insert("x".into(), Value::Int(99));
        assert!(trigger.should_activate(None, &state, 4.0));
    }

    #[test]
    fn condition_evaluation_failure_is_false_and_keeps_latch() {
        let mut trigger = Trigger::condition("state.flag").unwrap();
        let mut state = Record::new();

        state.insert("flag".into(), Value::Bool(true));
        assert!(trigger.should_activate(None, &state, 0.0));

        // Key disappears: evaluation fails, latch stays true, so the next
        // successful true evaluation is not a new edge.
        state.clear();
        assert!(!trigger.should_activate(None, &state, 1.0));
        state.insert("flag".into(), Value::Bool(true));
        assert!(!trigger.should_activate(None, &state, 2.0));
    }

    #[test]
    fn immediate_fires_exactly_once() {
        let mut trigger = Trigger::immediate();
        let state = Record::new();
        assert!(trigger.should_activate(Some("start"), &state, 0.0));
        assert!(!trigger.should_activate(Some("start"), &state, 1.0));
        assert!(!trigger.should_activate(None, &state, 2.0));
    }

    #[test]
    fn malformed_condition_fails_to_compile() {
        assert!(Trigger::condition("state.x >").is_err());
    }
}
