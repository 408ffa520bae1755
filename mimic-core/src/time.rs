//! Monotonic virtual clock.

use crate::error::{Error, Result};

/// The simulation's virtual time. Advances monotonically; never wall-clock.
#[derive(Debug, Clone, Copy)]
pub struct SimulationTime {
    current_time: f64,
    start_time: f64,
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SimulationTime {
    pub fn new(initial_time: f64) -> Self {
        Self {
            current_time: initial_time,
            start_time: initial_time,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Jump the clock forward to `new_time`. Moving backwards is an error.
    pub fn advance_to(&mut self, new_time: f64) -> Result<()> {
        if new_time < self.current_time {
            return Err(Error::Time(format!(
                "cannot move time backwards: {} < {}",
                new_time, self.current_time
            )));
        }
        self.current_time = new_time;
        Ok(())
    }

    /// Advance by a non-negative delta.
    pub fn advance_by(&mut self, delta: f64) -> Result<()> {
        if delta < 0.0 {
            return Err(Error::Time(format!(
                "cannot advance by a negative delta: {delta}"
            )));
        }
        self.current_time += delta;
        Ok(())
    }

    pub fn elapsed(&self) -> f64 {
        self.current_time - self.start_time
    }

    /// Reset both start and current time.
    pub fn reset(&mut self, time: f64) {
        self.current_time = time;
        self.start_time = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_forward_and_tracks_elapsed() {
        let mut time = SimulationTime::new(1.0);
        time.advance_to(3.5).unwrap();
        time.advance_by(0.5).unwrap();
        assert_eq!(time.current_time(), 4.0);
        assert_eq!(time.elapsed(), 3.0);
    }

    #[test]
    fn rejects_backward_motion() {
        let mut time = SimulationTime::new(5.0);
        assert!(time.advance_to(4.9).is_err());
        assert!(time.advance_by(-0.1).is_err());
        assert_eq!(time.current_time(), 5.0);
    }

    #[test]
    fn advance_to_same_instant_is_allowed() {
        let mut time = SimulationTime::default();
        time.advance_to(0.0).unwrap();
        assert_eq!(time.current_time(), 0.0);
    }

    #[test]
    fn reset_moves_both_anchors() {
        let mut time = SimulationTime::new(0.0);
        time.advance_to(9.0).unwrap();
        time.reset(2.0);
        assert_eq!(time.current_time(), 2.0);
        assert_eq!(time.elapsed(), 0.0);
    }
}
