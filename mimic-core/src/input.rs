//! Input generation for component execution.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::types::{Record, Value};

/// Produces one input record per round/step.
///
/// Contract: the returned record contains every requested name; extras are
/// allowed and ignored by the component.
pub trait InputGenerator {
    fn generate(
        &mut self,
        input_names: &[String],
        round_number: u64,
        state: &Record,
    ) -> Result<Record>;
}

// ─── Interactive ──────────────────────────────────────────────

/// Prompts on stdin for each input, parsing int → float → bool → str.
#[derive(Debug, Default)]
pub struct InteractiveInputGenerator;

impl InteractiveInputGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl InputGenerator for InteractiveInputGenerator {
    fn generate(
        &mut self,
        input_names: &[String],
        round_number: u64,
        state: &Record,
    ) -> Result<Record> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();

        writeln!(stdout, "\n--- Round {round_number} ---")?;
        writeln!(stdout, "Current state: {state:?}")?;

        let mut inputs = Record::new();
        for name in input_names {
            write!(stdout, "Enter value for '{name}': ")?;
            stdout.flush()?;

            let mut line = String::new();
            let read = stdin.lock().read_line(&mut line)?;
            if read == 0 {
                return Err(Error::Input(format!(
                    "end of input while reading value for '{name}'"
                )));
            }
            inputs.insert(name.clone(), Value::parse_lossy(&line));
        }
        Ok(inputs)
    }
}

// ─── Random ───────────────────────────────────────────────────

/// Per-input specification for random generation.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    Str { choices: Vec<String> },
}

impl InputSpec {
    /// Defaults mirroring the classic spec shorthand: ints 0..=100,
    /// floats 0..1.
    pub fn int_default() -> Self {
        InputSpec::Int { min: 0, max: 100 }
    }

    pub fn float_default() -> Self {
        InputSpec::Float { min: 0.0, max: 1.0 }
    }
}

/// Generates random values per spec, reproducible under a seed.
#[derive(Debug)]
pub struct RandomInputGenerator {
    specs: BTreeMap<String, InputSpec>,
    rng: StdRng,
}

impl RandomInputGenerator {
    pub fn new(specs: BTreeMap<String, InputSpec>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { specs, rng }
    }
}

impl InputGenerator for RandomInputGenerator {
    fn generate(
        &mut self,
        input_names: &[String],
        _round_number: u64,
        _state: &Record,
    ) -> Result<Record> {
        let mut inputs = Record::new();
        for name in input_names {
            let spec = self.specs.get(name).ok_or_else(|| {
                Error::Input(format!("no specification found for input '{name}'"))
            })?;
            let value = match spec {
                InputSpec::Int { min, max } => {
                    if min > max {
                        return Err(Error::Input(format!(
                            "input '{name}' has an empty range {min}..{max}"
                        )));
                    }
                    Value::Int(self.rng.gen_range(*min..=*max))
                }
                InputSpec::Float { min, max } => {
                    if min > max {
                        return Err(Error::Input(format!(
                            "input '{name}' has an empty range {min}..{max}"
                        )));
                    }
                    if min == max {
                        Value::Float(*min)
                    } else {
                        Value::Float(self.rng.gen_range(*min..*max))
                    }
                }
                InputSpec::Bool => Value::Bool(self.rng.gen()),
                InputSpec::Str { choices } => {
                    let choice = choices.choose(&mut self.rng).ok_or_else(|| {
                        Error::Input(format!("input '{name}' has an empty choice list"))
                    })?;
                    Value::Str(choice.clone())
                }
            };
            inputs.insert(name.clone(), value);
        }
        Ok(inputs)
    }
}

// ─── Fixed ────────────────────────────────────────────────────

/// Replays a pre-recorded per-round sequence; exhaustion is an error.
#[derive(Debug, Clone)]
pub struct FixedInputGenerator {
    sequence: Vec<Record>,
}

impl FixedInputGenerator {
    pub fn new(sequence: Vec<Record>) -> Self {
        Self { sequence }
    }
}

impl InputGenerator for FixedInputGenerator {
    fn generate(
        &mut self,
        _input_names: &[String],
        round_number: u64,
        _state: &Record,
    ) -> Result<Record> {
        round_number
            .checked_sub(1)
            .and_then(|idx| self.sequence.get(idx as usize))
            .cloned()
            .ok_or_else(|| Error::Input(format!("no input defined for round {round_number}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn random_is_reproducible_under_a_seed() {
        let specs: BTreeMap<String, InputSpec> = [
            ("value".to_string(), InputSpec::Int { min: 0, max: 10 }),
            ("flag".to_string(), InputSpec::Bool),
            (
                "tag".to_string(),
                InputSpec::Str {
                    choices: vec!["a".into(), "b".into(), "c".into()],
                },
            ),
        ]
        .into_iter()
        .collect();

        let state = Record::new();
        let requested = names(&["value", "flag", "tag"]);

        let mut a = RandomInputGenerator::new(specs.clone(), Some(7));
        let mut b = RandomInputGenerator::new(specs, Some(7));
        for round in 1..=5 {
            assert_eq!(
                a.generate(&requested, round, &state).unwrap(),
                b.generate(&requested, round, &state).unwrap()
            );
        }
    }

    #[test]
    fn random_respects_int_bounds() {
        let specs: BTreeMap<String, InputSpec> =
            [("v".to_string(), InputSpec::Int { min: 3, max: 5 })]
                .into_iter()
                .collect();
        let mut generator = RandomInputGenerator::new(specs, Some(1));
        let state = Record::new();
        for round in 1..=50 {
            match generator.generate(&names(&["v"]), round, &state).unwrap()["v"] {
                Value::Int(n) => assert!((3..=5).contains(&n)),
                ref other => panic!("expected int, got {other:?}"),
            }
        }
    }

    #[test]
    fn random_missing_spec_is_an_error() {
        let mut generator = RandomInputGenerator::new(BTreeMap::new(), Some(1));
        assert!(generator
            .generate(&names(&["ghost"]), 1, &Record::new())
            .is_err());
    }

    #[test]
    fn fixed_replays_then_errors_when_exhausted() {
        let mut generator = FixedInputGenerator::new(vec![
            [("inc".to_string(), Value::Int(1))].into_iter().collect(),
            [("inc".to_string(), Value::Int(2))].into_iter().collect(),
        ]);
        let state = Record::new();
        let requested = names(&["inc"]);

        assert_eq!(
            generator.generate(&requested, 1, &state).unwrap()["inc"],
            Value::Int(1)
        );
        assert_eq!(
            generator.generate(&requested, 2, &state).unwrap()["inc"],
            Value::Int(2)
        );
        assert!(generator.generate(&requested, 3, &state).is_err());
    }
}
