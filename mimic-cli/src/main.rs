//! mimic — execute synchronous and asynchronous component simulations.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use mimic_core::{
    ComponentKind, ComponentParser, EventDrivenExecutor, ExecutionLog, InputGenerator,
    InputSpec, InteractiveInputGenerator, RandomInputGenerator, Record, RoundRecord,
    SynchronousExecutor, TerminationCondition, Value,
};

#[derive(Parser)]
#[command(
    name = "mimic",
    about = "Execute synchronous and asynchronous component simulations",
    after_help = "\
Examples:
  # Synchronous with interactive input
  mimic component.yaml --rounds 10 --input-mode interactive

  # Synchronous with random inputs
  mimic component.yaml --rounds 10 --input-mode random --random-inputs \"value:int:1:10\"

  # Asynchronous with a time limit
  mimic async_component.yaml --max-time 100.0

  # Asynchronous with inputs at intervals
  mimic async_component.yaml --max-time 50.0 --input-mode random \\
      --random-inputs \"temp:float:15:30\" --input-interval 1.0

  # Mixed termination conditions
  mimic component.yaml --rounds 100 --condition \"state.done == true\""
)]
struct Args {
    /// Path to the component YAML file
    component_file: PathBuf,

    /// Maximum number of rounds (synchronous) or events (asynchronous)
    #[arg(long, help_heading = "Termination")]
    rounds: Option<u64>,

    /// Maximum simulation time (asynchronous only)
    #[arg(long, help_heading = "Termination")]
    max_time: Option<f64>,

    /// Maximum number of events (asynchronous only)
    #[arg(long, help_heading = "Termination")]
    max_events: Option<u64>,

    /// Termination condition (expression over state, e.g. "state.done == true")
    #[arg(long, help_heading = "Termination")]
    condition: Option<String>,

    /// Input generation mode (required for synchronous components)
    #[arg(long, value_enum, help_heading = "Input generation")]
    input_mode: Option<InputMode>,

    /// Random input specification (format: name:type[:min:max],...)
    #[arg(long, help_heading = "Input generation")]
    random_inputs: Option<String>,

    /// Random seed for reproducible random inputs
    #[arg(long, help_heading = "Input generation")]
    seed: Option<u64>,

    /// Initial input values for async (format: key=value,key=value)
    #[arg(long, help_heading = "Input generation")]
    initial_inputs: Option<String>,

    /// Interval for periodic input generation (async only)
    #[arg(long, help_heading = "Input generation")]
    input_interval: Option<f64>,

    /// Event name for generated inputs
    #[arg(long, default_value = "input_ready", help_heading = "Input generation")]
    input_event: String,

    /// Output file path (.json or .csv)
    #[arg(long, help_heading = "Output")]
    output: Option<PathBuf>,

    /// Track and display the task execution order
    #[arg(long, help_heading = "Output")]
    track_tasks: bool,

    /// Print detailed execution information
    #[arg(long, help_heading = "Output")]
    verbose: bool,

    /// Maximum parallel workers for task execution (async only)
    #[arg(long, help_heading = "Asynchronous execution")]
    max_workers: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InputMode {
    Interactive,
    Random,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if is_interrupted(&e) {
                eprintln!("\nExecution interrupted by user");
                return ExitCode::from(130);
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn is_interrupted(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.kind() == std::io::ErrorKind::Interrupted)
}

fn run(args: Args) -> anyhow::Result<()> {
    if args.verbose {
        println!("Loading component from: {}", args.component_file.display());
    }
    tracing::debug!(file = %args.component_file.display(), "loading component definition");

    let component = ComponentParser::parse_file(&args.component_file)?;
    let is_async = component.kind() == ComponentKind::Asynchronous;

    if args.verbose {
        println!("Component: {} ({})", component.name(), component.kind());
        println!("Inputs: {:?}", component.inputs());
        println!("Outputs: {:?}", component.outputs());
        println!("State: {}", format_record(component.state()));
        println!();
        println!(
            "Execution mode: {}",
            if is_async { "event-driven" } else { "round-based" }
        );
    }

    let input_generator: Option<Box<dyn InputGenerator>> = match args.input_mode {
        Some(InputMode::Interactive) => Some(Box::new(InteractiveInputGenerator::new())),
        Some(InputMode::Random) => {
            let spec_text = args
                .random_inputs
                .as_deref()
                .context("--random-inputs is required with --input-mode random")?;
            let specs = parse_random_inputs(spec_text)?;
            Some(Box::new(RandomInputGenerator::new(specs, args.seed)))
        }
        None => None,
    };

    let initial_inputs = args
        .initial_inputs
        .as_deref()
        .map(parse_initial_inputs)
        .transpose()?
        .unwrap_or_default();

    let termination = build_termination(&args, is_async)?;

    let log = if is_async {
        let mut executor = EventDrivenExecutor::new(component)?
            .with_termination(termination)
            .with_input_event_name(args.input_event.clone())
            .with_initial_inputs(initial_inputs);
        if let Some(generator) = input_generator {
            executor = executor.with_input_generator(generator);
        }
        if let Some(interval) = args.input_interval {
            executor = executor.with_input_interval(interval);
        }
        if let Some(max_workers) = args.max_workers {
            executor = executor.with_max_workers(max_workers)?;
        }

        executor.run()?;

        let stats = executor.statistics();
        println!("Simulation complete!");
        println!("Events processed: {}", stats.total_events);
        println!("Simulation time: {:.2}s", stats.simulation_time);
        if stats.input_rounds > 0 {
            println!("Input rounds: {}", stats.input_rounds);
        }
        println!("Final state: {}", format_record(&stats.final_state));
        println!("Final outputs: {}", format_record(&stats.final_outputs));

        executor.log().clone()
    } else {
        let generator =
            input_generator.context("synchronous components require --input-mode")?;
        let mut executor = SynchronousExecutor::new(component, generator, termination)
            .with_track_task_order(args.track_tasks);

        executor.run()?;
        println!("\nExecution complete: {} rounds", executor.log().len());
        executor.log().clone()
    };

    if args.verbose {
        print_log(&log, is_async);
    }

    if let Some(output) = &args.output {
        match output.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                log.to_json_file(output)?;
                println!("\nSaved log to: {}", output.display());
            }
            Some("csv") => {
                log.to_csv_file(output)?;
                println!("\nSaved log to: {}", output.display());
            }
            other => {
                println!(
                    "\nWarning: unknown output format '{}', skipping save",
                    other.unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn build_termination(args: &Args, is_async: bool) -> anyhow::Result<TerminationCondition> {
    let mut conditions = Vec::new();

    if is_async {
        if let Some(rounds) = args.rounds {
            conditions.push(TerminationCondition::max_events(rounds)?);
        }
        if let Some(max_time) = args.max_time {
            conditions.push(TerminationCondition::max_time(max_time)?);
        }
        if let Some(max_events) = args.max_events {
            conditions.push(TerminationCondition::max_events(max_events)?);
        }
        if let Some(condition) = &args.condition {
            conditions.push(TerminationCondition::state_condition(condition)?);
        }
        if conditions.is_empty() {
            conditions.push(TerminationCondition::empty_queue());
        }
    } else {
        if args.max_time.is_some() || args.max_events.is_some() {
            eprintln!("Warning: --max-time and --max-events are ignored for synchronous components");
        }
        if let Some(rounds) = args.rounds {
            conditions.push(TerminationCondition::max_rounds(rounds)?);
        }
        if let Some(condition) = &args.condition {
            conditions.push(TerminationCondition::state_condition(condition)?);
        }
        if conditions.is_empty() {
            conditions.push(TerminationCondition::max_rounds(10)?);
        }
    }

    Ok(if conditions.len() == 1 {
        conditions.remove(0)
    } else {
        TerminationCondition::composite(conditions)?
    })
}

/// Parse `name:type[:min:max],...` random-input specifications. String
/// inputs may list their choices: `tag:str:red:green:blue`.
fn parse_random_inputs(text: &str) -> anyhow::Result<BTreeMap<String, InputSpec>> {
    let mut specs = BTreeMap::new();
    for item in text.split(',') {
        let item = item.trim();
        let parts: Vec<&str> = item.split(':').collect();
        if parts.len() < 2 {
            bail!("invalid input spec: '{item}'");
        }
        let name = parts[0].to_string();
        let spec = match parts[1] {
            "int" => {
                if parts.len() >= 4 {
                    InputSpec::Int {
                        min: parts[2].parse().context("invalid int min")?,
                        max: parts[3].parse().context("invalid int max")?,
                    }
                } else {
                    InputSpec::int_default()
                }
            }
            "float" => {
                if parts.len() >= 4 {
                    InputSpec::Float {
                        min: parts[2].parse().context("invalid float min")?,
                        max: parts[3].parse().context("invalid float max")?,
                    }
                } else {
                    InputSpec::float_default()
                }
            }
            "bool" => InputSpec::Bool,
            "str" => {
                let choices: Vec<String> = if parts.len() > 2 {
                    parts[2..].iter().map(|s| s.to_string()).collect()
                } else {
                    vec!["a".to_string(), "b".to_string(), "c".to_string()]
                };
                InputSpec::Str { choices }
            }
            other => bail!("unknown input type: '{other}'"),
        };
        specs.insert(name, spec);
    }
    Ok(specs)
}

/// Parse `key=value,key=value` initial-input pairs.
fn parse_initial_inputs(text: &str) -> anyhow::Result<Record> {
    let mut inputs = Record::new();
    for pair in text.split(',') {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid initial input format: '{pair}'");
        };
        inputs.insert(key.trim().to_string(), Value::parse_lossy(value));
    }
    Ok(inputs)
}

fn format_record(record: &Record) -> String {
    let body: Vec<String> = record
        .iter()
        .map(|(k, v)| match v {
            Value::Str(s) => format!("{k}: \"{s}\""),
            Value::Null => format!("{k}: null"),
            other => format!("{k}: {other}"),
        })
        .collect();
    format!("{{{}}}", body.join(", "))
}

fn print_log(log: &ExecutionLog, is_async: bool) {
    println!("\n--- Execution Log ---");
    for record in log.rounds() {
        print_record(record, is_async);
    }
}

fn print_record(record: &RoundRecord, is_async: bool) {
    if is_async {
        let time = record.inputs.get("time").and_then(|v| v.as_f64()).unwrap_or(0.0);
        println!("\nEvent {} (t={time:.2}s):", record.round_number);
    } else {
        println!("\nRound {}:", record.round_number);
    }
    println!("  Inputs: {}", format_record(&record.inputs));
    println!("  Outputs: {}", format_record(&record.outputs));
    println!("  State: {}", format_record(&record.state));
    if let Some(order) = &record.task_order {
        println!("  Tasks: {}", order.join(" -> "));
    }
}
