//! YAML component-definition parser.
//!
//! Two-stage pipeline: `serde_yaml` reads the raw document shape, then a
//! validation pass checks names, types, trigger payloads, and compiles task
//! actions and condition expressions, producing a validated [`Component`].
//! Syntax/IO problems are parse errors; structural problems are validation
//! errors.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::component::{Component, ComponentKind};
use crate::error::{Error, Result};
use crate::task::Task;
use crate::trigger::Trigger;
use crate::types::{Record, Value};

// ─── Raw document shape ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DocumentDef {
    component: ComponentDef,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ComponentDef {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    state: BTreeMap<String, serde_yaml::Value>,
    inputs: Vec<PortDef>,
    outputs: Vec<PortDef>,
    tasks: Vec<TaskDef>,
}

/// Ports are plain strings or single-key objects (the key is the name).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortDef {
    Name(String),
    Tagged(BTreeMap<String, serde_yaml::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskDef {
    name: String,
    code: String,
    #[serde(default)]
    depends_on: Vec<String>,
    trigger: Option<TriggerDef>,
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TriggerDef {
    #[serde(rename = "type")]
    kind: String,
    interval: Option<f64>,
    event: Option<String>,
    condition: Option<String>,
}

// ─── Parser ───────────────────────────────────────────────────

/// Parses component definition files into validated [`Component`]s.
pub struct ComponentParser;

impl ComponentParser {
    /// Load and parse a `.yaml`/`.yml` component file.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Component> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Parser(format!("file not found: {}", path.display())));
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {}
            _ => {
                return Err(Error::Parser(format!(
                    "file must have a .yaml or .yml extension: {}",
                    path.display()
                )))
            }
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Parser(format!("error reading {}: {e}", path.display())))?;
        Self::parse_str(&text)
    }

    /// Parse a component definition from YAML text.
    pub fn parse_str(text: &str) -> Result<Component> {
        // Stage 1: YAML syntax.
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| Error::Parser(format!("invalid YAML syntax: {e}")))?;
        // Stage 2: document shape.
        let doc: DocumentDef = serde_yaml::from_value(raw)
            .map_err(|e| Error::Validation(format!("malformed component definition: {e}")))?;
        Self::build(doc.component)
    }

    fn build(def: ComponentDef) -> Result<Component> {
        let name = def.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation(
                "component 'name' must be a non-empty string".into(),
            ));
        }

        let kind: ComponentKind = def.kind.parse()?;
        let state = convert_state(def.state)?;
        let inputs = port_names("input", def.inputs)?;
        let outputs = port_names("output", def.outputs)?;
        let tasks = build_tasks(def.tasks)?;

        Component::new(name, kind, state, inputs, outputs, tasks)
    }
}

fn convert_state(raw: BTreeMap<String, serde_yaml::Value>) -> Result<Record> {
    let mut state = Record::new();
    for (key, value) in raw {
        let value = scalar_from_yaml(&value).ok_or_else(|| {
            Error::Validation(format!("state entry '{key}' must be a scalar value"))
        })?;
        state.insert(key, value);
    }
    Ok(state)
}

fn scalar_from_yaml(value: &serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::Null => Some(Value::Null),
        serde_yaml::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        serde_yaml::Value::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}

fn port_names(port_kind: &str, ports: Vec<PortDef>) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(ports.len());
    for port in ports {
        match port {
            PortDef::Name(name) => names.push(name.trim().to_string()),
            PortDef::Tagged(map) => {
                if map.len() != 1 {
                    return Err(Error::Validation(format!(
                        "{port_kind} entries must be strings or single-key objects"
                    )));
                }
                // len() == 1 guarantees a key.
                let name = map.keys().next().unwrap();
                names.push(name.trim().to_string());
            }
        }
    }
    Ok(names)
}

fn build_tasks(defs: Vec<TaskDef>) -> Result<Vec<Task>> {
    if defs.is_empty() {
        return Err(Error::Validation(
            "component must have at least one task".into(),
        ));
    }

    let mut tasks = Vec::with_capacity(defs.len());
    let mut seen = std::collections::BTreeSet::new();

    for def in defs {
        let task_name = def.name.trim().to_string();
        if task_name.is_empty() {
            return Err(Error::Validation(
                "task 'name' must be a non-empty string".into(),
            ));
        }
        if !seen.insert(task_name.clone()) {
            return Err(Error::Validation(format!(
                "duplicate task name: '{task_name}'"
            )));
        }

        let mut task = Task::new(task_name.clone(), &def.code)?.with_depends_on(def.depends_on);

        if let Some(trigger) = def.trigger {
            task = task.with_trigger(build_trigger(&task_name, trigger)?);
        }
        if let Some(condition) = def.condition {
            task = task.with_condition(&condition)?;
        }
        tasks.push(task);
    }
    Ok(tasks)
}

fn build_trigger(task_name: &str, def: TriggerDef) -> Result<Trigger> {
    match def.kind.as_str() {
        "periodic" => {
            let interval = def.interval.ok_or_else(|| {
                Error::Validation(format!(
                    "task '{task_name}' periodic trigger missing 'interval'"
                ))
            })?;
            if interval < 0.0 {
                return Err(Error::Validation(format!(
                    "task '{task_name}' periodic trigger interval must be non-negative"
                )));
            }
            Ok(Trigger::periodic(interval))
        }
        "event" => {
            let event = def.event.ok_or_else(|| {
                Error::Validation(format!("task '{task_name}' event trigger missing 'event'"))
            })?;
            Ok(Trigger::event(event))
        }
        "condition" => {
            let condition = def.condition.ok_or_else(|| {
                Error::Validation(format!(
                    "task '{task_name}' condition trigger missing 'condition'"
                ))
            })?;
            Trigger::condition(&condition)
        }
        "immediate" => Ok(Trigger::immediate()),
        other => Err(Error::Validation(format!(
            "task '{task_name}' has unknown trigger type: '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER_YAML: &str = r#"
component:
  name: counter
  type: synchronous
  state:
    count: 0
  inputs:
    - inc
  outputs:
    - count
  tasks:
    - name: accumulate
      code: |
        count = state.count + inputs.inc
        outputs.count = count
        state.count = count
"#;

    #[test]
    fn parses_a_minimal_synchronous_component() {
        let component = ComponentParser::parse_str(COUNTER_YAML).unwrap();
        assert_eq!(component.name(), "counter");
        assert_eq!(component.kind(), ComponentKind::Synchronous);
        assert_eq!(component.state()["count"], Value::Int(0));
        assert_eq!(component.inputs(), ["inc".to_string()]);
        assert_eq!(component.tasks().len(), 1);
    }

    #[test]
    fn parses_triggers_and_guards() {
        let yaml = r#"
component:
  name: ticker
  type: ASYNCHRONOUS
  state:
    ticks: 0
  inputs: []
  outputs: []
  tasks:
    - name: tick
      code: "state.ticks = state.ticks + 1"
      trigger:
        type: periodic
        interval: 2.0
      condition: "state.ticks < 100"
    - name: on_ping
      code: "state.pinged = true"
      trigger:
        type: event
        event: ping
    - name: watch
      code: "state.seen = true"
      trigger:
        type: condition
        condition: "state.ticks > 3"
    - name: init
      code: "state.ready = true"
      trigger:
        type: immediate
"#;
        let component = ComponentParser::parse_str(yaml).unwrap();
        assert_eq!(component.kind(), ComponentKind::Asynchronous);
        assert!(component.tasks()[0].trigger().unwrap().is_periodic());
        assert!(component.tasks()[0].condition().is_some());
    }

    #[test]
    fn ports_accept_single_key_objects() {
        let yaml = r#"
component:
  name: tagged
  type: synchronous
  state: {}
  inputs:
    - plain
    - fancy: { doc: "a tagged port" }
  outputs: []
  tasks:
    - name: noop
      code: "x = 0"
"#;
        let component = ComponentParser::parse_str(yaml).unwrap();
        assert_eq!(
            component.inputs(),
            ["plain".to_string(), "fancy".to_string()]
        );
    }

    #[test]
    fn yaml_syntax_error_is_a_parser_error() {
        let err = ComponentParser::parse_str("component: [unclosed").unwrap_err();
        assert!(matches!(err, Error::Parser(_)));
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let err = ComponentParser::parse_str("component:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn unknown_component_type_is_rejected() {
        let yaml = r#"
component:
  name: x
  type: parallel
  state: {}
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
"#;
        let err = ComponentParser::parse_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("parallel")));
    }

    #[test]
    fn duplicate_task_names_are_rejected() {
        let yaml = r#"
component:
  name: x
  type: synchronous
  state: {}
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
    - name: t
      code: "x = 1"
"#;
        let err = ComponentParser::parse_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn empty_task_list_is_rejected() {
        let yaml = r#"
component:
  name: x
  type: synchronous
  state: {}
  inputs: []
  outputs: []
  tasks: []
"#;
        let err = ComponentParser::parse_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("at least one task")));
    }

    #[test]
    fn non_scalar_state_is_rejected() {
        let yaml = r#"
component:
  name: x
  type: synchronous
  state:
    nested: { a: 1 }
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
"#;
        let err = ComponentParser::parse_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("scalar")));
    }

    #[test]
    fn trigger_payload_validation() {
        let missing_interval = r#"
component:
  name: x
  type: asynchronous
  state: {}
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
      trigger:
        type: periodic
"#;
        assert!(matches!(
            ComponentParser::parse_str(missing_interval).unwrap_err(),
            Error::Validation(msg) if msg.contains("interval")
        ));

        let unknown = r#"
component:
  name: x
  type: asynchronous
  state: {}
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
      trigger:
        type: cron
"#;
        assert!(matches!(
            ComponentParser::parse_str(unknown).unwrap_err(),
            Error::Validation(msg) if msg.contains("cron")
        ));
    }

    #[test]
    fn unknown_dependency_surfaces_as_component_error() {
        let yaml = r#"
component:
  name: x
  type: synchronous
  state: {}
  inputs: []
  outputs: []
  tasks:
    - name: t
      code: "x = 0"
      depends_on: [ghost]
"#;
        let err = ComponentParser::parse_str(yaml).unwrap_err();
        assert!(matches!(err, Error::Component(msg) if msg.contains("ghost")));
    }
}
