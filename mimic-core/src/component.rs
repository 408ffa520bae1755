//! Components: state + ports + tasks, with dependency validation and a
//! deterministic execution order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{Error, Result};
use crate::task::{Task, TaskContext};
use crate::types::{Record, Value};

/// Whether the component runs round-based or event-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Synchronous,
    Asynchronous,
}

impl FromStr for ComponentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synchronous" => Ok(ComponentKind::Synchronous),
            "asynchronous" => Ok(ComponentKind::Asynchronous),
            other => Err(Error::Validation(format!(
                "component 'type' must be 'synchronous' or 'asynchronous', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Synchronous => write!(f, "synchronous"),
            ComponentKind::Asynchronous => write!(f, "asynchronous"),
        }
    }
}

/// One simulation subject: named state, input/output ports, and tasks.
///
/// The dependency graph is validated at construction (unknown names,
/// cycles), and the topological execution order is precomputed there —
/// identical inputs always give an identical order.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    kind: ComponentKind,
    pub(crate) state: Record,
    inputs: Vec<String>,
    outputs: Vec<String>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) current_outputs: Record,
    exec_order: Vec<usize>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        kind: ComponentKind,
        initial_state: Record,
        inputs: Vec<String>,
        outputs: Vec<String>,
        tasks: Vec<Task>,
    ) -> Result<Self> {
        let name = name.into();
        let exec_order = validate_and_order(&name, &tasks)?;
        let current_outputs = outputs
            .iter()
            .map(|o| (o.clone(), Value::Null))
            .collect();
        Ok(Self {
            name,
            kind,
            state: initial_state,
            inputs,
            outputs,
            tasks,
            current_outputs,
            exec_order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn state(&self) -> &Record {
        &self.state
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Tasks in declared order (not execution order).
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn current_outputs(&self) -> &Record {
        &self.current_outputs
    }

    /// Tasks in dependency order: every task after everything it depends on,
    /// declared order among peers.
    pub fn execution_order(&self) -> impl Iterator<Item = &Task> {
        self.exec_order.iter().map(|&i| &self.tasks[i])
    }

    pub fn execution_order_names(&self) -> Vec<String> {
        self.execution_order().map(|t| t.name().to_string()).collect()
    }

    /// Run one synchronous round: all tasks, dependency order, one shared
    /// context. Returns a snapshot of the current outputs.
    pub fn execute_round(&mut self, input_values: &Record) -> Result<Record> {
        for input_name in &self.inputs {
            if !input_values.contains_key(input_name) {
                return Err(Error::Component(format!(
                    "missing required input '{}' for component '{}'",
                    input_name, self.name
                )));
            }
        }

        let Self {
            state,
            tasks,
            current_outputs,
            exec_order,
            ..
        } = self;

        let mut ctx = TaskContext::for_round(input_values, current_outputs, state);
        for &index in exec_order.iter() {
            tasks[index].execute(&mut ctx)?;
        }

        Ok(self.current_outputs.clone())
    }
}

/// Check dependency closure and acyclicity, then compute the stable Kahn
/// order: FIFO queue seeded in declared order, adjacency pushed in declared
/// order.
fn validate_and_order(component_name: &str, tasks: &[Task]) -> Result<Vec<usize>> {
    let index_by_name: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name(), i))
        .collect();

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(tasks.len(), tasks.len());
    let node_ids: Vec<_> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();

    let mut in_degree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];

    for (index, task) in tasks.iter().enumerate() {
        for dependency in task.depends_on() {
            let &dep_index = index_by_name.get(dependency.as_str()).ok_or_else(|| {
                Error::Component(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.name(),
                    dependency
                ))
            })?;
            graph.add_edge(node_ids[dep_index], node_ids[index], ());
            dependents[dep_index].push(index);
            in_degree[index] += 1;
        }
    }

    if toposort(&graph, None).is_err() {
        return Err(Error::Component(format!(
            "circular task dependencies detected in component '{component_name}'"
        )));
    }

    let mut queue: VecDeque<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());
    while let Some(index) = queue.pop_front() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    // Unreachable after the acyclicity check; kept as a structural guard.
    if order.len() != tasks.len() {
        return Err(Error::Component(format!(
            "failed to order tasks for component '{component_name}'"
        )));
    }

    Ok(order)
}
