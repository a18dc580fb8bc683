//! Build task graph.
//!
//! A build is a directed acyclic graph of [`TaskNode`]s. Each node has a unique id, the
//! ids it depends on, the paths it writes and an action run at most once. Nodes are
//! registered on a [`TaskGraph`] in any order; [`TaskGraph::build`] then validates the
//! whole graph before anything runs:
//!
//! - every dependency id names a registered task ([`FwError::UnknownDependency`])
//! - there is no dependency cycle ([`FwError::CircularDependency`])
//! - no two tasks declare the same output, or one inside the other
//!   ([`FwError::OverlappingOutput`])
//!
//! The validated [`BuildGraph`] is executed by the [`Scheduler`].
//!
//! ```rust,no_run
//! use fwbundle_cli::graph::{Scheduler, TaskGraph, TaskKind, TaskNode};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut graph = TaskGraph::new();
//! graph.add_task(TaskNode::new("prepare", TaskKind::Filesystem, || async { Ok(()) }))?;
//! graph.add_task(
//!     TaskNode::new("compile", TaskKind::Process, || async { Ok(()) }).depends_on("prepare"),
//! )?;
//!
//! let report = Scheduler::new(4).execute(graph.build()?).await?;
//! assert!(report.succeeded());
//! # Ok(())
//! # }
//! ```

pub mod scheduler;

pub use scheduler::{BuildReport, Scheduler, TaskOutcome, TaskState};

use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::core::FwError;

/// The future produced by a task action.
pub type TaskFuture = BoxFuture<'static, Result<()>>;

type TaskAction = Box<dyn FnOnce() -> TaskFuture + Send>;

/// What a task does, for logs and plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Creates or removes files and directories.
    Filesystem,
    /// Runs an external program.
    Process,
    /// Locates and resolves native extensions.
    Discovery,
    /// Renders source files from templates.
    Render,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => f.write_str("fs"),
            Self::Process => f.write_str("process"),
            Self::Discovery => f.write_str("discovery"),
            Self::Render => f.write_str("render"),
        }
    }
}

/// One unit of work in the build graph.
pub struct TaskNode {
    id: String,
    kind: TaskKind,
    depends_on: Vec<String>,
    outputs: Vec<PathBuf>,
    action: TaskAction,
}

impl TaskNode {
    /// Creates a task running `action` once all its dependencies have succeeded.
    pub fn new<F, Fut>(id: impl Into<String>, kind: TaskKind, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            kind,
            depends_on: Vec::new(),
            outputs: Vec::new(),
            action: Box::new(move || action().boxed()),
        }
    }

    /// Adds a dependency. Repeated ids are recorded once.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    /// Declares a path this task writes.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub(crate) fn into_action(self) -> TaskAction {
        self.action
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("depends_on", &self.depends_on)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Tasks registered so far, not yet validated.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task.
    ///
    /// # Errors
    ///
    /// [`FwError::DuplicateTask`] if a task with the same id is already registered.
    pub fn add_task(&mut self, node: TaskNode) -> Result<(), FwError> {
        if self.index.contains_key(node.id()) {
            return Err(FwError::DuplicateTask {
                id: node.id().to_string(),
            });
        }
        tracing::trace!(target: "graph", "Registered task '{}' ({})", node.id(), node.kind());
        self.index.insert(node.id().to_string(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Validates the graph and freezes it for execution.
    pub fn build(self) -> Result<BuildGraph, FwError> {
        let mut graph: DiGraph<String, ()> = DiGraph::with_capacity(self.nodes.len(), 0);
        for node in &self.nodes {
            graph.add_node(node.id.clone());
        }

        // Edges point from a task to the tasks it depends on
        for (i, node) in self.nodes.iter().enumerate() {
            for dependency in &node.depends_on {
                let Some(&target) = self.index.get(dependency) else {
                    return Err(FwError::UnknownDependency {
                        task: node.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(target), ());
            }
        }

        detect_cycles(&graph)?;
        check_outputs(&self.nodes)?;

        tracing::debug!(target: "graph", "Validated build graph with {} task(s)", self.nodes.len());
        Ok(BuildGraph {
            graph,
            nodes: self.nodes,
        })
    }
}

fn detect_cycles(graph: &DiGraph<String, ()>) -> Result<(), FwError> {
    let mut colors = vec![Color::White; graph.node_count()];
    let mut path: Vec<NodeIndex> = Vec::new();

    for node in graph.node_indices() {
        if colors[node.index()] == Color::White
            && let Some(cycle) = dfs_visit(graph, node, &mut colors, &mut path)
        {
            let chain = cycle.iter().map(|idx| graph[*idx].as_str()).collect::<Vec<_>>().join(" → ");
            return Err(FwError::CircularDependency {
                chain,
            });
        }
    }

    Ok(())
}

fn dfs_visit(
    graph: &DiGraph<String, ()>,
    node: NodeIndex,
    colors: &mut [Color],
    path: &mut Vec<NodeIndex>,
) -> Option<Vec<NodeIndex>> {
    colors[node.index()] = Color::Gray;
    path.push(node);

    for neighbor in graph.neighbors(node) {
        match colors[neighbor.index()] {
            Color::Gray => {
                let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(neighbor);
                return Some(cycle);
            }
            Color::White => {
                if let Some(cycle) = dfs_visit(graph, neighbor, colors, path) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }

    path.pop();
    colors[node.index()] = Color::Black;
    None
}

fn outputs_overlap(a: &Path, b: &Path) -> bool {
    a == b || a.starts_with(b) || b.starts_with(a)
}

fn check_outputs(nodes: &[TaskNode]) -> Result<(), FwError> {
    for (i, first) in nodes.iter().enumerate() {
        for second in &nodes[i + 1..] {
            for a in &first.outputs {
                if let Some(b) = second.outputs.iter().find(|b| outputs_overlap(a, b)) {
                    let path = if a.starts_with(b) { a } else { b };
                    return Err(FwError::OverlappingOutput {
                        path: path.display().to_string(),
                        first: first.id.clone(),
                        second: second.id.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// A validated, acyclic task graph ready for execution.
#[derive(Debug)]
pub struct BuildGraph {
    graph: DiGraph<String, ()>,
    nodes: Vec<TaskNode>,
}

impl BuildGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    /// Task ids with every task after all of its dependencies.
    pub fn topological_order(&self) -> Vec<String> {
        match toposort(&self.graph, None) {
            Ok(indices) => indices.into_iter().rev().map(|idx| self.graph[idx].clone()).collect(),
            // Cycles were rejected by `TaskGraph::build`
            Err(_) => self.nodes.iter().map(|n| n.id.clone()).collect(),
        }
    }

    /// Indices of the tasks depending directly on task `index`.
    pub(crate) fn dependents(&self, index: usize) -> Vec<usize> {
        let mut dependents: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), petgraph::Direction::Incoming)
            .map(NodeIndex::index)
            .collect();
        dependents.sort_unstable();
        dependents.dedup();
        dependents
    }

    pub(crate) fn into_nodes(self) -> Vec<TaskNode> {
        self.nodes
    }
}
