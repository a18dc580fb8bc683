//! Execution of a validated [`BuildGraph`].
//!
//! A single coordinator owns all task state. It seeds a ready queue with the tasks that
//! have no dependencies, spawns ready tasks onto a tokio [`JoinSet`] up to `max_workers`
//! at a time, and on each completion releases the dependents whose dependencies have all
//! succeeded. A task therefore starts only after the effects of every dependency are
//! complete.
//!
//! When a task fails, nothing that transitively depends on it is started. Tasks already
//! running and independent branches still run to completion, so one failed build step
//! does not waste the work of unrelated ones.

use anyhow::Result;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinSet};

use super::BuildGraph;
use crate::core::{FwError, format_error_chain};
use crate::utils::TaskProgress;

/// Lifecycle of one task within an execution.
///
/// `Pending → Ready → Running → {Succeeded, Failed}`. A task blocked by a failed
/// dependency stays `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final state of one task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub id: String,
    pub state: TaskState,
    /// Wall time of the action, when it ran.
    pub duration: Option<Duration>,
    /// The action's error, when it failed.
    pub error: Option<anyhow::Error>,
}

/// Result of executing a build graph.
#[derive(Debug)]
pub struct BuildReport {
    /// One outcome per task, in registration order.
    pub outcomes: Vec<TaskOutcome>,
    /// Id of the first task that failed.
    pub first_failure: Option<String>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.first_failure.is_none()
    }

    pub fn state(&self, id: &str) -> Option<TaskState> {
        self.outcomes.iter().find(|o| o.id == id).map(|o| o.state)
    }

    /// Ids of tasks that never ran because a dependency failed.
    pub fn blocked(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == TaskState::Pending)
            .map(|o| o.id.as_str())
            .collect()
    }

    /// Turns a failed report into [`FwError::TaskFailed`] naming the first failure.
    pub fn into_result(self) -> Result<Self> {
        let Some(task) = self.first_failure.clone() else {
            return Ok(self);
        };
        let reason = self
            .outcomes
            .iter()
            .find(|o| o.id == task)
            .and_then(|o| o.error.as_ref())
            .map(format_error_chain)
            .unwrap_or_else(|| "unknown error".to_string());
        Err(FwError::TaskFailed {
            task,
            reason,
        }
        .into())
    }
}

/// Runs build graphs on a bounded pool of workers.
pub struct Scheduler {
    max_workers: usize,
    show_progress: bool,
}

impl Scheduler {
    /// Creates a scheduler running at most `max_workers` tasks at once (minimum 1).
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            show_progress: false,
        }
    }

    /// Shows a spinner with the running tasks.
    #[must_use]
    pub const fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Executes `graph`, failing with [`FwError::TaskFailed`] if any task failed.
    pub async fn execute(&self, graph: BuildGraph) -> Result<BuildReport> {
        self.run(graph).await.into_result()
    }

    /// Executes `graph` and reports the outcome of every task.
    pub async fn run(&self, graph: BuildGraph) -> BuildReport {
        let start = Instant::now();
        let total = graph.len();

        let dependents: Vec<Vec<usize>> = (0..total).map(|i| graph.dependents(i)).collect();
        let mut remaining: Vec<usize> = graph.tasks().map(|t| t.dependencies().len()).collect();
        let nodes = graph.into_nodes();

        let ids: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
        let mut actions: Vec<Option<_>> = nodes.into_iter().map(|n| Some(n.into_action())).collect();
        let mut states = vec![TaskState::Pending; total];
        let mut durations: Vec<Option<Duration>> = vec![None; total];
        let mut errors: Vec<Option<anyhow::Error>> = (0..total).map(|_| None).collect();
        let mut first_failure: Option<usize> = None;

        let progress =
            if self.show_progress { TaskProgress::new(total as u64) } else { TaskProgress::hidden() };

        let mut ready: VecDeque<usize> = (0..total).filter(|&i| remaining[i] == 0).collect();
        for &i in &ready {
            states[i] = TaskState::Ready;
        }

        let mut running: JoinSet<(Result<()>, Duration)> = JoinSet::new();
        let mut spawned: HashMap<task::Id, usize> = HashMap::new();

        loop {
            while running.len() < self.max_workers
                && let Some(i) = ready.pop_front()
            {
                let Some(action) = actions[i].take() else {
                    continue;
                };
                states[i] = TaskState::Running;
                tracing::debug!(target: "graph", "Starting task '{}'", ids[i]);
                let handle = running.spawn(async move {
                    let started = Instant::now();
                    // The closure itself may panic before yielding a future
                    let guarded = AssertUnwindSafe(async move { action().await });
                    let result = match guarded.catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("task panicked")),
                    };
                    (result, started.elapsed())
                });
                spawned.insert(handle.id(), i);
            }

            progress.set_running(
                &(0..total)
                    .filter(|&i| states[i] == TaskState::Running)
                    .map(|i| ids[i].clone())
                    .collect::<Vec<_>>(),
            );

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };
            let (index, result, elapsed) = match joined {
                Ok((id, (result, elapsed))) => {
                    let Some(index) = spawned.remove(&id) else {
                        continue;
                    };
                    (index, result, Some(elapsed))
                }
                Err(err) => {
                    let Some(index) = spawned.remove(&err.id()) else {
                        continue;
                    };
                    (index, Err(anyhow::anyhow!("task did not complete: {err}")), None)
                }
            };

            durations[index] = elapsed;
            progress.inc();

            match result {
                Ok(()) => {
                    states[index] = TaskState::Succeeded;
                    let elapsed = elapsed.unwrap_or_default();
                    if elapsed.as_secs() >= 1 {
                        tracing::info!(
                            target: "graph",
                            "Finished '{}' in {:.2}s",
                            ids[index],
                            elapsed.as_secs_f64()
                        );
                    } else {
                        tracing::debug!(target: "graph", "Finished '{}'", ids[index]);
                    }

                    for &dependent in &dependents[index] {
                        remaining[dependent] = remaining[dependent].saturating_sub(1);
                        if remaining[dependent] == 0 && states[dependent] == TaskState::Pending {
                            states[dependent] = TaskState::Ready;
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(error) => {
                    states[index] = TaskState::Failed;
                    tracing::error!(
                        target: "graph",
                        "Task '{}' failed: {}",
                        ids[index],
                        format_error_chain(&error)
                    );
                    errors[index] = Some(error);
                    if first_failure.is_none() {
                        first_failure = Some(index);
                    }
                }
            }
        }

        progress.finish();

        let outcomes: Vec<TaskOutcome> = ids
            .into_iter()
            .zip(states)
            .zip(durations)
            .zip(errors)
            .map(|(((id, state), duration), error)| TaskOutcome {
                id,
                state,
                duration,
                error,
            })
            .collect();

        let blocked = outcomes.iter().filter(|o| o.state == TaskState::Pending).count();
        if blocked > 0 {
            tracing::warn!(target: "graph", "{} task(s) not run because a dependency failed", blocked);
        }

        BuildReport {
            first_failure: first_failure.map(|i| outcomes[i].id.clone()),
            outcomes,
            elapsed: start.elapsed(),
        }
    }
}
