//! The task graph.

use mosaic_core::{DependencyGraph, SetupError};

/// Named setup stages and the order between them.
#[derive(Clone, Debug, Default)]
pub struct TaskGraph {
    graph: DependencyGraph<String>,
}

impl TaskGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph whose tasks run strictly in the given order.
    pub fn sequence(tasks: &[&str]) -> Self {
        let mut g = Self::new();
        for t in tasks {
            g.add_task(t);
        }
        for pair in tasks.windows(2) {
            g.graph.add_edge(pair[0].to_string(), pair[1].to_string());
        }
        g
    }

    /// Register a task. Registering an existing task is a no-op.
    pub fn add_task(&mut self, name: &str) -> &mut Self {
        self.graph.add_node(name.to_string());
        self
    }

    /// Require `task` to run after `depends_on`. Both must be registered.
    pub fn add_dependency(
        &mut self,
        task: &str,
        depends_on: &str,
    ) -> Result<&mut Self, SetupError> {
        for t in [task, depends_on] {
            if !self.contains(t) {
                return Err(SetupError::InvalidState {
                    reason: format!("task dependency names unregistered task '{t}'"),
                });
            }
        }
        self.graph
            .add_edge(depends_on.to_string(), task.to_string());
        Ok(self)
    }

    /// Returns `true` if the task is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.graph.contains(&name.to_string())
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Returns `true` if no task is registered.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.graph.nodes().map(String::as_str)
    }

    /// Execution order; unordered tasks keep registration order.
    pub fn order(&self) -> Result<Vec<String>, SetupError> {
        self.graph.sort().map_err(|e| SetupError::CyclicDependency {
            context: "tasks".to_string(),
            members: e.members,
        })
    }
}
