//! Ordering and running actions.
//!
//! Per task, actions are sorted by Kahn's algorithm over their
//! `before`/`after` hints. Whenever several actions are ready, the one
//! added to the pipeline first runs first. Hints naming an action that is
//! not in the same task are ignored for that task.

use indexmap::IndexMap;
use mosaic_core::{DependencyGraph, SetupError};

use crate::action::Action;
use crate::task::TaskGraph;

/// The actions of one task, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanStep {
    /// The task.
    pub task: String,
    /// Action names.
    pub actions: Vec<String>,
}

/// The full execution order computed by [`ActionPipeline::plan`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Steps in task order. Tasks without actions still appear.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// `(task, action)` pairs in execution order.
    pub fn calls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.steps.iter().flat_map(|s| {
            s.actions
                .iter()
                .map(move |a| (s.task.as_str(), a.as_str()))
        })
    }

    /// Number of `mutate` calls the plan makes.
    pub fn len(&self) -> usize {
        self.steps.iter().map(|s| s.actions.len()).sum()
    }

    /// Returns `true` if the plan makes no calls.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry<T> {
    action: Box<dyn Action<T>>,
    tasks: Vec<String>,
    before: Vec<String>,
    after: Vec<String>,
}

/// A task graph plus the actions that populate it.
pub struct ActionPipeline<T> {
    tasks: TaskGraph,
    actions: IndexMap<String, Entry<T>>,
}

impl<T> ActionPipeline<T> {
    /// A pipeline over `tasks` with no actions.
    pub fn new(tasks: TaskGraph) -> Self {
        Self {
            tasks,
            actions: IndexMap::new(),
        }
    }

    /// The task graph.
    pub fn tasks(&self) -> &TaskGraph {
        &self.tasks
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no actions were added.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Add an action. Declaration order is the tie-break for ordering.
    pub fn add(&mut self, action: Box<dyn Action<T>>) -> Result<(), SetupError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(SetupError::InvalidState {
                reason: format!("action '{name}' added twice"),
            });
        }
        for task in action.tasks() {
            if !self.tasks.contains(&task) {
                return Err(SetupError::UnknownTask { task, action: name });
            }
        }
        let entry = Entry {
            tasks: action.tasks(),
            before: action.before(),
            after: action.after(),
            action,
        };
        self.actions.insert(name, entry);
        Ok(())
    }

    /// Compute the execution order without running anything.
    pub fn plan(&self) -> Result<Plan, SetupError> {
        let mut steps = Vec::new();
        for task in self.tasks.order()? {
            let members: Vec<&str> = self
                .actions
                .iter()
                .filter(|(_, e)| e.tasks.iter().any(|t| *t == task))
                .map(|(n, _)| n.as_str())
                .collect();
            let mut graph = DependencyGraph::new();
            for m in &members {
                graph.add_node(m.to_string());
            }
            for m in &members {
                let entry = &self.actions[*m];
                for b in entry.before.iter().filter(|b| members.contains(&b.as_str())) {
                    graph.add_edge(m.to_string(), b.clone());
                }
                for a in entry.after.iter().filter(|a| members.contains(&a.as_str())) {
                    graph.add_edge(a.clone(), m.to_string());
                }
            }
            let actions = graph.sort().map_err(|e| SetupError::CyclicDependency {
                context: format!("task '{task}'"),
                members: e.members,
            })?;
            steps.push(PlanStep { task, actions });
        }
        Ok(Plan { steps })
    }

    /// Run every action against `target`, consuming the pipeline.
    ///
    /// Stops at the first failing action. Returns the plan that was run.
    pub fn run(mut self, target: &mut T) -> Result<Plan, SetupError> {
        let plan = self.plan()?;
        for step in plan.steps() {
            log::debug!("setup task '{}' ({} actions)", step.task, step.actions.len());
            for name in &step.actions {
                let entry = self
                    .actions
                    .get_mut(name)
                    .ok_or_else(|| SetupError::InvalidState {
                        reason: format!("planned action '{name}' is missing"),
                    })?;
                log::debug!("  action '{name}'");
                entry.action.mutate(&step.task, target)?;
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Recorder {
        name: String,
        tasks: Vec<String>,
        before: Vec<String>,
        after: Vec<String>,
    }

    impl Recorder {
        fn new(name: &str, tasks: &[&str]) -> Self {
            Self {
                name: name.into(),
                tasks: tasks.iter().map(|t| t.to_string()).collect(),
                before: Vec::new(),
                after: Vec::new(),
            }
        }

        fn before(mut self, other: &str) -> Self {
            self.before.push(other.into());
            self
        }

        fn after(mut self, other: &str) -> Self {
            self.after.push(other.into());
            self
        }
    }

    impl Action<Vec<String>> for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn tasks(&self) -> Vec<String> {
            self.tasks.clone()
        }
        fn before(&self) -> Vec<String> {
            self.before.clone()
        }
        fn after(&self) -> Vec<String> {
            self.after.clone()
        }
        fn mutate(&mut self, task: &str, log: &mut Vec<String>) -> Result<(), SetupError> {
            log.push(format!("{task}:{}", self.name));
            Ok(())
        }
    }

    fn pipeline(actions: Vec<Recorder>) -> ActionPipeline<Vec<String>> {
        let mut p = ActionPipeline::new(TaskGraph::sequence(&["setup", "finish"]));
        for a in actions {
            p.add(Box::new(a)).unwrap();
        }
        p
    }

    #[test]
    fn runs_tasks_in_order_and_actions_once_per_task() {
        let p = pipeline(vec![
            Recorder::new("late", &["finish"]),
            Recorder::new("both", &["setup", "finish"]),
            Recorder::new("early", &["setup"]),
        ]);
        let mut log = Vec::new();
        let plan = p.run(&mut log).unwrap();
        assert_eq!(
            log,
            vec!["setup:both", "setup:early", "finish:late", "finish:both"]
        );
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn hints_reorder_within_task() {
        let p = pipeline(vec![
            Recorder::new("a", &["setup"]).after("c"),
            Recorder::new("b", &["setup"]),
            Recorder::new("c", &["setup"]).before("b"),
        ]);
        let plan = p.plan().unwrap();
        assert_eq!(plan.steps()[0].actions, vec!["c", "a", "b"]);
    }

    #[test]
    fn hints_outside_task_ignored() {
        let p = pipeline(vec![
            Recorder::new("a", &["setup"]).after("z"),
            Recorder::new("z", &["finish"]).before("a"),
        ]);
        let calls: Vec<_> = p
            .plan()
            .unwrap()
            .calls()
            .map(|(t, a)| format!("{t}:{a}"))
            .collect();
        assert_eq!(calls, vec!["setup:a", "finish:z"]);
    }

    #[test]
    fn action_cycle_names_members() {
        let p = pipeline(vec![
            Recorder::new("x", &["setup"]).before("y"),
            Recorder::new("y", &["setup"]).before("x"),
            Recorder::new("free", &["setup"]),
        ]);
        match p.plan() {
            Err(SetupError::CyclicDependency { context, members }) => {
                assert_eq!(context, "task 'setup'");
                assert_eq!(members, vec!["x", "y"]);
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn unknown_task_rejected_on_add() {
        let mut p = ActionPipeline::<Vec<String>>::new(TaskGraph::sequence(&["setup"]));
        match p.add(Box::new(Recorder::new("a", &["teardown"]))) {
            Err(SetupError::UnknownTask { task, action }) => {
                assert_eq!(task, "teardown");
                assert_eq!(action, "a");
            }
            other => panic!("expected UnknownTask, got {other:?}"),
        }
        assert!(p.add(Box::new(Recorder::new("b", &["setup"]))).is_ok());
        assert!(p.add(Box::new(Recorder::new("b", &["setup"]))).is_err());
    }

    #[test]
    fn failing_action_stops_the_run() {
        struct Fail;
        impl Action<Vec<String>> for Fail {
            fn name(&self) -> &str {
                "fail"
            }
            fn tasks(&self) -> Vec<String> {
                vec!["setup".into()]
            }
            fn mutate(&mut self, _: &str, _: &mut Vec<String>) -> Result<(), SetupError> {
                Err(SetupError::Config {
                    reason: "boom".into(),
                })
            }
        }
        let mut p = pipeline(vec![Recorder::new("late", &["finish"])]);
        p.add(Box::new(Fail)).unwrap();
        let mut log = Vec::new();
        assert!(p.run(&mut log).is_err());
        assert!(log.is_empty());
    }

    fn hinted(perm: &[usize], edges: &[(usize, usize)]) -> (Vec<Recorder>, Vec<(usize, usize)>) {
        let rank = |n: usize| perm.iter().position(|&p| p == n).unwrap_or(0);
        let mut actions: Vec<Recorder> = (0..perm.len())
            .map(|i| Recorder::new(&format!("a{i}"), &["setup"]))
            .collect();
        let mut hints = Vec::new();
        for &(x, y) in edges {
            if rank(x) < rank(y) {
                actions[x].before.push(format!("a{y}"));
                hints.push((x, y));
            }
        }
        (actions, hints)
    }

    proptest! {
        // Hints that only point forward in a random permutation always form
        // a DAG. The plan must respect every hint and be reproducible.
        #[test]
        fn plan_respects_hints_and_is_deterministic(
            perm in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
            edges in prop::collection::vec((0..8usize, 0..8usize), 0..20),
        ) {
            let (actions, hints) = hinted(&perm, &edges);
            let first = pipeline(actions).plan().unwrap();
            let order = &first.steps()[0].actions;
            prop_assert_eq!(order.len(), 8);
            for (x, y) in hints {
                let px = order.iter().position(|n| *n == format!("a{x}")).unwrap();
                let py = order.iter().position(|n| *n == format!("a{y}")).unwrap();
                prop_assert!(px < py);
            }
            let (again, _) = hinted(&perm, &edges);
            prop_assert_eq!(pipeline(again).plan().unwrap(), first);
        }

        #[test]
        fn unhinted_actions_keep_declaration_order(n in 1..12usize) {
            let names: Vec<String> = (0..n).rev().map(|i| format!("a{i}")).collect();
            let actions = names.iter().map(|a| Recorder::new(a, &["setup"])).collect();
            let plan = pipeline(actions).plan().unwrap();
            prop_assert_eq!(&plan.steps()[0].actions, &names);
        }
    }
}
