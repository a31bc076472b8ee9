//! The task graph and its execution order.
//!
//! Nodes are task names and edges point from a dependency to its dependent.
//! The execution order is a topological sort which, among tasks whose
//! dependencies are all satisfied, always picks the lexicographically
//! smallest name first. The same set of definitions therefore yields the
//! same order no matter in which order the tasks were registered.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{CyclicDependencyError, PipelineConfigError, PipelineError};
use crate::task::Task;

pub struct TaskGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    tasks: HashMap<String, Arc<dyn Task>>,
    order: Vec<String>,
}

impl TaskGraph {
    /// Builds the graph and computes the execution order.
    ///
    /// A dependency on a name that no registered task carries still becomes
    /// a node; running the pipeline fails once the order reaches it.
    pub fn build(tasks: &[Arc<dyn Task>]) -> Result<Self, PipelineError> {
        tracing::debug!("building task graph");

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        let mut registered = HashMap::new();

        for task in tasks {
            let name = task.name().to_string();
            if registered.insert(name.clone(), task.clone()).is_some() {
                return Err(PipelineConfigError::DuplicateTask(name).into());
            }
            node(&mut graph, &mut indices, &name);
        }

        for task in tasks {
            let target = indices[task.name()];
            for dependency in &task.definition().depends_on {
                let source = node(&mut graph, &mut indices, dependency);
                graph.update_edge(source, target, ());
            }
        }

        // Only used to find the cycle; the order itself needs the tie-break.
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            let task = graph[cycle.node_id()].clone();
            return Err(CyclicDependencyError { task }.into());
        }

        tracing::debug!("computing execution order");
        let order = lexicographic_toposort(&graph);

        Ok(Self {
            graph,
            indices,
            tasks: registered,
            order,
        })
    }

    /// The deterministic execution order.
    pub fn execution_order(&self) -> &[String] {
        &self.order
    }

    /// The underlying graph, for rendering by external tools.
    pub fn graph(&self) -> &DiGraph<String, ()> {
        &self.graph
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub(crate) fn task(&self, name: &str) -> Option<&Arc<dyn Task>> {
        self.tasks.get(name)
    }

    /// Registered tasks, in execution order.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Names of the tasks `name` depends on, sorted.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Names of the tasks that depend on `name`, sorted.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.indices.get(from), self.indices.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// All edges as `(dependency, dependent)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.raw_edges().iter().map(|edge| {
            (
                self.graph[edge.source()].as_str(),
                self.graph[edge.target()].as_str(),
            )
        })
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.indices.get(name) else {
            return Vec::new();
        };

        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|i| self.graph[i].as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Renders the graph as a Mermaid flowchart.
impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;

        for name in &self.order {
            let index = self.indices[name.as_str()].index();
            let label = name.replace('"', "\\\"");
            // bare dependency nodes get a different shape
            if self.tasks.contains_key(name) {
                writeln!(f, "    {index}[\"{label}\"]")?;
            } else {
                writeln!(f, "    {index}[/\"{label}\"/]")?;
            }
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

fn node(
    graph: &mut DiGraph<String, ()>,
    indices: &mut HashMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    *indices
        .entry(name.to_string())
        .or_insert_with(|| graph.add_node(name.to_string()))
}

/// Kahn's algorithm with a min-heap of ready names. Assumes the graph is
/// acyclic.
fn lexicographic_toposort(graph: &DiGraph<String, ()>) -> Vec<String> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|i| (i, graph.neighbors_directed(i, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&i, _)| Reverse((graph[i].as_str(), i)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(Reverse((name, index))) = ready.pop() {
        order.push(name.to_string());

        for next in graph.neighbors_directed(index, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((graph[next].as_str(), next)));
                }
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::TaskOutput;
    use crate::task::{TaskArgs, TaskDefinition};

    struct Stub(TaskDefinition);

    impl Task for Stub {
        fn definition(&self) -> &TaskDefinition {
            &self.0
        }

        fn invoke(&self, _: &TaskArgs) -> anyhow::Result<TaskOutput> {
            Ok(TaskOutput::Raw(serde_json::json!({})))
        }
    }

    fn stub(name: &str, depends_on: &[&str]) -> Arc<dyn Task> {
        let mut def = TaskDefinition::new(name);
        def.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
        Arc::new(Stub(def))
    }

    #[test]
    fn test_pipeline_creation() {
        let graph = TaskGraph::build(&[
            stub("foo", &[]),
            stub("bar", &[]),
            stub("baz", &["foo", "bar"]),
        ])
        .unwrap();

        assert!(graph.has_edge("foo", "baz"));
        assert!(graph.has_edge("bar", "baz"));
        assert!(!graph.has_edge("foo", "bar"));
        assert_eq!(graph.dependencies("baz"), vec!["bar", "foo"]);
        assert_eq!(graph.dependents("foo"), vec!["baz"]);
        assert_eq!(graph.edges().count(), 2);
    }

    #[test]
    fn test_pipeline_with_cycles() {
        let result = TaskGraph::build(&[
            stub("foo", &["baz"]),
            stub("bar", &["foo"]),
            stub("baz", &["bar"]),
        ]);

        match result {
            Err(PipelineError::Cycle(CyclicDependencyError { task })) => {
                assert!(["foo", "bar", "baz"].contains(&task.as_str()));
            }
            _ => panic!("expected a cycle error"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        assert!(matches!(
            TaskGraph::build(&[stub("foo", &["foo"])]),
            Err(PipelineError::Cycle(_))
        ));
    }

    #[test]
    fn test_deterministic_order() {
        let a = TaskGraph::build(&[
            stub("d", &["b"]),
            stub("c", &[]),
            stub("b", &[]),
            stub("a", &["c"]),
            stub("e", &["a", "d"]),
        ])
        .unwrap();
        let b = TaskGraph::build(&[
            stub("a", &["c"]),
            stub("b", &[]),
            stub("e", &["a", "d"]),
            stub("c", &[]),
            stub("d", &["b"]),
        ])
        .unwrap();

        // "a" waits for "c", so "b" and "c" come first
        assert_eq!(a.execution_order(), ["b", "c", "a", "d", "e"]);
        assert_eq!(a.execution_order(), b.execution_order());
    }

    #[test]
    fn test_duplicate_names() {
        assert!(matches!(
            TaskGraph::build(&[stub("foo", &[]), stub("foo", &[])]),
            Err(PipelineError::Config(PipelineConfigError::DuplicateTask(name))) if name == "foo"
        ));
    }

    #[test]
    fn test_unknown_dependency_becomes_a_bare_node() {
        let graph = TaskGraph::build(&[stub("foo", &["ghost"])]).unwrap();

        assert_eq!(graph.execution_order(), ["ghost", "foo"]);
        assert!(graph.contains("ghost"));
        assert!(graph.task("ghost").is_none());
        assert_eq!(graph.tasks().count(), 1);
    }

    #[test]
    fn test_mermaid_export() {
        let graph = TaskGraph::build(&[stub("foo", &["ghost"])]).unwrap();

        assert_eq!(
            graph.to_string(),
            "graph LR\n    1[/\"ghost\"/]\n    0[\"foo\"]\n    1 --> 0\n"
        );
    }
}
