//! The execution engine.
//!
//! A [`Pipeline`] walks the execution order of its [`TaskGraph`] one task at
//! a time. For every task it decides between skipping it, reusing the
//! previous result, or invoking the body, and persists the outcome before
//! moving on, so a crash loses at most the task that was running.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::binder::{self, BindError};
use crate::config::Config;
use crate::error::{PipelineConfigError, PipelineError, StoreError};
use crate::graph::TaskGraph;
use crate::report::{Outcome, PROGRESS_STYLE, TaskOutcome, TaskStatusLine};
use crate::result::{PipelineResult, TaskResult, TaskStatus};
use crate::store::ResultStore;
use crate::task::Task;

/// Callback invoked with the outcome of every processed task.
pub type OutcomeObserver = Box<dyn Fn(&TaskOutcome) + Send + Sync>;

/// Per-run knobs of [`Pipeline::run_pipeline`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this task has been processed.
    pub up_to: Option<String>,
    /// Execute these tasks even if their previous result could be reused.
    pub force_rerun: HashSet<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn up_to(mut self, task: impl Into<String>) -> Self {
        self.up_to = Some(task.into());
        self
    }

    pub fn force_rerun<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_rerun.extend(tasks.into_iter().map(Into::into));
        self
    }
}

/// A validated set of tasks bound to a result store, ready to run.
pub struct Pipeline {
    name: String,
    graph: TaskGraph,
    store: ResultStore,
    config: Config,
    observers: Vec<OutcomeObserver>,
    executed: HashSet<String>,
    reused: HashSet<String>,
    outcomes: Vec<TaskOutcome>,
}

impl Pipeline {
    pub(crate) fn new(
        name: String,
        graph: TaskGraph,
        config: Config,
        observers: Vec<OutcomeObserver>,
    ) -> Self {
        let store = ResultStore::new(config.store_path(&name));

        Self {
            name,
            graph,
            store,
            config,
            observers,
            executed: HashSet::new(),
            reused: HashSet::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn execution_order(&self) -> &[String] {
        self.graph.execution_order()
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tasks whose body ran successfully during the last run.
    pub fn tasks_executed(&self) -> &HashSet<String> {
        &self.executed
    }

    /// Tasks whose previous result was carried over during the last run.
    pub fn tasks_reused(&self) -> &HashSet<String> {
        &self.reused
    }

    /// Outcomes of the last run, in processing order.
    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Runs the whole pipeline with default options.
    pub fn run(&mut self) -> Result<PipelineResult, PipelineError> {
        self.run_pipeline(&RunOptions::default())
    }

    /// Runs the pipeline and returns the merged snapshot: the previous one
    /// with every task processed in this run overwritten.
    ///
    /// Failing tasks don't make this return an error; they are recorded
    /// with status FAILURE and their dependents are skipped. Errors are
    /// reserved for problems with the pipeline itself and the store.
    pub fn run_pipeline(&mut self, options: &RunOptions) -> Result<PipelineResult, PipelineError> {
        self.executed.clear();
        self.reused.clear();
        self.outcomes.clear();

        let up_to = match &options.up_to {
            Some(task) if !self.graph.contains(task) => {
                tracing::warn!("up_to names unknown task '{}', running everything", task);
                None
            }
            up_to => up_to.as_deref(),
        };

        for task in &options.force_rerun {
            if !self.graph.contains(task) {
                tracing::warn!("ignoring forced rerun of unknown task '{}'", task);
            }
        }

        let previous = self.store.load()?;
        let mut snapshot = previous.clone();
        // Tasks that failed or were skipped during this run.
        let mut blocked = HashSet::new();

        let order = self.graph.execution_order().to_vec();

        let root_span = tracing::span!(Level::INFO, "pipeline", name = %self.name);
        root_span.pb_set_length(order.len() as u64);
        root_span.pb_set_style(&PROGRESS_STYLE);
        root_span.pb_set_message("Running tasks...");
        let _enter = root_span.enter();

        for name in &order {
            let task = self
                .graph
                .task(name)
                .cloned()
                .ok_or_else(|| PipelineConfigError::MissingTask(name.clone()))?;

            let span = tracing::span!(Level::INFO, "task", name = %name);
            span.pb_set_message(&format!("Running {name}"));
            let _enter = span.enter();

            let outcome = self.process(task.as_ref(), &previous, &mut snapshot, &blocked, options)?;

            match &outcome {
                Outcome::Executed => {
                    self.executed.insert(name.clone());
                }
                Outcome::Reused => {
                    self.reused.insert(name.clone());
                }
                Outcome::Failed(_) | Outcome::Skipped => {
                    blocked.insert(name.clone());
                }
            }

            self.record(TaskOutcome::new(name.as_str(), outcome));
            root_span.pb_inc(1);

            if up_to == Some(name.as_str()) {
                tracing::debug!("stopping after {}", name);
                break;
            }
        }

        tracing::info!(
            "Run of {} complete: {} executed, {} reused",
            self.name,
            self.executed.len(),
            self.reused.len()
        );

        Ok(snapshot)
    }

    fn process(
        &self,
        task: &dyn Task,
        previous: &PipelineResult,
        snapshot: &mut PipelineResult,
        blocked: &HashSet<String>,
        options: &RunOptions,
    ) -> Result<Outcome, PipelineError> {
        let name = task.name();
        let definition = task.definition();
        tracing::debug!("starting {}", name);

        if let Some(dependency) = definition.depends_on.iter().find(|d| blocked.contains(*d)) {
            tracing::warn!("skipping {}, dependency {} did not succeed", name, dependency);
            return Ok(Outcome::Skipped);
        }

        let mut inputs = PipelineResult::new();
        for dependency in &definition.depends_on {
            let result = snapshot
                .result(dependency)
                .cloned()
                .ok_or_else(|| PipelineConfigError::MissingTask(dependency.clone()))?;
            inputs.task_results.insert(dependency.clone(), result);
        }

        let reusable = definition.is_memoizable()
            && !options.force_rerun.contains(name)
            && previous.status(name) == Some(TaskStatus::Success)
            && previous.task_inputs.get(name) == Some(&inputs);

        let (result, outcome) = if let Some(result) = previous.result(name).filter(|_| reusable) {
            tracing::debug!("reusing previous result of {}", name);
            (result.clone(), Outcome::Reused)
        } else {
            tracing::debug!("executing {}", name);
            let result = attempt(task, &inputs)?;
            let outcome = match &result.error {
                None => Outcome::Executed,
                Some(error) => Outcome::Failed(error.clone()),
            };
            (result, outcome)
        };

        snapshot.task_results.insert(name.to_string(), result);
        snapshot.task_inputs.insert(name.to_string(), inputs);
        self.store.save_task(name, snapshot)?;

        Ok(outcome)
    }

    fn record(&mut self, outcome: TaskOutcome) {
        match &outcome.outcome {
            Outcome::Failed(error) => tracing::error!("{} failed: {}", outcome.task, error),
            _ => tracing::info!("{}", outcome),
        }

        for observer in &self.observers {
            observer(&outcome);
        }

        self.outcomes.push(outcome);
    }

    /// The snapshot persisted by previous runs.
    pub fn load_previous(&self) -> Result<PipelineResult, StoreError> {
        self.store.load()
    }

    /// Drops the cached result of one task, so it executes on the next run.
    pub fn remove_task_cache(&self, task: &str) -> Result<bool, StoreError> {
        let removed = self.store.remove_task(task)?;
        if removed {
            tracing::info!("removed cached result of {}", task);
        }
        Ok(removed)
    }

    /// Drops the cached results of every task in this pipeline.
    pub fn clear_cache(&self) -> Result<(), StoreError> {
        tracing::info!("clearing store {}", self.store.root());
        self.store.clear()
    }

    /// Every registered task in execution order, with its persisted status.
    pub fn task_statuses(&self) -> Result<Vec<TaskStatusLine>, StoreError> {
        let previous = self.store.load()?;

        Ok(self
            .graph
            .tasks()
            .map(|task| TaskStatusLine {
                task: task.name().to_string(),
                status: previous.status(task.name()),
            })
            .collect())
    }
}

/// Binds and invokes one task. Anything the task body does wrong, including
/// panicking, ends up as a FAILURE result; only a parameter that can't be
/// looked up is an error of the pipeline itself.
fn attempt(task: &dyn Task, inputs: &PipelineResult) -> Result<TaskResult, PipelineConfigError> {
    let name = task.name();

    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
        binder::bind(task.definition(), inputs).map(|args| task.invoke(&args))
    }));

    let output = match caught {
        Ok(Ok(output)) => output,
        Ok(Err(BindError::Lookup { param, source })) => {
            return Err(PipelineConfigError::ParameterLookup {
                task: name.to_string(),
                param,
                source,
            });
        }
        Ok(Err(BindError::Selector { param, source })) => {
            Err(source.context(format!("Selector for parameter '{param}' failed")))
        }
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("Task panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("Task panicked: {s}")
            } else {
                String::from("Task panicked with unknown payload")
            };

            Err(anyhow::anyhow!(msg))
        }
    };

    let result = output.and_then(|output| output.into_result(name).map_err(anyhow::Error::from));

    Ok(match result {
        Ok(mut result) => {
            result.status = Some(TaskStatus::Success);
            result.error = None;
            result
        }
        Err(err) => TaskResult::failure(format!("{err:#}")),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use camino::Utf8PathBuf;
    use serde_json::json;

    use super::*;
    use crate::artifact::Artifact;
    use crate::blueprint::Blueprint;
    use crate::error::LookupError;
    use crate::value::Value;

    fn config(dir: &tempfile::TempDir) -> Config {
        Config::default().with_store_root(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap())
    }

    fn names(set: &HashSet<String>) -> Vec<&str> {
        let mut names: Vec<&str> = set.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// foo and bar produce values, baz adds them up.
    fn sum_pipeline(dir: &tempfile::TempDir) -> Pipeline {
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(json!({"values": {"x": 1}}).into()))
            .unwrap();

        bp.task("bar")
            .run(|_| Ok(TaskResult::new().with_value("y", 2).into()))
            .unwrap();

        bp.task("baz")
            .depends_on(["foo", "bar"])
            .value("x", "foo", "x")
            .value("y", "bar", "y")
            .run(|args| {
                let x: i64 = args.value("x")?;
                let y: i64 = args.value("y")?;
                Ok(TaskResult::new().with_value("sum", x + y).into())
            })
            .unwrap();

        bp.finish("sum", config(dir)).unwrap()
    }

    #[test]
    fn test_run_with_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))
            .unwrap();
        bp.task("bar")
            .run(|_| Ok(TaskResult::new().with_value("y", 2).into()))
            .unwrap();
        bp.task("baz")
            .depends_on(["foo", "bar"])
            .results("previous_results")
            .run(|args| {
                let results = args.results("previous_results")?;
                let x: i64 = results.value("foo", "x")?.get()?;
                let y: i64 = results.value("bar", "y")?.get()?;
                Ok(TaskResult::new().with_value("sum", x + y).into())
            })
            .unwrap();

        let mut pipeline = bp.finish("default", config(&dir)).unwrap();
        let result = pipeline.run().unwrap();

        assert_eq!(result.value("baz", "sum").unwrap(), &Value::scalar(3));
        assert_eq!(result.status("baz"), Some(TaskStatus::Success));
    }

    #[test]
    fn test_idempotent_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = sum_pipeline(&dir);

        let first = pipeline.run().unwrap();
        assert_eq!(first.value("baz", "sum").unwrap(), &Value::scalar(3));
        assert_eq!(names(pipeline.tasks_executed()), ["bar", "baz", "foo"]);
        assert!(pipeline.tasks_reused().is_empty());

        let stored = fs::read_to_string(pipeline.store().root().join("baz/result.json")).unwrap();

        let second = pipeline.run().unwrap();
        assert_eq!(second, first);
        assert!(pipeline.tasks_executed().is_empty());
        assert_eq!(names(pipeline.tasks_reused()), ["bar", "baz", "foo"]);

        let restored = fs::read_to_string(pipeline.store().root().join("baz/result.json")).unwrap();
        assert_eq!(stored, restored);
    }

    #[test]
    fn test_non_scalar_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", Value::list([1, 2, 3])).into()))
            .unwrap();
        bp.task("bar")
            .run(|_| Ok(TaskResult::new().with_value("y", vec![4, 5, 6]).into()))
            .unwrap();
        bp.task("baz")
            .depends_on(["foo", "bar"])
            .value("x", "foo", "x")
            .value("y", "bar", "y")
            .run(|args| {
                let mut x: Vec<i64> = args.value("x")?;
                x.extend(args.value::<Vec<i64>>("y")?);
                Ok(TaskResult::new().with_value("result", x).into())
            })
            .unwrap();

        let result = bp.finish("lists", config(&dir)).unwrap().run().unwrap();
        assert_eq!(
            result.value("baz", "result").unwrap(),
            &Value::list([1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn test_selectors_are_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", Value::list([1, 2, 3])).into()))
            .unwrap();
        bp.task("bar")
            .run(|_| Ok(TaskResult::new().with_value("y", vec![4, 5, 6]).into()))
            .unwrap();
        bp.task("baz")
            .depends_on(["foo", "bar"])
            .select("x", |res| {
                let x: Vec<i64> = res.value("foo", "x")?.get()?;
                Ok(x.iter().sum::<i64>().into())
            })
            .select("y", |res| {
                let y: Vec<i64> = res.value("bar", "y")?.get()?;
                Ok(y.iter().sum::<i64>().into())
            })
            .run(|args| {
                let sum = args.selected::<i64>("x")? + args.selected::<i64>("y")?;
                Ok(TaskResult::new().with_value("result", sum).into())
            })
            .unwrap();

        let mut pipeline = bp.finish("selectors", config(&dir)).unwrap();

        let result = pipeline.run().unwrap();
        assert_eq!(result.value("baz", "result").unwrap(), &Value::scalar(21));

        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["baz"]);
        assert_eq!(names(pipeline.tasks_reused()), ["bar", "foo"]);
    }

    #[test]
    fn test_artifact_change_busts_cache() {
        let dir = tempfile::tempdir().unwrap();
        let data = Utf8PathBuf::try_from(dir.path().join("foo.dat")).unwrap();
        let content = Arc::new(Mutex::new(String::from("foo")));

        let mut bp = Blueprint::new();

        let (path, text) = (data.clone(), content.clone());
        bp.task("foo")
            .impure()
            .run(move |_| {
                fs::write(&path, text.lock().unwrap().as_str())?;
                Ok(TaskResult::new()
                    .with_artifact("foo_file", Artifact::file(path.clone()))
                    .into())
            })
            .unwrap();

        bp.task("baz")
            .depends_on(["foo"])
            .artifact("foo_file", "foo", "foo_file")
            .run(|args| {
                let data = fs::read_to_string(args.artifact("foo_file")?.location())?;
                Ok(TaskResult::new().with_value("len", data.len() as u64).into())
            })
            .unwrap();

        let mut pipeline = bp.finish("artifacts", config(&dir)).unwrap();

        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["baz", "foo"]);

        // same content, same hash
        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["foo"]);
        assert_eq!(names(pipeline.tasks_reused()), ["baz"]);

        *content.lock().unwrap() = String::from("foobar");
        let result = pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["baz", "foo"]);
        assert_eq!(result.value("baz", "len").unwrap(), &Value::scalar(6u64));
    }

    #[test]
    fn test_float_inputs_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .impure()
            .run(|_| Ok(TaskResult::new().with_value("x", 0.9185034657608381).into()))
            .unwrap();
        bp.task("baz")
            .depends_on(["foo"])
            .value("x", "foo", "x")
            .run(|args| {
                let x: f64 = args.value("x")?;
                Ok(TaskResult::new().with_value("y", x * 2.0).into())
            })
            .unwrap();

        let mut pipeline = bp.finish("floats", config(&dir)).unwrap();

        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["baz", "foo"]);

        // the stored inputs must read back bit for bit
        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["foo"]);
        assert_eq!(names(pipeline.tasks_reused()), ["baz"]);
    }

    #[test]
    fn test_failure_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))
            .unwrap();
        bp.task("bar")
            .run(|_| Err(anyhow::anyhow!("oh noes")))
            .unwrap();
        bp.task("baz")
            .depends_on(["foo", "bar"])
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();
        bp.task("qux")
            .depends_on(["baz"])
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let mut pipeline = bp.finish("failures", config(&dir)).unwrap();
        let result = pipeline.run().unwrap();

        assert_eq!(result.status("foo"), Some(TaskStatus::Success));
        assert_eq!(result.status("bar"), Some(TaskStatus::Failure));
        assert_eq!(result.result("bar").unwrap().error.as_deref(), Some("oh noes"));
        assert!(result.result("baz").is_none());
        assert!(result.result("qux").is_none());

        assert_eq!(
            pipeline.outcomes(),
            [
                TaskOutcome::new("bar", Outcome::Failed("oh noes".into())),
                TaskOutcome::new("foo", Outcome::Executed),
                TaskOutcome::new("baz", Outcome::Skipped),
                TaskOutcome::new("qux", Outcome::Skipped),
            ]
        );
        assert_eq!(names(pipeline.tasks_executed()), ["foo"]);

        // failures are persisted but never reused
        assert_eq!(
            pipeline.load_previous().unwrap().status("bar"),
            Some(TaskStatus::Failure)
        );
        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_reused()), ["foo"]);
        assert!(pipeline.outcomes()[0].is_failure());
    }

    #[test]
    fn test_panic_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo").run(|_| panic!("kaboom")).unwrap();
        bp.task("bar")
            .depends_on(["foo"])
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let mut pipeline = bp.finish("panics", config(&dir)).unwrap();
        let result = pipeline.run().unwrap();

        assert_eq!(
            result.result("foo").unwrap().error.as_deref(),
            Some("Task panicked: kaboom")
        );
        assert_eq!(pipeline.outcomes()[1], TaskOutcome::new("bar", Outcome::Skipped));
    }

    #[test]
    fn test_selector_error_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();
        bp.task("bar")
            .depends_on(["foo"])
            .select("x", |res| Ok(res.value("foo", "x")?.as_json().clone()))
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let result = bp.finish("selector", config(&dir)).unwrap().run().unwrap();

        assert_eq!(result.status("bar"), Some(TaskStatus::Failure));
        let error = result.result("bar").unwrap().error.clone().unwrap();
        assert!(error.starts_with("Selector for parameter 'x' failed"));
    }

    #[test]
    fn test_invalid_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo").run(|_| Ok(json!([1]).into())).unwrap();

        let result = bp.finish("invalid", config(&dir)).unwrap().run().unwrap();

        assert_eq!(
            result.result("foo").unwrap().error.as_deref(),
            Some(
                "Task foo returned invalid result of type list, \
                 expected either a mapping or a TaskResult"
            )
        );
    }

    #[test]
    fn test_forced_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = sum_pipeline(&dir);

        pipeline.run().unwrap();
        pipeline
            .run_pipeline(&RunOptions::new().force_rerun(["foo", "ghost"]))
            .unwrap();

        assert_eq!(names(pipeline.tasks_executed()), ["foo"]);
        assert_eq!(names(pipeline.tasks_reused()), ["bar", "baz"]);
    }

    #[test]
    fn test_up_to() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = sum_pipeline(&dir);

        let result = pipeline
            .run_pipeline(&RunOptions::new().up_to("foo"))
            .unwrap();

        assert_eq!(pipeline.execution_order(), ["bar", "foo", "baz"]);
        assert_eq!(names(pipeline.tasks_executed()), ["bar", "foo"]);
        assert!(result.result("baz").is_none());
        assert_eq!(pipeline.outcomes().len(), 2);

        pipeline
            .run_pipeline(&RunOptions::new().up_to("nope"))
            .unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["baz"]);
    }

    #[test]
    fn test_missing_dependency_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .depends_on(["ghost"])
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let mut pipeline = bp.finish("missing", config(&dir)).unwrap();
        match pipeline.run() {
            Err(PipelineError::Config(PipelineConfigError::MissingTask(name))) => {
                assert_eq!(name, "ghost")
            }
            other => panic!("expected a missing task, got {other:?}"),
        }
    }

    #[test]
    fn test_parameter_lookup_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))
            .unwrap();
        bp.task("bar")
            .depends_on(["foo"])
            .value("z", "foo", "z")
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let mut pipeline = bp.finish("lookup", config(&dir)).unwrap();
        match pipeline.run() {
            Err(PipelineError::Config(PipelineConfigError::ParameterLookup {
                task,
                param,
                source,
            })) => {
                assert_eq!(task, "bar");
                assert_eq!(param, "z");
                assert_eq!(
                    source,
                    LookupError::MissingValue {
                        task: "foo".into(),
                        field: "z".into()
                    }
                );
            }
            other => panic!("expected a lookup error, got {other:?}"),
        }

        // foo was persisted before the run aborted
        assert!(pipeline.load_previous().unwrap().result("foo").is_some());
    }

    #[test]
    fn test_persisted_after_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = config(&dir).store_path("eager");
        let mut bp = Blueprint::new();

        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))
            .unwrap();
        bp.task("bar")
            .depends_on(["foo"])
            .run(move |_| {
                let seen = store.join("foo").join("result.json").is_file();
                Ok(TaskResult::new().with_value("seen", seen).into())
            })
            .unwrap();

        let result = bp.finish("eager", config(&dir)).unwrap().run().unwrap();
        assert_eq!(result.value("bar", "seen").unwrap(), &Value::scalar(true));
    }

    #[test]
    fn test_observers_and_cache_maintenance() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut bp = Blueprint::new();
        bp.task("foo")
            .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))
            .unwrap();
        bp.task("bar")
            .depends_on(["foo"])
            .value("x", "foo", "x")
            .run(|_| Ok(TaskResult::new().into()))
            .unwrap();

        let sink = seen.clone();
        bp.on_outcome(move |outcome| sink.lock().unwrap().push(outcome.task.clone()));

        let mut pipeline = bp.finish("maintenance", config(&dir)).unwrap();

        let statuses = pipeline.task_statuses().unwrap();
        assert!(statuses.iter().all(|line| line.status.is_none()));

        pipeline.run().unwrap();
        assert_eq!(*seen.lock().unwrap(), ["foo", "bar"]);

        let statuses = pipeline.task_statuses().unwrap();
        assert_eq!(statuses[0].task, "foo");
        assert_eq!(statuses[0].status, Some(TaskStatus::Success));

        assert!(pipeline.remove_task_cache("foo").unwrap());
        pipeline.run().unwrap();
        assert_eq!(names(pipeline.tasks_executed()), ["foo"]);
        assert_eq!(names(pipeline.tasks_reused()), ["bar"]);

        pipeline.clear_cache().unwrap();
        assert!(pipeline.load_previous().unwrap().is_empty());
    }
}
