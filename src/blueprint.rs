use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{InvalidTaskDefinitionError, PipelineError};
use crate::executor::{OutcomeObserver, Pipeline};
use crate::graph::TaskGraph;
use crate::report::TaskOutcome;
use crate::result::{PipelineResult, TaskOutput};
use crate::task::{
    FieldReference, FnTask, ParameterSpec, Task, TaskArgs, TaskDefinition, validate_name,
};

/// The blueprint for your pipeline.
///
/// `Blueprint` collects the tasks of a pipeline. Tasks are added with the
/// [`Blueprint::task`] builder, or as hand-written [`Task`] implementations
/// with [`Blueprint::add`], and refer to each other by name.
///
/// Once configured, you convert this into a [`Pipeline`] to run it.
///
/// # Example
///
/// ```rust,no_run
/// use tsumiki::{Blueprint, Config, TaskResult};
///
/// let mut bp = Blueprint::new();
///
/// bp.task("foo")
///     .run(|_| Ok(TaskResult::new().with_value("x", 1).into()))?;
///
/// bp.task("bar")
///     .depends_on(["foo"])
///     .value("x", "foo", "x")
///     .run(|args| {
///         let x: i64 = args.value("x")?;
///         Ok(TaskResult::new().with_value("double", 2 * x).into())
///     })?;
///
/// let mut pipeline = bp.finish("example", Config::default())?;
/// let result = pipeline.run()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Default)]
pub struct Blueprint {
    tasks: Vec<Arc<dyn Task>>,
    observers: Vec<OutcomeObserver>,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts defining a task backed by a closure.
    pub fn task(&mut self, name: impl Into<String>) -> TaskBuilder<'_> {
        TaskBuilder {
            blueprint: self,
            definition: TaskDefinition::new(name),
        }
    }

    /// Adds a hand-written task.
    pub fn add<T>(&mut self, task: T) -> Result<TaskHandle, InvalidTaskDefinitionError>
    where
        T: Task + 'static,
    {
        self.push(Arc::new(task))
    }

    fn push(&mut self, task: Arc<dyn Task>) -> Result<TaskHandle, InvalidTaskDefinitionError> {
        task.definition().validate()?;
        let handle = TaskHandle {
            name: task.name().to_string(),
        };
        self.tasks.push(task);
        Ok(handle)
    }

    /// Registers a callback invoked with the outcome of every processed
    /// task, in order.
    pub fn on_outcome<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(&TaskOutcome) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
        self
    }

    /// Builds the task graph and binds it to the store of the pipeline
    /// `name` under the configured store root.
    pub fn finish(self, name: impl Into<String>, config: Config) -> Result<Pipeline, PipelineError> {
        let name = name.into();
        validate_name(&name)?;

        let graph = TaskGraph::build(&self.tasks)?;
        Ok(Pipeline::new(name, graph, config, self.observers))
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field(
                "tasks",
                &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Names a registered task. Can be passed to [`TaskBuilder::depends_on`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    name: String,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to one of this task's values.
    pub fn value(&self, field: impl Into<String>) -> FieldReference {
        FieldReference::value(self.name.clone(), field)
    }

    /// Reference to one of this task's artifacts.
    pub fn artifact(&self, field: impl Into<String>) -> FieldReference {
        FieldReference::artifact(self.name.clone(), field)
    }
}

impl AsRef<str> for TaskHandle {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Builder for one closure-backed task. Parameters are bound in the order
/// they are declared.
pub struct TaskBuilder<'a> {
    blueprint: &'a mut Blueprint,
    definition: TaskDefinition,
}

impl<'a> TaskBuilder<'a> {
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for dependency in dependencies {
            let dependency = dependency.as_ref();
            if !self.definition.depends_on.iter().any(|d| d == dependency) {
                self.definition.depends_on.push(dependency.to_string());
            }
        }
        self
    }

    /// Whether previous results may be reused. Tasks are pure by default.
    pub fn pure(mut self, pure: bool) -> Self {
        self.definition.pure = pure;
        self
    }

    /// Marks the task as always executing.
    pub fn impure(self) -> Self {
        self.pure(false)
    }

    fn param(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.definition.parameters.push((name.into(), spec));
        self
    }

    /// Binds the whole snapshot of the task's dependencies.
    pub fn results(self, param: impl Into<String>) -> Self {
        self.param(param, ParameterSpec::WholeResultSet)
    }

    /// Binds one value of a dependency.
    pub fn value(
        self,
        param: impl Into<String>,
        task: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.field(param, FieldReference::value(task, field))
    }

    /// Binds one artifact of a dependency.
    pub fn artifact(
        self,
        param: impl Into<String>,
        task: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.field(param, FieldReference::artifact(task, field))
    }

    pub fn field(self, param: impl Into<String>, reference: FieldReference) -> Self {
        self.param(param, ParameterSpec::Field(reference))
    }

    /// Binds a field written as `<task>__values__<field>` or
    /// `<task>__artifacts__<field>`.
    pub fn annotated(
        self,
        param: impl Into<String>,
        annotation: &str,
    ) -> Result<Self, InvalidTaskDefinitionError> {
        let reference = annotation.parse()?;
        Ok(self.field(param, reference))
    }

    /// Binds the return of `selector`, applied to the snapshot of the task's
    /// dependencies. A task with a selector is never reused.
    pub fn select<F>(self, param: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&PipelineResult) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.param(param, ParameterSpec::selector(selector))
    }

    /// Finishes the definition with the task body and registers it.
    pub fn run<F>(self, func: F) -> Result<TaskHandle, InvalidTaskDefinitionError>
    where
        F: Fn(&TaskArgs) -> anyhow::Result<TaskOutput> + Send + Sync + 'static,
    {
        self.blueprint.push(Arc::new(FnTask {
            definition: self.definition,
            func: Arc::new(func),
        }))
    }
}
