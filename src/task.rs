//! All the task-related abstractions.
//!
//! A task is an opaque unit of work plus a [`TaskDefinition`] describing its
//! name, its declared dependencies, whether its results may be memoized, and
//! how each of its parameters is populated from upstream results.
//!
//! ## Parameters
//!
//! Every parameter of a task is bound from the snapshot of its direct
//! dependencies, in one of three ways (see [`ParameterSpec`]):
//!
//! * the whole snapshot,
//! * one named value or artifact of one dependency,
//! * the return of a selector function applied to the snapshot.
//!
//! The bound arguments reach the task body as [`TaskArgs`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::artifact::Artifact;
use crate::error::{ArgumentError, InvalidTaskDefinitionError};
use crate::result::{PipelineResult, TaskOutput};
use crate::value::Value;

/// Selector function pointer. Selectors must be pure; they are re-supplied on
/// every run and never persisted.
pub type SelectorFn = Arc<dyn Fn(&PipelineResult) -> anyhow::Result<Json> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Value,
    Artifact,
}

/// Points at exactly one value or artifact produced by an upstream task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    pub task: String,
    pub kind: FieldKind,
    pub field: String,
}

impl FieldReference {
    pub fn value(task: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            kind: FieldKind::Value,
            field: field.into(),
        }
    }

    pub fn artifact(task: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            kind: FieldKind::Artifact,
            field: field.into(),
        }
    }
}

/// Parses the annotation form `<task>__values__<field>` or
/// `<task>__artifacts__<field>`.
impl FromStr for FieldReference {
    type Err = InvalidTaskDefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const MARKERS: [(&str, FieldKind); 2] = [
            ("__values__", FieldKind::Value),
            ("__artifacts__", FieldKind::Artifact),
        ];

        for (marker, kind) in MARKERS {
            if let Some((task, field)) = s.split_once(marker)
                && !task.is_empty()
                && !field.is_empty()
            {
                return Ok(Self {
                    task: task.to_string(),
                    kind,
                    field: field.to_string(),
                });
            }
        }

        Err(InvalidTaskDefinitionError::InvalidAnnotation(s.to_string()))
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FieldKind::Value => "values",
            FieldKind::Artifact => "artifacts",
        };
        write!(f, "{}__{}__{}", self.task, kind, self.field)
    }
}

/// How one formal parameter of a task is populated.
#[derive(Clone)]
pub enum ParameterSpec {
    /// The entire dependency snapshot.
    WholeResultSet,
    /// One named value or artifact of a specific dependency.
    Field(FieldReference),
    /// The return of a caller-supplied function of the snapshot.
    Selector(SelectorFn),
}

impl ParameterSpec {
    pub fn selector<F>(func: F) -> Self
    where
        F: Fn(&PipelineResult) -> anyhow::Result<Json> + Send + Sync + 'static,
    {
        ParameterSpec::Selector(Arc::new(func))
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterSpec::WholeResultSet => write!(f, "WholeResultSet"),
            ParameterSpec::Field(reference) => write!(f, "Field({reference})"),
            ParameterSpec::Selector(_) => write!(f, "Selector(*)"),
        }
    }
}

impl PartialEq for ParameterSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParameterSpec::WholeResultSet, ParameterSpec::WholeResultSet) => true,
            (ParameterSpec::Field(a), ParameterSpec::Field(b)) => a == b,
            (ParameterSpec::Selector(a), ParameterSpec::Selector(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Identity and shape of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub name: String,
    pub depends_on: Vec<String>,
    pub pure: bool,
    pub parameters: Vec<(String, ParameterSpec)>,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            pure: true,
            parameters: Vec::new(),
        }
    }

    /// Whether a previous result may be reused in place of running the task.
    ///
    /// Selectors have no identity that could be compared across runs, so a
    /// task with a selector parameter is never reused.
    pub fn is_memoizable(&self) -> bool {
        self.pure
            && !self
                .parameters
                .iter()
                .any(|(_, spec)| matches!(spec, ParameterSpec::Selector(_)))
    }

    /// Checks the definition for problems that can be caught before the
    /// pipeline runs.
    pub fn validate(&self) -> Result<(), InvalidTaskDefinitionError> {
        validate_name(&self.name)?;

        let mut seen = std::collections::HashSet::new();
        for (param, spec) in &self.parameters {
            if !seen.insert(param.as_str()) {
                return Err(InvalidTaskDefinitionError::DuplicateParameter {
                    task: self.name.clone(),
                    param: param.clone(),
                });
            }

            if let ParameterSpec::Field(reference) = spec
                && !self.depends_on.contains(&reference.task)
            {
                return Err(InvalidTaskDefinitionError::UndeclaredDependency {
                    task: self.name.clone(),
                    param: param.clone(),
                    dependency: reference.task.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Task names double as store directory names.
pub(crate) fn validate_name(name: &str) -> Result<(), InvalidTaskDefinitionError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        Err(InvalidTaskDefinitionError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// A runnable unit in the pipeline.
pub trait Task: Send + Sync {
    fn name(&self) -> &str {
        &self.definition().name
    }

    fn definition(&self) -> &TaskDefinition;

    /// Runs the task body. Errors and panics are caught by the engine and
    /// recorded as a failure of this task.
    fn invoke(&self, args: &TaskArgs) -> anyhow::Result<TaskOutput>;
}

/// Task function pointer supplied from the userland.
pub(crate) type TaskFnPtr = Arc<dyn Fn(&TaskArgs) -> anyhow::Result<TaskOutput> + Send + Sync>;

/// A task backed by a closure, created by the blueprint builder.
pub(crate) struct FnTask {
    pub definition: TaskDefinition,
    pub func: TaskFnPtr,
}

impl Task for FnTask {
    fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    fn invoke(&self, args: &TaskArgs) -> anyhow::Result<TaskOutput> {
        (self.func)(args)
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnTask({})", self.definition.name)
    }
}

/// One bound argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Results(PipelineResult),
    Value(Value),
    Artifact(Artifact),
    Selected(Json),
}

impl Argument {
    fn shape(&self) -> &'static str {
        match self {
            Argument::Results(_) => "a result set",
            Argument::Value(_) => "a value",
            Argument::Artifact(_) => "an artifact",
            Argument::Selected(_) => "a selected value",
        }
    }
}

/// The arguments a task body is called with, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    args: BTreeMap<String, Argument>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, argument: Argument) {
        self.args.insert(name.into(), argument);
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.args.get(name)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, name: &str) -> Result<&Argument, ArgumentError> {
        self.args
            .get(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))
    }

    fn wrong_shape(name: &str, expected: &'static str, found: &Argument) -> ArgumentError {
        ArgumentError::WrongShape {
            param: name.to_string(),
            expected,
            found: found.shape(),
        }
    }

    /// The dependency snapshot bound to a whole-result-set parameter.
    pub fn results(&self, name: &str) -> Result<&PipelineResult, ArgumentError> {
        match self.require(name)? {
            Argument::Results(results) => Ok(results),
            other => Err(Self::wrong_shape(name, "a result set", other)),
        }
    }

    /// The raw [`Value`] bound to a field parameter.
    pub fn raw_value(&self, name: &str) -> Result<&Value, ArgumentError> {
        match self.require(name)? {
            Argument::Value(value) => Ok(value),
            other => Err(Self::wrong_shape(name, "a value", other)),
        }
    }

    /// Decodes a value parameter into a concrete type.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        self.raw_value(name)?
            .get()
            .map_err(|source| ArgumentError::Decode {
                param: name.to_string(),
                source,
            })
    }

    pub fn artifact(&self, name: &str) -> Result<&Artifact, ArgumentError> {
        match self.require(name)? {
            Argument::Artifact(artifact) => Ok(artifact),
            other => Err(Self::wrong_shape(name, "an artifact", other)),
        }
    }

    /// Decodes the return of a selector parameter into a concrete type.
    pub fn selected<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        match self.require(name)? {
            Argument::Selected(json) => {
                T::deserialize(json).map_err(|source| ArgumentError::Decode {
                    param: name.to_string(),
                    source,
                })
            }
            other => Err(Self::wrong_shape(name, "a selected value", other)),
        }
    }
}
