//! Task and pipeline results, and the normalization of whatever a task body
//! hands back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::artifact::Artifact;
use crate::error::{InvalidTaskResultError, LookupError};
use crate::task::{FieldKind, FieldReference};
use crate::value::{Value, json_type_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
}

/// Holds the outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
    /// Stamped by the engine; `None` for a result a task body is still
    /// building.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, artifact: Artifact) -> Self {
        self.artifacts.insert(name.into(), artifact);
        self
    }

    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failure),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(TaskStatus::Success)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }
}

/// What a task body returns.
///
/// Either a ready [`TaskResult`], or a JSON mapping with optional `values`
/// and `artifacts` keys. Values in a mapping are wrapped with
/// [`Value::wrap`]; artifacts are either full artifact objects or a bare
/// location string, which is read as a file artifact.
///
/// A value whose only keys are `value` and `type` is taken as already
/// wrapped, so `{"values": {"v": {"value": 3}}}` yields the scalar `3`.
/// To return a mapping of that shape, build it with [`Value::mapping`]
/// inside a [`TaskResult`].
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Result(TaskResult),
    Raw(Json),
}

impl From<TaskResult> for TaskOutput {
    fn from(result: TaskResult) -> Self {
        TaskOutput::Result(result)
    }
}

impl From<Json> for TaskOutput {
    fn from(raw: Json) -> Self {
        TaskOutput::Raw(raw)
    }
}

impl TaskOutput {
    /// Converts the output into a `TaskResult`, without stamping a status.
    pub fn into_result(self, task: &str) -> Result<TaskResult, InvalidTaskResultError> {
        match self {
            TaskOutput::Result(result) => Ok(result),
            TaskOutput::Raw(Json::Object(mut map)) => {
                let invalid = |found: String| InvalidTaskResultError {
                    task: task.to_string(),
                    found,
                };

                if let Some(key) = map.keys().find(|k| *k != "values" && *k != "artifacts") {
                    return Err(invalid(format!("mapping with unexpected key '{key}'")));
                }

                let mut result = TaskResult::new();

                match map.remove("values") {
                    None | Some(Json::Null) => {}
                    Some(Json::Object(values)) => {
                        for (name, raw) in values {
                            let value = Value::wrap(raw)
                                .map_err(|e| invalid(format!("mapping with bad value '{name}' ({e})")))?;
                            result.values.insert(name, value);
                        }
                    }
                    Some(other) => return Err(invalid(format!("values {}", json_type_name(&other)))),
                }

                match map.remove("artifacts") {
                    None | Some(Json::Null) => {}
                    Some(Json::Object(artifacts)) => {
                        for (name, raw) in artifacts {
                            let artifact = match raw {
                                Json::String(location) => Artifact::file(location),
                                raw => serde_json::from_value(raw).map_err(|e| {
                                    invalid(format!("mapping with bad artifact '{name}' ({e})"))
                                })?,
                            };
                            result.artifacts.insert(name, artifact);
                        }
                    }
                    Some(other) => {
                        return Err(invalid(format!("artifacts {}", json_type_name(&other))));
                    }
                }

                Ok(result)
            }
            TaskOutput::Raw(other) => Err(InvalidTaskResultError {
                task: task.to_string(),
                found: json_type_name(&other).to_string(),
            }),
        }
    }
}

/// A snapshot of a pipeline: the results of the tasks processed so far and,
/// for each of them, the inputs it was executed with.
///
/// Input snapshots hold only the `task_results` of the task's direct
/// dependencies, so nesting never goes deeper than one level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    #[serde(default)]
    pub task_results: BTreeMap<String, TaskResult>,
    #[serde(default)]
    pub task_inputs: BTreeMap<String, PipelineResult>,
}

impl PipelineResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.task_results.is_empty() && self.task_inputs.is_empty()
    }

    pub fn result(&self, task: &str) -> Option<&TaskResult> {
        self.task_results.get(task)
    }

    pub fn status(&self, task: &str) -> Option<TaskStatus> {
        self.task_results.get(task).and_then(|r| r.status)
    }

    /// The value named `field` produced by `task`.
    pub fn value(&self, task: &str, field: &str) -> Result<&Value, LookupError> {
        self.task_results
            .get(task)
            .ok_or_else(|| LookupError::MissingTask(task.to_string()))?
            .values
            .get(field)
            .ok_or_else(|| LookupError::MissingValue {
                task: task.to_string(),
                field: field.to_string(),
            })
    }

    /// The artifact named `field` produced by `task`.
    pub fn artifact(&self, task: &str, field: &str) -> Result<&Artifact, LookupError> {
        self.task_results
            .get(task)
            .ok_or_else(|| LookupError::MissingTask(task.to_string()))?
            .artifacts
            .get(field)
            .ok_or_else(|| LookupError::MissingArtifact {
                task: task.to_string(),
                field: field.to_string(),
            })
    }

    pub fn lookup(&self, reference: &FieldReference) -> Result<Field<'_>, LookupError> {
        match reference.kind {
            FieldKind::Value => self
                .value(&reference.task, &reference.field)
                .map(Field::Value),
            FieldKind::Artifact => self
                .artifact(&reference.task, &reference.field)
                .map(Field::Artifact),
        }
    }

    /// Merges two snapshots. Entries from `other` overwrite entries in
    /// `self` with the same task name.
    pub fn merge(&mut self, other: PipelineResult) {
        self.task_results.extend(other.task_results);
        self.task_inputs.extend(other.task_inputs);
    }

    pub fn merged(mut self, other: PipelineResult) -> PipelineResult {
        self.merge(other);
        self
    }
}

/// A field resolved from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Value(&'a Value),
    Artifact(&'a Artifact),
}
