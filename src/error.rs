use camino::Utf8PathBuf;
use thiserror::Error;

pub use anyhow::Error as TaskError;

/// The declared dependencies do not form a DAG.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unable to build execution graph: task '{task}' is part of a dependency cycle")]
pub struct CyclicDependencyError {
    pub task: String,
}

/// A task body returned something that is neither a mapping nor a `TaskResult`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "Task {task} returned invalid result of type {found}, expected either a mapping or a TaskResult"
)]
pub struct InvalidTaskResultError {
    pub task: String,
    pub found: String,
}

#[derive(Debug, Error)]
pub enum PipelineConfigError {
    #[error("Dependency on nonexistent task: {0}")]
    MissingTask(String),

    #[error("Task '{0}' is registered more than once")]
    DuplicateTask(String),

    #[error("Task '{task}', parameter '{param}':\n{source}")]
    ParameterLookup {
        task: String,
        param: String,
        source: LookupError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidTaskDefinitionError {
    #[error("Invalid task name {0:?}, task names are used as store directory names")]
    InvalidName(String),

    #[error("Invalid function annotation {0:?}, expected <task>__values__<field> or <task>__artifacts__<field>")]
    InvalidAnnotation(String),

    #[error("Task '{task}' declares parameter '{param}' more than once")]
    DuplicateParameter { task: String, param: String },

    #[error("Task '{task}', parameter '{param}' reads from '{dependency}' which is not a declared dependency")]
    UndeclaredDependency {
        task: String,
        param: String,
        dependency: String,
    },
}

/// A field reference could not be resolved against a snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No result recorded for task '{0}'")]
    MissingTask(String),

    #[error("Task '{task}' has no value named '{field}'")]
    MissingValue { task: String, field: String },

    #[error("Task '{task}' has no artifact named '{field}'")]
    MissingArtifact { task: String, field: String },
}

/// Reading a bound argument inside a task body failed.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("No argument named '{0}'")]
    Missing(String),

    #[error("Argument '{param}' is {found}, expected {expected}")]
    WrongShape {
        param: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Argument '{param}' could not be decoded:\n{source}")]
    Decode {
        param: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("Unknown value type '{0}'")]
    UnknownType(String),

    #[error("A {expected} value can not hold a JSON {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Can not wrap {0} in a Value")]
    Unwrappable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't read {path}:\n{source}")]
    Decode {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    #[error("Couldn't serialize the result of task '{task}':\n{source}")]
    Encode {
        task: String,
        source: serde_json::Error,
    },

    #[error("Store entry {0} is not a valid UTF-8 path")]
    PathFormat(#[from] camino::FromPathBufError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file {path}:\n{source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse config file {path}:\n{source}")]
    Parse {
        path: Utf8PathBuf,
        source: toml::de::Error,
    },
}

/// Errors that abort pipeline assembly or a whole run. Failures of single
/// tasks never surface here, they are recorded in the run's results.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),

    #[error("Pipeline configuration error:\n{0}")]
    Config(#[from] PipelineConfigError),

    #[error("Invalid task definition:\n{0}")]
    Definition(#[from] InvalidTaskDefinitionError),

    #[error("Result store error:\n{0}")]
    Store(#[from] StoreError),
}
