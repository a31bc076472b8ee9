#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod artifact;
mod binder;
mod blueprint;
pub mod config;
mod error;
mod executor;
mod graph;
mod hash;
#[cfg(feature = "logging")]
mod logging;
mod report;
mod result;
mod store;
mod task;
mod value;

pub use crate::artifact::Artifact;
pub use crate::blueprint::{Blueprint, TaskBuilder, TaskHandle};
pub use crate::config::Config;
pub use crate::error::*;
pub use crate::executor::{OutcomeObserver, Pipeline, RunOptions};
pub use crate::graph::TaskGraph;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::report::{Outcome, TaskOutcome, TaskStatusLine};
pub use crate::result::{Field, PipelineResult, TaskOutput, TaskResult, TaskStatus};
pub use crate::store::ResultStore;
pub use crate::task::{
    Argument, FieldKind, FieldReference, ParameterSpec, SelectorFn, Task, TaskArgs,
    TaskDefinition,
};
pub use crate::value::{Value, ValueKind};
