//! Records of what happened to each task during a run, for display by a
//! front end.

use std::fmt;
use std::sync::LazyLock;

use console::Style;
use indicatif::ProgressStyle;

use crate::result::TaskStatus;

const ANSI_GREEN: Style = Style::new().green();
const ANSI_RED: Style = Style::new().red();
const ANSI_YELLOW: Style = Style::new().yellow();
const ANSI_DIM: Style = Style::new().dim();

pub(crate) static PROGRESS_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("#>-")
});

/// What the engine did with a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The body ran and its result was stamped SUCCESS.
    Executed,
    /// The body ran (or its parameters could not be selected) and failed.
    Failed(String),
    /// The previous result was reused without running the body.
    Reused,
    /// A dependency failed or was skipped, so the task was not attempted.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: String,
    pub outcome: Outcome,
}

impl TaskOutcome {
    pub(crate) fn new(task: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            task: task.into(),
            outcome,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Executed => write!(f, "{} {}", ANSI_GREEN.apply_to("✔"), self.task),
            Outcome::Failed(error) => write!(
                f,
                "{} {}: {}",
                ANSI_RED.apply_to("✘"),
                self.task,
                ANSI_RED.apply_to(error)
            ),
            Outcome::Reused => write!(
                f,
                "{} {} {}",
                ANSI_YELLOW.apply_to("—"),
                self.task,
                ANSI_DIM.apply_to("(cached)")
            ),
            Outcome::Skipped => write!(
                f,
                "{} {}",
                ANSI_DIM.apply_to("·"),
                ANSI_DIM.apply_to(format!("{} (skipped)", self.task))
            ),
        }
    }
}

/// A registered task together with its persisted status, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusLine {
    pub task: String,
    pub status: Option<TaskStatus>,
}

impl fmt::Display for TaskStatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(TaskStatus::Success) => {
                write!(f, "{} {}", self.task, ANSI_GREEN.apply_to("success"))
            }
            Some(TaskStatus::Failure) => {
                write!(f, "{} {}", self.task, ANSI_RED.apply_to("failure"))
            }
            None => write!(f, "{} {}", self.task, ANSI_DIM.apply_to("not run")),
        }
    }
}
