//! Durable storage of pipeline snapshots.
//!
//! Every task gets its own directory under the pipeline's store root:
//!
//! ```text
//! <root>/<task>/result.json   the task's last TaskResult
//! <root>/<task>/inputs.json   the inputs that produced it
//! ```
//!
//! Files are written next to their final location and renamed into place,
//! so a reader never sees half a file. Deleting a task directory drops that
//! task's cache entry and nothing else.

use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::result::{PipelineResult, TaskResult};

const RESULT_FILE: &str = "result.json";
const INPUTS_FILE: &str = "inputs.json";

/// On-disk store for one pipeline. Assumes a single writer.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: Utf8PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn task_dir(&self, task: &str) -> Utf8PathBuf {
        self.root.join(task)
    }

    /// Loads the persisted snapshot, or an empty one if nothing was saved.
    ///
    /// A task directory without `result.json` is ignored. A missing
    /// `inputs.json` only means the task has no recorded inputs.
    pub fn load(&self) -> Result<PipelineResult, StoreError> {
        tracing::debug!("loading pipeline from {}", self.root);
        let mut pipeline = PipelineResult::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(pipeline),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let path = Utf8PathBuf::try_from(entry.path())?;
            let Some(task) = path.file_name().map(str::to_string) else {
                continue;
            };

            let Some(result) = read_json::<TaskResult>(&path.join(RESULT_FILE))? else {
                tracing::warn!("ignoring store entry {} without a result", path);
                continue;
            };

            if let Some(inputs) = read_json::<PipelineResult>(&path.join(INPUTS_FILE))? {
                pipeline.task_inputs.insert(task.clone(), inputs);
            }
            pipeline.task_results.insert(task, result);
        }

        Ok(pipeline)
    }

    /// Persists the entry of a single task taken from `snapshot`.
    ///
    /// The inputs are written first, so an interrupted write never pairs a
    /// new result with stale inputs.
    pub fn save_task(&self, task: &str, snapshot: &PipelineResult) -> Result<(), StoreError> {
        let Some(result) = snapshot.task_results.get(task) else {
            return Ok(());
        };

        let dir = self.task_dir(task);
        fs::create_dir_all(&dir)?;

        let inputs_path = dir.join(INPUTS_FILE);
        match snapshot.task_inputs.get(task) {
            Some(inputs) => write_json(task, &inputs_path, inputs)?,
            None => remove_file_if_exists(&inputs_path)?,
        }

        write_json(task, &dir.join(RESULT_FILE), result)?;
        tracing::debug!("saved {} to {}", task, dir);

        Ok(())
    }

    /// Persists every task entry in `snapshot`.
    pub fn save(&self, snapshot: &PipelineResult) -> Result<(), StoreError> {
        for task in snapshot.task_results.keys() {
            self.save_task(task, snapshot)?;
        }
        Ok(())
    }

    /// Removes one task's cache entry. Returns whether there was one.
    pub fn remove_task(&self, task: &str) -> Result<bool, StoreError> {
        match fs::remove_dir_all(self.task_dir(task)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the whole pipeline store.
    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_owned(),
            source,
        })
}

fn write_json<T: Serialize>(task: &str, path: &Utf8Path, data: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(data).map_err(|source| StoreError::Encode {
        task: task.to_string(),
        source,
    })?;

    let temp = path.with_extension("json.tmp");
    fs::write(&temp, json)?;
    fs::rename(&temp, path)?;

    Ok(())
}

fn remove_file_if_exists(path: &Utf8Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
