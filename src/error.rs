use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Result alias for checking runs.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Error type for a checking run.
///
/// Inconsistencies are never errors; they are findings in the summary. An
/// error means the run could not finish and no summary is available.
#[derive(Debug, Error)]
pub enum CheckError {
    /// A task failed to read its input; the run stopped.
    #[error("consistency check incomplete: task {task} failed: {source}")]
    Incomplete {
        /// Name of the failing task.
        task: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// A task panicked; the run stopped.
    #[error("consistency check incomplete: task {task} panicked")]
    TaskPanicked {
        /// Name of the failing task.
        task: String,
    },
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The store set could not be opened or prepared.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckError {
    pub(crate) fn incomplete(task: impl Into<String>, source: StoreError) -> Self {
        CheckError::Incomplete {
            task: task.into(),
            source,
        }
    }

    /// Name of the task that stopped the run, if a task did.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            CheckError::Incomplete { task, .. } | CheckError::TaskPanicked { task } => Some(task),
            _ => None,
        }
    }
}
