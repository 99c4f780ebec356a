use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("job {job}: submit failed: {source}")]
    Submit {
        job: String,
        source: anyhow::Error,
    },

    #[error("job id:{job_id}: status query failed: {source}")]
    Poll {
        job_id: String,
        source: anyhow::Error,
    },

    #[error("job id:{job_id} failed by reason: {reason}")]
    JobFailed {
        job_id: String,
        reason: String,
    },

    #[error("job id:{job_id} not found")]
    JobNotFound {
        job_id: String,
    },

    #[error("job id:{job_id} timed out after {elapsed:?}")]
    Timeout {
        job_id: String,
        elapsed: Duration,
    },

    #[error("task {name} not found in: {summary}")]
    TaskNotFound {
        name: String,
        summary: String,
    },

    #[error("task {step} failed: {source}")]
    StepFailed {
        step: String,
        source: Box<FlowError>,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("task {task} was interrupted before reporting a result")]
    Interrupted {
        task: String,
    },

    #[error("command {program} exited with {status}")]
    Command {
        program: String,
        status: String,
    },

    #[error("command {program} could not be started: {source}")]
    CommandSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("function {function}: invoke failed: {source}")]
    Invoke {
        function: String,
        source: anyhow::Error,
    },

    #[error("object {key}: {source}")]
    Storage {
        key: String,
        source: anyhow::Error,
    },

    #[error("file error: {path:?} - {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid workflow definition: {0}")]
    Definition(String),
}

impl FlowError {
    /// Wraps a step failure with the name of the step that produced it.
    pub fn step(step: impl Into<String>, source: FlowError) -> Self {
        FlowError::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Name of the workflow step this error was raised from, if any.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            FlowError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Follows `StepFailed` wrappers down to the error the failing leaf returned.
    pub fn innermost(&self) -> &FlowError {
        match self {
            FlowError::StepFailed { source, .. } => source.innermost(),
            other => other,
        }
    }
}

/// Every failure collected from one concurrent join.
///
/// Component order follows arrival order at the collection point and is not
/// stable across runs.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<FlowError>,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<FlowError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[FlowError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<FlowError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {} occurred:", self.errors.len(), noun)?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
