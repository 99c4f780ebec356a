// src/definition.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::engine::{JobClient, JobRequest, LogSink, ParallelTask, PollJobTask, Task, Workflow};
use crate::error::{FlowError, FlowResult};
use crate::platform::{
    BulkDownloadTask, BulkUploadTask, CommandTask, FunctionInvokeTask, HttpFunctionInvoker,
    LocalObjectStore, ObjectStore, ProcessJobClient,
};

/// A workflow described in TOML as a list of `[[steps]]`.
///
/// ```toml
/// [[steps]]
/// name = "build"
/// kind = "command"
/// program = "make"
/// args = ["all"]
///
/// [[steps]]
/// name = "fetch"
/// kind = "parallel"
///
///   [[steps.steps]]
///   name = "images"
///   kind = "download"
///   prefix = "images/"
///   destination = "out/images"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepDefinition {
    Command {
        name: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Job {
        name: String,
        command: Vec<String>,
        #[serde(default)]
        queue: Option<String>,
        #[serde(default)]
        definition: Option<String>,
        #[serde(default)]
        parameters: BTreeMap<String, String>,
        #[serde(default)]
        poll_interval_ms: Option<u64>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Invoke {
        name: String,
        function: String,
        #[serde(default)]
        payload: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
    Upload {
        name: String,
        source: PathBuf,
        prefix: String,
    },
    Download {
        name: String,
        prefix: String,
        destination: PathBuf,
    },
    Parallel {
        name: String,
        steps: Vec<StepDefinition>,
    },
    Workflow {
        name: String,
        steps: Vec<StepDefinition>,
    },
}

impl StepDefinition {
    pub fn name(&self) -> &str {
        match self {
            StepDefinition::Command { name, .. }
            | StepDefinition::Job { name, .. }
            | StepDefinition::Invoke { name, .. }
            | StepDefinition::Upload { name, .. }
            | StepDefinition::Download { name, .. }
            | StepDefinition::Parallel { name, .. }
            | StepDefinition::Workflow { name, .. } => name,
        }
    }
}

/// Shared backends handed to every step built from a definition.
#[derive(Clone)]
pub struct Backends {
    pub jobs: Arc<dyn JobClient>,
    pub store: Arc<dyn ObjectStore>,
    pub logger: Arc<dyn LogSink>,
    pub settings: Settings,
}

impl Backends {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            jobs: Arc::new(ProcessJobClient::new()),
            store: Arc::new(LocalObjectStore::new(settings.store_root.clone())),
            logger: settings.log_sink(),
            settings: settings.clone(),
        }
    }
}

impl FromStr for WorkflowDefinition {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| FlowError::Definition(format!("Failed to parse workflow: {}", e)))
    }
}

impl WorkflowDefinition {
    /// Read and parse a definition file
    pub fn load(path: &Path) -> FlowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| FlowError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Parsing workflow definition {}", path.display());
        content.parse()
    }

    /// Build a runnable workflow backed by the local process and object store backends
    pub fn build(&self, settings: &Settings) -> FlowResult<Workflow> {
        self.build_with(&Backends::from_settings(settings))
    }

    pub fn build_with(&self, backends: &Backends) -> FlowResult<Workflow> {
        build_workflow(&self.steps, backends)
    }
}

fn build_workflow(steps: &[StepDefinition], backends: &Backends) -> FlowResult<Workflow> {
    let mut workflow = Workflow::with_logger(backends.logger.clone());
    for step in steps {
        workflow.register_shared(step.name(), build_step(step, backends)?);
    }
    Ok(workflow)
}

fn build_step(step: &StepDefinition, backends: &Backends) -> FlowResult<Arc<dyn Task>> {
    if step.name().trim().is_empty() {
        return Err(FlowError::Definition("step name must not be empty".to_string()));
    }

    let task: Arc<dyn Task> = match step {
        StepDefinition::Command { name, program, args } => {
            if program.is_empty() {
                return Err(FlowError::Definition(format!("step {} has no program", name)));
            }
            Arc::new(CommandTask::new(program.clone(), args.clone()))
        }
        StepDefinition::Job {
            name,
            command,
            queue,
            definition,
            parameters,
            poll_interval_ms,
            timeout_secs,
        } => {
            if command.is_empty() {
                return Err(FlowError::Definition(format!("job {} has no command", name)));
            }
            let request = JobRequest {
                name: name.clone(),
                queue: queue.clone(),
                definition: definition.clone(),
                command: command.clone(),
                parameters: parameters.clone(),
            };

            let mut settings = backends.settings.poll_settings();
            if let Some(ms) = poll_interval_ms {
                settings.poll_interval = Duration::from_millis(*ms);
            }
            if let Some(secs) = timeout_secs {
                settings.timeout = Duration::from_secs(*secs);
            }
            Arc::new(PollJobTask::new(backends.jobs.clone(), request).with_settings(settings))
        }
        StepDefinition::Invoke {
            name,
            function,
            payload,
            endpoint,
        } => {
            let endpoint = endpoint
                .as_deref()
                .or(backends.settings.function_endpoint.as_deref())
                .ok_or_else(|| {
                    FlowError::Definition(format!("invoke step {} has no endpoint", name))
                })?;
            if !payload.is_empty() {
                serde_json::from_str::<serde_json::Value>(payload).map_err(|e| {
                    FlowError::Definition(format!("invoke step {} payload is not JSON: {}", name, e))
                })?;
            }
            let invoker = HttpFunctionInvoker::new(endpoint)
                .map_err(|e| FlowError::Definition(format!("invoke step {}: {}", name, e)))?;
            Arc::new(FunctionInvokeTask::new(
                Arc::new(invoker),
                function.clone(),
                payload.clone().into_bytes(),
            ))
        }
        StepDefinition::Upload { source, prefix, .. } => Arc::new(BulkUploadTask::new(
            backends.store.clone(),
            source.clone(),
            prefix.clone(),
        )),
        StepDefinition::Download {
            prefix,
            destination,
            ..
        } => Arc::new(BulkDownloadTask::new(
            backends.store.clone(),
            prefix.clone(),
            destination.clone(),
        )),
        StepDefinition::Parallel { name, steps } => {
            if steps.is_empty() {
                return Err(FlowError::Definition(format!("parallel group {} has no steps", name)));
            }
            let mut group = ParallelTask::new();
            for member in steps {
                group.register_shared(member.name(), build_step(member, backends)?);
            }
            Arc::new(group)
        }
        StepDefinition::Workflow { name, steps } => {
            if steps.is_empty() {
                return Err(FlowError::Definition(format!("workflow {} has no steps", name)));
            }
            Arc::new(build_workflow(steps, backends)?)
        }
    };

    Ok(task)
}
