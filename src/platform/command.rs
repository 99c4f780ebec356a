// src/platform/command.rs
use crate::engine::Task;
use crate::error::{FlowError, FlowResult};
use crate::utils::shell::run_command;

/// Runs a local program; a non-zero exit fails the task.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
}

impl CommandTask {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait::async_trait]
impl Task for CommandTask {
    async fn execute(&self) -> FlowResult<()> {
        let status = run_command(&self.program, &self.args).await?;
        if status.success() {
            Ok(())
        } else {
            Err(FlowError::Command {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }

    fn kind(&self) -> &str {
        "CommandTask"
    }
}
