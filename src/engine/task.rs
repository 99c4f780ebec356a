// src/engine/task.rs
use std::fmt;
use std::sync::Arc;

use crate::error::FlowResult;

/// A unit of work that reports success or failure.
///
/// Tasks registered into a [`ParallelTask`](super::ParallelTask) may run on
/// several tokio workers at once, so implementations must be safe to execute
/// concurrently with their siblings.
#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Execute the task
    async fn execute(&self) -> FlowResult<()>;

    /// Kind shown next to the step name in summaries.
    fn kind(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Summary of the steps this task is composed of, for composite tasks.
    fn nested_summary(&self) -> Option<String> {
        None
    }
}

#[async_trait::async_trait]
impl<T: Task + ?Sized> Task for Arc<T> {
    async fn execute(&self) -> FlowResult<()> {
        (**self).execute().await
    }

    fn kind(&self) -> &str {
        (**self).kind()
    }

    fn nested_summary(&self) -> Option<String> {
        (**self).nested_summary()
    }
}

/// A task paired with the name it was registered under.
#[derive(Clone)]
pub struct NamedTask {
    pub name: String,
    pub task: Arc<dyn Task>,
}

impl NamedTask {
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            task,
        }
    }

    /// Renders `name<Kind>` or `name<Kind>(nested summary)`.
    pub fn describe(&self) -> String {
        match self.task.nested_summary() {
            Some(nested) => format!("{}<{}>({})", self.name, self.task.kind(), nested),
            None => format!("{}<{}>", self.name, self.task.kind()),
        }
    }
}

impl fmt::Debug for NamedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTask")
            .field("name", &self.name)
            .field("kind", &self.task.kind())
            .finish()
    }
}

pub(crate) fn build_summary(tasks: &[NamedTask], delimiter: &str, numbered: bool) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if numbered {
                format!("{}.{}", i + 1, t.describe())
            } else {
                t.describe()
            }
        })
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
