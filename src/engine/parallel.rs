// src/engine/parallel.rs
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::FlowResult;
use super::aggregate::ErrorAggregator;
use super::task::{build_summary, NamedTask, Task};

/// Group of tasks executed concurrently.
///
/// Every member is launched at once on its own tokio task and always runs to
/// completion; a failing member never cancels its siblings. The group fails
/// with an [`AggregateError`](crate::error::AggregateError) holding one entry
/// per failed member.
#[derive(Default)]
pub struct ParallelTask {
    tasks: Vec<NamedTask>,
}

impl ParallelTask {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Registration order only affects the summary text.
    pub fn register<T>(&mut self, name: impl Into<String>, task: T) -> &mut Self
    where
        T: Task + 'static,
    {
        self.tasks.push(NamedTask::new(name, Arc::new(task)));
        self
    }

    /// Add a member that is already shared.
    pub fn register_shared(&mut self, name: impl Into<String>, task: Arc<dyn Task>) -> &mut Self {
        self.tasks.push(NamedTask::new(name, task));
        self
    }

    pub fn tasks(&self) -> &[NamedTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Member names and kinds; carries no ordering guarantee.
    pub fn summary(&self) -> String {
        build_summary(&self.tasks, ", ", false)
    }
}

#[async_trait::async_trait]
impl Task for ParallelTask {
    async fn execute(&self) -> FlowResult<()> {
        debug!("Launching {} parallel tasks", self.tasks.len());

        let mut aggregator = ErrorAggregator::new();
        for named in &self.tasks {
            let task = Arc::clone(&named.task);
            aggregator.spawn(named.name.clone(), async move { task.execute().await });
        }

        match aggregator.finish().await {
            Ok(()) => {
                info!("All {} parallel tasks completed", self.tasks.len());
                Ok(())
            }
            Err(e) => {
                warn!("{} of {} parallel tasks failed", e.len(), self.tasks.len());
                Err(e.into())
            }
        }
    }

    fn kind(&self) -> &str {
        "ParallelTask"
    }

    fn nested_summary(&self) -> Option<String> {
        Some(self.summary())
    }
}
