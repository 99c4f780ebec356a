// src/engine/workflow.rs
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use super::sink::{LogSink, StdoutSink};
use super::task::{build_summary, NamedTask, Task};

/// Ordered sequence of named tasks run one after another.
///
/// Steps execute in registration order and the first failure stops the run:
/// later steps are skipped and the failure is returned wrapped in
/// [`FlowError::StepFailed`] naming the step. A workflow is itself a
/// [`Task`], so workflows and parallel groups nest to any depth.
pub struct Workflow {
    tasks: Vec<NamedTask>,
    logger: Arc<dyn LogSink>,
}

impl Workflow {
    /// Create an empty workflow logging to standard output
    pub fn new() -> Self {
        Self::with_logger(Arc::new(StdoutSink::new()))
    }

    /// Create an empty workflow logging to `logger`
    pub fn with_logger(logger: Arc<dyn LogSink>) -> Self {
        Self {
            tasks: Vec::new(),
            logger,
        }
    }

    /// Replace the lifecycle log sink
    pub fn set_logger(&mut self, logger: Arc<dyn LogSink>) {
        self.logger = logger;
    }

    /// Append a step. Duplicate names are accepted; lookups use the first match.
    pub fn register<T>(&mut self, name: impl Into<String>, task: T) -> &mut Self
    where
        T: Task + 'static,
    {
        self.tasks.push(NamedTask::new(name, Arc::new(task)));
        self
    }

    /// Append a step that is already shared.
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

    /// Run every step in order
    pub async fn run(&self) -> FlowResult<()> {
        self.run_steps(&self.tasks).await
    }

    /// Run the first step named `name` and every step after it
    pub async fn run_from(&self, name: &str) -> FlowResult<()> {
        let index = self.position(name)?;
        self.run_steps(&self.tasks[index..]).await
    }

    /// Run only the first step named `name`
    pub async fn run_only(&self, name: &str) -> FlowResult<()> {
        let index = self.position(name)?;
        self.run_steps(&self.tasks[index..=index]).await
    }

    /// Numbered step listing, recursing into nested workflows and groups.
    pub fn summary(&self) -> String {
        build_summary(&self.tasks, " -> ", true)
    }

    fn position(&self, name: &str) -> FlowResult<usize> {
        self.tasks
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| FlowError::TaskNotFound {
                name: name.to_string(),
                summary: self.summary(),
            })
    }

    async fn run_steps(&self, steps: &[NamedTask]) -> FlowResult<()> {
        let run_id = Uuid::new_v4();
        let span = info_span!("workflow_run", %run_id, steps = steps.len());

        async move {
            debug!("Starting workflow run");
            for step in steps {
                self.logger.line(&format!("workflow: Start task: {}", step.name));
                if let Err(e) = step.task.execute().await {
                    warn!(task = %step.name, "Workflow step failed: {}", e);
                    self.logger
                        .line(&format!("workflow: Failed task: {}: {}", step.name, e));
                    return Err(FlowError::step(step.name.clone(), e));
                }
                self.logger.line(&format!("workflow: Complete task: {}", step.name));
            }
            info!("Workflow run completed");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Task for Workflow {
    async fn execute(&self) -> FlowResult<()> {
        self.run().await
    }

    fn kind(&self) -> &str {
        "Workflow"
    }

    fn nested_summary(&self) -> Option<String> {
        Some(self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use parking_lot::Mutex;

    use crate::engine::sink::MemorySink;
    use crate::engine::parallel::ParallelTask;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records start/end events into a shared journal.
    struct Step {
        name: &'static str,
        fail: bool,
        delay: Duration,
        journal: Journal,
    }

    impl Step {
        fn ok(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                fail: false,
                delay: Duration::ZERO,
                journal: Arc::clone(journal),
            }
        }

        fn failing(name: &'static str, journal: &Journal) -> Self {
            Self {
                fail: true,
                ..Self::ok(name, journal)
            }
        }

        fn slow(name: &'static str, delay: Duration, journal: &Journal) -> Self {
            Self {
                delay,
                ..Self::ok(name, journal)
            }
        }
    }

    #[async_trait::async_trait]
    impl Task for Step {
        async fn execute(&self) -> FlowResult<()> {
            self.journal.lock().push(format!("start {}", self.name));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.journal.lock().push(format!("end {}", self.name));
            if self.fail {
                return Err(FlowError::Command {
                    program: self.name.to_string(),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn executed(journal: &Journal) -> Vec<String> {
        journal
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("start ").map(str::to_string))
            .collect()
    }

    fn abcd(journal: &Journal, failing: Option<&'static str>) -> Workflow {
        let mut wf = Workflow::with_logger(Arc::new(MemorySink::new()));
        for name in ["a", "b", "c", "d"] {
            if Some(name) == failing {
                wf.register(name, Step::failing(name, journal));
            } else {
                wf.register(name, Step::ok(name, journal));
            }
        }
        wf
    }

    #[tokio::test]
    async fn test_run_executes_in_order() {
        let j = journal();
        let wf = abcd(&j, None);

        wf.run().await.unwrap();
        assert_eq!(executed(&j), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failure() {
        let j = journal();
        let wf = abcd(&j, Some("c"));

        let error = wf.run().await.unwrap_err();
        assert_eq!(executed(&j), vec!["a", "b", "c"]);
        assert_eq!(error.failed_step(), Some("c"));
        assert!(matches!(error.innermost(), FlowError::Command { program, .. } if program == "c"));
    }

    #[tokio::test]
    async fn test_run_twice_reexecutes_every_step() {
        let j = journal();
        let wf = abcd(&j, None);

        wf.run().await.unwrap();
        wf.run().await.unwrap();
        assert_eq!(executed(&j).len(), 8);
    }

    #[tokio::test]
    async fn test_run_from() {
        let j = journal();
        let wf = abcd(&j, None);

        wf.run_from("c").await.unwrap();
        assert_eq!(executed(&j), vec!["c", "d"]);

        j.lock().clear();
        let error = wf.run_from("zzz").await.unwrap_err();
        assert!(matches!(error, FlowError::TaskNotFound { ref name, .. } if name == "zzz"));
        assert!(executed(&j).is_empty());
    }

    #[tokio::test]
    async fn test_run_only() {
        let j = journal();
        let wf = abcd(&j, None);

        wf.run_only("b").await.unwrap();
        assert_eq!(executed(&j), vec!["b"]);

        j.lock().clear();
        let error = wf.run_only("zzz").await.unwrap_err();
        assert!(matches!(error, FlowError::TaskNotFound { .. }));
        assert!(executed(&j).is_empty());
    }

    #[tokio::test]
    async fn test_lookup_uses_first_match() {
        let j = journal();
        let mut wf = Workflow::with_logger(Arc::new(MemorySink::new()));
        wf.register("x", Step::ok("first", &j));
        wf.register("y", Step::ok("middle", &j));
        wf.register("x", Step::ok("second", &j));

        wf.run_only("x").await.unwrap();
        assert_eq!(executed(&j), vec!["first"]);

        j.lock().clear();
        wf.run_from("x").await.unwrap();
        assert_eq!(executed(&j), vec!["first", "middle", "second"]);
    }

    #[tokio::test]
    async fn test_nested_workflow_failure_stops_outer() {
        let j = journal();
        let mut inner = Workflow::with_logger(Arc::new(MemorySink::new()));
        inner.register("b", Step::ok("b", &j));
        inner.register("c", Step::failing("c", &j));

        let mut outer = Workflow::with_logger(Arc::new(MemorySink::new()));
        outer.register("a", Step::ok("a", &j));
        outer.register("bc", inner);
        outer.register("d", Step::ok("d", &j));

        let error = outer.run().await.unwrap_err();
        assert_eq!(executed(&j), vec!["a", "b", "c"]);
        assert_eq!(error.failed_step(), Some("bc"));
        match &error {
            FlowError::StepFailed { source, .. } => assert_eq!(source.failed_step(), Some("c")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_nested_parallel_ordering() {
        let j = journal();

        let mut inner = Workflow::with_logger(Arc::new(MemorySink::new()));
        inner.register("b", Step::slow("b", Duration::from_millis(20), &j));
        inner.register("c", Step::slow("c", Duration::from_millis(20), &j));

        let mut group = ParallelTask::new();
        group.register("bc", inner);
        group.register("d", Step::slow("d", Duration::from_millis(5), &j));

        let mut wf = Workflow::with_logger(Arc::new(MemorySink::new()));
        wf.register("a", Step::ok("a", &j));
        wf.register("group", group);
        wf.register("e", Step::ok("e", &j));

        wf.run().await.unwrap();

        let events = j.lock().clone();
        let at = |event: &str| {
            events
                .iter()
                .position(|e| e == event)
                .unwrap_or_else(|| panic!("missing event {}", event))
        };
        assert!(at("end a") < at("start b"));
        assert!(at("end a") < at("start d"));
        assert!(at("end b") < at("start c"));
        assert!(at("end c") < at("start e"));
        assert!(at("end d") < at("start e"));
        assert_eq!(events.len(), 10);
    }

    #[tokio::test]
    async fn test_lifecycle_lines() {
        let j = journal();
        let sink = MemorySink::new();
        let mut wf = Workflow::with_logger(Arc::new(sink.clone()));
        wf.register("a", Step::ok("a", &j));
        wf.register("b", Step::failing("b", &j));
        wf.register("c", Step::ok("c", &j));

        assert!(wf.run().await.is_err());
        let lines = sink.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "workflow: Start task: a");
        assert_eq!(lines[1], "workflow: Complete task: a");
        assert_eq!(lines[2], "workflow: Start task: b");
        assert!(lines[3].starts_with("workflow: Failed task: b: "));
    }

    #[test]
    fn test_summary_recurses_into_composites() {
        let j = journal();
        let mut inner = Workflow::with_logger(Arc::new(MemorySink::new()));
        inner.register("b", Step::ok("b", &j));
        inner.register("c", Step::ok("c", &j));

        let mut group = ParallelTask::new();
        group.register("bc", inner);
        group.register("d", Step::ok("d", &j));

        let mut wf = Workflow::with_logger(Arc::new(MemorySink::new()));
        wf.register("a", Step::ok("a", &j));
        wf.register("group", group);
        wf.register("e", Step::ok("e", &j));

        assert_eq!(
            wf.summary(),
            "1.a<Step> -> 2.group<ParallelTask>(bc<Workflow>(1.b<Step> -> 2.c<Step>), d<Step>) -> 3.e<Step>"
        );
    }

    #[tokio::test]
    async fn test_not_found_error_carries_summary() {
        let j = journal();
        let wf = abcd(&j, None);

        let error = wf.run_only("missing").await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "task missing not found in: 1.a<Step> -> 2.b<Step> -> 3.c<Step> -> 4.d<Step>"
        );
    }
}
