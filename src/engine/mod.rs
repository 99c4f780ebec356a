mod aggregate;
mod sink;
mod parallel;
mod poll;
mod task;
mod workflow;

pub use aggregate::ErrorAggregator;
pub use sink::{LogSink, MemorySink, StdoutSink, TracingSink};
pub use parallel::ParallelTask;
pub use poll::{
    JobClient, JobDetail, JobRequest, JobStatus, PollJobTask, PollPhase, PollSettings,
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
pub use task::{NamedTask, Task};
pub use workflow::Workflow;

#[cfg(test)]
pub use poll::MockJobClient;
