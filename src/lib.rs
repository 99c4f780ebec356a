pub mod cli;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types for easier access
pub use config::Settings;
pub use definition::WorkflowDefinition;
pub use engine::{
    ErrorAggregator,
    JobClient,
    LogSink,
    ParallelTask,
    PollJobTask,
    Task,
    Workflow
};
pub use error::{AggregateError, FlowError, FlowResult};
