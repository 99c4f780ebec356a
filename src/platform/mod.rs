//! Leaf tasks that call out to external systems.

mod command;
mod function;
mod job;
mod storage;

pub use command::CommandTask;
pub use function::{FunctionInvokeTask, FunctionInvoker, HttpFunctionInvoker, InvokeOutput};
pub use job::ProcessJobClient;
pub use storage::{
    join_key, BulkDownloadTask, BulkUploadTask, LocalObjectStore, ObjectReader, ObjectStore,
};
