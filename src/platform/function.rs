// src/platform/function.rs
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::engine::Task;
use crate::error::{FlowError, FlowResult};

/// What a function backend returned for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutput {
    pub status_code: u16,
    pub payload: Vec<u8>,
}

/// Backend that runs a named function with a payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, function: &str, payload: &[u8]) -> Result<InvokeOutput>;
}

/// Invokes functions over HTTP at `<endpoint>/functions/<name>/invocations`.
#[derive(Debug, Clone)]
pub struct HttpFunctionInvoker {
    client: Client,
    endpoint: Url,
}

impl HttpFunctionInvoker {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("cloudflow/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid function endpoint: {}", endpoint))?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Ok(Self { client, endpoint })
    }

    pub fn invocation_url(&self, function: &str) -> Result<Url> {
        self.endpoint
            .join(&format!("functions/{}/invocations", function))
            .with_context(|| format!("Invalid function name: {}", function))
    }
}

#[async_trait::async_trait]
impl FunctionInvoker for HttpFunctionInvoker {
    async fn invoke(&self, function: &str, payload: &[u8]) -> Result<InvokeOutput> {
        let url = self.invocation_url(function)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .context("Failed to send invocation request")?
            .error_for_status()?;

        let status_code = response.status().as_u16();
        let payload = response.bytes().await?.to_vec();
        Ok(InvokeOutput {
            status_code,
            payload,
        })
    }
}

/// Invokes one function; the returned payload is not consumed.
pub struct FunctionInvokeTask {
    invoker: Arc<dyn FunctionInvoker>,
    function: String,
    payload: Vec<u8>,
}

impl FunctionInvokeTask {
    pub fn new(invoker: Arc<dyn FunctionInvoker>, function: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            invoker,
            function: function.into(),
            payload: payload.into(),
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

#[async_trait::async_trait]
impl Task for FunctionInvokeTask {
    async fn execute(&self) -> FlowResult<()> {
        let output = self
            .invoker
            .invoke(&self.function, &self.payload)
            .await
            .map_err(|source| FlowError::Invoke {
                function: self.function.clone(),
                source,
            })?;

        info!(
            "Function {} returned status {} ({} bytes)",
            self.function,
            output.status_code,
            output.payload.len()
        );
        Ok(())
    }

    fn kind(&self) -> &str {
        "FunctionInvokeTask"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_function_invoke_task_execute() {
        let mut invoker = MockFunctionInvoker::new();
        invoker
            .expect_invoke()
            .withf(|function, payload| function == "resize" && payload == &b"{\"size\":3}"[..])
            .times(1)
            .returning(|_, _| {
                Ok(InvokeOutput {
                    status_code: 200,
                    payload: b"ok".to_vec(),
                })
            });

        let task = FunctionInvokeTask::new(Arc::new(invoker), "resize", "{\"size\":3}");
        assert!(task.execute().await.is_ok());
    }

    #[tokio::test]
    async fn test_function_invoke_task_failure() {
        let mut invoker = MockFunctionInvoker::new();
        invoker
            .expect_invoke()
            .returning(|_, _| Err(anyhow::anyhow!("status 500")));

        let task = FunctionInvokeTask::new(Arc::new(invoker), "resize", Vec::<u8>::new());
        match task.execute().await.unwrap_err() {
            FlowError::Invoke { function, source } => {
                assert_eq!(function, "resize");
                assert_eq!(source.to_string(), "status 500");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invocation_url() {
        let invoker = HttpFunctionInvoker::new("http://localhost:9001/2015-03-31").unwrap();
        assert_eq!(
            invoker.invocation_url("resize").unwrap().as_str(),
            "http://localhost:9001/2015-03-31/functions/resize/invocations"
        );

        let invoker = HttpFunctionInvoker::new("http://localhost:9001").unwrap();
        assert_eq!(
            invoker.invocation_url("resize").unwrap().as_str(),
            "http://localhost:9001/functions/resize/invocations"
        );

        assert!(HttpFunctionInvoker::new("not a url").is_err());
    }
}
