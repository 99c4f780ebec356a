// src/engine/aggregate.rs
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AggregateError, FlowError, FlowResult};

/// Collects the failures of independently running units into one result.
///
/// Each unit launched through [`spawn`](Self::spawn) runs as its own tokio
/// task and reports at most one error. [`finish`](Self::finish) waits for
/// every unit before draining the collection point, so no report is dropped
/// or counted twice. An aggregator with no units finishes immediately.
pub struct ErrorAggregator {
    sender: mpsc::UnboundedSender<FlowError>,
    receiver: mpsc::UnboundedReceiver<FlowError>,
    units: Vec<(String, JoinHandle<()>)>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            units: Vec::new(),
        }
    }

    /// Launch `unit` immediately; its error, if any, is collected on `finish`.
    pub fn spawn<F>(&mut self, label: impl Into<String>, unit: F)
    where
        F: Future<Output = FlowResult<()>> + Send + 'static,
    {
        let label = label.into();
        let sender = self.sender.clone();
        let unit_label = label.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = unit.await {
                debug!("Unit {} reported: {}", unit_label, e);
                // The receiver lives until `finish` has joined this unit.
                let _ = sender.send(e);
            }
        });
        self.units.push((label, handle));
    }

    /// Record an error produced outside a spawned unit.
    pub fn report(&self, error: FlowError) {
        let _ = self.sender.send(error);
    }

    /// Number of units launched so far.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Wait for every unit, then combine whatever they reported.
    pub async fn finish(self) -> Result<(), AggregateError> {
        let Self {
            sender,
            mut receiver,
            units,
        } = self;

        for (label, handle) in units {
            if let Err(e) = handle.await {
                warn!("Unit {} did not complete: {}", label, e);
                let _ = sender.send(FlowError::Interrupted { task: label });
            }
        }
        drop(sender);

        let mut errors = Vec::new();
        while let Some(error) = receiver.recv().await {
            errors.push(error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(errors))
        }
    }
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn failure(id: &str) -> FlowError {
        FlowError::JobNotFound { job_id: id.to_string() }
    }

    async fn explode() -> FlowResult<()> {
        panic!("unit panicked")
    }

    #[tokio::test]
    async fn test_empty_aggregator_finishes_ok() {
        let aggregator = ErrorAggregator::new();
        assert!(aggregator.is_empty());
        assert!(aggregator.finish().await.is_ok());
    }

    #[tokio::test]
    async fn test_collects_every_failure_once() {
        let mut aggregator = ErrorAggregator::new();
        for i in 0..10u64 {
            aggregator.spawn(format!("unit-{}", i), async move {
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                if i % 3 == 0 {
                    Err(failure(&i.to_string()))
                } else {
                    Ok(())
                }
            });
        }
        assert_eq!(aggregator.len(), 10);

        let error = aggregator.finish().await.unwrap_err();
        assert_eq!(error.len(), 4);

        let mut ids: Vec<String> = error
            .into_errors()
            .into_iter()
            .map(|e| match e {
                FlowError::JobNotFound { job_id } => job_id,
                other => panic!("unexpected error: {}", other),
            })
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["0", "3", "6", "9"]);
    }

    #[tokio::test]
    async fn test_direct_reports_are_included() {
        let mut aggregator = ErrorAggregator::new();
        aggregator.report(failure("listing"));
        aggregator.spawn("ok", async { Ok(()) });

        let error = aggregator.finish().await.unwrap_err();
        assert_eq!(error.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_unit_is_reported_as_interrupted() {
        let mut aggregator = ErrorAggregator::new();
        aggregator.spawn("boom", explode());
        aggregator.spawn("fine", async { Ok(()) });

        let error = aggregator.finish().await.unwrap_err();
        assert_eq!(error.len(), 1);
        assert!(matches!(&error.errors()[0], FlowError::Interrupted { task } if task == "boom"));
    }
}
