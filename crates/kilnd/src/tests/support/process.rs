//! Process-level doubles: a shutdown signal that fires immediately and a
//! metrics sink that keeps every payload.

use std::sync::{Arc, Mutex};

use crate::metrics::{MetricsEndpoint, MetricsSink};
use crate::process::{ShutdownError, ShutdownSignal};

/// Shutdown signal that returns at once and counts how often it was awaited.
#[derive(Clone, Default)]
pub struct ImmediateShutdown {
    waits: Arc<Mutex<usize>>,
}

impl ImmediateShutdown {
    /// Number of times `wait` ran.
    #[must_use]
    pub fn waits(&self) -> usize {
        *self.waits.lock().expect("shutdown mutex poisoned")
    }
}

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&mut self) -> Result<(), ShutdownError> {
        *self.waits.lock().expect("shutdown mutex poisoned") += 1;
        Ok(())
    }
}

/// Metrics sink that records every payload.
#[derive(Default)]
pub struct RecordingMetricsSink {
    sent: Mutex<Vec<(MetricsEndpoint, String)>>,
}

impl RecordingMetricsSink {
    /// Payloads sent to the batch endpoint.
    #[must_use]
    pub fn batches(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("metrics sink mutex poisoned")
            .iter()
            .filter(|(endpoint, _)| *endpoint == MetricsEndpoint::Batch)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn send(&self, endpoint: MetricsEndpoint, _user_agent: Option<&str>, payload: &str) {
        self.sent
            .lock()
            .expect("metrics sink mutex poisoned")
            .push((endpoint, payload.to_owned()));
    }
}
