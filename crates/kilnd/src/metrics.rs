//! Usage metrics for a development server run.
//!
//! [`UsageMetrics`] is built by the entry point and handed to whichever
//! components report usage. It has an explicit lifecycle: [`UsageMetrics::init`]
//! records a start event, [`UsageMetrics::log_once_on_stop`] collects
//! deduplicated events, and [`UsageMetrics::shutdown`] records the run time
//! and flushes the collected events as one batch. Without a client id every
//! call is a no-op.
//!
//! Events are encoded as `application/x-www-form-urlencoded` pairs and handed
//! to a [`MetricsSink`].

use std::collections::BTreeSet;
use std::io::{self, IsTerminal};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::debug;
use url::form_urlencoded;

const METRICS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::metrics");

const PROTOCOL_VERSION: &str = "1";
const TRACKING_ID: &str = "kiln-devserver";
const EVENT_TYPE: &str = "event";
const INTERACTIVE_DIMENSION: &str = "cd1";
const RUNTIMES_DIMENSION: &str = "cd2";

/// Category for server lifecycle events.
pub const DEVSERVER_CATEGORY: &str = "devserver";
/// Category for API emulation usage.
pub const API_STUB_USAGE_CATEGORY: &str = "api_stub_usage";
/// Category for admin handler usage.
pub const ADMIN_CONSOLE_CATEGORY: &str = "admin_console";
/// Action recorded when the server starts.
pub const START_ACTION: &str = "start";
/// Action recorded when the server stops.
pub const STOP_ACTION: &str = "stop";
/// Action recorded when startup fails.
pub const ERROR_ACTION: &str = "error";

/// Destination of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsEndpoint {
    /// A single event.
    Collect,
    /// Newline-separated events.
    Batch,
}

/// Receives encoded metrics payloads.
pub trait MetricsSink: Send + Sync {
    /// Delivers `payload`. Delivery failures must not reach the caller.
    fn send(&self, endpoint: MetricsEndpoint, user_agent: Option<&str>, payload: &str);
}

/// Sink that writes payloads to the `kilnd::metrics` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn send(&self, endpoint: MetricsEndpoint, user_agent: Option<&str>, payload: &str) {
        debug!(
            target: METRICS_TARGET,
            endpoint = ?endpoint,
            user_agent = user_agent.unwrap_or_default(),
            payload,
            "usage metrics"
        );
    }
}

/// One metrics event before encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetricsEvent {
    /// Event category.
    pub category: String,
    /// Event action.
    pub action: String,
    /// Optional label.
    pub label: Option<String>,
    /// Optional value; zero is omitted when encoded.
    pub value: Option<u64>,
}

impl MetricsEvent {
    /// Builds an event.
    #[must_use]
    pub fn new(category: &str, action: &str, label: Option<&str>, value: Option<u64>) -> Self {
        Self {
            category: category.to_owned(),
            action: action.to_owned(),
            label: label.map(str::to_owned),
            value,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    client_id: String,
    user_agent: Option<String>,
    runtimes: Option<String>,
    started: Option<Instant>,
    pending: BTreeSet<MetricsEvent>,
}

/// Usage metrics context for one server run.
pub struct UsageMetrics {
    sink: Arc<dyn MetricsSink>,
    interactive: bool,
    session: Mutex<Option<Session>>,
}

impl UsageMetrics {
    /// Builds an inactive context delivering to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            interactive: io::stdin().is_terminal(),
            session: Mutex::new(None),
        }
    }

    /// Starts a session and records the start event.
    ///
    /// Without a `client_id` the context stays inactive.
    pub fn init<'a>(
        &self,
        client_id: Option<&str>,
        user_agent: Option<&str>,
        runtimes: impl IntoIterator<Item = &'a str>,
    ) {
        let Some(client_id) = client_id.filter(|id| !id.is_empty()) else {
            return;
        };
        let runtimes: BTreeSet<&str> = runtimes.into_iter().collect();
        let runtimes = (!runtimes.is_empty())
            .then(|| runtimes.into_iter().collect::<Vec<_>>().join(","));
        *self.lock() = Some(Session {
            client_id: client_id.to_owned(),
            user_agent: user_agent.map(str::to_owned),
            runtimes,
            started: Some(Instant::now()),
            pending: BTreeSet::new(),
        });
        self.log(DEVSERVER_CATEGORY, START_ACTION, None, None);
    }

    /// Whether a session is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().is_some()
    }

    /// Sends one event immediately.
    pub fn log(&self, category: &str, action: &str, label: Option<&str>, value: Option<u64>) {
        let guard = self.lock();
        let Some(session) = guard.as_ref() else {
            return;
        };
        let payload = self.encode(session, &MetricsEvent::new(category, action, label, value));
        self.sink.send(
            MetricsEndpoint::Collect,
            session.user_agent.as_deref(),
            &payload,
        );
    }

    /// Stores an event for the batch sent at shutdown; repeats are dropped.
    pub fn log_once_on_stop(
        &self,
        category: &str,
        action: &str,
        label: Option<&str>,
        value: Option<u64>,
    ) {
        if let Some(session) = self.lock().as_mut() {
            session
                .pending
                .insert(MetricsEvent::new(category, action, label, value));
        }
    }

    /// Records the run time and flushes the stored events, ending the session.
    pub fn shutdown(&self) {
        let Some(mut session) = self.lock().take() else {
            return;
        };
        let run_seconds = session
            .started
            .map_or(0, |started| started.elapsed().as_secs());
        session.pending.insert(MetricsEvent::new(
            DEVSERVER_CATEGORY,
            STOP_ACTION,
            None,
            Some(run_seconds),
        ));
        let batch = session
            .pending
            .iter()
            .map(|event| self.encode(&session, event))
            .collect::<Vec<_>>()
            .join("\n");
        self.sink.send(
            MetricsEndpoint::Batch,
            session.user_agent.as_deref(),
            &batch,
        );
    }

    fn encode(&self, session: &Session, event: &MetricsEvent) -> String {
        let mut pairs = form_urlencoded::Serializer::new(String::new());
        pairs
            .append_pair("v", PROTOCOL_VERSION)
            .append_pair("tid", TRACKING_ID)
            .append_pair("t", EVENT_TYPE)
            .append_pair("cid", &session.client_id)
            .append_pair(
                INTERACTIVE_DIMENSION,
                if self.interactive { "true" } else { "false" },
            );
        if let Some(runtimes) = session.runtimes.as_deref() {
            pairs.append_pair(RUNTIMES_DIMENSION, runtimes);
        }
        pairs
            .append_pair("ec", &event.category)
            .append_pair("ea", &event.action);
        if let Some(label) = event.label.as_deref().filter(|label| !label.is_empty()) {
            pairs.append_pair("el", label);
        }
        if let Some(value) = event.value.filter(|value| *value != 0) {
            pairs.append_pair("ev", &value.to_string());
        }
        pairs.finish()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(MetricsEndpoint, String)>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(MetricsEndpoint, String)> {
            self.sent.lock().expect("sink mutex poisoned").clone()
        }
    }

    impl MetricsSink for RecordingSink {
        fn send(&self, endpoint: MetricsEndpoint, _user_agent: Option<&str>, payload: &str) {
            self.sent
                .lock()
                .expect("sink mutex poisoned")
                .push((endpoint, payload.to_owned()));
        }
    }

    #[fixture]
    fn sink() -> Arc<RecordingSink> {
        Arc::new(RecordingSink::default())
    }

    fn metrics(sink: &Arc<RecordingSink>) -> UsageMetrics {
        let sink: Arc<dyn MetricsSink> = sink.clone();
        UsageMetrics::new(sink)
    }

    #[rstest]
    fn inactive_without_client_id(sink: Arc<RecordingSink>) {
        let metrics = metrics(&sink);
        metrics.init(None, None, ["python"]);
        metrics.log(DEVSERVER_CATEGORY, ERROR_ACTION, Some("boom"), None);
        metrics.log_once_on_stop(ADMIN_CONSOLE_CATEGORY, "ModulesHandler.get", None, None);
        metrics.shutdown();
        assert!(!metrics.is_enabled());
        assert!(sink.sent().is_empty());
    }

    #[rstest]
    fn init_sends_a_start_event(sink: Arc<RecordingSink>) {
        let metrics = metrics(&sink);
        metrics.init(Some("client-1"), Some("kiln/1.0"), ["python", "go", "python"]);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        let (endpoint, payload) = &sent[0];
        assert_eq!(*endpoint, MetricsEndpoint::Collect);
        assert!(payload.starts_with("v=1&tid=kiln-devserver&t=event&cid=client-1&cd1="));
        assert!(payload.contains("&cd2=go%2Cpython&"));
        assert!(payload.ends_with("&ec=devserver&ea=start"));
    }

    #[rstest]
    fn labels_are_url_encoded(sink: Arc<RecordingSink>) {
        let metrics = metrics(&sink);
        metrics.init(Some("client-1"), None, Vec::<&str>::new());
        metrics.log(DEVSERVER_CATEGORY, ERROR_ACTION, Some("bind failed: 8080"), Some(3));
        let (_, payload) = sink.sent().pop().expect("error event sent");
        assert!(!payload.contains("cd2="));
        assert!(payload.ends_with("&ea=error&el=bind+failed%3A+8080&ev=3"));
    }

    #[rstest]
    fn shutdown_flushes_deduplicated_events_once(sink: Arc<RecordingSink>) {
        let metrics = metrics(&sink);
        metrics.init(Some("client-1"), None, ["go"]);
        metrics.log_once_on_stop(ADMIN_CONSOLE_CATEGORY, "ModulesHandler.get", None, None);
        metrics.log_once_on_stop(ADMIN_CONSOLE_CATEGORY, "ModulesHandler.get", None, None);
        metrics.log_once_on_stop(API_STUB_USAGE_CATEGORY, "use-datastore", None, None);
        metrics.shutdown();
        metrics.shutdown();

        let sent = sink.sent();
        assert_eq!(sent.len(), 2, "start event plus one batch: {sent:?}");
        let (endpoint, batch) = &sent[1];
        assert_eq!(*endpoint, MetricsEndpoint::Batch);
        let lines: Vec<&str> = batch.lines().collect();
        assert_eq!(lines.len(), 3, "unexpected batch: {batch}");
        assert!(lines.iter().any(|line| line.contains("ea=ModulesHandler.get")));
        assert!(lines.iter().any(|line| line.contains("ec=devserver&ea=stop")));
        assert!(!metrics.is_enabled());
    }
}
