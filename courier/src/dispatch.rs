//! Outbound HTTP dispatch.
//!
//! One attempt is one HTTP GET to the row's denormalized URL. The dispatcher
//! never interprets the response; classification lives with the processor.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::queue::QueueRow;

pub const USER_AGENT: &str = "Webhook-Processor/1.0";

/// What a single outbound call produced.
///
/// `transport_error` is set when no HTTP response was obtained (DNS, connect,
/// TLS, timeout, body read); otherwise `http_status` and `body` carry the
/// response. `duration` is wall time from send to return, always set.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub http_status: Option<u16>,
    pub body: String,
    pub duration: Duration,
    pub transport_error: Option<String>,
}

impl DispatchOutcome {
    /// Success iff a response was obtained with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none()
            && matches!(self.http_status, Some(code) if (200..300).contains(&code))
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, row: &QueueRow) -> DispatchOutcome;
}

/// Settings for the shared outbound client.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Per-call timeout.
    pub timeout: Duration,
    /// Idle connections kept per host for reuse.
    pub max_idle_conns: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_idle_conns: 10,
        }
    }
}

/// Production dispatcher over a pooled reqwest client, shared by all workers.
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_conns)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build webhook HTTP client: {e}"))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send(&self, row: &QueueRow) -> DispatchOutcome {
        let start = Instant::now();

        // The URL is used verbatim, query string included.
        let response = self
            .client
            .get(&row.webhook_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => DispatchOutcome {
                        http_status: Some(status),
                        body,
                        duration: start.elapsed(),
                        transport_error: None,
                    },
                    Err(e) => DispatchOutcome {
                        http_status: None,
                        body: String::new(),
                        duration: start.elapsed(),
                        transport_error: Some(format!("failed to read response body: {e}")),
                    },
                }
            }
            Err(e) => DispatchOutcome {
                http_status: None,
                body: String::new(),
                duration: start.elapsed(),
                transport_error: Some(e.to_string()),
            },
        }
    }
}

/// Scripted outcome for [`MockDispatcher`].
#[derive(Debug, Clone)]
pub struct MockOutcome {
    http_status: Option<u16>,
    body: String,
    transport_error: Option<String>,
    delay: Duration,
}

impl MockOutcome {
    pub fn status(code: u16, body: &str) -> Self {
        Self {
            http_status: Some(code),
            body: body.to_string(),
            transport_error: None,
            delay: Duration::ZERO,
        }
    }

    pub fn transport_error(message: &str) -> Self {
        Self {
            http_status: None,
            body: String::new(),
            transport_error: Some(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    /// Hold the call open for the given duration before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct MockInner {
    script: VecDeque<MockOutcome>,
    default: Option<MockOutcome>,
    calls: Vec<String>,
}

/// Test dispatcher that replays a scripted outcome queue.
///
/// Scripted outcomes are consumed in order; once the script is exhausted the
/// default outcome (200 `{"ok":true}` unless overridden) is repeated.
#[derive(Default)]
pub struct MockDispatcher {
    inner: Mutex<MockInner>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: MockOutcome) {
        self.inner.lock().script.push_back(outcome);
    }

    /// Outcome returned once the script is exhausted.
    pub fn set_default(&self, outcome: MockOutcome) {
        self.inner.lock().default = Some(outcome);
    }

    /// URLs of all sends, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn send(&self, row: &QueueRow) -> DispatchOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            inner.calls.push(row.webhook_url.clone());
            inner.script.pop_front().unwrap_or_else(|| {
                inner
                    .default
                    .clone()
                    .unwrap_or_else(|| MockOutcome::status(200, r#"{"ok":true}"#))
            })
        };

        if !outcome.delay.is_zero() {
            tokio::time::sleep(outcome.delay).await;
        }

        DispatchOutcome {
            http_status: outcome.http_status,
            body: outcome.body,
            duration: outcome.delay,
            transport_error: outcome.transport_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{EventType, QueueStatus};
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row_for(url: &str) -> QueueRow {
        QueueRow {
            id: 1,
            queue_id: Uuid::new_v4(),
            event_type: EventType::Credit,
            event_id: "e1".to_string(),
            config_id: 1,
            webhook_url: url.to_string(),
            status: QueueStatus::Processing,
            retry_count: 0,
            next_retry_at: Utc::now(),
            last_http_status: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn sends_get_with_expected_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hook"))
            .and(header("User-Agent", USER_AGENT))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(&DispatcherConfig::default()).unwrap();
        let outcome = dispatcher.send(&row_for(&format!("{}/hook", server.uri()))).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.http_status, Some(200));
        assert_eq!(outcome.body, r#"{"ok":true}"#);
        assert!(outcome.transport_error.is_none());
    }

    #[tokio::test]
    async fn url_is_used_verbatim_including_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hook"))
            .and(query_param("token", "abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(&DispatcherConfig::default()).unwrap();
        let outcome = dispatcher
            .send(&row_for(&format!("{}/hook?token=abc", server.uri())))
            .await;

        assert_eq!(outcome.http_status, Some(204));
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(&DispatcherConfig::default()).unwrap();
        let outcome = dispatcher.send(&row_for(&server.uri())).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.http_status, Some(503));
        assert_eq!(outcome.body, "unavailable");
        assert!(outcome.transport_error.is_none());
    }

    #[tokio::test]
    async fn connection_refused_yields_transport_error() {
        // Nothing listens on this port.
        let dispatcher = HttpDispatcher::new(&DispatcherConfig::default()).unwrap();
        let outcome = dispatcher.send(&row_for("http://127.0.0.1:1/hook")).await;

        assert!(!outcome.is_success());
        assert!(outcome.http_status.is_none());
        assert!(outcome.transport_error.is_some());
    }

    #[tokio::test]
    async fn per_call_timeout_is_honored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(&DispatcherConfig {
            timeout: Duration::from_millis(100),
            max_idle_conns: 1,
        })
        .unwrap();
        let outcome = dispatcher.send(&row_for(&server.uri())).await;

        assert!(!outcome.is_success());
        assert!(outcome.transport_error.is_some());
        assert!(outcome.duration >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn mock_replays_script_then_default() {
        let mock = MockDispatcher::new();
        mock.push(MockOutcome::status(503, "unavailable"));
        mock.push(MockOutcome::transport_error("connection refused"));

        let row = row_for("https://example.com/hook");

        let first = mock.send(&row).await;
        assert_eq!(first.http_status, Some(503));

        let second = mock.send(&row).await;
        assert_eq!(second.transport_error.as_deref(), Some("connection refused"));

        let third = mock.send(&row).await;
        assert!(third.is_success());

        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.calls()[0], "https://example.com/hook");
    }
}
