// webex/executor.rs

//! Rate-limit aware request execution.
//!
//! 429, 5xx and transport failures are retried following [`RetryPolicy`];
//! every other non-2xx status is returned immediately since retrying a
//! validation error or a conflict cannot change the answer.

use std::time::Duration;

use log::*;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{ApiRequest, WebexClient};
use super::outcome::{ApiFailure, ErrorKind, RequestOutcome};

/// Retry budget and delay schedule.
///
/// Defaults are 3 retries waiting 5s, 10s then 30s. The last delay is reused
/// when `max_retries` is larger than the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delays: Vec<Duration>,
    /// Pause after every attempt, to stay under platform rate limits.
    pub request_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
            request_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let index = (retry.max(1) - 1) as usize;
        self.delays
            .get(index)
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// An outcome together with how much work it took to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub outcome: RequestOutcome<T>,
    pub attempts: u32,
    /// Number of backoff delays slept, always `attempts - 1`.
    pub retries: u32,
}

/// Wraps a [`WebexClient`] with the retry policy. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Executor {
    client: WebexClient,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(client: WebexClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn client(&self) -> &WebexClient {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `request` to a terminal outcome and decodes a 2xx body as `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> RequestOutcome<T> {
        self.execute_traced(request).await.outcome
    }

    /// Same as [`Executor::execute`], also reporting attempt counts.
    pub async fn execute_traced<T: DeserializeOwned>(&self, request: &ApiRequest) -> Executed<T> {
        let mut attempts = 0;
        let mut retries = 0;
        loop {
            attempts += 1;
            let sent = self.client.send(request).await;
            if !self.policy.request_delay.is_zero() {
                tokio::time::sleep(self.policy.request_delay).await;
            }

            let (failure, retry_after) = match sent {
                Ok(response) if response.is_success() => {
                    if retries > 0 {
                        debug!(
                            "{} {} succeeded after {} attempts",
                            request.method, request.target, attempts
                        );
                    }
                    return Executed {
                        outcome: decode_body(&response.body),
                        attempts,
                        retries,
                    };
                }
                Ok(response) => (
                    ApiFailure::from_response(response.status, &response.body),
                    response.retry_after,
                ),
                Err(err) => (ApiFailure::from(err), None),
            };

            if !failure.kind.is_retryable() {
                debug!("{} {} failed: {}", request.method, request.target, failure);
                return Executed {
                    outcome: Err(failure),
                    attempts,
                    retries,
                };
            }
            if retries >= self.policy.max_retries {
                error!(
                    "{} {} gave up after {} attempts: {}",
                    request.method, request.target, attempts, failure
                );
                return Executed {
                    outcome: Err(failure),
                    attempts,
                    retries,
                };
            }

            retries += 1;
            let delay = retry_after.unwrap_or_else(|| self.policy.delay_for(retries));
            warn!(
                "{} {}: {}, retry {}/{} in {:?}",
                request.method, request.target, failure, retries, self.policy.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Decodes a 2xx body. Empty or non-JSON bodies count as success and are
/// decoded from `null` (or `{}` for structs with optional fields).
fn decode_body<T: DeserializeOwned>(body: &str) -> RequestOutcome<T> {
    let parsed = match serde_json::from_str::<Value>(body.trim()) {
        Ok(value) => value,
        Err(_) => {
            if !body.trim().is_empty() {
                debug!("non-JSON success body treated as empty: {body}");
            }
            Value::Null
        }
    };
    if parsed.is_null() {
        return serde_json::from_value(Value::Null)
            .or_else(|_| serde_json::from_value(Value::Object(Default::default())))
            .map_err(|e| {
                ApiFailure::new(
                    ErrorKind::Serialization,
                    format!("empty response cannot be decoded: {e}"),
                    None,
                )
            });
    }
    serde_json::from_value(parsed).map_err(|e| {
        ApiFailure::new(
            ErrorKind::Serialization,
            format!("unexpected response shape: {e}"),
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webex::test_support::{executor_for, fast_policy};
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Receipt {
        url: Option<String>,
    }

    #[test]
    fn should_reuse_last_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(30));
        assert_eq!(policy.delay_for(7), Duration::from_secs(30));
        let empty = RetryPolicy {
            delays: vec![],
            ..RetryPolicy::default()
        };
        assert_eq!(empty.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn should_decode_empty_success_bodies() {
        assert_eq!(decode_body::<Value>("").unwrap(), Value::Null);
        assert_eq!(decode_body::<()>("   ").unwrap(), ());
        assert_eq!(decode_body::<Receipt>("").unwrap(), Receipt::default());
        assert_eq!(decode_body::<Receipt>("Accepted").unwrap(), Receipt::default());
        assert_eq!(
            decode_body::<Receipt>(r#"{"url":"https://x/status"}"#).unwrap(),
            Receipt {
                url: Some("https://x/status".into())
            }
        );
    }

    #[test]
    fn should_reject_mismatched_shape() {
        let failure = decode_body::<Vec<u32>>(r#"{"a":1}"#).unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Serialization);
    }

    #[tokio::test]
    async fn should_succeed_after_two_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/wholesale/customers/c1"))
            .respond_with(ResponseTemplate::new(429).set_body_string("too many"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/wholesale/customers/c1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"url": "s"})))
            .mount(&server)
            .await;

        let executor = executor_for(&server);
        let executed = executor
            .execute_traced::<Receipt>(&ApiRequest::put("wholesale/customers/c1"))
            .await;

        assert_eq!(executed.attempts, 3);
        assert_eq!(executed.retries, 2);
        assert_eq!(executed.outcome.unwrap().url.as_deref(), Some("s"));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn should_give_up_after_three_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations/o1"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limit body"))
            .expect(4)
            .mount(&server)
            .await;

        let executed = executor_for(&server)
            .execute_traced::<Value>(&ApiRequest::get("organizations/o1"))
            .await;

        assert_eq!(executed.attempts, 4);
        assert_eq!(executed.retries, 3);
        let failure = executed.outcome.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::RateLimited);
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.message, "rate limit body");
    }

    #[tokio::test]
    async fn should_retry_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let executed = executor_for(&server)
            .execute_traced::<Value>(&ApiRequest::get("people/me"))
            .await;
        assert_eq!(executed.attempts, 2);
        assert_eq!(executed.outcome.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn should_report_server_error_once_retries_run_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/organizations"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(4)
            .mount(&server)
            .await;

        let executed = executor_for(&server)
            .execute_traced::<Value>(&ApiRequest::get("organizations"))
            .await;

        assert_eq!(executed.attempts, 4);
        let failure = executed.outcome.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Server);
        assert_eq!(failure.status, Some(502));
        assert_eq!(failure.message, "bad gateway");
    }

    #[rstest]
    #[case(400, ErrorKind::Validation)]
    #[case(401, ErrorKind::Authentication)]
    #[case(404, ErrorKind::NotFound)]
    #[case(409, ErrorKind::Conflict)]
    #[tokio::test]
    async fn should_not_retry_deterministic_errors(
        #[case] status: u16,
        #[case] expected: ErrorKind,
    ) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workspaces"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"message": "server says no"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let executed = executor_for(&server)
            .execute_traced::<Value>(&ApiRequest::post("workspaces"))
            .await;

        assert_eq!(executed.attempts, 1);
        assert_eq!(executed.retries, 0);
        let failure = executed.outcome.unwrap_err();
        assert_eq!(failure.kind, expected);
        assert_eq!(failure.status, Some(status));
        assert_eq!(failure.message, "server says no");
    }

    #[tokio::test]
    async fn should_retry_network_failures() {
        // Nothing listens on port 9 of the loopback interface.
        let client = WebexClient::new("http://127.0.0.1:9", "t").unwrap();
        let executor = Executor::new(client, fast_policy());

        let executed = executor
            .execute_traced::<Value>(&ApiRequest::get("people/me"))
            .await;

        assert_eq!(executed.attempts, 4);
        assert_eq!(
            executed.outcome.unwrap_err().kind,
            ErrorKind::TransientNetwork
        );
    }

    #[tokio::test]
    async fn should_honor_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let slow = RetryPolicy {
            delays: vec![Duration::from_secs(60)],
            ..fast_policy()
        };
        let client = WebexClient::new(&server.uri(), "t").unwrap();
        let executed = tokio::time::timeout(
            Duration::from_secs(10),
            Executor::new(client, slow).execute_traced::<Value>(&ApiRequest::get("people/me")),
        )
        .await
        .expect("Retry-After should replace the 60s delay");
        assert_eq!(executed.attempts, 2);
        assert_eq!(executed.outcome.unwrap(), Value::Null);
    }
}
