//! One-time passcode retrieval from a test inbox.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Errors from OTP sources
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// HTTP request failed
    #[cfg(feature = "otp")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service returned an error status
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// No message arrived in time
    #[error("No code for {recipient} after {ms}ms")]
    Timeout {
        /// Inbox address
        recipient: String,
        /// Time waited
        ms: u64,
    },
}

/// Anything that can hand out the latest code sent to an address
#[async_trait]
pub trait OtpSource: Send + Sync + std::fmt::Debug {
    /// Code from the newest message to `recipient` received after `since`
    async fn fetch_code(
        &self,
        recipient: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<String>, OtpError>;
}

/// Fixed code, for tests and manual runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticOtp(pub Option<String>);

#[async_trait]
impl OtpSource for StaticOtp {
    async fn fetch_code(
        &self,
        _recipient: &str,
        _since: DateTime<Utc>,
    ) -> Result<Option<String>, OtpError> {
        Ok(self.0.clone())
    }
}

fn otp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(\d{4,8})\b").unwrap_or_else(|e| panic!("invalid otp pattern: {e}"))
    })
}

/// First standalone 4-8 digit run, preferring a 6 digit one
#[must_use]
pub fn extract_otp(text: &str) -> Option<String> {
    let runs: Vec<&str> = otp_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    runs.iter()
        .find(|r| r.len() == 6)
        .or_else(|| runs.first())
        .map(|r| (*r).to_string())
}

#[cfg(feature = "otp")]
pub use mailosaur::MailosaurClient;

#[cfg(feature = "otp")]
mod mailosaur {
    use super::{extract_otp, OtpError, OtpSource};
    use crate::config::MailosaurSettings;
    use async_trait::async_trait;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::debug;

    const DEFAULT_ENDPOINT: &str = "https://mailosaur.com";

    #[derive(Debug, Deserialize)]
    struct SearchResult {
        #[serde(default)]
        items: Vec<MessageSummary>,
    }

    #[derive(Debug, Deserialize)]
    struct MessageSummary {
        id: String,
    }

    #[derive(Debug, Deserialize, Default)]
    struct MessageBody {
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        codes: Vec<Code>,
    }

    #[derive(Debug, Deserialize)]
    struct Code {
        value: String,
    }

    #[derive(Debug, Deserialize)]
    struct Message {
        #[serde(default)]
        subject: Option<String>,
        #[serde(default)]
        text: Option<MessageBody>,
        #[serde(default)]
        html: Option<MessageBody>,
    }

    impl Message {
        fn code(&self) -> Option<String> {
            let parts = [self.text.as_ref(), self.html.as_ref()];
            if let Some(code) = parts
                .iter()
                .flatten()
                .flat_map(|p| p.codes.iter())
                .map(|c| c.value.clone())
                .next()
            {
                return Some(code);
            }
            self.subject
                .as_deref()
                .and_then(extract_otp)
                .or_else(|| parts.iter().flatten().filter_map(|p| p.body.as_deref()).find_map(extract_otp))
        }
    }

    /// Mailosaur inbox client
    #[derive(Debug, Clone)]
    pub struct MailosaurClient {
        endpoint: String,
        settings: MailosaurSettings,
        client: reqwest::Client,
        poll_interval: Duration,
        wait: Duration,
    }

    impl MailosaurClient {
        /// Client for the hosted service
        pub fn new(settings: MailosaurSettings) -> Self {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default();
            Self {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                settings,
                client,
                poll_interval: Duration::from_secs(2),
                wait: Duration::from_secs(60),
            }
        }

        /// Point at another endpoint
        #[must_use]
        pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
            self.endpoint = endpoint.into().trim_end_matches('/').to_string();
            self
        }

        /// Polling cadence and overall wait
        #[must_use]
        pub const fn with_polling(mut self, interval: Duration, wait: Duration) -> Self {
            self.poll_interval = interval;
            self.wait = wait;
            self
        }

        /// Endpoint in use
        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn search(&self, recipient: &str, since: DateTime<Utc>) -> Result<Option<String>, OtpError> {
            let url = format!("{}/api/messages/search", self.endpoint);
            let received_after = since.to_rfc3339_opts(SecondsFormat::Millis, true);
            let resp = self
                .client
                .post(&url)
                .basic_auth(&self.settings.api_key, Some(""))
                .query(&[
                    ("server", self.settings.server_id.as_str()),
                    ("receivedAfter", received_after.as_str()),
                    ("page", "0"),
                    ("itemsPerPage", "1"),
                ])
                .json(&serde_json::json!({ "sentTo": recipient }))
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(OtpError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            let result: SearchResult = resp.json().await?;
            Ok(result.items.into_iter().next().map(|m| m.id))
        }

        async fn message(&self, id: &str) -> Result<Message, OtpError> {
            let url = format!("{}/api/messages/{id}", self.endpoint);
            let resp = self
                .client
                .get(&url)
                .basic_auth(&self.settings.api_key, Some(""))
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(OtpError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(resp.json().await?)
        }
    }

    #[async_trait]
    impl OtpSource for MailosaurClient {
        async fn fetch_code(
            &self,
            recipient: &str,
            since: DateTime<Utc>,
        ) -> Result<Option<String>, OtpError> {
            let deadline = tokio::time::Instant::now() + self.wait;
            loop {
                if let Some(id) = self.search(recipient, since).await? {
                    let message = self.message(&id).await?;
                    debug!(recipient, id = %id, "otp message received");
                    return Ok(message.code());
                }
                if tokio::time::Instant::now() + self.poll_interval > deadline {
                    return Err(OtpError::Timeout {
                        recipient: recipient.to_string(),
                        ms: self.wait.as_millis() as u64,
                    });
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_code_prefers_service_codes() {
            let msg: Message = serde_json::from_value(serde_json::json!({
                "subject": "Your code is 111111",
                "text": { "body": "Use 222222", "codes": [{ "value": "333333" }] }
            }))
            .unwrap();
            assert_eq!(msg.code().as_deref(), Some("333333"));
        }

        #[test]
        fn test_code_from_subject_then_body() {
            let msg: Message = serde_json::from_value(serde_json::json!({
                "subject": "Verify your payment",
                "html": { "body": "<p>Code: 482913</p>" }
            }))
            .unwrap();
            assert_eq!(msg.code().as_deref(), Some("482913"));
        }

        mod polling_tests {
            use super::*;
            use chrono::TimeZone;
            use wiremock::matchers::{basic_auth, body_json, method, path, query_param};
            use wiremock::{Mock, MockServer, ResponseTemplate};

            fn client(server: &MockServer) -> MailosaurClient {
                MailosaurClient::new(MailosaurSettings {
                    api_key: "key".into(),
                    server_id: "srv1".into(),
                })
                .with_endpoint(server.uri())
                .with_polling(Duration::from_millis(20), Duration::from_millis(300))
            }

            fn since() -> DateTime<Utc> {
                Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
            }

            async fn mount_message(server: &MockServer) {
                Mock::given(method("GET"))
                    .and(path("/api/messages/m1"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "subject": "Your verification code",
                        "text": { "body": "Use 482913 to continue" }
                    })))
                    .mount(server)
                    .await;
            }

            #[tokio::test]
            async fn test_search_filters_by_recipient_and_since() {
                let server = MockServer::start().await;
                Mock::given(method("POST"))
                    .and(path("/api/messages/search"))
                    .and(basic_auth("key", ""))
                    .and(query_param("server", "srv1"))
                    .and(query_param("receivedAfter", "2026-01-02T03:04:05.000Z"))
                    .and(body_json(serde_json::json!({ "sentTo": "qa@srv1.mailosaur.net" })))
                    .respond_with(
                        ResponseTemplate::new(200)
                            .set_body_json(serde_json::json!({ "items": [{ "id": "m1" }] })),
                    )
                    .expect(1)
                    .mount(&server)
                    .await;
                mount_message(&server).await;

                let code = client(&server)
                    .fetch_code("qa@srv1.mailosaur.net", since())
                    .await
                    .unwrap();
                assert_eq!(code.as_deref(), Some("482913"));
            }

            #[tokio::test]
            async fn test_polls_until_message_arrives() {
                let server = MockServer::start().await;
                Mock::given(method("POST"))
                    .and(path("/api/messages/search"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
                    .up_to_n_times(2)
                    .mount(&server)
                    .await;
                Mock::given(method("POST"))
                    .and(path("/api/messages/search"))
                    .respond_with(
                        ResponseTemplate::new(200)
                            .set_body_json(serde_json::json!({ "items": [{ "id": "m1" }] })),
                    )
                    .mount(&server)
                    .await;
                mount_message(&server).await;

                let code = client(&server).fetch_code("qa@inbox.test", since()).await.unwrap();
                assert_eq!(code.as_deref(), Some("482913"));
                let searches = server
                    .received_requests()
                    .await
                    .unwrap()
                    .iter()
                    .filter(|r| r.url.path() == "/api/messages/search")
                    .count();
                assert_eq!(searches, 3);
            }

            #[tokio::test]
            async fn test_empty_inbox_times_out() {
                let server = MockServer::start().await;
                Mock::given(method("POST"))
                    .and(path("/api/messages/search"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
                    .mount(&server)
                    .await;

                let err = client(&server)
                    .fetch_code("qa@inbox.test", since())
                    .await
                    .unwrap_err();
                assert!(matches!(err, OtpError::Timeout { ms: 300, .. }));
                assert!(server.received_requests().await.unwrap().len() >= 2);
            }

            #[tokio::test]
            async fn test_error_status_is_api_error() {
                let server = MockServer::start().await;
                Mock::given(method("POST"))
                    .and(path("/api/messages/search"))
                    .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
                    .mount(&server)
                    .await;

                let err = client(&server)
                    .fetch_code("qa@inbox.test", since())
                    .await
                    .unwrap_err();
                match err {
                    OtpError::Api { status, body } => {
                        assert_eq!(status, 401);
                        assert_eq!(body, "invalid api key");
                    }
                    other => panic!("expected API error, got {other}"),
                }
                // no retry on a rejected request
                assert_eq!(server.received_requests().await.unwrap().len(), 1);
            }
        }

        #[test]
        fn test_endpoint_override() {
            let client = MailosaurClient::new(MailosaurSettings {
                api_key: "k".into(),
                server_id: "s".into(),
            })
            .with_endpoint("http://127.0.0.1:9/");
            assert_eq!(client.endpoint(), "http://127.0.0.1:9");
        }
    }
}
