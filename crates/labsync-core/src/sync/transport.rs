//! HTTP access to the legacy rows endpoint.

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::config::LegacySettings;
use crate::error::{Error, Result};
use crate::util::compact_text;

/// One `GET .../tables/{table}/rows` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRequest {
    pub table: String,
    /// Query parameters in send order; repeated keys are allowed.
    pub query: Vec<(String, String)>,
}

impl LegacyRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            query: Vec::new(),
        }
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.query.push((key.to_string(), value.into()));
    }

    /// First value sent for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Every value sent for `key`, in order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .collect()
    }
}

/// Source of raw legacy row payloads.
#[allow(async_fn_in_trait)]
pub trait LegacyTransport {
    /// Perform one request and return the decoded JSON object.
    async fn get_rows(&self, request: &LegacyRequest) -> Result<Value>;
}

/// `reqwest` implementation talking to the real legacy service
#[derive(Debug, Clone)]
pub struct HttpTransport {
    settings: LegacySettings,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: LegacySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { settings, client })
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    fn rows_url(&self, table: &str) -> String {
        format!(
            "{}/api/v2/legacy/tables/{table}/rows",
            self.settings.base_url
        )
    }
}

impl LegacyTransport for HttpTransport {
    async fn get_rows(&self, request: &LegacyRequest) -> Result<Value> {
        let mut builder = self
            .client
            .get(self.rows_url(&request.table))
            .query(request.query.as_slice())
            .header(ACCEPT, "application/json");

        let credentials = &self.settings.credentials;
        if let Some(api_key) = &credentials.api_key {
            builder = builder.header("X-API-Key", api_key);
        }
        if let Some((user, password)) = &credentials.basic {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(parse_api_error(status, &body)));
        }

        let body = response.text().await?;
        parse_payload(&body)
    }
}

/// Decode a rows response body, insisting on a JSON object.
pub fn parse_payload(body: &str) -> Result<Value> {
    let payload: Value = serde_json::from_str(body).map_err(|error| {
        Error::InvalidPayload(format!("malformed JSON ({error}): {}", compact_text(body)))
    })?;
    if payload.is_object() {
        Ok(payload)
    } else {
        Err(Error::InvalidPayload(format!(
            "expected a JSON object, got: {}",
            compact_text(body)
        )))
    }
}

#[derive(Debug, Deserialize)]
struct LegacyErrorBody {
    detail: Option<Value>,
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<LegacyErrorBody>(body) {
        let detail = payload.detail.map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        });
        if let Some(message) = payload.message.or(payload.error).or(detail) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LegacyCredentials;

    #[test]
    fn request_keeps_repeated_parameters() {
        let mut request = LegacyRequest::new("iSPEC_Projects");
        request.push("fields", "a");
        request.push("limit", "10");
        request.push("fields", "b");
        assert_eq!(request.values("fields"), vec!["a", "b"]);
        assert_eq!(request.value("limit"), Some("10"));
        assert_eq!(request.value("since"), None);
    }

    #[test]
    fn rows_url_uses_table_path() {
        let transport =
            HttpTransport::new(LegacySettings::for_url("legacy.lab/").unwrap()).unwrap();
        assert_eq!(
            transport.rows_url("iSPEC_People"),
            "http://legacy.lab/api/v2/legacy/tables/iSPEC_People/rows"
        );
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        assert_eq!(
            parse_api_error(StatusCode::NOT_FOUND, r#"{"detail": "unknown table"}"#),
            "unknown table (404)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "  upstream down \n"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::UNAUTHORIZED, ""), "HTTP 401");
    }

    #[test]
    fn parse_payload_rejects_non_objects() {
        assert!(parse_payload(r#"{"items": []}"#).is_ok());
        assert!(matches!(
            parse_payload("[1, 2]"),
            Err(Error::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload("<html>"),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn transport_debug_redacts_credentials() {
        let mut settings = LegacySettings::for_url("legacy.lab").unwrap();
        settings.credentials = LegacyCredentials {
            api_key: Some("k3y".to_string()),
            basic: None,
        };
        let transport = HttpTransport::new(settings).unwrap();
        assert!(!format!("{transport:?}").contains("k3y"));
    }
}
