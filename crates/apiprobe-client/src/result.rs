use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Body of a backend response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
    /// The content type announced JSON but the body did not parse
    Invalid { raw: String, error: String },
}

impl ResponseBody {
    /// Decodes a body according to its content type.
    ///
    /// Never fails: undecodable JSON degrades to [`ResponseBody::Invalid`].
    pub fn decode(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return ResponseBody::Empty;
        }

        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        if is_json {
            match serde_json::from_slice(bytes) {
                Ok(value) => ResponseBody::Json(value),
                Err(e) => ResponseBody::Invalid {
                    raw: String::from_utf8_lossy(bytes).into_owned(),
                    error: format!("Failed to parse JSON response: {}", e),
                },
            }
        } else {
            ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// Outcome of one logical call, including all retries.
///
/// Every failure mode is encoded here; executors never return errors.
#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    pub success: bool,
    /// HTTP status, or 0 if no response was ever received
    pub status_code: u16,
    pub body: ResponseBody,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub error: Option<String>,
    pub retry_attempts: u32,
    pub circuit_breaker_triggered: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

impl RequestResult {
    /// Result for a call rejected by an open circuit.
    pub fn circuit_open(service: &str) -> Self {
        Self {
            success: false,
            status_code: 503,
            body: ResponseBody::Empty,
            headers: BTreeMap::new(),
            elapsed: Duration::ZERO,
            error: Some(format!("Circuit breaker is open for service '{}'", service)),
            retry_attempts: 0,
            circuit_breaker_triggered: true,
        }
    }

    /// Result for a call to a service nobody registered.
    pub fn unknown_service(service: &str) -> Self {
        Self {
            success: false,
            status_code: 404,
            body: ResponseBody::Empty,
            headers: BTreeMap::new(),
            elapsed: Duration::ZERO,
            error: Some(format!("Service '{}' not found", service)),
            retry_attempts: 0,
            circuit_breaker_triggered: false,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    /// Human-readable reason for a failure, if any.
    pub fn error_message(&self) -> String {
        match (&self.error, self.status_code) {
            (Some(e), _) => e.clone(),
            (None, 0) => "No response received".to_string(),
            (None, status) => format!("HTTP {}", status),
        }
    }
}
