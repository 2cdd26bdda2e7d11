//! Configuration model
//!
//! [`ConfigurationData`] is what the configuration source hands to the
//! coordinator: gateway-wide settings plus one [`ServiceConfig`] per backend.
//! It is loaded from JSON and checked with [`ConfigurationData::validate`],
//! which reports every problem at once instead of stopping at the first.
//!
//! # Example
//!
//! ```json
//! {
//!   "gateway": { "name": "staging", "health_check_interval_ms": 10000 },
//!   "services": [
//!     {
//!       "name": "billing",
//!       "endpoint": "https://billing.internal",
//!       "auth": { "type": "bearer", "token": "..." },
//!       "timeout_ms": 5000,
//!       "retry": { "max_attempts": 2, "strategy": "fixed", "initial_delay_ms": 200 },
//!       "circuit_breaker": { "failure_threshold": 3 },
//!       "endpoints": ["GET /invoices", "GET /status"]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::error::{ApiprobeError, Result};
use crate::retry::RetryPolicy;

/// Path probed when no known path looks like a health endpoint.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

const HEALTH_PATH_KEYWORDS: [&str; 3] = ["health", "status", "ping"];

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerPolicy {
    /// Number of consecutive failures before tripping the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing (in milliseconds)
    pub recovery_timeout_ms: u64,
    /// Number of probe calls admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerPolicy {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Settings for one backend service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Base URL, e.g. `https://api.example.com/v1`
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerPolicy,
    /// Known paths, optionally prefixed by a method (`"GET /users"`)
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Explicit health path, bypassing the guess from `endpoints`
    #[serde(default)]
    pub health_path: Option<String>,
    /// Headers sent with every request to this service
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ServiceConfig {
    /// Creates a service with default policies and no authentication.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            auth: AuthConfig::disabled(),
            timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerPolicy::default(),
            endpoints: Vec::new(),
            health_path: None,
            default_headers: BTreeMap::new(),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, policy: CircuitBreakerPolicy) -> Self {
        self.circuit_breaker = policy;
        self
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Path used for health checks.
    ///
    /// An explicit `health_path` wins. Otherwise the first known path
    /// containing "health", "status" or "ping" (case-insensitive) is used,
    /// falling back to [`DEFAULT_HEALTH_PATH`].
    pub fn health_path(&self) -> String {
        if let Some(path) = self.health_path.as_deref().map(str::trim) {
            if !path.is_empty() {
                return path.to_string();
            }
        }

        self.endpoints
            .iter()
            .find(|entry| {
                let lower = entry.to_ascii_lowercase();
                HEALTH_PATH_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .map(|entry| path_of(entry))
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string())
    }

    /// Checks this service in isolation, prefixing messages with its name.
    pub fn validate(&self) -> Vec<String> {
        let label = if self.name.trim().is_empty() {
            "<unnamed>".to_string()
        } else {
            self.name.clone()
        };
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("service name must not be empty".to_string());
        }

        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            errors.push(format!("service '{}': missing endpoint", label));
        } else if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            errors.push(format!(
                "service '{}': endpoint '{}' must start with http:// or https://",
                label, endpoint
            ));
        }

        if let Err(e) = self.auth.resolve() {
            errors.push(format!("service '{}': {}", label, e));
        }

        if self.timeout_ms == 0 {
            errors.push(format!("service '{}': timeout_ms must be greater than 0", label));
        }

        for e in self.retry.validate() {
            errors.push(format!("service '{}': {}", label, e));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            errors.push(format!(
                "service '{}': circuit breaker failure_threshold must be at least 1",
                label
            ));
        }
        if self.circuit_breaker.half_open_max_calls == 0 {
            errors.push(format!(
                "service '{}': circuit breaker half_open_max_calls must be at least 1",
                label
            ));
        }

        errors
    }
}

/// Extracts the path from a `"METHOD /path"` entry.
fn path_of(entry: &str) -> String {
    let entry = entry.trim();
    let path = entry
        .split_whitespace()
        .find(|token| token.starts_with('/'))
        .unwrap_or(entry);
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Gateway-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub name: String,
    pub health_check_interval_ms: u64,
    pub health_check_enabled: bool,
    /// Grace period for the monitor loop to stop before it is aborted
    pub stop_grace_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            name: "apiprobe".to_string(),
            health_check_interval_ms: 30_000,
            health_check_enabled: true,
            stop_grace_ms: 5_000,
        }
    }
}

impl GatewaySettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Complete configuration handed to the coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationData {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl ConfigurationData {
    pub fn new(gateway: GatewaySettings, services: Vec<ServiceConfig>) -> Self {
        Self { gateway, services }
    }

    /// Parses a configuration from JSON text.
    ///
    /// Parsing only checks the shape; call [`validate`](Self::validate) for
    /// the semantic checks.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Returns every validation error; an empty list means the
    /// configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.services.is_empty() {
            errors.push("no services declared".to_string());
        }

        if self.gateway.health_check_interval_ms == 0 {
            errors.push("gateway health_check_interval_ms must be greater than 0".to_string());
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !service.name.trim().is_empty() && !seen.insert(service.name.as_str()) {
                errors.push(format!("duplicate service name '{}'", service.name));
            }
            errors.extend(service.validate());
        }

        errors
    }

    /// Validates and converts the error list into an `Err`.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiprobeError::InvalidConfiguration(errors))
        }
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;
    use std::io::Write;

    #[test]
    fn test_circuit_breaker_policy_default() {
        let policy = CircuitBreakerPolicy::default();
        assert_eq!(policy.failure_threshold, 5);
        assert_eq!(policy.recovery_timeout(), Duration::from_secs(60));
        assert_eq!(policy.half_open_max_calls, 3);
    }

    #[test]
    fn test_gateway_settings_default() {
        let gateway = GatewaySettings::default();
        assert_eq!(gateway.health_check_interval(), Duration::from_secs(30));
        assert!(gateway.health_check_enabled);
        assert_eq!(gateway.stop_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_minimal_configuration() {
        let config = ConfigurationData::from_json_str(
            r#"{"services": [{"name": "users", "endpoint": "http://127.0.0.1:9000"}]}"#,
        )
        .unwrap();

        assert_eq!(config.gateway, GatewaySettings::default());
        let users = config.service("users").unwrap();
        assert_eq!(users.timeout(), Duration::from_secs(30));
        assert_eq!(users.retry, RetryPolicy::default());
        assert_eq!(users.circuit_breaker, CircuitBreakerPolicy::default());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full_configuration() {
        let config = ConfigurationData::from_json_str(
            r#"{
                "gateway": {"name": "staging", "health_check_interval_ms": 1000, "health_check_enabled": false},
                "services": [{
                    "name": "billing",
                    "endpoint": "https://billing.internal",
                    "auth": {"type": "bearer", "token": "t"},
                    "timeout_ms": 1500,
                    "retry": {"max_attempts": 2, "strategy": "linear", "initial_delay_ms": 10, "max_delay_ms": 100, "jitter": false},
                    "circuit_breaker": {"failure_threshold": 2, "recovery_timeout_ms": 500, "half_open_max_calls": 1},
                    "endpoints": ["GET /invoices", "GET /Status"],
                    "default_headers": {"Accept": "application/json"}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.gateway.name, "staging");
        assert!(!config.gateway.health_check_enabled);
        let billing = &config.services[0];
        assert_eq!(billing.timeout(), Duration::from_millis(1500));
        assert_eq!(billing.retry.strategy, BackoffStrategy::Linear);
        assert_eq!(billing.circuit_breaker.half_open_max_calls, 1);
        assert_eq!(billing.health_path(), "/Status");
        assert_eq!(billing.default_headers.get("Accept").unwrap(), "application/json");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_health_path_guessing() {
        let svc = ServiceConfig::new("a", "http://x");
        assert_eq!(svc.health_path(), "/health");

        let svc = ServiceConfig::new("a", "http://x").with_endpoints(["GET /users", "POST /orders"]);
        assert_eq!(svc.health_path(), "/health");

        let svc = ServiceConfig::new("a", "http://x").with_endpoints(["GET /users", "GET /v1/PING"]);
        assert_eq!(svc.health_path(), "/v1/PING");

        let svc = ServiceConfig::new("a", "http://x").with_endpoints(["healthz"]);
        assert_eq!(svc.health_path(), "/healthz");

        let mut svc =
            ServiceConfig::new("a", "http://x").with_endpoints(["GET /status"]);
        svc.health_path = Some("/ready".to_string());
        assert_eq!(svc.health_path(), "/ready");
    }

    #[test]
    fn test_validate_empty_configuration() {
        let config = ConfigurationData::default();
        assert_eq!(config.validate(), vec!["no services declared".to_string()]);
        assert!(matches!(
            config.ensure_valid(),
            Err(ApiprobeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_aggregates_errors() {
        let mut bad_auth = ServiceConfig::new("auth", "http://127.0.0.1:1");
        bad_auth.auth.auth_type = "kerberos".to_string();

        let config = ConfigurationData::new(
            GatewaySettings::default(),
            vec![
                ServiceConfig::new("missing", ""),
                ServiceConfig::new("scheme", "ftp://host"),
                bad_auth,
                ServiceConfig::new("dup", "http://a"),
                ServiceConfig::new("dup", "http://b"),
            ],
        );

        let errors = config.validate();
        assert_eq!(errors.len(), 4, "errors: {:?}", errors);
        assert!(errors.iter().any(|e| e.contains("'missing': missing endpoint")));
        assert!(errors.iter().any(|e| e.contains("ftp://host")));
        assert!(errors.iter().any(|e| e.contains("unknown auth type 'kerberos'")));
        assert!(errors.iter().any(|e| e.contains("duplicate service name 'dup'")));
    }

    #[test]
    fn test_validate_policies() {
        let mut svc = ServiceConfig::new("svc", "http://x");
        svc.timeout_ms = 0;
        svc.circuit_breaker.failure_threshold = 0;
        svc.circuit_breaker.half_open_max_calls = 0;
        svc.retry.initial_delay_ms = 10;
        svc.retry.max_delay_ms = 5;

        assert_eq!(svc.validate().len(), 4);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"services": [{{"name": "svc", "endpoint": "http://127.0.0.1:1"}}]}}"#
        )
        .unwrap();

        let config = ConfigurationData::from_file(file.path()).unwrap();
        assert_eq!(config.services.len(), 1);
    }

    #[test]
    fn test_from_file_missing() {
        let result = ConfigurationData::from_file("/nonexistent/apiprobe.json");
        match result {
            Err(ApiprobeError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_str_invalid() {
        let result = ConfigurationData::from_json_str("{ not json");
        assert!(matches!(result, Err(ApiprobeError::JsonSerialization(_))));
    }
}
