use apiprobe_common::error::{ApiprobeError, Result};
use apiprobe_common::{AuthScheme, ServiceConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::result::{RequestResult, ResponseBody};

/// Response of a single attempt.
struct AttemptResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: ResponseBody,
}

/// HTTP executor for one service.
///
/// Wraps every call in circuit breaker gating, auth header injection and
/// retry with backoff. [`execute`](Self::execute) never fails: transport
/// errors, timeouts and HTTP error statuses are all reported through the
/// returned [`RequestResult`].
///
/// # HTTP Session
///
/// The executor owns one `reqwest::Client` (and with it a connection pool)
/// that is created on first use and dropped by [`close`](Self::close).
/// Calls already in flight hold their own handle to the client and finish
/// normally after `close`.
///
/// # Retry Logic
///
/// - 2xx/3xx: success, the breaker records a success
/// - errors where [`ApiprobeError::is_retryable`] is true (5xx, timeout,
///   transport error): retried up to `retry.max_attempts` times, sleeping
///   `retry.delay_for_attempt(n)` between attempts
/// - anything else, 4xx included: failure returned immediately
///
/// When retries are exhausted the breaker records one failure for the call.
/// A call dropped before it finishes records nothing and hands its
/// half-open slot back.
pub struct RequestExecutor {
    config: Arc<ServiceConfig>,
    auth: AuthScheme,
    breaker: CircuitBreaker,
    client: Mutex<Option<Client>>,
}

impl RequestExecutor {
    /// Creates an executor for a service.
    ///
    /// # Errors
    ///
    /// Returns `ApiprobeError::Config` if the service's auth settings do not
    /// resolve to a usable scheme.
    pub fn new(config: impl Into<Arc<ServiceConfig>>) -> Result<Self> {
        let config = config.into();
        let auth = config
            .auth
            .resolve()
            .map_err(|e| ApiprobeError::Config(format!("service '{}': {}", config.name, e)))?;
        let breaker = CircuitBreaker::new(config.name.clone(), config.circuit_breaker.clone());

        Ok(Self {
            config,
            auth,
            breaker,
            client: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Whether the HTTP session has been created and not yet closed.
    pub fn has_session(&self) -> bool {
        self.client_slot().is_some()
    }

    fn client_slot(&self) -> MutexGuard<'_, Option<Client>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session, creating it on first use.
    fn client(&self) -> Result<Client> {
        let mut slot = self.client_slot();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| ApiprobeError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        debug!(service = %self.config.name, "Created HTTP session");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Releases the HTTP session.
    pub fn close(&self) {
        if self.client_slot().take().is_some() {
            debug!(service = %self.config.name, "Closed HTTP session");
        }
    }

    /// Joins the service base URL and a request path.
    ///
    /// Absolute `http://` / `https://` paths are used unchanged.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.endpoint.trim().trim_end_matches('/');
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Builds the header map: service defaults, then auth, then per-call headers.
    fn build_headers(&self, extra: Option<&HashMap<String, String>>) -> Result<HeaderMap> {
        fn insert(map: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiprobeError::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiprobeError::Config(format!("Invalid value for header '{}': {}", name, e)))?;
            map.insert(name, value);
            Ok(())
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.default_headers {
            insert(&mut headers, name, value)?;
        }
        if let Some((name, value)) = self.auth.header() {
            insert(&mut headers, name, &value)?;
        }
        if let Some(extra) = extra {
            for (name, value) in extra {
                insert(&mut headers, name, value)?;
            }
        }
        Ok(headers)
    }

    fn classify(&self, err: reqwest::Error) -> ApiprobeError {
        if err.is_timeout() {
            return ApiprobeError::Timeout(self.config.timeout_ms);
        }

        // reqwest's top-level message hides the cause (refused, reset, DNS)
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        ApiprobeError::Transport(message)
    }

    async fn send_once(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&Value>,
    ) -> Result<AttemptResponse> {
        let mut request = client.request(method.clone(), url).headers(headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(AttemptResponse {
            status,
            headers,
            body: ResponseBody::decode(content_type.as_deref(), &bytes),
        })
    }

    /// Executes one logical call against the service.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Path relative to the service endpoint
    /// * `headers` - Extra headers for this call only
    /// * `body` - JSON body, if any
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        headers: Option<&HashMap<String, String>>,
        body: Option<&Value>,
    ) -> RequestResult {
        let start = Instant::now();
        let url = self.url_for(path);

        let header_map = match self.build_headers(headers) {
            Ok(map) => map,
            Err(e) => return local_failure(start, e),
        };

        let Some(permit) = self.breaker.try_acquire() else {
            debug!(service = %self.config.name, %url, "Rejected by open circuit");
            return RequestResult::circuit_open(&self.config.name);
        };

        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                permit.record_failure();
                return local_failure(start, e);
            }
        };

        let policy = &self.config.retry;
        let mut last_error = ApiprobeError::Transport("no attempt made".to_string());
        let mut last_response: Option<AttemptResponse> = None;

        for attempt in 0..=policy.max_attempts {
            debug!(
                service = %self.config.name,
                %method,
                %url,
                attempt = attempt + 1,
                "Sending request"
            );

            let error = match self.send_once(&client, &method, &url, &header_map, body).await {
                Ok(response) if response.status < 400 => {
                    permit.record_success();
                    return RequestResult {
                        success: true,
                        status_code: response.status,
                        body: response.body,
                        headers: response.headers,
                        elapsed: start.elapsed(),
                        error: None,
                        retry_attempts: attempt,
                        circuit_breaker_triggered: false,
                    };
                }
                Ok(response) => {
                    let error = ApiprobeError::from_status(response.status);
                    last_response = Some(response);
                    error
                }
                Err(e) => {
                    last_response = None;
                    e
                }
            };

            if !error.is_retryable() {
                permit.record_failure();
                return failure(start, error, last_response, attempt);
            }
            last_error = error;

            if attempt < policy.max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "Request to {} failed (attempt {}/{}): {}, retrying in {}ms",
                    url,
                    attempt + 1,
                    policy.max_attempts + 1,
                    last_error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }

        permit.record_failure();
        warn!(
            service = %self.config.name,
            "Request to {} failed after {} attempts: {}",
            url,
            policy.max_attempts + 1,
            last_error
        );

        failure(start, last_error, last_response, policy.max_attempts)
    }
}

/// Failure carrying the last response received, if any.
fn failure(
    start: Instant,
    error: ApiprobeError,
    response: Option<AttemptResponse>,
    retry_attempts: u32,
) -> RequestResult {
    let (status_code, body, headers) = match response {
        Some(r) => (r.status, r.body, r.headers),
        None => (0, ResponseBody::Empty, BTreeMap::new()),
    };

    RequestResult {
        success: false,
        status_code,
        body,
        headers,
        elapsed: start.elapsed(),
        error: Some(error.to_string()),
        retry_attempts,
        circuit_breaker_triggered: false,
    }
}

/// Failure that happened before anything was sent.
fn local_failure(start: Instant, error: ApiprobeError) -> RequestResult {
    RequestResult {
        success: false,
        status_code: 0,
        body: ResponseBody::Empty,
        headers: BTreeMap::new(),
        elapsed: start.elapsed(),
        error: Some(error.to_string()),
        retry_attempts: 0,
        circuit_breaker_triggered: false,
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("service", &self.config.name)
            .field("endpoint", &self.config.endpoint)
            .field("auth", &self.auth)
            .field("circuit", &self.breaker.state())
            .finish()
    }
}
