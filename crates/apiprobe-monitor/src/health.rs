use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Health status of a monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Never checked
    Unknown,
    /// A check is in flight
    Checking,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Checking => "checking",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Health record of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceHealthInfo {
    pub service_name: String,
    pub status: HealthStatus,
    pub last_check: Option<SystemTime>,
    /// Duration of the last successful check
    pub response_time: Option<Duration>,
    pub last_error: Option<String>,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_checks: u64,
}

impl ServiceHealthInfo {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Unknown,
            last_check: None,
            response_time: None,
            last_error: None,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_checks: 0,
        }
    }

    pub fn update_success(&mut self, response_time: Duration) {
        self.status = HealthStatus::Healthy;
        self.last_check = Some(SystemTime::now());
        self.response_time = Some(response_time);
        self.last_error = None;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
        self.total_checks = self.total_checks.saturating_add(1);
    }

    pub fn update_failure(&mut self, error: impl Into<String>) {
        self.status = HealthStatus::Unhealthy;
        self.last_check = Some(SystemTime::now());
        self.last_error = Some(error.into());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
        self.total_checks = self.total_checks.saturating_add(1);
    }

    /// `(total_checks - consecutive_failures) / total_checks * 100`.
    ///
    /// Only the current failure streak counts against uptime, so any success
    /// brings the figure back to 100.
    pub fn uptime_percentage(&self) -> f64 {
        if self.consecutive_failures == 0 || self.total_checks == 0 {
            return 100.0;
        }
        let failures = u64::from(self.consecutive_failures).min(self.total_checks);
        (self.total_checks - failures) as f64 / self.total_checks as f64 * 100.0
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

impl Serialize for ServiceHealthInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ServiceHealthInfo", 9)?;
        s.serialize_field("service_name", &self.service_name)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("last_check_ms", &self.last_check.map(unix_millis))?;
        s.serialize_field(
            "response_time_ms",
            &self.response_time.map(|d| d.as_secs_f64() * 1000.0),
        )?;
        s.serialize_field("last_error", &self.last_error)?;
        s.serialize_field("consecutive_successes", &self.consecutive_successes)?;
        s.serialize_field("consecutive_failures", &self.consecutive_failures)?;
        s.serialize_field("total_checks", &self.total_checks)?;
        s.serialize_field("uptime_percentage", &self.uptime_percentage())?;
        s.end()
    }
}

/// Milliseconds since the Unix epoch, 0 for earlier times.
pub(crate) fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
