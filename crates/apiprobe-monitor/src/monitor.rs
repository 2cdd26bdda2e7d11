use apiprobe_client::{Method, RequestExecutor};
use apiprobe_common::GatewaySettings;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callbacks::StatusCallbacks;
use crate::health::{HealthStatus, ServiceHealthInfo};

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between two sweeps
    pub interval: Duration,
    /// How long `stop_monitoring` waits before aborting the loop
    pub stop_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl From<&GatewaySettings> for MonitorConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            interval: settings.health_check_interval(),
            stop_grace: settings.stop_grace(),
        }
    }
}

/// A service to probe.
#[derive(Debug, Clone)]
pub struct HealthTarget {
    pub name: String,
    pub health_path: String,
    pub executor: Arc<RequestExecutor>,
}

impl HealthTarget {
    /// Probes the health path derived from the executor's service config.
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self {
            name: executor.name().to_string(),
            health_path: executor.config().health_path(),
            executor,
        }
    }
}

struct Record {
    info: ServiceHealthInfo,
    /// Status left by the last completed check; never `Checking`.
    settled: HealthStatus,
}

struct Entry {
    target: HealthTarget,
    record: Mutex<Record>,
}

impl Entry {
    fn new(target: HealthTarget) -> Self {
        let info = ServiceHealthInfo::new(target.name.clone());
        Self {
            record: Mutex::new(Record {
                settled: info.status,
                info,
            }),
            target,
        }
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Shared {
    entries: BTreeMap<String, Entry>,
    callbacks: StatusCallbacks,
}

impl Shared {
    async fn check(&self, entry: &Entry) -> ServiceHealthInfo {
        entry.record().info.status = HealthStatus::Checking;

        let target = &entry.target;
        let result = target
            .executor
            .execute(Method::GET, &target.health_path, None, None)
            .await;

        // Compared against the last settled status so that overlapping
        // checks report each transition once
        let (previous, snapshot) = {
            let mut record = entry.record();
            if result.success {
                record.info.update_success(result.elapsed);
            } else {
                record.info.update_failure(result.error_message());
            }
            let current = record.info.status;
            let previous = std::mem::replace(&mut record.settled, current);
            (previous, record.info.clone())
        };

        debug!(
            service = %target.name,
            status = %snapshot.status,
            "Health check completed in {:?}",
            result.elapsed
        );

        if snapshot.status != previous {
            match snapshot.status {
                HealthStatus::Healthy => {
                    info!(service = %target.name, "Service is healthy (was {})", previous)
                }
                _ => warn!(
                    service = %target.name,
                    "Service is {} (was {}): {}",
                    snapshot.status,
                    previous,
                    snapshot.last_error.as_deref().unwrap_or("unknown error")
                ),
            }
            self.callbacks.notify(&target.name, &snapshot);
        }

        snapshot
    }

    async fn check_all(&self) -> Vec<ServiceHealthInfo> {
        let checks = self.entries.values().map(|entry| self.check(entry));
        futures::future::join_all(checks).await
    }
}

struct MonitorTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Periodic health checker over a fixed set of services.
///
/// `start_monitoring` spawns a loop that checks every service immediately,
/// then once per interval. Checks go through each service's executor, so
/// they are subject to its retry policy and circuit breaker. Status
/// transitions are reported to the registered [`StatusCallbacks`].
///
/// Health-check failures are recorded, never propagated.
pub struct HealthMonitor {
    shared: Arc<Shared>,
    config: MonitorConfig,
    task: tokio::sync::Mutex<Option<MonitorTask>>,
    running: Arc<AtomicBool>,
}

impl HealthMonitor {
    /// Creates a stopped monitor.
    ///
    /// # Arguments
    /// * `targets` - Services to check; later duplicates of a name are ignored
    /// * `config` - Interval and stop grace period
    /// * `callbacks` - Registry notified on status transitions
    pub fn new(
        targets: impl IntoIterator<Item = HealthTarget>,
        config: MonitorConfig,
        callbacks: StatusCallbacks,
    ) -> Self {
        let mut entries = BTreeMap::new();
        for target in targets {
            entries
                .entry(target.name.clone())
                .or_insert_with(|| Entry::new(target));
        }

        Self {
            shared: Arc::new(Shared { entries, callbacks }),
            config,
            task: tokio::sync::Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &StatusCallbacks {
        &self.shared.callbacks
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the monitoring loop.
    ///
    /// Returns `false` if the loop was already running.
    pub async fn start_monitoring(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Health monitoring already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let interval = self.config.interval;

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            Self::run(shared, interval, token).await;
            running.store(false, Ordering::SeqCst);
        });

        info!(
            services = self.shared.entries.len(),
            "Health monitoring started with {}ms interval",
            interval.as_millis()
        );
        *task = Some(MonitorTask { handle, cancel });
        true
    }

    /// Main monitoring loop
    async fn run(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
        loop {
            // A sweep in progress is allowed to finish
            shared.check_all().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Health monitoring loop finished");
    }

    /// Stops the monitoring loop.
    ///
    /// Interrupts the inter-sweep sleep and waits up to the stop grace period
    /// for the loop to finish; a loop still running after that is aborted.
    pub async fn stop_monitoring(&self) {
        let task = self.task.lock().await.take();
        let Some(MonitorTask { mut handle, cancel }) = task else {
            return;
        };

        cancel.cancel();
        match tokio::time::timeout(self.config.stop_grace, &mut handle).await {
            Ok(Ok(())) => info!("Health monitoring stopped"),
            Ok(Err(e)) => warn!("Health monitoring task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Health monitoring did not stop within {}ms, aborting",
                    self.config.stop_grace.as_millis()
                );
                handle.abort();
                let _ = handle.await;
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Checks one service now. Returns `None` for an unknown service.
    pub async fn check_service_health(&self, service: &str) -> Option<ServiceHealthInfo> {
        let entry = self.shared.entries.get(service)?;
        Some(self.shared.check(entry).await)
    }

    /// Checks all services concurrently and waits for every check.
    pub async fn check_all_services(&self) -> Vec<ServiceHealthInfo> {
        self.shared.check_all().await
    }

    /// Out-of-band check of one service, or of all services when `None`.
    pub async fn force_check(&self, service: Option<&str>) -> Vec<ServiceHealthInfo> {
        match service {
            Some(name) => self.check_service_health(name).await.into_iter().collect(),
            None => self.check_all_services().await,
        }
    }

    pub fn get_health(&self, service: &str) -> Option<ServiceHealthInfo> {
        self.shared.entries.get(service).map(|e| e.record().info.clone())
    }

    pub fn all_health(&self) -> BTreeMap<String, ServiceHealthInfo> {
        self.shared
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.record().info.clone()))
            .collect()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.shared.entries.keys().cloned().collect()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("services", &self.service_names())
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
