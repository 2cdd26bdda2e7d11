use apiprobe_client::{CircuitBreakerSnapshot, Method, RequestExecutor, RequestResult};
use apiprobe_common::error::{ApiprobeError, Result};
use apiprobe_common::{ConfigurationData, GatewaySettings, ServiceConfig};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::callbacks::{CallbackId, StatusCallbacks};
use crate::health::{unix_millis, ServiceHealthInfo};
use crate::monitor::{HealthMonitor, HealthTarget, MonitorConfig};

/// Result of a coordinated call, with request metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResponse {
    pub service: String,
    pub endpoint: String,
    pub method: String,
    #[serde(rename = "timestamp_ms", serialize_with = "serialize_timestamp")]
    pub timestamp: SystemTime,
    pub result: RequestResult,
}

fn serialize_timestamp<S: serde::Serializer>(t: &SystemTime, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(unix_millis(*t))
}

/// Active services of one configuration generation.
#[derive(Default)]
struct ServiceSet {
    gateway: GatewaySettings,
    executors: BTreeMap<String, Arc<RequestExecutor>>,
    monitor: Option<Arc<HealthMonitor>>,
}

impl ServiceSet {
    async fn teardown(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.stop_monitoring().await;
        }
        for executor in self.executors.values() {
            executor.close();
        }
    }
}

/// Owns the executors and the health monitor built from a configuration.
///
/// The active service set is replaced as a whole on initialize and reload.
/// Requests already running keep the executor they started with, so a reload
/// never interrupts them. Lifecycle operations are serialized; request
/// execution and health queries never wait on them for longer than the swap.
///
/// # Example
///
/// ```no_run
/// use apiprobe_common::ConfigurationData;
/// use apiprobe_monitor::ServiceCoordinator;
/// use apiprobe_client::Method;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let coordinator = ServiceCoordinator::new();
/// coordinator.initialize(ConfigurationData::from_file("services.json")?).await?;
///
/// coordinator.add_status_callback(|service, info| {
///     println!("{} is now {}", service, info.status);
///     Ok(())
/// });
///
/// let response = coordinator
///     .execute_request("users", "/users/1", Method::GET, None, None)
///     .await;
/// println!("HTTP {}", response.result.status_code);
///
/// coordinator.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ServiceCoordinator {
    lifecycle: tokio::sync::Mutex<()>,
    services: RwLock<Arc<ServiceSet>>,
    callbacks: StatusCallbacks,
    last_errors: Mutex<Vec<String>>,
}

impl Default for ServiceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCoordinator {
    pub fn new() -> Self {
        Self {
            lifecycle: tokio::sync::Mutex::new(()),
            services: RwLock::new(Arc::new(ServiceSet::default())),
            callbacks: StatusCallbacks::new(),
            last_errors: Mutex::new(Vec::new()),
        }
    }

    async fn current(&self) -> Arc<ServiceSet> {
        Arc::clone(&*self.services.read().await)
    }

    /// Activates a configuration, replacing any previous one.
    ///
    /// # Errors
    ///
    /// `ApiprobeError::InvalidConfiguration` with every validation error; the
    /// previously active services are left untouched in that case.
    pub async fn initialize(&self, config: ConfigurationData) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.install(config).await
    }

    /// Replaces the active configuration.
    ///
    /// Stops monitoring, releases the old executors and activates the new
    /// configuration. Safe while requests are in flight.
    pub async fn reload_configuration(&self, config: ConfigurationData) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        info!(gateway = %config.gateway.name, "Reloading configuration");
        self.install(config).await
    }

    async fn install(&self, config: ConfigurationData) -> Result<()> {
        if let Err(err) = config.ensure_valid() {
            if let ApiprobeError::InvalidConfiguration(errors) = &err {
                warn!(
                    "Rejected configuration with {} error(s): {}",
                    errors.len(),
                    errors.join("; ")
                );
                *self.errors_slot() = errors.clone();
            }
            return Err(err);
        }

        let mut executors = BTreeMap::new();
        for service in config.services {
            let executor = Arc::new(RequestExecutor::new(service)?);
            executors.insert(executor.name().to_string(), executor);
        }

        let monitor = Arc::new(HealthMonitor::new(
            executors.values().cloned().map(HealthTarget::new),
            MonitorConfig::from(&config.gateway),
            self.callbacks.clone(),
        ));

        let next = Arc::new(ServiceSet {
            gateway: config.gateway,
            executors,
            monitor: Some(Arc::clone(&monitor)),
        });

        let previous = self.current().await;
        if let Some(old_monitor) = &previous.monitor {
            old_monitor.stop_monitoring().await;
        }

        let previous = std::mem::replace(&mut *self.services.write().await, Arc::clone(&next));
        previous.teardown().await;
        self.errors_slot().clear();

        info!(
            gateway = %next.gateway.name,
            services = next.executors.len(),
            "Configuration activated"
        );

        if next.gateway.health_check_enabled {
            monitor.start_monitoring().await;
        } else {
            info!("Health checks disabled");
        }
        Ok(())
    }

    /// Stops monitoring and releases every service.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        let previous = std::mem::take(&mut *self.services.write().await);
        if previous.executors.is_empty() {
            return;
        }
        previous.teardown().await;
        info!(services = previous.executors.len(), "Coordinator shut down");
    }

    /// Executes a request against a named service.
    ///
    /// An unknown service yields a 404 without any network traffic.
    pub async fn execute_request(
        &self,
        service: &str,
        path: &str,
        method: Method,
        headers: Option<&HashMap<String, String>>,
        body: Option<&Value>,
    ) -> ServiceResponse {
        let timestamp = SystemTime::now();
        let executor = self.current().await.executors.get(service).cloned();

        let result = match executor {
            Some(executor) => executor.execute(method.clone(), path, headers, body).await,
            None => {
                warn!("Request for unknown service '{}'", service);
                RequestResult::unknown_service(service)
            }
        };

        ServiceResponse {
            service: service.to_string(),
            endpoint: path.to_string(),
            method: method.to_string(),
            timestamp,
            result,
        }
    }

    pub async fn get_service_health(&self, service: &str) -> Option<ServiceHealthInfo> {
        self.current().await.monitor.as_ref()?.get_health(service)
    }

    pub async fn get_all_health_info(&self) -> BTreeMap<String, ServiceHealthInfo> {
        match &self.current().await.monitor {
            Some(monitor) => monitor.all_health(),
            None => BTreeMap::new(),
        }
    }

    /// Checks one service, or all when `None`, outside the regular schedule.
    pub async fn force_health_check(&self, service: Option<&str>) -> Vec<ServiceHealthInfo> {
        let set = self.current().await;
        match &set.monitor {
            Some(monitor) => monitor.force_check(service).await,
            None => Vec::new(),
        }
    }

    /// Registers a status transition listener. Survives reloads.
    pub fn add_status_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str, &ServiceHealthInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.add(callback)
    }

    pub fn remove_status_callback(&self, id: CallbackId) -> bool {
        self.callbacks.remove(id)
    }

    pub async fn service_names(&self) -> Vec<String> {
        self.current().await.executors.keys().cloned().collect()
    }

    pub async fn service_config(&self, service: &str) -> Option<Arc<ServiceConfig>> {
        self.current()
            .await
            .executors
            .get(service)
            .map(|e| Arc::clone(e.config()))
    }

    pub async fn circuit_breaker(&self, service: &str) -> Option<CircuitBreakerSnapshot> {
        self.current()
            .await
            .executors
            .get(service)
            .map(|e| e.circuit_breaker().snapshot())
    }

    /// Errors of the last rejected configuration.
    pub fn validation_errors(&self) -> Vec<String> {
        self.errors_slot().clone()
    }

    pub async fn is_initialized(&self) -> bool {
        !self.current().await.executors.is_empty()
    }

    pub async fn is_monitoring(&self) -> bool {
        self.current()
            .await
            .monitor
            .as_ref()
            .is_some_and(|m| m.is_running())
    }

    fn errors_slot(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.last_errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
