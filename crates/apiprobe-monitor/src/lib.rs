// Copyright 2025 apiprobe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! apiprobe Monitor
//!
//! Health monitoring and lifecycle management for a set of HTTP services.
//!
//! # Components
//!
//! - [`ServiceCoordinator`] - Builds executors and the monitor from a
//!   configuration, routes requests and handles reloads
//! - [`HealthMonitor`] - Periodic concurrent health checks with status
//!   transition callbacks
//! - [`ServiceHealthInfo`] - Per-service health counters and uptime
//! - [`StatusCallbacks`] - Callback registry shared across reloads

pub mod callbacks;
pub mod coordinator;
pub mod health;
pub mod monitor;

pub use callbacks::{CallbackId, StatusCallback, StatusCallbacks};
pub use coordinator::{ServiceCoordinator, ServiceResponse};
pub use health::{HealthStatus, ServiceHealthInfo};
pub use monitor::{HealthMonitor, HealthTarget, MonitorConfig};
