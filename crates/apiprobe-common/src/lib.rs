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

//! apiprobe Common Types
//!
//! This crate holds the configuration model and error taxonomy shared by the
//! executor, the health monitor and the CLI.
//!
//! # Components
//!
//! - [`config`] - `ConfigurationData`, per-service settings and validation
//! - [`auth`] - Auth credentials and the header injection strategy
//! - [`retry`] - Retry policy and backoff delay computation
//! - [`error`] - `ApiprobeError` and the crate-wide `Result` alias
//!
//! # Example
//!
//! ```
//! use apiprobe_common::ConfigurationData;
//!
//! let config = ConfigurationData::from_json_str(r#"{
//!     "services": [
//!         { "name": "users", "endpoint": "http://127.0.0.1:8081" }
//!     ]
//! }"#).unwrap();
//!
//! assert!(config.validate().is_empty());
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod retry;

pub use auth::{AuthConfig, AuthScheme, AuthType};
pub use config::{CircuitBreakerPolicy, ConfigurationData, GatewaySettings, ServiceConfig};
pub use error::{ApiprobeError, Result};
pub use retry::{BackoffStrategy, RetryPolicy};
