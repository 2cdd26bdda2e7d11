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

//! apiprobe Client
//!
//! Per-service HTTP execution with retry, backoff and circuit breaking.
//!
//! - [`RequestExecutor`]: issues calls to one service and never fails
//! - [`CircuitBreaker`]: Closed / Open / HalfOpen gate per service
//! - [`RequestResult`]: immutable outcome of one call
//!
//! # Example
//!
//! ```no_run
//! use apiprobe_client::RequestExecutor;
//! use apiprobe_common::ServiceConfig;
//! use reqwest::Method;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = RequestExecutor::new(ServiceConfig::new("users", "http://127.0.0.1:8081"))?;
//! let result = executor.execute(Method::GET, "/users/1", None, None).await;
//! if !result.success {
//!     eprintln!("{} (HTTP {})", result.error_message(), result.status_code);
//! }
//! executor.close();
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod executor;
pub mod result;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerSnapshot, CircuitState};
pub use executor::RequestExecutor;
pub use result::{RequestResult, ResponseBody};

pub use reqwest::Method;
