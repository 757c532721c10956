/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Environment, configuration, errors and the identifiers shared across the
//! runtime.

pub use cohort_app::CohortApp;
pub use config::{CohortConfig, CONFIG};
pub use environment::{Environment, EnvironmentInner};
pub use environment_params::EnvironmentParams;
pub use error::{CohortError, Result, ThrowingStrategy};
pub use exception::{EventExceptionLogger, ExceptionReaction, TracingExceptionLogger};
pub use types::*;
pub use wrapped_env::WrappedEnvironment;

mod cohort_app;
/// Runtime configuration loaded from the XDG config directory.
pub mod config;
mod environment;
mod environment_params;
mod error;
mod exception;
mod types;
mod wrapped_env;
