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

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::error;

/// What the runtime does when an agent's handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionReaction {
    /// Log and abort the whole process.
    Abort,
    /// Stop the environment.
    ShutdownEnvironment,
    /// Deregister the agent's cooperation.
    #[default]
    DeregisterCoop,
    /// Log and continue with the next demand.
    Ignore,
    /// Ask the cooperation, then the environment.
    Inherit,
}

impl ExceptionReaction {
    /// Resolves `Inherit` through the given fallbacks, most specific first.
    /// An unresolved chain ends in `Abort`.
    #[must_use]
    pub fn resolve(self, fallbacks: &[ExceptionReaction]) -> ExceptionReaction {
        std::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find(|reaction| *reaction != ExceptionReaction::Inherit)
            .unwrap_or(ExceptionReaction::Abort)
    }
}

/// Receives every error escaping an event handler, before the reaction runs.
pub trait EventExceptionLogger: Send + Sync + Debug {
    fn log_exception(&self, error: &anyhow::Error, coop_name: &str);
}

/// Writes handler failures to `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExceptionLogger;

impl EventExceptionLogger for TracingExceptionLogger {
    fn log_exception(&self, err: &anyhow::Error, coop_name: &str) {
        error!(coop = coop_name, error = %format!("{err:#}"), "event handler failed");
    }
}
