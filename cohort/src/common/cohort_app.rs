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

use tracing::{error, instrument, trace};

use crate::common::{Environment, EnvironmentParams, Result};

/// Entry point for starting an environment.
///
/// `launch` and `launch_with` hand back a running [`Environment`]; `run`
/// additionally blocks until it has stopped.
#[derive(Default, Debug, Clone)]
pub struct CohortApp;

impl CohortApp {
    /// Launches an environment configured from [`CONFIG`](crate::common::CONFIG).
    ///
    /// # Errors
    ///
    /// `DispatcherStartFailed` when a worker thread cannot be spawned.
    pub fn launch() -> Result<Environment> {
        Self::launch_with(EnvironmentParams::default())
    }

    /// Launches an environment: the default one-thread dispatcher, every
    /// named dispatcher, the timer thread and the deregistration thread.
    ///
    /// # Errors
    ///
    /// `EmptyName` when a named dispatcher has an empty name, or
    /// `DispatcherStartFailed` when a worker thread cannot be spawned.
    #[instrument(skip(params))]
    pub fn launch_with(params: EnvironmentParams) -> Result<Environment> {
        trace!(?params, "launching environment");
        let env = Environment::start(params)?;
        trace!("environment launched");
        Ok(env)
    }

    /// Launches, calls `init` and blocks until the environment stops.
    ///
    /// ```rust,ignore
    /// CohortApp::run(EnvironmentParams::default(), |env| {
    ///     let agent = env.new_agent::<Counter>();
    ///     env.register_agent_as_coop("counter", agent)?;
    ///     Ok(())
    /// })?;
    /// ```
    ///
    /// # Errors
    ///
    /// A launch error, or the error `init` returned. In the latter case the
    /// environment is stopped and joined first.
    pub fn run<F>(params: EnvironmentParams, init: F) -> anyhow::Result<()>
    where
        F: FnOnce(&Environment) -> anyhow::Result<()>,
    {
        let env = Self::launch_with(params)?;
        if let Err(err) = init(&env) {
            error!(error = %format!("{err:#}"), "environment init failed");
            env.stop_then_join();
            return Err(err);
        }
        env.join();
        Ok(())
    }
}
