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

use std::ops::Deref;

use crate::common::{CohortApp, Environment, EnvironmentParams, Result};

/// An environment that is stopped and joined when dropped.
#[derive(Debug)]
pub struct WrappedEnvironment {
    env: Environment,
}

impl WrappedEnvironment {
    /// # Errors
    ///
    /// See [`CohortApp::launch_with`].
    pub fn new(params: EnvironmentParams) -> Result<Self> {
        Ok(Self {
            env: CohortApp::launch_with(params)?,
        })
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn stop(&self) {
        self.env.stop();
    }

    pub fn join(&self) {
        self.env.join();
    }

    pub fn stop_then_join(&self) {
        self.env.stop_then_join();
    }
}

impl Deref for WrappedEnvironment {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &self.env
    }
}

impl Drop for WrappedEnvironment {
    fn drop(&mut self) {
        self.env.stop_then_join();
    }
}
