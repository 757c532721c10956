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

use crate::agent::State;
use crate::common::{AgentId, Environment};
use crate::coop::DeregReason;

/// Observes cooperation registration and final deregistration.
///
/// Callbacks run on the registering thread and on the deregistration
/// executor thread respectively, and must not panic.
pub trait CoopListener: Send + Sync {
    fn on_registered(&self, env: &Environment, coop_name: &str);

    fn on_deregistered(&self, env: &Environment, coop_name: &str, reason: DeregReason);
}

/// Delays environment shutdown until removed.
///
/// `stop` is called once when the environment is asked to stop; the guard
/// finishes its own work and then removes itself.
pub trait StopGuard: Send + Sync {
    fn stop(&self);
}

/// Told about every state switch of the agent it is attached to.
///
/// Runs on the agent's worker right after the switch, with the new current
/// state. It must not switch the agent's state itself.
pub trait StateListener: Send + Sync {
    fn changed(&self, agent: AgentId, state: &State);
}

impl<F> StateListener for F
where
    F: Fn(AgentId, &State) + Send + Sync,
{
    fn changed(&self, agent: AgentId, state: &State) {
        self(agent, state);
    }
}
