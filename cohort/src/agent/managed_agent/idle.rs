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
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::agent::handler::LifecycleHook;
use crate::agent::state::StateTable;
use crate::agent::subscription::{SubscriptionStorageKind, Subscriptions};
use crate::agent::{AgentCore, ManagedAgent, Running, State};
use crate::common::{Environment, Result};

/// Marker for an agent that is being set up and not yet registered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl<Model: Send + Sync + Debug + 'static> ManagedAgent<Idle, Model> {
    pub(crate) fn new(
        env: &Environment,
        core: Arc<AgentCore>,
        storage: SubscriptionStorageKind,
        model: Model,
    ) -> Self {
        let states = StateTable::new(core.id());
        let current = states.default_state().id();
        trace!(agent = core.name(), "agent created");
        Self {
            model,
            subscriptions: Subscriptions::new(core.id(), storage),
            core,
            env: env.clone(),
            states,
            current,
            initial: None,
            on_start: None,
            on_finish: None,
            state_listeners: Vec::new(),
            _agent_state: PhantomData,
        }
    }

    /// Runs once on the agent's worker before any message.
    pub fn on_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ManagedAgent<Running, Model>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let hook: LifecycleHook<Model> = Arc::new(hook);
        self.on_start = Some(hook);
        self
    }

    /// Runs once after the last demand, during deregistration.
    pub fn on_finish<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ManagedAgent<Running, Model>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let hook: LifecycleHook<Model> = Arc::new(hook);
        self.on_finish = Some(hook);
        self
    }

    /// The state entered when the agent starts, with its enter hooks, before
    /// `on_start` runs.
    ///
    /// # Errors
    ///
    /// `NotStateOwner` or `NoInitialSubstate` when the state cannot become
    /// current.
    pub fn set_initial_state(&mut self, state: &State) -> Result<&mut Self> {
        self.states.resolve_leaf(state)?;
        self.initial = Some(state.clone());
        Ok(self)
    }

    pub(crate) fn core(&self) -> &Arc<AgentCore> {
        &self.core
    }

    pub(crate) fn into_running(self) -> ManagedAgent<Running, Model> {
        let ManagedAgent {
            model,
            core,
            env,
            subscriptions,
            states,
            current,
            initial,
            on_start,
            on_finish,
            state_listeners,
            ..
        } = self;
        ManagedAgent {
            model,
            core,
            env,
            subscriptions,
            states,
            current,
            initial,
            on_start,
            on_finish,
            state_listeners,
            _agent_state: PhantomData,
        }
    }
}
