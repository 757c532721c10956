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

use std::any::TypeId;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

pub use idle::Idle;
pub use running::Running;

use crate::agent::handler::{LifecycleHook, StateHook};
use crate::agent::state::StateTable;
use crate::agent::subscription::{SubscriptionBind, Subscriptions};
use crate::agent::{AgentCore, State};
use crate::common::{AgentId, Environment, Result, StateId};
use crate::mbox::{DeliveryFilter, Mbox};
use crate::message::MessageRef;
use crate::traits::{Message, StateListener};

mod idle;
mod running;

/// An agent: the user's `model` plus its subscriptions and state machine.
///
/// `ManagedAgent<Idle, _>` is what the environment hands out for setup. Once
/// added to a cooperation it becomes `ManagedAgent<Running, _>`, which is what
/// handlers receive.
pub struct ManagedAgent<AgentState, Model: Send + Sync + Debug + 'static> {
    pub model: Model,
    pub(crate) core: Arc<AgentCore>,
    pub(crate) env: Environment,
    pub(crate) subscriptions: Subscriptions<Model>,
    pub(crate) states: StateTable<Model>,
    pub(crate) current: StateId,
    pub(crate) initial: Option<State>,
    pub(crate) on_start: Option<LifecycleHook<Model>>,
    pub(crate) on_finish: Option<LifecycleHook<Model>>,
    pub(crate) state_listeners: Vec<Arc<dyn StateListener>>,
    _agent_state: PhantomData<AgentState>,
}

impl<AgentState, Model: Send + Sync + Debug + 'static> ManagedAgent<AgentState, Model> {
    /// Starts a subscription to `mbox`; finish it with `event`, `signal` or
    /// `service`.
    pub fn subscribe(&mut self, mbox: &Mbox) -> SubscriptionBind<'_, AgentState, Model> {
        SubscriptionBind::new(self, mbox)
    }

    /// Removes the handler for `M` from `mbox` in `state`.
    ///
    /// # Errors
    ///
    /// `EventHandlerNotFound` if there is no such handler.
    pub fn drop_subscription<M: 'static>(&mut self, mbox: &Mbox, state: &State) -> Result<()> {
        self.subscriptions
            .drop_one(mbox, TypeId::of::<M>(), std::any::type_name::<M>(), state)
    }

    pub fn drop_subscription_for_all_states<M: 'static>(&mut self, mbox: &Mbox) {
        self.subscriptions
            .drop_all_states(mbox, TypeId::of::<M>());
    }

    #[must_use]
    pub fn has_subscription<M: 'static>(&self, mbox: &Mbox, state: &State) -> bool {
        self.subscriptions
            .find(mbox.id(), TypeId::of::<M>(), state.id())
            .is_some()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Lets only the `M` messages that `filter` accepts through from `mbox`
    /// to this agent. Replaces an earlier filter for the same pair and may be
    /// set before the subscription itself. Other subscribers are unaffected.
    ///
    /// # Errors
    ///
    /// `DeliveryFilterOnMpscMbox` if `mbox` is a direct mbox.
    pub fn set_delivery_filter<M, F>(&mut self, mbox: &Mbox, filter: F) -> Result<()>
    where
        M: Message,
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        let filter: DeliveryFilter =
            Arc::new(move |message: &MessageRef| message.payload::<M>().is_some_and(&filter));
        self.subscriptions
            .set_filter(&self.core, mbox, TypeId::of::<M>(), filter)
    }

    /// Removing a filter that is not set is a no-op.
    pub fn drop_delivery_filter<M: Message>(&mut self, mbox: &Mbox) {
        self.subscriptions.drop_filter(mbox, TypeId::of::<M>());
    }

    #[must_use]
    pub fn has_delivery_filter<M: Message>(&self, mbox: &Mbox) -> bool {
        self.subscriptions.has_filter(mbox, TypeId::of::<M>())
    }

    /// Attaches a listener the agent owns; it is dropped with the agent.
    pub fn add_state_listener(&mut self, listener: impl StateListener + 'static) -> &mut Self {
        self.state_listeners.push(Arc::new(listener));
        self
    }

    /// Attaches a listener shared with the caller, who may keep observing it
    /// after the agent is gone.
    pub fn add_shared_state_listener(&mut self, listener: Arc<dyn StateListener>) -> &mut Self {
        self.state_listeners.push(listener);
        self
    }

    /// Creates a top-level state.
    pub fn create_state(&mut self, name: &str) -> State {
        self.states.create_top(name)
    }

    /// # Errors
    ///
    /// `NotStateOwner` for a foreign parent, `StateNestingTooDeep` past the
    /// nesting limit.
    pub fn create_substate(&mut self, name: &str, parent: &State) -> Result<State> {
        self.states.create_substate(name, parent, false)
    }

    /// Creates the substate entered when `parent` itself is entered.
    ///
    /// # Errors
    ///
    /// As [`ManagedAgent::create_substate`], plus
    /// `InitialSubstateAlreadyDefined`.
    pub fn create_initial_substate(&mut self, name: &str, parent: &State) -> Result<State> {
        self.states.create_substate(name, parent, true)
    }

    /// The state every agent starts in.
    #[must_use]
    pub fn default_state(&self) -> State {
        self.states.default_state().clone()
    }

    pub fn on_enter<F>(&mut self, state: &State, hook: F) -> Result<&mut Self>
    where
        F: Fn(&mut ManagedAgent<Running, Model>) + Send + Sync + 'static,
    {
        let hook: StateHook<Model> = Arc::new(hook);
        self.states.add_enter_hook(state, hook)?;
        Ok(self)
    }

    pub fn on_exit<F>(&mut self, state: &State, hook: F) -> Result<&mut Self>
    where
        F: Fn(&mut ManagedAgent<Running, Model>) + Send + Sync + 'static,
    {
        let hook: StateHook<Model> = Arc::new(hook);
        self.states.add_exit_hook(state, hook)?;
        Ok(self)
    }

    /// The agent's own single-consumer mbox.
    #[must_use]
    pub fn direct_mbox(&self) -> &Mbox {
        self.core.direct_mbox()
    }

    #[must_use]
    pub fn id(&self) -> AgentId {
        self.core.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The environment this agent was created in.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }
}

impl<AgentState, Model: Send + Sync + Debug + 'static> Debug for ManagedAgent<AgentState, Model> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedAgent")
            .field("name", &self.name())
            .field("state", &self.states.name_of(self.current))
            .field("model", &self.model)
            .finish()
    }
}
