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
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::trace;

use crate::agent::handler::Handler;
use crate::agent::{AgentCore, ManagedAgent, Running, State};
use crate::common::{AgentId, CohortError, MboxId, Result, StateId};
use crate::mbox::{DeliveryFilter, Mbox};
use crate::message::MessageContext;
use crate::traits::{Message, Signal};

pub use storage::SubscriptionStorageKind;
use storage::{SubscriptionKey, SubscriptionStorage};

mod storage;

/// One agent's handlers plus the mbox subscriptions backing them.
///
/// An mbox is subscribed once per message type no matter how many states
/// have a handler for it; the mbox unsubscription happens with the last one.
pub(crate) struct Subscriptions<M: Send + Sync + Debug + 'static> {
    agent_id: AgentId,
    storage: SubscriptionStorage<Handler<M>>,
    sources: HashMap<(MboxId, TypeId), (Mbox, usize)>,
    filters: HashMap<(MboxId, TypeId), Mbox>,
}

impl<M: Send + Sync + Debug + 'static> Subscriptions<M> {
    pub(crate) fn new(agent_id: AgentId, kind: SubscriptionStorageKind) -> Self {
        Self {
            agent_id,
            storage: SubscriptionStorage::new(kind),
            sources: HashMap::new(),
            filters: HashMap::new(),
        }
    }

    pub(crate) fn create(
        &mut self,
        core: &Arc<AgentCore>,
        mbox: &Mbox,
        msg_type: TypeId,
        type_name: &'static str,
        state: &State,
        handler: Handler<M>,
    ) -> Result<()> {
        let key: SubscriptionKey = (mbox.id(), msg_type, state.id());
        if self.storage.contains(&key) {
            return Err(CohortError::EventHandlerAlreadyProvided {
                mbox: mbox.id(),
                msg_type: type_name,
                state: state.name().to_string(),
            });
        }
        core.check_limit_defined(msg_type, type_name)?;

        match self.sources.get_mut(&(mbox.id(), msg_type)) {
            Some((_, count)) => *count += 1,
            None => {
                mbox.subscribe(msg_type, core)?;
                self.sources.insert((mbox.id(), msg_type), (mbox.clone(), 1));
            }
        }
        self.storage.insert(key, handler);
        trace!(agent = %self.agent_id, mbox = %mbox.id(), type_name, state = state.name(), "subscribed");
        Ok(())
    }

    pub(crate) fn drop_one(
        &mut self,
        mbox: &Mbox,
        msg_type: TypeId,
        type_name: &'static str,
        state: &State,
    ) -> Result<()> {
        let key: SubscriptionKey = (mbox.id(), msg_type, state.id());
        if self.storage.remove(&key).is_none() {
            return Err(CohortError::EventHandlerNotFound {
                mbox: mbox.id(),
                msg_type: type_name,
                state: state.name().to_string(),
            });
        }
        self.release_source(mbox.id(), msg_type, 1);
        Ok(())
    }

    /// Drops the handlers for `msg_type` from `mbox` in every state. Having
    /// none is not an error.
    pub(crate) fn drop_all_states(&mut self, mbox: &Mbox, msg_type: TypeId) {
        let mbox_id = mbox.id();
        let removed = self
            .storage
            .remove_matching(|(m, t, _)| *m == mbox_id && *t == msg_type);
        if !removed.is_empty() {
            self.release_source(mbox_id, msg_type, removed.len());
        }
    }

    fn release_source(&mut self, mbox_id: MboxId, msg_type: TypeId, by: usize) {
        let released = match self.sources.get_mut(&(mbox_id, msg_type)) {
            Some((_, count)) => {
                *count = count.saturating_sub(by);
                *count == 0
            }
            None => false,
        };
        if released {
            if let Some((mbox, _)) = self.sources.remove(&(mbox_id, msg_type)) {
                mbox.unsubscribe(msg_type, self.agent_id);
            }
        }
    }

    pub(crate) fn find(&self, mbox_id: MboxId, msg_type: TypeId, state: StateId) -> Option<&Handler<M>> {
        self.storage.get(&(mbox_id, msg_type, state))
    }

    pub(crate) fn len(&self) -> usize {
        self.storage.len()
    }

    /// Installs a delivery filter on `mbox`; it lives independently of any
    /// subscription to that mbox.
    pub(crate) fn set_filter(
        &mut self,
        core: &Arc<AgentCore>,
        mbox: &Mbox,
        msg_type: TypeId,
        filter: DeliveryFilter,
    ) -> Result<()> {
        mbox.set_delivery_filter(msg_type, filter, core)?;
        self.filters.insert((mbox.id(), msg_type), mbox.clone());
        Ok(())
    }

    pub(crate) fn drop_filter(&mut self, mbox: &Mbox, msg_type: TypeId) {
        if let Some(mbox) = self.filters.remove(&(mbox.id(), msg_type)) {
            mbox.drop_delivery_filter(msg_type, self.agent_id);
        }
    }

    pub(crate) fn has_filter(&self, mbox: &Mbox, msg_type: TypeId) -> bool {
        self.filters.contains_key(&(mbox.id(), msg_type))
    }

    /// Removes every subscription and delivery filter of the agent.
    pub(crate) fn clear(&mut self) {
        self.storage.clear();
        for ((_, msg_type), (mbox, _)) in self.sources.drain() {
            mbox.unsubscribe(msg_type, self.agent_id);
        }
        for ((_, msg_type), mbox) in self.filters.drain() {
            mbox.drop_delivery_filter(msg_type, self.agent_id);
        }
    }
}

impl<M: Send + Sync + Debug + 'static> Drop for Subscriptions<M> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Builder returned by [`ManagedAgent::subscribe`].
///
/// Without `in_state` the handler applies to the default state. With several
/// `in_state` calls the same handler is installed in each; if any of them
/// fails, none is kept.
pub struct SubscriptionBind<'a, S, M: Send + Sync + Debug + 'static> {
    agent: &'a mut ManagedAgent<S, M>,
    mbox: Mbox,
    states: Vec<State>,
}

impl<'a, S, M: Send + Sync + Debug + 'static> SubscriptionBind<'a, S, M> {
    pub(crate) fn new(agent: &'a mut ManagedAgent<S, M>, mbox: &Mbox) -> Self {
        Self {
            agent,
            mbox: mbox.clone(),
            states: Vec::new(),
        }
    }

    #[must_use]
    pub fn in_state(mut self, state: &State) -> Self {
        self.states.push(state.clone());
        self
    }

    fn install(
        self,
        msg_type: TypeId,
        type_name: &'static str,
        handler: Handler<M>,
    ) -> Result<&'a mut ManagedAgent<S, M>> {
        let Self {
            agent,
            mbox,
            mut states,
        } = self;
        if states.is_empty() {
            states.push(agent.states.default_state().clone());
        }
        for state in &states {
            agent.states.check_owner(state)?;
        }

        let core = Arc::clone(&agent.core);
        for (done, state) in states.iter().enumerate() {
            let created =
                agent
                    .subscriptions
                    .create(&core, &mbox, msg_type, type_name, state, handler.clone());
            if let Err(e) = created {
                for undo in &states[..done] {
                    let _ = agent
                        .subscriptions
                        .drop_one(&mbox, msg_type, type_name, undo);
                }
                return Err(e);
            }
        }
        Ok(agent)
    }

    /// Exclusive handler for `Msg`.
    pub fn event<Msg, F>(self, handler: F) -> Result<&'a mut ManagedAgent<S, M>>
    where
        Msg: Message,
        F: Fn(&mut ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.install(
            TypeId::of::<Msg>(),
            std::any::type_name::<Msg>(),
            Handler::event::<Msg, F>(handler),
        )
    }

    /// Handler that may run in parallel with the agent's other thread-safe
    /// handlers. It sees the agent immutably and cannot change state.
    pub fn event_thread_safe<Msg, F>(self, handler: F) -> Result<&'a mut ManagedAgent<S, M>>
    where
        Msg: Message,
        F: Fn(&ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.install(
            TypeId::of::<Msg>(),
            std::any::type_name::<Msg>(),
            Handler::event_thread_safe::<Msg, F>(handler),
        )
    }

    pub fn signal<Sig, F>(self, handler: F) -> Result<&'a mut ManagedAgent<S, M>>
    where
        Sig: Signal,
        F: Fn(&mut ManagedAgent<Running, M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.install(
            TypeId::of::<Sig>(),
            std::any::type_name::<Sig>(),
            Handler::signal::<Sig, F>(handler),
        )
    }

    /// Service handler: its return value becomes the requester's reply, its
    /// error the requester's failure.
    pub fn service<Msg, R, F>(self, handler: F) -> Result<&'a mut ManagedAgent<S, M>>
    where
        Msg: Message,
        R: Send + 'static,
        F: Fn(&mut ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<R>
            + Send
            + Sync
            + 'static,
    {
        self.install(
            TypeId::of::<Msg>(),
            std::any::type_name::<Msg>(),
            Handler::service::<Msg, R, F>(handler),
        )
    }

    pub fn service_signal<Sig, R, F>(self, handler: F) -> Result<&'a mut ManagedAgent<S, M>>
    where
        Sig: Signal,
        R: Send + 'static,
        F: Fn(&mut ManagedAgent<Running, M>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.install(
            TypeId::of::<Sig>(),
            std::any::type_name::<Sig>(),
            Handler::service_signal::<Sig, R, F>(handler),
        )
    }
}
