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
use std::sync::Arc;

use anyhow::anyhow;

use crate::agent::{ManagedAgent, Running};
use crate::common::{MboxId, ThreadSafety};
use crate::message::{BoxedReply, MessageContext, MessageRef};
use crate::traits::{Message, Signal};

/// A demand as seen by a handler: where it came from and what it carries.
pub(crate) struct Incoming {
    pub(crate) mbox_id: MboxId,
    pub(crate) message: Option<MessageRef>,
}

type ExclusiveFn<M> =
    dyn Fn(&mut ManagedAgent<Running, M>, &Incoming) -> anyhow::Result<Option<BoxedReply>>
        + Send
        + Sync;
type SharedFn<M> =
    dyn Fn(&ManagedAgent<Running, M>, &Incoming) -> anyhow::Result<Option<BoxedReply>> + Send + Sync;

/// Hook run when a state is entered or left.
pub(crate) type StateHook<M> = Arc<dyn Fn(&mut ManagedAgent<Running, M>) + Send + Sync>;

/// `on_start` / `on_finish` hook.
pub(crate) type LifecycleHook<M> =
    Arc<dyn Fn(&mut ManagedAgent<Running, M>) -> anyhow::Result<()> + Send + Sync>;

/// A type-erased event handler. Exclusive handlers get the agent mutably;
/// shared ones may run in parallel with each other on a thread pool.
pub(crate) enum Handler<M: Send + Sync + Debug + 'static> {
    Exclusive(Arc<ExclusiveFn<M>>),
    Shared(Arc<SharedFn<M>>),
}

impl<M: Send + Sync + Debug + 'static> Clone for Handler<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Exclusive(f) => Self::Exclusive(Arc::clone(f)),
            Self::Shared(f) => Self::Shared(Arc::clone(f)),
        }
    }
}

fn context<Msg: Message>(incoming: &Incoming) -> anyhow::Result<MessageContext<Msg>> {
    let message = incoming
        .message
        .as_ref()
        .and_then(MessageRef::downcast::<Msg>)
        .ok_or_else(|| anyhow!("payload is not a `{}`", std::any::type_name::<Msg>()))?;
    Ok(MessageContext::new(message, incoming.mbox_id))
}

impl<M: Send + Sync + Debug + 'static> Handler<M> {
    pub(crate) fn thread_safety(&self) -> ThreadSafety {
        match self {
            Self::Exclusive(_) => ThreadSafety::Unsafe,
            Self::Shared(_) => ThreadSafety::Safe,
        }
    }

    pub(crate) fn event<Msg, F>(handler: F) -> Self
    where
        Msg: Message,
        F: Fn(&mut ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let erased: Arc<ExclusiveFn<M>> = Arc::new(
            move |agent: &mut ManagedAgent<Running, M>, incoming: &Incoming| {
                handler(agent, &context::<Msg>(incoming)?)?;
                Ok(None)
            },
        );
        Self::Exclusive(erased)
    }

    pub(crate) fn event_thread_safe<Msg, F>(handler: F) -> Self
    where
        Msg: Message,
        F: Fn(&ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let erased: Arc<SharedFn<M>> =
            Arc::new(move |agent: &ManagedAgent<Running, M>, incoming: &Incoming| {
                handler(agent, &context::<Msg>(incoming)?)?;
                Ok(None)
            });
        Self::Shared(erased)
    }

    pub(crate) fn signal<S, F>(handler: F) -> Self
    where
        S: Signal,
        F: Fn(&mut ManagedAgent<Running, M>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let erased: Arc<ExclusiveFn<M>> = Arc::new(
            move |agent: &mut ManagedAgent<Running, M>, _incoming: &Incoming| {
                handler(agent)?;
                Ok(None)
            },
        );
        Self::Exclusive(erased)
    }

    pub(crate) fn service<Msg, R, F>(handler: F) -> Self
    where
        Msg: Message,
        R: Send + 'static,
        F: Fn(&mut ManagedAgent<Running, M>, &MessageContext<Msg>) -> anyhow::Result<R>
            + Send
            + Sync
            + 'static,
    {
        let erased: Arc<ExclusiveFn<M>> = Arc::new(
            move |agent: &mut ManagedAgent<Running, M>, incoming: &Incoming| {
                let reply = handler(agent, &context::<Msg>(incoming)?)?;
                Ok(Some(Box::new(reply) as BoxedReply))
            },
        );
        Self::Exclusive(erased)
    }

    pub(crate) fn service_signal<S, R, F>(handler: F) -> Self
    where
        S: Signal,
        R: Send + 'static,
        F: Fn(&mut ManagedAgent<Running, M>) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let erased: Arc<ExclusiveFn<M>> = Arc::new(
            move |agent: &mut ManagedAgent<Running, M>, _incoming: &Incoming| {
                let reply = handler(agent)?;
                Ok(Some(Box::new(reply) as BoxedReply))
            },
        );
        Self::Exclusive(erased)
    }
}
