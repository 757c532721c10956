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

use tracing::debug;

use crate::agent::AgentCore;
use crate::common::{CohortError, Environment, Result};
use crate::dispatcher::thread_pool::PoolBindParams;
use crate::dispatcher::{AgentBinding, Dispatcher, DispatcherKind, DEFAULT_DISPATCHER_NAME};

/// The kind of dispatcher a binder expects, with per-kind options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BindingKind {
    #[default]
    OneThread,
    ActiveObject,
    ActiveGroup(String),
    ThreadPool(PoolBindParams),
    PrioOneThread,
    PrioDedicatedThreads,
}

impl BindingKind {
    fn dispatcher_kind(&self) -> DispatcherKind {
        match self {
            Self::OneThread => DispatcherKind::OneThread,
            Self::ActiveObject => DispatcherKind::ActiveObject,
            Self::ActiveGroup(_) => DispatcherKind::ActiveGroup,
            Self::ThreadPool(_) => DispatcherKind::ThreadPool,
            Self::PrioOneThread => DispatcherKind::PrioOneThread,
            Self::PrioDedicatedThreads => DispatcherKind::PrioDedicatedThreads,
        }
    }
}

/// Says which dispatcher an agent runs on.
///
/// The default binder uses the environment's default one-thread dispatcher.
/// Named binders look the dispatcher up at registration and fail the whole
/// registration if it is missing or of another kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispBinder {
    dispatcher: Option<String>,
    kind: BindingKind,
}

impl DispBinder {
    fn named(name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            dispatcher: Some(name.into()),
            kind,
        }
    }

    #[must_use]
    pub fn default_dispatcher() -> Self {
        Self::default()
    }

    pub fn one_thread(name: impl Into<String>) -> Self {
        Self::named(name, BindingKind::OneThread)
    }

    pub fn active_obj(name: impl Into<String>) -> Self {
        Self::named(name, BindingKind::ActiveObject)
    }

    pub fn active_group(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self::named(name, BindingKind::ActiveGroup(group.into()))
    }

    pub fn thread_pool(name: impl Into<String>) -> Self {
        Self::named(name, BindingKind::ThreadPool(PoolBindParams::default()))
    }

    pub fn thread_pool_with(name: impl Into<String>, params: PoolBindParams) -> Self {
        Self::named(name, BindingKind::ThreadPool(params))
    }

    pub fn prio_one_thread(name: impl Into<String>) -> Self {
        Self::named(name, BindingKind::PrioOneThread)
    }

    pub fn prio_dedicated_threads(name: impl Into<String>) -> Self {
        Self::named(name, BindingKind::PrioDedicatedThreads)
    }

    #[must_use]
    pub fn dispatcher_name(&self) -> Option<&str> {
        self.dispatcher.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> &BindingKind {
        &self.kind
    }

    /// Attaches `agent` to the dispatcher; the returned binding detaches it
    /// again when dropped.
    pub(crate) fn bind(&self, env: &Environment, agent: &AgentCore) -> Result<AgentBinding> {
        let name = self.dispatcher.as_deref().unwrap_or(DEFAULT_DISPATCHER_NAME);
        let dispatcher = env.find_dispatcher(self.dispatcher.as_deref())?;
        debug!(agent = agent.name(), dispatcher = name, kind = %dispatcher.kind(), "binding agent");
        match (&self.kind, &dispatcher) {
            (BindingKind::OneThread, Dispatcher::OneThread(d)) => d.worker.bind(agent),
            (BindingKind::ActiveObject, Dispatcher::ActiveObject(d)) => d.bind(agent),
            (BindingKind::ActiveGroup(group), Dispatcher::ActiveGroup(d)) => d.bind(agent, group),
            (BindingKind::ThreadPool(params), Dispatcher::ThreadPool(d)) => d.bind(agent, *params),
            (BindingKind::PrioOneThread, Dispatcher::PrioOneThread(d)) => d.worker.bind(agent),
            (BindingKind::PrioDedicatedThreads, Dispatcher::PrioDedicatedThreads(d)) => {
                d.bind(agent)
            }
            (kind, dispatcher) => Err(CohortError::DispatcherTypeMismatch {
                name: name.to_string(),
                expected: kind.dispatcher_kind(),
                actual: dispatcher.kind(),
            }),
        }
    }
}
