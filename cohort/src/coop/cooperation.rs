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

use std::fmt::{self, Debug};
use std::sync::Arc;

use derive_new::new;
use tracing::trace;

use crate::agent::{AgentCell, AgentCore, Idle, ManagedAgent};
use crate::common::{AgentId, CoopId, Environment, ExceptionReaction};
use crate::coop::DeregReason;
use crate::dispatcher::DispBinder;
use crate::mbox::Mbox;

/// Called on the registering thread after a successful registration.
pub type RegNotificator = Box<dyn Fn(&Environment, &str) + Send + Sync>;

/// Called on the deregistration thread during final teardown.
pub type DeregNotificator = Box<dyn Fn(&Environment, &str, DeregReason) + Send + Sync>;

pub(crate) struct PendingAgent {
    pub(crate) core: Arc<AgentCore>,
    pub(crate) binder: Option<DispBinder>,
}

/// Handle to an agent that was added to a cooperation.
#[derive(new, Debug, Clone)]
pub struct AgentRef {
    id: AgentId,
    name: String,
    direct_mbox: Mbox,
}

impl AgentRef {
    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's single-consumer mbox.
    #[must_use]
    pub fn direct_mbox(&self) -> &Mbox {
        &self.direct_mbox
    }
}

/// A registered cooperation.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct CoopHandle {
    id: CoopId,
    name: String,
}

impl CoopHandle {
    #[must_use]
    pub fn id(&self) -> CoopId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A cooperation being put together.
///
/// Agents added here are bound and started together when the cooperation is
/// registered, and stopped together when it is deregistered. Dropping an
/// unregistered cooperation drops its agents.
pub struct Coop {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) binder: DispBinder,
    pub(crate) reaction: ExceptionReaction,
    pub(crate) agents: Vec<PendingAgent>,
    pub(crate) reg_notificators: Vec<RegNotificator>,
    pub(crate) dereg_notificators: Vec<DeregNotificator>,
}

impl Coop {
    pub(crate) fn new(name: String, parent: Option<String>) -> Self {
        Self {
            name,
            parent,
            binder: DispBinder::default(),
            reaction: ExceptionReaction::Inherit,
            agents: Vec::new(),
            reg_notificators: Vec::new(),
            dereg_notificators: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Binder for agents added without one of their own.
    pub fn set_binder(&mut self, binder: DispBinder) -> &mut Self {
        self.binder = binder;
        self
    }

    /// Reaction used when a member agent's own reaction is `Inherit`.
    pub fn set_exception_reaction(&mut self, reaction: ExceptionReaction) -> &mut Self {
        self.reaction = reaction;
        self
    }

    pub fn add_agent<Model>(&mut self, agent: ManagedAgent<Idle, Model>) -> AgentRef
    where
        Model: Send + Sync + Debug + 'static,
    {
        self.push_agent(agent, None)
    }

    pub fn add_agent_with_binder<Model>(
        &mut self,
        agent: ManagedAgent<Idle, Model>,
        binder: DispBinder,
    ) -> AgentRef
    where
        Model: Send + Sync + Debug + 'static,
    {
        self.push_agent(agent, Some(binder))
    }

    fn push_agent<Model>(
        &mut self,
        agent: ManagedAgent<Idle, Model>,
        binder: Option<DispBinder>,
    ) -> AgentRef
    where
        Model: Send + Sync + Debug + 'static,
    {
        let core = Arc::clone(agent.core());
        core.install_runner(Arc::new(AgentCell::new(agent.into_running())));
        trace!(coop = %self.name, agent = core.name(), "agent added");
        let agent_ref = AgentRef::new(core.id(), core.name().to_string(), core.direct_mbox().clone());
        self.agents.push(PendingAgent { core, binder });
        agent_ref
    }

    pub fn add_reg_notificator<F>(&mut self, notificator: F) -> &mut Self
    where
        F: Fn(&Environment, &str) + Send + Sync + 'static,
    {
        self.reg_notificators.push(Box::new(notificator));
        self
    }

    pub fn add_dereg_notificator<F>(&mut self, notificator: F) -> &mut Self
    where
        F: Fn(&Environment, &str, DeregReason) + Send + Sync + 'static,
    {
        self.dereg_notificators.push(Box::new(notificator));
        self
    }

    pub(crate) fn take_agents(&mut self) -> Vec<PendingAgent> {
        std::mem::take(&mut self.agents)
    }
}

impl Debug for Coop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coop")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("agents", &self.agents.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Coop {
    fn drop(&mut self) {
        for pending in self.agents.drain(..) {
            pending.core.destroy();
        }
    }
}
