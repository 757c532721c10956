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

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::agent::AgentCore;
use crate::common::{CohortError, CoopId, Environment, EnvironmentInner, ExceptionReaction, Result};
use crate::coop::{DeregNotificator, DeregReason, RegNotificator};
use crate::dispatcher::AgentBinding;

struct Lifecycle {
    registered: bool,
    dereg_reason: Option<DeregReason>,
    children: Vec<Weak<CoopEntry>>,
    bindings: Vec<AgentBinding>,
}

/// A cooperation known to the environment, from registration until final
/// teardown.
///
/// `usage` counts what keeps the cooperation alive: one per agent until its
/// finish demand has run, one per registered child, one for being registered
/// and one while registration is still in progress. At zero the cooperation
/// is handed to the deregistration thread.
pub(crate) struct CoopEntry {
    id: CoopId,
    name: String,
    parent: Option<Arc<CoopEntry>>,
    reaction: ExceptionReaction,
    agents: Vec<Arc<AgentCore>>,
    usage: AtomicUsize,
    lifecycle: Mutex<Lifecycle>,
    reg_notificators: Vec<RegNotificator>,
    dereg_notificators: Vec<DeregNotificator>,
    env: Weak<EnvironmentInner>,
}

impl CoopEntry {
    pub(crate) fn new(
        env: &Environment,
        name: String,
        parent: Option<Arc<CoopEntry>>,
        reaction: ExceptionReaction,
        agents: Vec<Arc<AgentCore>>,
        reg_notificators: Vec<RegNotificator>,
        dereg_notificators: Vec<DeregNotificator>,
    ) -> Self {
        Self {
            id: CoopId::next(),
            name,
            parent,
            reaction,
            usage: AtomicUsize::new(agents.len() + 2),
            agents,
            lifecycle: Mutex::new(Lifecycle {
                registered: false,
                dereg_reason: None,
                children: Vec::new(),
                bindings: Vec::new(),
            }),
            reg_notificators,
            dereg_notificators,
            env: env.downgrade(),
        }
    }

    pub(crate) fn id(&self) -> CoopId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn parent(&self) -> Option<&Arc<CoopEntry>> {
        self.parent.as_ref()
    }

    pub(crate) fn reaction(&self) -> ExceptionReaction {
        self.reaction
    }

    pub(crate) fn environment(&self) -> Option<Environment> {
        Environment::from_weak(&self.env)
    }

    pub(crate) fn agents(&self) -> &[Arc<AgentCore>] {
        &self.agents
    }

    /// Reason given to the first deregistration request.
    pub(crate) fn dereg_reason(&self) -> Option<DeregReason> {
        self.lifecycle.lock().dereg_reason
    }

    /// Adds a child unless this cooperation is already being deregistered.
    fn try_add_child(&self, child: &Arc<CoopEntry>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.dereg_reason.is_some() {
            return false;
        }
        lifecycle.children.push(Arc::downgrade(child));
        self.usage.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub(crate) fn remove_child(&self, child: &CoopEntry) {
        let child: *const CoopEntry = child;
        self.lifecycle
            .lock()
            .children
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), child));
    }

    /// Marks the cooperation registered and keeps its dispatcher bindings.
    /// Returns true when deregistration was requested in the meantime.
    pub(crate) fn commit(&self, bindings: Vec<AgentBinding>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.registered = true;
        lifecycle.bindings = bindings;
        lifecycle.dereg_reason.is_some()
    }

    pub(crate) fn take_bindings(&self) -> Vec<AgentBinding> {
        std::mem::take(&mut self.lifecycle.lock().bindings)
    }

    /// Starts deregistration: children first, then this cooperation's agents.
    /// Later requests are ignored; the first reason wins.
    pub(crate) fn deregister(self: &Arc<Self>, reason: DeregReason) {
        let (registered, children) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.dereg_reason.is_some() {
                return;
            }
            lifecycle.dereg_reason = Some(reason);
            let children: Vec<_> = lifecycle.children.iter().filter_map(Weak::upgrade).collect();
            (lifecycle.registered, children)
        };
        debug!(coop = %self.name, %reason, children = children.len(), "deregistration started");

        for child in children {
            child.deregister(DeregReason::ParentDeregistration);
        }
        if registered {
            self.shutdown_agents();
        }
        self.release_usage();
    }

    pub(crate) fn shutdown_agents(&self) {
        for agent in &self.agents {
            agent.request_shutdown();
        }
    }

    pub(crate) fn release_usage(self: &Arc<Self>) {
        let previous = self.usage.fetch_sub(1, Ordering::AcqRel);
        trace!(coop = %self.name, usage = previous - 1, "usage released");
        if previous == 1 {
            match self.environment() {
                Some(env) => env.post_final_deregistration(Arc::clone(self)),
                None => warn!(coop = %self.name, "environment is gone; cooperation not finalized"),
            }
        }
    }

    pub(crate) fn notify_registered(&self, env: &Environment) {
        for notificator in &self.reg_notificators {
            notificator(env, &self.name);
        }
    }

    pub(crate) fn notify_deregistered(&self, env: &Environment, reason: DeregReason) {
        for notificator in &self.dereg_notificators {
            notificator(env, &self.name, reason);
        }
    }
}

impl Debug for CoopEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoopEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("usage", &self.usage.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct RepoState {
    coops: HashMap<String, Arc<CoopEntry>>,
    shutting_down: bool,
}

/// Name table of live cooperations.
pub(crate) struct CoopRepository {
    state: Mutex<RepoState>,
    changed: Condvar,
}

impl CoopRepository {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RepoState {
                coops: HashMap::new(),
                shutting_down: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Validates the name and parent and inserts the entry built by `make`.
    pub(crate) fn reserve(
        &self,
        name: &str,
        parent: Option<&str>,
        make: impl FnOnce(Option<Arc<CoopEntry>>) -> CoopEntry,
    ) -> Result<Arc<CoopEntry>> {
        let mut state = self.state.lock();
        if state.shutting_down {
            return Err(CohortError::RegistrationDuringShutdown(name.to_string()));
        }
        if state.coops.contains_key(name) {
            return Err(CohortError::CoopAlreadyRegistered(name.to_string()));
        }
        let parent = match parent {
            Some(parent_name) => Some(
                state
                    .coops
                    .get(parent_name)
                    .cloned()
                    .ok_or_else(|| CohortError::ParentCoopNotFound(parent_name.to_string()))?,
            ),
            None => None,
        };
        let entry = Arc::new(make(parent.clone()));
        if let Some(parent) = &parent {
            if !parent.try_add_child(&entry) {
                return Err(CohortError::ParentCoopNotFound(parent.name().to_string()));
            }
        }
        state.coops.insert(name.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub(crate) fn remove(&self, entry: &Arc<CoopEntry>) {
        let mut state = self.state.lock();
        if state
            .coops
            .get(entry.name())
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            state.coops.remove(entry.name());
        }
        self.changed.notify_all();
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<CoopEntry>> {
        self.state.lock().coops.get(name).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().coops.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuses further registrations and returns every live cooperation.
    pub(crate) fn begin_shutdown(&self) -> Vec<Arc<CoopEntry>> {
        let mut state = self.state.lock();
        state.shutting_down = true;
        self.changed.notify_all();
        state.coops.values().cloned().collect()
    }

    /// Blocks until shutdown has begun and every cooperation is gone.
    pub(crate) fn wait_until_drained(&self) {
        let mut state = self.state.lock();
        while !(state.shutting_down && state.coops.is_empty()) {
            self.changed.wait(&mut state);
        }
    }
}
