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
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::agent::AgentRunner;
use crate::common::{
    AgentId, CohortError, Environment, EnvironmentInner, ExceptionReaction, MboxId, Priority,
    Result, ThreadSafety,
};
use crate::coop::{CoopEntry, DeregReason};
use crate::dispatcher::EventQueue;
use crate::mbox::{Mbox, MpscMbox};
use crate::message::{ExecutionDemand, LimitGuard, LimitTable, MessageRef, OverlimitReaction, ReplySender};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AgentStatus {
    Created = 0,
    Bound = 1,
    Running = 2,
    Stopping = 3,
    Finished = 4,
    Unbound = 5,
}

impl AgentStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Bound,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Finished,
            _ => Self::Unbound,
        }
    }
}

/// Where demands for the agent go right now.
enum QueueSlot {
    /// Not bound yet; demands wait here and move to the real queue at bind.
    Temporary(Vec<ExecutionDemand>),
    Bound(Arc<dyn EventQueue>),
    Detached,
}

/// What to do with an incoming demand after the limit check.
enum Admission {
    Deliver(Option<LimitGuard>),
    Discard,
    Redirect(Mbox, usize),
}

/// The runtime side of an agent: identity, direct mbox, queue binding,
/// message limits and lifecycle status. Mboxes and demands refer to this,
/// never to the user's model.
pub(crate) struct AgentCore {
    id: AgentId,
    name: String,
    priority: Priority,
    reaction: ExceptionReaction,
    limits: LimitTable,
    max_redirection_depth: usize,
    status: AtomicU8,
    queue: Mutex<QueueSlot>,
    runner: OnceLock<Arc<dyn AgentRunner>>,
    coop: OnceLock<Weak<CoopEntry>>,
    env: Weak<EnvironmentInner>,
    direct_mbox: Mbox,
}

impl AgentCore {
    pub(crate) fn new(
        env: &Environment,
        name: Option<&str>,
        priority: Priority,
        reaction: ExceptionReaction,
        limits: LimitTable,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let id = AgentId::next();
            let direct_mbox = Mbox::new(
                Arc::new(MpscMbox::new(id, me.clone())),
                env.runtime_handle(),
            );
            Self {
                id,
                name: name.map_or_else(|| format!("agent-{}", id.value()), str::to_string),
                priority,
                reaction,
                limits,
                max_redirection_depth: env.max_redirection_depth(),
                status: AtomicU8::new(AgentStatus::Created as u8),
                queue: Mutex::new(QueueSlot::Temporary(Vec::new())),
                runner: OnceLock::new(),
                coop: OnceLock::new(),
                env: env.downgrade(),
                direct_mbox,
            }
        })
    }

    pub(crate) fn id(&self) -> AgentId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn direct_mbox(&self) -> &Mbox {
        &self.direct_mbox
    }

    pub(crate) fn direct_mbox_id(&self) -> MboxId {
        self.direct_mbox.id()
    }

    pub(crate) fn status(&self) -> AgentStatus {
        AgentStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: AgentStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn mark_running(&self) {
        let _ = self.status.compare_exchange(
            AgentStatus::Bound as u8,
            AgentStatus::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_finished(&self) {
        self.set_status(AgentStatus::Finished);
    }

    pub(crate) fn install_runner(&self, runner: Arc<dyn AgentRunner>) {
        if self.runner.set(runner).is_err() {
            warn!(agent = %self.id, "agent runner installed twice; keeping the first");
        }
    }

    pub(crate) fn set_coop(&self, coop: &Arc<CoopEntry>) {
        if self.coop.set(Arc::downgrade(coop)).is_err() {
            warn!(agent = %self.id, "agent already belongs to a cooperation");
        }
    }

    pub(crate) fn coop(&self) -> Option<Arc<CoopEntry>> {
        self.coop.get().and_then(Weak::upgrade)
    }

    pub(crate) fn coop_name(&self) -> Option<String> {
        self.coop().map(|coop| coop.name().to_string())
    }

    pub(crate) fn environment(&self) -> Option<Environment> {
        Environment::from_weak(&self.env)
    }

    /// Once an agent has limits, every subscribed type needs one.
    pub(crate) fn check_limit_defined(&self, msg_type: TypeId, type_name: &'static str) -> Result<()> {
        if self.limits.is_empty() || self.limits.contains_key(&msg_type) {
            Ok(())
        } else {
            Err(CohortError::MessageHasNoLimitDefined(type_name))
        }
    }

    fn admit(&self, msg_type: TypeId, type_name: &'static str, depth: usize) -> Admission {
        let Some(block) = self.limits.get(&msg_type) else {
            return Admission::Deliver(None);
        };
        if let Some(guard) = block.try_acquire() {
            return Admission::Deliver(Some(guard));
        }
        match &block.reaction {
            OverlimitReaction::Drop => {
                trace!(agent = %self.id, type_name, limit = block.limit, "limit reached, message dropped");
                Admission::Discard
            }
            OverlimitReaction::LogThenDeliver => {
                warn!(agent = %self.id, type_name, limit = block.limit, pending = block.pending(), "limit exceeded, delivering anyway");
                Admission::Deliver(Some(block.force_acquire()))
            }
            OverlimitReaction::Redirect(target) => {
                if depth >= self.max_redirection_depth {
                    error!(agent = %self.id, type_name, depth, "redirection depth exceeded, message dropped");
                    Admission::Discard
                } else {
                    Admission::Redirect(target.clone(), depth + 1)
                }
            }
            OverlimitReaction::Abort => {
                error!(agent = %self.id, type_name, limit = block.limit, "limit exceeded, aborting");
                std::process::abort();
            }
        }
    }

    pub(crate) fn push_event(
        self: &Arc<Self>,
        mbox_id: MboxId,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    ) {
        match self.admit(msg_type, type_name, depth) {
            Admission::Deliver(limit) => self.push(ExecutionDemand::event(
                Arc::clone(self),
                mbox_id,
                msg_type,
                type_name,
                message,
                limit,
            )),
            Admission::Discard => {}
            Admission::Redirect(target, depth) => target.redirect(msg_type, type_name, message, depth),
        }
    }

    pub(crate) fn push_service_request(
        self: &Arc<Self>,
        mbox_id: MboxId,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        reply: ReplySender,
        depth: usize,
    ) {
        match self.admit(msg_type, type_name, depth) {
            Admission::Deliver(limit) => self.push(ExecutionDemand::service(
                Arc::clone(self),
                mbox_id,
                msg_type,
                type_name,
                message,
                reply,
                limit,
            )),
            Admission::Discard => drop(reply),
            Admission::Redirect(target, depth) => {
                target.redirect_request(msg_type, type_name, message, reply, depth);
            }
        }
    }

    fn push(&self, demand: ExecutionDemand) {
        let rejected = {
            let mut slot = self.queue.lock();
            if self.status() >= AgentStatus::Stopping {
                Some(demand)
            } else {
                match &mut *slot {
                    QueueSlot::Temporary(stash) => {
                        stash.push(demand);
                        None
                    }
                    QueueSlot::Bound(queue) => queue.push(demand).err(),
                    QueueSlot::Detached => Some(demand),
                }
            }
        };
        if let Some(demand) = rejected {
            trace!(agent = %self.id, type_name = demand.type_name, "agent no longer accepts demands");
        }
    }

    /// Attaches the agent to its dispatcher queue. The start demand goes first,
    /// then everything sent before registration, in order.
    pub(crate) fn bind(self: &Arc<Self>, queue: Arc<dyn EventQueue>) {
        let mut slot = self.queue.lock();
        let stashed = match std::mem::replace(&mut *slot, QueueSlot::Bound(Arc::clone(&queue))) {
            QueueSlot::Temporary(stashed) => stashed,
            QueueSlot::Bound(_) | QueueSlot::Detached => Vec::new(),
        };
        self.set_status(AgentStatus::Bound);
        if queue.push(ExecutionDemand::start(Arc::clone(self))).is_err() {
            error!(agent = %self.id, "dispatcher queue rejected the start demand");
            std::process::abort();
        }
        for demand in stashed {
            if queue.push(demand).is_err() {
                error!(agent = %self.id, "dispatcher queue rejected a demand while binding");
                std::process::abort();
            }
        }
    }

    /// Stops accepting demands and queues the finish demand behind the ones
    /// already waiting. Does nothing for an agent that is not bound yet.
    pub(crate) fn request_shutdown(self: &Arc<Self>) {
        let rejected = {
            let slot = self.queue.lock();
            let QueueSlot::Bound(queue) = &*slot else {
                return;
            };
            if self.status() >= AgentStatus::Stopping {
                return;
            }
            self.set_status(AgentStatus::Stopping);
            queue.push(ExecutionDemand::finish(Arc::clone(self))).err()
        };
        if let Some(finish) = rejected {
            warn!(agent = %self.id, "dispatcher rejected the finish demand; finishing inline");
            finish.execute();
        }
    }

    /// Called once the finish demand has run.
    pub(crate) fn finish_completed(&self) {
        if let Some(coop) = self.coop() {
            coop.release_usage();
        }
    }

    pub(crate) fn detach(&self) {
        let old = {
            let mut slot = self.queue.lock();
            std::mem::replace(&mut *slot, QueueSlot::Detached)
        };
        self.set_status(AgentStatus::Unbound);
        drop(old);
    }

    /// Detaches the agent and drops its model, which releases the model's
    /// own references to the runtime.
    pub(crate) fn destroy(&self) {
        self.detach();
        if let Some(runner) = self.runner.get() {
            runner.destroy();
        }
    }

    pub(crate) fn execute(&self, demand: ExecutionDemand) {
        match self.runner.get() {
            Some(runner) => runner.execute(demand),
            None => warn!(agent = %self.id, "demand for an agent without a runner"),
        }
    }

    pub(crate) fn thread_safety_of(&self, demand: &ExecutionDemand) -> ThreadSafety {
        self.runner
            .get()
            .map_or(ThreadSafety::Unsafe, |runner| {
                runner.thread_safety(demand.mbox_id, demand.msg_type)
            })
    }

    pub(crate) fn log_failure(&self, err: &anyhow::Error) {
        let coop_name = self.coop_name().unwrap_or_default();
        match self.environment() {
            Some(env) => env.exception_logger().log_exception(err, &coop_name),
            None => error!(agent = %self.id, coop = coop_name, error = %format!("{err:#}"), "handler failed"),
        }
    }

    /// Reports a handler failure and applies the resolved exception reaction.
    pub(crate) fn handle_failure(&self, err: anyhow::Error) {
        self.log_failure(&err);
        let coop = self.coop();
        let env = self.environment();
        let mut fallbacks = Vec::with_capacity(2);
        if let Some(coop) = &coop {
            fallbacks.push(coop.reaction());
        }
        if let Some(env) = &env {
            fallbacks.push(env.exception_reaction());
        }
        match self.reaction.resolve(&fallbacks) {
            ExceptionReaction::Ignore => {
                warn!(agent = %self.id, "handler failure ignored");
            }
            ExceptionReaction::DeregisterCoop => match coop {
                Some(coop) => coop.deregister(DeregReason::UnhandledException),
                None => warn!(agent = %self.id, "failing agent has no cooperation to deregister"),
            },
            ExceptionReaction::ShutdownEnvironment => {
                if let Some(env) = env {
                    env.stop();
                }
            }
            ExceptionReaction::Abort | ExceptionReaction::Inherit => {
                error!(agent = %self.id, "unhandled handler failure, aborting");
                std::process::abort();
            }
        }
    }
}

impl Debug for AgentCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
