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

use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::anyhow;
use parking_lot::RwLock;
use tracing::trace;

use crate::agent::handler::{Handler, Incoming};
use crate::agent::{AgentCore, ManagedAgent, Running};
use crate::common::{CohortError, MboxId, ThreadSafety};
use crate::message::{fail_request, BoxedReply, DemandKind, ExecutionDemand, ReplySender};

/// Executes demands against a concrete agent model.
pub(crate) trait AgentRunner: Send + Sync {
    fn thread_safety(&self, mbox_id: MboxId, msg_type: TypeId) -> ThreadSafety;

    fn execute(&self, demand: ExecutionDemand);

    /// Drops the agent. Later demands are ignored.
    fn destroy(&self);
}

/// Holds a running agent.
///
/// Exclusive handlers and lifecycle hooks take the write lock; thread-safe
/// handlers share the read lock.
pub(crate) struct AgentCell<M: Send + Sync + Debug + 'static> {
    agent: RwLock<Option<ManagedAgent<Running, M>>>,
}

impl<M: Send + Sync + Debug + 'static> AgentCell<M> {
    pub(crate) fn new(agent: ManagedAgent<Running, M>) -> Self {
        Self {
            agent: RwLock::new(Some(agent)),
        }
    }

    fn start(&self, core: &AgentCore) {
        let outcome = {
            let mut guard = self.agent.write();
            let Some(agent) = guard.as_mut() else {
                return;
            };
            core.mark_running();
            guarded(|| agent.run_start())
        };
        if let Err(err) = outcome {
            core.handle_failure(err);
        }
    }

    fn finish(&self, core: &AgentCore) {
        let outcome = {
            let mut guard = self.agent.write();
            match guard.as_mut() {
                Some(agent) => {
                    let outcome = guarded(|| agent.run_finish());
                    agent.subscriptions.clear();
                    outcome
                }
                None => Ok(()),
            }
        };
        core.mark_finished();
        if let Err(err) = outcome {
            core.log_failure(&err);
        }
        core.finish_completed();
    }

    /// Runs the handler for `incoming`; `None` when the current state has none.
    fn dispatch(
        &self,
        incoming: &Incoming,
        msg_type: TypeId,
    ) -> Option<anyhow::Result<Option<BoxedReply>>> {
        {
            let guard = self.agent.read();
            let agent = guard.as_ref()?;
            match agent.find_handler(incoming.mbox_id, msg_type)?.clone() {
                Handler::Shared(handler) => return Some(guarded(|| handler(agent, incoming))),
                Handler::Exclusive(_) => {}
            }
        }
        let mut guard = self.agent.write();
        let agent = guard.as_mut()?;
        let outcome = match agent.find_handler(incoming.mbox_id, msg_type)?.clone() {
            Handler::Exclusive(handler) => guarded(|| handler(agent, incoming)),
            Handler::Shared(handler) => guarded(|| handler(agent, incoming)),
        };
        Some(outcome)
    }

    fn event(
        &self,
        core: &AgentCore,
        incoming: &Incoming,
        msg_type: TypeId,
        type_name: &'static str,
        reply: Option<ReplySender>,
    ) {
        match (self.dispatch(incoming, msg_type), reply) {
            (None, None) => {
                trace!(agent = %core.id(), type_name, "no handler in current state");
            }
            (None, Some(reply)) => fail_request(reply, CohortError::ServiceNotHandled(type_name)),
            (Some(Ok(_)), None) => {}
            (Some(Ok(value)), Some(reply)) => {
                let value = value.unwrap_or_else(|| Box::new(()));
                let _ = reply.send(Ok(value));
            }
            (Some(Err(err)), None) => core.handle_failure(err),
            (Some(Err(err)), Some(reply)) => {
                fail_request(reply, CohortError::ServiceHandlerFailed(format!("{err:#}")));
            }
        }
    }
}

impl<M: Send + Sync + Debug + 'static> AgentRunner for AgentCell<M> {
    fn thread_safety(&self, mbox_id: MboxId, msg_type: TypeId) -> ThreadSafety {
        self.agent
            .read()
            .as_ref()
            .and_then(|agent| agent.find_handler(mbox_id, msg_type))
            .map_or(ThreadSafety::Unsafe, Handler::thread_safety)
    }

    fn execute(&self, demand: ExecutionDemand) {
        let ExecutionDemand {
            agent: core,
            mbox_id,
            msg_type,
            type_name,
            kind,
            limit,
        } = demand;
        match kind {
            DemandKind::Start => self.start(&core),
            DemandKind::Finish => self.finish(&core),
            DemandKind::Event(message) => {
                let incoming = Incoming { mbox_id, message };
                self.event(&core, &incoming, msg_type, type_name, None);
            }
            DemandKind::Service(message, reply) => {
                let incoming = Incoming { mbox_id, message };
                self.event(&core, &incoming, msg_type, type_name, Some(reply));
            }
        }
        drop(limit);
    }

    fn destroy(&self) {
        let agent = self.agent.write().take();
        drop(agent);
    }
}

/// Runs a handler, turning a panic into an error.
fn guarded<T>(handler: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    catch_unwind(AssertUnwindSafe(handler))
        .unwrap_or_else(|payload| Err(anyhow!("handler panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
