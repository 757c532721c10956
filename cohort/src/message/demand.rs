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
use std::sync::Arc;

use crate::agent::AgentCore;
use crate::common::{MboxId, Priority, ThreadSafety};
use crate::message::{LimitGuard, MessageRef, ReplySender};

pub(crate) enum DemandKind {
    Start,
    Finish,
    Event(Option<MessageRef>),
    Service(Option<MessageRef>, ReplySender),
}

/// One unit of work for one agent.
pub(crate) struct ExecutionDemand {
    pub(crate) agent: Arc<AgentCore>,
    pub(crate) mbox_id: MboxId,
    pub(crate) msg_type: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) kind: DemandKind,
    pub(crate) limit: Option<LimitGuard>,
}

impl ExecutionDemand {
    pub(crate) fn start(agent: Arc<AgentCore>) -> Self {
        Self::lifecycle(agent, DemandKind::Start)
    }

    pub(crate) fn finish(agent: Arc<AgentCore>) -> Self {
        Self::lifecycle(agent, DemandKind::Finish)
    }

    fn lifecycle(agent: Arc<AgentCore>, kind: DemandKind) -> Self {
        Self {
            mbox_id: agent.direct_mbox_id(),
            agent,
            msg_type: TypeId::of::<()>(),
            type_name: "()",
            kind,
            limit: None,
        }
    }

    pub(crate) fn event(
        agent: Arc<AgentCore>,
        mbox_id: MboxId,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        limit: Option<LimitGuard>,
    ) -> Self {
        Self {
            agent,
            mbox_id,
            msg_type,
            type_name,
            kind: DemandKind::Event(message),
            limit,
        }
    }

    pub(crate) fn service(
        agent: Arc<AgentCore>,
        mbox_id: MboxId,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        reply: ReplySender,
        limit: Option<LimitGuard>,
    ) -> Self {
        Self {
            agent,
            mbox_id,
            msg_type,
            type_name,
            kind: DemandKind::Service(message, reply),
            limit,
        }
    }

    pub(crate) fn priority(&self) -> Priority {
        self.agent.priority()
    }

    /// Start and finish demands are always exclusive.
    pub(crate) fn thread_safety(&self) -> ThreadSafety {
        match self.kind {
            DemandKind::Start | DemandKind::Finish => ThreadSafety::Unsafe,
            DemandKind::Event(_) | DemandKind::Service(..) => self.agent.thread_safety_of(self),
        }
    }

    pub(crate) fn execute(self) {
        let agent = Arc::clone(&self.agent);
        agent.execute(self);
    }
}

/// Type-erased reply sent back to a service requester.
pub(crate) type BoxedReply = Box<dyn Any + Send>;
