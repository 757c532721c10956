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
use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::agent::AgentCore;
use crate::common::{AgentId, CohortError, MboxId, Result};
use crate::mbox::{DeliveryFilter, MboxKind, MessageBox};
use crate::message::{fail_request, MessageRef, ReplySender};

/// An agent's direct mbox. Only the owner may subscribe; sends go straight to
/// the owner's queue without fan-out. Delivery filters are not supported.
#[derive(Debug)]
pub(crate) struct MpscMbox {
    id: MboxId,
    owner_id: AgentId,
    owner: Weak<AgentCore>,
    subscribed: RwLock<HashSet<TypeId>>,
}

impl MpscMbox {
    pub(crate) fn new(owner_id: AgentId, owner: Weak<AgentCore>) -> Self {
        Self {
            id: MboxId::next(),
            owner_id,
            owner,
            subscribed: RwLock::new(HashSet::new()),
        }
    }

    fn owner_for(&self, msg_type: TypeId) -> Option<Arc<AgentCore>> {
        if self.subscribed.read().contains(&msg_type) {
            self.owner.upgrade()
        } else {
            None
        }
    }
}

impl MessageBox for MpscMbox {
    fn id(&self) -> MboxId {
        self.id
    }

    fn kind(&self) -> MboxKind {
        MboxKind::Mpsc
    }

    fn subscribe(&self, msg_type: TypeId, subscriber: &Arc<AgentCore>) -> Result<()> {
        if subscriber.id() != self.owner_id {
            return Err(CohortError::IllegalSubscriberForMpscMbox(self.id));
        }
        self.subscribed.write().insert(msg_type);
        Ok(())
    }

    fn unsubscribe(&self, msg_type: TypeId, subscriber: AgentId) {
        if subscriber == self.owner_id {
            self.subscribed.write().remove(&msg_type);
        }
    }

    fn set_delivery_filter(
        &self,
        _msg_type: TypeId,
        _filter: DeliveryFilter,
        _subscriber: &Arc<AgentCore>,
    ) -> Result<()> {
        Err(CohortError::DeliveryFilterOnMpscMbox(self.id))
    }

    fn drop_delivery_filter(&self, _msg_type: TypeId, _subscriber: AgentId) {}

    fn deliver_message(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    ) {
        match self.owner_for(msg_type) {
            Some(owner) => owner.push_event(self.id, msg_type, type_name, message, depth),
            None => trace!(mbox = %self.id, type_name, "no subscription, message ignored"),
        }
    }

    fn deliver_service_request(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        reply: ReplySender,
        depth: usize,
    ) {
        match self.owner_for(msg_type) {
            Some(owner) => {
                owner.push_service_request(self.id, msg_type, type_name, message, reply, depth);
            }
            None => fail_request(reply, CohortError::NoServiceHandlers(type_name)),
        }
    }

    fn subscriber_count(&self, msg_type: TypeId) -> usize {
        usize::from(self.subscribed.read().contains(&msg_type))
    }
}
