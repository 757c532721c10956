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
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::agent::AgentCore;
use crate::common::{AgentId, CohortError, MboxId, Result};
use crate::mbox::{DeliveryFilter, MboxKind, MessageBox};
use crate::message::{fail_request, MessageRef, ReplySender};

/// One agent's entry for one message type. An entry may carry only a filter
/// while the agent is not (yet) subscribed.
#[derive(Clone)]
struct Subscriber {
    id: AgentId,
    core: Weak<AgentCore>,
    subscribed: bool,
    filter: Option<DeliveryFilter>,
}

impl Subscriber {
    fn new(core: &Arc<AgentCore>) -> Self {
        Self {
            id: core.id(),
            core: Arc::downgrade(core),
            subscribed: false,
            filter: None,
        }
    }

    fn is_empty(&self) -> bool {
        !self.subscribed && self.filter.is_none()
    }
}

impl Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("subscribed", &self.subscribed)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// A live subscriber and the filter its message has to pass.
type Candidate = (Arc<AgentCore>, Option<DeliveryFilter>);

fn passes(filter: Option<&DeliveryFilter>, message: Option<&MessageRef>) -> bool {
    match (filter, message) {
        (Some(filter), Some(message)) => filter(message),
        _ => true,
    }
}

/// Multi-consumer mbox: every subscriber of a type gets every message of it
/// that its delivery filter lets through.
///
/// Subscriber lists are sorted by agent id, which makes re-subscription
/// idempotent and membership a binary search.
#[derive(Debug)]
pub(crate) struct LocalMbox {
    id: MboxId,
    subscribers: RwLock<HashMap<TypeId, Vec<Subscriber>>>,
}

impl LocalMbox {
    pub(crate) fn new() -> Self {
        Self {
            id: MboxId::next(),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribed agents that are still alive. Filters are run by the caller,
    /// outside the lock.
    fn candidates(&self, msg_type: TypeId) -> Vec<Candidate> {
        self.subscribers
            .read()
            .get(&msg_type)
            .map(|list| {
                list.iter()
                    .filter(|s| s.subscribed)
                    .filter_map(|s| s.core.upgrade().map(|core| (core, s.filter.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert_or_modify(
        &self,
        msg_type: TypeId,
        subscriber: &Arc<AgentCore>,
        change: impl FnOnce(&mut Subscriber),
    ) {
        let mut subscribers = self.subscribers.write();
        let list = subscribers.entry(msg_type).or_default();
        let id = subscriber.id();
        match list.binary_search_by_key(&id, |s| s.id) {
            Ok(position) => change(&mut list[position]),
            Err(position) => {
                let mut entry = Subscriber::new(subscriber);
                change(&mut entry);
                list.insert(position, entry);
            }
        }
    }

    fn modify_and_remove_if_empty(
        &self,
        msg_type: TypeId,
        subscriber: AgentId,
        change: impl FnOnce(&mut Subscriber),
    ) {
        let mut subscribers = self.subscribers.write();
        if let Some(list) = subscribers.get_mut(&msg_type) {
            if let Ok(position) = list.binary_search_by_key(&subscriber, |s| s.id) {
                change(&mut list[position]);
                if list[position].is_empty() {
                    list.remove(position);
                }
            }
            if list.is_empty() {
                subscribers.remove(&msg_type);
            }
        }
    }
}

impl MessageBox for LocalMbox {
    fn id(&self) -> MboxId {
        self.id
    }

    fn kind(&self) -> MboxKind {
        MboxKind::Mpmc
    }

    fn subscribe(&self, msg_type: TypeId, subscriber: &Arc<AgentCore>) -> Result<()> {
        self.insert_or_modify(msg_type, subscriber, |s| s.subscribed = true);
        Ok(())
    }

    fn unsubscribe(&self, msg_type: TypeId, subscriber: AgentId) {
        self.modify_and_remove_if_empty(msg_type, subscriber, |s| s.subscribed = false);
    }

    fn set_delivery_filter(
        &self,
        msg_type: TypeId,
        filter: DeliveryFilter,
        subscriber: &Arc<AgentCore>,
    ) -> Result<()> {
        self.insert_or_modify(msg_type, subscriber, |s| s.filter = Some(filter));
        Ok(())
    }

    fn drop_delivery_filter(&self, msg_type: TypeId, subscriber: AgentId) {
        self.modify_and_remove_if_empty(msg_type, subscriber, |s| s.filter = None);
    }

    fn deliver_message(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    ) {
        let candidates = self.candidates(msg_type);
        trace!(mbox = %self.id, type_name, subscribers = candidates.len(), "deliver");
        for (core, filter) in candidates {
            if passes(filter.as_ref(), message.as_ref()) {
                core.push_event(self.id, msg_type, type_name, message.clone(), depth);
            } else {
                trace!(mbox = %self.id, type_name, agent = %core.id(), "rejected by delivery filter");
            }
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
        let mut candidates = self.candidates(msg_type);
        match candidates.len() {
            0 => fail_request(reply, CohortError::NoServiceHandlers(type_name)),
            1 => match candidates.pop() {
                Some((core, filter)) if passes(filter.as_ref(), message.as_ref()) => {
                    core.push_service_request(self.id, msg_type, type_name, message, reply, depth);
                }
                _ => fail_request(reply, CohortError::NoServiceHandlers(type_name)),
            },
            _ => fail_request(reply, CohortError::MoreThanOneServiceHandler(type_name)),
        }
    }

    fn subscriber_count(&self, msg_type: TypeId) -> usize {
        self.subscribers
            .read()
            .get(&msg_type)
            .map_or(0, |list| list.iter().filter(|s| s.subscribed).count())
    }
}
