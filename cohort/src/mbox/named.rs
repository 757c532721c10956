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
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::agent::AgentCore;
use crate::common::{AgentId, MboxId, Result};
use crate::mbox::local::LocalMbox;
use crate::mbox::{DeliveryFilter, MboxKind, MessageBox};
use crate::message::{MessageRef, ReplySender};

/// Name table of an environment. Entries are weak; the mbox removes its own
/// entry when its last handle goes away.
pub(crate) type NamedMboxRegistry = DashMap<String, Weak<NamedMbox>>;

#[derive(Debug)]
pub(crate) struct NamedMbox {
    name: String,
    inner: LocalMbox,
    registry: Weak<NamedMboxRegistry>,
}

/// Returns the live mbox registered under `name`, creating it when absent.
pub(crate) fn lookup_or_create(registry: &Arc<NamedMboxRegistry>, name: &str) -> Arc<NamedMbox> {
    let fresh = || {
        Arc::new(NamedMbox {
            name: name.to_string(),
            inner: LocalMbox::new(),
            registry: Arc::downgrade(registry),
        })
    };
    match registry.entry(name.to_string()) {
        Entry::Occupied(mut entry) => {
            if let Some(existing) = entry.get().upgrade() {
                return existing;
            }
            let mbox = fresh();
            entry.insert(Arc::downgrade(&mbox));
            mbox
        }
        Entry::Vacant(entry) => {
            let mbox = fresh();
            debug!(name, mbox = %mbox.inner.id(), "named mbox created");
            entry.insert(Arc::downgrade(&mbox));
            mbox
        }
    }
}

impl Drop for NamedMbox {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(&self.name, |_, weak| weak.strong_count() == 0);
        }
    }
}

impl MessageBox for NamedMbox {
    fn id(&self) -> MboxId {
        self.inner.id()
    }

    fn kind(&self) -> MboxKind {
        MboxKind::Mpmc
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn subscribe(&self, msg_type: TypeId, subscriber: &Arc<AgentCore>) -> Result<()> {
        self.inner.subscribe(msg_type, subscriber)
    }

    fn unsubscribe(&self, msg_type: TypeId, subscriber: AgentId) {
        self.inner.unsubscribe(msg_type, subscriber);
    }

    fn set_delivery_filter(
        &self,
        msg_type: TypeId,
        filter: DeliveryFilter,
        subscriber: &Arc<AgentCore>,
    ) -> Result<()> {
        self.inner.set_delivery_filter(msg_type, filter, subscriber)
    }

    fn drop_delivery_filter(&self, msg_type: TypeId, subscriber: AgentId) {
        self.inner.drop_delivery_filter(msg_type, subscriber);
    }

    fn deliver_message(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    ) {
        self.inner.deliver_message(msg_type, type_name, message, depth);
    }

    fn deliver_service_request(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        reply: ReplySender,
        depth: usize,
    ) {
        self.inner
            .deliver_service_request(msg_type, type_name, message, reply, depth);
    }

    fn subscriber_count(&self, msg_type: TypeId) -> usize {
        self.inner.subscriber_count(msg_type)
    }
}
