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

//! Mboxes: the addresses messages are sent to.

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::agent::AgentCore;
use crate::common::{AgentId, MboxId, Result};
use crate::message::{MessageRef, ReplySender, ServiceFuture, Wait};
use crate::traits::{Message, Signal};

pub(crate) use local::LocalMbox;
pub(crate) use mpsc::MpscMbox;
pub(crate) use named::{lookup_or_create, NamedMboxRegistry};

mod local;
mod mpsc;
mod named;

/// Per-subscriber predicate over a message; `false` keeps the message from
/// that subscriber.
pub(crate) type DeliveryFilter = Arc<dyn Fn(&MessageRef) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MboxKind {
    /// Multi-producer, multi-consumer: fan-out to every subscriber.
    Mpmc,
    /// Multi-producer, single-consumer: an agent's direct mbox.
    Mpsc,
}

pub(crate) trait MessageBox: Send + Sync + Debug {
    fn id(&self) -> MboxId;

    fn kind(&self) -> MboxKind;

    fn name(&self) -> Option<&str> {
        None
    }

    fn subscribe(&self, msg_type: TypeId, subscriber: &Arc<AgentCore>) -> Result<()>;

    fn unsubscribe(&self, msg_type: TypeId, subscriber: AgentId);

    /// Installs or replaces `subscriber`'s filter for `msg_type`.
    fn set_delivery_filter(
        &self,
        msg_type: TypeId,
        filter: DeliveryFilter,
        subscriber: &Arc<AgentCore>,
    ) -> Result<()>;

    fn drop_delivery_filter(&self, msg_type: TypeId, subscriber: AgentId);

    fn deliver_message(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    );

    fn deliver_service_request(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        reply: ReplySender,
        depth: usize,
    );

    fn subscriber_count(&self, msg_type: TypeId) -> usize;
}

/// Handle to an mbox. Cloning shares the mbox; it lives while any handle,
/// subscription or timer refers to it.
#[derive(Clone)]
pub struct Mbox {
    inner: Arc<dyn MessageBox>,
    runtime: Handle,
}

impl Mbox {
    pub(crate) fn new(inner: Arc<dyn MessageBox>, runtime: Handle) -> Self {
        Self { inner, runtime }
    }

    #[must_use]
    pub fn id(&self) -> MboxId {
        self.inner.id()
    }

    #[must_use]
    pub fn kind(&self) -> MboxKind {
        self.inner.kind()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Sends a message asynchronously. Never blocks; with no subscriber the
    /// message is simply discarded.
    pub fn send<M: Message>(&self, message: M) {
        self.send_ref(
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            Some(MessageRef::new(message)),
        );
    }

    /// Sends an already shared message without copying it.
    pub fn send_shared<M: Message>(&self, message: Arc<M>) {
        self.send_ref(
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            Some(MessageRef::from_arc(message)),
        );
    }

    pub fn send_signal<S: Signal>(&self) {
        self.send_ref(TypeId::of::<S>(), std::any::type_name::<S>(), None);
    }

    pub(crate) fn send_ref(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
    ) {
        self.inner.deliver_message(msg_type, type_name, message, 0);
    }

    pub(crate) fn redirect(
        &self,
        msg_type: TypeId,
        type_name: &'static str,
        message: Option<MessageRef>,
        depth: usize,
    ) {
        self.inner.deliver_message(msg_type, type_name, message, depth);
    }

    pub(crate) fn redirect_request(
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

    /// Issues a service request to the single handler of `M` on this mbox.
    ///
    /// Delivery failures are reported through the returned future.
    pub fn request<R, M>(&self, message: M) -> ServiceFuture<R>
    where
        R: Send + 'static,
        M: Message,
    {
        let (reply, future) = ServiceFuture::channel(self.runtime.clone());
        self.inner.deliver_service_request(
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            Some(MessageRef::new(message)),
            reply,
            0,
        );
        future
    }

    pub fn request_signal<R, S>(&self) -> ServiceFuture<R>
    where
        R: Send + 'static,
        S: Signal,
    {
        let (reply, future) = ServiceFuture::channel(self.runtime.clone());
        self.inner.deliver_service_request(
            TypeId::of::<S>(),
            std::any::type_name::<S>(),
            None,
            reply,
            0,
        );
        future
    }

    /// Issues a service request and blocks for its reply.
    ///
    /// # Errors
    ///
    /// Any delivery, handler or timeout failure of the request.
    pub fn request_value<R, M>(&self, message: M, wait: Wait) -> Result<R>
    where
        R: Send + 'static,
        M: Message,
    {
        self.request::<R, M>(message).wait(wait)
    }

    /// Number of current subscribers for `M`.
    #[must_use]
    pub fn subscriber_count<M: 'static>(&self) -> usize {
        self.inner.subscriber_count(TypeId::of::<M>())
    }

    pub(crate) fn subscribe(&self, msg_type: TypeId, subscriber: &Arc<AgentCore>) -> Result<()> {
        self.inner.subscribe(msg_type, subscriber)
    }

    pub(crate) fn unsubscribe(&self, msg_type: TypeId, subscriber: AgentId) {
        self.inner.unsubscribe(msg_type, subscriber);
    }

    pub(crate) fn set_delivery_filter(
        &self,
        msg_type: TypeId,
        filter: DeliveryFilter,
        subscriber: &Arc<AgentCore>,
    ) -> Result<()> {
        self.inner.set_delivery_filter(msg_type, filter, subscriber)
    }

    pub(crate) fn drop_delivery_filter(&self, msg_type: TypeId, subscriber: AgentId) {
        self.inner.drop_delivery_filter(msg_type, subscriber);
    }
}

impl Debug for Mbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mbox")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Mbox {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Mbox {}

impl PartialOrd for Mbox {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Mbox {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl Hash for Mbox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}
