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

use std::sync::Arc;

use static_assertions::assert_impl_all;

use crate::common::MboxId;
use crate::traits::{AnyMessage, Message};

/// Shared handle to a message instance.
///
/// A broadcast delivers one `MessageRef` to every subscriber; the payload is
/// freed when the last queue entry or handler context lets go of it.
#[derive(Clone, Debug)]
pub struct MessageRef(Arc<dyn Message>);

impl MessageRef {
    pub fn new<M: Message>(message: M) -> Self {
        Self(Arc::new(message))
    }

    pub fn from_arc<M: Message>(message: Arc<M>) -> Self {
        Self(message)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        AnyMessage::type_name(&*self.0)
    }

    /// The concrete payload, if it is an `M`.
    #[must_use]
    pub fn downcast<M: Message>(&self) -> Option<Arc<M>> {
        AnyMessage::into_any_arc(Arc::clone(&self.0))
            .downcast::<M>()
            .ok()
    }

    pub(crate) fn payload<M: Message>(&self) -> Option<&M> {
        AnyMessage::as_any(&*self.0).downcast_ref::<M>()
    }
}

/// What a handler receives along with its agent.
#[derive(Debug)]
pub struct MessageContext<M> {
    message: Arc<M>,
    mbox_id: MboxId,
}

impl<M> MessageContext<M> {
    pub(crate) fn new(message: Arc<M>, mbox_id: MboxId) -> Self {
        Self { message, mbox_id }
    }

    #[must_use]
    pub fn message(&self) -> &M {
        &self.message
    }

    /// The shared payload, for forwarding without a copy.
    #[must_use]
    pub fn shared(&self) -> Arc<M> {
        Arc::clone(&self.message)
    }

    /// The mbox the message arrived through.
    #[must_use]
    pub fn mbox_id(&self) -> MboxId {
        self.mbox_id
    }
}

assert_impl_all!(MessageContext<u32>: Send, Sync);
assert_impl_all!(MessageRef: Send, Sync, Clone);
