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
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{CohortError, Result};
use crate::mbox::Mbox;
use crate::traits::{Message, Signal};

/// What happens to a message that arrives while its limit is exhausted.
#[derive(Debug, Clone)]
pub enum OverlimitReaction {
    /// Discard it silently.
    Drop,
    /// Deliver it to another mbox instead.
    Redirect(Mbox),
    /// Log a warning and queue it anyway.
    LogThenDeliver,
    /// Log an error and abort the process.
    Abort,
}

/// Cap on the number of pending demands of one message type for one agent.
#[derive(Debug, Clone)]
pub struct MessageLimit {
    pub(crate) msg_type: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) limit: usize,
    pub(crate) reaction: OverlimitReaction,
}

impl MessageLimit {
    #[must_use]
    pub fn of<M: Message>(limit: usize, reaction: OverlimitReaction) -> Self {
        Self {
            msg_type: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            limit,
            reaction,
        }
    }

    #[must_use]
    pub fn of_signal<S: Signal>(limit: usize, reaction: OverlimitReaction) -> Self {
        Self {
            msg_type: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            limit,
            reaction,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LimitControlBlock {
    pub(crate) type_name: &'static str,
    pub(crate) limit: usize,
    pub(crate) reaction: OverlimitReaction,
    count: AtomicUsize,
}

impl LimitControlBlock {
    fn new(limit: &MessageLimit) -> Self {
        Self {
            type_name: limit.type_name,
            limit: limit.limit,
            reaction: limit.reaction.clone(),
            count: AtomicUsize::new(0),
        }
    }

    /// Takes a slot unless the limit is reached.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<LimitGuard> {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        if previous >= self.limit {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(LimitGuard(Arc::clone(self)))
    }

    /// Takes a slot regardless of the limit.
    pub(crate) fn force_acquire(self: &Arc<Self>) -> LimitGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        LimitGuard(Arc::clone(self))
    }

    pub(crate) fn pending(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Holds one pending slot; released when the demand is gone.
#[derive(Debug)]
pub(crate) struct LimitGuard(Arc<LimitControlBlock>);

impl Drop for LimitGuard {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) type LimitTable = HashMap<TypeId, Arc<LimitControlBlock>>;

pub(crate) fn build_limit_table(limits: &[MessageLimit]) -> Result<LimitTable> {
    let mut table = LimitTable::with_capacity(limits.len());
    for limit in limits {
        if table
            .insert(limit.msg_type, Arc::new(LimitControlBlock::new(limit)))
            .is_some()
        {
            return Err(CohortError::SeveralLimitsForOneMessageType(limit.type_name));
        }
    }
    Ok(table)
}
