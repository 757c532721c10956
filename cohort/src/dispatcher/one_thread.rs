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

use parking_lot::Mutex;

use crate::agent::AgentCore;
use crate::common::{CohortError, Result};
use crate::dispatcher::queue::{DemandQueue, PriorityPolicy, QueueLockKind};
use crate::dispatcher::work_thread::WorkThread;
use crate::dispatcher::{AgentBinding, EventQueue};

/// One worker thread over one queue, shared by every bound agent.
pub(crate) struct SingleThread {
    lock: QueueLockKind,
    policy: PriorityPolicy,
    thread: Mutex<Option<Arc<WorkThread>>>,
}

impl SingleThread {
    pub(crate) fn new(lock: QueueLockKind, policy: PriorityPolicy) -> Self {
        Self {
            lock,
            policy,
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self, name: &str) -> Result<()> {
        let mut thread = self.thread.lock();
        if thread.is_none() {
            let queue = Arc::new(DemandQueue::new(self.lock, self.policy));
            *thread = Some(WorkThread::spawn(format!("cohort-{name}"), queue)?);
        }
        Ok(())
    }

    pub(crate) fn bind(&self, agent: &AgentCore) -> Result<AgentBinding> {
        let thread = self
            .thread
            .lock()
            .clone()
            .ok_or_else(|| CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: "dispatcher is not running".to_string(),
            })?;
        let queue: Arc<dyn EventQueue> = thread.queue().clone();
        Ok(AgentBinding::new(queue, None))
    }

    pub(crate) fn shutdown(&self) {
        if let Some(thread) = self.thread.lock().as_ref() {
            thread.shutdown();
        }
    }

    pub(crate) fn wait(&self) {
        let thread = self.thread.lock().clone();
        if let Some(thread) = thread {
            thread.join();
        }
    }

    pub(crate) fn thread_id(&self) -> Option<u64> {
        self.thread.lock().as_ref().map(|t| t.id())
    }
}

/// Every bound agent shares one worker thread and one FIFO queue, so demands
/// run in the order they were queued across all agents.
pub struct OneThreadDispatcher {
    pub(crate) worker: SingleThread,
}

impl OneThreadDispatcher {
    pub(crate) fn new(lock: QueueLockKind) -> Self {
        Self {
            worker: SingleThread::new(lock, PriorityPolicy::Fifo),
        }
    }

    /// Id of the worker thread once started.
    #[must_use]
    pub fn thread_id(&self) -> Option<u64> {
        self.worker.thread_id()
    }
}
