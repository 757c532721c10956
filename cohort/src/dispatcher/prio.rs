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
use crate::common::{CohortError, Priority, Result};
use crate::dispatcher::one_thread::SingleThread;
use crate::dispatcher::queue::{DemandQueue, PriorityPolicy, QueueLockKind};
use crate::dispatcher::work_thread::WorkThread;
use crate::dispatcher::{AgentBinding, EventQueue};

/// One worker thread; demands are taken according to the agents' priorities.
///
/// Demands of one agent keep their order because an agent has a single
/// priority.
pub struct PrioOneThreadDispatcher {
    pub(crate) worker: SingleThread,
    policy: PriorityPolicy,
}

impl PrioOneThreadDispatcher {
    pub(crate) fn new(policy: PriorityPolicy, lock: QueueLockKind) -> Self {
        let policy = match policy {
            PriorityPolicy::Fifo => PriorityPolicy::StrictlyOrdered,
            other => other,
        };
        Self {
            worker: SingleThread::new(lock, policy),
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> PriorityPolicy {
        self.policy
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<u64> {
        self.worker.thread_id()
    }
}

/// A dedicated worker thread for every priority level.
pub struct PrioDedicatedThreadsDispatcher {
    lock: QueueLockKind,
    threads: Mutex<Vec<Arc<WorkThread>>>,
}

impl PrioDedicatedThreadsDispatcher {
    pub(crate) fn new(lock: QueueLockKind) -> Self {
        Self {
            lock,
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn start(&self, name: &str) -> Result<()> {
        let mut threads = self.threads.lock();
        if !threads.is_empty() {
            return Ok(());
        }
        for priority in Priority::ALL {
            let queue = Arc::new(DemandQueue::fifo(self.lock));
            threads.push(WorkThread::spawn(
                format!("cohort-{name}-p{}", priority.index()),
                queue,
            )?);
        }
        Ok(())
    }

    pub(crate) fn bind(&self, agent: &AgentCore) -> Result<AgentBinding> {
        let thread = self
            .threads
            .lock()
            .get(agent.priority().index())
            .cloned()
            .ok_or_else(|| CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: "dispatcher is not running".to_string(),
            })?;
        let queue: Arc<dyn EventQueue> = thread.queue().clone();
        Ok(AgentBinding::new(queue, None))
    }

    pub(crate) fn shutdown(&self) {
        for thread in self.threads.lock().iter() {
            thread.shutdown();
        }
    }

    pub(crate) fn wait(&self) {
        let threads = self.threads.lock().clone();
        for thread in threads {
            thread.join();
        }
    }

    /// Thread id serving `priority`.
    #[must_use]
    pub fn thread_id(&self, priority: Priority) -> Option<u64> {
        self.threads.lock().get(priority.index()).map(|t| t.id())
    }
}
