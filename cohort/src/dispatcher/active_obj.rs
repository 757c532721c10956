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

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::agent::AgentCore;
use crate::common::{AgentId, CohortError, Result};
use crate::dispatcher::queue::{DemandQueue, QueueLockKind};
use crate::dispatcher::work_thread::WorkThread;
use crate::dispatcher::{AgentBinding, EventQueue};

/// A dedicated worker thread per agent, started at bind and joined at unbind.
pub struct ActiveObjDispatcher {
    lock: QueueLockKind,
    running: AtomicBool,
    threads: Mutex<HashMap<AgentId, Arc<WorkThread>>>,
}

impl ActiveObjDispatcher {
    pub(crate) fn new(lock: QueueLockKind) -> Self {
        Self {
            lock,
            running: AtomicBool::new(false),
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn bind(self: &Arc<Self>, agent: &AgentCore) -> Result<AgentBinding> {
        if !self.running.load(Ordering::Acquire) {
            return Err(CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: "dispatcher is not running".to_string(),
            });
        }
        let queue = Arc::new(DemandQueue::fifo(self.lock));
        let thread = WorkThread::spawn(format!("cohort-ao-{}", agent.id().value()), queue)
            .map_err(|e| CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: e.to_string(),
            })?;
        let agent_id = agent.id();
        self.threads.lock().insert(agent_id, Arc::clone(&thread));
        debug!(agent = %agent_id, thread = thread.id(), "active object thread started");

        let dispatcher = Arc::clone(self);
        let queue: Arc<dyn EventQueue> = thread.queue().clone();
        Ok(AgentBinding::new(
            queue,
            Some(Box::new(move || {
                let thread = dispatcher.threads.lock().remove(&agent_id);
                if let Some(thread) = thread {
                    thread.shutdown_and_join();
                    debug!(agent = %agent_id, "active object thread stopped");
                }
            })),
        ))
    }

    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        for thread in self.threads.lock().values() {
            thread.shutdown();
        }
    }

    pub(crate) fn wait(&self) {
        let threads: Vec<_> = self.threads.lock().drain().map(|(_, t)| t).collect();
        for thread in threads {
            thread.join();
        }
    }

    /// Number of agents currently owning a thread.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}
