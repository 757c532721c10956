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
use crate::common::{CohortError, Result};
use crate::dispatcher::queue::{DemandQueue, QueueLockKind};
use crate::dispatcher::work_thread::WorkThread;
use crate::dispatcher::{AgentBinding, EventQueue};

struct Group {
    thread: Arc<WorkThread>,
    members: usize,
}

/// One worker thread per named group of agents.
///
/// The group's thread appears with its first member and is joined when the
/// last member unbinds; a later bind to the same name gets a new thread.
pub struct ActiveGroupDispatcher {
    lock: QueueLockKind,
    running: AtomicBool,
    groups: Mutex<HashMap<String, Group>>,
}

impl ActiveGroupDispatcher {
    pub(crate) fn new(lock: QueueLockKind) -> Self {
        Self {
            lock,
            running: AtomicBool::new(false),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn bind(self: &Arc<Self>, agent: &AgentCore, group: &str) -> Result<AgentBinding> {
        if !self.running.load(Ordering::Acquire) {
            return Err(CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: "dispatcher is not running".to_string(),
            });
        }

        let thread = {
            let mut groups = self.groups.lock();
            match groups.get_mut(group) {
                Some(existing) => {
                    existing.members += 1;
                    Arc::clone(&existing.thread)
                }
                None => {
                    let queue = Arc::new(DemandQueue::fifo(self.lock));
                    let thread = WorkThread::spawn(format!("cohort-ag-{group}"), queue).map_err(
                        |e| CohortError::AgentBindingFailed {
                            agent: agent.name().to_string(),
                            reason: e.to_string(),
                        },
                    )?;
                    debug!(group, thread = thread.id(), "active group thread started");
                    groups.insert(
                        group.to_string(),
                        Group {
                            thread: Arc::clone(&thread),
                            members: 1,
                        },
                    );
                    thread
                }
            }
        };

        let dispatcher = Arc::clone(self);
        let group = group.to_string();
        let queue: Arc<dyn EventQueue> = thread.queue().clone();
        Ok(AgentBinding::new(
            queue,
            Some(Box::new(move || dispatcher.release(&group))),
        ))
    }

    fn release(&self, group: &str) {
        let retired = {
            let mut groups = self.groups.lock();
            let last = match groups.get_mut(group) {
                Some(entry) => {
                    entry.members -= 1;
                    entry.members == 0
                }
                None => false,
            };
            if last {
                groups.remove(group)
            } else {
                None
            }
        };
        if let Some(retired) = retired {
            retired.thread.shutdown_and_join();
            debug!(group, "active group thread stopped");
        }
    }

    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        for group in self.groups.lock().values() {
            group.thread.shutdown();
        }
    }

    pub(crate) fn wait(&self) {
        let threads: Vec<_> = self
            .groups
            .lock()
            .drain()
            .map(|(_, group)| group.thread)
            .collect();
        for thread in threads {
            thread.join();
        }
    }

    /// Thread id serving `group`, if the group currently exists.
    #[must_use]
    pub fn group_thread_id(&self, group: &str) -> Option<u64> {
        self.groups.lock().get(group).map(|g| g.thread.id())
    }

    #[must_use]
    pub fn group_members(&self, group: &str) -> usize {
        self.groups.lock().get(group).map_or(0, |g| g.members)
    }
}
