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

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{info_span, trace, warn};

use crate::agent::AgentCore;
use crate::common::{CohortError, Priority, Result, ThreadSafety, CONFIG};
use crate::dispatcher::queue::{DemandQueue, QueueLockKind};
use crate::dispatcher::{AgentBinding, EventQueue};
use crate::message::ExecutionDemand;

/// How agents bound to a thread pool share demand queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FifoKind {
    /// All agents of a cooperation share one queue and run one at a time.
    #[default]
    Cooperation,
    /// Each agent has its own queue. Thread-safe handlers of the agent may
    /// run on several workers at once.
    Individual,
}

#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolParams {
    pub thread_count: usize,
    pub max_demands_at_once: usize,
    pub queue_lock: QueueLockKind,
}

impl Default for ThreadPoolParams {
    fn default() -> Self {
        Self {
            thread_count: CONFIG.thread_pool_size(),
            max_demands_at_once: CONFIG.limits.max_demands_at_once,
            queue_lock: CONFIG.queue_lock(),
        }
    }
}

impl ThreadPoolParams {
    #[must_use]
    pub fn with_thread_count(mut self, count: usize) -> Self {
        self.thread_count = count.max(1);
        self
    }

    #[must_use]
    pub fn with_max_demands_at_once(mut self, count: usize) -> Self {
        self.max_demands_at_once = count.max(1);
        self
    }

    #[must_use]
    pub fn with_queue_lock(mut self, lock: QueueLockKind) -> Self {
        self.queue_lock = lock;
        self
    }
}

/// Per-binding options of a thread-pool binder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolBindParams {
    pub fifo: FifoKind,
    /// Overrides the dispatcher-wide `max_demands_at_once`.
    pub max_demands_at_once: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Exclusive,
    Shared,
}

struct AgentQueueState {
    demands: VecDeque<ExecutionDemand>,
    in_ready: bool,
    exclusive: bool,
    shared: usize,
    closed: bool,
}

/// Demands of one agent (or one cooperation) waiting for a pool worker.
///
/// The queue sits in the pool's ready queue at most once. A worker serves up
/// to `max_at_once` demands and then puts the queue back if work remains.
pub(crate) struct AgentQueue {
    priority: Priority,
    max_at_once: usize,
    parallel: bool,
    ready: Weak<DemandQueue<Arc<AgentQueue>>>,
    me: Weak<AgentQueue>,
    state: Mutex<AgentQueueState>,
}

impl AgentQueue {
    fn new(
        priority: Priority,
        max_at_once: usize,
        parallel: bool,
        ready: &Arc<DemandQueue<Arc<AgentQueue>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            priority,
            max_at_once,
            parallel,
            ready: Arc::downgrade(ready),
            me: me.clone(),
            state: Mutex::new(AgentQueueState {
                demands: VecDeque::new(),
                in_ready: false,
                exclusive: false,
                shared: 0,
                closed: false,
            }),
        })
    }

    fn schedule(&self) {
        if let (Some(ready), Some(me)) = (self.ready.upgrade(), self.me.upgrade()) {
            if ready.push(self.priority, me).is_err() {
                trace!("thread pool is shut down, agent queue not scheduled");
            }
        }
    }

    fn process(&self) {
        self.state.lock().in_ready = false;
        let mut processed = 0;
        while processed < self.max_at_once {
            let Some((demand, mode)) = self.take_next() else {
                break;
            };
            demand.execute();
            let mut state = self.state.lock();
            match mode {
                RunMode::Exclusive => state.exclusive = false,
                RunMode::Shared => state.shared -= 1,
            }
            processed += 1;
        }
        self.reschedule_if_idle();
    }

    fn take_next(&self) -> Option<(ExecutionDemand, RunMode)> {
        let mut state = self.state.lock();
        if state.exclusive {
            return None;
        }
        let front = state.demands.front()?;
        let shared = self.parallel && front.thread_safety() == ThreadSafety::Safe;
        if shared {
            let demand = state.demands.pop_front()?;
            state.shared += 1;
            let fan_out = !state.demands.is_empty() && !state.in_ready;
            if fan_out {
                state.in_ready = true;
            }
            drop(state);
            if fan_out {
                self.schedule();
            }
            Some((demand, RunMode::Shared))
        } else {
            if state.shared > 0 {
                return None;
            }
            state.exclusive = true;
            state.demands.pop_front().map(|d| (d, RunMode::Exclusive))
        }
    }

    fn reschedule_if_idle(&self) {
        let mut state = self.state.lock();
        let schedule =
            !state.demands.is_empty() && !state.in_ready && !state.exclusive && state.shared == 0;
        if schedule {
            state.in_ready = true;
        }
        drop(state);
        if schedule {
            self.schedule();
        }
    }

    fn close(&self) {
        let leftovers: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.demands.drain(..).collect()
        };
        drop(leftovers);
    }
}

impl EventQueue for AgentQueue {
    fn push(&self, demand: ExecutionDemand) -> std::result::Result<(), ExecutionDemand> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(demand);
        }
        state.demands.push_back(demand);
        let schedule = !state.in_ready && !state.exclusive && state.shared == 0;
        if schedule {
            state.in_ready = true;
        }
        drop(state);
        if schedule {
            self.schedule();
        }
        Ok(())
    }
}

/// A fixed set of workers serving agent queues in the order they became ready.
pub struct ThreadPoolDispatcher {
    params: ThreadPoolParams,
    ready: Arc<DemandQueue<Arc<AgentQueue>>>,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    coop_queues: Mutex<HashMap<String, (Arc<AgentQueue>, usize)>>,
}

impl ThreadPoolDispatcher {
    pub(crate) fn new(params: ThreadPoolParams) -> Self {
        Self {
            ready: Arc::new(DemandQueue::fifo(params.queue_lock)),
            params,
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            coop_queues: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn start(&self, name: &str) -> Result<()> {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }
        for index in 0..self.params.thread_count.max(1) {
            let ready = Arc::clone(&self.ready);
            let label = format!("cohort-{name}-{index}");
            let span_label = label.clone();
            let handle = std::thread::Builder::new()
                .name(label)
                .spawn(move || {
                    let span = info_span!("cohort_worker", thread = %span_label);
                    let _enter = span.enter();
                    while let Some(queue) = ready.pop() {
                        queue.process();
                    }
                })
                .map_err(|e| CohortError::DispatcherStartFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) fn bind(self: &Arc<Self>, agent: &AgentCore, params: PoolBindParams) -> Result<AgentBinding> {
        if !self.running.load(Ordering::Acquire) {
            return Err(CohortError::AgentBindingFailed {
                agent: agent.name().to_string(),
                reason: "dispatcher is not running".to_string(),
            });
        }
        let max_at_once = params
            .max_demands_at_once
            .unwrap_or(self.params.max_demands_at_once)
            .max(1);

        match params.fifo {
            FifoKind::Individual => {
                let queue = AgentQueue::new(agent.priority(), max_at_once, true, &self.ready);
                let closer = Arc::clone(&queue);
                let queue: Arc<dyn EventQueue> = queue;
                Ok(AgentBinding::new(queue, Some(Box::new(move || closer.close()))))
            }
            FifoKind::Cooperation => {
                let key = agent.coop_name().unwrap_or_default();
                let queue = {
                    let mut coops = self.coop_queues.lock();
                    let entry = coops.entry(key.clone()).or_insert_with(|| {
                        (
                            AgentQueue::new(agent.priority(), max_at_once, false, &self.ready),
                            0,
                        )
                    });
                    entry.1 += 1;
                    Arc::clone(&entry.0)
                };
                let dispatcher = Arc::clone(self);
                let queue: Arc<dyn EventQueue> = queue;
                Ok(AgentBinding::new(
                    queue,
                    Some(Box::new(move || dispatcher.release_coop_queue(&key))),
                ))
            }
        }
    }

    fn release_coop_queue(&self, key: &str) {
        let retired = {
            let mut coops = self.coop_queues.lock();
            let last = coops.get_mut(key).is_some_and(|entry| {
                entry.1 -= 1;
                entry.1 == 0
            });
            if last {
                coops.remove(key)
            } else {
                None
            }
        };
        if let Some((queue, _)) = retired {
            queue.close();
        }
    }

    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.ready.shutdown();
    }

    pub(crate) fn wait(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("thread pool worker panicked");
            }
        }
        drop(self.ready.drain());
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.params.thread_count.max(1)
    }
}
