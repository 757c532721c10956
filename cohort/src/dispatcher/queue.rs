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

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::common::Priority;

/// How a consumer waits for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLockKind {
    /// Block on a condition variable straight away. Cheapest on CPU.
    Simple,
    /// Spin for up to `spin` before blocking. Lower wake-up latency.
    Combined { spin: Duration },
}

impl Default for QueueLockKind {
    fn default() -> Self {
        Self::Combined {
            spin: Duration::from_micros(100),
        }
    }
}

/// Per-priority quotas for [`PriorityPolicy::QuotedRoundRobin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotes([usize; Priority::COUNT]);

impl Quotes {
    /// Every priority gets `default` demands per round; zero is raised to one.
    #[must_use]
    pub fn new(default: usize) -> Self {
        Self([default.max(1); Priority::COUNT])
    }

    #[must_use]
    pub fn set(mut self, priority: Priority, quote: usize) -> Self {
        self.0[priority.index()] = quote.max(1);
        self
    }

    #[must_use]
    pub fn get(&self, priority: Priority) -> usize {
        self.0[priority.index()]
    }
}

/// Order in which queued demands of different priorities are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorityPolicy {
    /// Ignore priorities; one FIFO.
    #[default]
    Fifo,
    /// Always serve the highest non-empty priority first.
    StrictlyOrdered,
    /// Serve up to the priority's quote, then move one level down, wrapping
    /// from the lowest back to the highest. A waiting demand is served within
    /// one round, i.e. after at most the sum of the other levels' quotes.
    QuotedRoundRobin(Quotes),
}

struct QueueState<T> {
    levels: Vec<VecDeque<T>>,
    len: usize,
    shutdown: bool,
    sleepers: usize,
    current: usize,
    served: usize,
}

impl<T> QueueState<T> {
    fn pop(&mut self, policy: &PriorityPolicy) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = match policy {
            PriorityPolicy::Fifo => self.levels[0].pop_front(),
            PriorityPolicy::StrictlyOrdered => self
                .levels
                .iter_mut()
                .rev()
                .find(|level| !level.is_empty())
                .and_then(VecDeque::pop_front),
            PriorityPolicy::QuotedRoundRobin(quotes) => self.pop_round_robin(quotes),
        };
        if item.is_some() {
            self.len -= 1;
        }
        item
    }

    fn pop_round_robin(&mut self, quotes: &Quotes) -> Option<T> {
        for _ in 0..=Priority::COUNT {
            let quote = Priority::from_index(self.current).map_or(1, |p| quotes.get(p));
            if self.served < quote {
                if let Some(item) = self.levels[self.current].pop_front() {
                    self.served += 1;
                    return Some(item);
                }
            }
            self.current = if self.current == 0 {
                Priority::COUNT - 1
            } else {
                self.current - 1
            };
            self.served = 0;
        }
        None
    }
}

/// Blocking multi-consumer queue used by every dispatcher.
///
/// After [`DemandQueue::shutdown`] consumers get `None` even if items remain,
/// and pushes are refused.
pub(crate) struct DemandQueue<T> {
    state: Mutex<QueueState<T>>,
    wakeup: Condvar,
    lock: QueueLockKind,
    policy: PriorityPolicy,
}

impl<T> DemandQueue<T> {
    pub(crate) fn new(lock: QueueLockKind, policy: PriorityPolicy) -> Self {
        let levels = match policy {
            PriorityPolicy::Fifo => 1,
            _ => Priority::COUNT,
        };
        Self {
            state: Mutex::new(QueueState {
                levels: (0..levels).map(|_| VecDeque::new()).collect(),
                len: 0,
                shutdown: false,
                sleepers: 0,
                current: Priority::COUNT - 1,
                served: 0,
            }),
            wakeup: Condvar::new(),
            lock,
            policy,
        }
    }

    pub(crate) fn fifo(lock: QueueLockKind) -> Self {
        Self::new(lock, PriorityPolicy::Fifo)
    }

    /// Appends an item; hands it back when the queue is shut down.
    pub(crate) fn push(&self, priority: Priority, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(item);
        }
        let level = match self.policy {
            PriorityPolicy::Fifo => 0,
            _ => priority.index(),
        };
        state.levels[level].push_back(item);
        state.len += 1;
        let wake = state.sleepers > 0;
        drop(state);
        if wake {
            self.wakeup.notify_one();
        }
        Ok(())
    }

    /// Takes the next item, waiting as long as needed. `None` means shut down.
    pub(crate) fn pop(&self) -> Option<T> {
        if let QueueLockKind::Combined { spin } = self.lock {
            let deadline = Instant::now() + spin;
            loop {
                if let Some(mut state) = self.state.try_lock() {
                    if state.shutdown {
                        return None;
                    }
                    if let Some(item) = state.pop(&self.policy) {
                        return Some(item);
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
                std::hint::spin_loop();
            }
        }

        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(item) = state.pop(&self.policy) {
                return Some(item);
            }
            state.sleepers += 1;
            self.wakeup.wait(&mut state);
            state.sleepers -= 1;
        }
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.wakeup.notify_all();
    }

    /// Removes everything still queued. Used once consumers are gone.
    pub(crate) fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.len = 0;
        state.levels.iter_mut().flat_map(|level| level.drain(..)).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().len
    }
}
