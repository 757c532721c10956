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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{info_span, trace, warn};

use crate::common::{CohortError, Priority, Result};
use crate::dispatcher::queue::DemandQueue;
use crate::dispatcher::EventQueue;
use crate::message::ExecutionDemand;

pub(crate) type SharedDemandQueue = Arc<DemandQueue<ExecutionDemand>>;

impl EventQueue for DemandQueue<ExecutionDemand> {
    fn push(&self, demand: ExecutionDemand) -> std::result::Result<(), ExecutionDemand> {
        let priority: Priority = demand.priority();
        DemandQueue::push(self, priority, demand)
    }
}

/// A worker thread draining one demand queue.
pub(crate) struct WorkThread {
    id: u64,
    queue: SharedDemandQueue,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkThread {
    pub(crate) fn spawn(label: String, queue: SharedDemandQueue) -> Result<Arc<Self>> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);

        let worker_queue = Arc::clone(&queue);
        let span_label = label.clone();
        let handle = std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                let span = info_span!("cohort_worker", thread = %span_label, id);
                let _enter = span.enter();
                while let Some(demand) = worker_queue.pop() {
                    demand.execute();
                }
                let leftovers = worker_queue.drain();
                trace!(dropped = leftovers.len(), "worker finished");
            })
            .map_err(|e| CohortError::DispatcherStartFailed {
                name: label,
                reason: e.to_string(),
            })?;

        Ok(Arc::new(Self {
            id,
            queue,
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Process-unique id, distinct for every spawned thread.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn queue(&self) -> &SharedDemandQueue {
        &self.queue
    }

    pub(crate) fn shutdown(&self) {
        self.queue.shutdown();
    }

    pub(crate) fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                warn!(id = self.id, "worker asked to join itself; detaching");
                return;
            }
            if handle.join().is_err() {
                warn!(id = self.id, "worker thread panicked");
            }
        }
    }

    pub(crate) fn shutdown_and_join(&self) {
        self.shutdown();
        self.join();
    }
}
