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

//! Dispatchers own worker threads and the queues agents' demands wait in.
//!
//! A [`Dispatcher`] is one of a closed set of variants sharing the same
//! life cycle: started when the environment launches, bound to agents through
//! a [`DispBinder`] at registration, shut down and waited for when the
//! environment is joined.

use std::fmt;
use std::sync::Arc;

use crate::common::{Result, CONFIG};
use crate::message::ExecutionDemand;

pub use active_group::ActiveGroupDispatcher;
pub use active_obj::ActiveObjDispatcher;
pub use binder::{BindingKind, DispBinder};
pub use one_thread::OneThreadDispatcher;
pub use prio::{PrioDedicatedThreadsDispatcher, PrioOneThreadDispatcher};
pub use queue::{PriorityPolicy, QueueLockKind, Quotes};
pub use thread_pool::{FifoKind, PoolBindParams, ThreadPoolDispatcher, ThreadPoolParams};

mod active_group;
mod active_obj;
mod binder;
mod one_thread;
mod prio;
pub(crate) mod queue;
mod thread_pool;
mod work_thread;

pub(crate) const DEFAULT_DISPATCHER_NAME: &str = "default";

/// Where a bound agent's demands are pushed.
pub(crate) trait EventQueue: Send + Sync {
    /// Queues a demand; hands it back if the queue no longer accepts work.
    fn push(&self, demand: ExecutionDemand) -> std::result::Result<(), ExecutionDemand>;
}

/// An agent's attachment to a dispatcher. Dropping it detaches the agent and
/// runs the dispatcher-specific cleanup, such as joining a dedicated thread.
pub(crate) struct AgentBinding {
    queue: Arc<dyn EventQueue>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl AgentBinding {
    pub(crate) fn new(queue: Arc<dyn EventQueue>, release: Option<Box<dyn FnOnce() + Send>>) -> Self {
        Self { queue, release }
    }

    pub(crate) fn queue(&self) -> Arc<dyn EventQueue> {
        Arc::clone(&self.queue)
    }
}

impl Drop for AgentBinding {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherKind {
    OneThread,
    ActiveObject,
    ActiveGroup,
    ThreadPool,
    PrioOneThread,
    PrioDedicatedThreads,
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OneThread => "one_thread",
            Self::ActiveObject => "active_obj",
            Self::ActiveGroup => "active_group",
            Self::ThreadPool => "thread_pool",
            Self::PrioOneThread => "prio_one_thread",
            Self::PrioDedicatedThreads => "prio_dedicated_threads",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub enum Dispatcher {
    OneThread(Arc<OneThreadDispatcher>),
    ActiveObject(Arc<ActiveObjDispatcher>),
    ActiveGroup(Arc<ActiveGroupDispatcher>),
    ThreadPool(Arc<ThreadPoolDispatcher>),
    PrioOneThread(Arc<PrioOneThreadDispatcher>),
    PrioDedicatedThreads(Arc<PrioDedicatedThreadsDispatcher>),
}

impl Dispatcher {
    #[must_use]
    pub fn one_thread() -> Self {
        Self::one_thread_with(CONFIG.queue_lock())
    }

    #[must_use]
    pub fn one_thread_with(lock: QueueLockKind) -> Self {
        Self::OneThread(Arc::new(OneThreadDispatcher::new(lock)))
    }

    #[must_use]
    pub fn active_object() -> Self {
        Self::active_object_with(CONFIG.queue_lock())
    }

    #[must_use]
    pub fn active_object_with(lock: QueueLockKind) -> Self {
        Self::ActiveObject(Arc::new(ActiveObjDispatcher::new(lock)))
    }

    #[must_use]
    pub fn active_group() -> Self {
        Self::active_group_with(CONFIG.queue_lock())
    }

    #[must_use]
    pub fn active_group_with(lock: QueueLockKind) -> Self {
        Self::ActiveGroup(Arc::new(ActiveGroupDispatcher::new(lock)))
    }

    #[must_use]
    pub fn thread_pool(params: ThreadPoolParams) -> Self {
        Self::ThreadPool(Arc::new(ThreadPoolDispatcher::new(params)))
    }

    #[must_use]
    pub fn prio_one_thread(policy: PriorityPolicy) -> Self {
        Self::prio_one_thread_with(policy, CONFIG.queue_lock())
    }

    #[must_use]
    pub fn prio_one_thread_with(policy: PriorityPolicy, lock: QueueLockKind) -> Self {
        Self::PrioOneThread(Arc::new(PrioOneThreadDispatcher::new(policy, lock)))
    }

    #[must_use]
    pub fn prio_dedicated_threads() -> Self {
        Self::PrioDedicatedThreads(Arc::new(PrioDedicatedThreadsDispatcher::new(
            CONFIG.queue_lock(),
        )))
    }

    #[must_use]
    pub fn kind(&self) -> DispatcherKind {
        match self {
            Self::OneThread(_) => DispatcherKind::OneThread,
            Self::ActiveObject(_) => DispatcherKind::ActiveObject,
            Self::ActiveGroup(_) => DispatcherKind::ActiveGroup,
            Self::ThreadPool(_) => DispatcherKind::ThreadPool,
            Self::PrioOneThread(_) => DispatcherKind::PrioOneThread,
            Self::PrioDedicatedThreads(_) => DispatcherKind::PrioDedicatedThreads,
        }
    }

    pub(crate) fn start(&self, name: &str) -> Result<()> {
        match self {
            Self::OneThread(d) => d.worker.start(name),
            Self::ActiveObject(d) => {
                d.start();
                Ok(())
            }
            Self::ActiveGroup(d) => {
                d.start();
                Ok(())
            }
            Self::ThreadPool(d) => d.start(name),
            Self::PrioOneThread(d) => d.worker.start(name),
            Self::PrioDedicatedThreads(d) => d.start(name),
        }
    }

    /// Signals every worker to stop; does not wait.
    pub(crate) fn shutdown(&self) {
        match self {
            Self::OneThread(d) => d.worker.shutdown(),
            Self::ActiveObject(d) => d.shutdown(),
            Self::ActiveGroup(d) => d.shutdown(),
            Self::ThreadPool(d) => d.shutdown(),
            Self::PrioOneThread(d) => d.worker.shutdown(),
            Self::PrioDedicatedThreads(d) => d.shutdown(),
        }
    }

    /// Blocks until every worker thread has exited.
    pub(crate) fn wait(&self) {
        match self {
            Self::OneThread(d) => d.worker.wait(),
            Self::ActiveObject(d) => d.wait(),
            Self::ActiveGroup(d) => d.wait(),
            Self::ThreadPool(d) => d.wait(),
            Self::PrioOneThread(d) => d.worker.wait(),
            Self::PrioDedicatedThreads(d) => d.wait(),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dispatcher").field(&self.kind()).finish()
    }
}
