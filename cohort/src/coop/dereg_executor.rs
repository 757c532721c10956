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
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info_span, trace, warn};

use crate::common::{CohortError, Result};
use crate::coop::CoopEntry;

enum Job {
    Finalize(Arc<CoopEntry>),
    Stop,
}

/// Dedicated thread that performs final cooperation teardown.
///
/// Whatever thread drops a cooperation's last usage only posts it here, so
/// agents are never destroyed on their own worker.
pub(crate) struct DeregExecutor {
    sender: UnboundedSender<Job>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeregExecutor {
    pub(crate) fn start() -> Result<Self> {
        let (sender, receiver) = unbounded_channel();
        let handle = std::thread::Builder::new()
            .name("cohort-dereg".to_string())
            .spawn(move || run(receiver))
            .map_err(|e| CohortError::DispatcherStartFailed {
                name: "cohort-dereg".to_string(),
                reason: e.to_string(),
            })?;
        debug!("deregistration thread started");
        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn post(&self, entry: Arc<CoopEntry>) {
        if let Err(rejected) = self.sender.send(Job::Finalize(entry)) {
            if let Job::Finalize(entry) = rejected.0 {
                warn!(coop = entry.name(), "deregistration thread is gone; cooperation dropped");
            }
        }
    }

    pub(crate) fn shutdown_and_join(&self) {
        let _ = self.sender.send(Job::Stop);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                warn!("deregistration thread asked to join itself; detaching");
                return;
            }
            if handle.join().is_err() {
                warn!("deregistration thread panicked");
            }
        }
    }
}

fn run(mut receiver: UnboundedReceiver<Job>) {
    let span = info_span!("cohort_dereg");
    let _enter = span.enter();
    while let Some(job) = receiver.blocking_recv() {
        match job {
            Job::Finalize(entry) => match entry.environment() {
                Some(env) => env.finalize_coop(&entry),
                None => trace!(coop = entry.name(), "environment gone before finalization"),
            },
            Job::Stop => break,
        }
    }
    debug!("deregistration thread finished");
}
