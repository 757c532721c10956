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

//! Delayed and periodic delivery.
//!
//! Timers run on a dedicated single-threaded tokio runtime. A firing timer
//! sends through the target mbox exactly like any other producer.

use std::any::TypeId;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace};

use crate::common::{CohortError, Result};
use crate::mbox::Mbox;
use crate::message::MessageRef;

struct TimerHandle {
    token: CancellationToken,
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Handle of a scheduled timer.
///
/// Clones share the timer; dropping the last clone of a pending timer cancels
/// it. Cancelling a timer that already fired is a no-op.
#[derive(Clone)]
pub struct TimerId {
    inner: Arc<TimerHandle>,
}

impl TimerId {
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// True while the timer may still fire.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.inner.token.is_cancelled()
    }
}

impl Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerId")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A message waiting in a timer, ready to be sent any number of times.
pub(crate) struct TimerPayload {
    pub(crate) mbox: Mbox,
    pub(crate) msg_type: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) message: Option<MessageRef>,
}

impl TimerPayload {
    fn fire(&self) {
        trace!(mbox = %self.mbox.id(), type_name = self.type_name, "timer fired");
        self.mbox
            .send_ref(self.msg_type, self.type_name, self.message.clone());
    }
}

pub(crate) struct TimerManager {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl TimerManager {
    pub(crate) fn start(thread_name: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(thread_name)
            .enable_time()
            .build()
            .map_err(|e| CohortError::DispatcherStartFailed {
                name: thread_name.to_string(),
                reason: e.to_string(),
            })?;
        debug!(thread = thread_name, "timer thread started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Runtime handle used for bounded waits on service replies.
    pub(crate) fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Schedules `payload` after `delay`, then every `period` unless it is zero.
    pub(crate) fn schedule(
        &self,
        payload: TimerPayload,
        delay: Duration,
        period: Duration,
    ) -> Result<TimerId> {
        let token = self.spawn(payload, delay, period)?;
        Ok(TimerId {
            inner: Arc::new(TimerHandle { token }),
        })
    }

    /// Like `schedule`, but only environment shutdown can cancel it.
    pub(crate) fn schedule_detached(&self, payload: TimerPayload, delay: Duration) -> Result<()> {
        self.spawn(payload, delay, Duration::ZERO).map(drop)
    }

    fn spawn(
        &self,
        payload: TimerPayload,
        delay: Duration,
        period: Duration,
    ) -> Result<CancellationToken> {
        if self.root.is_cancelled() || self.tracker.is_closed() {
            return Err(CohortError::UnableToScheduleTimer(
                "timer thread is stopped".to_string(),
            ));
        }
        let token = self.root.child_token();
        let task_token = token.clone();
        self.tracker.spawn_on(
            async move {
                tokio::select! {
                    () = task_token.cancelled() => return,
                    () = sleep(delay) => payload.fire(),
                }
                if period.is_zero() {
                    task_token.cancel();
                    return;
                }
                let mut ticks = interval_at(Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = task_token.cancelled() => break,
                        _ = ticks.tick() => payload.fire(),
                    }
                }
            },
            &self.handle,
        );
        Ok(token)
    }

    /// Cancels every timer and stops the timer thread without waiting for it.
    pub(crate) fn shutdown(&self) {
        self.root.cancel();
        self.tracker.close();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            debug!("timer thread stopped");
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
