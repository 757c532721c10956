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

//! Test support for Cohort agents.
//!
//! [`cohort_test`] marks a test function; [`Probe`] collects observations made
//! on dispatcher threads so the test thread can wait for them.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use cohort_test_macro::cohort_test;

#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tracing;
}

pub mod prelude {
    pub use crate::cohort_test;
    pub use crate::Probe;
}

/// A cloneable, thread-safe collector of observations.
///
/// Agent handlers record values; the test waits until enough arrived.
#[derive(Debug)]
pub struct Probe<T> {
    inner: Arc<ProbeInner<T>>,
}

#[derive(Debug)]
struct ProbeInner<T> {
    items: Mutex<Vec<T>>,
    changed: Condvar,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Probe<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(ProbeInner {
                items: Mutex::new(Vec::new()),
                changed: Condvar::new(),
            }),
        }
    }
}

impl<T: Clone + Debug> Probe<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation and wakes waiters.
    pub fn record(&self, value: T) {
        self.inner.items.lock().push(value);
        self.inner.changed.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of everything recorded so far.
    pub fn items(&self) -> Vec<T> {
        self.inner.items.lock().clone()
    }

    /// Blocks until at least `count` observations exist or `timeout` elapses.
    ///
    /// Returns the snapshot either way; callers assert on its length.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.inner.items.lock();
        while items.len() < count {
            if self.inner.changed.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        items.clone()
    }

    /// Waits for `timeout` and returns whatever arrived. Used to assert that
    /// something did *not* happen.
    pub fn settle(&self, timeout: Duration) -> Vec<T> {
        self.wait_for(usize::MAX, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_returns_once_enough_items_arrive() {
        let probe = Probe::new();
        let writer = probe.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                writer.record(i);
            }
        });
        let items = probe.wait_for(3, Duration::from_secs(5));
        handle.join().expect("writer thread panicked");
        assert_eq!(items, vec![0, 1, 2]);
    }

    #[test]
    fn wait_for_times_out_with_partial_snapshot() {
        let probe = Probe::new();
        probe.record("only");
        let items = probe.wait_for(2, Duration::from_millis(20));
        assert_eq!(items, vec!["only"]);
    }
}
