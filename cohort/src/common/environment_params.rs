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
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::agent::SubscriptionStorageKind;
use crate::common::{
    EventExceptionLogger, ExceptionReaction, TracingExceptionLogger, CONFIG,
};
use crate::dispatcher::{Dispatcher, QueueLockKind};
use crate::traits::CoopListener;

/// Start-up configuration of an [`Environment`](crate::common::Environment).
///
/// Starts from the process-wide [`CONFIG`]; every setter overrides one value.
///
/// ```rust,ignore
/// let params = EnvironmentParams::default()
///     .with_named_dispatcher("pool", Dispatcher::thread_pool(ThreadPoolParams::default()))
///     .with_exception_reaction(ExceptionReaction::ShutdownEnvironment);
/// let env = CohortApp::launch_with(params)?;
/// ```
#[derive(Clone)]
pub struct EnvironmentParams {
    pub(crate) dispatchers: HashMap<String, Dispatcher>,
    pub(crate) exception_reaction: ExceptionReaction,
    pub(crate) exception_logger: Arc<dyn EventExceptionLogger>,
    pub(crate) coop_listener: Option<Arc<dyn CoopListener>>,
    pub(crate) autoshutdown: bool,
    pub(crate) queue_lock: QueueLockKind,
    pub(crate) subscription_storage: SubscriptionStorageKind,
    pub(crate) max_redirection_depth: usize,
    pub(crate) timer_thread_name: String,
}

impl Default for EnvironmentParams {
    fn default() -> Self {
        Self {
            dispatchers: HashMap::new(),
            exception_reaction: CONFIG.defaults.exception_reaction,
            exception_logger: Arc::new(TracingExceptionLogger),
            coop_listener: None,
            autoshutdown: CONFIG.behavior.autoshutdown,
            queue_lock: CONFIG.queue_lock(),
            subscription_storage: CONFIG.subscription_storage(),
            max_redirection_depth: CONFIG.limits.max_redirection_depth,
            timer_thread_name: CONFIG.behavior.timer_thread_name.clone(),
        }
    }
}

impl EnvironmentParams {
    /// Adds a dispatcher binders can refer to by `name`. A later dispatcher
    /// with the same name replaces the earlier one. An empty name makes the
    /// launch fail with `EmptyName`.
    #[must_use]
    pub fn with_named_dispatcher(mut self, name: impl Into<String>, dispatcher: Dispatcher) -> Self {
        self.dispatchers.insert(name.into(), dispatcher);
        self
    }

    #[must_use]
    pub fn with_exception_reaction(mut self, reaction: ExceptionReaction) -> Self {
        self.exception_reaction = reaction;
        self
    }

    #[must_use]
    pub fn with_exception_logger(mut self, logger: Arc<dyn EventExceptionLogger>) -> Self {
        self.exception_logger = logger;
        self
    }

    #[must_use]
    pub fn with_coop_listener(mut self, listener: Arc<dyn CoopListener>) -> Self {
        self.coop_listener = Some(listener);
        self
    }

    /// Stop the environment once the last cooperation is gone.
    #[must_use]
    pub fn with_autoshutdown(mut self, enabled: bool) -> Self {
        self.autoshutdown = enabled;
        self
    }

    /// Queue lock of the default dispatcher.
    #[must_use]
    pub fn with_queue_lock(mut self, lock: QueueLockKind) -> Self {
        self.queue_lock = lock;
        self
    }

    /// Storage used by agents whose config does not name one.
    #[must_use]
    pub fn with_subscription_storage(mut self, storage: SubscriptionStorageKind) -> Self {
        self.subscription_storage = storage;
        self
    }

    #[must_use]
    pub fn with_max_redirection_depth(mut self, depth: usize) -> Self {
        self.max_redirection_depth = depth;
        self
    }

    #[must_use]
    pub fn with_timer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.timer_thread_name = name.into();
        self
    }
}

impl Debug for EnvironmentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentParams")
            .field("dispatchers", &self.dispatchers)
            .field("exception_reaction", &self.exception_reaction)
            .field("exception_logger", &self.exception_logger)
            .field("coop_listener", &self.coop_listener.is_some())
            .field("autoshutdown", &self.autoshutdown)
            .field("queue_lock", &self.queue_lock)
            .field("subscription_storage", &self.subscription_storage)
            .field("max_redirection_depth", &self.max_redirection_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let params = EnvironmentParams::default()
            .with_exception_reaction(ExceptionReaction::Ignore)
            .with_autoshutdown(true)
            .with_max_redirection_depth(3)
            .with_named_dispatcher("a", Dispatcher::active_object())
            .with_named_dispatcher("a", Dispatcher::one_thread());
        assert_eq!(params.exception_reaction, ExceptionReaction::Ignore);
        assert!(params.autoshutdown);
        assert_eq!(params.max_redirection_depth, 3);
        assert_eq!(params.dispatchers.len(), 1);
        assert_eq!(
            params.dispatchers.get("a").map(Dispatcher::kind),
            Some(crate::dispatcher::DispatcherKind::OneThread)
        );
    }
}
