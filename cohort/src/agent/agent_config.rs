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

use acton_ern::Ern;

use crate::agent::SubscriptionStorageKind;
use crate::common::{CohortError, ExceptionReaction, Priority, Result};
use crate::message::{build_limit_table, LimitTable, MessageLimit};

/// Construction options for an agent.
///
/// The default is an unnamed agent of priority `P0` whose exception reaction
/// is inherited from its cooperation and environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    name: Option<String>,
    priority: Priority,
    reaction: ExceptionReaction,
    storage: Option<SubscriptionStorageKind>,
    limits: Vec<MessageLimit>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: None,
            priority: Priority::default(),
            reaction: ExceptionReaction::Inherit,
            storage: None,
            limits: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Creates a config for an agent called `name`.
    ///
    /// The name must be a valid ERN root.
    pub fn named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let _: Ern =
            Ern::with_root(name.clone()).map_err(|e| CohortError::InvalidAgentName {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: Some(name),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_exception_reaction(mut self, reaction: ExceptionReaction) -> Self {
        self.reaction = reaction;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: SubscriptionStorageKind) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Adds a message limit. Once an agent has any limit, every message type
    /// it subscribes to needs one.
    #[must_use]
    pub fn with_limit(mut self, limit: MessageLimit) -> Self {
        self.limits.push(limit);
        self
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn reaction(&self) -> ExceptionReaction {
        self.reaction
    }

    pub(crate) fn storage(&self) -> Option<SubscriptionStorageKind> {
        self.storage
    }

    pub(crate) fn limit_table(&self) -> Result<LimitTable> {
        build_limit_table(&self.limits)
    }
}
