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

use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::agent::SubscriptionStorageKind;
use crate::common::ExceptionReaction;
use crate::dispatcher::QueueLockKind;

/// Runtime configuration.
///
/// Loaded from `config.toml` in the XDG config directory for `cohort`. Every
/// field has a default, so a partial file is fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub limits: LimitsConfig,
    pub queues: QueueConfig,
    pub defaults: DefaultsConfig,
    pub behavior: BehaviorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// How many times an overlimit message may be redirected before it is dropped.
    pub max_redirection_depth: usize,
    /// Worker count of thread-pool dispatchers; 0 means available parallelism.
    pub thread_pool_size: usize,
    /// Demands a thread-pool worker processes for one agent queue before switching.
    pub max_demands_at_once: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLockName {
    Simple,
    Combined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub lock: QueueLockName,
    /// Spin phase of the combined lock, in microseconds.
    pub combined_spin_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageName {
    Vector,
    Hash,
    Map,
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub exception_reaction: ExceptionReaction,
    pub subscription_storage: StorageName,
    /// Subscription count at which the adaptive storage switches to a hash map.
    pub adaptive_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Stop the environment when its last cooperation is gone.
    pub autoshutdown: bool,
    pub timer_thread_name: String,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_redirection_depth: 32,
            thread_pool_size: 0,
            max_demands_at_once: 4,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock: QueueLockName::Combined,
            combined_spin_us: 100,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            exception_reaction: ExceptionReaction::DeregisterCoop,
            subscription_storage: StorageName::Adaptive,
            adaptive_threshold: 8,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            autoshutdown: false,
            timer_thread_name: "cohort-timer".to_string(),
        }
    }
}

impl CohortConfig {
    /// Queue lock flavour used by dispatchers that are not given one explicitly.
    #[must_use]
    pub fn queue_lock(&self) -> QueueLockKind {
        match self.queues.lock {
            QueueLockName::Simple => QueueLockKind::Simple,
            QueueLockName::Combined => QueueLockKind::Combined {
                spin: Duration::from_micros(self.queues.combined_spin_us),
            },
        }
    }

    #[must_use]
    pub fn subscription_storage(&self) -> SubscriptionStorageKind {
        match self.defaults.subscription_storage {
            StorageName::Vector => SubscriptionStorageKind::Vector,
            StorageName::Hash => SubscriptionStorageKind::Hash,
            StorageName::Map => SubscriptionStorageKind::Map,
            StorageName::Adaptive => SubscriptionStorageKind::Adaptive {
                threshold: self.defaults.adaptive_threshold.max(1),
            },
        }
    }

    /// Resolved worker count for thread-pool dispatchers.
    #[must_use]
    pub fn thread_pool_size(&self) -> usize {
        if self.limits.thread_pool_size > 0 {
            return self.limits.thread_pool_size;
        }
        std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get)
    }

    /// Loads the configuration from `$XDG_CONFIG_HOME/cohort/config.toml`.
    ///
    /// A missing file yields the defaults. An unreadable or malformed file is
    /// logged and also yields the defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        let xdg_dirs = match xdg::BaseDirectories::with_prefix("cohort") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text).unwrap_or_else(|e| {
                error!("Failed to parse configuration file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when `text` does not describe a configuration.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

lazy_static! {
    /// Process-wide configuration, read once on first use.
    pub static ref CONFIG: CohortConfig = CohortConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CohortConfig::default();
        assert_eq!(config.limits.max_redirection_depth, 32);
        assert_eq!(config.defaults.exception_reaction, ExceptionReaction::DeregisterCoop);
        assert!(!config.behavior.autoshutdown);
        assert_eq!(
            config.queue_lock(),
            QueueLockKind::Combined {
                spin: Duration::from_micros(100)
            }
        );
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = CohortConfig::from_toml(
            r#"
            [queues]
            lock = "simple"

            [defaults]
            exception_reaction = "ignore"
            subscription_storage = "map"
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.queue_lock(), QueueLockKind::Simple);
        assert_eq!(config.defaults.exception_reaction, ExceptionReaction::Ignore);
        assert_eq!(config.subscription_storage(), SubscriptionStorageKind::Map);
        assert_eq!(config.limits.max_demands_at_once, 4);
    }

    #[test]
    fn explicit_pool_size_wins() {
        let mut config = CohortConfig::default();
        config.limits.thread_pool_size = 3;
        assert_eq!(config.thread_pool_size(), 3);
        config.limits.thread_pool_size = 0;
        assert!(config.thread_pool_size() >= 1);
    }
}
