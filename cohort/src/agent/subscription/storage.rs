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

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use crate::common::{MboxId, StateId};

/// How an agent stores its subscriptions. Only lookup speed and memory differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStorageKind {
    /// Sorted vector; best for a handful of subscriptions.
    Vector,
    Hash,
    /// Ordered tree map.
    Map,
    /// Starts as a vector and switches to a hash map above `threshold`
    /// subscriptions, back again below half of it.
    Adaptive { threshold: usize },
}

pub(crate) type SubscriptionKey = (MboxId, TypeId, StateId);

enum Backend<H> {
    Vector(Vec<(SubscriptionKey, H)>),
    Hash(HashMap<SubscriptionKey, H>),
    Map(BTreeMap<SubscriptionKey, H>),
}

pub(crate) struct SubscriptionStorage<H> {
    adaptive_threshold: Option<usize>,
    backend: Backend<H>,
}

impl<H> SubscriptionStorage<H> {
    pub(crate) fn new(kind: SubscriptionStorageKind) -> Self {
        let (adaptive_threshold, backend) = match kind {
            SubscriptionStorageKind::Vector => (None, Backend::Vector(Vec::new())),
            SubscriptionStorageKind::Hash => (None, Backend::Hash(HashMap::new())),
            SubscriptionStorageKind::Map => (None, Backend::Map(BTreeMap::new())),
            SubscriptionStorageKind::Adaptive { threshold } => {
                (Some(threshold.max(1)), Backend::Vector(Vec::new()))
            }
        };
        Self {
            adaptive_threshold,
            backend,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.backend {
            Backend::Vector(v) => v.len(),
            Backend::Hash(h) => h.len(),
            Backend::Map(m) => m.len(),
        }
    }

    pub(crate) fn contains(&self, key: &SubscriptionKey) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn get(&self, key: &SubscriptionKey) -> Option<&H> {
        match &self.backend {
            Backend::Vector(v) => v
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|i| &v[i].1),
            Backend::Hash(h) => h.get(key),
            Backend::Map(m) => m.get(key),
        }
    }

    /// Inserts unless the key is taken; returns whether it was inserted.
    pub(crate) fn insert(&mut self, key: SubscriptionKey, handler: H) -> bool {
        let inserted = match &mut self.backend {
            Backend::Vector(v) => match v.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(_) => false,
                Err(position) => {
                    v.insert(position, (key, handler));
                    true
                }
            },
            Backend::Hash(h) => {
                if h.contains_key(&key) {
                    false
                } else {
                    h.insert(key, handler);
                    true
                }
            }
            Backend::Map(m) => {
                if m.contains_key(&key) {
                    false
                } else {
                    m.insert(key, handler);
                    true
                }
            }
        };
        self.adapt();
        inserted
    }

    pub(crate) fn remove(&mut self, key: &SubscriptionKey) -> Option<H> {
        let removed = match &mut self.backend {
            Backend::Vector(v) => v
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|i| v.remove(i).1),
            Backend::Hash(h) => h.remove(key),
            Backend::Map(m) => m.remove(key),
        };
        self.adapt();
        removed
    }

    /// Removes every entry whose key matches and returns their keys.
    pub(crate) fn remove_matching(
        &mut self,
        matches: impl Fn(&SubscriptionKey) -> bool,
    ) -> Vec<SubscriptionKey> {
        let mut removed = Vec::new();
        match &mut self.backend {
            Backend::Vector(v) => v.retain(|(k, _)| {
                let hit = matches(k);
                if hit {
                    removed.push(*k);
                }
                !hit
            }),
            Backend::Hash(h) => h.retain(|k, _| {
                let hit = matches(k);
                if hit {
                    removed.push(*k);
                }
                !hit
            }),
            Backend::Map(m) => m.retain(|k, _| {
                let hit = matches(k);
                if hit {
                    removed.push(*k);
                }
                !hit
            }),
        }
        self.adapt();
        removed
    }

    pub(crate) fn clear(&mut self) {
        match &mut self.backend {
            Backend::Vector(v) => v.clear(),
            Backend::Hash(h) => h.clear(),
            Backend::Map(m) => m.clear(),
        }
        self.adapt();
    }

    fn adapt(&mut self) {
        let Some(threshold) = self.adaptive_threshold else {
            return;
        };
        let len = self.len();
        let backend = std::mem::replace(&mut self.backend, Backend::Vector(Vec::new()));
        self.backend = match backend {
            Backend::Vector(v) if len > threshold => Backend::Hash(v.into_iter().collect()),
            Backend::Hash(h) if len <= threshold / 2 => {
                let mut v: Vec<_> = h.into_iter().collect();
                v.sort_by(|(a, _), (b, _)| a.cmp(b));
                Backend::Vector(v)
            }
            other => other,
        };
    }

    #[cfg(test)]
    fn is_hashed(&self) -> bool {
        matches!(self.backend, Backend::Hash(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(mbox: &MboxId, state: &StateId) -> SubscriptionKey {
        (*mbox, TypeId::of::<u32>(), *state)
    }

    fn exercise(kind: SubscriptionStorageKind) {
        let mut storage = SubscriptionStorage::new(kind);
        let mboxes: Vec<_> = (0..12).map(|_| MboxId::next()).collect();
        let state = StateId::next();

        for (n, mbox) in mboxes.iter().enumerate() {
            assert!(storage.insert(key(mbox, &state), n), "{kind:?}");
        }
        assert!(!storage.insert(key(&mboxes[3], &state), 99), "{kind:?}");
        assert_eq!(storage.get(&key(&mboxes[3], &state)), Some(&3));
        assert_eq!(storage.remove(&key(&mboxes[3], &state)), Some(3));
        assert_eq!(storage.remove(&key(&mboxes[3], &state)), None);

        let first = mboxes[0];
        let removed = storage.remove_matching(|k| k.0 == first);
        assert_eq!(removed.len(), 1);
        assert_eq!(storage.len(), 10);
        assert!(!storage.contains(&key(&first, &state)));
    }

    #[test]
    fn every_backend_has_the_same_contract() {
        exercise(SubscriptionStorageKind::Vector);
        exercise(SubscriptionStorageKind::Hash);
        exercise(SubscriptionStorageKind::Map);
        exercise(SubscriptionStorageKind::Adaptive { threshold: 4 });
    }

    #[test]
    fn adaptive_switches_back_and_forth() {
        let mut storage = SubscriptionStorage::new(SubscriptionStorageKind::Adaptive { threshold: 4 });
        let state = StateId::next();
        let mboxes: Vec<_> = (0..6).map(|_| MboxId::next()).collect();
        for mbox in &mboxes {
            storage.insert(key(mbox, &state), ());
        }
        assert!(storage.is_hashed());
        for mbox in &mboxes[..4] {
            storage.remove(&key(mbox, &state));
        }
        assert!(!storage.is_hashed());
        assert!(storage.contains(&key(&mboxes[5], &state)));
    }
}
