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
use std::fmt::Debug;

use tracing::trace;

use crate::agent::handler::Handler;
use crate::agent::{ManagedAgent, State};
use crate::common::{MboxId, Result};
use crate::coop::DeregReason;

/// Marker for an agent bound to a dispatcher; handlers receive this form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Running;

impl<Model: Send + Sync + Debug + 'static> ManagedAgent<Running, Model> {
    /// Switches to `state`, or to its initial leaf if it has substates.
    ///
    /// Exit hooks run from the old leaf up to the common ancestor, then enter
    /// hooks from below the ancestor down to the new leaf. State listeners are
    /// told last.
    ///
    /// # Errors
    ///
    /// `NotStateOwner` for a foreign state, `NoInitialSubstate` for a
    /// composite state without an initial substate. The current state is
    /// unchanged on error.
    pub fn enter(&mut self, state: &State) -> Result<()> {
        let target = self.states.resolve_leaf(state)?;
        if target == self.current {
            return Ok(());
        }
        let from = self.states.path(self.current);
        let to = self.states.path(target);
        let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

        let exits: Vec<_> = from[common..]
            .iter()
            .rev()
            .flat_map(|id| self.states.exit_hooks(*id))
            .collect();
        let enters: Vec<_> = to[common..]
            .iter()
            .flat_map(|id| self.states.enter_hooks(*id))
            .collect();

        for hook in exits {
            hook(self);
        }
        trace!(
            agent = self.name(),
            from = %self.states.name_of(self.current),
            to = %self.states.name_of(target),
            "state change"
        );
        self.current = target;
        for hook in enters {
            hook(self);
        }
        let current = self.current_state();
        for listener in &self.state_listeners {
            listener.changed(self.core.id(), &current);
        }
        Ok(())
    }

    /// The current leaf state.
    #[must_use]
    pub fn current_state(&self) -> State {
        self.states
            .state(self.current)
            .cloned()
            .unwrap_or_else(|| self.states.default_state().clone())
    }

    /// True if `state` is the current state or one of its ancestors.
    #[must_use]
    pub fn is_in_state(&self, state: &State) -> bool {
        self.states.path(self.current).contains(&state.id())
    }

    #[must_use]
    pub fn coop_name(&self) -> Option<String> {
        self.core.coop_name()
    }

    /// Deregisters the agent's cooperation with reason `Normal`.
    pub fn deregister_coop_normally(&self) {
        self.deregister_coop(DeregReason::Normal);
    }

    pub fn deregister_coop(&self, reason: DeregReason) {
        if let Some(coop) = self.core.coop() {
            coop.deregister(reason);
        }
    }

    pub(crate) fn run_start(&mut self) -> anyhow::Result<()> {
        if let Some(initial) = self.initial.take() {
            self.enter(&initial)?;
        }
        if let Some(hook) = self.on_start.clone() {
            hook(self)?;
        }
        Ok(())
    }

    pub(crate) fn run_finish(&mut self) -> anyhow::Result<()> {
        if let Some(hook) = self.on_finish.clone() {
            hook(self)?;
        }
        Ok(())
    }

    /// Looks the handler up in the current state, then in its ancestors.
    pub(crate) fn find_handler(&self, mbox_id: MboxId, msg_type: TypeId) -> Option<&Handler<Model>> {
        let mut state = Some(self.current);
        while let Some(id) = state {
            if let Some(handler) = self.subscriptions.find(mbox_id, msg_type, id) {
                return Some(handler);
            }
            state = self.states.parent_of(id);
        }
        None
    }
}
