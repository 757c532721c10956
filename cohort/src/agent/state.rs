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

use crate::agent::handler::StateHook;
use crate::common::{AgentId, CohortError, Result, StateId};

/// Deepest allowed nesting of substates.
pub const MAX_STATE_NESTING: usize = 16;

pub(crate) const DEFAULT_STATE_NAME: &str = "<DEFAULT>";

/// A node of an agent's state machine.
///
/// States are created through the owning agent and are only meaningful to it.
/// Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct State {
    id: StateId,
    owner: AgentId,
    name: Arc<str>,
}

impl State {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> StateId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> AgentId {
        self.owner
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for State {}

impl Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({} {})", self.name, self.id)
    }
}

struct StateNode<M: Send + Sync + Debug + 'static> {
    state: State,
    parent: Option<StateId>,
    initial: Option<StateId>,
    depth: usize,
    has_substates: bool,
    on_enter: Vec<StateHook<M>>,
    on_exit: Vec<StateHook<M>>,
}

/// All states of one agent, with their nesting.
pub(crate) struct StateTable<M: Send + Sync + Debug + 'static> {
    owner: AgentId,
    default: State,
    nodes: HashMap<StateId, StateNode<M>>,
}

impl<M: Send + Sync + Debug + 'static> StateTable<M> {
    pub(crate) fn new(owner: AgentId) -> Self {
        let mut table = Self {
            owner,
            default: State {
                id: StateId::next(),
                owner,
                name: Arc::from(DEFAULT_STATE_NAME),
            },
            nodes: HashMap::new(),
        };
        let default = table.default.clone();
        table.insert(default, None, 1);
        table
    }

    fn insert(&mut self, state: State, parent: Option<StateId>, depth: usize) {
        self.nodes.insert(
            state.id,
            StateNode {
                state,
                parent,
                initial: None,
                depth,
                has_substates: false,
                on_enter: Vec::new(),
                on_exit: Vec::new(),
            },
        );
    }

    pub(crate) fn default_state(&self) -> &State {
        &self.default
    }

    pub(crate) fn create_top(&mut self, name: &str) -> State {
        let state = State {
            id: StateId::next(),
            owner: self.owner,
            name: Arc::from(name),
        };
        self.insert(state.clone(), None, 1);
        state
    }

    /// Creates a substate of `parent`, optionally as its initial substate.
    pub(crate) fn create_substate(
        &mut self,
        name: &str,
        parent: &State,
        initial: bool,
    ) -> Result<State> {
        self.check_owner(parent)?;
        let node = self
            .nodes
            .get_mut(&parent.id)
            .ok_or_else(|| CohortError::UnknownAgentState(parent.name().to_string()))?;
        let depth = node.depth + 1;
        if depth > MAX_STATE_NESTING {
            return Err(CohortError::StateNestingTooDeep(
                name.to_string(),
                MAX_STATE_NESTING,
            ));
        }
        if initial && node.initial.is_some() {
            return Err(CohortError::InitialSubstateAlreadyDefined(
                parent.name().to_string(),
            ));
        }
        let state = State {
            id: StateId::next(),
            owner: self.owner,
            name: Arc::from(name),
        };
        if initial {
            node.initial = Some(state.id);
        }
        node.has_substates = true;
        self.insert(state.clone(), Some(parent.id), depth);
        Ok(state)
    }

    pub(crate) fn check_owner(&self, state: &State) -> Result<()> {
        if state.owner != self.owner {
            return Err(CohortError::NotStateOwner(state.name().to_string()));
        }
        if !self.nodes.contains_key(&state.id) {
            return Err(CohortError::UnknownAgentState(state.name().to_string()));
        }
        Ok(())
    }

    /// Follows initial substates down to the leaf that actually becomes current.
    pub(crate) fn resolve_leaf(&self, state: &State) -> Result<StateId> {
        self.check_owner(state)?;
        let mut id = state.id;
        loop {
            let node = self
                .nodes
                .get(&id)
                .ok_or_else(|| CohortError::UnknownAgentState(state.name().to_string()))?;
            if !node.has_substates {
                return Ok(id);
            }
            id = node
                .initial
                .ok_or_else(|| CohortError::NoInitialSubstate(node.state.name().to_string()))?;
        }
    }

    pub(crate) fn parent_of(&self, id: StateId) -> Option<StateId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// `id` and its ancestors, root first.
    pub(crate) fn path(&self, id: StateId) -> Vec<StateId> {
        let mut path = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            path.push(current);
            next = self.parent_of(current);
        }
        path.reverse();
        path
    }

    pub(crate) fn state(&self, id: StateId) -> Option<&State> {
        self.nodes.get(&id).map(|node| &node.state)
    }

    pub(crate) fn name_of(&self, id: StateId) -> String {
        self.state(id)
            .map_or_else(|| id.to_string(), |s| s.name().to_string())
    }

    pub(crate) fn add_enter_hook(&mut self, state: &State, hook: StateHook<M>) -> Result<()> {
        self.check_owner(state)?;
        if let Some(node) = self.nodes.get_mut(&state.id) {
            node.on_enter.push(hook);
        }
        Ok(())
    }

    pub(crate) fn add_exit_hook(&mut self, state: &State, hook: StateHook<M>) -> Result<()> {
        self.check_owner(state)?;
        if let Some(node) = self.nodes.get_mut(&state.id) {
            node.on_exit.push(hook);
        }
        Ok(())
    }

    pub(crate) fn enter_hooks(&self, id: StateId) -> Vec<StateHook<M>> {
        self.nodes
            .get(&id)
            .map(|node| node.on_enter.clone())
            .unwrap_or_default()
    }

    pub(crate) fn exit_hooks(&self, id: StateId) -> Vec<StateHook<M>> {
        self.nodes
            .get(&id)
            .map(|node| node.on_exit.clone())
            .unwrap_or_default()
    }
}
