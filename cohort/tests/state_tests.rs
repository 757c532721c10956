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

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cohort::prelude::*;
use cohort_test::prelude::*;

use crate::setup::messages::{Advance, Ping, Tick};
use crate::setup::{launch, params, SETTLE, WAIT};

mod setup;

#[cohort_agent]
struct Door;

/// The same message is handled differently depending on the current state.
#[cohort_test]
fn handlers_follow_the_current_state() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<String> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let inbox = agent.direct_mbox().clone();
    let closed = agent.create_state("closed");
    let open = agent.create_state("open");
    agent.set_initial_state(&closed)?;

    let in_closed = seen.clone();
    let target = open.clone();
    let in_open = seen.clone();
    agent
        .subscribe(&inbox)
        .in_state(&closed)
        .event::<Ping, _>(move |agent, msg| {
            in_closed.record(format!("closed:{}", msg.message().0));
            agent.enter(&target)?;
            Ok(())
        })?
        .subscribe(&inbox)
        .in_state(&open)
        .event::<Ping, _>(move |_agent, msg| {
            in_open.record(format!("open:{}", msg.message().0));
            Ok(())
        })?;
    env.register_agent_as_coop("door", agent)?;

    inbox.send(Ping(1));
    inbox.send(Ping(2));
    inbox.send(Ping(3));
    assert_eq!(seen.wait_for(3, WAIT), vec!["closed:1", "open:2", "open:3"]);
    Ok(())
}

/// A handler defined on a parent state serves its substates.
#[cohort_test]
fn substates_inherit_parent_handlers() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<(String, bool)> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let inbox = agent.direct_mbox().clone();
    let active = agent.create_state("active");
    let idle = agent.create_initial_substate("idle", &active)?;
    agent.set_initial_state(&active)?;

    let probe = seen.clone();
    let parent = active.clone();
    agent
        .subscribe(&inbox)
        .in_state(&active)
        .signal::<Tick, _>(move |agent| {
            probe.record((agent.current_state().name().to_string(), agent.is_in_state(&parent)));
            Ok(())
        })?;
    env.register_agent_as_coop("nested", agent)?;

    inbox.send_signal::<Tick>();
    assert_eq!(seen.wait_for(1, WAIT), vec![(idle.name().to_string(), true)]);
    Ok(())
}

/// Exit hooks run leaf-first up to the common ancestor, enter hooks run
/// top-down to the new leaf.
#[cohort_test]
fn enter_and_exit_hooks_run_in_hierarchy_order() -> anyhow::Result<()> {
    let env = launch(params());
    let trail: Probe<String> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let inbox = agent.direct_mbox().clone();
    let operating = agent.create_state("operating");
    let heating = agent.create_initial_substate("heating", &operating)?;
    let cooling = agent.create_substate("cooling", &operating)?;
    let halted = agent.create_state("halted");

    for state in [&operating, &heating, &cooling, &halted] {
        let on_enter = trail.clone();
        let on_exit = trail.clone();
        let name = state.name().to_string();
        let exit_name = name.clone();
        agent
            .on_enter(state, move |_agent| on_enter.record(format!("+{name}")))?
            .on_exit(state, move |_agent| on_exit.record(format!("-{exit_name}")))?;
    }

    let default = agent.default_state();
    let steps = [operating.clone(), cooling.clone(), halted.clone()];
    let step = AtomicUsize::new(0);
    agent
        .subscribe(&inbox)
        .in_state(&default)
        .in_state(&operating)
        .signal::<Advance, _>(move |agent| {
            let index = step.fetch_add(1, Ordering::SeqCst);
            agent.enter(&steps[index % steps.len()])?;
            Ok(())
        })?;
    env.register_agent_as_coop("thermostat", agent)?;

    for _ in 0..3 {
        inbox.send_signal::<Advance>();
    }
    let expected = vec![
        "+operating",
        "+heating",
        "-heating",
        "+cooling",
        "-cooling",
        "-operating",
        "+halted",
    ];
    assert_eq!(trail.wait_for(expected.len(), WAIT), expected);
    Ok(())
}

#[cohort_test]
fn composite_state_without_initial_substate_cannot_be_entered() -> anyhow::Result<()> {
    let env = launch(params());
    let codes: Probe<i32> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let inbox = agent.direct_mbox().clone();
    let menu = agent.create_state("menu");
    agent.create_substate("settings", &menu)?;
    agent.create_substate("about", &menu)?;

    let probe = codes.clone();
    agent
        .subscribe(&inbox)
        .signal::<Tick, _>(move |agent| {
            let before = agent.current_state();
            let code = agent.enter(&menu).err().map_or(0, |e| e.code());
            assert_eq!(agent.current_state(), before);
            probe.record(code);
            Ok(())
        })?;
    env.register_agent_as_coop("menu", agent)?;

    inbox.send_signal::<Tick>();
    assert_eq!(codes.wait_for(1, WAIT), vec![17]);
    Ok(())
}

#[cohort_test]
fn states_of_another_agent_are_rejected() -> anyhow::Result<()> {
    let env = launch(params());
    let mut owner = env.new_agent::<Door>();
    let mut other = env.new_agent::<Door>();
    let foreign = owner.create_state("mine");
    let inbox = other.direct_mbox().clone();

    let err = other
        .subscribe(&inbox)
        .in_state(&foreign)
        .signal::<Tick, _>(|_agent| Ok(()))
        .expect_err("state belongs to another agent");
    assert_eq!(err.code(), 43);

    let err = other
        .create_substate("child", &foreign)
        .expect_err("parent belongs to another agent");
    assert_eq!(err.code(), 43);

    let err = other
        .set_initial_state(&foreign)
        .expect_err("initial state belongs to another agent");
    assert_eq!(err.code(), 43);
    Ok(())
}

#[cohort_test]
fn state_tree_limits_are_enforced() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Door>();

    let root = agent.create_state("root");
    agent.create_initial_substate("first", &root)?;
    let err = agent
        .create_initial_substate("second", &root)
        .expect_err("only one initial substate");
    assert_eq!(err.code(), 19);

    let mut deepest = root.clone();
    for level in 2..=MAX_STATE_NESTING {
        deepest = agent.create_substate(&format!("level-{level}"), &deepest)?;
    }
    let err = agent
        .create_substate("too-deep", &deepest)
        .expect_err("nesting limit");
    assert_eq!(err.code(), 18);
    Ok(())
}

#[cohort_test]
fn duplicate_handler_in_one_state_is_rejected() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Door>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .event::<Ping, _>(|_agent, _msg| Ok(()))?;
    let err = agent
        .subscribe(&inbox)
        .event::<Ping, _>(|_agent, _msg| Ok(()))
        .expect_err("second handler for the same triple");
    assert_eq!(err.code(), 40);

    let state = agent.default_state();
    agent.drop_subscription::<Ping>(&inbox, &state)?;
    let err = agent
        .drop_subscription::<Ping>(&inbox, &state)
        .expect_err("already dropped");
    assert_eq!(err.code(), 41);
    Ok(())
}

/// The start hook already sees the initial state.
#[cohort_test]
fn initial_state_is_entered_before_the_start_hook() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<String> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let ready = agent.create_state("ready");
    agent.set_initial_state(&ready)?;
    let probe = seen.clone();
    agent.on_start(move |agent| {
        probe.record(agent.current_state().name().to_string());
        Ok(())
    });
    env.register_agent_as_coop("ready", agent)?;

    assert_eq!(seen.wait_for(1, WAIT), vec!["ready"]);
    Ok(())
}

struct StateLog(Probe<String>);

impl StateListener for StateLog {
    fn changed(&self, _agent: AgentId, state: &State) {
        self.0.record(state.name().to_string());
    }
}

/// Listeners hear about every real switch, the initial state included.
#[cohort_test]
fn state_listeners_follow_every_switch() -> anyhow::Result<()> {
    let env = launch(params());
    let shared_log: Probe<String> = Probe::new();
    let owned_log: Probe<(AgentId, String)> = Probe::new();

    let mut agent = env.new_agent::<Door>();
    let door_id = agent.id();
    let inbox = agent.direct_mbox().clone();
    let closed = agent.create_state("closed");
    let open = agent.create_state("open");
    agent.set_initial_state(&closed)?;

    let shared: Arc<dyn StateListener> = Arc::new(StateLog(shared_log.clone()));
    let owned = owned_log.clone();
    agent
        .add_shared_state_listener(Arc::clone(&shared))
        .add_state_listener(move |id: AgentId, state: &State| {
            owned.record((id, state.name().to_string()));
        });

    let target = open.clone();
    agent
        .subscribe(&inbox)
        .in_state(&closed)
        .in_state(&open)
        .event::<Ping, _>(move |agent, _msg| {
            // Re-entering the current state is not a switch.
            agent.enter(&target)?;
            Ok(())
        })?;
    env.register_agent_as_coop("listened", agent)?;

    inbox.send(Ping(1));
    inbox.send(Ping(2));
    assert_eq!(shared_log.wait_for(2, WAIT), vec!["closed", "open"]);
    assert_eq!(
        owned_log.settle(SETTLE),
        vec![(door_id, "closed".to_string()), (door_id, "open".to_string())]
    );
    assert_eq!(shared_log.items().len(), 2);
    Ok(())
}
