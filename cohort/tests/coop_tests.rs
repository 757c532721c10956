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

use std::sync::Arc;

use anyhow::bail;
use cohort::prelude::*;
use cohort_test::prelude::*;

use crate::setup::messages::{Fail, Ping, Tick};
use crate::setup::{launch, params, RecordingGuard, RecordingListener, SETTLE, WAIT};

mod setup;

#[cohort_agent]
struct Worker;

/// Records its index when the runtime drops it.
#[derive(Debug)]
struct Tracked {
    index: usize,
    dropped: Probe<usize>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.record(self.index);
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while !condition() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    true
}

#[cohort_test]
fn notificators_report_registration_and_reason() -> anyhow::Result<()> {
    let env = launch(params());
    let events: Probe<String> = Probe::new();

    let mut coop = env.create_coop("reporting");
    coop.add_agent(env.new_agent::<Worker>());
    let on_reg = events.clone();
    let on_dereg = events.clone();
    coop.add_reg_notificator(move |_env, name| on_reg.record(format!("reg {name}")))
        .add_dereg_notificator(move |_env, name, reason| {
            on_dereg.record(format!("dereg {name} {reason}"));
        });

    let handle = env.register_coop(coop)?;
    assert_eq!(handle.name(), "reporting");
    assert_eq!(env.coop_count(), 1);
    assert_eq!(events.items(), vec!["reg reporting"]);

    env.deregister_coop("reporting", DeregReason::Normal)?;
    assert_eq!(events.wait_for(2, WAIT), vec!["reg reporting", "dereg reporting normal"]);
    assert!(wait_until(|| env.coop_count() == 0));
    Ok(())
}

#[cohort_test]
fn registration_rejects_bad_names_and_parents() -> anyhow::Result<()> {
    let env = launch(params());
    env.register_coop(env.create_coop("unique"))?;

    let err = env.register_coop(env.create_coop("unique")).expect_err("duplicate");
    assert_eq!(err.code(), 21);

    let err = env.register_coop(env.create_coop("")).expect_err("empty name");
    assert_eq!(err, CohortError::EmptyName);

    let err = env
        .register_coop(env.create_child_coop("orphan", "missing"))
        .expect_err("missing parent");
    assert_eq!(err.code(), 26);

    let err = env
        .deregister_coop("missing", DeregReason::Normal)
        .expect_err("unknown coop");
    assert_eq!(err.code(), 23);
    assert_eq!(env.coop_count(), 1);
    Ok(())
}

#[cohort_test]
fn start_and_finish_hooks_bracket_message_handling() -> anyhow::Result<()> {
    let env = launch(params());
    let trail: Probe<String> = Probe::new();

    let mut agent = env.new_agent::<Worker>();
    let inbox = agent.direct_mbox().clone();
    let started = trail.clone();
    let finished = trail.clone();
    let handled = trail.clone();
    agent
        .on_start(move |agent| {
            started.record(format!("start {}", agent.coop_name().unwrap_or_default()));
            Ok(())
        })
        .on_finish(move |_agent| {
            finished.record("finish".to_string());
            Ok(())
        });
    agent
        .subscribe(&inbox)
        .event::<Ping, _>(move |agent, msg| {
            handled.record(format!("ping {}", msg.message().0));
            agent.deregister_coop_normally();
            Ok(())
        })?;
    env.register_agent_as_coop("hooks", agent)?;

    inbox.send(Ping(1));
    assert_eq!(trail.wait_for(3, WAIT), vec!["start hooks", "ping 1", "finish"]);
    assert!(wait_until(|| env.coop_count() == 0));
    Ok(())
}

/// Deregistering a parent takes its children down first, and their agents
/// are destroyed bottom-up.
#[cohort_test]
fn child_chain_is_destroyed_from_the_leaf_up() -> anyhow::Result<()> {
    let env = launch(params());
    let dropped: Probe<usize> = Probe::new();
    let reasons: Probe<(usize, DeregReason)> = Probe::new();

    for index in 0..6 {
        let name = format!("chain-{index}");
        let mut coop = if index == 0 {
            env.create_coop(name)
        } else {
            env.create_child_coop(name, format!("chain-{}", index - 1))
        };
        coop.add_agent(env.new_agent_with_model(Tracked {
            index,
            dropped: dropped.clone(),
        }));
        let probe = reasons.clone();
        coop.add_dereg_notificator(move |_env, _name, reason| probe.record((index, reason)));
        env.register_coop(coop)?;
    }
    assert_eq!(env.coop_count(), 6);

    env.deregister_coop("chain-0", DeregReason::Normal)?;
    assert_eq!(dropped.wait_for(6, WAIT), vec![5, 4, 3, 2, 1, 0]);

    let reasons = reasons.wait_for(6, WAIT);
    assert_eq!(reasons[5], (0, DeregReason::Normal));
    assert!(reasons[..5]
        .iter()
        .all(|(_, reason)| *reason == DeregReason::ParentDeregistration));
    assert!(wait_until(|| env.coop_count() == 0));
    Ok(())
}

#[cohort_test]
fn failing_handler_deregisters_its_coop_by_default() -> anyhow::Result<()> {
    let env = launch(params());
    let reasons: Probe<DeregReason> = Probe::new();

    let mut agent = env.new_agent::<Worker>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .signal::<Fail, _>(|_agent| bail!("worker gave up"))?;
    let mut coop = env.create_coop("fragile");
    coop.add_agent(agent);
    let probe = reasons.clone();
    coop.add_dereg_notificator(move |_env, _name, reason| probe.record(reason));
    env.register_coop(coop)?;

    inbox.send_signal::<Fail>();
    assert_eq!(reasons.wait_for(1, WAIT), vec![DeregReason::UnhandledException]);
    Ok(())
}

/// A panic in a handler is treated like a returned error.
#[cohort_test]
fn panicking_handler_is_contained() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<u32> = Probe::new();

    let mut agent = env.new_agent_with_config::<Worker>(
        AgentConfig::named("stubborn")?.with_exception_reaction(ExceptionReaction::Ignore),
    )?;
    let inbox = agent.direct_mbox().clone();
    let probe = seen.clone();
    agent
        .subscribe(&inbox)
        .signal::<Fail, _>(|_agent| panic!("handler exploded"))?
        .subscribe(&inbox)
        .event::<Ping, _>(move |_agent, msg| {
            probe.record(msg.message().0);
            Ok(())
        })?;
    env.register_agent_as_coop("stubborn", agent)?;

    inbox.send_signal::<Fail>();
    inbox.send(Ping(2));
    assert_eq!(seen.wait_for(1, WAIT), vec![2]);
    assert_eq!(env.coop_count(), 1);
    Ok(())
}

/// An agent left at `Inherit` takes the cooperation's reaction.
#[cohort_test]
fn coop_reaction_applies_to_inheriting_agents() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<u32> = Probe::new();

    let mut agent = env.new_agent::<Worker>();
    let inbox = agent.direct_mbox().clone();
    let probe = seen.clone();
    agent
        .subscribe(&inbox)
        .signal::<Fail, _>(|_agent| bail!("ignored by the cooperation"))?
        .subscribe(&inbox)
        .event::<Ping, _>(move |_agent, msg| {
            probe.record(msg.message().0);
            Ok(())
        })?;
    let mut coop = env.create_coop("tolerant");
    coop.set_exception_reaction(ExceptionReaction::Ignore);
    coop.add_agent(agent);
    env.register_coop(coop)?;

    inbox.send_signal::<Fail>();
    inbox.send(Ping(3));
    assert_eq!(seen.wait_for(1, WAIT), vec![3]);
    assert_eq!(env.coop_count(), 1);
    Ok(())
}

#[cohort_test]
fn shutdown_reaction_stops_the_environment() -> anyhow::Result<()> {
    let env = launch(params().with_exception_reaction(ExceptionReaction::ShutdownEnvironment));
    let reasons: Probe<DeregReason> = Probe::new();

    let mut agent = env.new_agent::<Worker>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .signal::<Fail, _>(|_agent| bail!("fatal"))?;
    let mut coop = env.create_coop("fatal");
    coop.add_agent(agent);
    let probe = reasons.clone();
    coop.add_dereg_notificator(move |_env, _name, reason| probe.record(reason));
    env.register_coop(coop)?;

    inbox.send_signal::<Fail>();
    env.join();
    assert_eq!(reasons.items(), vec![DeregReason::Shutdown]);
    assert_eq!(env.coop_count(), 0);
    Ok(())
}

#[cohort_test]
fn stop_guard_holds_shutdown_back() -> anyhow::Result<()> {
    let env = launch(params());
    env.register_coop(env.create_coop("guarded"))?;

    let guard = Arc::new(RecordingGuard::default());
    let installed: Arc<dyn StopGuard> = guard.clone();
    env.setup_stop_guard(Arc::clone(&installed))?;

    env.stop();
    assert_eq!(guard.stops.wait_for(1, WAIT).len(), 1);
    assert_eq!(env.coop_count(), 1);

    let late: Arc<dyn StopGuard> = Arc::new(RecordingGuard::default());
    let err = env.setup_stop_guard(late).expect_err("stop already requested");
    assert_eq!(err.code(), 193);

    let handle = env.register_coop(env.create_coop("still-allowed"))?;
    assert_eq!(handle.name(), "still-allowed");
    assert_eq!(env.coop_count(), 2);

    env.remove_stop_guard(&installed);
    env.join();
    assert_eq!(env.coop_count(), 0);
    Ok(())
}

#[cohort_test]
fn registration_after_stop_is_refused() -> anyhow::Result<()> {
    let env = launch(params());
    env.stop();
    let err = env
        .register_coop(env.create_coop("late"))
        .expect_err("environment is stopping");
    assert_eq!(err.code(), 28);
    Ok(())
}

#[cohort_test]
fn listener_sees_every_coop() -> anyhow::Result<()> {
    let listener = Arc::new(RecordingListener::default());
    let env = launch(params().with_coop_listener(listener.clone()));

    env.register_coop(env.create_coop("observed"))?;
    env.deregister_coop("observed", DeregReason::UserDefined(2))?;
    assert_eq!(
        listener.events.wait_for(2, WAIT),
        vec!["+observed".to_string(), format!("-observed:{}", 0x1002)]
    );
    Ok(())
}

/// A failed binding leaves nothing behind: the name can be used again.
#[cohort_test]
fn failed_binding_rolls_registration_back() -> anyhow::Result<()> {
    let env = launch(params().with_named_dispatcher(
        "pool",
        Dispatcher::thread_pool(ThreadPoolParams::default().with_thread_count(2)),
    ));
    let started: Probe<()> = Probe::new();

    let mut coop = env.create_coop("misbound");
    let mut agent = env.new_agent::<Worker>();
    let probe = started.clone();
    agent.on_start(move |_agent| {
        probe.record(());
        Ok(())
    });
    coop.add_agent(agent);
    coop.add_agent_with_binder(env.new_agent::<Worker>(), DispBinder::active_obj("nowhere"));
    let err = env.register_coop(coop).expect_err("unknown dispatcher");
    assert_eq!(err.code(), 13);

    let mut coop = env.create_coop("misbound");
    coop.add_agent_with_binder(env.new_agent::<Worker>(), DispBinder::active_obj("pool"));
    let err = env.register_coop(coop).expect_err("wrong dispatcher kind");
    assert_eq!(err.code(), 32);

    assert_eq!(env.coop_count(), 0);
    assert!(started.settle(SETTLE).is_empty());
    env.register_coop(env.create_coop("misbound"))?;
    Ok(())
}

#[cohort_test]
fn autoshutdown_stops_after_the_last_coop() -> anyhow::Result<()> {
    let env = launch(params().with_autoshutdown(true));
    let mut agent = env.new_agent::<Worker>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .signal::<Tick, _>(|agent| {
            agent.deregister_coop_normally();
            Ok(())
        })?;
    env.register_agent_as_coop("only", agent)?;

    inbox.send_signal::<Tick>();
    env.join();
    assert_eq!(env.coop_count(), 0);
    Ok(())
}

#[cohort_test]
fn panic_strategy_raises_registration_errors() -> anyhow::Result<()> {
    let env = launch(params());
    env.register_coop_with(env.create_coop("once"), ThrowingStrategy::Panic)?;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = env.register_coop_with(env.create_coop("once"), ThrowingStrategy::Panic);
    }));
    assert!(outcome.is_err());
    Ok(())
}

#[cohort_test]
fn run_stops_and_reports_a_failed_init() -> anyhow::Result<()> {
    let err = CohortApp::run(params(), |env| {
        env.register_agent_as_coop("started", env.new_agent::<Worker>())?;
        bail!("init refused")
    })
    .expect_err("init failed");
    assert_eq!(err.to_string(), "init refused");
    Ok(())
}

#[cohort_test]
fn run_returns_once_the_environment_shuts_itself_down() -> anyhow::Result<()> {
    let started: Probe<()> = Probe::new();
    let probe = started.clone();
    CohortApp::run(params().with_autoshutdown(true), move |env| {
        let mut agent = env.new_agent::<Worker>();
        agent.on_start(move |agent| {
            probe.record(());
            agent.deregister_coop_normally();
            Ok(())
        });
        env.register_agent_as_coop("one-shot", agent)?;
        Ok(())
    })?;
    assert_eq!(started.items().len(), 1);
    Ok(())
}

/// Every concurrent `join` returns only after the environment is fully torn
/// down, not just the first one.
#[cohort_test]
fn concurrent_joins_all_wait_for_the_teardown() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Worker>();
    agent.on_finish(|_agent| {
        std::thread::sleep(std::time::Duration::from_millis(50));
        Ok(())
    });
    env.register_agent_as_coop("slow-finish", agent)?;
    let inbox = env.create_mbox();
    env.stop();

    let refusals: Probe<i32> = Probe::new();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let refusals = refusals.clone();
            let env: &Environment = &env;
            let inbox = inbox.clone();
            scope.spawn(move || {
                env.join();
                let code = env
                    .send_delayed_signal::<Tick>(&inbox, std::time::Duration::from_millis(10))
                    .map_or_else(|err| err.code(), |()| 0);
                refusals.record(code);
            });
        }
    });
    assert_eq!(refusals.items(), vec![90; 4]);
    assert_eq!(env.coop_count(), 0);
    Ok(())
}
