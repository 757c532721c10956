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

use cohort::prelude::*;
use cohort_test::prelude::*;

use crate::setup::messages::{Ping, Text, Tick};
use crate::setup::{launch, params, SETTLE, WAIT};

mod setup;

#[cohort_agent]
struct Throttled;

/// Builds an agent limited by `limit` that records each `Ping` it handles.
fn limited(
    env: &Environment,
    inbox: Option<&Mbox>,
    limit: MessageLimit,
    seen: &Probe<u32>,
) -> anyhow::Result<(ManagedAgent<Idle, Throttled>, Mbox)> {
    let mut agent = env.new_agent_with_config::<Throttled>(AgentConfig::default().with_limit(limit))?;
    let inbox = inbox.cloned().unwrap_or_else(|| agent.direct_mbox().clone());
    let probe = seen.clone();
    agent.subscribe(&inbox).event::<Ping, _>(move |_agent, msg| {
        probe.record(msg.message().0);
        Ok(())
    })?;
    Ok((agent, inbox))
}

/// Demands queued before registration count toward the limit.
#[cohort_test]
fn overflow_is_dropped() -> anyhow::Result<()> {
    let env = launch(params());
    let seen = Probe::new();
    let (agent, inbox) = limited(&env, None, MessageLimit::of::<Ping>(2, OverlimitReaction::Drop), &seen)?;

    for n in 0..5 {
        inbox.send(Ping(n));
    }
    env.register_agent_as_coop("dropper", agent)?;

    assert_eq!(seen.wait_for(2, WAIT), vec![0, 1]);
    assert_eq!(seen.settle(SETTLE).len(), 2);

    // Handled demands free their slots.
    inbox.send(Ping(9));
    assert_eq!(seen.wait_for(3, WAIT), vec![0, 1, 9]);
    Ok(())
}

#[cohort_test]
fn overflow_is_redirected() -> anyhow::Result<()> {
    let env = launch(params());
    let first_seen = Probe::new();
    let second_seen = Probe::new();

    let (second, spare) = limited(&env, None, MessageLimit::of::<Ping>(10, OverlimitReaction::Drop), &second_seen)?;
    let (first, inbox) = limited(
        &env,
        None,
        MessageLimit::of::<Ping>(1, OverlimitReaction::Redirect(spare)),
        &first_seen,
    )?;

    for n in 0..3 {
        inbox.send(Ping(n));
    }
    let mut coop = env.create_coop("pair");
    coop.add_agent(first);
    coop.add_agent(second);
    env.register_coop(coop)?;

    assert_eq!(first_seen.wait_for(1, WAIT), vec![0]);
    assert_eq!(second_seen.wait_for(2, WAIT), vec![1, 2]);
    assert_eq!(first_seen.settle(SETTLE).len(), 1);
    Ok(())
}

#[cohort_test]
fn log_then_deliver_keeps_everything() -> anyhow::Result<()> {
    let env = launch(params());
    let seen = Probe::new();
    let (agent, inbox) = limited(&env, None, MessageLimit::of::<Ping>(1, OverlimitReaction::LogThenDeliver), &seen)?;

    for n in 0..4 {
        inbox.send(Ping(n));
    }
    env.register_agent_as_coop("lenient", agent)?;

    assert_eq!(seen.wait_for(4, WAIT), vec![0, 1, 2, 3]);
    Ok(())
}

/// Two agents redirecting to each other with no capacity must not loop forever.
#[cohort_test]
fn redirect_cycles_end_in_a_drop() -> anyhow::Result<()> {
    let env = launch(params());
    let left = env.create_mbox();
    let right = env.create_mbox();
    let left_seen = Probe::new();
    let right_seen = Probe::new();

    let (a, _) = limited(
        &env,
        Some(&left),
        MessageLimit::of::<Ping>(0, OverlimitReaction::Redirect(right.clone())),
        &left_seen,
    )?;
    let (b, _) = limited(
        &env,
        Some(&right),
        MessageLimit::of::<Ping>(0, OverlimitReaction::Redirect(left.clone())),
        &right_seen,
    )?;
    let mut coop = env.create_coop("ping-pong");
    coop.add_agent(a);
    coop.add_agent(b);
    env.register_coop(coop)?;

    left.send(Ping(1));
    right.send(Ping(2));
    assert!(left_seen.settle(SETTLE).is_empty());
    assert!(right_seen.is_empty());
    Ok(())
}

#[cohort_test]
fn signals_have_limits_too() -> anyhow::Result<()> {
    let env = launch(params());
    let ticks: Probe<()> = Probe::new();
    let config = AgentConfig::default().with_limit(MessageLimit::of_signal::<Tick>(1, OverlimitReaction::Drop));
    let mut agent = env.new_agent_with_config::<Throttled>(config)?;
    let inbox = agent.direct_mbox().clone();
    let probe = ticks.clone();
    agent.subscribe(&inbox).signal::<Tick, _>(move |_agent| {
        probe.record(());
        Ok(())
    })?;

    inbox.send_signal::<Tick>();
    inbox.send_signal::<Tick>();
    env.register_agent_as_coop("ticker", agent)?;

    assert_eq!(ticks.wait_for(1, WAIT).len(), 1);
    assert_eq!(ticks.settle(SETTLE).len(), 1);
    Ok(())
}

#[cohort_test]
fn limited_agents_need_a_limit_per_subscribed_type() -> anyhow::Result<()> {
    let env = launch(params());
    let seen = Probe::new();
    let (mut agent, inbox) = limited(&env, None, MessageLimit::of::<Ping>(3, OverlimitReaction::Drop), &seen)?;

    let err = agent
        .subscribe(&inbox)
        .event::<Text, _>(|_agent, _msg| Ok(()))
        .expect_err("Text has no limit");
    assert_eq!(err.code(), 48);
    assert_eq!(agent.subscription_count(), 1);
    Ok(())
}

#[cohort_test]
fn one_limit_per_message_type() -> anyhow::Result<()> {
    let env = launch(params());
    let config = AgentConfig::default()
        .with_limit(MessageLimit::of::<Ping>(1, OverlimitReaction::Drop))
        .with_limit(MessageLimit::of::<Ping>(5, OverlimitReaction::LogThenDeliver));

    let err = env
        .new_agent_with_config::<Throttled>(config)
        .expect_err("Ping is limited twice");
    assert_eq!(err.code(), 49);
    Ok(())
}
