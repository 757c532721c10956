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

use std::time::{Duration, Instant};

use cohort::prelude::*;
use cohort_test::prelude::*;

use crate::setup::messages::{Ping, Tick};
use crate::setup::{launch, params, SETTLE, WAIT};

mod setup;

#[cohort_agent]
struct Clock;

/// Registers an agent that records every `Ping` and `Tick` arriving at `inbox`.
fn watch(env: &Environment, name: &str, inbox: &Mbox) -> anyhow::Result<(Probe<u32>, Probe<Instant>)> {
    let pings = Probe::new();
    let ticks = Probe::new();
    let mut agent = env.new_agent::<Clock>();
    let on_ping = pings.clone();
    agent.subscribe(inbox).event::<Ping, _>(move |_agent, msg| {
        on_ping.record(msg.message().0);
        Ok(())
    })?;
    let on_tick = ticks.clone();
    agent.subscribe(inbox).signal::<Tick, _>(move |_agent| {
        on_tick.record(Instant::now());
        Ok(())
    })?;
    env.register_agent_as_coop(name, agent)?;
    Ok((pings, ticks))
}

#[cohort_test]
fn delayed_message_waits_for_its_delay() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (pings, _ticks) = watch(&env, "delayed", &inbox)?;

    let sent_at = Instant::now();
    env.send_delayed(&inbox, Ping(3), Duration::from_millis(150))?;
    assert!(pings.settle(Duration::from_millis(50)).is_empty());
    assert_eq!(pings.wait_for(1, WAIT), vec![3]);
    assert!(sent_at.elapsed() >= Duration::from_millis(150));
    Ok(())
}

#[cohort_test]
fn periodic_signal_repeats_until_cancelled() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (_pings, ticks) = watch(&env, "periodic", &inbox)?;

    let timer = env.send_periodic_signal::<Tick>(&inbox, Duration::from_millis(10), Duration::from_millis(30))?;
    assert!(timer.is_active());
    assert!(ticks.wait_for(3, WAIT).len() >= 3);

    timer.cancel();
    assert!(!timer.is_active());
    // A tick already in flight may still land; after that the count is frozen.
    let after_cancel = ticks.settle(SETTLE).len();
    assert_eq!(ticks.settle(SETTLE).len(), after_cancel);
    Ok(())
}

#[cohort_test]
fn cancelled_timer_never_fires() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (pings, _ticks) = watch(&env, "cancelled", &inbox)?;

    let timer = env.schedule_timer(&inbox, Ping(1), Duration::from_millis(100), Duration::ZERO)?;
    timer.cancel();
    // Cancelling twice is harmless.
    timer.cancel();
    assert!(pings.settle(Duration::from_millis(300)).is_empty());
    Ok(())
}

/// A one-shot timer is spent once it fires; cancelling it afterwards changes nothing.
#[cohort_test]
fn cancelling_a_fired_timer_is_harmless() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (pings, _ticks) = watch(&env, "spent", &inbox)?;

    let timer = env.schedule_timer(&inbox, Ping(5), Duration::from_millis(20), Duration::ZERO)?;
    assert_eq!(pings.wait_for(1, WAIT), vec![5]);
    timer.cancel();
    assert!(!timer.is_active());
    assert_eq!(pings.settle(SETTLE), vec![5]);
    Ok(())
}

#[cohort_test]
fn dropping_the_last_timer_id_cancels_the_timer() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (pings, _ticks) = watch(&env, "dropped", &inbox)?;

    let timer = env.send_periodic(&inbox, Ping(5), Duration::from_millis(100), Duration::from_millis(100))?;
    let copy = timer.clone();
    drop(timer);
    assert!(copy.is_active());
    drop(copy);
    assert!(pings.settle(Duration::from_millis(300)).is_empty());
    Ok(())
}

#[cohort_test]
fn delayed_send_survives_without_a_handle() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    let (_pings, ticks) = watch(&env, "detached", &inbox)?;

    env.send_delayed_signal::<Tick>(&inbox, Duration::from_millis(20))?;
    assert_eq!(ticks.wait_for(1, WAIT).len(), 1);
    assert_eq!(ticks.settle(SETTLE).len(), 1);
    Ok(())
}

#[cohort_test]
fn scheduling_after_join_is_rejected() -> anyhow::Result<()> {
    let env = launch(params());
    let inbox = env.create_mbox();
    env.stop_then_join();

    let err = env
        .schedule_timer(&inbox, Ping(0), Duration::from_millis(10), Duration::ZERO)
        .expect_err("the timer thread is gone after join");
    assert_eq!(err.code(), 90);
    let err = env
        .send_delayed_signal::<Tick>(&inbox, Duration::from_millis(10))
        .expect_err("the timer thread is gone after join");
    assert_eq!(err.code(), 90);
    Ok(())
}
