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

use std::time::Duration;

use anyhow::anyhow;
use cohort::prelude::*;
use cohort_test::prelude::*;

use crate::setup::messages::{Add, Ping, Slow, Tick};
use crate::setup::{launch, params, WAIT};

mod setup;

#[cohort_agent]
struct Calculator {
    requests: u32,
}

fn calculator(env: &Environment) -> anyhow::Result<(ManagedAgent<Idle, Calculator>, Mbox)> {
    let mut agent = env.new_agent::<Calculator>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .service::<Add, i64, _>(|agent, msg| {
            agent.model.requests += 1;
            let Add { a, b } = *msg.message();
            Ok(a + b)
        })?
        .subscribe(&inbox)
        .service_signal::<Tick, u32, _>(|agent| Ok(agent.model.requests))?;
    Ok((agent, inbox))
}

#[cohort_test]
fn service_request_returns_the_handler_result() -> anyhow::Result<()> {
    let env = launch(params());
    let (agent, inbox) = calculator(&env)?;
    env.register_agent_as_coop("calculator", agent)?;

    let sum: i64 = inbox.request::<i64, Add>(Add { a: 2, b: 3 }).wait_for(WAIT)?;
    assert_eq!(sum, 5);
    let sum = inbox.request_value::<i64, Add>(Add { a: -4, b: 1 }, Wait::Forever)?;
    assert_eq!(sum, -3);
    let count = inbox.request_signal::<u32, Tick>().wait(Wait::For(WAIT))?;
    assert_eq!(count, 2);
    Ok(())
}

/// The returned handle is also a future.
#[cohort_test]
fn service_request_can_be_awaited() -> anyhow::Result<()> {
    let env = launch(params());
    let (agent, inbox) = calculator(&env)?;
    env.register_agent_as_coop("calculator", agent)?;

    let future = inbox.request::<i64, Add>(Add { a: 20, b: 22 });
    let sum = futures::executor::block_on(future)?;
    assert_eq!(sum, 42);
    Ok(())
}

#[cohort_test]
fn request_without_handler_fails_fast() -> anyhow::Result<()> {
    let env = launch(params());
    let empty = env.create_mbox();
    let err = empty
        .request::<i64, Add>(Add { a: 1, b: 1 })
        .wait_for(WAIT)
        .expect_err("nobody serves Add");
    assert_eq!(err.code(), 83);
    Ok(())
}

#[cohort_test]
fn request_with_two_handlers_is_rejected() -> anyhow::Result<()> {
    let env = launch(params());
    let shared = env.create_mbox();
    let mut coop = env.create_coop("twins");
    for _ in 0..2 {
        let mut agent = env.new_agent::<Calculator>();
        agent
            .subscribe(&shared)
            .service::<Add, i64, _>(|_agent, msg| Ok(msg.message().a))?;
        coop.add_agent(agent);
    }
    env.register_coop(coop)?;

    let err = shared
        .request::<i64, Add>(Add { a: 1, b: 1 })
        .wait_for(WAIT)
        .expect_err("two handlers for one request");
    assert_eq!(err.code(), 84);
    Ok(())
}

/// A failing service handler reports to the requester and leaves the
/// cooperation registered.
#[cohort_test]
fn handler_error_goes_to_the_requester() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Calculator>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .service::<Add, i64, _>(|_agent, msg| {
            let Add { a, b } = *msg.message();
            a.checked_div(b).ok_or_else(|| anyhow!("division by zero"))
        })?;
    env.register_agent_as_coop("divider", agent)?;

    let err = inbox
        .request::<i64, Add>(Add { a: 1, b: 0 })
        .wait_for(WAIT)
        .expect_err("division by zero");
    assert_eq!(err.code(), 192);
    assert!(err.to_string().contains("division by zero"));

    let quotient = inbox.request::<i64, Add>(Add { a: 9, b: 3 }).wait_for(WAIT)?;
    assert_eq!(quotient, 3);
    assert_eq!(env.coop_count(), 1);
    Ok(())
}

#[cohort_test]
fn reply_of_the_wrong_type_is_reported() -> anyhow::Result<()> {
    let env = launch(params());
    let (agent, inbox) = calculator(&env)?;
    env.register_agent_as_coop("calculator", agent)?;

    let err = inbox
        .request::<String, Add>(Add { a: 1, b: 2 })
        .wait_for(WAIT)
        .expect_err("the handler returns i64");
    assert_eq!(err.code(), 87);
    Ok(())
}

/// An ordinary event handler can serve a request; the reply is `()`.
#[cohort_test]
fn event_handler_serves_unit_replies() -> anyhow::Result<()> {
    let env = launch(params());
    let seen: Probe<u32> = Probe::new();
    let mut agent = env.new_agent::<Calculator>();
    let inbox = agent.direct_mbox().clone();
    let probe = seen.clone();
    agent.subscribe(&inbox).event::<Ping, _>(move |_agent, msg| {
        probe.record(msg.message().0);
        Ok(())
    })?;
    env.register_agent_as_coop("pinged", agent)?;

    inbox.request::<(), Ping>(Ping(11)).wait_for(WAIT)?;
    assert_eq!(seen.items(), vec![11]);
    Ok(())
}

#[cohort_test]
fn request_not_handled_in_current_state() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Calculator>();
    let inbox = agent.direct_mbox().clone();
    let busy = agent.create_state("busy");
    agent
        .subscribe(&inbox)
        .in_state(&busy)
        .service::<Add, i64, _>(|_agent, msg| Ok(msg.message().a))?;
    env.register_agent_as_coop("picky", agent)?;

    let err = inbox
        .request::<i64, Add>(Add { a: 1, b: 1 })
        .wait_for(WAIT)
        .expect_err("the handler exists only in `busy`");
    assert_eq!(err.code(), 85);
    Ok(())
}

#[cohort_test]
fn bounded_wait_times_out() -> anyhow::Result<()> {
    let env = launch(params());
    let mut agent = env.new_agent::<Calculator>();
    let inbox = agent.direct_mbox().clone();
    agent
        .subscribe(&inbox)
        .service::<Slow, u64, _>(|_agent, msg| {
            std::thread::sleep(Duration::from_millis(msg.message().millis));
            Ok(msg.message().millis)
        })?;
    env.register_agent_as_coop("sleeper", agent)?;

    let err = inbox
        .request::<u64, Slow>(Slow { millis: 400 })
        .wait_for(Duration::from_millis(50))
        .expect_err("the handler sleeps longer than the wait");
    assert_eq!(err, CohortError::ServiceRequestTimeout(Duration::from_millis(50)));
    assert_eq!(err.code(), 190);
    Ok(())
}
