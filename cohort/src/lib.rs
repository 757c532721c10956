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

#![forbid(unsafe_code)]

//! # Cohort
//!
//! An agent runtime. Agents are plain model structs wrapped by the runtime;
//! they react to messages delivered through mboxes, are grouped into
//! cooperations that register and deregister as a unit, and run on
//! dispatchers that own the worker threads.
//!
//! ## Key Concepts
//!
//! - **Agents (`ManagedAgent`)**: a model plus its subscriptions and a
//!   hierarchical state machine. Built while `Idle`, then driven by the
//!   runtime as `Running`.
//! - **Mboxes (`Mbox`)**: multi-consumer mboxes fan messages out to every
//!   subscriber; each agent's direct mbox has exactly one consumer.
//! - **Cooperations (`Coop`)**: named groups of agents with an optional
//!   parent. Teardown always runs on a dedicated thread.
//! - **Dispatchers (`Dispatcher`, `DispBinder`)**: one thread, a thread per
//!   agent or group, a thread pool, and priority-aware variants.
//! - **Timers**: delayed and periodic sends driven by a separate timer thread.
//! - **Service requests**: `Mbox::request` returns a future-like handle for
//!   the single handler's reply.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cohort::prelude::*;
//!
//! #[cohort_message]
//! struct Greeting(String);
//!
//! #[cohort_agent]
//! struct Greeter;
//!
//! fn main() -> anyhow::Result<()> {
//!     let env = CohortApp::launch()?;
//!     let mut greeter = env.new_agent::<Greeter>();
//!     let inbox = greeter.direct_mbox().clone();
//!     greeter.subscribe(&inbox).event(|_agent, msg: &MessageContext<Greeting>| {
//!         println!("hello, {}", msg.message().0);
//!         Ok(())
//!     })?;
//!     env.register_agent_as_coop("greeter", greeter)?;
//!     inbox.send(Greeting("world".into()));
//!     env.stop_then_join();
//!     Ok(())
//! }
//! ```

extern crate self as cohort;

pub(crate) mod agent;
pub(crate) mod common;
pub(crate) mod coop;
pub(crate) mod dispatcher;
pub(crate) mod mbox;
pub(crate) mod message;
pub(crate) mod timer;
pub(crate) mod traits;

/// Everything an application needs, in one import.
pub mod prelude {
    pub use cohort_macro::*;

    pub use crate::agent::{
        AgentConfig, Idle, ManagedAgent, Running, State, SubscriptionBind,
        SubscriptionStorageKind, MAX_STATE_NESTING,
    };
    pub use crate::common::{
        AgentId, CohortApp, CohortConfig, CohortError, CoopId, Environment, EnvironmentParams,
        EventExceptionLogger, ExceptionReaction, MboxId, Priority, Result, StateId, ThreadSafety,
        ThrowingStrategy, TracingExceptionLogger, WrappedEnvironment, CONFIG,
    };
    pub use crate::coop::{
        AgentRef, Coop, CoopHandle, DeregNotificator, DeregReason, RegNotificator,
    };
    pub use crate::dispatcher::{
        ActiveGroupDispatcher, ActiveObjDispatcher, BindingKind, DispBinder, Dispatcher,
        DispatcherKind, FifoKind, OneThreadDispatcher, PoolBindParams,
        PrioDedicatedThreadsDispatcher, PrioOneThreadDispatcher, PriorityPolicy, QueueLockKind,
        Quotes, ThreadPoolDispatcher, ThreadPoolParams,
    };
    pub use crate::mbox::{Mbox, MboxKind};
    pub use crate::message::{
        MessageContext, MessageLimit, MessageRef, OverlimitReaction, ServiceFuture, Wait,
    };
    pub use crate::timer::TimerId;
    pub use crate::traits::{CoopListener, Message, Signal, StateListener, StopGuard};
}
