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
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, trace, warn};

use crate::agent::{AgentConfig, AgentCore, Idle, ManagedAgent, SubscriptionStorageKind};
use crate::common::{
    CohortError, EnvironmentParams, EventExceptionLogger, ExceptionReaction, Priority, Result,
    ThrowingStrategy,
};
use crate::coop::{Coop, CoopEntry, CoopHandle, CoopRepository, DeregExecutor, DeregReason};
use crate::dispatcher::{AgentBinding, DispBinder, Dispatcher, DEFAULT_DISPATCHER_NAME};
use crate::mbox::{lookup_or_create, LocalMbox, Mbox, NamedMboxRegistry};
use crate::message::{LimitTable, MessageRef};
use crate::timer::{TimerId, TimerManager, TimerPayload};
use crate::traits::{CoopListener, Message, Signal, StopGuard};

#[derive(Default)]
struct StopState {
    requested: bool,
    shutdown_started: bool,
    guards: Vec<Arc<dyn StopGuard>>,
}

/// Shared state behind every [`Environment`] clone.
pub struct EnvironmentInner {
    default_dispatcher: Dispatcher,
    dispatchers: HashMap<String, Dispatcher>,
    exception_reaction: ExceptionReaction,
    exception_logger: Arc<dyn EventExceptionLogger>,
    coop_listener: Option<Arc<dyn CoopListener>>,
    autoshutdown: bool,
    subscription_storage: SubscriptionStorageKind,
    max_redirection_depth: usize,
    named_mboxes: Arc<NamedMboxRegistry>,
    coops: CoopRepository,
    dereg: DeregExecutor,
    timers: TimerManager,
    stop: Mutex<StopState>,
    /// Held for the whole teardown; true once it has finished.
    joined: Mutex<bool>,
}

/// Handle to a running environment.
///
/// Clones are cheap and share everything. Agents, cooperations, mboxes and
/// timers are all created through it. Call [`Environment::stop_then_join`]
/// (or use a [`WrappedEnvironment`](crate::common::WrappedEnvironment)) before
/// the last handle goes away; live agents keep the environment alive.
#[derive(Clone)]
pub struct Environment(Arc<EnvironmentInner>);

impl Environment {
    /// Starts every thread the environment needs and hands back the handle.
    /// Dispatchers that already started are shut down again on failure.
    pub(crate) fn start(params: EnvironmentParams) -> Result<Self> {
        if params.dispatchers.keys().any(String::is_empty) {
            return Err(CohortError::EmptyName);
        }
        let timers = TimerManager::start(&params.timer_thread_name)?;
        let default_dispatcher = Dispatcher::one_thread_with(params.queue_lock);

        let mut started: Vec<&Dispatcher> = Vec::with_capacity(params.dispatchers.len() + 1);
        let mut outcome = default_dispatcher.start(DEFAULT_DISPATCHER_NAME);
        if outcome.is_ok() {
            started.push(&default_dispatcher);
            for (name, dispatcher) in &params.dispatchers {
                outcome = dispatcher.start(name);
                if outcome.is_err() {
                    break;
                }
                debug!(dispatcher = %name, kind = %dispatcher.kind(), "dispatcher started");
                started.push(dispatcher);
            }
        }
        let dereg = match outcome.and_then(|()| DeregExecutor::start()) {
            Ok(dereg) => dereg,
            Err(err) => {
                for dispatcher in &started {
                    dispatcher.shutdown();
                }
                for dispatcher in &started {
                    dispatcher.wait();
                }
                return Err(err);
            }
        };

        Ok(Self(Arc::new(EnvironmentInner {
            default_dispatcher,
            dispatchers: params.dispatchers,
            exception_reaction: params.exception_reaction,
            exception_logger: params.exception_logger,
            coop_listener: params.coop_listener,
            autoshutdown: params.autoshutdown,
            subscription_storage: params.subscription_storage,
            max_redirection_depth: params.max_redirection_depth,
            named_mboxes: Arc::new(NamedMboxRegistry::new()),
            coops: CoopRepository::new(),
            dereg,
            timers,
            stop: Mutex::new(StopState::default()),
            joined: Mutex::new(false),
        })))
    }

    pub(crate) fn from_weak(weak: &Weak<EnvironmentInner>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    pub(crate) fn downgrade(&self) -> Weak<EnvironmentInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn runtime_handle(&self) -> Handle {
        self.0.timers.handle()
    }

    pub(crate) fn max_redirection_depth(&self) -> usize {
        self.0.max_redirection_depth
    }

    pub(crate) fn exception_logger(&self) -> &dyn EventExceptionLogger {
        self.0.exception_logger.as_ref()
    }

    /// Environment-wide reaction, the last step of reaction resolution.
    #[must_use]
    pub fn exception_reaction(&self) -> ExceptionReaction {
        self.0.exception_reaction
    }

    /// Looks up a named dispatcher; `None` means the default one.
    pub(crate) fn find_dispatcher(&self, name: Option<&str>) -> Result<Dispatcher> {
        match name {
            None => Ok(self.0.default_dispatcher.clone()),
            Some(name) => match self.0.dispatchers.get(name) {
                Some(dispatcher) => Ok(dispatcher.clone()),
                None if name == DEFAULT_DISPATCHER_NAME => Ok(self.0.default_dispatcher.clone()),
                None => Err(CohortError::NamedDispatcherNotFound(name.to_string())),
            },
        }
    }

    /// A dispatcher registered at launch under `name`.
    #[must_use]
    pub fn named_dispatcher(&self, name: &str) -> Option<Dispatcher> {
        self.0.dispatchers.get(name).cloned()
    }

    #[must_use]
    pub fn default_dispatcher(&self) -> Dispatcher {
        self.0.default_dispatcher.clone()
    }

    // --- agents ---

    /// Creates an agent around `Model::default()`.
    #[must_use]
    pub fn new_agent<Model>(&self) -> ManagedAgent<Idle, Model>
    where
        Model: Default + Send + Sync + Debug + 'static,
    {
        self.new_agent_with_model(Model::default())
    }

    #[must_use]
    pub fn new_agent_with_model<Model>(&self, model: Model) -> ManagedAgent<Idle, Model>
    where
        Model: Send + Sync + Debug + 'static,
    {
        let core = AgentCore::new(
            self,
            None,
            Priority::default(),
            ExceptionReaction::Inherit,
            LimitTable::new(),
        );
        ManagedAgent::new(self, core, self.0.subscription_storage, model)
    }

    /// Creates an agent with a name, priority, reaction, storage or limits.
    ///
    /// # Errors
    ///
    /// Fails with `SeveralLimitsForOneMessageType` when `config` limits one
    /// message type twice.
    pub fn new_agent_with_config<Model>(&self, config: AgentConfig) -> Result<ManagedAgent<Idle, Model>>
    where
        Model: Default + Send + Sync + Debug + 'static,
    {
        self.new_agent_with(config, Model::default())
    }

    /// Like [`Environment::new_agent_with_config`], with an explicit model.
    ///
    /// # Errors
    ///
    /// See [`Environment::new_agent_with_config`].
    pub fn new_agent_with<Model>(&self, config: AgentConfig, model: Model) -> Result<ManagedAgent<Idle, Model>>
    where
        Model: Send + Sync + Debug + 'static,
    {
        let limits = config.limit_table()?;
        let core = AgentCore::new(self, config.name(), config.priority(), config.reaction(), limits);
        let storage = config.storage().unwrap_or(self.0.subscription_storage);
        Ok(ManagedAgent::new(self, core, storage, model))
    }

    // --- cooperations ---

    #[must_use]
    pub fn create_coop(&self, name: impl Into<String>) -> Coop {
        Coop::new(name.into(), None)
    }

    /// A cooperation that is deregistered together with `parent`, and that
    /// `parent` outlives.
    #[must_use]
    pub fn create_child_coop(&self, name: impl Into<String>, parent: impl Into<String>) -> Coop {
        Coop::new(name.into(), Some(parent.into()))
    }

    /// Binds every agent of `coop` to its dispatcher and starts them.
    ///
    /// Nothing is started unless every agent binds. On failure the agents
    /// are dropped.
    ///
    /// # Errors
    ///
    /// `EmptyName`, `CoopAlreadyRegistered`, `ParentCoopNotFound`,
    /// `RegistrationDuringShutdown`, or a binder error such as
    /// `NamedDispatcherNotFound` or `DispatcherTypeMismatch`.
    #[instrument(skip(self, coop), fields(coop = %coop.name()))]
    pub fn register_coop(&self, mut coop: Coop) -> Result<CoopHandle> {
        if coop.name.is_empty() {
            return Err(CohortError::EmptyName);
        }
        let pending = coop.take_agents();
        let cores: Vec<Arc<AgentCore>> = pending.iter().map(|p| Arc::clone(&p.core)).collect();
        let reg_notificators = std::mem::take(&mut coop.reg_notificators);
        let dereg_notificators = std::mem::take(&mut coop.dereg_notificators);
        let reaction = coop.reaction;

        let reserved = self.0.coops.reserve(&coop.name, coop.parent.as_deref(), |parent| {
            CoopEntry::new(
                self,
                coop.name.clone(),
                parent,
                reaction,
                cores,
                reg_notificators,
                dereg_notificators,
            )
        });
        let entry = match reserved {
            Ok(entry) => entry,
            Err(err) => {
                for agent in &pending {
                    agent.core.destroy();
                }
                return Err(err);
            }
        };

        let mut bindings: Vec<AgentBinding> = Vec::with_capacity(pending.len());
        for agent in &pending {
            agent.core.set_coop(&entry);
            let binder: &DispBinder = agent.binder.as_ref().unwrap_or(&coop.binder);
            match binder.bind(self, &agent.core) {
                Ok(binding) => bindings.push(binding),
                Err(err) => {
                    warn!(agent = agent.core.name(), error = %err, "binding failed; registration rolled back");
                    self.roll_back(&entry, bindings);
                    return Err(err);
                }
            }
        }

        for (agent, binding) in pending.iter().zip(&bindings) {
            agent.core.bind(binding.queue());
        }
        if entry.commit(bindings) {
            entry.shutdown_agents();
        }

        if let Some(listener) = &self.0.coop_listener {
            listener.on_registered(self, entry.name());
        }
        entry.notify_registered(self);
        info!(coop = entry.name(), agents = entry.agents().len(), "cooperation registered");

        let handle = CoopHandle::new(entry.id(), entry.name().to_string());
        entry.release_usage();
        Ok(handle)
    }

    /// [`Environment::register_coop`] with an explicit failure strategy.
    ///
    /// # Errors
    ///
    /// With [`ThrowingStrategy::ReturnError`], whatever `register_coop` returns.
    ///
    /// # Panics
    ///
    /// With [`ThrowingStrategy::Panic`], when registration fails.
    pub fn register_coop_with(&self, coop: Coop, strategy: ThrowingStrategy) -> Result<CoopHandle> {
        strategy.apply(self.register_coop(coop))
    }

    /// Registers `agent` as the only member of a new cooperation.
    ///
    /// # Errors
    ///
    /// See [`Environment::register_coop`].
    pub fn register_agent_as_coop<Model>(
        &self,
        name: impl Into<String>,
        agent: ManagedAgent<Idle, Model>,
    ) -> Result<CoopHandle>
    where
        Model: Send + Sync + Debug + 'static,
    {
        let mut coop = self.create_coop(name);
        coop.add_agent(agent);
        self.register_coop(coop)
    }

    /// Like [`Environment::register_agent_as_coop`], bound through `binder`.
    ///
    /// # Errors
    ///
    /// See [`Environment::register_coop`].
    pub fn register_agent_as_coop_with_binder<Model>(
        &self,
        name: impl Into<String>,
        agent: ManagedAgent<Idle, Model>,
        binder: DispBinder,
    ) -> Result<CoopHandle>
    where
        Model: Send + Sync + Debug + 'static,
    {
        let mut coop = self.create_coop(name);
        coop.set_binder(binder);
        coop.add_agent(agent);
        self.register_coop(coop)
    }

    fn roll_back(&self, entry: &Arc<CoopEntry>, mut bindings: Vec<AgentBinding>) {
        while let Some(binding) = bindings.pop() {
            drop(binding);
        }
        self.0.coops.remove(entry);
        if let Some(parent) = entry.parent() {
            parent.remove_child(entry);
            parent.release_usage();
        }
        for agent in entry.agents() {
            agent.destroy();
        }
    }

    /// Starts deregistration of the named cooperation and its children.
    /// Returns at once; teardown finishes on the deregistration thread.
    ///
    /// # Errors
    ///
    /// `CoopNotFound` when no cooperation has that name.
    #[instrument(skip(self))]
    pub fn deregister_coop(&self, name: &str, reason: DeregReason) -> Result<()> {
        let entry = self
            .0
            .coops
            .find(name)
            .ok_or_else(|| CohortError::CoopNotFound(name.to_string()))?;
        entry.deregister(reason);
        Ok(())
    }

    /// Number of cooperations not yet finally deregistered.
    #[must_use]
    pub fn coop_count(&self) -> usize {
        self.0.coops.len()
    }

    pub(crate) fn post_final_deregistration(&self, entry: Arc<CoopEntry>) {
        trace!(coop = entry.name(), "cooperation ready for final deregistration");
        self.0.dereg.post(entry);
    }

    /// Final teardown, run on the deregistration thread.
    pub(crate) fn finalize_coop(&self, entry: &Arc<CoopEntry>) {
        let reason = entry.dereg_reason().unwrap_or(DeregReason::UnknownError);
        let mut bindings = entry.take_bindings();
        while let Some(binding) = bindings.pop() {
            drop(binding);
        }
        for agent in entry.agents() {
            agent.destroy();
        }
        self.0.coops.remove(entry);
        info!(coop = entry.name(), %reason, "cooperation deregistered");

        if let Some(listener) = &self.0.coop_listener {
            listener.on_deregistered(self, entry.name(), reason);
        }
        entry.notify_deregistered(self, reason);

        if let Some(parent) = entry.parent() {
            parent.remove_child(entry);
            parent.release_usage();
        }
        if self.0.autoshutdown && self.0.coops.is_empty() {
            debug!("last cooperation gone; autoshutdown");
            self.stop();
        }
    }

    // --- mboxes ---

    /// A new anonymous multi-consumer mbox.
    #[must_use]
    pub fn create_mbox(&self) -> Mbox {
        Mbox::new(Arc::new(LocalMbox::new()), self.runtime_handle())
    }

    /// The multi-consumer mbox registered under `name`, created on first use.
    /// The name is released when the last handle to the mbox is dropped.
    ///
    /// # Errors
    ///
    /// `EmptyName` when `name` is empty.
    pub fn create_mbox_named(&self, name: &str) -> Result<Mbox> {
        if name.is_empty() {
            return Err(CohortError::EmptyName);
        }
        Ok(Mbox::new(
            lookup_or_create(&self.0.named_mboxes, name),
            self.runtime_handle(),
        ))
    }

    // --- timers ---

    fn payload(mbox: &Mbox, msg_type: TypeId, type_name: &'static str, message: Option<MessageRef>) -> TimerPayload {
        TimerPayload {
            mbox: mbox.clone(),
            msg_type,
            type_name,
            message,
        }
    }

    /// Sends `message` to `mbox` after `delay`, then every `period` unless
    /// it is zero. Dropping every clone of the returned id cancels the timer.
    ///
    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn schedule_timer<M: Message>(
        &self,
        mbox: &Mbox,
        message: M,
        delay: Duration,
        period: Duration,
    ) -> Result<TimerId> {
        let payload = Self::payload(
            mbox,
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            Some(MessageRef::new(message)),
        );
        self.0.timers.schedule(payload, delay, period)
    }

    /// Signal form of [`Environment::schedule_timer`].
    ///
    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn schedule_timer_signal<S: Signal>(
        &self,
        mbox: &Mbox,
        delay: Duration,
        period: Duration,
    ) -> Result<TimerId> {
        let payload = Self::payload(mbox, TypeId::of::<S>(), std::any::type_name::<S>(), None);
        self.0.timers.schedule(payload, delay, period)
    }

    /// Fire-and-forget delayed send; only shutdown cancels it.
    ///
    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn send_delayed<M: Message>(&self, mbox: &Mbox, message: M, delay: Duration) -> Result<()> {
        let payload = Self::payload(
            mbox,
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
            Some(MessageRef::new(message)),
        );
        self.0.timers.schedule_detached(payload, delay)
    }

    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn send_delayed_signal<S: Signal>(&self, mbox: &Mbox, delay: Duration) -> Result<()> {
        let payload = Self::payload(mbox, TypeId::of::<S>(), std::any::type_name::<S>(), None);
        self.0.timers.schedule_detached(payload, delay)
    }

    /// Periodic send: first after `delay`, then every `period`.
    ///
    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn send_periodic<M: Message>(
        &self,
        mbox: &Mbox,
        message: M,
        delay: Duration,
        period: Duration,
    ) -> Result<TimerId> {
        self.schedule_timer(mbox, message, delay, period)
    }

    /// # Errors
    ///
    /// `UnableToScheduleTimer` once the environment has been joined.
    pub fn send_periodic_signal<S: Signal>(
        &self,
        mbox: &Mbox,
        delay: Duration,
        period: Duration,
    ) -> Result<TimerId> {
        self.schedule_timer_signal::<S>(mbox, delay, period)
    }

    // --- shutdown ---

    /// Asks the environment to stop. Returns immediately.
    ///
    /// With stop guards installed, only the guards are notified; shutdown
    /// proper begins when the last guard is removed. Later calls do nothing.
    pub fn stop(&self) {
        let guards = {
            let mut stop = self.0.stop.lock();
            if stop.requested {
                return;
            }
            stop.requested = true;
            if stop.guards.is_empty() {
                stop.shutdown_started = true;
                None
            } else {
                Some(stop.guards.clone())
            }
        };
        match guards {
            Some(guards) => {
                debug!(guards = guards.len(), "stop requested; waiting for stop guards");
                for guard in guards {
                    guard.stop();
                }
            }
            None => self.begin_shutdown(),
        }
    }

    fn begin_shutdown(&self) {
        let coops = self.0.coops.begin_shutdown();
        info!(coops = coops.len(), "environment shutting down");
        for entry in coops {
            entry.deregister(DeregReason::Shutdown);
        }
    }

    /// Installs a guard that holds shutdown back until it is removed.
    ///
    /// # Errors
    ///
    /// `StopInProgress` once [`Environment::stop`] has been called.
    pub fn setup_stop_guard(&self, guard: Arc<dyn StopGuard>) -> Result<()> {
        let mut stop = self.0.stop.lock();
        if stop.requested {
            return Err(CohortError::StopInProgress);
        }
        stop.guards.push(guard);
        Ok(())
    }

    /// Removes a guard installed earlier. Removing the last guard after a
    /// stop request starts the shutdown.
    pub fn remove_stop_guard(&self, guard: &Arc<dyn StopGuard>) {
        let start = {
            let mut stop = self.0.stop.lock();
            let target = Arc::as_ptr(guard).cast::<()>();
            stop.guards
                .retain(|installed| !std::ptr::eq(Arc::as_ptr(installed).cast::<()>(), target));
            if stop.requested && !stop.shutdown_started && stop.guards.is_empty() {
                stop.shutdown_started = true;
                true
            } else {
                false
            }
        };
        if start {
            self.begin_shutdown();
        }
    }

    /// Blocks until the environment has stopped and every thread it owns
    /// has exited. Must not be called from an agent's handler. Concurrent
    /// callers all return only after the teardown is complete.
    pub fn join(&self) {
        self.0.coops.wait_until_drained();
        let mut joined = self.0.joined.lock();
        if *joined {
            return;
        }
        self.0.dereg.shutdown_and_join();
        let dispatchers = || {
            std::iter::once(&self.0.default_dispatcher).chain(self.0.dispatchers.values())
        };
        for dispatcher in dispatchers() {
            dispatcher.shutdown();
        }
        for dispatcher in dispatchers() {
            dispatcher.wait();
        }
        self.0.timers.shutdown();
        *joined = true;
        info!("environment stopped");
    }

    pub fn stop_then_join(&self) {
        self.stop();
        self.join();
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("coops", &self.coop_count())
            .field("dispatchers", &self.0.dispatchers.len())
            .field("exception_reaction", &self.0.exception_reaction)
            .finish_non_exhaustive()
    }
}

impl Debug for EnvironmentInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentInner")
            .field("dispatchers", &self.dispatchers.len())
            .finish_non_exhaustive()
    }
}
