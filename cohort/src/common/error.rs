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

use std::time::Duration;

use thiserror::Error;

use crate::common::MboxId;
use crate::dispatcher::DispatcherKind;

/// Result alias used by every fallible runtime operation.
pub type Result<T, E = CohortError> = std::result::Result<T, E>;

/// Errors reported by the runtime.
///
/// Every variant carries a stable numeric code, see [`CohortError::code`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CohortError {
    #[error("agent `{0}` refers to a state that is not registered")]
    UnknownAgentState(String),
    #[error("named dispatcher `{0}` not found")]
    NamedDispatcherNotFound(String),
    #[error("state `{0}` has substates but no initial substate")]
    NoInitialSubstate(String),
    #[error("state `{0}` exceeds the maximum nesting depth of {1}")]
    StateNestingTooDeep(String, usize),
    #[error("state `{0}` already has an initial substate")]
    InitialSubstateAlreadyDefined(String),
    #[error("cooperation `{0}` is already registered")]
    CoopAlreadyRegistered(String),
    #[error("cooperation `{0}` is not registered")]
    CoopNotFound(String),
    #[error("parent cooperation `{0}` is not registered")]
    ParentCoopNotFound(String),
    #[error("unable to bind agent `{agent}` to its dispatcher: {reason}")]
    AgentBindingFailed { agent: String, reason: String },
    #[error("cooperation `{0}` cannot be registered while the environment is shutting down")]
    RegistrationDuringShutdown(String),
    #[error("dispatcher `{name}` failed to start: {reason}")]
    DispatcherStartFailed { name: String, reason: String },
    #[error("dispatcher `{name}` is {actual}, the binder expects {expected}")]
    DispatcherTypeMismatch {
        name: String,
        expected: DispatcherKind,
        actual: DispatcherKind,
    },
    #[error("handler for `{msg_type}` from {mbox} in state `{state}` is already provided")]
    EventHandlerAlreadyProvided {
        mbox: MboxId,
        msg_type: &'static str,
        state: String,
    },
    #[error("no handler for `{msg_type}` from {mbox} in state `{state}`")]
    EventHandlerNotFound {
        mbox: MboxId,
        msg_type: &'static str,
        state: String,
    },
    #[error("agent is not the owner of state `{0}`")]
    NotStateOwner(String),
    #[error("{0} is a single-consumer mbox; only its owner may subscribe")]
    IllegalSubscriberForMpscMbox(MboxId),
    #[error("agent has message limits but none for `{0}`")]
    MessageHasNoLimitDefined(&'static str),
    #[error("more than one limit defined for `{0}`")]
    SeveralLimitsForOneMessageType(&'static str),
    #[error("{0} is a single-consumer mbox; delivery filters need a multi-consumer one")]
    DeliveryFilterOnMpscMbox(MboxId),
    #[error("no service handler subscribed for `{0}`")]
    NoServiceHandlers(&'static str),
    #[error("more than one service handler subscribed for `{0}`")]
    MoreThanOneServiceHandler(&'static str),
    #[error("service request `{0}` was not handled in the agent's current state")]
    ServiceNotHandled(&'static str),
    #[error("service reply cannot be converted to `{0}`")]
    ServiceReplyTypeMismatch(&'static str),
    #[error("unable to schedule timer: {0}")]
    UnableToScheduleTimer(String),
    #[error("name must not be empty")]
    EmptyName,
    #[error("service request timed out after {0:?}")]
    ServiceRequestTimeout(Duration),
    #[error("service request was dropped before a reply was produced")]
    ServiceRequestDropped,
    #[error("service handler failed: {0}")]
    ServiceHandlerFailed(String),
    #[error("environment stop is already in progress")]
    StopInProgress,
    #[error("invalid agent name `{name}`: {reason}")]
    InvalidAgentName { name: String, reason: String },
}

impl CohortError {
    /// Stable numeric code of the error kind.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::UnknownAgentState(_) => 10,
            Self::NamedDispatcherNotFound(_) => 13,
            Self::NoInitialSubstate(_) => 17,
            Self::StateNestingTooDeep(..) => 18,
            Self::InitialSubstateAlreadyDefined(_) => 19,
            Self::CoopAlreadyRegistered(_) => 21,
            Self::CoopNotFound(_) => 23,
            Self::ParentCoopNotFound(_) => 26,
            Self::AgentBindingFailed { .. } => 27,
            Self::RegistrationDuringShutdown(_) => 28,
            Self::DispatcherStartFailed { .. } => 30,
            Self::DispatcherTypeMismatch { .. } => 32,
            Self::EventHandlerAlreadyProvided { .. } => 40,
            Self::EventHandlerNotFound { .. } => 41,
            Self::NotStateOwner(_) => 43,
            Self::IllegalSubscriberForMpscMbox(_) => 47,
            Self::MessageHasNoLimitDefined(_) => 48,
            Self::SeveralLimitsForOneMessageType(_) => 49,
            Self::NoServiceHandlers(_) => 83,
            Self::DeliveryFilterOnMpscMbox(_) => 89,
            Self::MoreThanOneServiceHandler(_) => 84,
            Self::ServiceNotHandled(_) => 85,
            Self::ServiceReplyTypeMismatch(_) => 87,
            Self::UnableToScheduleTimer(_) => 90,
            Self::ServiceRequestTimeout(_) => 190,
            Self::ServiceRequestDropped => 191,
            Self::ServiceHandlerFailed(_) => 192,
            Self::StopInProgress => 193,
            Self::EmptyName => 500,
            Self::InvalidAgentName { .. } => 501,
        }
    }

    /// Configuration errors abort registration and are never retried.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NamedDispatcherNotFound(_)
                | Self::DispatcherTypeMismatch { .. }
                | Self::CoopAlreadyRegistered(_)
                | Self::ParentCoopNotFound(_)
                | Self::EmptyName
                | Self::InvalidAgentName { .. }
        )
    }
}

/// How a fallible call reports failure at a particular call site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThrowingStrategy {
    /// Hand the error back to the caller.
    #[default]
    ReturnError,
    /// Panic with the error's message.
    Panic,
}

impl ThrowingStrategy {
    /// Applies the strategy to an outcome.
    ///
    /// # Panics
    ///
    /// With [`ThrowingStrategy::Panic`], panics when `result` is an error.
    pub fn apply<T>(self, result: Result<T>) -> Result<T> {
        match (self, result) {
            (Self::Panic, Err(err)) => panic!("cohort error {}: {err}", err.code()),
            (_, result) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_the_return_code_table() {
        assert_eq!(CohortError::NamedDispatcherNotFound("x".into()).code(), 13);
        assert_eq!(CohortError::IllegalSubscriberForMpscMbox(MboxId::next()).code(), 47);
        assert_eq!(CohortError::NoServiceHandlers("Ping").code(), 83);
        assert_eq!(CohortError::MoreThanOneServiceHandler("Ping").code(), 84);
        assert_eq!(CohortError::DeliveryFilterOnMpscMbox(MboxId::next()).code(), 89);
        assert_eq!(CohortError::EmptyName.code(), 500);
    }

    #[test]
    fn return_strategy_passes_errors_through() {
        let outcome: Result<()> = Err(CohortError::CoopNotFound("c".into()));
        let returned = ThrowingStrategy::ReturnError.apply(outcome);
        assert_eq!(returned, Err(CohortError::CoopNotFound("c".into())));
    }

    #[test]
    #[should_panic(expected = "cohort error 23")]
    fn panic_strategy_panics_on_error() {
        let outcome: Result<()> = Err(CohortError::CoopNotFound("c".into()));
        let _ = ThrowingStrategy::Panic.apply(outcome);
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(CohortError::EmptyName.is_configuration_error());
        assert!(!CohortError::ServiceRequestDropped.is_configuration_error());
    }
}
