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

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Type-erasure plumbing behind [`Message`]. Not meant to be named by users.
#[doc(hidden)]
pub trait AnyMessage: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn type_name(&self) -> &'static str;
}

impl<T> AnyMessage for T
where
    T: Any + Send + Sync + Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A payload that can travel through an mbox.
///
/// Implemented by `#[cohort_message]` (or by hand). Signals are a separate
/// kind: `#[cohort_signal]` types are not messages, so they can only be
/// subscribed with `signal` / `service_signal` and sent with `send_signal`.
///
/// ```compile_fail
/// use cohort::prelude::*;
///
/// #[cohort_signal]
/// struct Tick;
///
/// fn takes_payload<M: Message>() {}
/// takes_payload::<Tick>();
/// ```
pub trait Message: AnyMessage {}

/// Marker for payload-less message types. Signal handlers never see an
/// instance; declare one with `#[cohort_signal]`.
pub trait Signal: Send + Sync + Debug + 'static {}
