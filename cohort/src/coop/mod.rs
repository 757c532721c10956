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

//! Cooperations: building them, tracking them while registered and tearing
//! them down on the deregistration thread.

pub use cooperation::{AgentRef, Coop, CoopHandle, DeregNotificator, RegNotificator};
pub(crate) use cooperation::PendingAgent;
pub(crate) use dereg_executor::DeregExecutor;
pub use dereg_reason::DeregReason;
pub(crate) use repository::{CoopEntry, CoopRepository};

mod cooperation;
mod dereg_executor;
mod dereg_reason;
mod repository;
