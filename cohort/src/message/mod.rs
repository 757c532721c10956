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

pub(crate) use demand::{BoxedReply, DemandKind, ExecutionDemand};
pub(crate) use message_limit::{build_limit_table, LimitGuard, LimitTable};
pub use message_limit::{MessageLimit, OverlimitReaction};
pub use message_ref::{MessageContext, MessageRef};
pub(crate) use service::{fail_request, ReplySender};
pub use service::{ServiceFuture, Wait};

mod demand;
mod message_limit;
mod message_ref;
mod service;
