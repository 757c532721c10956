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

use std::fmt;

/// Why a cooperation was deregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeregReason {
    Normal,
    /// The environment is stopping.
    Shutdown,
    /// The parent cooperation is being deregistered.
    ParentDeregistration,
    /// A handler failed and the exception reaction asked for it.
    UnhandledException,
    UnknownError,
    /// Application-defined reason; its code is offset by [`DeregReason::USER_DEFINED_BASE`].
    UserDefined(u32),
}

impl DeregReason {
    pub const USER_DEFINED_BASE: u32 = 0x1000;

    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Shutdown => 1,
            Self::ParentDeregistration => 2,
            Self::UnhandledException => 3,
            Self::UnknownError => 4,
            Self::UserDefined(value) => Self::USER_DEFINED_BASE.saturating_add(value),
        }
    }
}

impl fmt::Display for DeregReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::ParentDeregistration => f.write_str("parent deregistration"),
            Self::UnhandledException => f.write_str("unhandled exception"),
            Self::UnknownError => f.write_str("unknown error"),
            Self::UserDefined(value) => write!(f, "user defined ({value})"),
        }
    }
}
