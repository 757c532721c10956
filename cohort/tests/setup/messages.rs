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

use cohort::prelude::*;

#[cohort_message]
pub struct Ping(pub u32);

#[cohort_message]
pub struct Text(pub String);

#[cohort_message]
pub struct Add {
    pub a: i64,
    pub b: i64,
}

#[cohort_message]
pub struct Slow {
    pub millis: u64,
}

#[cohort_signal]
pub struct Tick;

#[cohort_signal]
pub struct Fail;

#[cohort_signal]
pub struct Block;

#[cohort_signal]
pub struct Advance;
