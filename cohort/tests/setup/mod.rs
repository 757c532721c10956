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

use std::sync::Once;
use std::time::Duration;

use cohort::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod messages;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Window used to check that nothing else arrives.
pub const SETTLE: Duration = Duration::from_millis(200);

static INIT: Once = Once::new();

/// Installs the global tracing subscriber once per test binary.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "cohort_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("trace")
            .add_directive("cohort::dispatcher=debug".parse().expect("valid directive"))
            .add_directive("cohort::mbox=trace".parse().expect("valid directive"))
            .add_directive("tokio=info".parse().expect("valid directive"));

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Launches an environment that is stopped and joined when it goes out of
/// scope. Tests override only what they exercise.
pub fn launch(params: EnvironmentParams) -> WrappedEnvironment {
    initialize_tracing();
    WrappedEnvironment::new(params).expect("environment failed to launch")
}

/// Default params pinned to values tests rely on, independent of any local
/// config file.
pub fn params() -> EnvironmentParams {
    EnvironmentParams::default()
        .with_exception_reaction(ExceptionReaction::DeregisterCoop)
        .with_autoshutdown(false)
        .with_subscription_storage(SubscriptionStorageKind::Adaptive { threshold: 8 })
        .with_max_redirection_depth(32)
}

/// Records every stop request; tests remove the guard themselves.
#[derive(Debug, Default)]
pub struct RecordingGuard {
    pub stops: cohort_test::Probe<()>,
}

impl StopGuard for RecordingGuard {
    fn stop(&self) {
        self.stops.record(());
    }
}

/// Records listener callbacks as `+name` and `-name:reason`.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub events: cohort_test::Probe<String>,
}

impl CoopListener for RecordingListener {
    fn on_registered(&self, _env: &Environment, coop_name: &str) {
        self.events.record(format!("+{coop_name}"));
    }

    fn on_deregistered(&self, _env: &Environment, coop_name: &str, reason: DeregReason) {
        self.events.record(format!("-{coop_name}:{}", reason.code()));
    }
}
