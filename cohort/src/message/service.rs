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

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::common::{CohortError, Result};
use crate::message::BoxedReply;

pub(crate) type ServiceReply = Result<BoxedReply>;
pub(crate) type ReplySender = oneshot::Sender<ServiceReply>;

/// How long a blocking service request may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Forever,
    For(Duration),
}

/// Pending outcome of a service request.
///
/// Either block on it with [`ServiceFuture::wait`] from a plain thread, or
/// `.await` it. Dropping it abandons the reply; the handler still runs.
///
/// Blocking from inside a handler of an agent that shares a worker thread
/// with the serving agent deadlocks.
#[derive(Debug)]
pub struct ServiceFuture<R> {
    rx: oneshot::Receiver<ServiceReply>,
    runtime: Handle,
    _reply: PhantomData<fn() -> R>,
}

impl<R: Send + 'static> ServiceFuture<R> {
    pub(crate) fn channel(runtime: Handle) -> (ReplySender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                rx,
                runtime,
                _reply: PhantomData,
            },
        )
    }

    /// Blocks the calling thread until the reply arrives or `wait` expires.
    ///
    /// # Errors
    ///
    /// Delivery failures (`NoServiceHandlers`, `MoreThanOneServiceHandler`),
    /// handler failures, `ServiceRequestTimeout` and `ServiceRequestDropped`.
    pub fn wait(self, wait: Wait) -> Result<R> {
        match wait {
            Wait::Forever => self.wait_forever(),
            Wait::For(timeout) => self.wait_for(timeout),
        }
    }

    /// # Errors
    ///
    /// See [`ServiceFuture::wait`].
    pub fn wait_forever(self) -> Result<R> {
        let reply = self
            .rx
            .blocking_recv()
            .map_err(|_| CohortError::ServiceRequestDropped)?;
        convert(reply)
    }

    /// # Errors
    ///
    /// See [`ServiceFuture::wait`].
    pub fn wait_for(self, timeout: Duration) -> Result<R> {
        let Self { rx, runtime, .. } = self;
        match runtime.block_on(async move { tokio::time::timeout(timeout, rx).await }) {
            Ok(Ok(reply)) => convert(reply),
            Ok(Err(_)) => Err(CohortError::ServiceRequestDropped),
            Err(_) => Err(CohortError::ServiceRequestTimeout(timeout)),
        }
    }
}

fn convert<R: Send + 'static>(reply: ServiceReply) -> Result<R> {
    reply?
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| CohortError::ServiceReplyTypeMismatch(std::any::type_name::<R>()))
}

impl<R: Send + 'static> Future for ServiceFuture<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(convert(reply)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CohortError::ServiceRequestDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Completes a request with a failure; a requester that already left is ignored.
pub(crate) fn fail_request(reply: ReplySender, error: CohortError) {
    let _ = reply.send(Err(error));
}
