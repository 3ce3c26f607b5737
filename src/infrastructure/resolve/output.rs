// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Provider-resolved attributes.
//!
//! An [`Output`] is a handle to a value the provisioning substrate assigns
//! later (a numeric id, an address). Handles are cheap to clone, every clone
//! observes the same resolution, and the work behind them is driven on the
//! runtime whether or not anybody awaits it.

use crate::shared::ProviderFailure;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type Resolution<T> = std::result::Result<T, ProviderFailure>;

/// Bounds every resolved attribute type satisfies.
pub trait Attribute: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Attribute for T {}

#[derive(Clone)]
pub struct Output<T: Attribute> {
    inner: Shared<BoxFuture<'static, Resolution<T>>>,
}

impl<T: Attribute> Output<T> {
    /// Drive `fut` on the runtime and hand back its shared resolution.
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Resolution<T>> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let inner = async move {
            match handle.await {
                Ok(resolution) => resolution,
                Err(e) => Err(ProviderFailure::new("resolution task", e.to_string())),
            }
        }
        .boxed()
        .shared();
        Self { inner }
    }

    pub fn ready(value: T) -> Self {
        Self {
            inner: future::ready(Ok(value)).boxed().shared(),
        }
    }

    pub fn failed(failure: ProviderFailure) -> Self {
        Self {
            inner: future::ready(Err(failure)).boxed().shared(),
        }
    }

    pub fn map<U, F>(&self, f: F) -> Output<U>
    where
        U: Attribute,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let source = self.clone();
        Output::spawn(async move { source.await.map(f) })
    }

    pub fn and_then<U, F, Fut>(&self, f: F) -> Output<U>
    where
        U: Attribute,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Resolution<U>> + Send + 'static,
    {
        let source = self.clone();
        Output::spawn(async move {
            let value = source.await?;
            f(value).await
        })
    }

    pub fn join<U: Attribute>(&self, other: &Output<U>) -> Output<(T, U)> {
        let left = self.clone();
        let right = other.clone();
        Output::spawn(async move { future::try_join(left, right).await })
    }

    /// Resolves once every input resolved, preserving input order. The first
    /// failure wins.
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        Output::spawn(async move { future::try_join_all(outputs).await })
    }
}

impl<T: Attribute> Future for Output<T> {
    type Output = Resolution<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl<T: Attribute> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.peek() {
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "failed",
            None => "pending",
        };
        f.debug_struct("Output").field("state", &state).finish()
    }
}
