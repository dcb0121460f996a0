// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

/// A background loop owned by a collector component, such as the queue
/// gauge publisher or the dynamic queue resizer.
///
/// `run` is the whole lifetime of the worker and is not expected to return
/// on its own; the driver races it against a cancellation token and drops
/// the worker on shutdown. The `async_trait` macro keeps the trait
/// dyn-compatible so drivers can hold a `Box<dyn Worker>`.
#[async_trait]
pub trait Worker {
    /// Main worker loop
    async fn run(&mut self);
}

// Blanket implementation for boxed trait objects
#[async_trait]
impl Worker for Box<dyn Worker + Send + Sync> {
    async fn run(&mut self) {
        (**self).run().await
    }
}
