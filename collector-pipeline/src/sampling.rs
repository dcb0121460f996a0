// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contracts consumed from the sampling subsystem.
//!
//! The collector does not make sampling decisions. It serves client
//! strategies through a [`SamplingProvider`] and, when adaptive sampling is
//! configured, feeds root spans to a [`SamplingAggregator`] as a pre-save
//! hook.

use async_trait::async_trait;
use collector_model::span::Span;
use serde::{Deserialize, Serialize};

/// The sampling strategy served to a client asking for `service`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingStrategyResponse {
    pub strategy_type: SamplingStrategyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilistic_sampling: Option<ProbabilisticSamplingStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiting_sampling: Option<RateLimitingSamplingStrategy>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategyType {
    #[default]
    Probabilistic,
    RateLimiting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilisticSamplingStrategy {
    pub sampling_rate: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitingSamplingStrategy {
    pub max_traces_per_second: i32,
}

/// Serves per-service sampling strategies to clients. Consumed by the
/// ingress-side configuration endpoint, not by the pipeline itself.
#[async_trait]
pub trait SamplingProvider: Send + Sync {
    async fn get_sampling_strategy(
        &self,
        service: &str,
    ) -> anyhow::Result<SamplingStrategyResponse>;
}

/// Observes root spans before they are written, typically to drive adaptive
/// sampling. Registered as a pre-save hook on the processor.
pub trait SamplingAggregator: Send + Sync {
    fn handle_root_span(&self, span: &Span);
    fn close(&self);
}
